#![cfg(feature = "couch-store")]

use games_console::dao::{
    models::{Games, GamesSortField},
    query::SortDirection,
    repository::{
        DatabaseRepository, PageRequest,
        couchdb::{CouchConfig, CouchRepository},
    },
    storage::StorageError,
};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{basic_auth, body_partial_json, method, path, query_param},
};

const DATABASE: &str = "GamesDB";

fn config(server: &MockServer) -> CouchConfig {
    CouchConfig::new(format!("{}/", server.uri()), DATABASE, "Games")
}

async fn mount_ready_database(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/GamesDB"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "db_name": DATABASE })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "created" })))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> CouchRepository<Games> {
    mount_ready_database(server).await;
    CouchRepository::<Games>::connect(config(server))
        .await
        .expect("connect to mock CouchDB")
}

fn stored(id: &str, rev: &str, name: &str) -> Value {
    json!({
        "_id": format!("Games::{id}"),
        "_rev": rev,
        "name": name,
        "location": "Montreuil",
        "year": 1986,
        "vedioGames": [{ "name": "Far Cry", "releaseDate": "2004", "engine": "Dunia" }],
        "id": id,
    })
}

#[tokio::test]
async fn connect_creates_a_missing_database_and_indexes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/GamesDB"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/GamesDB"))
        .and(basic_auth("admin", "secret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    // Partition key plus the sort fields that differ from it.
    Mock::given(method("POST"))
        .and(path("/GamesDB/_index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "created" })))
        .expect(4)
        .mount(&server)
        .await;

    CouchRepository::<Games>::connect(config(&server).with_credentials("admin", "secret"))
        .await
        .unwrap();
}

#[tokio::test]
async fn find_by_id_uses_revision_as_etag() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("g1", "1-abc", "Ubisoft")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let found = repo.find_by_id("g1".into(), None).await.unwrap().unwrap();
    assert_eq!(found.etag, "1-abc");
    assert_eq!(found.entity.name, "Ubisoft");
    assert_eq!(found.entity.video_games[0].platform, None);

    assert!(repo
        .find_by_id("g1".into(), Some("EA".into()))
        .await
        .unwrap()
        .is_none());
    assert!(repo.find_by_id("missing".into(), None).await.unwrap().is_none());
}

#[tokio::test]
async fn add_maps_document_conflicts() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("PUT"))
        .and(path("/GamesDB/Games::taken"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let games = Games {
        name: "Ubisoft".into(),
        id: "taken".into(),
        ..Games::default()
    };
    let err = repo.add(games, Some("Ubisoft".into())).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { id } if id == "taken"));
}

#[tokio::test]
async fn update_sends_the_supplied_revision() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("g1", "2-new", "Ubisoft")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/GamesDB/Games::g1"))
        .and(body_partial_json(json!({ "_rev": "1-old" })))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/GamesDB/Games::g1"))
        .and(body_partial_json(json!({ "_rev": "2-new", "id": "g1" })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "ok": true, "id": "Games::g1", "rev": "3-next" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let games = Games {
        name: "Ubisoft".into(),
        location: "Saint-Mandé".into(),
        ..Games::default()
    };
    let stale = repo
        .update("g1".into(), games.clone(), None, Some("1-old".into()))
        .await
        .unwrap_err();
    assert!(matches!(stale, StorageError::Conflict { .. }));

    let etag = repo
        .update("g1".into(), games.clone(), None, Some("2-new".into()))
        .await
        .unwrap();
    assert_eq!(etag, "3-next");

    let missing = repo
        .update("gone".into(), games, None, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn delete_removes_the_current_revision() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("g1", "4-z", "Ubisoft")))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/GamesDB/Games::g1"))
        .and(query_param("rev", "4-z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(repo.delete("g1".into(), Some("Ubisoft".into())).await.unwrap());
    assert!(!repo.delete("missing".into(), None).await.unwrap());
}

#[tokio::test]
async fn pages_carry_a_bookmark_only_when_more_remain() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_find"))
        .and(body_partial_json(json!({ "limit": 2, "sort": [{ "year": "asc" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [stored("a", "1-a", "EA"), stored("b", "1-b", "Ubisoft")],
            "bookmark": "bm1",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_find"))
        .and(body_partial_json(json!({ "limit": 1, "bookmark": "bm1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [stored("c", "1-c", "Valve")],
            "bookmark": "bm2",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_find"))
        .and(body_partial_json(json!({ "limit": 2, "bookmark": "bm1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [stored("c", "1-c", "Valve")],
            "bookmark": "bm2",
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    let request = PageRequest::new(2).sorted_by(GamesSortField::Year, SortDirection::Ascending);
    let first = repo.get_page(request.clone()).await.unwrap();
    assert_eq!(first.result_set.len(), 2);
    assert_eq!(first.continuation_token.as_deref(), Some("bm1"));

    let last = repo
        .get_page(request.with_token(first.continuation_token))
        .await
        .unwrap();
    assert_eq!(last.result_set.len(), 1);
    assert_eq!(last.result_set[0].id, "c");
    assert_eq!(last.continuation_token, None);
}

#[tokio::test]
async fn rejected_bookmarks_are_invalid_tokens() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_find"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_bookmark",
        })))
        .mount(&server)
        .await;

    let err = repo
        .get_page(PageRequest::new(2).with_token(Some("forged".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidToken));
}

#[tokio::test]
async fn reserved_characters_in_ids_stay_inside_the_document_path() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored("a", "1-a", "Ubisoft")))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::a%23b"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/GamesDB/Games::a%3Fx=1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(0)
        .mount(&server)
        .await;

    assert!(repo.find_by_id("a#b".into(), None).await.unwrap().is_none());
    assert!(!repo.delete("a?x=1".into(), None).await.unwrap());
}

#[tokio::test]
async fn unindexed_sort_is_reported_without_ending_the_session() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_find"))
        .and(body_partial_json(json!({ "sort": [{ "location": "asc" }] })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "no_usable_index",
            "reason": "No index exists for this sort, try indexing by the sort fields.",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = repo
        .get_all_by_query(
            "SELECT * FROM c ORDER BY c.location".into(),
            None,
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        StorageError::QueryRejected { reason } if reason.starts_with("No index exists")
    ));
}

#[tokio::test]
async fn raw_queries_are_translated_to_mango() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    Mock::given(method("POST"))
        .and(path("/GamesDB/_find"))
        .and(body_partial_json(json!({
            "selector": { "$and": [
                { "_id": { "$gt": "Games::", "$lt": "Games::\u{ffff}" } },
                { "$and": [
                    { "name": { "$eq": "Ubisoft" } },
                    { "name": { "$eq": "Ubisoft" } },
                ]},
            ]},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [stored("g1", "1-a", "Ubisoft")],
            "bookmark": "nil",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = repo
        .get_all_by_query(
            "SELECT * FROM c WHERE c.name = 'Ubisoft'".into(),
            None,
            None,
            Some("Ubisoft".into()),
        )
        .await
        .unwrap();
    assert_eq!(page.result_set.len(), 1);
    assert_eq!(page.continuation_token, None);
}

#[tokio::test]
async fn closed_repository_stops_talking_to_the_server() {
    let server = MockServer::start().await;
    let repo = connect(&server).await;
    repo.health_check().await.unwrap();
    repo.close().await.unwrap();

    assert!(matches!(
        repo.health_check().await,
        Err(StorageError::Closed)
    ));
}
