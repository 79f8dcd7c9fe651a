use std::{collections::HashSet, sync::Arc};

use futures::TryStreamExt;
use games_console::dao::{
    models::{Games, GamesSortField, VideoGame},
    query::{Filter, SortDirection},
    repository::{
        DatabaseRepository, PageRequest, SharedRepository, memory::MemoryRepository, page_stream,
    },
    storage::StorageError,
};

fn repository() -> SharedRepository<Games> {
    let repo: Arc<dyn DatabaseRepository<Games>> = Arc::new(MemoryRepository::<Games>::new());
    repo
}

fn games(name: &str, location: &str, year: i32, titles: &[&str]) -> Games {
    Games {
        name: name.into(),
        location: location.into(),
        year,
        video_games: titles
            .iter()
            .map(|title| VideoGame {
                name: (*title).into(),
                release_date: "2004".into(),
                engine: "Dunia".into(),
                platform: Some("PC".into()),
            })
            .collect(),
        id: String::new(),
    }
}

async fn seed(repo: &SharedRepository<Games>) -> Vec<String> {
    let mut ids = Vec::new();
    for (name, location, year, titles) in [
        ("Ubisoft", "Montreuil", 1986, vec!["Far Cry", "Rayman"]),
        ("EA", "Redwood City", 1982, vec!["FIFA"]),
        ("Nintendo", "Kyoto", 1889, vec!["Zelda"]),
        ("Valve", "Bellevue", 1996, vec!["Half-Life"]),
        ("CD Projekt", "Warsaw", 1994, vec!["The Witcher"]),
    ] {
        let record = games(name, location, year, &titles);
        ids.push(repo.add(record, Some(name.into())).await.unwrap());
    }
    ids
}

#[tokio::test]
async fn insert_then_fetch_returns_the_stored_record() {
    let repo = repository();
    let record = games("Ubisoft", "Montreuil", 1986, &["Far Cry"]);
    let id = repo.add(record.clone(), Some("Ubisoft".into())).await.unwrap();
    assert!(!id.is_empty());

    let fetched = repo
        .find_by_id(id.clone(), Some("Ubisoft".into()))
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(fetched.entity, Games { id, ..record });
    assert!(!fetched.etag.is_empty());
}

#[tokio::test]
async fn add_rejects_a_foreign_partition_key() {
    let repo = repository();
    let err = repo
        .add(games("Ubisoft", "Montreuil", 1986, &[]), Some("EA".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PartitionMismatch { .. }));
}

#[tokio::test]
async fn delete_removes_and_reports_missing_records() {
    let repo = repository();
    let ids = seed(&repo).await;

    assert!(repo.delete(ids[0].clone(), Some("Ubisoft".into())).await.unwrap());
    assert!(repo.find_by_id(ids[0].clone(), None).await.unwrap().is_none());

    assert!(!repo.delete(ids[0].clone(), None).await.unwrap());
    assert!(!repo.delete("never-existed".into(), None).await.unwrap());
    // Wrong partition leaves the record alone.
    assert!(!repo.delete(ids[1].clone(), Some("Valve".into())).await.unwrap());
    assert_eq!(repo.get_all(None, None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn update_honours_the_etag() {
    let repo = repository();
    let ids = seed(&repo).await;
    let id = ids[0].clone();
    let current = repo.find_by_id(id.clone(), None).await.unwrap().unwrap();

    let mut changed = current.entity.clone();
    changed.location = "Saint-Mandé".into();
    let etag = repo
        .update(id.clone(), changed.clone(), Some("Ubisoft".into()), Some(current.etag.clone()))
        .await
        .unwrap();
    assert_ne!(etag, current.etag);

    let stale = repo
        .update(id.clone(), changed.clone(), None, Some(current.etag))
        .await
        .unwrap_err();
    assert!(matches!(stale, StorageError::Conflict { .. }));

    let fetched = repo.find_by_id(id.clone(), None).await.unwrap().unwrap();
    assert_eq!(fetched.entity.location, "Saint-Mandé");
    assert_eq!(fetched.etag, etag);

    let missing = repo
        .update("missing".into(), changed, None, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn update_keeps_the_path_id() {
    let repo = repository();
    let ids = seed(&repo).await;
    let mut body = games("EA", "Redwood City", 1982, &[]);
    body.id = "something-else".into();

    repo.update(ids[1].clone(), body, None, None).await.unwrap();
    let fetched = repo.find_by_id(ids[1].clone(), None).await.unwrap().unwrap();
    assert_eq!(fetched.entity.id, ids[1]);
    assert!(repo.find_by_id("something-else".into(), None).await.unwrap().is_none());
}

#[tokio::test]
async fn following_tokens_reconstructs_the_collection() {
    let repo = repository();
    let ids = seed(&repo).await;

    let first = repo.get_page(PageRequest::new(2)).await.unwrap();
    assert_eq!(first.result_set.len(), 2);
    assert!(first.has_more());

    let pages: Vec<Vec<Games>> = page_stream(repo.clone(), PageRequest::new(2))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), [2, 2, 1]);

    let seen: HashSet<String> = pages.into_iter().flatten().map(|g| g.id).collect();
    assert_eq!(seen, ids.into_iter().collect());
}

#[tokio::test]
async fn exact_multiple_of_page_size_ends_without_token() {
    let repo = repository();
    seed(&repo).await;

    let page = repo
        .get_page(PageRequest::new(5))
        .await
        .unwrap();
    assert_eq!(page.result_set.len(), 5);
    assert_eq!(page.continuation_token, None);
}

#[tokio::test]
async fn largest_page_size_returns_everything() {
    let repo = repository();
    seed(&repo).await;

    let page = repo.get_page(PageRequest::new(usize::MAX)).await.unwrap();
    assert_eq!(page.result_set.len(), 5);
    assert_eq!(page.continuation_token, None);
}

#[tokio::test]
async fn invalid_paging_inputs_are_rejected() {
    let repo = repository();
    seed(&repo).await;

    assert!(matches!(
        repo.get_page(PageRequest::new(0)).await,
        Err(StorageError::InvalidPageSize)
    ));
    assert!(matches!(
        repo.get_page(PageRequest::new(2).with_token(Some("garbage".into())))
            .await,
        Err(StorageError::InvalidToken)
    ));
}

#[tokio::test]
async fn searching_cry_finds_far_cry() {
    let repo = repository();
    seed(&repo).await;

    let found = repo
        .get_all(Some(Games::search_filter("cry")), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ubisoft");

    let by_location = repo
        .get_all(Some(Games::search_filter("KYOTO")), None)
        .await
        .unwrap();
    assert_eq!(by_location[0].name, "Nintendo");
}

#[tokio::test]
async fn far_cry_example_round_trips_through_search() {
    let repo = repository();
    let far_cry = Games {
        name: "Ubisoft".into(),
        location: "France".into(),
        year: 2015,
        video_games: vec![VideoGame {
            name: "Far Cry".into(),
            release_date: "2015-03-24".into(),
            engine: "Dunia".into(),
            platform: None,
        }],
        id: String::new(),
    };
    let id = repo.add(far_cry.clone(), Some("Ubisoft".into())).await.unwrap();

    let found = repo
        .get_all(Some(Games::search_filter("cry")), None)
        .await
        .unwrap();
    assert_eq!(found, vec![Games { id, ..far_cry }]);
}

#[tokio::test]
async fn raw_query_and_filter_paths_agree() {
    let repo = repository();
    seed(&repo).await;

    let via_query = repo
        .get_all_by_query(
            "SELECT * FROM c WHERE c.year >= 1990 ORDER BY c.year DESC".into(),
            None,
            None,
            None,
        )
        .await
        .unwrap();
    let names: Vec<_> = via_query.result_set.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["Valve", "CD Projekt"]);
    assert_eq!(via_query.continuation_token, None);

    let via_filter = repo
        .get_page(
            PageRequest::new(10)
                .with_filter(Filter::Compare {
                    path: "year".into(),
                    op: games_console::dao::query::CompareOp::Ge,
                    value: 1990.into(),
                })
                .sorted_by(GamesSortField::Year, SortDirection::Descending),
        )
        .await
        .unwrap();
    assert_eq!(via_filter.result_set, via_query.result_set);
}

#[tokio::test]
async fn demo_query_is_scoped_to_its_partition() {
    let repo = repository();
    seed(&repo).await;

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

    let empty = repo
        .get_all_by_query(
            "SELECT * FROM c WHERE c.name = 'Ubisoft'".into(),
            None,
            None,
            Some("EA".into()),
        )
        .await
        .unwrap();
    assert!(empty.result_set.is_empty());
}

#[tokio::test]
async fn raw_query_pages_with_tokens() {
    let repo = repository();
    seed(&repo).await;
    let query = "SELECT * FROM c ORDER BY c.name".to_owned();

    let first = repo
        .get_all_by_query(query.clone(), None, Some(3), None)
        .await
        .unwrap();
    let second = repo
        .get_all_by_query(query, first.continuation_token.clone(), Some(3), None)
        .await
        .unwrap();
    let names: Vec<_> = first
        .result_set
        .iter()
        .chain(&second.result_set)
        .map(|g| g.name.as_str())
        .collect();
    assert_eq!(names, ["CD Projekt", "EA", "Nintendo", "Ubisoft", "Valve"]);
    assert_eq!(second.continuation_token, None);
}

#[tokio::test]
async fn malformed_queries_report_a_position() {
    let repo = repository();
    let err = repo
        .get_all_by_query("SELECT * FROM c WHERE c.year >".into(), None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidQuery { .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn close_fences_later_calls() {
    let repo = repository();
    seed(&repo).await;
    repo.close().await.unwrap();

    let err = repo.find_by_id("any".into(), None).await.unwrap_err();
    assert!(matches!(err, StorageError::Closed));
    assert!(!err.is_recoverable());
}
