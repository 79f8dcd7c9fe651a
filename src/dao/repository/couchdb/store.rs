use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchDocument, ErrorResponse, FindResponse, StoredRevision, WriteResponse, doc_id,
        find_body, index_body,
    },
};
use crate::dao::{
    query::{Filter, ParsedQuery, Sort, SortableField},
    repository::{
        DatabaseRepository, Document, PageRequest, PaginatedResponse, Versioned,
        ensure_page_size, ensure_partition, normalize_partition, scope_filter,
    },
    storage::{StorageError, StorageResult},
};

const FIND: &str = "_find";
const INDEX: &str = "_index";
/// Batch size used when a read wants every remaining document.
const SCAN_BATCH: usize = 1000;

/// [`DatabaseRepository`] backed by a CouchDB database, one id prefix per collection.
///
/// Continuation tokens are CouchDB `_find` bookmarks and etags are document revisions.
#[derive(Clone)]
pub struct CouchRepository<T> {
    client: Client,
    database_url: Url,
    database: Arc<str>,
    collection: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    closed: Arc<AtomicBool>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Document> CouchRepository<T> {
    /// Establish a connection to CouchDB, ensure the database and query indexes exist.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let database_url = database_url(&config.base_url, &config.database)?;
        let database = Arc::<str>::from(config.database);
        let collection = Arc::<str>::from(config.collection);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            database_url,
            database,
            collection,
            auth,
            closed: Arc::new(AtomicBool::new(false)),
            _entity: PhantomData,
        };

        store.ensure_database().await?;
        store.ensure_indexes().await?;
        info!(
            database = %store.database,
            collection = %store.collection,
            "CouchDB repository ready"
        );
        Ok(store)
    }

    /// Request against one path segment of the database, percent-encoded.
    fn request(&self, method: Method, segment: &str) -> reqwest::RequestBuilder {
        let mut url = self.database_url.clone();
        // Checked at connect time: the database URL always accepts segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(segment);
        }
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url.clone();

        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    info!(%database, "created CouchDB database");
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    /// Mango indexes backing sorted reads and partition lookups.
    async fn ensure_indexes(&self) -> CouchResult<()> {
        let mut paths = vec![T::PARTITION_KEY_PATH];
        for field in T::SortField::all() {
            if !paths.contains(&field.path()) {
                paths.push(field.path());
            }
        }

        for path in paths {
            let response = self
                .request(Method::POST, INDEX)
                .json(&index_body(path))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: INDEX.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: INDEX.to_string(),
                    status: response.status(),
                });
            }
        }
        Ok(())
    }

    async fn get_document<D>(&self, doc_id: &str) -> CouchResult<Option<D>>
    where
        D: serde::de::DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<D>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Revision of a stored document, provided it lives in the requested partition.
    async fn current_revision(
        &self,
        doc_id: &str,
        partition_key: Option<&str>,
    ) -> CouchResult<Option<String>> {
        let stored = self.get_document::<StoredRevision>(doc_id).await?;
        Ok(stored
            .filter(|stored| {
                partition_key.is_none_or(|key| {
                    stored.fields.get(T::PARTITION_KEY_PATH).and_then(Value::as_str) == Some(key)
                })
            })
            .map(|stored| stored.rev))
    }

    /// PUT a document. `Ok(None)` means CouchDB reported a revision conflict.
    async fn put_document(&self, document: &CouchDocument<T>) -> StorageResult<Option<String>> {
        let path = document.id.as_str();
        let response = self
            .request(Method::PUT, path)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(None),
            // A malformed revision cannot match any stored version.
            StatusCode::BAD_REQUEST if document.rev.is_some() => Ok(None),
            status if status.is_success() => {
                let written = response.json::<WriteResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: path.to_string(),
                        source,
                    }
                })?;
                Ok(Some(written.rev))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: path.to_string(),
                status: other,
            }
            .into()),
        }
    }

    async fn find_batch(
        &self,
        filter: Option<&Filter>,
        sort: Option<&Sort>,
        limit: usize,
        bookmark: Option<&str>,
    ) -> StorageResult<FindResponse<T>> {
        let body = find_body(&self.collection, filter, sort, limit, bookmark);
        let response = self
            .request(Method::POST, FIND)
            .json(&body)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => {
                let batch = response.json::<FindResponse<T>>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: FIND.to_string(),
                        source,
                    }
                })?;
                Ok(batch)
            }
            StatusCode::BAD_REQUEST if bookmark.is_some() => Err(StorageError::InvalidToken),
            // Typically a sort on a field without a usable index.
            StatusCode::BAD_REQUEST => {
                let reason = match response.json::<ErrorResponse>().await {
                    Ok(body) if !body.reason.is_empty() => body.reason,
                    Ok(body) if !body.error.is_empty() => body.error,
                    _ => "bad request".to_string(),
                };
                Err(StorageError::QueryRejected { reason })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: other,
            }
            .into()),
        }
    }

    async fn query(
        &self,
        filter: Option<Filter>,
        sort: Option<Sort>,
        token: Option<String>,
        page_size: Option<usize>,
        partition_key: Option<String>,
    ) -> StorageResult<PaginatedResponse<T>> {
        self.ensure_open()?;
        ensure_page_size(page_size)?;
        let partition_key = normalize_partition(partition_key);
        let filter = scope_filter::<T>(filter, partition_key.as_deref());
        let token = token.filter(|token| !token.trim().is_empty());

        let Some(size) = page_size else {
            let mut result_set = Vec::new();
            let mut bookmark = token;
            loop {
                let batch = self
                    .find_batch(filter.as_ref(), sort.as_ref(), SCAN_BATCH, bookmark.as_deref())
                    .await?;
                let exhausted = batch.docs.len() < SCAN_BATCH;
                result_set.extend(batch.docs.into_iter().map(|doc| doc.body));
                if exhausted || batch.bookmark.is_none() {
                    break;
                }
                bookmark = batch.bookmark;
            }
            return Ok(PaginatedResponse::new(result_set, None));
        };

        let batch = self
            .find_batch(filter.as_ref(), sort.as_ref(), size, token.as_deref())
            .await?;
        let mut continuation_token = None;
        if batch.docs.len() == size {
            if let Some(bookmark) = batch.bookmark {
                // Bookmarks are always returned; only hand one out if it leads somewhere.
                let peek = self
                    .find_batch(filter.as_ref(), sort.as_ref(), 1, Some(&bookmark))
                    .await?;
                if !peek.docs.is_empty() {
                    continuation_token = Some(bookmark);
                }
            }
        }

        let result_set: Vec<T> = batch.docs.into_iter().map(|doc| doc.body).collect();
        debug!(
            returned = result_set.len(),
            has_more = continuation_token.is_some(),
            "CouchDB query served"
        );
        Ok(PaginatedResponse::new(result_set, continuation_token))
    }

    async fn insert(&self, mut entity: T, partition_key: Option<String>) -> StorageResult<String> {
        self.ensure_open()?;
        let partition_key = normalize_partition(partition_key);
        ensure_partition(&entity, partition_key.as_deref())?;
        if entity.id().trim().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        }
        let id = entity.id().to_owned();
        let document = CouchDocument {
            id: doc_id(&self.collection, &id),
            rev: None,
            body: entity,
        };

        match self.put_document(&document).await? {
            Some(_) => {
                debug!(%id, "document inserted into CouchDB");
                Ok(id)
            }
            None => Err(StorageError::Conflict { id }),
        }
    }

    async fn replace(
        &self,
        id: String,
        mut entity: T,
        partition_key: Option<String>,
        etag: Option<String>,
    ) -> StorageResult<String> {
        self.ensure_open()?;
        let partition_key = normalize_partition(partition_key);
        ensure_partition(&entity, partition_key.as_deref())?;
        entity.set_id(id.clone());

        let key = doc_id(&self.collection, &id);
        let Some(current) = self
            .current_revision(&key, partition_key.as_deref())
            .await?
        else {
            return Err(StorageError::NotFound { id });
        };
        let document = CouchDocument {
            id: key,
            rev: Some(etag.unwrap_or(current)),
            body: entity,
        };

        match self.put_document(&document).await? {
            Some(rev) => {
                debug!(%id, %rev, "document replaced in CouchDB");
                Ok(rev)
            }
            None => Err(StorageError::Conflict { id }),
        }
    }

    async fn remove(&self, id: String, partition_key: Option<String>) -> StorageResult<bool> {
        self.ensure_open()?;
        let partition_key = normalize_partition(partition_key);
        let key = doc_id(&self.collection, &id);
        let Some(rev) = self
            .current_revision(&key, partition_key.as_deref())
            .await?
        else {
            debug!(%id, "nothing to delete");
            return Ok(false);
        };

        let response = self
            .request(Method::DELETE, &key)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: key.clone(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::CONFLICT => Err(StorageError::Conflict { id }),
            other => Err(CouchDaoError::RequestStatus {
                path: key,
                status: other,
            }
            .into()),
        }
    }
}

/// Base URL with the database appended as a single encoded segment.
fn database_url(base_url: &str, database: &str) -> CouchResult<Url> {
    let invalid = |reason: String| CouchDaoError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };
    let mut url = Url::parse(base_url.trim()).map_err(|err| invalid(err.to_string()))?;
    url.path_segments_mut()
        .map_err(|()| invalid("URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .push(database);
    Ok(url)
}

impl<T: Document> DatabaseRepository<T> for CouchRepository<T> {
    fn get_all(
        &self,
        filter: Option<Filter>,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<T>>> {
        let store = self.clone();
        Box::pin(async move {
            let page = store.query(filter, None, None, None, partition_key).await?;
            Ok(page.result_set)
        })
    }

    fn get_all_by_query(
        &self,
        query: String,
        token: Option<String>,
        page_size: Option<usize>,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<PaginatedResponse<T>>> {
        let store = self.clone();
        Box::pin(async move {
            let parsed = ParsedQuery::parse(&query)?;
            store
                .query(parsed.filter, parsed.sort, token, page_size, partition_key)
                .await
        })
    }

    fn get_page(
        &self,
        request: PageRequest,
    ) -> BoxFuture<'static, StorageResult<PaginatedResponse<T>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .query(
                    request.filter,
                    request.sort,
                    request.token,
                    Some(request.page_size),
                    request.partition_key,
                )
                .await
        })
    }

    fn find_by_id(
        &self,
        id: String,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<T>>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_open()?;
            let partition_key = normalize_partition(partition_key);
            let key = doc_id(&store.collection, &id);
            let document = store.get_document::<CouchDocument<T>>(&key).await?;
            Ok(document
                .filter(|document| {
                    partition_key
                        .as_deref()
                        .is_none_or(|key| document.body.partition_key() == key)
                })
                .map(|document| Versioned {
                    entity: document.body,
                    etag: document.rev.unwrap_or_default(),
                }))
        })
    }

    fn add(
        &self,
        entity: T,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move { store.insert(entity, partition_key).await })
    }

    fn update(
        &self,
        id: String,
        entity: T,
        partition_key: Option<String>,
        etag: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move { store.replace(id, entity, partition_key, etag).await })
    }

    fn delete(
        &self,
        id: String,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.remove(id, partition_key).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_open()?;
            let url = store.database_url.clone();
            let response = store
                .authorize(store.client.get(url.clone()))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.to_string(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url.to_string(),
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn close(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}
