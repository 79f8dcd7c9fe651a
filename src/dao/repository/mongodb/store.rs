use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoDocument, id_selector, sort_document, to_mongo_filter},
};
use crate::dao::{
    query::{Filter, ParsedQuery, Sort, SortableField},
    repository::{
        DatabaseRepository, Document, OffsetToken, PageRequest, PaginatedResponse, Versioned,
        ensure_page_size, ensure_partition, new_etag, normalize_partition, scope_filter,
    },
    storage::{StorageError, StorageResult},
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// [`DatabaseRepository`] backed by a MongoDB collection.
pub struct MongoRepository<T> {
    inner: Arc<MongoInner>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for MongoRepository<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _entity: PhantomData,
        }
    }
}

struct MongoInner {
    client: Client,
    database: Database,
    collection_name: String,
    closed: AtomicBool,
}

impl<T: Document> MongoRepository<T> {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(
            &config.options,
            &config.database_name,
            config.connect_attempts,
        )
        .await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                client,
                database,
                collection_name: config.collection_name,
                closed: AtomicBool::new(false),
            }),
            _entity: PhantomData,
        };
        store.ensure_indexes().await?;
        info!(
            database = %config.database_name,
            collection = %store.inner.collection_name,
            "MongoDB repository ready"
        );
        Ok(store)
    }

    /// One ascending index for the partition key and each sortable field.
    async fn ensure_indexes(&self) -> MongoResult<()> {
        let mut paths = vec![T::PARTITION_KEY_PATH];
        for field in T::SortField::all() {
            if !paths.contains(&field.path()) {
                paths.push(field.path());
            }
        }

        let collection = self.collection();
        for path in paths {
            let index_name = format!("{path}_idx");
            let mut keys = mongodb::bson::Document::new();
            keys.insert(path, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(index_name.clone())).build())
                .build();
            collection
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: self.inner.collection_name.clone(),
                    index: index_name,
                    source,
                })?;
        }
        Ok(())
    }

    fn collection(&self) -> Collection<MongoDocument<T>> {
        self.inner
            .database
            .collection::<MongoDocument<T>>(&self.inner.collection_name)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed)
        } else {
            Ok(())
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
        let start = OffsetToken::decode(token.as_deref())?;
        let partition_key = normalize_partition(partition_key);
        let selector = scope_filter::<T>(filter, partition_key.as_deref())
            .map(|filter| to_mongo_filter(&filter))
            .unwrap_or_default();

        let collection = self.collection();
        let mut find = collection
            .find(selector)
            .sort(sort_document(sort.as_ref()))
            .skip(start.offset() as u64);
        if let Some(size) = page_size {
            find = find.limit(i64::try_from(size.saturating_add(1)).unwrap_or(i64::MAX));
        }

        let query_error = |source| MongoDaoError::Query {
            collection: self.inner.collection_name.clone(),
            source,
        };
        let cursor = find.await.map_err(query_error)?;
        let mut documents: Vec<MongoDocument<T>> =
            cursor.try_collect().await.map_err(query_error)?;

        let has_more = page_size.is_some_and(|size| documents.len() > size);
        if let Some(size) = page_size {
            documents.truncate(size);
        }
        let result_set: Vec<T> = documents.into_iter().map(|doc| doc.body).collect();
        let continuation_token = start.next(result_set.len(), has_more);

        debug!(
            returned = result_set.len(),
            has_more, "MongoDB query served"
        );
        Ok(PaginatedResponse::new(result_set, continuation_token))
    }

    async fn find_document(
        &self,
        id: &str,
        partition_key: Option<&str>,
    ) -> StorageResult<Option<MongoDocument<T>>> {
        let selector = id_selector(
            id,
            partition_key.map(|key| (T::PARTITION_KEY_PATH, key)),
        );
        let document = self
            .collection()
            .find_one(selector)
            .await
            .map_err(|source| MongoDaoError::Load {
                id: id.to_owned(),
                source,
            })?;
        Ok(document)
    }

    async fn insert(&self, mut entity: T, partition_key: Option<String>) -> StorageResult<String> {
        self.ensure_open()?;
        let partition_key = normalize_partition(partition_key);
        ensure_partition(&entity, partition_key.as_deref())?;
        if entity.id().trim().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        }
        let id = entity.id().to_owned();
        let document = MongoDocument {
            key: id.clone(),
            etag: new_etag(),
            body: entity,
        };

        match self.collection().insert_one(&document).await {
            Ok(_) => {
                debug!(%id, "document inserted into MongoDB");
                Ok(id)
            }
            Err(err) if is_duplicate_key(&err) => Err(StorageError::Conflict { id }),
            Err(source) => Err(MongoDaoError::Insert { id, source }.into()),
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

        let mut selector = id_selector(
            &id,
            partition_key
                .as_deref()
                .map(|key| (T::PARTITION_KEY_PATH, key)),
        );
        if let Some(etag) = &etag {
            selector.insert("_etag", etag.as_str());
        }
        let replacement = MongoDocument {
            key: id.clone(),
            etag: new_etag(),
            body: entity,
        };

        let result = self
            .collection()
            .replace_one(selector, &replacement)
            .await
            .map_err(|source| MongoDaoError::Replace {
                id: id.clone(),
                source,
            })?;

        if result.matched_count == 0 {
            // Either the document is gone or its etag moved on.
            return match self.find_document(&id, partition_key.as_deref()).await? {
                Some(_) => Err(StorageError::Conflict { id }),
                None => Err(StorageError::NotFound { id }),
            };
        }
        debug!(%id, "document replaced in MongoDB");
        Ok(replacement.etag)
    }

    async fn remove(&self, id: String, partition_key: Option<String>) -> StorageResult<bool> {
        self.ensure_open()?;
        let partition_key = normalize_partition(partition_key);
        if self
            .find_document(&id, partition_key.as_deref())
            .await?
            .is_none()
        {
            debug!(%id, "nothing to delete");
            return Ok(false);
        }

        let result = self
            .collection()
            .delete_one(doc! { "_id": id.as_str() })
            .await
            .map_err(|source| MongoDaoError::Delete {
                id: id.clone(),
                source,
            })?;
        Ok(result.deleted_count > 0)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl<T: Document> DatabaseRepository<T> for MongoRepository<T> {
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
            let document = store.find_document(&id, partition_key.as_deref()).await?;
            Ok(document.map(|document| Versioned {
                entity: document.body,
                etag: document.etag,
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
            store
                .inner
                .database
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|source| MongoDaoError::HealthPing { source })?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if !store.inner.closed.swap(true, Ordering::AcqRel) {
                store.inner.client.clone().shutdown().await;
                info!("MongoDB client shut down");
            }
            Ok(())
        })
    }
}
