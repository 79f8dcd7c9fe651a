//! Process-local document collection honouring the full repository contract.

use std::{marker::PhantomData, sync::Arc};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    query::{Filter, ParsedQuery, Sort, compare_values, resolve_path},
    repository::{
        DatabaseRepository, Document, OffsetToken, PageRequest, PaginatedResponse, Versioned,
        ensure_page_size, ensure_partition, new_etag, normalize_partition, scope_filter,
    },
    storage::{StorageError, StorageResult},
};

/// In-memory [`DatabaseRepository`] keeping documents as JSON in insertion order.
#[derive(Clone)]
pub struct MemoryRepository<T> {
    inner: Arc<RwLock<MemoryCollection>>,
    _entity: PhantomData<fn() -> T>,
}

#[derive(Default)]
struct MemoryCollection {
    documents: IndexMap<String, StoredDocument>,
    closed: bool,
}

struct StoredDocument {
    body: Value,
    etag: String,
}

impl MemoryCollection {
    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<T: Document> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> MemoryRepository<T> {
    /// Empty collection.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryCollection::default())),
            _entity: PhantomData,
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
        ensure_page_size(page_size)?;
        let start = OffsetToken::decode(token.as_deref())?;
        let partition_key = normalize_partition(partition_key);
        let filter = scope_filter::<T>(filter, partition_key.as_deref());

        let guard = self.inner.read().await;
        guard.ensure_open()?;

        let mut matching: Vec<(&String, &Value)> = guard
            .documents
            .iter()
            .filter(|(_, stored)| {
                filter
                    .as_ref()
                    .is_none_or(|filter| filter.matches(&stored.body))
            })
            .map(|(id, stored)| (id, &stored.body))
            .collect();

        if let Some(sort) = &sort {
            matching.sort_by(|(left_id, left), (right_id, right)| {
                let ordering = compare_values(
                    resolve_path(left, sort.path()),
                    resolve_path(right, sort.path()),
                );
                sort.direction()
                    .apply(ordering)
                    .then_with(|| left_id.cmp(right_id))
            });
        }

        let remaining = matching.into_iter().skip(start.offset());
        let (page, has_more): (Vec<_>, bool) = match page_size {
            Some(size) => {
                let mut page: Vec<_> = remaining.take(size.saturating_add(1)).collect();
                let has_more = page.len() > size;
                page.truncate(size);
                (page, has_more)
            }
            None => (remaining.collect(), false),
        };

        let result_set = page
            .into_iter()
            .map(|(_, body)| decode::<T>(body))
            .collect::<StorageResult<Vec<_>>>()?;
        let continuation_token = start.next(result_set.len(), has_more);

        debug!(
            returned = result_set.len(),
            has_more, "memory collection query served"
        );
        Ok(PaginatedResponse::new(result_set, continuation_token))
    }
}

fn decode<T: Document>(body: &Value) -> StorageResult<T> {
    serde_json::from_value(body.clone()).map_err(|source| {
        StorageError::unavailable("stored document could not be decoded".into(), source)
    })
}

fn encode<T: Document>(entity: &T) -> StorageResult<Value> {
    serde_json::to_value(entity).map_err(|source| {
        StorageError::unavailable("document could not be encoded".into(), source)
    })
}

fn in_partition<T: Document>(body: &Value, partition_key: Option<&str>) -> bool {
    partition_key.is_none_or(|key| {
        resolve_path(body, T::PARTITION_KEY_PATH).and_then(Value::as_str) == Some(key)
    })
}

impl<T: Document> DatabaseRepository<T> for MemoryRepository<T> {
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
            let partition_key = normalize_partition(partition_key);
            let guard = store.inner.read().await;
            guard.ensure_open()?;
            match guard.documents.get(&id) {
                Some(stored) if in_partition::<T>(&stored.body, partition_key.as_deref()) => {
                    Ok(Some(Versioned {
                        entity: decode(&stored.body)?,
                        etag: stored.etag.clone(),
                    }))
                }
                _ => Ok(None),
            }
        })
    }

    fn add(
        &self,
        mut entity: T,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let partition_key = normalize_partition(partition_key);
            ensure_partition(&entity, partition_key.as_deref())?;
            if entity.id().trim().is_empty() {
                entity.set_id(Uuid::new_v4().to_string());
            }
            let id = entity.id().to_owned();
            let body = encode(&entity)?;

            let mut guard = store.inner.write().await;
            guard.ensure_open()?;
            if guard.documents.contains_key(&id) {
                return Err(StorageError::Conflict { id });
            }
            guard.documents.insert(
                id.clone(),
                StoredDocument {
                    body,
                    etag: new_etag(),
                },
            );
            debug!(%id, "document inserted into memory collection");
            Ok(id)
        })
    }

    fn update(
        &self,
        id: String,
        mut entity: T,
        partition_key: Option<String>,
        etag: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>> {
        let store = self.clone();
        Box::pin(async move {
            let partition_key = normalize_partition(partition_key);
            ensure_partition(&entity, partition_key.as_deref())?;
            entity.set_id(id.clone());
            let body = encode(&entity)?;

            let mut guard = store.inner.write().await;
            guard.ensure_open()?;
            let Some(stored) = guard
                .documents
                .get_mut(&id)
                .filter(|stored| in_partition::<T>(&stored.body, partition_key.as_deref()))
            else {
                return Err(StorageError::NotFound { id });
            };
            if etag.is_some_and(|expected| expected != stored.etag) {
                return Err(StorageError::Conflict { id });
            }

            stored.body = body;
            stored.etag = new_etag();
            debug!(%id, "document replaced in memory collection");
            Ok(stored.etag.clone())
        })
    }

    fn delete(
        &self,
        id: String,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let partition_key = normalize_partition(partition_key);
            let mut guard = store.inner.write().await;
            guard.ensure_open()?;
            let found = guard
                .documents
                .get(&id)
                .is_some_and(|stored| in_partition::<T>(&stored.body, partition_key.as_deref()));
            if !found {
                debug!(%id, "nothing to delete");
                return Ok(false);
            }
            guard.documents.shift_remove(&id);
            Ok(true)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.read().await.ensure_open() })
    }

    fn close(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.closed = true;
            Ok(())
        })
    }
}
