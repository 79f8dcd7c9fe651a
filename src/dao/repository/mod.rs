//! Generic repository contract over a document collection and its backends.

/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
mod page;

use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use tracing::info;

use crate::{
    config::{AppConfig, Backend},
    dao::{
        query::{Filter, SortableField},
        storage::{StorageError, StorageResult},
    },
};

pub(crate) use self::page::OffsetToken;
pub use self::page::{PageRequest, PaginatedResponse};

/// Entity persisted as a JSON document.
pub trait Document:
    Serialize + DeserializeOwned + Clone + Unpin + Send + Sync + 'static
{
    /// Fields the entity may be ordered by.
    type SortField: SortableField;

    /// JSON field holding the partition key value.
    const PARTITION_KEY_PATH: &'static str;

    /// Identifier, empty until persisted.
    fn id(&self) -> &str;

    /// Assign the identifier chosen by the store or the caller.
    fn set_id(&mut self, id: String);

    /// Value of the partition key field.
    fn partition_key(&self) -> &str;
}

/// An entity together with the optimistic concurrency tag it was read with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The stored entity.
    pub entity: T,
    /// Must be passed back to [`DatabaseRepository::update`] to replace this version.
    pub etag: String,
}

/// CRUD and query access to one collection of `T` documents.
///
/// Filter-based and raw-query reads are alternate paths to the same data.
/// A supplied partition key narrows every operation to documents whose
/// partition field equals it; blank keys are ignored.
pub trait DatabaseRepository<T: Document>: Send + Sync {
    /// Every document matching `filter`, in store order.
    fn get_all(
        &self,
        filter: Option<Filter>,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Vec<T>>>;

    /// Run a raw SQL-like query. Without a page size the remaining results are
    /// returned in a single page.
    fn get_all_by_query(
        &self,
        query: String,
        token: Option<String>,
        page_size: Option<usize>,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<PaginatedResponse<T>>>;

    /// Fetch one filtered, ordered page.
    fn get_page(&self, request: PageRequest)
    -> BoxFuture<'static, StorageResult<PaginatedResponse<T>>>;

    /// Look up one document. `None` when absent or in another partition.
    fn find_by_id(
        &self,
        id: String,
        partition_key: Option<String>,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<T>>>>;

    /// Insert a new document and return its id, generating one when the entity has none.
    fn add(&self, entity: T, partition_key: Option<String>)
    -> BoxFuture<'static, StorageResult<String>>;

    /// Replace the document stored under `id` and return its new etag.
    ///
    /// With an etag the replacement only happens if it still matches the
    /// stored version, otherwise [`StorageError::Conflict`] is returned.
    fn update(
        &self,
        id: String,
        entity: T,
        partition_key: Option<String>,
        etag: Option<String>,
    ) -> BoxFuture<'static, StorageResult<String>>;

    /// Remove the document if present. Returns `false` when there was nothing to delete.
    fn delete(&self, id: String, partition_key: Option<String>)
    -> BoxFuture<'static, StorageResult<bool>>;

    /// Cheap round trip proving the store is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Release the underlying connection. Later calls fail with [`StorageError::Closed`].
    fn close(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Shared handle to a repository backend.
pub type SharedRepository<T> = Arc<dyn DatabaseRepository<T>>;

/// Connect to the backend selected in the configuration.
pub async fn connect<T: Document>(config: &AppConfig) -> StorageResult<SharedRepository<T>> {
    let settings = &config.connection;
    info!(
        backend = %config.backend,
        database = %settings.database,
        collection = %settings.collection,
        "connecting repository"
    );
    match config.backend {
        Backend::Memory => Ok(Arc::new(memory::MemoryRepository::<T>::new())),
        #[cfg(feature = "mongo-store")]
        Backend::Mongo => {
            let mongo_config = mongodb::MongoConfig::from_settings(settings).await?;
            let store = mongodb::MongoRepository::<T>::connect(mongo_config).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "couch-store")]
        Backend::Couch => {
            let couch_config = couchdb::CouchConfig::from_settings(settings);
            let store = couchdb::CouchRepository::<T>::connect(couch_config).await?;
            Ok(Arc::new(store))
        }
        #[allow(unreachable_patterns)]
        other => Err(StorageError::unavailable(
            format!("backend `{other}` is not compiled into this build"),
            std::io::Error::from(std::io::ErrorKind::Unsupported),
        )),
    }
}

/// Stream every page of a request, following continuation tokens until exhausted.
pub fn page_stream<T: Document>(
    repository: SharedRepository<T>,
    request: PageRequest,
) -> impl Stream<Item = StorageResult<Vec<T>>> {
    try_stream! {
        let mut request = request;
        loop {
            let page = repository.get_page(request.clone()).await?;
            let next = page.continuation_token;
            yield page.result_set;
            match next {
                Some(token) => request.token = Some(token),
                None => break,
            }
        }
    }
}

/// Treat blank partition keys as absent.
pub(crate) fn normalize_partition(partition_key: Option<String>) -> Option<String> {
    partition_key.filter(|key| !key.trim().is_empty())
}

/// Narrow a filter to a partition.
pub(crate) fn scope_filter<T: Document>(
    filter: Option<Filter>,
    partition_key: Option<&str>,
) -> Option<Filter> {
    let partition = partition_key.map(|key| Filter::eq(T::PARTITION_KEY_PATH, key));
    match (filter, partition) {
        (Some(filter), Some(partition)) => Some(partition.and(filter)),
        (filter, partition) => filter.or(partition),
    }
}

/// Check an entity against the partition key it is being written under.
pub(crate) fn ensure_partition<T: Document>(
    entity: &T,
    partition_key: Option<&str>,
) -> StorageResult<()> {
    match partition_key {
        Some(supplied) if supplied != entity.partition_key() => {
            Err(StorageError::PartitionMismatch {
                supplied: supplied.to_owned(),
                actual: entity.partition_key().to_owned(),
            })
        }
        _ => Ok(()),
    }
}

/// Reject empty pages before reaching a backend.
pub(crate) fn ensure_page_size(page_size: Option<usize>) -> StorageResult<()> {
    match page_size {
        Some(0) => Err(StorageError::InvalidPageSize),
        _ => Ok(()),
    }
}

/// Fresh optimistic concurrency tag.
pub(crate) fn new_etag() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::Games;

    #[test]
    fn scope_filter_adds_partition_equality() {
        let scoped = scope_filter::<Games>(Some(Filter::eq("year", 2015)), Some("Ubisoft"));
        assert_eq!(
            scoped,
            Some(Filter::eq("name", "Ubisoft").and(Filter::eq("year", 2015)))
        );

        assert_eq!(
            scope_filter::<Games>(None, Some("EA")),
            Some(Filter::eq("name", "EA"))
        );
        assert_eq!(scope_filter::<Games>(None, None), None);
    }

    #[test]
    fn blank_partition_keys_are_ignored() {
        assert_eq!(normalize_partition(Some("  ".into())), None);
        assert_eq!(normalize_partition(Some("EA".into())), Some("EA".into()));
    }

    #[test]
    fn partition_mismatch_is_reported() {
        let games = Games {
            name: "Ubisoft".into(),
            ..Games::default()
        };
        assert!(ensure_partition(&games, Some("Ubisoft")).is_ok());
        assert!(ensure_partition(&games, None).is_ok());
        assert!(matches!(
            ensure_partition(&games, Some("EA")),
            Err(StorageError::PartitionMismatch { .. })
        ));
    }
}
