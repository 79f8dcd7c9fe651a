use serde::{Deserialize, Serialize};

use crate::dao::{
    query::{Filter, Sort, SortDirection, SortableField},
    storage::{StorageError, StorageResult},
};

/// One page of results plus the cursor needed to fetch the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedResponse<T> {
    /// Records on this page, in store order.
    pub result_set: Vec<T>,
    /// Opaque token for the following page; `None` once the results are exhausted.
    pub continuation_token: Option<String>,
}

impl<T> PaginatedResponse<T> {
    /// Page holding `result_set`.
    pub fn new(result_set: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            result_set,
            continuation_token,
        }
    }

    /// Whether another page can be requested.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

/// Parameters of a paged fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    /// Token returned with the previous page, verbatim.
    pub token: Option<String>,
    /// Maximum records on the page; must be at least 1.
    pub page_size: usize,
    /// Predicate every record must match.
    pub filter: Option<Filter>,
    /// Ordering; store order when absent.
    pub sort: Option<Sort>,
    /// Partition to read from; all partitions when absent.
    pub partition_key: Option<String>,
}

impl PageRequest {
    /// First page of `page_size` records with no filter or ordering.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Resume after the page that returned `token`.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Only return records matching `filter`.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Order by `field`.
    pub fn sorted_by<F: SortableField>(mut self, field: F, direction: SortDirection) -> Self {
        self.sort = Some(Sort::by(field, direction));
        self
    }

    /// Restrict the read to one partition.
    pub fn in_partition(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }
}

/// Position-based cursor used by stores without a native continuation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct OffsetToken {
    #[serde(rename = "skip")]
    offset: usize,
}

impl OffsetToken {
    pub(crate) fn new(offset: usize) -> Self {
        Self { offset }
    }

    pub(crate) fn offset(self) -> usize {
        self.offset
    }

    pub(crate) fn encode(self) -> String {
        // Serializing a single integer field cannot fail.
        serde_json::to_string(&self).unwrap_or_else(|_| format!("{{\"skip\":{}}}", self.offset))
    }

    /// Decode an optional token, treating blank input as the first page.
    pub(crate) fn decode(token: Option<&str>) -> StorageResult<Self> {
        match token.map(str::trim).filter(|token| !token.is_empty()) {
            None => Ok(Self::new(0)),
            Some(token) => serde_json::from_str(token).map_err(|_| StorageError::InvalidToken),
        }
    }

    /// Token for the page after one that started here and held `taken` records,
    /// or `None` when nothing remains.
    pub(crate) fn next(self, taken: usize, has_more: bool) -> Option<String> {
        has_more.then(|| Self::new(self.offset.saturating_add(taken)).encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_token_round_trips_through_its_text_form() {
        let token = OffsetToken::new(0).next(5, true).unwrap();
        let decoded = OffsetToken::decode(Some(&token)).unwrap();
        assert_eq!(decoded.offset(), 5);
        assert_eq!(decoded.next(5, false), None);
    }

    #[test]
    fn blank_token_starts_from_the_beginning() {
        assert_eq!(OffsetToken::decode(None).unwrap().offset(), 0);
        assert_eq!(OffsetToken::decode(Some("  ")).unwrap().offset(), 0);
    }

    #[test]
    fn foreign_tokens_are_rejected() {
        assert!(matches!(
            OffsetToken::decode(Some("+RID:abc")),
            Err(StorageError::InvalidToken)
        ));
        assert!(matches!(
            OffsetToken::decode(Some("{\"skip\":-1}")),
            Err(StorageError::InvalidToken)
        ));
    }
}
