//! Pagination utilities for history queries.
//!
//! ```rust,ignore
//! use cadence_core::pagination::{OffsetPagination, Page};
//!
//! let pagination = OffsetPagination::new(2, 25);
//! let (items, total) = store.list_executions(job_id, &pagination).await?;
//! let page = Page::new(items, pagination.metadata(total));
//! ```

mod offset;

pub use offset::{OffsetPagination, PageMetadata};

use serde::{Deserialize, Serialize};

/// Default page size if not specified.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Minimum page number (1-indexed).
pub const MIN_PAGE_NUMBER: u64 = 1;

/// One page of results with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMetadata,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, meta: PageMetadata) -> Self {
        Self { items, meta }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}
