//! Keyset pagination helpers
//!
//! Picker lists are ordered newest first with ties broken by descending
//! picker id, so a page boundary is fully described by the last item's
//! `(date_taken_ms, picker_id)`.

use serde::{Deserialize, Serialize};

/// Position after which the next page starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageCursor {
    pub date_taken_ms: i64,
    pub picker_id: i64,
}

impl PageCursor {
    pub fn new(date_taken_ms: i64, picker_id: i64) -> Self {
        Self {
            date_taken_ms,
            picker_id,
        }
    }

    /// Whether an item at `(date_taken_ms, picker_id)` sorts after this cursor.
    pub fn precedes(&self, date_taken_ms: i64, picker_id: i64) -> bool {
        date_taken_ms < self.date_taken_ms
            || (date_taken_ms == self.date_taken_ms && picker_id < self.picker_id)
    }
}

/// Pagination request parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Start after this position; `None` for the first page
    pub cursor: Option<PageCursor>,
    pub page_size: usize,
}

impl PageRequest {
    /// First page.
    ///
    /// ```
    /// use core_provider::pagination::PageRequest;
    ///
    /// let request = PageRequest::first(20);
    /// assert!(request.cursor.is_none());
    /// assert_eq!(request.page_size, 20);
    /// ```
    pub fn first(page_size: usize) -> Self {
        Self {
            cursor: None,
            page_size,
        }
    }

    pub fn after(cursor: PageCursor, page_size: usize) -> Self {
        Self {
            cursor: Some(cursor),
            page_size,
        }
    }

    /// The SQL LIMIT value
    pub fn limit(&self) -> i64 {
        i64::try_from(self.page_size).unwrap_or(i64::MAX)
    }
}

/// One page of items plus the cursor for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when no further page exists
    pub next: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }

    /// Build a page, deriving `next` from the last item when the page is full.
    ///
    /// ```
    /// use core_provider::pagination::{Page, PageCursor};
    ///
    /// let page = Page::from_items(vec![(30, 3), (20, 2)], 2, |&(d, p)| PageCursor::new(d, p));
    /// assert_eq!(page.next, Some(PageCursor::new(20, 2)));
    ///
    /// let short = Page::from_items(vec![(30, 3)], 2, |&(d, p)| PageCursor::new(d, p));
    /// assert_eq!(short.next, None);
    /// ```
    pub fn from_items<F>(items: Vec<T>, page_size: usize, cursor_of: F) -> Self
    where
        F: Fn(&T) -> PageCursor,
    {
        let next = if page_size > 0 && items.len() >= page_size {
            items.last().map(cursor_of)
        } else {
            None
        };
        Self { items, next }
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Map the items to a different type
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next: self.next,
        }
    }
}

/// Result of one incremental sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPage<T> {
    pub items: Vec<T>,
    /// Token for the next pass; `None` when the provider has no more data
    pub next_resume_key: Option<String>,
    /// Rows dropped because they were malformed
    pub skipped: usize,
}
