//! Cursor-paginated traversal with a cycle guard
//!
//! Each `next_page` call issues exactly one query carrying the current
//! cursor. Traversal ends when the server reports no next page, returns no
//! cursor, repeats a cursor already seen in this traversal, or the page
//! limit is reached. A fetch failure ends it immediately.

use crate::api::types::Page;
use crate::api::{default_variables, QueryTransport};
use crate::error::TraversalError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::marker::PhantomData;

/// Why a traversal stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Exhausted,
    MissingCursor,
    CycleDetected,
    PageLimit,
    FetchFailed,
}

#[derive(Debug, Clone)]
pub struct TraversalRequest {
    pub query: String,
    pub filter: Value,
    pub page_size: usize,
    pub sort: Value,
    pub max_pages: usize,
}

impl TraversalRequest {
    pub fn new(query: impl Into<String>, filter: Value, page_size: usize, max_pages: usize) -> Self {
        Self {
            query: query.into(),
            filter,
            page_size,
            sort: json!([]),
            max_pages,
        }
    }
}

pub struct CursorTraversal<'a, T> {
    transport: &'a dyn QueryTransport,
    request: TraversalRequest,
    cursor: Option<String>,
    seen: HashSet<String>,
    pages_fetched: usize,
    stopped: Option<StopReason>,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> CursorTraversal<'a, T> {
    pub fn new(transport: &'a dyn QueryTransport, request: TraversalRequest) -> Self {
        Self {
            transport,
            request,
            cursor: None,
            seen: HashSet::new(),
            pages_fetched: 0,
            stopped: None,
            _record: PhantomData,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// `Some` once the traversal has ended
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    fn variables(&self) -> Value {
        let mut variables = default_variables();
        variables["filter"] = self.request.filter.clone();
        variables["first"] = json!(self.request.page_size);
        variables["after"] = json!(self.cursor);
        variables["sort"] = self.request.sort.clone();
        variables
    }

    /// Fetch the next page. `None` once the traversal has stopped; an `Err`
    /// is returned at most once and stops the traversal.
    pub async fn next_page(&mut self) -> Option<Result<Page<T>, TraversalError>> {
        if self.stopped.is_some() {
            return None;
        }

        if self.pages_fetched >= self.request.max_pages {
            log::warn!(
                "⚠️  {} traversal hit page limit ({}), stopping",
                self.request.query,
                self.request.max_pages
            );
            self.stopped = Some(StopReason::PageLimit);
            return None;
        }

        let page_index = self.pages_fetched;
        let result = match self.transport.query(&self.request.query, self.variables()).await {
            Ok(data) => Page::from_data(data),
            Err(e) => Err(e),
        };
        self.pages_fetched += 1;

        match result {
            Ok(page) => {
                self.advance(&page);
                Some(Ok(page))
            }
            Err(source) => {
                self.stopped = Some(StopReason::FetchFailed);
                Some(Err(TraversalError::FetchFailed {
                    page: page_index,
                    source,
                }))
            }
        }
    }

    fn advance(&mut self, page: &Page<T>) {
        if !page.has_next {
            self.stopped = Some(StopReason::Exhausted);
            return;
        }

        let Some(end_cursor) = page.end_cursor.clone() else {
            self.stopped = Some(StopReason::MissingCursor);
            return;
        };

        if !self.seen.insert(end_cursor.clone()) {
            log::warn!(
                "⚠️  {} returned repeated cursor {} after {} pages, stopping",
                self.request.query,
                end_cursor,
                self.pages_fetched
            );
            self.stopped = Some(StopReason::CycleDetected);
            return;
        }

        self.cursor = Some(end_cursor);
    }
}
