use tracing::debug;

use crate::{
    aggregate::{fetch_all_with, FetchMode, PaginatedSource},
    error::CoreError,
    paginate::{paginate, PageView, PaginateError, Searchable},
};

/// State of one list screen: the fetched snapshot plus filter, query and page.
///
/// The snapshot is owned by the view; nothing else mutates it. Changing the
/// query or the status filter always returns to the first page.
#[derive(Debug, Clone)]
pub struct ListView<T> {
    raw: Vec<T>,
    status_filter: String,
    query: String,
    page_index: usize,
    page_size: usize,
    fetch_mode: FetchMode,
}

impl<T> ListView<T>
where
    T: Searchable + Clone + Send,
{
    pub fn new(page_size: usize) -> Result<Self, PaginateError> {
        if page_size == 0 {
            return Err(PaginateError::InvalidPageSize);
        }
        Ok(Self {
            raw: Vec::new(),
            status_filter: String::new(),
            query: String::new(),
            page_index: 0,
            page_size,
            fetch_mode: FetchMode::Sequential,
        })
    }

    pub fn with_fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    /// Re-fetches the whole collection. On error the previous snapshot stays.
    pub async fn refresh<S>(&mut self, source: &S, fetch_page_size: u32) -> Result<(), CoreError>
    where
        S: PaginatedSource<T> + ?Sized,
    {
        let items = fetch_all_with(source, fetch_page_size, self.fetch_mode).await?;
        debug!(items = items.len(), "list view refreshed");
        self.replace_items(items);
        Ok(())
    }

    pub fn replace_items(&mut self, items: Vec<T>) {
        self.raw = items;
        self.clamp_page();
    }

    pub fn items(&self) -> &[T] {
        &self.raw
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn status_filter(&self) -> &str {
        &self.status_filter
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.page_index = 0;
    }

    pub fn set_status_filter(&mut self, status_filter: impl Into<String>) {
        self.status_filter = status_filter.into();
        self.page_index = 0;
    }

    /// Out-of-range pages render empty; see [`ListView::current`].
    pub fn set_page(&mut self, page_index: usize) {
        self.page_index = page_index;
    }

    pub fn next_page(&mut self) -> bool {
        if self.page_index + 1 < self.total_pages() {
            self.page_index += 1;
            return true;
        }
        false
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page_index > 0 {
            self.page_index -= 1;
            return true;
        }
        false
    }

    pub fn total_pages(&self) -> usize {
        self.render(0).total_pages
    }

    /// The visible page. Page count is recomputed from the current filtered
    /// collection first; an index past the end goes back to page 0.
    pub fn current(&mut self) -> PageView<T> {
        self.clamp_page();
        self.render(self.page_index)
    }

    fn clamp_page(&mut self) {
        if self.page_index >= self.total_pages() {
            self.page_index = 0;
        }
    }

    fn render(&self, page_index: usize) -> PageView<T> {
        paginate(
            &self.raw,
            &self.status_filter,
            &self.query,
            page_index,
            self.page_size,
        )
        .unwrap_or_else(|_| PageView::empty())
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
