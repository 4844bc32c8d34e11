//! Status filter, free-text search and re-pagination over an in-memory
//! collection. Pure and synchronous.

use shared::protocol::{Client, Lead, Task};
use thiserror::Error;

/// Per-entity view used by the filter.
pub trait Searchable {
    fn record_id(&self) -> i64;
    fn status_label(&self) -> &'static str;
    /// Free-text fields, in no particular order.
    fn search_fields(&self) -> Vec<&str>;
}

impl Searchable for Lead {
    fn record_id(&self) -> i64 {
        self.id.0
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.name.as_str(),
            self.email.as_str(),
            self.phone.as_str(),
            self.company.as_str(),
            self.assigned_to_name.as_str(),
        ];
        fields.extend(self.assigned_to_position.as_deref());
        fields.extend(self.assigned_to_email.as_deref());
        fields
    }
}

impl Searchable for Client {
    fn record_id(&self) -> i64 {
        self.id.0
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.name.as_str(),
            self.email.as_str(),
            self.phone.as_str(),
            self.company.as_str(),
            self.address.as_str(),
            self.assigned_to_name.as_str(),
        ]
    }
}

impl Searchable for Task {
    fn record_id(&self) -> i64 {
        self.id.0
    }

    fn status_label(&self) -> &'static str {
        self.status.as_str()
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.title.as_str(),
            self.description.as_str(),
            self.assigned_to_name.as_str(),
            self.assigned_by_name.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageView<T> {
    pub items: Vec<T>,
    /// Never less than one.
    pub total_pages: usize,
    pub total_matches: usize,
}

impl<T> PageView<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_pages: 1,
            total_matches: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PaginateError {
    #[error("page size must be positive")]
    InvalidPageSize,
}

/// `status_filter` and `query` are ignored when empty.
pub fn paginate<T>(
    collection: &[T],
    status_filter: &str,
    query: &str,
    page_index: usize,
    page_size: usize,
) -> Result<PageView<T>, PaginateError>
where
    T: Searchable + Clone,
{
    paginate_by(
        collection,
        |item: &T| status_filter.is_empty() || item.status_label() == status_filter,
        query,
        page_index,
        page_size,
    )
}

/// Same as [`paginate`] with an arbitrary predicate in place of the status
/// filter.
pub fn paginate_by<T, P>(
    collection: &[T],
    predicate: P,
    query: &str,
    page_index: usize,
    page_size: usize,
) -> Result<PageView<T>, PaginateError>
where
    T: Searchable + Clone,
    P: Fn(&T) -> bool,
{
    if page_size == 0 {
        return Err(PaginateError::InvalidPageSize);
    }

    let needle = query.trim().to_lowercase();
    let matches: Vec<&T> = collection
        .iter()
        .filter(|item| predicate(item))
        .filter(|item| needle.is_empty() || matches_query(*item, &needle))
        .collect();

    let total_matches = matches.len();
    let total_pages = total_matches.div_ceil(page_size).max(1);
    let items = matches
        .into_iter()
        .skip(page_index.saturating_mul(page_size))
        .take(page_size)
        .cloned()
        .collect();

    Ok(PageView {
        items,
        total_pages,
        total_matches,
    })
}

/// `needle` must already be lowercase.
pub fn matches_query<T: Searchable + ?Sized>(item: &T, needle: &str) -> bool {
    item.record_id().to_string().contains(needle)
        || item
            .search_fields()
            .into_iter()
            .any(|field| field.to_lowercase().contains(needle))
}

#[cfg(test)]
#[path = "tests/paginate_tests.rs"]
mod tests;
