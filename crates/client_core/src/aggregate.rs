//! Collects every page of a paginated backend collection into memory.

use async_trait::async_trait;
use futures::future::try_join_all;
use shared::protocol::Page;
use tracing::debug;

use crate::error::CoreError;

#[async_trait]
pub trait PaginatedSource<T>: Send + Sync {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<T>, CoreError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// One request at a time; never requests a page past the declared count.
    #[default]
    Sequential,
    /// Page 0 first, then every remaining declared page at once.
    Concurrent,
}

pub async fn fetch_all<T, S>(source: &S, page_size: u32) -> Result<Vec<T>, CoreError>
where
    T: Send,
    S: PaginatedSource<T> + ?Sized,
{
    fetch_all_with(source, page_size, FetchMode::Sequential).await
}

/// Concatenates pages in server order. Any failing page fails the whole
/// fetch; callers never see a partial collection.
pub async fn fetch_all_with<T, S>(
    source: &S,
    page_size: u32,
    mode: FetchMode,
) -> Result<Vec<T>, CoreError>
where
    T: Send,
    S: PaginatedSource<T> + ?Sized,
{
    if page_size == 0 {
        return Err(CoreError::InvalidInput(
            "page size must be positive".to_string(),
        ));
    }

    let first = source.fetch_page(0, page_size).await?;
    let declared = first.total_pages;
    let mut items = first.items;

    match mode {
        FetchMode::Sequential => {
            let mut total_pages = declared;
            let mut page = 1;
            while page < total_pages {
                let next = source.fetch_page(page, page_size).await?;
                if next.total_pages < total_pages {
                    debug!(
                        page,
                        was = total_pages,
                        now = next.total_pages,
                        "collection shrank during fetch"
                    );
                }
                total_pages = next.total_pages;
                items.extend(next.items);
                page += 1;
            }
            debug!(pages = page, items = items.len(), "fetched collection");
        }
        FetchMode::Concurrent => {
            let rest = try_join_all((1..declared).map(|page| source.fetch_page(page, page_size)))
                .await?;
            for page in rest {
                items.extend(page.items);
            }
            debug!(pages = declared, items = items.len(), "fetched collection");
        }
    }
    Ok(items)
}

#[cfg(test)]
#[path = "tests/aggregate_tests.rs"]
mod tests;
