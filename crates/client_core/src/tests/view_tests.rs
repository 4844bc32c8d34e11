use async_trait::async_trait;
use shared::{
    domain::LeadStatus,
    protocol::{Lead, Page},
};

use super::*;
use crate::test_support::{lead, qualified_leads};

struct FixedSource(Result<Page<Lead>, CoreError>);

#[async_trait]
impl PaginatedSource<Lead> for FixedSource {
    async fn fetch_page(&self, _page: u32, _size: u32) -> Result<Page<Lead>, CoreError> {
        self.0.clone()
    }
}

#[test]
fn changing_query_or_filter_returns_to_first_page() {
    let mut view = ListView::new(10).expect("view");
    view.replace_items(qualified_leads(30));
    view.set_page(2);
    assert_eq!(view.current().items.len(), 10);
    assert_eq!(view.page_index(), 2);

    view.set_query("lead");
    assert_eq!(view.page_index(), 0);

    view.set_page(2);
    view.set_status_filter("QUALIFIED");
    assert_eq!(view.page_index(), 0);
}

#[test]
fn page_past_the_end_resets_after_data_shrinks() {
    let mut view = ListView::new(5).expect("view");
    view.replace_items(qualified_leads(12));
    assert!(view.next_page());
    assert!(view.next_page());
    assert!(!view.next_page());
    assert_eq!(view.page_index(), 2);

    view.replace_items(qualified_leads(4));
    assert_eq!(view.page_index(), 0);
    assert_eq!(view.current().items.len(), 4);
    assert!(!view.prev_page());
}

#[test]
fn zero_page_size_is_rejected() {
    assert!(ListView::<Lead>::new(0).is_err());
}

#[tokio::test]
async fn refresh_replaces_snapshot_and_keeps_it_on_error() {
    let mut view = ListView::new(10).expect("view");
    let mut fresh = qualified_leads(3);
    fresh.push(lead(4, "Lost cause", LeadStatus::Lost));
    let source = FixedSource(Ok(Page {
        total_pages: 1,
        total_elements: fresh.len() as u64,
        items: fresh,
    }));
    view.refresh(&source, 50).await.expect("refresh");
    assert_eq!(view.items().len(), 4);

    view.set_status_filter("LOST");
    let page = view.current();
    assert_eq!(page.total_matches, 1);
    assert_eq!(page.items[0].name, "Lost cause");

    let failing = FixedSource(Err(CoreError::NetworkFailure("offline".into())));
    let err = view.refresh(&failing, 50).await.expect_err("offline");
    assert!(matches!(err, CoreError::NetworkFailure(_)));
    assert_eq!(view.items().len(), 4);
}

struct PagedSource(Vec<Lead>);

#[async_trait]
impl PaginatedSource<Lead> for PagedSource {
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<Lead>, CoreError> {
        Ok(Page::from_slice(self.0.clone(), page, size))
    }
}

#[tokio::test]
async fn concurrent_refresh_collects_every_page_in_order() {
    let mut view = ListView::new(10)
        .expect("view")
        .with_fetch_mode(FetchMode::Concurrent);
    view.refresh(&PagedSource(qualified_leads(23)), 5)
        .await
        .expect("refresh");

    let ids: Vec<i64> = view.items().iter().map(|lead| lead.id.0).collect();
    assert_eq!(ids, (1..=23).collect::<Vec<i64>>());
    assert_eq!(view.total_pages(), 3);
}
