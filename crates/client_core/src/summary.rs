//! Dashboard data. Each figure comes from an independent request; one failing
//! leaves its field empty without affecting the others.

use shared::{
    domain::TaskStatus,
    protocol::{AnalyticsSummary, Lead, TaskListScope},
};
use tracing::warn;

use crate::{
    aggregate::{fetch_all, PaginatedSource},
    error::CoreError,
    http::CrmClient,
    session::Session,
};

pub const RECENT_LEADS: u32 = 5;
const TASK_FETCH_PAGE: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSummary {
    pub analytics: Option<AnalyticsSummary>,
    /// Only loaded for managers and admins.
    pub pending_conversions: Option<u64>,
    pub open_tasks: Option<usize>,
    pub recent_leads: Option<Vec<Lead>>,
}

pub async fn load_dashboard(client: &CrmClient, session: &Session) -> DashboardSummary {
    let reviews = session.role().is_manager_or_admin();
    let pending_leads = client.pending_leads();
    let leads = client.leads();
    let (analytics, pending, open_tasks, recent) = tokio::join!(
        client.analytics(),
        async {
            if reviews {
                Some(pending_leads.fetch_page(0, 1).await)
            } else {
                None
            }
        },
        async {
            let tasks = fetch_all(&client.tasks(TaskListScope::Mine), TASK_FETCH_PAGE).await?;
            Ok::<_, CoreError>(
                tasks
                    .iter()
                    .filter(|task| task.status != TaskStatus::Done)
                    .count(),
            )
        },
        leads.fetch_page(0, RECENT_LEADS),
    );

    DashboardSummary {
        analytics: fallback("analytics", analytics),
        pending_conversions: pending
            .and_then(|page| fallback("pending_conversions", page))
            .map(|page| page.total_elements),
        open_tasks: fallback("open_tasks", open_tasks),
        recent_leads: fallback("recent_leads", recent).map(|page| page.items),
    }
}

fn fallback<T>(field: &'static str, result: Result<T, CoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(field, %error, "dashboard figure unavailable");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/summary_tests.rs"]
mod tests;
