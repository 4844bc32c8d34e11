//! Terminal view controller: owns the list views and renders them.

use std::sync::Arc;

use anyhow::Result;
use client_core::{
    debounce::{Debouncer, TokioScheduler},
    session::{Navigator, Route, SessionContext},
    summary::{load_dashboard, DashboardSummary},
    tasks::{paginate_tasks, TaskFilter},
    fetch_all_with, CoreError, CrmClient, FetchMode, ListView, PageView, PaginatedSource, Searchable,
};
use shared::{
    domain::{LeadId, LeadStatus},
    protocol::{Lead, TaskListScope},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::debug;

use crate::events::{describe, parse_command, BrowseEvent};

/// Page size used when pulling whole collections from the backend.
pub const FETCH_PAGE_SIZE: u32 = 50;

pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, route: Route) {
        debug!(?route, "navigate");
        if route == Route::Login {
            println!("Signed out. Run the command again to sign in.");
        }
    }
}

pub struct ViewController {
    client: CrmClient,
    session: SessionContext,
    fetch_mode: FetchMode,
}

impl ViewController {
    pub async fn sign_in(server_url: &str, username: &str, fetch_mode: FetchMode) -> Result<Self> {
        let mut client = CrmClient::new(server_url)?;
        let session = SessionContext::new(Arc::new(ConsoleNavigator));
        let signed_in = client.login(username).await.map_err(explain)?;
        println!(
            "Signed in as {} ({}, {})",
            signed_in.user.name, signed_in.user.role, signed_in.user.position
        );
        session.sign_in(signed_in);
        Ok(Self {
            client,
            session,
            fetch_mode,
        })
    }

    fn observe<T>(&self, result: Result<T, CoreError>) -> Result<T> {
        self.session.observe(result).map_err(explain)
    }

    pub async fn list<T, S>(
        &self,
        source: &S,
        status: &str,
        search: &str,
        page: usize,
        page_size: usize,
    ) -> Result<()>
    where
        T: Searchable + Clone + Send + Row,
        S: PaginatedSource<T> + ?Sized,
    {
        let mut view = ListView::new(page_size)?.with_fetch_mode(self.fetch_mode);
        let refreshed = view.refresh(source, FETCH_PAGE_SIZE).await;
        self.observe(refreshed)?;
        view.set_status_filter(status);
        view.set_query(search);
        view.set_page(page);
        render(&view.current(), view.page_index());
        Ok(())
    }

    pub async fn leads(
        &self,
        pending: bool,
        status: &str,
        search: &str,
        page: usize,
        page_size: usize,
    ) -> Result<()> {
        if pending {
            self.observe(self.session.go(Route::PendingConversions))?;
            self.list(&self.client.pending_leads(), status, search, page, page_size)
                .await
        } else {
            self.observe(self.session.go(Route::Leads))?;
            self.list(&self.client.leads(), status, search, page, page_size)
                .await
        }
    }

    pub async fn clients(
        &self,
        status: &str,
        search: &str,
        page: usize,
        page_size: usize,
    ) -> Result<()> {
        self.observe(self.session.go(Route::Clients))?;
        self.list(&self.client.clients(), status, search, page, page_size)
            .await
    }

    pub async fn tasks(
        &self,
        filter: TaskFilter,
        search: &str,
        page: usize,
        page_size: usize,
    ) -> Result<()> {
        self.observe(self.session.go(Route::Tasks))?;
        let Some(session) = self.session.current() else {
            anyhow::bail!("not signed in");
        };
        let mine = fetch_all_with(
            &self.client.tasks(TaskListScope::Mine),
            FETCH_PAGE_SIZE,
            self.fetch_mode,
        )
        .await;
        let mut tasks = self.observe(mine)?;
        if session.role().is_manager_or_admin() {
            let team = fetch_all_with(
                &self.client.tasks(TaskListScope::Team),
                FETCH_PAGE_SIZE,
                self.fetch_mode,
            )
            .await;
            let team = self.observe(team)?;
            for task in team {
                if !tasks.iter().any(|known| known.id == task.id) {
                    tasks.push(task);
                }
            }
        }
        let view = paginate_tasks(&tasks, session.user_id(), filter, search, page, page_size)?;
        render(&view, page);
        Ok(())
    }

    async fn load_lead(&self, lead_id: LeadId) -> Result<Lead> {
        let leads = fetch_all_with(&self.client.leads(), FETCH_PAGE_SIZE, self.fetch_mode).await;
        let leads = self.observe(leads)?;
        leads
            .into_iter()
            .find(|lead| lead.id == lead_id)
            .ok_or_else(|| anyhow::anyhow!("lead {lead_id} is not visible to you"))
    }

    pub async fn set_status(&self, lead_id: LeadId, status: LeadStatus) -> Result<()> {
        let lead = self.load_lead(lead_id).await?;
        if !client_core::can_manager_set_status(&lead, status) {
            anyhow::bail!(describe(&CoreError::InvalidTransition(String::new())));
        }
        let updated = self.observe(self.client.update_lead_status(&lead, status).await)?;
        println!("Lead {} is now {}", updated.id, updated.status);
        Ok(())
    }

    pub async fn request_conversion(&self, lead_id: LeadId) -> Result<()> {
        let lead = self.observe(self.client.submit_conversion_request(lead_id).await)?;
        println!("Conversion of lead {} ({}) sent for approval", lead.id, lead.name);
        Ok(())
    }

    pub async fn decide(&self, lead_id: LeadId, approve: bool, message: Option<&str>) -> Result<()> {
        let lead = self.observe(self.client.decide(lead_id, approve, message).await)?;
        println!(
            "Lead {} {}: {}",
            lead.id,
            if approve { "converted" } else { "conversion denied" },
            lead.conversion_message.as_deref().unwrap_or_default()
        );
        Ok(())
    }

    pub async fn delete_lead(&self, lead_id: LeadId) -> Result<()> {
        self.observe(self.client.delete_lead(lead_id).await)?;
        println!("Lead {lead_id} deleted");
        Ok(())
    }

    pub async fn dashboard(&self) -> Result<()> {
        let Some(session) = self.session.current() else {
            anyhow::bail!("not signed in");
        };
        let summary = load_dashboard(&self.client, &session).await;
        render_dashboard(&summary);
        Ok(())
    }

    /// Interactive list of leads. Typed text filters after a short pause;
    /// `:n`/`:p` page, `:s STATUS` filters, `:r` re-fetches, `:q` quits.
    pub async fn browse_leads(&self, page_size: usize) -> Result<()> {
        self.observe(self.session.go(Route::Leads))?;
        let source = self.client.leads();
        let mut view: ListView<Lead> = ListView::new(page_size)?.with_fetch_mode(self.fetch_mode);
        let refreshed = view.refresh(&source, FETCH_PAGE_SIZE).await;
        self.observe(refreshed)?;
        render(&view.current(), view.page_index());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::with_default_delay(Arc::new(TokioScheduler::current()));
        let input_tx = tx.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_command(&line) {
                    Some(BrowseEvent::Query(query)) => {
                        let tx = input_tx.clone();
                        debouncer.call(move || {
                            let _ = tx.send(BrowseEvent::Query(query));
                        });
                    }
                    Some(event) => {
                        let quit = event == BrowseEvent::Quit;
                        if input_tx.send(event).is_err() || quit {
                            break;
                        }
                    }
                    None => println!("unknown command: {line}"),
                }
            }
            let _ = input_tx.send(BrowseEvent::Quit);
        });
        drop(tx);

        while let Some(event) = rx.recv().await {
            match event {
                BrowseEvent::Query(query) => view.set_query(query),
                BrowseEvent::StatusFilter(status) => view.set_status_filter(status),
                BrowseEvent::NextPage => {
                    view.next_page();
                }
                BrowseEvent::PrevPage => {
                    view.prev_page();
                }
                BrowseEvent::Refresh => {
                    let refreshed = view.refresh(&source, FETCH_PAGE_SIZE).await;
                    if let Err(err) = self.observe(refreshed) {
                        println!("{err}");
                        continue;
                    }
                }
                BrowseEvent::Quit => break,
            }
            render(&view.current(), view.page_index());
        }
        reader.abort();
        Ok(())
    }
}

fn explain(err: CoreError) -> anyhow::Error {
    anyhow::anyhow!(describe(&err))
}

/// One printed line per record.
pub trait Row {
    fn row(&self) -> String;
}

impl Row for Lead {
    fn row(&self) -> String {
        let conversion = self
            .conversion_status
            .map(|status| format!(" [{}]", status.as_str()))
            .unwrap_or_default();
        format!(
            "#{:<5} {:<24} {:<28} {:<18} {:<10}{} -> {}",
            self.id.0,
            self.name,
            self.email,
            self.company,
            self.status.as_str(),
            conversion,
            self.assigned_to_name
        )
    }
}

impl Row for shared::protocol::Client {
    fn row(&self) -> String {
        format!(
            "#{:<5} {:<24} {:<28} {:<18} {:<9} -> {}",
            self.id.0,
            self.name,
            self.email,
            self.company,
            self.status.as_str(),
            self.assigned_to_name
        )
    }
}

impl Row for shared::protocol::Task {
    fn row(&self) -> String {
        let due = self
            .due_date
            .map(|due| due.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "#{:<5} {:<32} {:<11} {:<7} due {:<10} {} <- {}",
            self.id.0,
            self.title,
            self.status.as_str(),
            self.priority.as_str(),
            due,
            self.assigned_to_name,
            self.assigned_by_name
        )
    }
}

fn render<T: Row>(view: &PageView<T>, page_index: usize) {
    for item in &view.items {
        println!("{}", item.row());
    }
    if view.items.is_empty() {
        println!("(no matches)");
    }
    println!(
        "page {}/{} - {} match(es)",
        page_index + 1,
        view.total_pages,
        view.total_matches
    );
}

fn render_dashboard(summary: &DashboardSummary) {
    let unavailable = || "unavailable".to_string();
    match &summary.analytics {
        Some(a) => {
            println!("Leads:            {}", a.total_leads);
            println!("Pending requests: {}", a.pending_conversions);
            println!("Clients:          {}", a.total_clients);
            println!("Tasks done:       {}/{}", a.completed_tasks, a.total_tasks);
            if let Some(employees) = a.total_employees {
                println!("Team size:        {employees}");
            }
        }
        None => println!("Analytics:        {}", unavailable()),
    }
    if let Some(pending) = summary.pending_conversions {
        println!("Awaiting review:  {pending}");
    }
    println!(
        "Open tasks:       {}",
        summary
            .open_tasks
            .map(|n| n.to_string())
            .unwrap_or_else(unavailable)
    );
    match &summary.recent_leads {
        Some(leads) => {
            println!("Recent leads:");
            for lead in leads {
                println!("  {}", lead.row());
            }
        }
        None => println!("Recent leads:     {}", unavailable()),
    }
}
