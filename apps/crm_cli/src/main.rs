mod controller;
mod events;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    tasks::{TaskFilter, TaskScope},
    FetchMode,
};
use shared::domain::{LeadId, LeadStatus, TaskPriority, TaskStatus};
use tracing_subscriber::EnvFilter;

use crate::controller::ViewController;

#[derive(Parser, Debug)]
#[command(about = "Terminal client for the CRM server")]
struct Cli {
    #[arg(long, env = "CRM_SERVER_URL", default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long, env = "CRM_USERNAME")]
    username: String,
    /// Request every page at once after the first instead of one by one.
    #[arg(long)]
    concurrent_fetch: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    #[arg(long, default_value = "")]
    search: String,
    /// Zero-based page of the filtered result.
    #[arg(long, default_value_t = 0)]
    page: usize,
    #[arg(long, default_value_t = 10)]
    page_size: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    Leads {
        #[arg(long, default_value = "")]
        status: String,
        /// Leads waiting for your approval.
        #[arg(long)]
        pending: bool,
        #[command(flatten)]
        list: ListArgs,
    },
    Clients {
        #[arg(long, default_value = "")]
        status: String,
        #[command(flatten)]
        list: ListArgs,
    },
    Tasks {
        #[arg(long, value_enum)]
        scope: Option<ScopeArg>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        list: ListArgs,
    },
    RequestConversion {
        lead_id: i64,
    },
    Decide {
        lead_id: i64,
        #[arg(value_enum)]
        decision: Decision,
        #[arg(long)]
        message: Option<String>,
    },
    SetStatus {
        lead_id: i64,
        status: String,
    },
    DeleteLead {
        lead_id: i64,
    },
    Dashboard,
    /// Interactive lead list with search-as-you-type.
    Browse {
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScopeArg {
    Personal,
    Assigned,
    Employee,
}

impl From<ScopeArg> for TaskScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Personal => TaskScope::Personal,
            ScopeArg::Assigned => TaskScope::Assigned,
            ScopeArg::Employee => TaskScope::Employee,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Decision {
    Approve,
    Deny,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fetch_mode = if cli.concurrent_fetch {
        FetchMode::Concurrent
    } else {
        FetchMode::Sequential
    };
    let controller = ViewController::sign_in(&cli.server_url, &cli.username, fetch_mode).await?;

    match cli.command {
        Command::Leads {
            status,
            pending,
            list,
        } => {
            controller
                .leads(pending, &status, &list.search, list.page, list.page_size)
                .await?
        }
        Command::Clients { status, list } => {
            controller
                .clients(&status, &list.search, list.page, list.page_size)
                .await?
        }
        Command::Tasks {
            scope,
            priority,
            status,
            list,
        } => {
            let filter = TaskFilter {
                scope: scope.map(TaskScope::from),
                priority: priority
                    .map(|p| p.to_ascii_uppercase().parse::<TaskPriority>())
                    .transpose()?,
                status: status
                    .map(|s| s.to_ascii_uppercase().parse::<TaskStatus>())
                    .transpose()?,
            };
            controller
                .tasks(filter, &list.search, list.page, list.page_size)
                .await?
        }
        Command::RequestConversion { lead_id } => {
            controller.request_conversion(LeadId(lead_id)).await?
        }
        Command::Decide {
            lead_id,
            decision,
            message,
        } => {
            let approve = matches!(decision, Decision::Approve);
            controller
                .decide(LeadId(lead_id), approve, message.as_deref())
                .await?
        }
        Command::SetStatus { lead_id, status } => {
            let status: LeadStatus = status.to_ascii_uppercase().parse()?;
            controller.set_status(LeadId(lead_id), status).await?
        }
        Command::DeleteLead { lead_id } => controller.delete_lead(LeadId(lead_id)).await?,
        Command::Dashboard => controller.dashboard().await?,
        Command::Browse { page_size } => controller.browse_leads(page_size).await?,
    }

    Ok(())
}
