use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{LeadStatus, Role, UserId};
use storage::{NewLead, NewUser, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/crm.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    SeedUser {
        username: String,
        name: String,
        email: String,
        position: String,
        /// ADMIN, MANAGER or EMPLOYEE.
        role: String,
        #[arg(long)]
        manager: Option<String>,
    },
    CreateLead {
        /// Username of the assignee.
        assignee: String,
        name: String,
        email: String,
        #[arg(long, default_value = "")]
        phone: String,
        #[arg(long, default_value = "")]
        company: String,
        #[arg(long, default_value = "NEW")]
        status: String,
    },
}

async fn user_id(storage: &Storage, username: &str) -> Result<UserId> {
    storage
        .user_by_username(username)
        .await?
        .map(|user| user.id)
        .with_context(|| format!("no user named {username}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::SeedUser {
            username,
            name,
            email,
            position,
            role,
            manager,
        } => {
            let role: Role = role.to_ascii_uppercase().parse()?;
            let manager_id = match manager {
                Some(manager) => Some(user_id(&storage, &manager).await?),
                None => None,
            };
            let id = storage
                .create_user(&NewUser {
                    username,
                    name,
                    email,
                    position,
                    role,
                    manager_id,
                })
                .await?;
            println!("created user_id={}", id.0);
        }
        Command::CreateLead {
            assignee,
            name,
            email,
            phone,
            company,
            status,
        } => {
            let status: LeadStatus = status.to_ascii_uppercase().parse()?;
            if status == LeadStatus::Converted {
                bail!("leads reach CONVERTED only through an approved conversion request");
            }
            let assigned_to = user_id(&storage, &assignee).await?;
            let id = storage
                .insert_lead(&NewLead {
                    name,
                    email,
                    phone,
                    company,
                    status,
                    assigned_to,
                    created_by: None,
                })
                .await?;
            println!("created lead_id={}", id.0);
        }
    }

    Ok(())
}
