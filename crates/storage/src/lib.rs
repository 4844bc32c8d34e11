use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::{
    domain::{
        ClientId, ClientStatus, ConversionStatus, LeadId, LeadStatus, Role, TaskId, TaskPriority,
        TaskStatus, UnknownLabel, UserId,
    },
    protocol::{Client, Lead, Task, UserSummary},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Which owners a listing or counter covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerScope {
    All,
    User(UserId),
    UserAndReports(UserId),
    Reports(UserId),
}

impl OwnerScope {
    fn push_condition(self, qb: &mut QueryBuilder<'_, Sqlite>, owner_column: &str) {
        match self {
            OwnerScope::All => {
                qb.push("1 = 1");
            }
            OwnerScope::User(user_id) => {
                qb.push(owner_column).push(" = ").push_bind(user_id.0);
            }
            OwnerScope::UserAndReports(user_id) => {
                qb.push("(")
                    .push(owner_column)
                    .push(" = ")
                    .push_bind(user_id.0)
                    .push(" OR ")
                    .push(owner_column)
                    .push(" IN (SELECT id FROM users WHERE manager_id = ")
                    .push_bind(user_id.0)
                    .push("))");
            }
            OwnerScope::Reports(user_id) => {
                qb.push(owner_column)
                    .push(" IN (SELECT id FROM users WHERE manager_id = ")
                    .push_bind(user_id.0)
                    .push(")");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    HasDependents(u64),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
    pub position: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub status: LeadStatus,
    pub assigned_to: UserId,
    pub created_by: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub address: String,
    pub status: ClientStatus,
    pub assigned_to: UserId,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub lead_id: Option<LeadId>,
    pub assigned_to: UserId,
    pub assigned_by: UserId,
}

const USER_SELECT: &str =
    "SELECT id, username, name, email, position, role, manager_id FROM users";

const LEAD_SELECT: &str = "SELECT l.id, l.name, l.email, l.phone, l.company, l.status,
        l.conversion_status, l.conversion_message, l.assigned_to, u.name, u.position, u.email,
        l.created_at, l.updated_at
     FROM leads l
     INNER JOIN users u ON u.id = l.assigned_to";

const CLIENT_SELECT: &str = "SELECT c.id, c.name, c.email, c.phone, c.company, c.address,
        c.status, c.assigned_to, u.name, c.created_at
     FROM clients c
     INNER JOIN users u ON u.id = c.assigned_to";

const TASK_SELECT: &str = "SELECT t.id, t.title, t.description, t.status, t.priority,
        t.due_date, t.lead_id, t.assigned_to, a.name, t.assigned_by, b.name,
        t.created_at, t.updated_at
     FROM tasks t
     INNER JOIN users a ON a.id = t.assigned_to
     INNER JOIN users b ON b.id = t.assigned_by";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // Every in-memory connection is its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<UserId> {
        let rec = sqlx::query(
            "INSERT INTO users (username, name, email, position, role, manager_id)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                name=excluded.name, email=excluded.email, position=excluded.position,
                role=excluded.role, manager_id=excluded.manager_id
             RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.position)
        .bind(user.role.as_str())
        .bind(user.manager_id.map(|id| id.0))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to upsert user '{}'", user.username))?;
        Ok(UserId(rec.get::<i64, _>(0)))
    }

    pub async fn user_by_username(&self, username: &str) -> Result<Option<UserSummary>> {
        let row = sqlx::query(&format!("{USER_SELECT} WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn user_by_id(&self, user_id: UserId) -> Result<Option<UserSummary>> {
        let row = sqlx::query(&format!("{USER_SELECT} WHERE id = ?"))
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn is_manager_of(&self, manager_id: UserId, user_id: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE id = ? AND manager_id = ?")
            .bind(user_id.0)
            .bind(manager_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn count_reports(&self, manager_id: UserId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE manager_id = ?")
            .bind(manager_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn insert_lead(&self, lead: &NewLead) -> Result<LeadId> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO leads (name, email, phone, company, status, assigned_to, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(lead.status.as_str())
        .bind(lead.assigned_to.0)
        .bind(lead.created_by.map(|id| id.0))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert lead")?;
        Ok(LeadId(rec.get::<i64, _>(0)))
    }

    pub async fn load_lead(&self, lead_id: LeadId) -> Result<Option<Lead>> {
        let row = sqlx::query(&format!("{LEAD_SELECT} WHERE l.id = ?"))
            .bind(lead_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    /// Writes the editable columns of `lead` (contact fields, pipeline stage,
    /// assignee) while the stored stage is still `expected_status`. The
    /// conversion columns are never touched here. Returns false when the row is
    /// gone or its stage moved underneath the caller.
    pub async fn save_lead(&self, lead: &Lead, expected_status: LeadStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE leads
             SET name = ?, email = ?, phone = ?, company = ?, status = ?, assigned_to = ?,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(lead.status.as_str())
        .bind(lead.assigned_to_id.0)
        .bind(lead.updated_at)
        .bind(lead.id.0)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save lead {}", lead.id))?;
        Ok(result.rows_affected() > 0)
    }

    /// Writes the conversion state of `lead`, but only if the stored
    /// conversion status still equals `expected`. The stage column is only
    /// written when the lead has become CONVERTED. Returns false when another
    /// writer got there first.
    pub async fn save_lead_guarded(
        &self,
        lead: &Lead,
        expected: Option<ConversionStatus>,
    ) -> Result<bool> {
        let result = update_conversion(&self.pool, lead, expected)
            .await
            .with_context(|| format!("failed to save conversion state of lead {}", lead.id))?;
        Ok(result)
    }

    /// Approval: marks the pending lead CONVERTED and creates its client in one
    /// transaction. `None` when the request was no longer pending.
    pub async fn convert_lead(&self, lead: &Lead, client: &NewClient) -> Result<Option<ClientId>> {
        let mut tx = self.pool.begin().await?;
        let saved = update_conversion(&mut *tx, lead, Some(ConversionStatus::Pending))
            .await
            .with_context(|| format!("failed to convert lead {}", lead.id))?;
        if !saved {
            tx.rollback().await?;
            return Ok(None);
        }
        let client_id = insert_client_row(&mut *tx, client).await?;
        tx.commit().await?;
        Ok(Some(client_id))
    }

    pub async fn delete_lead(&self, lead_id: LeadId) -> Result<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;
        let dependents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE lead_id = ?")
            .bind(lead_id.0)
            .fetch_one(&mut *tx)
            .await?;
        if dependents > 0 {
            tx.rollback().await?;
            return Ok(DeleteOutcome::HasDependents(dependents as u64));
        }

        let result = sqlx::query("DELETE FROM leads WHERE id = ?")
            .bind(lead_id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(if result.rows_affected() == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        })
    }

    pub async fn list_leads(
        &self,
        scope: OwnerScope,
        pending_only: bool,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Lead>, u64)> {
        let total = self.count_leads(scope, pending_only).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(LEAD_SELECT);
        qb.push(" WHERE ");
        scope.push_condition(&mut qb, "l.assigned_to");
        if pending_only {
            qb.push(" AND l.conversion_status = ")
                .push_bind(ConversionStatus::Pending.as_str());
        }
        push_page(&mut qb, "l.id", page, size);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let leads = rows.iter().map(lead_from_row).collect::<Result<Vec<_>>>()?;
        Ok((leads, total))
    }

    pub async fn count_leads(&self, scope: OwnerScope, pending_only: bool) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM leads l WHERE ");
        scope.push_condition(&mut qb, "l.assigned_to");
        if pending_only {
            qb.push(" AND l.conversion_status = ")
                .push_bind(ConversionStatus::Pending.as_str());
        }
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    pub async fn insert_client(&self, client: &NewClient) -> Result<ClientId> {
        insert_client_row(&self.pool, client).await
    }

    pub async fn load_client(&self, client_id: ClientId) -> Result<Option<Client>> {
        let row = sqlx::query(&format!("{CLIENT_SELECT} WHERE c.id = ?"))
            .bind(client_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(client_from_row).transpose()
    }

    pub async fn save_client(&self, client: &Client) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE clients
             SET name = ?, email = ?, phone = ?, company = ?, address = ?, status = ?, assigned_to = ?
             WHERE id = ?",
        )
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.company)
        .bind(&client.address)
        .bind(client.status.as_str())
        .bind(client.assigned_to_id.0)
        .bind(client.id.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save client {}", client.id))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_client(&self, client_id: ClientId) -> Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(client_id.0)
            .execute(&self.pool)
            .await?;
        Ok(if result.rows_affected() == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        })
    }

    pub async fn list_clients(
        &self,
        scope: OwnerScope,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Client>, u64)> {
        let total = self.count_clients(scope).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(CLIENT_SELECT);
        qb.push(" WHERE ");
        scope.push_condition(&mut qb, "c.assigned_to");
        push_page(&mut qb, "c.id", page, size);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let clients = rows.iter().map(client_from_row).collect::<Result<Vec<_>>>()?;
        Ok((clients, total))
    }

    pub async fn count_clients(&self, scope: OwnerScope) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM clients c WHERE ");
        scope.push_condition(&mut qb, "c.assigned_to");
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    pub async fn insert_task(&self, task: &NewTask) -> Result<TaskId> {
        let now = Utc::now();
        let rec = sqlx::query(
            "INSERT INTO tasks (title, description, status, priority, due_date, lead_id, assigned_to, assigned_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.lead_id.map(|id| id.0))
        .bind(task.assigned_to.0)
        .bind(task.assigned_by.0)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert task")?;
        Ok(TaskId(rec.get::<i64, _>(0)))
    }

    pub async fn load_task(&self, task_id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("{TASK_SELECT} WHERE t.id = ?"))
            .bind(task_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    pub async fn save_task(&self, task: &Task) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks
             SET title = ?, description = ?, status = ?, priority = ?, due_date = ?,
                 assigned_to = ?, assigned_by = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .bind(task.assigned_to_id.0)
        .bind(task.assigned_by_id.0)
        .bind(task.updated_at)
        .bind(task.id.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save task {}", task.id))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_task(&self, task_id: TaskId) -> Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id.0)
            .execute(&self.pool)
            .await?;
        Ok(if result.rows_affected() == 0 {
            DeleteOutcome::NotFound
        } else {
            DeleteOutcome::Deleted
        })
    }

    pub async fn list_tasks(
        &self,
        scope: OwnerScope,
        page: u32,
        size: u32,
    ) -> Result<(Vec<Task>, u64)> {
        let total = self.count_tasks(scope, None).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(TASK_SELECT);
        qb.push(" WHERE ");
        scope.push_condition(&mut qb, "t.assigned_to");
        push_page(&mut qb, "t.id", page, size);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let tasks = rows.iter().map(task_from_row).collect::<Result<Vec<_>>>()?;
        Ok((tasks, total))
    }

    pub async fn count_tasks(&self, scope: OwnerScope, status: Option<TaskStatus>) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks t WHERE ");
        scope.push_condition(&mut qb, "t.assigned_to");
        if let Some(status) = status {
            qb.push(" AND t.status = ").push_bind(status.as_str());
        }
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, order_column: &str, page: u32, size: u32) {
    let offset = i64::from(page) * i64::from(size);
    qb.push(" ORDER BY ")
        .push(order_column)
        .push(" ASC LIMIT ")
        .push_bind(i64::from(size))
        .push(" OFFSET ")
        .push_bind(offset);
}

fn parse_label<T>(raw: String) -> Result<T>
where
    T: FromStr<Err = UnknownLabel>,
{
    raw.parse::<T>().map_err(anyhow::Error::from)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn user_from_row(r: &SqliteRow) -> Result<UserSummary> {
    Ok(UserSummary {
        id: UserId(r.try_get(0)?),
        username: r.try_get(1)?,
        name: r.try_get(2)?,
        email: r.try_get(3)?,
        position: r.try_get(4)?,
        role: parse_label(r.try_get(5)?)?,
        manager_id: r.try_get::<Option<i64>, _>(6)?.map(UserId),
    })
}

fn lead_from_row(r: &SqliteRow) -> Result<Lead> {
    Ok(Lead {
        id: LeadId(r.try_get(0)?),
        name: r.try_get(1)?,
        email: r.try_get(2)?,
        phone: r.try_get(3)?,
        company: r.try_get(4)?,
        status: parse_label(r.try_get(5)?)?,
        conversion_status: r
            .try_get::<Option<String>, _>(6)?
            .map(parse_label)
            .transpose()?,
        conversion_message: r.try_get(7)?,
        assigned_to_id: UserId(r.try_get(8)?),
        assigned_to_name: r.try_get(9)?,
        assigned_to_position: non_empty(r.try_get(10)?),
        assigned_to_email: non_empty(r.try_get(11)?),
        created_at: r.try_get(12)?,
        updated_at: r.try_get(13)?,
    })
}

fn client_from_row(r: &SqliteRow) -> Result<Client> {
    Ok(Client {
        id: ClientId(r.try_get(0)?),
        name: r.try_get(1)?,
        email: r.try_get(2)?,
        phone: r.try_get(3)?,
        company: r.try_get(4)?,
        address: r.try_get(5)?,
        status: parse_label(r.try_get(6)?)?,
        assigned_to_id: UserId(r.try_get(7)?),
        assigned_to_name: r.try_get(8)?,
        created_at: r.try_get(9)?,
    })
}

fn task_from_row(r: &SqliteRow) -> Result<Task> {
    Ok(Task {
        id: TaskId(r.try_get(0)?),
        title: r.try_get(1)?,
        description: r.try_get(2)?,
        status: parse_label(r.try_get(3)?)?,
        priority: parse_label(r.try_get(4)?)?,
        due_date: r.try_get(5)?,
        lead_id: r.try_get::<Option<i64>, _>(6)?.map(LeadId),
        assigned_to_id: UserId(r.try_get(7)?),
        assigned_to_name: r.try_get(8)?,
        assigned_by_id: UserId(r.try_get(9)?),
        assigned_by_name: r.try_get(10)?,
        created_at: r.try_get(11)?,
        updated_at: r.try_get(12)?,
    })
}

async fn update_conversion<'e, E>(
    executor: E,
    lead: &Lead,
    expected: Option<ConversionStatus>,
) -> sqlx::Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE leads
         SET status = CASE WHEN ? THEN ? ELSE status END,
             conversion_status = ?, conversion_message = ?, updated_at = ?
         WHERE id = ? AND conversion_status IS ?",
    )
    .bind(lead.status == LeadStatus::Converted)
    .bind(LeadStatus::Converted.as_str())
    .bind(lead.conversion_status.map(ConversionStatus::as_str))
    .bind(lead.conversion_message.as_deref())
    .bind(lead.updated_at)
    .bind(lead.id.0)
    .bind(expected.map(ConversionStatus::as_str))
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_client_row<'e, E>(executor: E, client: &NewClient) -> Result<ClientId>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rec = sqlx::query(
        "INSERT INTO clients (name, email, phone, company, address, status, assigned_to, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(&client.name)
    .bind(&client.email)
    .bind(&client.phone)
    .bind(&client.company)
    .bind(&client.address)
    .bind(client.status.as_str())
    .bind(client.assigned_to.0)
    .bind(Utc::now())
    .fetch_one(executor)
    .await
    .context("failed to insert client")?;
    Ok(ClientId(rec.get::<i64, _>(0)))
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
