use chrono::{DateTime, Utc};
use shared::{
    domain::{Role, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateTaskRequest, Page, PageQuery, Task, TaskListScope, TaskPageQuery, UpdateTaskRequest,
    },
};
use storage::{DeleteOutcome, NewTask, OwnerScope};
use tracing::info;

use crate::{
    checked_page, ensure_can_manage, internal, not_found, page_of, require_text,
    resolve_assignee, Actor, ApiContext,
};

pub async fn list_tasks(
    ctx: &ApiContext,
    actor: Actor,
    query: TaskPageQuery,
) -> Result<Page<Task>, ApiError> {
    let page = checked_page(PageQuery {
        page: query.page,
        size: query.size,
    })?;
    let scope = match (query.scope, actor.role) {
        (TaskListScope::Mine, _) => OwnerScope::User(actor.user_id),
        (TaskListScope::Team, Role::Manager) => OwnerScope::Reports(actor.user_id),
        (TaskListScope::Team, Role::Admin) => OwnerScope::All,
        (TaskListScope::Team, Role::Employee) => {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "only managers can list team tasks",
            ))
        }
    };
    let (items, total) = ctx
        .storage
        .list_tasks(scope, page.page, page.size)
        .await
        .map_err(internal)?;
    Ok(page_of(items, total, page.size))
}

pub async fn create_task(
    ctx: &ApiContext,
    actor: Actor,
    req: CreateTaskRequest,
) -> Result<Task, ApiError> {
    require_text("title", &req.title)?;
    ensure_future(req.due_date)?;
    if let Some(lead_id) = req.lead_id {
        if ctx
            .storage
            .load_lead(lead_id)
            .await
            .map_err(internal)?
            .is_none()
        {
            return Err(not_found("lead", lead_id));
        }
    }
    let assigned_to = resolve_assignee(ctx, actor, req.assigned_to_id).await?;

    let task_id = ctx
        .storage
        .insert_task(&NewTask {
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            status: req.status.unwrap_or_default(),
            priority: req.priority.unwrap_or_default(),
            due_date: req.due_date,
            lead_id: req.lead_id,
            assigned_to,
            assigned_by: actor.user_id,
        })
        .await
        .map_err(internal)?;
    info!(task_id = task_id.0, assigned_to = assigned_to.0, "task created");
    load(ctx, task_id).await
}

pub async fn update_task(
    ctx: &ApiContext,
    actor: Actor,
    task_id: TaskId,
    req: UpdateTaskRequest,
) -> Result<Task, ApiError> {
    let mut task = load(ctx, task_id).await?;
    ensure_can_manage(ctx, actor, task.assigned_to_id, "task").await?;
    ensure_future(req.due_date)?;

    if let Some(title) = req.title {
        require_text("title", &title)?;
        task.title = title.trim().to_string();
    }
    if let Some(description) = req.description {
        task.description = description.trim().to_string();
    }
    if let Some(status) = req.status {
        task.status = status;
    }
    if let Some(priority) = req.priority {
        task.priority = priority;
    }
    if req.due_date.is_some() {
        task.due_date = req.due_date;
    }
    if let Some(assignee) = req.assigned_to_id.filter(|id| *id != task.assigned_to_id) {
        if actor.role == Role::Employee {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "employees cannot reassign tasks",
            ));
        }
        task.assigned_to_id = resolve_assignee(ctx, actor, Some(assignee)).await?;
        task.assigned_by_id = actor.user_id;
    }
    task.updated_at = task.updated_at.max(Utc::now());

    if !ctx.storage.save_task(&task).await.map_err(internal)? {
        return Err(not_found("task", task_id));
    }
    load(ctx, task_id).await
}

pub async fn delete_task(ctx: &ApiContext, actor: Actor, task_id: TaskId) -> Result<(), ApiError> {
    let task = load(ctx, task_id).await?;
    ensure_can_manage(ctx, actor, task.assigned_to_id, "task").await?;
    match ctx.storage.delete_task(task_id).await.map_err(internal)? {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::NotFound | DeleteOutcome::HasDependents(_) => {
            Err(not_found("task", task_id))
        }
    }
}

fn ensure_future(due_date: Option<DateTime<Utc>>) -> Result<(), ApiError> {
    match due_date {
        Some(due) if due < Utc::now() => Err(ApiError::new(
            ErrorCode::Validation,
            "due date must be in the future",
        )),
        _ => Ok(()),
    }
}

async fn load(ctx: &ApiContext, task_id: TaskId) -> Result<Task, ApiError> {
    ctx.storage
        .load_task(task_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("task", task_id))
}
