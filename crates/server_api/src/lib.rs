use shared::{
    domain::{Role, TaskStatus, UserId},
    error::{ApiError, ErrorCode},
    protocol::{AnalyticsSummary, Page, PageQuery, UserSummary, MAX_PAGE_SIZE},
};
use storage::{OwnerScope, Storage};
use tracing::warn;

mod clients;
mod leads;
mod tasks;

pub use clients::{create_client, delete_client, list_clients, update_client};
pub use leads::{
    create_lead, decide_conversion, delete_lead, list_leads, list_pending_leads,
    request_conversion, update_lead,
};
pub use tasks::{create_task, delete_task, list_tasks, update_task};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl From<&UserSummary> for Actor {
    fn from(user: &UserSummary) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
        }
    }
}

impl Actor {
    /// Records this actor may see in list views.
    pub fn visible_scope(self) -> OwnerScope {
        match self.role {
            Role::Admin => OwnerScope::All,
            Role::Manager => OwnerScope::UserAndReports(self.user_id),
            Role::Employee => OwnerScope::User(self.user_id),
        }
    }
}

pub async fn login(ctx: &ApiContext, username: &str) -> Result<UserSummary, ApiError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "username is required"));
    }
    ctx.storage
        .user_by_username(username)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "unknown user"))
}

pub async fn current_user(ctx: &ApiContext, actor: Actor) -> Result<UserSummary, ApiError> {
    ctx.storage
        .user_by_id(actor.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "user no longer exists"))
}

pub async fn analytics(ctx: &ApiContext, actor: Actor) -> Result<AnalyticsSummary, ApiError> {
    let scope = actor.visible_scope();
    let storage = &ctx.storage;
    let total_employees = match actor.role {
        Role::Manager => Some(storage.count_reports(actor.user_id).await.map_err(internal)?),
        Role::Admin | Role::Employee => None,
    };
    Ok(AnalyticsSummary {
        total_leads: storage.count_leads(scope, false).await.map_err(internal)?,
        pending_conversions: storage.count_leads(scope, true).await.map_err(internal)?,
        total_tasks: storage.count_tasks(scope, None).await.map_err(internal)?,
        completed_tasks: storage
            .count_tasks(scope, Some(TaskStatus::Done))
            .await
            .map_err(internal)?,
        total_clients: storage.count_clients(scope).await.map_err(internal)?,
        total_employees,
    })
}

/// Whether `actor` may act on records owned by `owner`.
pub(crate) async fn can_manage(
    ctx: &ApiContext,
    actor: Actor,
    owner: UserId,
) -> Result<bool, ApiError> {
    if actor.role == Role::Admin || actor.user_id == owner {
        return Ok(true);
    }
    if actor.role != Role::Manager {
        return Ok(false);
    }
    ctx.storage
        .is_manager_of(actor.user_id, owner)
        .await
        .map_err(internal)
}

pub(crate) async fn ensure_can_manage(
    ctx: &ApiContext,
    actor: Actor,
    owner: UserId,
    what: &str,
) -> Result<(), ApiError> {
    if can_manage(ctx, actor, owner).await? {
        return Ok(());
    }
    warn!(actor = actor.user_id.0, owner = owner.0, what, "access denied");
    Err(ApiError::new(
        ErrorCode::Forbidden,
        format!("not authorized to manage this {what}"),
    ))
}

/// Resolves who a new or reassigned record goes to. Only managers (for their
/// reports) and admins may hand records to someone else.
pub(crate) async fn resolve_assignee(
    ctx: &ApiContext,
    actor: Actor,
    requested: Option<UserId>,
) -> Result<UserId, ApiError> {
    let Some(assignee) = requested else {
        return Ok(actor.user_id);
    };
    if assignee == actor.user_id {
        return Ok(assignee);
    }
    if ctx
        .storage
        .user_by_id(assignee)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(ApiError::new(
            ErrorCode::NotFound,
            format!("user {assignee} not found"),
        ));
    }
    if actor.role == Role::Employee || !can_manage(ctx, actor, assignee).await? {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "not authorized to assign to this user",
        ));
    }
    Ok(assignee)
}

pub(crate) fn checked_page(query: PageQuery) -> Result<PageQuery, ApiError> {
    if query.size == 0 || query.size > MAX_PAGE_SIZE {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("page size must be between 1 and {MAX_PAGE_SIZE}"),
        ));
    }
    Ok(query)
}

pub(crate) fn page_of<T>(items: Vec<T>, total_elements: u64, size: u32) -> Page<T> {
    Page {
        items,
        total_pages: shared::protocol::total_pages_for(total_elements, size),
        total_elements,
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} must not be empty"),
        ));
    }
    Ok(())
}

pub(crate) fn require_email(value: &str) -> Result<(), ApiError> {
    require_text("email", value)?;
    if !value.contains('@') {
        return Err(ApiError::new(ErrorCode::Validation, "email is malformed"));
    }
    Ok(())
}

pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> ApiError {
    ApiError::new(ErrorCode::NotFound, format!("{what} {id} not found"))
}

pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
