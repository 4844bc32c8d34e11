use chrono::Utc;
use shared::{
    domain::{ClientStatus, ConversionStatus, LeadId, Role},
    error::{ApiError, ErrorCode, WorkflowError},
    pipeline,
    protocol::{
        ApproveConversionRequest, CreateLeadRequest, Lead, Page, PageQuery, UpdateLeadRequest,
    },
    workflow::{self, DecisionOutcome},
};
use storage::{DeleteOutcome, NewClient, NewLead};
use tracing::{debug, info};

use crate::{
    checked_page, ensure_can_manage, internal, not_found, page_of, require_email, require_text,
    resolve_assignee, Actor, ApiContext,
};

/// Optimistic writes re-read and re-apply this many times before giving up.
const WRITE_ATTEMPTS: usize = 3;

pub async fn list_leads(
    ctx: &ApiContext,
    actor: Actor,
    query: PageQuery,
) -> Result<Page<Lead>, ApiError> {
    let query = checked_page(query)?;
    let (items, total) = ctx
        .storage
        .list_leads(actor.visible_scope(), false, query.page, query.size)
        .await
        .map_err(internal)?;
    Ok(page_of(items, total, query.size))
}

/// Leads awaiting a conversion decision from `actor`.
pub async fn list_pending_leads(
    ctx: &ApiContext,
    actor: Actor,
    query: PageQuery,
) -> Result<Page<Lead>, ApiError> {
    if !actor.role.is_manager_or_admin() {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only managers can review conversion requests",
        ));
    }
    let query = checked_page(query)?;
    let (items, total) = ctx
        .storage
        .list_leads(actor.visible_scope(), true, query.page, query.size)
        .await
        .map_err(internal)?;
    Ok(page_of(items, total, query.size))
}

pub async fn create_lead(
    ctx: &ApiContext,
    actor: Actor,
    req: CreateLeadRequest,
) -> Result<Lead, ApiError> {
    require_text("name", &req.name)?;
    require_email(&req.email)?;
    let status = req.status.unwrap_or(pipeline::INITIAL_STATUS);
    if !pipeline::is_valid_initial_status(status) {
        return Err(ApiError::new(
            ErrorCode::InvalidTransition,
            "a lead can only become CONVERTED through an approved conversion request",
        ));
    }
    let assigned_to = resolve_assignee(ctx, actor, req.assigned_to_id).await?;

    let lead_id = ctx
        .storage
        .insert_lead(&NewLead {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            company: req.company.trim().to_string(),
            status,
            assigned_to,
            created_by: Some(actor.user_id),
        })
        .await
        .map_err(internal)?;
    info!(lead_id = lead_id.0, assigned_to = assigned_to.0, "lead created");
    load(ctx, lead_id).await
}

/// Field edits re-read the lead when its stage moved under them, so a
/// concurrent decision is never overwritten.
pub async fn update_lead(
    ctx: &ApiContext,
    actor: Actor,
    lead_id: LeadId,
    req: UpdateLeadRequest,
) -> Result<Lead, ApiError> {
    for _ in 0..WRITE_ATTEMPTS {
        let mut lead = load(ctx, lead_id).await?;
        ensure_can_manage(ctx, actor, lead.assigned_to_id, "lead").await?;
        let expected_status = lead.status;
        apply_update(ctx, actor, &mut lead, req.clone()).await?;

        if ctx
            .storage
            .save_lead(&lead, expected_status)
            .await
            .map_err(internal)?
        {
            info!(lead_id = lead_id.0, status = %lead.status, "lead updated");
            return load(ctx, lead_id).await;
        }
        debug!(lead_id = lead_id.0, "lead stage moved during edit, re-reading");
    }
    Err(contended(lead_id))
}

async fn apply_update(
    ctx: &ApiContext,
    actor: Actor,
    lead: &mut Lead,
    req: UpdateLeadRequest,
) -> Result<(), ApiError> {
    let now = Utc::now();
    if let Some(name) = req.name {
        require_text("name", &name)?;
        lead.name = name.trim().to_string();
    }
    if let Some(email) = req.email {
        require_email(&email)?;
        lead.email = email.trim().to_string();
    }
    if let Some(phone) = req.phone {
        lead.phone = phone.trim().to_string();
    }
    if let Some(company) = req.company {
        lead.company = company.trim().to_string();
    }
    if let Some(status) = req.status.filter(|status| *status != lead.status) {
        pipeline::apply_status_change(lead, status, now)?;
    }
    if let Some(assignee) = req.assigned_to_id.filter(|id| *id != lead.assigned_to_id) {
        if actor.role == Role::Employee {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "employees cannot reassign leads",
            ));
        }
        lead.assigned_to_id = resolve_assignee(ctx, actor, Some(assignee)).await?;
    }
    lead.updated_at = lead.updated_at.max(now);
    Ok(())
}

pub async fn delete_lead(ctx: &ApiContext, actor: Actor, lead_id: LeadId) -> Result<(), ApiError> {
    let lead = load(ctx, lead_id).await?;
    ensure_can_manage(ctx, actor, lead.assigned_to_id, "lead").await?;

    match ctx.storage.delete_lead(lead_id).await.map_err(internal)? {
        DeleteOutcome::Deleted => {
            info!(lead_id = lead_id.0, "lead deleted");
            Ok(())
        }
        DeleteOutcome::NotFound => Err(not_found("lead", lead_id)),
        DeleteOutcome::HasDependents(tasks) => Err(ApiError::new(
            ErrorCode::DependencyConflict,
            format!("lead {lead_id} is referenced by {tasks} task(s)"),
        )),
    }
}

/// Employee side of the conversion handshake.
pub async fn request_conversion(
    ctx: &ApiContext,
    actor: Actor,
    lead_id: LeadId,
) -> Result<Lead, ApiError> {
    for _ in 0..WRITE_ATTEMPTS {
        let mut lead = load(ctx, lead_id).await?;
        ensure_can_manage(ctx, actor, lead.assigned_to_id, "lead").await?;

        let previous = lead.conversion_status;
        workflow::submit_conversion_request(&mut lead, actor.user_id, Utc::now())?;
        if ctx
            .storage
            .save_lead_guarded(&lead, previous)
            .await
            .map_err(internal)?
        {
            return Ok(lead);
        }
        // The next pass reports AlreadyPending if another request won.
        debug!(lead_id = lead_id.0, "conversion state moved during request, re-reading");
    }
    Err(contended(lead_id))
}

/// Manager side of the conversion handshake. Approval also opens an ACTIVE
/// client for the lead's contact, owned by the same assignee.
pub async fn decide_conversion(
    ctx: &ApiContext,
    actor: Actor,
    lead_id: LeadId,
    req: ApproveConversionRequest,
) -> Result<Lead, ApiError> {
    if actor.role != Role::Manager {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only managers can decide conversion requests",
        ));
    }
    let mut lead = load(ctx, lead_id).await?;
    ensure_can_manage(ctx, actor, lead.assigned_to_id, "lead").await?;

    let outcome = workflow::decide(
        &mut lead,
        req.approve,
        req.response_message.as_deref(),
        Utc::now(),
    )?;
    let saved = match outcome {
        DecisionOutcome::Approved => {
            let client = NewClient {
                name: lead.name.clone(),
                email: lead.email.clone(),
                phone: lead.phone.clone(),
                company: lead.company.clone(),
                address: String::new(),
                status: ClientStatus::Active,
                assigned_to: lead.assigned_to_id,
            };
            let client_id = ctx
                .storage
                .convert_lead(&lead, &client)
                .await
                .map_err(internal)?;
            if let Some(client_id) = client_id {
                info!(
                    lead_id = lead_id.0,
                    client_id = client_id.0,
                    manager = actor.user_id.0,
                    "conversion approved"
                );
            }
            client_id.is_some()
        }
        DecisionOutcome::Denied => {
            let saved = ctx
                .storage
                .save_lead_guarded(&lead, Some(ConversionStatus::Pending))
                .await
                .map_err(internal)?;
            if saved {
                info!(lead_id = lead_id.0, manager = actor.user_id.0, "conversion denied");
            }
            saved
        }
    };
    if !saved {
        return Err(WorkflowError::NotPending {
            lead_id,
            current: load(ctx, lead_id).await?.conversion_status,
        }
        .into());
    }
    Ok(lead)
}

fn contended(lead_id: LeadId) -> ApiError {
    ApiError::new(
        ErrorCode::Validation,
        format!("lead {lead_id} is being changed by someone else; reload it and try again"),
    )
}

async fn load(ctx: &ApiContext, lead_id: LeadId) -> Result<Lead, ApiError> {
    ctx.storage
        .load_lead(lead_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("lead", lead_id))
}
