use shared::{
    domain::{ClientId, ClientStatus},
    error::ApiError,
    protocol::{Client, CreateClientRequest, Page, PageQuery, UpdateClientRequest},
};
use storage::{DeleteOutcome, NewClient};
use tracing::info;

use crate::{
    checked_page, ensure_can_manage, internal, not_found, page_of, require_email, require_text,
    resolve_assignee, Actor, ApiContext,
};

pub async fn list_clients(
    ctx: &ApiContext,
    actor: Actor,
    query: PageQuery,
) -> Result<Page<Client>, ApiError> {
    let query = checked_page(query)?;
    let (items, total) = ctx
        .storage
        .list_clients(actor.visible_scope(), query.page, query.size)
        .await
        .map_err(internal)?;
    Ok(page_of(items, total, query.size))
}

pub async fn create_client(
    ctx: &ApiContext,
    actor: Actor,
    req: CreateClientRequest,
) -> Result<Client, ApiError> {
    require_text("name", &req.name)?;
    require_email(&req.email)?;
    let assigned_to = resolve_assignee(ctx, actor, req.assigned_to_id).await?;

    let client_id = ctx
        .storage
        .insert_client(&NewClient {
            name: req.name.trim().to_string(),
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            company: req.company.trim().to_string(),
            address: req.address.trim().to_string(),
            status: req.status.unwrap_or(ClientStatus::Active),
            assigned_to,
        })
        .await
        .map_err(internal)?;
    info!(client_id = client_id.0, "client created");
    load(ctx, client_id).await
}

pub async fn update_client(
    ctx: &ApiContext,
    actor: Actor,
    client_id: ClientId,
    req: UpdateClientRequest,
) -> Result<Client, ApiError> {
    let mut client = load(ctx, client_id).await?;
    ensure_can_manage(ctx, actor, client.assigned_to_id, "client").await?;

    if let Some(name) = req.name {
        require_text("name", &name)?;
        client.name = name.trim().to_string();
    }
    if let Some(email) = req.email {
        require_email(&email)?;
        client.email = email.trim().to_string();
    }
    if let Some(phone) = req.phone {
        client.phone = phone.trim().to_string();
    }
    if let Some(company) = req.company {
        client.company = company.trim().to_string();
    }
    if let Some(address) = req.address {
        client.address = address.trim().to_string();
    }
    if let Some(status) = req.status {
        client.status = status;
    }

    if !ctx.storage.save_client(&client).await.map_err(internal)? {
        return Err(not_found("client", client_id));
    }
    Ok(client)
}

pub async fn delete_client(
    ctx: &ApiContext,
    actor: Actor,
    client_id: ClientId,
) -> Result<(), ApiError> {
    let client = load(ctx, client_id).await?;
    ensure_can_manage(ctx, actor, client.assigned_to_id, "client").await?;
    match ctx.storage.delete_client(client_id).await.map_err(internal)? {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::NotFound | DeleteOutcome::HasDependents(_) => {
            Err(not_found("client", client_id))
        }
    }
}

async fn load(ctx: &ApiContext, client_id: ClientId) -> Result<Client, ApiError> {
    ctx.storage
        .load_client(client_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("client", client_id))
}
