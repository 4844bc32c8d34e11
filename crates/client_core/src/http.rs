//! REST transport against the CRM backend.

use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use shared::{
    domain::{ClientId, LeadId, LeadStatus, TaskId},
    error::ApiError,
    pipeline,
    protocol::{
        AnalyticsSummary, ApproveConversionRequest, Client, CreateClientRequest,
        CreateLeadRequest, CreateTaskRequest, Lead, LoginRequest, LoginResponse, Page,
        Task, TaskListScope, UpdateClientRequest, UpdateLeadRequest, UpdateTaskRequest, UserSummary,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    aggregate::PaginatedSource,
    error::CoreError,
    schema::{self, Record},
    session::Session,
};

#[derive(Debug, Clone)]
pub struct CrmClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl CrmClient {
    pub fn new(server_url: &str) -> Result<Self, CoreError> {
        let mut base = Url::parse(server_url.trim())
            .map_err(|err| CoreError::InvalidInput(format!("server url '{server_url}': {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn login(&mut self, username: &str) -> Result<Session, CoreError> {
        let body = LoginRequest {
            username: username.to_string(),
        };
        let response: LoginResponse = self
            .send_json(self.request(Method::POST, "auth/login")?.json(&body))
            .await?;
        info!(user_id = response.user.id.0, "logged in");
        self.token = Some(response.token.clone());
        Ok(Session {
            token: response.token,
            user: response.user,
        })
    }

    pub async fn current_user(&self) -> Result<UserSummary, CoreError> {
        self.send_json(self.request(Method::GET, "users/me")?).await
    }

    pub async fn analytics(&self) -> Result<AnalyticsSummary, CoreError> {
        self.send_json(self.request(Method::GET, "analytics")?).await
    }

    pub fn leads(&self) -> Collection<'_, Lead> {
        Collection::new(self, "leads")
    }

    /// Leads waiting for a conversion decision.
    pub fn pending_leads(&self) -> Collection<'_, Lead> {
        Collection::new(self, "leads/pending")
    }

    pub fn clients(&self) -> Collection<'_, Client> {
        Collection::new(self, "clients")
    }

    pub fn tasks(&self, scope: TaskListScope) -> Collection<'_, Task> {
        let scope = match scope {
            TaskListScope::Mine => "mine",
            TaskListScope::Team => "team",
        };
        Collection::new(self, "tasks").with_param("scope", scope)
    }

    pub async fn create_lead(&self, req: &CreateLeadRequest) -> Result<Lead, CoreError> {
        self.send_json(self.request(Method::POST, "leads")?.json(req))
            .await
    }

    pub async fn update_lead(
        &self,
        lead_id: LeadId,
        req: &UpdateLeadRequest,
    ) -> Result<Lead, CoreError> {
        self.send_json(
            self.request(Method::PUT, &format!("leads/{lead_id}"))?
                .json(req),
        )
        .await
    }

    /// Status edit with the pipeline rule checked before anything is sent.
    pub async fn update_lead_status(
        &self,
        lead: &Lead,
        status: LeadStatus,
    ) -> Result<Lead, CoreError> {
        pipeline::check_status_change(lead, status)?;
        let req = UpdateLeadRequest {
            status: Some(status),
            ..Default::default()
        };
        self.update_lead(lead.id, &req).await
    }

    pub async fn delete_lead(&self, lead_id: LeadId) -> Result<(), CoreError> {
        self.send_empty(self.request(Method::DELETE, &format!("leads/{lead_id}"))?)
            .await
    }

    pub async fn submit_conversion_request(&self, lead_id: LeadId) -> Result<Lead, CoreError> {
        let lead: Lead = self
            .send_json(self.request(Method::POST, &format!("leads/{lead_id}/conversion"))?)
            .await?;
        info!(lead_id = lead_id.0, "conversion request submitted");
        Ok(lead)
    }

    pub async fn decide(
        &self,
        lead_id: LeadId,
        approve: bool,
        message: Option<&str>,
    ) -> Result<Lead, CoreError> {
        let body = ApproveConversionRequest {
            approve,
            response_message: message.map(str::to_string),
        };
        let lead: Lead = self
            .send_json(
                self.request(Method::POST, &format!("leads/{lead_id}/approve"))?
                    .json(&body),
            )
            .await?;
        info!(lead_id = lead_id.0, approve, "conversion decided");
        Ok(lead)
    }

    pub async fn create_client(&self, req: &CreateClientRequest) -> Result<Client, CoreError> {
        self.send_json(self.request(Method::POST, "clients")?.json(req))
            .await
    }

    pub async fn update_client(
        &self,
        client_id: ClientId,
        req: &UpdateClientRequest,
    ) -> Result<Client, CoreError> {
        self.send_json(
            self.request(Method::PUT, &format!("clients/{client_id}"))?
                .json(req),
        )
        .await
    }

    pub async fn delete_client(&self, client_id: ClientId) -> Result<(), CoreError> {
        self.send_empty(self.request(Method::DELETE, &format!("clients/{client_id}"))?)
            .await
    }

    pub async fn create_task(
        &self,
        req: &CreateTaskRequest,
    ) -> Result<Task, CoreError> {
        self.send_json(self.request(Method::POST, "tasks")?.json(req))
            .await
    }

    pub async fn update_task(
        &self,
        task_id: TaskId,
        req: &UpdateTaskRequest,
    ) -> Result<Task, CoreError> {
        self.send_json(
            self.request(Method::PUT, &format!("tasks/{task_id}"))?
                .json(req),
        )
        .await
    }

    pub async fn delete_task(&self, task_id: TaskId) -> Result<(), CoreError> {
        self.send_empty(self.request(Method::DELETE, &format!("tasks/{task_id}"))?)
            .await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, CoreError> {
        let url = self
            .base
            .join(path)
            .map_err(|err| CoreError::InvalidInput(format!("bad path '{path}': {err}")))?;
        let builder = self.http.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send_json<T: Record>(&self, request: RequestBuilder) -> Result<T, CoreError> {
        let body = self.send(request).await?;
        Ok(schema::parse(&body)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), CoreError> {
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, CoreError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        let api_error = schema::parse::<ApiError>(&body).ok();
        if status == StatusCode::INTERNAL_SERVER_ERROR || api_error.is_none() {
            warn!(%status, "backend request failed");
        } else {
            debug!(%status, "backend rejected request");
        }
        Err(CoreError::from_response(status, api_error))
    }
}

/// One paginated backend collection, usable with [`crate::aggregate::fetch_all`].
pub struct Collection<'a, T> {
    client: &'a CrmClient,
    path: &'static str,
    params: Vec<(&'static str, String)>,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T> Collection<'a, T> {
    fn new(client: &'a CrmClient, path: &'static str) -> Self {
        Self {
            client,
            path,
            params: Vec::new(),
            _record: PhantomData,
        }
    }

    fn with_param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }
}

#[derive(Serialize)]
struct PageParams {
    page: u32,
    size: u32,
}

#[async_trait]
impl<T> PaginatedSource<T> for Collection<'_, T>
where
    T: Record + Send,
{
    async fn fetch_page(&self, page: u32, size: u32) -> Result<Page<T>, CoreError> {
        let request = self
            .client
            .request(Method::GET, self.path)?
            .query(&PageParams { page, size })
            .query(&self.params);
        let body = self.client.send(request).await?;
        Ok(schema::parse_page(&body)?)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
