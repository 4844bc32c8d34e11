use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ConversionStatus, LeadId, LeadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    AlreadyPending,
    NotPending,
    InvalidTransition,
    DependencyConflict,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Rule violations raised by the pipeline and the conversion workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("lead {lead_id} already has a pending conversion request")]
    AlreadyPending { lead_id: LeadId },
    #[error("lead {lead_id} has no pending conversion request (current: {current:?})")]
    NotPending {
        lead_id: LeadId,
        current: Option<ConversionStatus>,
    },
    #[error("lead {lead_id} cannot move from {from} to {to}")]
    InvalidTransition {
        lead_id: LeadId,
        from: LeadStatus,
        to: LeadStatus,
    },
}

impl WorkflowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkflowError::AlreadyPending { .. } => ErrorCode::AlreadyPending,
            WorkflowError::NotPending { .. } => ErrorCode::NotPending,
            WorkflowError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
