//! Employee to manager conversion handshake.
//!
//! The functions here only mutate the record they are handed. The backend
//! runs them against the stored lead; clients re-fetch afterwards.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    domain::{ConversionStatus, LeadStatus, UserId},
    error::WorkflowError,
    protocol::Lead,
};

pub const DEFAULT_APPROVAL_MESSAGE: &str = "Conversion request accepted";
pub const DEFAULT_DENIAL_MESSAGE: &str = "Conversion request denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved,
    Denied,
}

pub fn is_pending(lead: &Lead) -> bool {
    lead.conversion_status == Some(ConversionStatus::Pending)
}

pub fn submit_conversion_request(
    lead: &mut Lead,
    requested_by: UserId,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    if is_pending(lead) {
        return Err(WorkflowError::AlreadyPending { lead_id: lead.id });
    }
    if lead.status == LeadStatus::Converted {
        return Err(WorkflowError::InvalidTransition {
            lead_id: lead.id,
            from: lead.status,
            to: LeadStatus::Converted,
        });
    }

    // A denied lead may be resubmitted; the previous verdict is cleared.
    lead.conversion_status = Some(ConversionStatus::Pending);
    lead.conversion_message = None;
    lead.updated_at = lead.updated_at.max(now);
    info!(
        lead_id = lead.id.0,
        requested_by = requested_by.0,
        "conversion requested"
    );
    Ok(())
}

pub fn decide(
    lead: &mut Lead,
    approve: bool,
    message: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DecisionOutcome, WorkflowError> {
    if !is_pending(lead) {
        return Err(WorkflowError::NotPending {
            lead_id: lead.id,
            current: lead.conversion_status,
        });
    }

    let message = message.filter(|m| !m.trim().is_empty());
    let outcome = if approve {
        lead.status = LeadStatus::Converted;
        lead.conversion_status = Some(ConversionStatus::Converted);
        lead.conversion_message = Some(message.unwrap_or(DEFAULT_APPROVAL_MESSAGE).to_string());
        DecisionOutcome::Approved
    } else {
        lead.conversion_status = Some(ConversionStatus::Denied);
        lead.conversion_message = Some(message.unwrap_or(DEFAULT_DENIAL_MESSAGE).to_string());
        DecisionOutcome::Denied
    };
    lead.updated_at = lead.updated_at.max(now);
    Ok(outcome)
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
