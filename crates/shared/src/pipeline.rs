//! Lead status rules.
//!
//! Managers may move a lead between any of the open stages in either
//! direction. `CONVERTED` is only reachable through an approved conversion
//! request (see [`crate::workflow`]) and nothing leaves it.

use chrono::{DateTime, Utc};

use crate::{domain::LeadStatus, error::WorkflowError, protocol::Lead};

pub const INITIAL_STATUS: LeadStatus = LeadStatus::New;

pub fn can_manager_set_status(lead: &Lead, new_status: LeadStatus) -> bool {
    check_status_change(lead, new_status).is_ok()
}

pub fn check_status_change(lead: &Lead, new_status: LeadStatus) -> Result<(), WorkflowError> {
    if new_status == LeadStatus::Converted || lead.status == LeadStatus::Converted {
        return Err(WorkflowError::InvalidTransition {
            lead_id: lead.id,
            from: lead.status,
            to: new_status,
        });
    }
    Ok(())
}

/// Statuses a freshly created lead may start in.
pub fn is_valid_initial_status(status: LeadStatus) -> bool {
    status != LeadStatus::Converted
}

pub fn apply_status_change(
    lead: &mut Lead,
    new_status: LeadStatus,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    check_status_change(lead, new_status)?;
    lead.status = new_status;
    lead.updated_at = lead.updated_at.max(now);
    Ok(())
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
