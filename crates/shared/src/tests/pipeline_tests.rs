use super::*;
use crate::domain::{ConversionStatus, LeadId, UserId};
use chrono::Duration;

fn lead_with_status(status: LeadStatus) -> Lead {
    let created = Utc::now() - Duration::hours(1);
    Lead {
        id: LeadId(7),
        name: "Ada".into(),
        email: "ada@example.com".into(),
        phone: "5550001111".into(),
        company: "Analytical".into(),
        status,
        conversion_status: None,
        conversion_message: None,
        assigned_to_id: UserId(3),
        assigned_to_name: "Emp".into(),
        assigned_to_position: None,
        assigned_to_email: None,
        created_at: created,
        updated_at: created,
    }
}

#[test]
fn manager_may_move_between_open_stages_in_any_direction() {
    let lead = lead_with_status(LeadStatus::Qualified);
    for target in [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Lost,
    ] {
        assert!(can_manager_set_status(&lead, target), "{target}");
    }
}

#[test]
fn direct_conversion_is_rejected() {
    let lead = lead_with_status(LeadStatus::Qualified);
    assert!(!can_manager_set_status(&lead, LeadStatus::Converted));
    let err = check_status_change(&lead, LeadStatus::Converted).expect_err("must fail");
    assert_eq!(
        err,
        WorkflowError::InvalidTransition {
            lead_id: LeadId(7),
            from: LeadStatus::Qualified,
            to: LeadStatus::Converted,
        }
    );
}

#[test]
fn converted_lead_is_terminal() {
    let mut lead = lead_with_status(LeadStatus::Converted);
    lead.conversion_status = Some(ConversionStatus::Converted);
    assert!(!can_manager_set_status(&lead, LeadStatus::Contacted));
    assert!(apply_status_change(&mut lead, LeadStatus::New, Utc::now()).is_err());
    assert_eq!(lead.status, LeadStatus::Converted);
}

#[test]
fn apply_status_change_bumps_updated_at_monotonically() {
    let mut lead = lead_with_status(LeadStatus::New);
    let before = lead.updated_at;
    apply_status_change(&mut lead, LeadStatus::Contacted, before - Duration::minutes(5))
        .expect("allowed");
    assert_eq!(lead.status, LeadStatus::Contacted);
    assert_eq!(lead.updated_at, before);

    let later = before + Duration::minutes(5);
    apply_status_change(&mut lead, LeadStatus::Lost, later).expect("allowed");
    assert_eq!(lead.updated_at, later);
}

#[test]
fn new_leads_cannot_start_converted() {
    assert_eq!(INITIAL_STATUS, LeadStatus::New);
    assert!(is_valid_initial_status(LeadStatus::Contacted));
    assert!(!is_valid_initial_status(LeadStatus::Converted));
}
