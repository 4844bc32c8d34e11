use chrono::{Duration, Utc};
use shared::{
    domain::{ClientStatus, ConversionStatus, LeadId, LeadStatus, TaskStatus},
    protocol::{
        ApproveConversionRequest, CreateClientRequest, CreateLeadRequest, CreateTaskRequest,
        TaskListScope, TaskPageQuery, UpdateLeadRequest,
    },
    workflow::{DEFAULT_APPROVAL_MESSAGE, DEFAULT_DENIAL_MESSAGE},
};
use storage::NewUser;

use super::*;

struct Team {
    ctx: ApiContext,
    admin: Actor,
    manager: Actor,
    employee: Actor,
    outsider: Actor,
}

async fn team() -> Team {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let add = |username: &str, role: Role, manager_id: Option<UserId>| NewUser {
        username: username.to_string(),
        name: format!("{username} name"),
        email: format!("{username}@example.com"),
        position: "Sales".to_string(),
        role,
        manager_id,
    };
    let admin = storage
        .create_user(&add("root", Role::Admin, None))
        .await
        .expect("admin");
    let manager = storage
        .create_user(&add("maria", Role::Manager, None))
        .await
        .expect("manager");
    let employee = storage
        .create_user(&add("eve", Role::Employee, Some(manager)))
        .await
        .expect("employee");
    let outsider = storage
        .create_user(&add("oscar", Role::Employee, None))
        .await
        .expect("outsider");

    Team {
        ctx: ApiContext { storage },
        admin: Actor {
            user_id: admin,
            role: Role::Admin,
        },
        manager: Actor {
            user_id: manager,
            role: Role::Manager,
        },
        employee: Actor {
            user_id: employee,
            role: Role::Employee,
        },
        outsider: Actor {
            user_id: outsider,
            role: Role::Employee,
        },
    }
}

async fn lead_for(team: &Team, actor: Actor, name: &str) -> LeadId {
    create_lead(
        &team.ctx,
        actor,
        CreateLeadRequest {
            name: name.to_string(),
            email: format!("{}@lead.test", name.to_lowercase()),
            company: "Acme".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("lead")
    .id
}

fn decision(approve: bool, message: Option<&str>) -> ApproveConversionRequest {
    ApproveConversionRequest {
        approve,
        response_message: message.map(str::to_string),
    }
}

#[tokio::test]
async fn login_rejects_unknown_and_blank_usernames() {
    let team = team().await;
    let user = login(&team.ctx, " eve ").await.expect("login");
    assert_eq!(user.role, Role::Employee);

    let err = login(&team.ctx, "nobody").await.expect_err("unknown");
    assert_eq!(err.code, ErrorCode::Unauthorized);
    let err = login(&team.ctx, "  ").await.expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn approval_converts_lead_with_manager_message() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Ada").await;

    let pending = request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("request");
    assert_eq!(pending.conversion_status, Some(ConversionStatus::Pending));
    assert_eq!(pending.status, LeadStatus::New);

    let queue = list_pending_leads(&team.ctx, team.manager, PageQuery::default())
        .await
        .expect("pending");
    assert_eq!(queue.total_elements, 1);
    assert_eq!(queue.items[0].id, lead_id);

    let decided = decide_conversion(&team.ctx, team.manager, lead_id, decision(true, Some("ok")))
        .await
        .expect("decide");
    assert_eq!(decided.status, LeadStatus::Converted);
    assert_eq!(decided.conversion_status, Some(ConversionStatus::Converted));
    assert_eq!(decided.conversion_message.as_deref(), Some("ok"));

    let clients = list_clients(&team.ctx, team.employee, PageQuery::default())
        .await
        .expect("clients");
    assert_eq!(clients.total_elements, 1);
    let client = &clients.items[0];
    assert_eq!(client.name, "Ada");
    assert_eq!(client.email, "ada@lead.test");
    assert_eq!(client.company, "Acme");
    assert_eq!(client.status, ClientStatus::Active);
    assert_eq!(client.assigned_to_id, team.employee.user_id);

    let err = decide_conversion(&team.ctx, team.manager, lead_id, decision(false, None))
        .await
        .expect_err("second decision");
    assert_eq!(err.code, ErrorCode::NotPending);

    let queue = list_pending_leads(&team.ctx, team.manager, PageQuery::default())
        .await
        .expect("pending");
    assert_eq!(queue.total_elements, 0);
    let clients = list_clients(&team.ctx, team.manager, PageQuery::default())
        .await
        .expect("clients");
    assert_eq!(clients.total_elements, 1);
}

#[tokio::test]
async fn contact_edit_after_approval_keeps_lead_converted() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Linus").await;
    request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("request");
    decide_conversion(&team.ctx, team.manager, lead_id, decision(true, None))
        .await
        .expect("approve");

    let edited = update_lead(
        &team.ctx,
        team.employee,
        lead_id,
        UpdateLeadRequest {
            phone: Some("5550199".to_string()),
            ..Default::default()
        },
    )
    .await
    .expect("edit");
    assert_eq!(edited.phone, "5550199");
    assert_eq!(edited.status, LeadStatus::Converted);
    assert_eq!(edited.conversion_status, Some(ConversionStatus::Converted));
    assert_eq!(edited.conversion_message.as_deref(), Some(DEFAULT_APPROVAL_MESSAGE));

    let queue = list_pending_leads(&team.ctx, team.manager, PageQuery::default())
        .await
        .expect("pending");
    assert_eq!(queue.total_elements, 0);
}

#[tokio::test]
async fn denial_creates_no_client() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Hopper").await;
    request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("request");
    decide_conversion(&team.ctx, team.manager, lead_id, decision(false, None))
        .await
        .expect("deny");
    let clients = list_clients(&team.ctx, team.employee, PageQuery::default())
        .await
        .expect("clients");
    assert_eq!(clients.total_elements, 0);
}

#[tokio::test]
async fn denial_keeps_status_and_allows_resubmission() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Grace").await;
    request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("request");

    let denied = decide_conversion(&team.ctx, team.manager, lead_id, decision(false, Some(" ")))
        .await
        .expect("deny");
    assert_eq!(denied.status, LeadStatus::New);
    assert_eq!(denied.conversion_status, Some(ConversionStatus::Denied));
    assert_eq!(
        denied.conversion_message.as_deref(),
        Some(DEFAULT_DENIAL_MESSAGE)
    );

    let again = request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("resubmit");
    assert_eq!(again.conversion_status, Some(ConversionStatus::Pending));
    assert_eq!(again.conversion_message, None);

    let approved = decide_conversion(&team.ctx, team.manager, lead_id, decision(true, None))
        .await
        .expect("approve");
    assert_eq!(
        approved.conversion_message.as_deref(),
        Some(DEFAULT_APPROVAL_MESSAGE)
    );
}

#[tokio::test]
async fn duplicate_request_is_rejected() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Linus").await;
    request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("request");
    let err = request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect_err("duplicate");
    assert_eq!(err.code, ErrorCode::AlreadyPending);
}

#[tokio::test]
async fn only_the_responsible_manager_decides() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Barbara").await;

    let err = decide_conversion(&team.ctx, team.manager, lead_id, decision(true, None))
        .await
        .expect_err("nothing pending");
    assert_eq!(err.code, ErrorCode::NotPending);

    request_conversion(&team.ctx, team.employee, lead_id)
        .await
        .expect("request");
    for actor in [team.employee, team.admin, team.outsider] {
        let err = decide_conversion(&team.ctx, actor, lead_id, decision(true, None))
            .await
            .expect_err("not a manager of the assignee");
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
    let err = request_conversion(&team.ctx, team.outsider, lead_id)
        .await
        .expect_err("foreign lead");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn converted_is_unreachable_through_updates() {
    let team = team().await;
    let err = create_lead(
        &team.ctx,
        team.employee,
        CreateLeadRequest {
            name: "Ken".to_string(),
            email: "ken@lead.test".to_string(),
            status: Some(LeadStatus::Converted),
            ..Default::default()
        },
    )
    .await
    .expect_err("converted on create");
    assert_eq!(err.code, ErrorCode::InvalidTransition);

    let lead_id = lead_for(&team, team.employee, "Dennis").await;
    let updated = update_lead(
        &team.ctx,
        team.manager,
        lead_id,
        UpdateLeadRequest {
            status: Some(LeadStatus::Qualified),
            ..Default::default()
        },
    )
    .await
    .expect("qualify");
    assert_eq!(updated.status, LeadStatus::Qualified);

    let err = update_lead(
        &team.ctx,
        team.manager,
        lead_id,
        UpdateLeadRequest {
            status: Some(LeadStatus::Converted),
            ..Default::default()
        },
    )
    .await
    .expect_err("manual conversion");
    assert_eq!(err.code, ErrorCode::InvalidTransition);
}

#[tokio::test]
async fn employees_only_see_their_own_leads() {
    let team = team().await;
    lead_for(&team, team.employee, "Mine").await;
    lead_for(&team, team.outsider, "Theirs").await;

    let mine = list_leads(&team.ctx, team.employee, PageQuery::default())
        .await
        .expect("list");
    assert_eq!(mine.total_elements, 1);
    assert_eq!(mine.items[0].name, "Mine");

    let managed = list_leads(&team.ctx, team.manager, PageQuery::default())
        .await
        .expect("list");
    assert_eq!(managed.total_elements, 1);

    let everything = list_leads(&team.ctx, team.admin, PageQuery::default())
        .await
        .expect("list");
    assert_eq!(everything.total_elements, 2);

    let err = list_leads(&team.ctx, team.admin, PageQuery { page: 0, size: 0 })
        .await
        .expect_err("zero page size");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn lead_with_tasks_cannot_be_deleted() {
    let team = team().await;
    let lead_id = lead_for(&team, team.employee, "Alan").await;
    let task = create_task(
        &team.ctx,
        team.manager,
        CreateTaskRequest {
            title: "Send proposal".to_string(),
            lead_id: Some(lead_id),
            assigned_to_id: Some(team.employee.user_id),
            due_date: Some(Utc::now() + Duration::days(2)),
            ..Default::default()
        },
    )
    .await
    .expect("task");
    assert_eq!(task.assigned_by_id, team.manager.user_id);

    let err = delete_lead(&team.ctx, team.employee, lead_id)
        .await
        .expect_err("has tasks");
    assert_eq!(err.code, ErrorCode::DependencyConflict);

    delete_task(&team.ctx, team.employee, task.id)
        .await
        .expect("delete task");
    delete_lead(&team.ctx, team.employee, lead_id)
        .await
        .expect("delete lead");
}

#[tokio::test]
async fn task_rules_cover_due_dates_and_team_scope() {
    let team = team().await;
    let err = create_task(
        &team.ctx,
        team.employee,
        CreateTaskRequest {
            title: "Late".to_string(),
            due_date: Some(Utc::now() - Duration::days(1)),
            ..Default::default()
        },
    )
    .await
    .expect_err("past due date");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = create_task(
        &team.ctx,
        team.employee,
        CreateTaskRequest {
            title: "Hand off".to_string(),
            assigned_to_id: Some(team.outsider.user_id),
            ..Default::default()
        },
    )
    .await
    .expect_err("employee assigning to a peer");
    assert_eq!(err.code, ErrorCode::Forbidden);

    create_task(
        &team.ctx,
        team.manager,
        CreateTaskRequest {
            title: "Call Ada".to_string(),
            assigned_to_id: Some(team.employee.user_id),
            status: Some(TaskStatus::Done),
            ..Default::default()
        },
    )
    .await
    .expect("task");

    let team_tasks = list_tasks(
        &team.ctx,
        team.manager,
        TaskPageQuery {
            page: 0,
            size: 10,
            scope: TaskListScope::Team,
        },
    )
    .await
    .expect("team tasks");
    assert_eq!(team_tasks.total_elements, 1);

    let err = list_tasks(
        &team.ctx,
        team.employee,
        TaskPageQuery {
            page: 0,
            size: 10,
            scope: TaskListScope::Team,
        },
    )
    .await
    .expect_err("employee team scope");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let summary = analytics(&team.ctx, team.manager).await.expect("analytics");
    assert_eq!(summary.total_tasks, 1);
    assert_eq!(summary.completed_tasks, 1);
    assert_eq!(summary.total_employees, Some(1));
}

#[tokio::test]
async fn clients_follow_ownership_rules() {
    let team = team().await;
    let client = create_client(
        &team.ctx,
        team.employee,
        CreateClientRequest {
            name: "Initech".to_string(),
            email: "ops@initech.test".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("client");
    assert_eq!(client.assigned_to_id, team.employee.user_id);

    let err = delete_client(&team.ctx, team.outsider, client.id)
        .await
        .expect_err("foreign client");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = create_client(
        &team.ctx,
        team.employee,
        CreateClientRequest {
            name: "Broken".to_string(),
            email: "no-at-sign".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect_err("bad email");
    assert_eq!(err.code, ErrorCode::Validation);

    delete_client(&team.ctx, team.manager, client.id)
        .await
        .expect("manager deletes report's client");
    let page = list_clients(&team.ctx, team.employee, PageQuery::default())
        .await
        .expect("list");
    assert!(page.items.is_empty());
}
