use super::*;
use axum::{body, body::Body, http::Request, response::Response};
use shared::domain::{ConversionStatus, LeadStatus, Role, UserId};
use storage::NewUser;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    storage: Storage,
}

async fn test_app() -> TestApp {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let manager = storage
        .create_user(&new_user("maria", Role::Manager, None))
        .await
        .expect("manager");
    storage
        .create_user(&new_user("eve", Role::Employee, Some(manager)))
        .await
        .expect("employee");

    let router = build_router(Arc::new(AppState {
        api: ApiContext {
            storage: storage.clone(),
        },
        tokens: TokenConfig {
            secret: "test-secret".into(),
            ttl_seconds: 300,
        },
        default_page_size: 10,
    }));
    TestApp { router, storage }
}

fn new_user(username: &str, role: Role, manager_id: Option<UserId>) -> NewUser {
    NewUser {
        username: username.to_string(),
        name: format!("{username} name"),
        email: format!("{username}@example.com"),
        position: "Sales".to_string(),
        role,
        manager_id,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.expect("response")
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn login_as(app: &TestApp, username: &str) -> String {
    let request = Request::post("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "username": username }).to_string(),
        ))
        .expect("request");
    let response = send(app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let dto: LoginResponse = json_body(response).await;
    dto.token
}

fn authed(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let app = test_app().await;
    let request = Request::get("/leads").body(Body::empty()).expect("request");
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let response = send(&app, authed("GET", "/leads", "garbage", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_user_cannot_sign_in() {
    let app = test_app().await;
    let request = Request::post("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "username": "mallory" }).to_string(),
        ))
        .expect("request");
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn conversion_round_trip_over_http() {
    let app = test_app().await;
    let employee = login_as(&app, "eve").await;
    let manager = login_as(&app, "maria").await;

    let me: UserSummary = json_body(send(&app, authed("GET", "/users/me", &employee, None)).await).await;
    assert_eq!(me.role, Role::Employee);

    let response = send(
        &app,
        authed(
            "POST",
            "/leads",
            &employee,
            Some(serde_json::json!({ "name": "Ada", "email": "ada@lead.test" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let lead: Lead = json_body(response).await;
    assert_eq!(lead.status, LeadStatus::New);

    let conversion_uri = format!("/leads/{}/conversion", lead.id.0);
    let response = send(&app, authed("POST", &conversion_uri, &employee, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, authed("POST", &conversion_uri, &employee, None)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::AlreadyPending);

    let pending: Page<Lead> =
        json_body(send(&app, authed("GET", "/leads/pending", &manager, None)).await).await;
    assert_eq!(pending.total_elements, 1);

    let approve_uri = format!("/leads/{}/approve", lead.id.0);
    let response = send(
        &app,
        authed(
            "POST",
            &approve_uri,
            &manager,
            Some(serde_json::json!({ "approve": true, "responseMessage": "ok" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let decided: Lead = json_body(response).await;
    assert_eq!(decided.status, LeadStatus::Converted);
    assert_eq!(decided.conversion_status, Some(ConversionStatus::Converted));
    assert_eq!(decided.conversion_message.as_deref(), Some("ok"));

    let response = send(
        &app,
        authed(
            "POST",
            &approve_uri,
            &manager,
            Some(serde_json::json!({ "approve": false })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::NotPending);

    let pending: Page<Lead> =
        json_body(send(&app, authed("GET", "/leads/pending", &manager, None)).await).await;
    assert!(pending.items.is_empty());
}

#[tokio::test]
async fn direct_conversion_is_unprocessable_and_employees_cannot_review() {
    let app = test_app().await;
    let employee = login_as(&app, "eve").await;

    let lead: Lead = json_body(
        send(
            &app,
            authed(
                "POST",
                "/leads",
                &employee,
                Some(serde_json::json!({ "name": "Grace", "email": "grace@lead.test" })),
            ),
        )
        .await,
    )
    .await;

    let response = send(
        &app,
        authed(
            "PUT",
            &format!("/leads/{}", lead.id.0),
            &employee,
            Some(serde_json::json!({ "status": "CONVERTED" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = send(&app, authed("GET", "/leads/pending", &employee, None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deleting_lead_with_tasks_conflicts() {
    let app = test_app().await;
    let employee = login_as(&app, "eve").await;

    let lead: Lead = json_body(
        send(
            &app,
            authed(
                "POST",
                "/leads",
                &employee,
                Some(serde_json::json!({ "name": "Alan", "email": "alan@lead.test" })),
            ),
        )
        .await,
    )
    .await;
    let response = send(
        &app,
        authed(
            "POST",
            "/tasks",
            &employee,
            Some(serde_json::json!({ "title": "Follow up", "leadId": lead.id.0 })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        authed("DELETE", &format!("/leads/{}", lead.id.0), &employee, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let err: ApiError = json_body(response).await;
    assert_eq!(err.code, ErrorCode::DependencyConflict);
    assert!(app
        .storage
        .load_lead(lead.id)
        .await
        .expect("load")
        .is_some());
}

#[tokio::test]
async fn list_routes_apply_default_and_explicit_page_size() {
    let app = test_app().await;
    let employee = login_as(&app, "eve").await;
    for i in 0..12 {
        let response = send(
            &app,
            authed(
                "POST",
                "/clients",
                &employee,
                Some(serde_json::json!({
                    "name": format!("Client {i}"),
                    "email": format!("c{i}@client.test"),
                })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let page: Page<Client> =
        json_body(send(&app, authed("GET", "/clients", &employee, None)).await).await;
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.total_elements, 12);

    let page: Page<Client> = json_body(
        send(&app, authed("GET", "/clients?page=1&size=5", &employee, None)).await,
    )
    .await;
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total_pages, 3);

    let response = send(&app, authed("GET", "/clients?size=0", &employee, None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app, authed("GET", "/tasks?scope=team", &employee, None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let summary: AnalyticsSummary =
        json_body(send(&app, authed("GET", "/analytics", &employee, None)).await).await;
    assert_eq!(summary.total_clients, 12);
}
