mod support;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use support::TestApp;
use web_api::TRACE_ID_HEADER;

#[tokio::test]
async fn health_is_public_and_not_wrapped() {
    let app = TestApp::spawn().await;

    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert!(response.body.get("success").is_none());
    assert_eq!(response.body["activityLogQueue"]["isRunning"], true);
    assert!(response.headers.contains_key(&TRACE_ID_HEADER));

    app.shutdown().await;
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = TestApp::spawn().await;

    for token in [None, Some("not-a-jwt")] {
        let response = app.get("/api/auth/current-user", token).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body["success"], false);
        assert_eq!(response.body["code"], "UNAUTHORIZED");
        assert!(response.body["traceId"].is_string());
    }

    app.shutdown().await;
}

#[tokio::test]
async fn login_rejects_bad_credentials_and_empty_fields() {
    let app = TestApp::spawn().await;

    let wrong = app
        .post(
            "/api/auth/login",
            None,
            json!({"username": "admin", "password": "wrong-password"}),
        )
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["success"], false);

    let empty = app
        .post("/api/auth/login", None, json!({"username": "", "password": ""}))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);
    assert_eq!(empty.body["code"], "VALIDATION_ERROR");

    app.shutdown().await;
}

#[tokio::test]
async fn current_user_is_wrapped_with_matching_trace_id() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let response = app.get("/api/auth/current-user", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["code"], "SUCCESS");
    assert_eq!(response.body["data"]["user"]["username"], "admin");
    assert_eq!(response.body["data"]["isSuperAdmin"], true);
    assert!(response.body["data"]["user"].get("passwordHash").is_none());

    let header = response
        .headers
        .get(&TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .expect("trace header");
    assert_eq!(response.body["traceId"], header);

    app.shutdown().await;
}

#[tokio::test]
async fn super_admin_sees_whole_permission_catalogue() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let response = app.get("/api/user/my-permissions", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["isSuperAdmin"], true);
    assert_eq!(
        data["allPermissionCodes"].as_array().map(Vec::len),
        Some(32)
    );

    app.shutdown().await;
}

#[tokio::test]
async fn custom_permission_unlocks_guarded_route() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let (member, member_id) = app.member_token(&admin, "alice").await;

    let denied = app.get("/api/role", Some(&member)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(denied.body["code"], "FORBIDDEN");

    let permission = app
        .get("/api/permission/by-code/role:read", Some(&admin))
        .await;
    assert_eq!(permission.status, StatusCode::OK);
    let permission_id = permission.body["data"]["id"].clone();

    let assigned = app
        .post(
            &format!("/api/user/{member_id}/custom-permissions"),
            Some(&admin),
            json!({"permissionIds": [permission_id]}),
        )
        .await;
    assert_eq!(assigned.status, StatusCode::OK, "{}", assigned.body);

    let allowed = app.get("/api/role", Some(&member)).await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert!(allowed.body["data"].is_array());

    // 自定义权限只放行对应的动作
    let still_denied = app
        .post("/api/role", Some(&member), json!({"name": "ops"}))
        .await;
    assert_eq!(still_denied.status, StatusCode::FORBIDDEN);

    app.shutdown().await;
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    app.member_token(&admin, "bob").await;

    let again = app
        .post(
            "/api/user",
            Some(&admin),
            json!({"username": "bob", "password": "member123"}),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["code"], "ALREADY_EXISTS");
    assert_eq!(again.body["success"], false);

    app.shutdown().await;
}

#[tokio::test]
async fn unknown_route_with_token_is_not_found() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;

    let response = app.get("/api/does-not-exist", Some(&token)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["code"], "NOT_FOUND");

    app.shutdown().await;
}

#[tokio::test]
async fn registered_company_admin_can_use_issued_token() {
    let app = TestApp::spawn().await;

    let registered = app
        .post(
            "/api/company/register",
            None,
            json!({
                "companyName": "Acme",
                "companyCode": "Acme",
                "adminUsername": "acme-admin",
                "adminPassword": "secret123"
            }),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);
    assert_eq!(registered.body["data"]["company"]["code"], "acme");
    let token = registered.body["data"]["token"]
        .as_str()
        .expect("token")
        .to_owned();

    let current = app.get("/api/company/current", Some(&token)).await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["data"]["name"], "Acme");

    let users = app.get("/api/user", Some(&token)).await;
    assert_eq!(users.status, StatusCode::OK);
    assert_eq!(users.body["data"]["total"], 1);

    app.shutdown().await;
}

async fn register_company(app: &TestApp, code: &str, admin: &str) -> String {
    let registered = app
        .post(
            "/api/company/register",
            None,
            json!({
                "companyName": code,
                "companyCode": code,
                "adminUsername": admin,
                "adminPassword": "secret123"
            }),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);
    registered.body["data"]["token"]
        .as_str()
        .expect("token")
        .to_owned()
}

#[tokio::test]
async fn tenant_admin_cannot_change_shared_catalogue() {
    let app = TestApp::spawn().await;
    let platform_admin = app.admin_token().await;
    let tenant_admin = register_company(&app, "other", "other-admin").await;

    let permission = app
        .get("/api/permission/by-code/user:read", Some(&platform_admin))
        .await;
    let permission_id = permission.body["data"]["id"].as_str().expect("id").to_owned();
    let menus = app.get("/api/menu", Some(&platform_admin)).await;
    let menu = menus.body["data"][0].clone();
    let menu_id = menu["id"].as_str().expect("id").to_owned();

    // 企业管理员仍可读取
    let listed = app.get("/api/permission", Some(&tenant_admin)).await;
    assert_eq!(listed.status, StatusCode::OK);

    let deleted = app
        .delete(&format!("/api/permission/{permission_id}"), Some(&tenant_admin))
        .await;
    assert_eq!(deleted.status, StatusCode::FORBIDDEN);
    assert_eq!(deleted.body["code"], "FORBIDDEN");

    let mut renamed = menu.clone();
    renamed["name"] = json!("renamed");
    let updated = app
        .put(&format!("/api/menu/{menu_id}"), Some(&tenant_admin), renamed)
        .await;
    assert_eq!(updated.status, StatusCode::FORBIDDEN);

    let initialized = app
        .post("/api/permission/initialize", Some(&tenant_admin), json!({}))
        .await;
    assert_eq!(initialized.status, StatusCode::FORBIDDEN);

    let still_there = app
        .get(&format!("/api/permission/{permission_id}"), Some(&platform_admin))
        .await;
    assert_eq!(still_there.status, StatusCode::OK);

    // 平台管理员可以维护
    let initialized = app
        .post("/api/permission/initialize", Some(&platform_admin), json!({}))
        .await;
    assert_eq!(initialized.status, StatusCode::OK);
    assert_eq!(initialized.body["data"]["created"], 0);

    app.shutdown().await;
}

#[tokio::test]
async fn self_registration_creates_personal_company() {
    let app = TestApp::spawn().await;

    let registered = app
        .post(
            "/api/auth/register",
            None,
            json!({"username": "carol", "password": "secret123", "email": "carol@example.com"}),
        )
        .await;
    assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.body);
    assert_eq!(registered.body["data"]["company"]["name"], "carol 的企业");
    assert!(registered.body["data"]["user"].get("passwordHash").is_none());
    let token = registered.body["data"]["token"]
        .as_str()
        .expect("token")
        .to_owned();

    let current = app.get("/api/auth/current-user", Some(&token)).await;
    assert_eq!(current.status, StatusCode::OK);
    assert_eq!(current.body["data"]["isSuperAdmin"], true);
    assert_eq!(
        current.body["data"]["company"]["id"],
        registered.body["data"]["company"]["id"]
    );

    let again = app
        .post(
            "/api/auth/register",
            None,
            json!({"username": "carol", "password": "secret123"}),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["code"], "ALREADY_EXISTS");

    let same_email = app
        .post(
            "/api/auth/register",
            None,
            json!({"username": "carol2", "password": "secret123", "email": "CAROL@example.com"}),
        )
        .await;
    assert_eq!(same_email.status, StatusCode::CONFLICT);

    let short = app
        .post(
            "/api/auth/register",
            None,
            json!({"username": "dan", "password": "123"}),
        )
        .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
    assert_eq!(short.body["code"], "VALIDATION_ERROR");

    app.shutdown().await;
}

#[tokio::test]
async fn refresh_token_renews_access_until_user_is_disabled() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let (_, member_id) = app.member_token(&admin, "erin").await;

    let login = app
        .post(
            "/api/auth/login",
            None,
            json!({"username": "erin", "password": "member123"}),
        )
        .await;
    let access = login.body["data"]["token"].as_str().expect("token").to_owned();
    let refresh = login.body["data"]["refreshToken"]
        .as_str()
        .expect("refresh token")
        .to_owned();

    // 访问令牌不能当刷新令牌用，刷新令牌也不能访问接口
    let misused = app
        .post("/api/auth/refresh-token", None, json!({"refreshToken": access}))
        .await;
    assert_eq!(misused.status, StatusCode::UNAUTHORIZED);
    let as_bearer = app.get("/api/auth/current-user", Some(&refresh)).await;
    assert_eq!(as_bearer.status, StatusCode::UNAUTHORIZED);

    let refreshed = app
        .post("/api/auth/refresh-token", None, json!({"refreshToken": refresh}))
        .await;
    assert_eq!(refreshed.status, StatusCode::OK, "{}", refreshed.body);
    assert_eq!(refreshed.body["data"]["currentUser"]["user"]["username"], "erin");
    let renewed = refreshed.body["data"]["token"]
        .as_str()
        .expect("token")
        .to_owned();
    assert_eq!(
        app.get("/api/auth/current-user", Some(&renewed)).await.status,
        StatusCode::OK
    );

    let disabled = app
        .put(&format!("/api/user/{member_id}/deactivate"), Some(&admin), json!({}))
        .await;
    assert_eq!(disabled.status, StatusCode::OK);
    let rejected = app
        .post("/api/auth/refresh-token", None, json!({"refreshToken": refresh}))
        .await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);

    app.shutdown().await;
}

#[tokio::test]
async fn profile_is_editable_by_its_owner() {
    let app = TestApp::spawn().await;
    let admin = app.admin_token().await;
    let (member, member_id) = app.member_token(&admin, "frank").await;

    let profile = app.get("/api/user/profile", Some(&member)).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert_eq!(profile.body["data"]["username"], "frank");

    let updated = app
        .put(
            "/api/user/profile",
            Some(&member),
            json!({"displayName": "Frank", "email": "frank@example.com", "username": "ignored"}),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{}", updated.body);
    assert_eq!(updated.body["data"]["displayName"], "Frank");
    assert_eq!(updated.body["data"]["username"], "frank");

    let taken = app
        .put(
            "/api/user/profile",
            Some(&admin),
            json!({"email": "frank@example.com"}),
        )
        .await;
    assert_eq!(taken.status, StatusCode::CONFLICT);

    let email = app
        .get("/api/user/check-email?email=FRANK@example.com", Some(&admin))
        .await;
    assert_eq!(email.status, StatusCode::OK);
    assert_eq!(email.body["data"]["exists"], true);

    let own = app
        .get(
            &format!("/api/user/check-username?username=frank&excludeUserId={member_id}"),
            Some(&member),
        )
        .await;
    assert_eq!(own.body["data"]["exists"], false);
    let other = app
        .get("/api/user/check-username?username=frank", Some(&admin))
        .await;
    assert_eq!(other.body["data"]["exists"], true);
    let free = app
        .get("/api/user/check-username?username=nobody", Some(&admin))
        .await;
    assert_eq!(free.body["data"]["exists"], false);

    app.shutdown().await;
}

#[tokio::test]
async fn requests_end_up_in_activity_log() {
    let app = TestApp::spawn().await;
    let token = app.admin_token().await;
    assert_eq!(app.get("/api/user", Some(&token)).await.status, StatusCode::OK);

    let mut found = false;
    for _ in 0..50 {
        let logs = app
            .get("/api/activity-logs?pageSize=50", Some(&token))
            .await;
        assert_eq!(logs.status, StatusCode::OK);
        found = logs.body["data"]["list"]
            .as_array()
            .is_some_and(|list| list.iter().any(|log| log["path"] == "/api/user"));
        if found {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(found, "activity log for /api/user was never persisted");

    app.shutdown().await;
}
