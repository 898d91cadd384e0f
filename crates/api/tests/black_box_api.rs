use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use warden_auth::HashingParams;
use warden_infra::config::BootstrapAdmin;
use warden_infra::{AccessControl, InMemoryAccessStore, OutboxNotifier, WardenConfig};

const ADMIN_EMAIL: &str = "root@example.com";
const ADMIN_PASSWORD: &str = "Sup3r-Secret!";

struct TestServer {
    base_url: String,
    outbox: Arc<OutboxNotifier>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let mut config = WardenConfig::default();
        // Cheap hashing keeps the suite fast.
        config.hashing = HashingParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        };
        config.lockout.max_attempts = 3;
        config.server.bootstrap_admin = Some(BootstrapAdmin {
            email: ADMIN_EMAIL.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        });

        let outbox = Arc::new(OutboxNotifier::new());
        let service = AccessControl::new(Arc::new(InMemoryAccessStore::new()), config)
            .expect("service")
            .with_notifier(outbox.clone());
        service.bootstrap().expect("bootstrap");
        service.load_reference().expect("reference data");

        // Same router as prod, bound to an ephemeral port.
        let app = warden_api::app::build_app(Arc::new(service));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            outbox,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn token(&self, email: &str, password: &str) -> String {
        let res = self.login(email, password).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().expect("token").to_string()
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap()
    }

    async fn send_json(&self, method: reqwest::Method, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Create an account without a profile and return its id.
    async fn create_user(&self, admin: &str, email: &str, password: &str) -> String {
        let res = self
            .send_json(
                reqwest::Method::POST,
                admin,
                "/users",
                json!({ "email": email, "display_name": "Test User", "password": password }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        assert!(body["temporary_password"].is_null());
        body["user"]["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn error_code(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(srv.url("/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "unauthenticated");

    let res = srv.get("not-a-session", "/me").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn repeated_failures_lock_the_account() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let id = srv.create_user(&admin, "lena@example.com", "Lena-Passw0rd").await;

    for _ in 0..2 {
        let res = srv.login("lena@example.com", "wrong").await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(res).await, "invalid_credentials");
    }

    let res = srv.login("lena@example.com", "wrong").await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "account_locked");
    assert!(body["locked_until"].is_string());

    // The right password does not get through while locked.
    let res = srv.login("lena@example.com", "Lena-Passw0rd").await;
    assert_eq!(res.status(), StatusCode::LOCKED);

    let lock: Value = srv.get(&admin, &format!("/users/{id}/lock")).await.json().await.unwrap();
    assert_eq!(lock["locked"], true);
    assert_eq!(lock["login_attempts"], 3);

    let res = srv
        .send_json(reqwest::Method::POST, &admin, &format!("/users/{id}/unlock"), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.login("lena@example.com", "Lena-Passw0rd").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn me_lists_the_administrator_permissions() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let res = srv.get(&admin, "/me").await;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["profile_name"], "Administrator");
    let permissions: Vec<&str> = me["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(permissions.contains(&"users.view"));
    assert!(permissions.contains(&"security.view"));
    assert_eq!(me["user"]["email"], ADMIN_EMAIL);

    let res = srv
        .send_json(reqwest::Method::POST, &admin, "/auth/logout", json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(srv.get(&admin, "/me").await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn granting_through_a_profile_opens_access() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let id = srv.create_user(&admin, "ravi@example.com", "Ravi-Passw0rd").await;
    let ravi = srv.token("ravi@example.com", "Ravi-Passw0rd").await;

    let res = srv.get(&ravi, "/users").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");

    // Users may always read themselves.
    assert_eq!(srv.get(&ravi, &format!("/users/{id}")).await.status(), StatusCode::OK);

    let res = srv
        .send_json(reqwest::Method::POST, &admin, "/profiles", json!({ "name": "Viewers" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let profile: Value = res.json().await.unwrap();
    let profile_id = profile["id"].as_str().unwrap().to_string();

    let permissions: Value = srv.get(&admin, "/permissions").await.json().await.unwrap();
    let users_view = permissions
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["key"] == "users.view")
        .expect("seeded permission");
    let permission_id = users_view["id"].as_str().unwrap();

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &admin,
            &format!("/profiles/{profile_id}/permissions/{permission_id}"),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["changed"], true);

    let res = srv
        .send_json(
            reqwest::Method::PUT,
            &admin,
            &format!("/users/{id}/profile"),
            json!({ "profile_id": profile_id }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Permissions are resolved per request, so the same session now passes.
    assert_eq!(srv.get(&ravi, "/users").await.status(), StatusCode::OK);

    let explain: Value = srv
        .get(&admin, &format!("/users/{id}/explain?permission=users.edit"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(explain["granted"], false);

    // Deactivating the profile withdraws everything it granted.
    let res = srv
        .send_json(
            reqwest::Method::PATCH,
            &admin,
            &format!("/profiles/{profile_id}"),
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.get(&ravi, "/users").await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn password_reset_token_is_single_use() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    srv.create_user(&admin, "mira@example.com", "Mira-Passw0rd").await;

    for email in ["mira@example.com", "ghost@example.com"] {
        let res = srv
            .client
            .post(srv.url("/auth/password-reset/request"))
            .json(&json!({ "email": email }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }
    assert!(srv.outbox.last_for("ghost@example.com").is_none());
    let notice = srv.outbox.last_for("mira@example.com").expect("reset notice");

    let complete = json!({ "token": notice.token, "new_password": "Fresh-Passw0rd2" });
    let res = srv
        .client
        .post(srv.url("/auth/password-reset/complete"))
        .json(&complete)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .post(srv.url("/auth/password-reset/complete"))
        .json(&complete)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(res).await, "invalid_token");

    assert_eq!(srv.login("mira@example.com", "Mira-Passw0rd").await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(srv.login("mira@example.com", "Fresh-Passw0rd2").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn weak_passwords_report_every_violation() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let res = srv
        .send_json(
            reqwest::Method::POST,
            &admin,
            "/users",
            json!({ "email": "weak@example.com", "display_name": "Weak", "password": "abc" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "policy_violation");
    assert!(body["violations"].as_array().unwrap().len() > 1);
}

#[tokio::test]
async fn incidents_are_filtered_and_summarised() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    for _ in 0..3 {
        let res = srv.login("nobody@example.com", "whatever").await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = srv.get(&admin, "/incidents?type=FAILED_LOGIN&per_page=2").await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["total_pages"], 2);

    let summary: Value = srv.get(&admin, "/incidents/summary").await.json().await.unwrap();
    assert_eq!(summary["by_type"]["FAILED_LOGIN"], 3);
    assert!(summary["by_type"]["SUCCESSFUL_LOGIN"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn reference_labels_resolve_for_any_session() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    srv.create_user(&admin, "noor@example.com", "Noor-Passw0rd").await;
    let noor = srv.token("noor@example.com", "Noor-Passw0rd").await;

    let items: Value = srv.get(&admin, "/reference/role?module=users").await.json().await.unwrap();
    assert!(!items.as_array().unwrap().is_empty());
    assert_eq!(srv.get(&noor, "/reference/role").await.status(), StatusCode::FORBIDDEN);

    let label: Value = srv.get(&noor, "/reference/role/resolve?id=1").await.json().await.unwrap();
    assert_eq!(label["display_name"], "Admin");
    assert_eq!(label["tier"], "by_id");

    let label: Value = srv
        .get(&noor, "/reference/role/resolve?code=auditor")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(label["display_name"], "Auditor");
    assert_eq!(label["tier"], "title_case");
}

#[tokio::test]
async fn reference_reload_is_admin_only_and_audited() {
    let srv = TestServer::spawn().await;
    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    srv.create_user(&admin, "ines@example.com", "Ines-Passw0rd").await;
    let ines = srv.token("ines@example.com", "Ines-Passw0rd").await;

    let res = srv.send_json(reqwest::Method::POST, &ines, "/reference", json!({})).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(res).await, "forbidden");

    let res = srv.send_json(reqwest::Method::POST, &admin, "/reference", json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["loaded"].as_u64().unwrap() > 0);

    let items: Value = srv.get(&admin, "/reference/role?module=users").await.json().await.unwrap();
    assert!(!items.as_array().unwrap().is_empty());

    let page: Value = srv
        .get(&admin, "/incidents?type=ADMIN_ACTION&per_page=5")
        .await
        .json()
        .await
        .unwrap();
    assert!(page["items"]
        .as_array()
        .unwrap()
        .iter()
        .any(|i| i["details"].as_str().unwrap_or_default().starts_with("reference data reloaded")));
}

#[tokio::test]
async fn password_check_needs_no_session() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.url("/auth/password-policy/check"))
        .json(&json!({ "password": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["valid"], false);
    assert!(body["violations"].as_array().unwrap().len() > 1);
    assert!(body["strength"]["score"].as_u64().unwrap() <= 1);

    let body: Value = srv
        .client
        .post(srv.url("/auth/password-policy/check"))
        .json(&json!({ "password": "Corr3ct-Horse-Battery" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["strength"]["label"], "Strong");
}

#[tokio::test]
async fn forwarded_address_from_an_untrusted_peer_is_ignored() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .post(srv.url("/auth/login"))
        .header("x-forwarded-for", "203.0.113.7")
        .json(&json!({ "email": "nobody@example.com", "password": "whatever" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let admin = srv.token(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let page: Value = srv
        .get(&admin, "/incidents?type=FAILED_LOGIN")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["items"][0]["ip_address"], "127.0.0.1");
}
