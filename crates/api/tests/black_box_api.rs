use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};

use tollgate_api::app::{AppServices, build_app};
use tollgate_auth::{SessionClaims, SessionIssuer, TokenKind};
use tollgate_infra::TollgateConfig;
use tollgate_infra::config::BootstrapAdmin;

const ADMIN: (&str, &str) = ("root", "root-password");

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    issuer: SessionIssuer,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same wiring as `tollgate serve`, in-memory backends, ephemeral port.
        let key_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../auth/testdata/private.rsa");
        let mut config = TollgateConfig::default();
        config.signing.private_key_path = key_path.clone();
        config.bootstrap = Some(BootstrapAdmin {
            username: ADMIN.0.to_string(),
            password: ADMIN.1.to_string(),
        });

        let services = AppServices::from_config(&config).await.expect("services");
        services.bootstrap(&config).await.expect("bootstrap");
        let app = build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let pem = std::fs::read_to_string(key_path).unwrap();
        Self {
            base_url,
            client: reqwest::Client::new(),
            issuer: SessionIssuer::from_private_key_pem(&pem).unwrap(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Log in and return the `Cookie` header value to replay.
    async fn login(&self, username: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.url("/api/v1/login"))
            .json(&json!({"username": username, "password": password}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let set_cookie = res
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap()
            .to_string();
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, json!({"message": "ok", "code": 0, "data": {}}));
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap())
    }

    async fn create_user(&self, admin_cookie: &str, username: &str, password: &str) -> i64 {
        let (status, body) = self
            .send(
                self.client
                    .post(self.url("/api/v1/users"))
                    .header("cookie", admin_cookie)
                    .json(&json!({"username": username, "password": password})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }

    async fn register_app(&self, admin_cookie: &str, site: &str, redirect: &str) -> String {
        let (status, body) = self
            .send(
                self.client
                    .post(self.url("/api/v1/apps"))
                    .header("cookie", admin_cookie)
                    .json(&json!({"name": "web", "site": site, "redirect": redirect})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["app_key"].as_str().unwrap().to_string()
    }

    async fn auth(&self, cookie: Option<&str>, redirect: &str) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url("/api/v1/auth")).json(&json!({"redirect": redirect}));
        if let Some(cookie) = cookie {
            req = req.header("cookie", cookie);
        }
        self.send(req).await
    }

    async fn verify(&self, app_key: Option<&str>, ticket: &str) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url("/api/v1/verify")).json(&json!({"ticket": ticket}));
        if let Some(key) = app_key {
            req = req.header("X-App-Key", key);
        }
        self.send(req).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

fn assert_error(actual: (StatusCode, Value), status: StatusCode, message: &str) {
    assert_eq!(actual.0, status, "{}", actual.1);
    assert_eq!(actual.1, json!({"message": message, "code": 2, "data": {}}));
}

#[tokio::test]
async fn health_answers_with_envelope() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv.send(srv.client.get(srv.url("/health"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "ok", "code": 0, "data": {}}));
}

#[tokio::test]
async fn login_sets_http_only_session_cookie() {
    let srv = TestServer::spawn().await;
    let res = srv
        .client
        .post(srv.url("/api/v1/login"))
        .json(&json!({"username": ADMIN.0, "password": ADMIN.1}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res.headers()[reqwest::header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("tollgate_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));

    let token = cookie.split(';').next().unwrap().trim_start_matches("tollgate_session=");
    let claims = srv.issuer.verify(token).unwrap();
    assert!(claims.expires_at - claims.issued_at >= ChronoDuration::days(365));
}

#[tokio::test]
async fn bad_credentials_are_incorrect_password() {
    let srv = TestServer::spawn().await;
    for (username, password) in [(ADMIN.0, "nope"), ("ghost", ADMIN.1)] {
        let res = srv
            .send(
                srv.client
                    .post(srv.url("/api/v1/login"))
                    .json(&json!({"username": username, "password": password})),
            )
            .await;
        assert_error(res, StatusCode::UNAUTHORIZED, "incorrect.password");
    }
}

#[tokio::test]
async fn malformed_body_is_bind_error() {
    let srv = TestServer::spawn().await;
    let res = srv
        .send(
            srv.client
                .post(srv.url("/api/v1/login"))
                .header("content-type", "application/json")
                .body("{not json"),
        )
        .await;
    assert_error(res, StatusCode::BAD_REQUEST, "bind.error");
}

#[tokio::test]
async fn end_to_end_handoff_and_replay_rejected() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    srv.create_user(&admin, "bob", "bob-password").await;
    let app_key = srv
        .register_app(&admin, "http://app.example", "http://app.example/sso/callback")
        .await;
    assert_eq!(app_key.len(), 20);

    let bob = srv.login("bob", "bob-password").await;
    let (status, body) = srv.auth(Some(&bob), "http://app.example/reports?id=7").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let redirect = body["data"]["redirect"].as_str().unwrap();
    assert!(redirect.starts_with("http://app.example/sso/callback?"), "{redirect}");
    assert!(query_param(redirect, "redirect").is_some());
    let ticket = query_param(redirect, "ticket").unwrap();
    assert_eq!(ticket.len(), 32);

    let (status, body) = srv.verify(Some(&app_key), &ticket).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "ok");
    let token = body["data"]["token"].as_str().unwrap();
    let claims = srv.issuer.verify(token).unwrap();
    assert_eq!(claims.sub, "bob");
    assert_eq!(claims.kind, TokenKind::Scoped);
    assert_eq!(claims.expires_at - claims.issued_at, ChronoDuration::hours(1));

    let replay = srv.verify(Some(&app_key), &ticket).await;
    assert_error(replay, StatusCode::UNAUTHORIZED, "bad.ticket");
}

#[tokio::test]
async fn auth_requires_a_valid_session_cookie() {
    let srv = TestServer::spawn().await;
    assert_error(
        srv.auth(None, "http://app.example/").await,
        StatusCode::UNAUTHORIZED,
        "get.jwt.error",
    );
    assert_error(
        srv.auth(Some("tollgate_session=garbage"), "http://app.example/").await,
        StatusCode::UNAUTHORIZED,
        "check.jwt.error",
    );
}

#[tokio::test]
async fn hs256_forgery_is_rejected() {
    let srv = TestServer::spawn().await;
    let claims = SessionClaims::new(TokenKind::Session, "1", Utc::now(), ChronoDuration::hours(1));
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"guessable"),
    )
    .unwrap();
    let res = srv.auth(Some(&format!("tollgate_session={forged}")), "http://app.example/").await;
    assert_error(res, StatusCode::UNAUTHORIZED, "check.jwt.error");
}

#[tokio::test]
async fn scoped_token_is_not_a_session() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    let admin_id = srv.issuer.verify(admin.trim_start_matches("tollgate_session=")).unwrap().sub;
    let scoped = srv
        .issuer
        .sign(&SessionClaims::new(TokenKind::Scoped, admin_id, Utc::now(), ChronoDuration::hours(1)))
        .unwrap();
    let res = srv.auth(Some(&format!("tollgate_session={scoped}")), "http://app.example/").await;
    assert_error(res, StatusCode::UNAUTHORIZED, "check.jwt.error");
}

#[tokio::test]
async fn numeric_username_cannot_turn_a_handoff_into_an_admin_session() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    let admin_id = srv.issuer.verify(admin.trim_start_matches("tollgate_session=")).unwrap().sub;
    srv.create_user(&admin, "mallory", "mallory-password").await;
    let app_key = srv
        .register_app(&admin, "http://app.example", "http://app.example/cb")
        .await;

    let mallory = srv.login("mallory", "mallory-password").await;
    let (status, _) = srv
        .send(
            srv.client
                .put(srv.url("/api/v1/me/username"))
                .header("cookie", &mallory)
                .json(&json!({"username": admin_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv.auth(Some(&mallory), "http://app.example/").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let ticket = query_param(body["data"]["redirect"].as_str().unwrap(), "ticket").unwrap();
    let (status, body) = srv.verify(Some(&app_key), &ticket).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let scoped = body["data"]["token"].as_str().unwrap();
    assert_eq!(srv.issuer.verify(scoped).unwrap().sub, admin_id);

    let res = srv
        .send(
            srv.client
                .get(srv.url("/api/v1/users"))
                .header("cookie", format!("tollgate_session={scoped}")),
        )
        .await;
    assert_error(res, StatusCode::UNAUTHORIZED, "check.jwt.error");
}

#[tokio::test]
async fn redirect_errors() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    srv.register_app(&admin, "http://app.example", "http://app.example/cb")
        .await;

    assert_error(
        srv.auth(Some(&admin), "::not a url::").await,
        StatusCode::BAD_REQUEST,
        "bad.url.parse",
    );
    assert_error(
        srv.auth(Some(&admin), "http://elsewhere.example/").await,
        StatusCode::NOT_FOUND,
        "app.exist",
    );
    // Origin includes the port.
    assert_error(
        srv.auth(Some(&admin), "http://app.example:8443/").await,
        StatusCode::NOT_FOUND,
        "app.exist",
    );
}

#[tokio::test]
async fn verify_requires_a_registered_key() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    let app_key = srv.register_app(&admin, "http://app.example", "http://app.example/cb").await;
    let (_, body) = srv.auth(Some(&admin), "http://app.example/").await;
    let ticket = query_param(body["data"]["redirect"].as_str().unwrap(), "ticket").unwrap();

    assert_error(srv.verify(None, &ticket).await, StatusCode::BAD_REQUEST, "bind.error");
    assert_error(
        srv.verify(Some("wrong-key"), &ticket).await,
        StatusCode::UNAUTHORIZED,
        "app.key.invalid",
    );

    // Rejected attempts did not consume the ticket.
    let (status, _) = srv.verify(Some(&app_key), &ticket).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_are_gated_by_role() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    let bob_id = srv.create_user(&admin, "bob", "bob-password").await;
    let bob = srv.login("bob", "bob-password").await;

    let list_as_bob = || srv.send(srv.client.get(srv.url("/api/v1/users")).header("cookie", &bob));
    assert_error(list_as_bob().await, StatusCode::FORBIDDEN, "unauthorized");

    let (status, _) = srv
        .send(
            srv.client
                .post(srv.url("/api/v1/users/admin"))
                .header("cookie", &admin)
                .json(&json!({"id": bob_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = list_as_bob().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["list"].as_array().unwrap().len(), 2);

    let (status, _) = srv
        .send(
            srv.client
                .delete(srv.url("/api/v1/users/admin"))
                .header("cookie", &admin)
                .json(&json!({"id": bob_id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_error(list_as_bob().await, StatusCode::FORBIDDEN, "unauthorized");
}

#[tokio::test]
async fn user_management() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    let id = srv.create_user(&admin, "carol", "pw").await;

    let dup = srv
        .send(
            srv.client
                .post(srv.url("/api/v1/users"))
                .header("cookie", &admin)
                .json(&json!({"username": "carol", "password": "pw"})),
        )
        .await;
    assert_error(dup, StatusCode::CONFLICT, "user.is.exist");

    let (status, body) = srv
        .send(
            srv.client
                .get(srv.url("/api/v1/users?username=car&pageSize=0"))
                .header("cookie", &admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pageSize"], 20);
    let list = body["data"]["list"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["username"], "carol");
    assert!(list[0].get("password_hash").is_none());

    let (status, _) = srv
        .send(
            srv.client
                .delete(srv.url("/api/v1/users"))
                .header("cookie", &admin)
                .json(&json!({"id": id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let gone = srv
        .send(
            srv.client
                .post(srv.url("/api/v1/users/admin"))
                .header("cookie", &admin)
                .json(&json!({"id": id})),
        )
        .await;
    assert_error(gone, StatusCode::NOT_FOUND, "user.not.exist");
}

#[tokio::test]
async fn page_past_the_end_is_a_warning() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    let (status, body) = srv
        .send(
            srv.client
                .get(srv.url("/api/v1/users?page=5&pageSize=10"))
                .header("cookie", &admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "calculate.offset");
    assert_eq!(body["code"], 1);
    assert_eq!(body["data"]["list"], json!([]));
}

#[tokio::test]
async fn application_management() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    srv.register_app(&admin, "http://one.example", "http://one.example/cb").await;

    let dup_site = srv
        .send(
            srv.client
                .post(srv.url("/api/v1/apps"))
                .header("cookie", &admin)
                .json(&json!({"name": "again", "site": "http://one.example", "redirect": "http://one.example/other"})),
        )
        .await;
    assert_error(dup_site, StatusCode::CONFLICT, "app.exist");

    let bad_site = srv
        .send(
            srv.client
                .post(srv.url("/api/v1/apps"))
                .header("cookie", &admin)
                .json(&json!({"name": "bad", "site": "not a site", "redirect": "http://x.example/cb"})),
        )
        .await;
    assert_error(bad_site, StatusCode::BAD_REQUEST, "bad.url.parse");

    let (_, body) = srv
        .send(srv.client.get(srv.url("/api/v1/apps?name=web")).header("cookie", &admin))
        .await;
    let app = &body["data"]["list"][0];
    let id = app["id"].as_i64().unwrap();
    assert_eq!(app["site"], "http://one.example");

    let (status, _) = srv
        .send(
            srv.client
                .put(srv.url("/api/v1/apps"))
                .header("cookie", &admin)
                .json(&json!({"id": id, "name": "web", "site": "http://two.example", "redirect": "http://two.example/cb"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv.auth(Some(&admin), "http://two.example/x").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv
        .send(
            srv.client
                .delete(srv.url("/api/v1/apps"))
                .header("cookie", &admin)
                .json(&json!({"id": id})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_error(
        srv.auth(Some(&admin), "http://two.example/x").await,
        StatusCode::NOT_FOUND,
        "app.exist",
    );
}

#[tokio::test]
async fn self_service_password_and_username() {
    let srv = TestServer::spawn().await;
    let admin = srv.login(ADMIN.0, ADMIN.1).await;
    srv.create_user(&admin, "dave", "old").await;
    let dave = srv.login("dave", "old").await;

    let wrong = srv
        .send(
            srv.client
                .put(srv.url("/api/v1/me/password"))
                .header("cookie", &dave)
                .json(&json!({"password": "not-old", "newPassword": "new"})),
        )
        .await;
    assert_error(wrong, StatusCode::UNAUTHORIZED, "incorrect.password");

    let (status, _) = srv
        .send(
            srv.client
                .put(srv.url("/api/v1/me/password"))
                .header("cookie", &dave)
                .json(&json!({"password": "old", "newPassword": "new"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let taken = srv
        .send(
            srv.client
                .put(srv.url("/api/v1/me/username"))
                .header("cookie", &dave)
                .json(&json!({"username": ADMIN.0})),
        )
        .await;
    assert_error(taken, StatusCode::CONFLICT, "user.is.exist");

    let (status, _) = srv
        .send(
            srv.client
                .put(srv.url("/api/v1/me/username"))
                .header("cookie", &dave)
                .json(&json!({"username": "david"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    srv.login("david", "new").await;
}
