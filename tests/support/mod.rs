//! Mock identity and geotrigger servers for the workflow tests
//!
//! Each mock binds an ephemeral port and records how it was used through
//! shared counters, so tests can assert exactly how many times each token
//! crossed the wire. Malformed requests are answered with an error body
//! the client will surface, failing the test at its assertion site.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use geotrigger::{Client, Url};
use tokio::net::TcpListener;

pub const REFRESHED_ACCESS_TOKEN: &str = "refreshed_access_token";

pub const GOOD_REGISTER_BODY: &str = r#"{"device":{"deviceId":"device_id","client_id":"good_client_id","apnsProdToken":null,"apnsSandboxToken":null,"gcmRegistrationId":null,"registered":1389531528000,"lastAccessed":1389531528000},"deviceToken":{"access_token":"good_access_token","expires_in":1799,"refresh_token":"good_refresh_token"}}"#;

pub const OLD_REGISTER_BODY: &str = r#"{"device":{"deviceId":"device_id","client_id":"good_client_id","apnsProdToken":null,"apnsSandboxToken":null,"gcmRegistrationId":null,"registered":1389531528000,"lastAccessed":1389531528000},"deviceToken":{"access_token":"old_access_token","expires_in":1799,"refresh_token":"good_refresh_token"}}"#;

pub const REGISTER_FAIL_BODY: &str =
    r#"{"error":{"code":999,"message":"Unable to register device.","details":["'client_id' invalid"]}}"#;

pub const REFRESH_SUCCESS_BODY: &str =
    r#"{"access_token":"refreshed_access_token","expires_in":1800}"#;

pub const REFRESH_FAIL_BODY: &str = r#"{"error":{"code":498,"message":"Invalid token."}}"#;

pub const INVALID_TOKEN_BODY: &str = r#"{"error":{"type":"invalidHeader","message":"invalid header or header value","headers":{"Authorization":[{"type":"invalid","message":"Invalid token."}]},"code":498}}"#;

pub const TRIGGER_LIST_BODY: &str = r#"{"triggers":[{"triggerId":"6fd01180fa1a012f27f1705681b27197","condition":{"direction":"enter","geo":{"geocode":"920 SW 3rd Ave, Portland, OR","driveTime":600,"context":{"locality":"Portland","region":"Oregon","country":"USA","zipcode":"97204"}}},"action":{"message":"Welcome to Portland - The Mayor","callback":"http://pdx.gov/welcome"},"tags":["foodcarts","citygreetings"]}],"boundingBox":{"xmin":-122.68,"ymin":45.53,"xmax":-122.45,"ymax":45.6}}"#;

/// A running mock of the geotrigger service.
///
/// Requests carrying `old_token` are answered with the invalid-token
/// envelope; requests carrying the refreshed token get the trigger list.
pub struct ServiceMock {
    pub url: Url,
    pub old_uses: Arc<AtomicUsize>,
    pub fresh_uses: Arc<AtomicUsize>,
}

/// A running mock of the identity service.
pub struct IdentityMock {
    pub url: Url,
    pub register_calls: Arc<AtomicUsize>,
    pub token_calls: Arc<AtomicUsize>,
}

pub async fn spawn_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Url::parse(&format!("http://{addr}")).expect("mock url")
}

fn form_fields(body: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str(body).unwrap_or_default()
}

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_owned()
}

pub async fn service_mock(old_token: &'static str) -> ServiceMock {
    let old_uses = Arc::new(AtomicUsize::new(0));
    let fresh_uses = Arc::new(AtomicUsize::new(0));

    let old = Arc::clone(&old_uses);
    let fresh = Arc::clone(&fresh_uses);

    let app = Router::new().route(
        "/some/route",
        post(move |headers: HeaderMap, body: String| {
            let old = Arc::clone(&old);
            let fresh = Arc::clone(&fresh);
            async move {
                let content_type = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok());
                let client_name = headers
                    .get("x-gt-client-name")
                    .and_then(|value| value.to_str().ok());
                let client_version = headers
                    .get("x-gt-client-version")
                    .and_then(|value| value.to_str().ok());

                if content_type != Some("application/json")
                    || client_name != Some("geotrigger-rs")
                    || client_version != Some(env!("CARGO_PKG_VERSION"))
                {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "bad headers".to_owned());
                }

                let params: serde_json::Value = match serde_json::from_str(&body) {
                    Ok(params) => params,
                    Err(_) => {
                        return (StatusCode::INTERNAL_SERVER_ERROR, "bad body".to_owned());
                    }
                };
                if params["tags"] != "derp" {
                    return (StatusCode::INTERNAL_SERVER_ERROR, "bad params".to_owned());
                }

                let token = bearer_token(&headers);
                if token == old_token {
                    old.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, INVALID_TOKEN_BODY.to_owned())
                } else if token == REFRESHED_ACCESS_TOKEN {
                    fresh.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::OK, TRIGGER_LIST_BODY.to_owned())
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("unexpected access token: {token}"),
                    )
                }
            }
        }),
    );

    let url = spawn_server(app).await;

    ServiceMock {
        url,
        old_uses,
        fresh_uses,
    }
}

/// Identity mock for device sessions: `register_body` answers the
/// registration route, and `refresh_bodies` answer successive
/// refresh-token grants (the last entry repeats). Refreshes are delayed
/// 80 ms so concurrent requests pile up behind them.
pub async fn device_identity_mock(
    register_body: &'static str,
    refresh_bodies: Vec<&'static str>,
) -> IdentityMock {
    let register_calls = Arc::new(AtomicUsize::new(0));
    let token_calls = Arc::new(AtomicUsize::new(0));

    let registers = Arc::clone(&register_calls);
    let tokens = Arc::clone(&token_calls);
    let refresh_bodies = Arc::new(refresh_bodies);

    let app = Router::new()
        .route(
            "/sharing/oauth2/registerDevice",
            post(move |body: String| {
                let registers = Arc::clone(&registers);
                async move {
                    registers.fetch_add(1, Ordering::SeqCst);

                    let fields = form_fields(&body);
                    if fields.len() != 2
                        || !fields.contains_key("client_id")
                        || fields.get("f").map(String::as_str) != Some("json")
                    {
                        return (
                            StatusCode::OK,
                            r#"{"error":{"code":400,"message":"bad registration request"}}"#
                                .to_owned(),
                        );
                    }

                    (StatusCode::OK, register_body.to_owned())
                }
            }),
        )
        .route(
            "/sharing/oauth2/token",
            post(move |body: String| {
                let tokens = Arc::clone(&tokens);
                let refresh_bodies = Arc::clone(&refresh_bodies);
                async move {
                    let call = tokens.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(80)).await;

                    let fields = form_fields(&body);
                    if fields.len() != 4
                        || fields.get("client_id").map(String::as_str) != Some("good_client_id")
                        || fields.get("f").map(String::as_str) != Some("json")
                        || fields.get("grant_type").map(String::as_str) != Some("refresh_token")
                        || fields.get("refresh_token").map(String::as_str)
                            != Some("good_refresh_token")
                    {
                        return (
                            StatusCode::OK,
                            r#"{"error":{"code":400,"message":"bad refresh request"}}"#.to_owned(),
                        );
                    }

                    let body = refresh_bodies
                        .get(call)
                        .or(refresh_bodies.last())
                        .copied()
                        .unwrap_or(REFRESH_SUCCESS_BODY);
                    (StatusCode::OK, body.to_owned())
                }
            }),
        );

    let url = spawn_server(app).await;

    IdentityMock {
        url,
        register_calls,
        token_calls,
    }
}

/// Identity mock for application sessions: successive client-credentials
/// grants are answered from `grant_bodies` (the last entry repeats). The
/// first grant credentials a new session and answers immediately; later
/// grants are refreshes and are delayed 80 ms.
pub async fn application_identity_mock(grant_bodies: Vec<&'static str>) -> IdentityMock {
    let register_calls = Arc::new(AtomicUsize::new(0));
    let token_calls = Arc::new(AtomicUsize::new(0));

    let tokens = Arc::clone(&token_calls);
    let grant_bodies = Arc::new(grant_bodies);

    let app = Router::new().route(
        "/sharing/oauth2/token",
        post(move |body: String| {
            let tokens = Arc::clone(&tokens);
            let grant_bodies = Arc::clone(&grant_bodies);
            async move {
                let call = tokens.fetch_add(1, Ordering::SeqCst);
                if call > 0 {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                }

                let fields = form_fields(&body);
                if fields.len() != 4
                    || !fields.contains_key("client_id")
                    || !fields.contains_key("client_secret")
                    || fields.get("grant_type").map(String::as_str) != Some("client_credentials")
                    || fields.get("f").map(String::as_str) != Some("json")
                {
                    return (
                        StatusCode::OK,
                        r#"{"error":{"code":400,"message":"bad credentials request"}}"#.to_owned(),
                    );
                }

                let body = grant_bodies
                    .get(call)
                    .or(grant_bodies.last())
                    .copied()
                    .unwrap_or(REFRESH_SUCCESS_BODY);
                (StatusCode::OK, body.to_owned())
            }
        }),
    );

    let url = spawn_server(app).await;

    IdentityMock {
        url,
        register_calls,
        token_calls,
    }
}

/// Issues four concurrent requests against one client and returns how many
/// of them failed.
///
/// With `pause_after_first`, the first request gets a 20 ms head start so
/// the other three arrive while its refresh is already in flight and park
/// at the access step; without it, all four present the stale token and
/// park at the refresh step.
pub async fn run_batch(client: &Client, pause_after_first: bool) -> usize {
    let mut handles = Vec::new();
    for index in 0..4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .request::<serde_json::Value, _>("/some/route", &serde_json::json!({"tags": "derp"}))
                .await
        }));

        if index == 0 && pause_after_first {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    let mut errors = 0;
    for handle in handles {
        if handle.await.expect("request task panicked").is_err() {
            errors += 1;
        }
    }
    errors
}
