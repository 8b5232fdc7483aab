mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tower::ServiceExt;

use folio::domain::analytics::AnalyticsEvent;
use folio::infra::http::build_router;

use support::{Harness, HarnessOptions, SUDO_KEY, harness};

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).expect("utf8 body")
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    fn set_cookie(&self) -> String {
        self.header("set-cookie").unwrap_or_default().to_string()
    }
}

fn router(h: &Harness) -> Router {
    build_router(h.state.clone())
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    Reply {
        status,
        headers,
        body,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn post_json(uri: &str, sudo: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = sudo {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

fn with_cookie(uri: &str, method: Method, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("auth_token={token}"))
        .body(Body::empty())
        .expect("request should build")
}

async fn login(app: &Router) -> String {
    let reply = send(app, post_json("/api/authenticate", Some(SUDO_KEY), json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.json()["token"]
        .as_str()
        .expect("token field")
        .to_string()
}

#[tokio::test]
async fn listing_reports_cache_status() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let first = send(&app, get("/api/blogs?page=1&limit=2&sortBy=title&order=asc")).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.header("x-cache"), Some("MISS"));
    assert!(first.header("x-request-id").is_some());

    let body = first.json();
    assert_eq!(body["total"], 3);
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["blogs"][0]["title"], "First");
    assert_eq!(body["blogs"][1]["title"], "Second");

    let second = send(&app, get("/api/blogs?page=1&limit=2&sortBy=title&order=asc")).await;
    assert_eq!(second.header("x-cache"), Some("HIT"));
    assert_eq!(second.body, first.body);
    assert_eq!(h.blogs.list_calls(), 1);
}

#[tokio::test]
async fn unknown_sort_values_fall_back_to_defaults() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let odd = send(&app, get("/api/blogs?sortBy=drop_table&order=sideways")).await;
    assert_eq!(odd.status, StatusCode::OK);
    assert_eq!(odd.header("x-cache"), Some("MISS"));

    // Same normalized query, same cache entry.
    let plain = send(&app, get("/api/blogs")).await;
    assert_eq!(plain.header("x-cache"), Some("HIT"));
    assert_eq!(plain.json()["blogs"][0]["id"], "ccccccc");
}

#[tokio::test]
async fn malformed_page_numbers_fall_back_to_defaults() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    for uri in ["/api/blogs?page=abc", "/api/blogs?page=", "/api/blogs?limit=-3"] {
        let reply = send(&app, get(uri)).await;
        assert_eq!(reply.status, StatusCode::OK, "{uri}");
        let body = reply.json();
        assert_eq!(body["page"], 1, "{uri}");
        assert_eq!(body["limit"], 10, "{uri}");
    }
    // All three normalize to the default listing.
    assert_eq!(h.blogs.list_calls(), 1);
}

#[tokio::test]
async fn single_blog_lookup() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let found = send(&app, get("/api/blog?id=aaaaaaa")).await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.json()["title"], "First");

    let missing_param = send(&app, get("/api/blog")).await;
    assert_eq!(missing_param.status, StatusCode::BAD_REQUEST);

    let malformed = send(&app, get("/api/blog?id=..%2Fetc")).await;
    assert_eq!(malformed.status, StatusCode::BAD_REQUEST);

    let unknown = send(&app, get("/api/blog?id=zzzzzzz")).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
    assert_eq!(unknown.json()["error"]["code"], "not_found");
}

#[tokio::test]
async fn creating_a_blog_requires_the_admin_key() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);
    let payload = json!({ "title": "Fourth", "summary": "newest", "parts": ["one"] });

    let anonymous = send(&app, post_json("/api/blog", None, payload.clone())).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let wrong = send(&app, post_json("/api/blog", Some("guess"), payload.clone())).await;
    assert_eq!(wrong.status, StatusCode::FORBIDDEN);

    let blank_title = send(
        &app,
        post_json("/api/blog", Some(SUDO_KEY), json!({ "title": "   " })),
    )
    .await;
    assert_eq!(blank_title.status, StatusCode::BAD_REQUEST);

    assert_eq!(h.blogs.records.lock().await.len(), 3);
}

#[tokio::test]
async fn created_blog_shows_up_in_next_listing() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let warm = send(&app, get("/api/blogs")).await;
    assert_eq!(warm.header("x-cache"), Some("MISS"));

    let created = send(
        &app,
        post_json(
            "/api/blog",
            Some(SUDO_KEY),
            json!({ "title": "Fourth", "summary": "newest" }),
        ),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    let id = created.json()["id"].as_str().expect("id").to_string();

    let listing = send(&app, get("/api/blogs")).await;
    assert_eq!(listing.header("x-cache"), Some("MISS"));
    let body = listing.json();
    assert_eq!(body["total"], 4);
    assert_eq!(body["blogs"][0]["id"], id.as_str());
}

#[tokio::test]
async fn sudo_check() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let ok = send(&app, post_json("/api/sudo", Some(SUDO_KEY), json!({}))).await;
    assert_eq!(ok.status, StatusCode::NO_CONTENT);

    let missing = send(&app, post_json("/api/sudo", None, json!({}))).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.json()["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn admin_routes_refuse_everything_without_a_configured_key() {
    let h = harness(HarnessOptions {
        sudo_key: None,
        ..Default::default()
    });
    let app = router(&h);

    let reply = send(&app, post_json("/api/sudo", Some(SUDO_KEY), json!({}))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn session_cookie_lifecycle() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let reply = send(&app, post_json("/api/authenticate", Some(SUDO_KEY), json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);
    let token = reply.json()["token"].as_str().expect("token").to_string();
    assert_eq!(token.len(), 64);

    let cookie = reply.set_cookie();
    assert!(cookie.starts_with(&format!("auth_token={token}")));
    for attribute in ["HttpOnly", "Secure", "SameSite=Strict", "Path=/", "Max-Age=1800"] {
        assert!(cookie.contains(attribute), "missing {attribute} in {cookie}");
    }

    let verified = send(
        &app,
        with_cookie(&format!("/api/verify_auth?token={token}"), Method::GET, &token),
    )
    .await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.text(), "Authorized");
    assert!(verified.set_cookie().contains(&token));

    let logout = send(&app, with_cookie("/api/logout", Method::POST, &token)).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    assert!(logout.set_cookie().contains("Max-Age=0"));
    assert!(h.tokens.is_empty());

    let after = send(
        &app,
        with_cookie(&format!("/api/verify_auth?token={token}"), Method::GET, &token),
    )
    .await;
    assert_eq!(after.status, StatusCode::FORBIDDEN);
    assert_eq!(after.text(), "Invalid or expired token");
}

#[tokio::test]
async fn verify_rejects_missing_and_mismatched_tokens() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);
    let token = login(&app).await;

    let no_cookie = send(&app, get(&format!("/api/verify_auth?token={token}"))).await;
    assert_eq!(no_cookie.status, StatusCode::FORBIDDEN);
    assert_eq!(no_cookie.text(), "Missing auth token");

    let mismatch = send(
        &app,
        with_cookie("/api/verify_auth?token=deadbeef", Method::GET, &token),
    )
    .await;
    assert_eq!(mismatch.status, StatusCode::FORBIDDEN);
    assert_eq!(mismatch.text(), "Token mismatch");
}

#[tokio::test]
async fn sessions_slide_and_then_expire() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);
    let token = login(&app).await;
    let verify = || with_cookie(&format!("/api/verify_auth?token={token}"), Method::GET, &token);

    h.clock.advance(Duration::from_secs(20 * 60));
    assert_eq!(send(&app, verify()).await.status, StatusCode::OK);

    // Renewed at minute 20, so still alive at minute 45.
    h.clock.advance(Duration::from_secs(25 * 60));
    assert_eq!(send(&app, verify()).await.status, StatusCode::OK);

    h.clock.advance(Duration::from_secs(30 * 60));
    assert_eq!(send(&app, verify()).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn renewed_cookie_never_outlives_the_lifetime_cap() {
    let h = harness(HarnessOptions {
        token_max_lifetime: Some(Duration::from_secs(45 * 60)),
        ..HarnessOptions::default()
    });
    let app = router(&h);

    let login = send(&app, post_json("/api/authenticate", Some(SUDO_KEY), json!({}))).await;
    assert!(login.set_cookie().contains("Max-Age=1800"), "{}", login.set_cookie());
    let token = login.json()["token"].as_str().expect("token").to_string();

    h.clock.advance(Duration::from_secs(20 * 60));
    let verified = send(
        &app,
        with_cookie(&format!("/api/verify_auth?token={token}"), Method::GET, &token),
    )
    .await;
    assert_eq!(verified.status, StatusCode::OK);
    let cookie = verified.set_cookie();
    assert!(cookie.contains("Max-Age=1500"), "{cookie}");
}

#[tokio::test]
async fn analytics_fills_client_ip_and_timestamp() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/analytics")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .header("x-real-ip", "10.0.0.9")
        .body(Body::from(
            json!({
                "session_id": "s-1",
                "event_type": "page_view",
                "page_url": "https://example.com/blog/aaaaaaa",
                "referrer_url": "  ",
                "screen_width": 1440
            })
            .to_string(),
        ))
        .expect("request should build");

    let reply = send(&app, request).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let events = h.analytics.events.lock().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.ip_address.as_deref(), Some("203.0.113.7"));
    assert!(event.event_timestamp.is_some());
    assert_eq!(event.referrer_url, None);
    assert_eq!(event.screen_width, Some(1440));
}

#[tokio::test]
async fn analytics_rejects_events_without_required_fields() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let reply = send(
        &app,
        post_json(
            "/api/analytics",
            None,
            json!({ "session_id": " ", "event_type": "click", "page_url": "/" }),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(h.analytics.events.lock().await.is_empty());
}

fn stored_event(event_type: &str, age: time::Duration) -> AnalyticsEvent {
    AnalyticsEvent {
        session_id: "s-1".into(),
        event_type: event_type.into(),
        event_timestamp: Some(OffsetDateTime::now_utc() - age),
        page_url: "https://example.com/blog/aaaaaaa".into(),
        ..AnalyticsEvent::default()
    }
}

#[tokio::test]
async fn analytics_dashboard_needs_a_live_session() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let anonymous = send(&app, get("/api/analytics")).await;
    assert_eq!(anonymous.status, StatusCode::FORBIDDEN);
    assert_eq!(anonymous.json()["error"]["code"], "forbidden");

    let forged = send(&app, with_cookie("/api/analytics", Method::GET, "deadbeef")).await;
    assert_eq!(forged.status, StatusCode::FORBIDDEN);
    assert!(h.analytics.last_filter.lock().await.is_none());
}

#[tokio::test]
async fn analytics_dashboard_filters_by_range_and_type() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);
    let token = login(&app).await;

    h.analytics.events.lock().await.extend([
        stored_event("page_view", time::Duration::hours(2)),
        stored_event("click", time::Duration::days(3)),
        stored_event("page_view", time::Duration::days(20)),
    ]);

    let cases = [
        ("/api/analytics", 2),
        ("/api/analytics?time_range=24h", 1),
        ("/api/analytics?time_range=30d&event_type=page_view", 2),
        ("/api/analytics?time_range=90d&event_type=all", 3),
        ("/api/analytics?time_range=7d&event_type=click", 1),
    ];
    for (uri, expected) in cases {
        let reply = send(&app, with_cookie(uri, Method::GET, &token)).await;
        assert_eq!(reply.status, StatusCode::OK, "{uri}");
        let events = reply.json();
        assert_eq!(events.as_array().map(Vec::len), Some(expected), "{uri}");
    }

    send(&app, with_cookie("/api/analytics?time_range=24h", Method::GET, &token)).await;
    let filter = h.analytics.last_filter.lock().await.clone().expect("filter");
    let expected = OffsetDateTime::now_utc() - time::Duration::hours(24);
    assert!((filter.since - expected).abs() < time::Duration::minutes(1));
    assert_eq!(filter.event_type, None);
}

#[tokio::test]
async fn analytics_dashboard_rejects_unknown_time_range() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);
    let token = login(&app).await;

    let reply = send(
        &app,
        with_cookie("/api/analytics?time_range=1y", Method::GET, &token),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"]["code"], "invalid_input");
    assert!(h.analytics.last_filter.lock().await.is_none());
}

#[tokio::test]
async fn cdn_purge_outcomes() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let empty = send(
        &app,
        post_json("/api/purge_cache", Some(SUDO_KEY), json!({ "paths": [] })),
    )
    .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let ok = send(
        &app,
        post_json(
            "/api/purge_cache",
            Some(SUDO_KEY),
            json!({ "paths": ["/blog/aaaaaaa", " /sitemap.xml "] }),
        ),
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.json()["purged"], 2);
    assert_eq!(
        *h.purger.purged.lock().await,
        vec!["/blog/aaaaaaa".to_string(), "/sitemap.xml".to_string()]
    );

    h.purger.reject.store(true, Ordering::SeqCst);
    let rejected = send(
        &app,
        post_json(
            "/api/purge_cache",
            Some(SUDO_KEY),
            json!({ "paths": ["/blog/bbbbbbb"] }),
        ),
    )
    .await;
    assert_eq!(rejected.status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn cdn_purge_without_configuration_is_unavailable() {
    let h = harness(HarnessOptions {
        cdn: false,
        ..Default::default()
    });
    let app = router(&h);

    let reply = send(
        &app,
        post_json("/api/purge_cache", Some(SUDO_KEY), json!({ "paths": ["/"] })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn purge_all_clears_listing_cache() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    send(&app, get("/api/blogs")).await;
    assert_eq!(h.listing.len(), 1);

    let reply = send(&app, post_json("/api/purge_all_cache", Some(SUDO_KEY), json!({}))).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(h.listing.is_empty());

    let again = send(&app, get("/api/blogs")).await;
    assert_eq!(again.header("x-cache"), Some("MISS"));
}

#[tokio::test]
async fn health_reflects_database_state() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let healthy = send(&app, get("/api/healthz")).await;
    assert_eq!(healthy.status, StatusCode::OK);
    let body = healthy.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["components"]["database"]["status"], "ok");

    h.health.down.store(true, Ordering::SeqCst);
    let degraded = send(&app, get("/api/healthz")).await;
    assert_eq!(degraded.status, StatusCode::SERVICE_UNAVAILABLE);
    let body = degraded.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["database"]["status"], "error");
}

#[tokio::test]
async fn version_reports_package_version() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let reply = send(&app, get("/api/version")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn inbound_request_id_is_echoed() {
    let h = harness(HarnessOptions::default());
    let app = router(&h);

    let request = Request::builder()
        .uri("/api/version")
        .header("x-request-id", "trace-123")
        .body(Body::empty())
        .expect("request should build");
    let reply = send(&app, request).await;
    assert_eq!(reply.header("x-request-id"), Some("trace-123"));
}
