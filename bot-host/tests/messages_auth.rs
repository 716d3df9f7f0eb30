use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bot_host::{build_router, AppState, HostConfig, HostMetrics};
use chrono::Utc;
use common_auth::{JwtVerifier, ResolvedPolicy, TokenValidationConfig};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for oneshot

const AUDIENCE: &str = "bot-app-id";
const KID: &str = "test-key";

struct TestHost {
    app: Router,
    metrics: Arc<HostMetrics>,
    encoding: EncodingKey,
}

fn test_host(allow_anonymous: bool) -> TestHost {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
    let private_pem = private_key.to_pkcs1_pem(LineEnding::LF).expect("private pem");
    let public_pem = private_key
        .to_public_key()
        .to_pkcs1_pem(LineEnding::LF)
        .expect("public pem");

    let policy = ResolvedPolicy::build(&TokenValidationConfig::new(AUDIENCE)).expect("policy");
    let verifier = JwtVerifier::builder(policy)
        .with_rsa_pem(KID, public_pem.as_bytes())
        .expect("pem key")
        .build();

    let metrics = Arc::new(HostMetrics::new().expect("metrics"));
    let state = AppState {
        jwt_verifier: Arc::new(verifier),
        metrics: metrics.clone(),
        config: Arc::new(HostConfig {
            allow_anonymous,
            ..HostConfig::default()
        }),
    };

    TestHost {
        app: build_router(state),
        metrics,
        encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
    }
}

fn token(encoding: &EncodingKey, audience: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({
        "iss": "https://api.botframework.com",
        "aud": audience,
        "iat": now,
        "nbf": now,
        "exp": now + 600,
        "serviceurl": "https://smba.trafficmanager.net/teams/"
    });
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.to_string());
    encode(&header, &claims, encoding).expect("sign token")
}

fn message_request(bearer: Option<&str>) -> Request<Body> {
    let body = json!({
        "type": "message",
        "id": "activity-1",
        "channelId": "msteams",
        "serviceUrl": "https://smba.trafficmanager.net/teams/",
        "from": { "id": "user-1" },
        "recipient": { "id": "bot" },
        "conversation": { "id": "conv-1" },
        "text": "hi"
    });
    let mut builder = Request::builder()
        .uri("/api/messages")
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = bearer {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let host = test_host(false);
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = host.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let host = test_host(false);
    let resp = host.app.oneshot(message_request(None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "AUTH_HEADER");
    assert_eq!(host.metrics.validation_count("AUTH_HEADER"), 1);
}

#[tokio::test]
async fn wrong_scheme_is_unauthorized() {
    let host = test_host(false);
    let resp = host
        .app
        .oneshot(message_request(Some("Basic dXNlcjpwYXNz")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_is_accepted() {
    let host = test_host(false);
    let bearer = format!("Bearer {}", token(&host.encoding, AUDIENCE));
    let resp = host.app.oneshot(message_request(Some(&bearer))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(host.metrics.validation_count("accepted"), 1);
}

#[tokio::test]
async fn token_for_other_audience_is_rejected() {
    let host = test_host(false);
    let bearer = format!("Bearer {}", token(&host.encoding, "another-bot"));
    let resp = host.app.oneshot(message_request(Some(&bearer))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "AUTH_TOKEN");
}

#[tokio::test]
async fn anonymous_allowed_when_enabled() {
    let host = test_host(true);
    let resp = host.app.oneshot(message_request(None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(host.metrics.validation_count("anonymous"), 1);
}

#[tokio::test]
async fn anonymous_mode_still_checks_presented_tokens() {
    let host = test_host(true);
    let resp = host
        .app
        .oneshot(message_request(Some("Bearer not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn metrics_expose_validation_counters() {
    let host = test_host(false);
    let _ = host
        .app
        .clone()
        .oneshot(message_request(None))
        .await
        .unwrap();

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = host.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("bot_token_validations_total"));
}
