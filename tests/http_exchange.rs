use campus_session::application_impl::SessionManager;
use campus_session::application_port::SessionService;
use campus_session::domain_model::{SessionConfig, TokenPair};
use campus_session::domain_port::{ExchangeError, TokenExchanger};
use campus_session::infra_exchange::{HttpTokenExchanger, fake_access_token};
use campus_session::infra_store::MemoryStore;
use chrono::Utc;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use warp::Filter;
use warp::http::StatusCode;

fn fresh_token() -> String {
    let now = Utc::now();
    fake_access_token(now, now + chrono::Duration::seconds(3600))
}

/// Mimics the backend's `api/token/refresh` view for a few known refresh tokens.
fn serve_token_endpoint() -> SocketAddr {
    let refresh = warp::post()
        .and(warp::path!("api" / "token" / "refresh"))
        .and(warp::body::json())
        .map(|body: Value| {
            let (reply, status) = match body["refresh"].as_str() {
                Some("rotating") => (
                    json!({ "access": fresh_token(), "refresh": "rotated" }),
                    StatusCode::OK,
                ),
                Some("sticky") => (json!({ "access": fresh_token() }), StatusCode::OK),
                Some("hollow") => (json!({ "refresh": "rotated" }), StatusCode::OK),
                Some("broken") => (json!({}), StatusCode::BAD_GATEWAY),
                _ => (
                    json!({ "detail": "Token is invalid or expired" }),
                    StatusCode::UNAUTHORIZED,
                ),
            };
            warp::reply::with_status(warp::reply::json(&reply), status)
        });
    let garbage = warp::post()
        .and(warp::path!("garbage"))
        .map(|| "<html>maintenance</html>");
    let slow = warp::post().and(warp::path!("slow")).and_then(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, warp::Rejection>(warp::reply::json(&json!({ "access": fresh_token() })))
    });

    let (addr, server) = warp::serve(refresh.or(garbage).or(slow)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

fn exchanger(addr: SocketAddr, path: &str) -> HttpTokenExchanger {
    HttpTokenExchanger::new(format!("http://{addr}/{path}"), Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn rotated_refresh_token_is_returned() {
    let addr = serve_token_endpoint();
    let grant = exchanger(addr, "api/token/refresh")
        .exchange("rotating")
        .await
        .unwrap();
    assert!(!grant.access_token.is_empty());
    assert_eq!(grant.refresh_token.as_deref(), Some("rotated"));
}

#[tokio::test]
async fn refresh_token_is_optional_in_the_response() {
    let addr = serve_token_endpoint();
    let grant = exchanger(addr, "api/token/refresh")
        .exchange("sticky")
        .await
        .unwrap();
    assert_eq!(grant.refresh_token, None);
}

#[tokio::test]
async fn failures_are_classified() {
    let addr = serve_token_endpoint();
    let endpoint = exchanger(addr, "api/token/refresh");

    assert_eq!(
        endpoint.exchange("revoked").await.unwrap_err(),
        ExchangeError::Status(401)
    );
    assert_eq!(
        endpoint.exchange("broken").await.unwrap_err(),
        ExchangeError::Status(502)
    );
    assert_eq!(
        endpoint.exchange("hollow").await.unwrap_err(),
        ExchangeError::MissingAccessToken
    );
    assert!(matches!(
        exchanger(addr, "garbage").exchange("x").await,
        Err(ExchangeError::MalformedBody(_))
    ));
    assert!(matches!(
        exchanger(addr, "slow").exchange("x").await,
        Err(ExchangeError::Transport(_))
    ));
}

#[tokio::test]
async fn manager_refreshes_through_http() {
    let addr = serve_token_endpoint();
    let store = Arc::new(MemoryStore::new());
    let manager = SessionManager::builder(store, Arc::new(exchanger(addr, "api/token/refresh")))
        .config(SessionConfig {
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        })
        .build()
        .unwrap();

    let now = Utc::now();
    manager
        .login(TokenPair {
            access_token: fake_access_token(now, now + chrono::Duration::seconds(30)),
            refresh_token: "rotating".to_string(),
        })
        .unwrap();

    assert!(manager.force_refresh().await);
    let status = manager.session_status().unwrap();
    assert!(status.is_valid);
    assert!(status.time_until_expiry > Duration::from_secs(3500));

    manager.logout().unwrap();
    manager
        .login(TokenPair {
            access_token: fake_access_token(now, now + chrono::Duration::seconds(30)),
            refresh_token: "revoked".to_string(),
        })
        .unwrap();
    assert!(!manager.force_refresh().await);
    assert!(!manager.session_status().unwrap().is_valid);
    manager.destroy().await;
}
