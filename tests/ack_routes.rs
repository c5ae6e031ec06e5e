//! Integration tests for the acknowledgement REST API.
//!
//! Each test spins up the real router on a random port and talks to it
//! with reqwest.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use resolvx::ack::{AckManager, AckRouteState, ack_routes};
use resolvx::config::FollowupConfig;
use resolvx::store::{Database, LibSqlBackend};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start the API on a random port, return its base URL.
async fn start_server() -> String {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let manager = Arc::new(AckManager::new(db, &FollowupConfig::default()));
    let app = ack_routes(AckRouteState { manager });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_reports_service() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "healthy", "service": "resolvx"}));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn scenario_c_over_http() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let (status, body) = post(
            &base,
            "/api/acknowledgements",
            json!({"bookingId": "booking-1", "customerEmail": "a@b.com", "ticketReference": "TKT-9"}),
        )
        .await;
        assert_eq!(status, 200);
        assert!(body["message"].as_str().unwrap().contains("booking booking-1"));
        assert_eq!(body["record"]["state"], "AWAITING_UPI");
        assert!(body["followup"]["dueAt"].is_string());

        let upi = json!({"bookingId": "booking-1", "customerEmail": "a@b.com", "upiId": "upi-1"});
        let (status, body) = post(&base, "/api/acknowledgements/upi", upi.clone()).await;
        assert_eq!(status, 200);
        assert_eq!(body["record"]["state"], "UPI_PROVIDED");
        assert_eq!(
            body["followup"]["message"],
            "The refund is reinitiated; track the refund with ticket reference TKT-9"
        );

        let (status, body) = post(&base, "/api/acknowledgements/upi", upi).await;
        assert_eq!(status, 409);
        assert!(body["error"].as_str().unwrap().contains("UPI_PROVIDED"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn upi_without_acknowledgement_is_404_and_creates_nothing() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let (status, _) = post(
            &base,
            "/api/acknowledgements/upi",
            json!({"booking_id": "booking-x", "customer_email": "a@b.com", "upi_id": "upi-1"}),
        )
        .await;
        assert_eq!(status, 404);

        let list: Value = reqwest::get(format!("{base}/api/acknowledgements"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list, json!([]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn legacy_pascal_case_body_is_accepted() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let (status, body) = post(
            &base,
            "/api/acknowledgements",
            json!({"BookingId": "booking-2", "CustomerEmail": "c@d.com"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["record"]["bookingId"], "booking-2");
        assert_eq!(body["record"]["customerEmail"], "c@d.com");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_bodies_are_400() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;

        let (status, _) = post(&base, "/api/acknowledgements", json!({"customerEmail": "a@b.com"})).await;
        assert_eq!(status, 400);

        let (status, _) = post(
            &base,
            "/api/acknowledgements/upi",
            json!({"bookingId": "booking-1", "customerEmail": "a@b.com"}),
        )
        .await;
        assert_eq!(status, 400);

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/acknowledgements"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn list_returns_records() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        post(
            &base,
            "/api/acknowledgements",
            json!({"bookingId": "booking-1", "customerEmail": "a@b.com"}),
        )
        .await;

        let list: Value = reqwest::get(format!("{base}/api/acknowledgements"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let records = list.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["state"], "AWAITING_UPI");
        assert_eq!(records[0]["version"], 1);
    })
    .await
    .expect("test timed out");
}
