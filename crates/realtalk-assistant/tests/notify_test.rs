use axum::{http::StatusCode, routing::post, Json, Router};
use realtalk_assistant::error::NotifyError;
use realtalk_assistant::notify::{EmailNotification, HttpNotifier, Notifier};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn notification() -> EmailNotification {
    EmailNotification {
        to: "owner@example.com".to_string(),
        subject: "New message from Jane".to_string(),
        body: "From: Jane\nContact: Not provided\nUrgency: Not specified\nTime: 2026-01-05T09:30:00Z\nMessage: hi".to_string(),
    }
}

#[tokio::test]
async fn posts_to_send_email() {
    let received = Arc::new(Mutex::new(None::<Value>));
    let sink = Arc::clone(&received);
    let app = Router::new().route(
        "/send-email",
        post(move |Json(body): Json<Value>| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock().unwrap() = Some(body);
                Json(json!({ "status": "success" }))
            }
        }),
    );
    let base = serve(app).await;

    let notifier = HttpNotifier::with_client(reqwest::Client::new(), format!("{base}/send-email"));
    notifier.notify(notification()).await.unwrap();

    let body = received.lock().unwrap().clone().unwrap();
    assert_eq!(body["to"], "owner@example.com");
    assert_eq!(body["subject"], "New message from Jane");
    assert!(body["body"].as_str().unwrap().contains("Message: hi"));
}

#[tokio::test]
async fn backend_failure_carries_reason() {
    let app = Router::new().route(
        "/send-email",
        post(|| async {
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "SMTP relay unavailable" })),
            )
        }),
    );
    let base = serve(app).await;

    let notifier = HttpNotifier::with_client(reqwest::Client::new(), format!("{base}/send-email"));
    let err = notifier.notify(notification()).await.unwrap_err();

    match err {
        NotifyError::Rejected { status, reason } => {
            assert_eq!(status, 502);
            assert_eq!(reason, "SMTP relay unavailable");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}
