//! SendGrid client against a local fake provider

mod common;

use axum::http::StatusCode;
use common::{FakeSendGrid, API_KEY, MESSAGE_ID};
use relay_rs::delivery::{
    Attachment, DeliveryClient, MailAddress, OutboundMessage, Personalization, SendGridClient,
};
use relay_rs::RelayError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn message() -> OutboundMessage {
    OutboundMessage {
        from: Some(MailAddress::new("a@x.com", Some("Alice"))),
        personalizations: vec![Personalization {
            to: vec![MailAddress::new("b@x.com", Some(""))],
            ..Default::default()
        }],
        subject: Some("S".to_string()),
        plain_text_content: Some("hi".to_string()),
        headers: vec![("X-Custom".to_string(), "1".to_string())],
        attachments: vec![Attachment {
            content: Some("aGk=".to_string()),
            filename: Some("f.txt".to_string()),
            disposition: Some("attachment".to_string()),
            media_type: "text/plain".to_string(),
            content_id: None,
        }],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_accepted_request() {
    let provider = FakeSendGrid::start(StatusCode::ACCEPTED).await;
    let client = provider.client(Duration::from_secs(5));

    let receipt = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(receipt.status, 202);
    assert_eq!(receipt.message_id.as_deref(), Some(MESSAGE_ID));

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some(format!("Bearer {}", API_KEY).as_str())
    );

    let body = &requests[0].body;
    assert_eq!(body["from"]["email"], "a@x.com");
    assert_eq!(body["from"]["name"], "Alice");
    assert_eq!(body["personalizations"][0]["to"][0]["email"], "b@x.com");
    assert!(body["personalizations"][0]["to"][0].get("name").is_none());
    assert!(body["personalizations"][0].get("cc").is_none());
    assert!(body.get("reply_to").is_none());
    assert_eq!(body["subject"], "S");
    assert_eq!(body["content"][0]["type"], "text/plain");
    assert_eq!(body["content"][0]["value"], "hi");
    assert_eq!(body["attachments"][0]["filename"], "f.txt");
    assert_eq!(body["attachments"][0]["content"], "aGk=");
    assert_eq!(body["headers"]["X-Custom"], "1");
}

#[tokio::test]
async fn test_server_error_is_permanent() {
    let provider = FakeSendGrid::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let client = provider.client(Duration::from_secs(5));

    let err = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeliveryPermanent(_)));
    assert_eq!(err.reply().code(), 554);
}

#[tokio::test]
async fn test_throttling_is_transient() {
    let provider = FakeSendGrid::start(StatusCode::TOO_MANY_REQUESTS).await;
    let client = provider.client(Duration::from_secs(5));

    let err = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeliveryTransient(_)));
}

#[tokio::test]
async fn test_bad_credential_is_permanent() {
    let provider = FakeSendGrid::start(StatusCode::UNAUTHORIZED).await;
    let client = provider.client(Duration::from_secs(5));

    let err = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeliveryPermanent(_)));
}

#[tokio::test]
async fn test_bad_request_is_permanent() {
    let provider = FakeSendGrid::start(StatusCode::BAD_REQUEST).await;
    let client = provider.client(Duration::from_secs(5));

    let err = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeliveryPermanent(_)));
}

#[tokio::test]
async fn test_timeout_is_transient() {
    let provider =
        FakeSendGrid::start_with_delay(StatusCode::ACCEPTED, Duration::from_secs(5)).await;
    let client = provider.client(Duration::from_millis(200));

    let err = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeliveryTransient(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_cancel_in_flight_is_unconfirmed() {
    let provider =
        FakeSendGrid::start_with_delay(StatusCode::ACCEPTED, Duration::from_secs(5)).await;
    let client = provider.client(Duration::from_secs(30));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = client.send(&message(), &cancel).await.unwrap_err();
    assert!(matches!(err, RelayError::Cancelled(_)));
    assert_eq!(err.reply().code(), 451);
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = SendGridClient::new(API_KEY.to_string(), Duration::from_secs(2))
        .unwrap()
        .with_base_url(format!("http://{}", addr));

    let err = client
        .send(&message(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::DeliveryTransient(_)));
}
