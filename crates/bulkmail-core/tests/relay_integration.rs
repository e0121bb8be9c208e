//! Relay sessions and the dispatch engine against a scripted SMTP relay

mod support;

use std::time::Duration;

use bulkmail_common::types::{CountingMode, RateLimitPolicy, Recipient, RelayCredentials};
use bulkmail_core::{
    ConnectionError, DispatchEngine, MessageBuilder, RelayConnector, RelaySession, SendError,
    SmtpConnector,
};
use support::mock_relay::{Behaviour, MockRelay};

fn credentials(relay: &MockRelay) -> RelayCredentials {
    RelayCredentials {
        host: "127.0.0.1".to_string(),
        port: relay.port(),
        username: "news@example.com".to_string(),
        secret: "secret".to_string(),
        use_explicit_tls: false,
        from_address: None,
    }
}

fn connector() -> SmtpConnector {
    SmtpConnector::new()
        .with_hello_name("bulkmail.test")
        .with_timeout(Duration::from_secs(5))
}

fn recipient(address: &str) -> Recipient {
    Recipient::new(address, "Hello", "<p>Hello there</p>")
}

#[tokio::test]
async fn test_rejection_keeps_session_usable() {
    let relay = MockRelay::start(Behaviour {
        reject_rcpt: Some("bounce".to_string()),
        ..Behaviour::default()
    })
    .await;

    let builder = MessageBuilder::new("news@example.com").unwrap();
    let mut session = connector().open(&credentials(&relay)).await.unwrap();

    session
        .send(&builder.build(&recipient("ana@example.org")).unwrap())
        .await
        .unwrap();

    let err = session
        .send(&builder.build(&recipient("bounce@example.org")).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(&err, SendError::Rejected(reason) if reason.contains("User unknown")));

    session
        .send(&builder.build(&recipient("bob@example.org")).unwrap())
        .await
        .unwrap();
    session.close().await;
    session.close().await;

    assert_eq!(relay.connections(), 1);
    assert_eq!(relay.messages().len(), 2);
    let commands = relay.commands();
    assert!(commands.iter().any(|c| c == "RSET"));
    assert_eq!(commands.iter().filter(|c| c.as_str() == "QUIT").count(), 1);
}

#[tokio::test]
async fn test_relay_hangup_is_disconnect() {
    let relay = MockRelay::start(Behaviour {
        drop_on_rcpt: Some("drop".to_string()),
        ..Behaviour::default()
    })
    .await;

    let builder = MessageBuilder::new("news@example.com").unwrap();
    let mut session = connector().open(&credentials(&relay)).await.unwrap();

    let err = session
        .send(&builder.build(&recipient("drop@example.org")).unwrap())
        .await
        .unwrap_err();
    assert!(err.is_disconnect());
    session.close().await;
}

#[tokio::test]
async fn test_auth_failure() {
    let relay = MockRelay::start(Behaviour {
        reject_auth: true,
        ..Behaviour::default()
    })
    .await;

    let err = connector().open(&credentials(&relay)).await.err().unwrap();
    assert!(matches!(err, ConnectionError::Authentication { .. }));
}

#[tokio::test]
async fn test_starttls_required_but_not_offered() {
    let relay = MockRelay::start(Behaviour::default()).await;
    let mut creds = credentials(&relay);
    creds.use_explicit_tls = true;

    let err = connector().open(&creds).await.err().unwrap();
    assert!(matches!(err, ConnectionError::Security { .. }));
    assert!(!relay.commands().iter().any(|c| c.starts_with("AUTH")));
}

#[tokio::test]
async fn test_refused_starttls_upgrade() {
    let relay = MockRelay::start(Behaviour {
        advertise_starttls: true,
        ..Behaviour::default()
    })
    .await;
    let mut creds = credentials(&relay);
    creds.use_explicit_tls = true;

    let err = connector().open(&creds).await.err().unwrap();
    assert!(matches!(err, ConnectionError::Security { .. }));

    let commands = relay.commands();
    assert!(commands.iter().any(|c| c == "STARTTLS"));
    assert!(!commands.iter().any(|c| c.starts_with("AUTH")));
}

#[tokio::test]
async fn test_engine_reconnects_per_batch() {
    let relay = MockRelay::start(Behaviour {
        reject_rcpt: Some("bounce".to_string()),
        ..Behaviour::default()
    })
    .await;

    let recipients = vec![
        recipient("a@example.org"),
        recipient("bounce@example.org"),
        recipient("c@example.org"),
        recipient("d@example.org"),
        recipient("e@example.org"),
    ];
    let policy = RateLimitPolicy::new(2, Duration::ZERO, CountingMode::AllAttempts).unwrap();

    let report = DispatchEngine::new(connector(), credentials(&relay), policy)
        .run(&recipients)
        .await
        .unwrap();

    let statuses: Vec<String> = report.outcomes.iter().map(|o| o.status_text()).collect();
    assert_eq!(statuses.len(), 5);
    assert_eq!(statuses[0], "Success");
    assert!(statuses[1].starts_with("Error: "));
    assert!(statuses[1].contains("550"));
    assert!(statuses[2..].iter().all(|s| s == "Success"));

    assert_eq!(report.pauses, 2);
    assert_eq!(relay.connections(), 3);
    assert_eq!(relay.messages().len(), 4);
}
