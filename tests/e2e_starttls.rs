//! STARTTLS end-to-end tests using a throwaway self-signed certificate

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::Arc;

use blackhole::store::MessageStore;
use pretty_assertions::assert_eq;
use rcgen::{generate_simple_self_signed, CertifiedKey};
use support::harness::TestHarness;
use tempfile::TempDir;
use tokio_rustls::{
    rustls::{ClientConfig, RootCertStore},
    TlsConnector,
};

/// Write a certificate for `localhost` into a temporary directory and return
/// a connector that trusts it.
fn certificate() -> (TempDir, TlsConnector) {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec![String::from("localhost")]).unwrap();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cert.pem"), cert.pem()).unwrap();
    std::fs::write(dir.path().join("key.pem"), key_pair.serialize_pem()).unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(cert.der().clone()).unwrap();
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    (dir, TlsConnector::from(Arc::new(config)))
}

#[tokio::test]
async fn test_starttls_then_authenticated_delivery() {
    let (dir, connector) = certificate();
    let harness = TestHarness::builder()
        .with_tls(dir.path().join("cert.pem"), dir.path().join("key.pem"))
        .with_insecure_auth(false)
        .with_auth("mailuser", "mailpass")
        .build()
        .await
        .unwrap();

    let (mut client, _) = harness.connect().await.unwrap();
    let ehlo = client.ehlo().await.unwrap();
    assert!(ehlo.lines.iter().any(|line| line == "250-STARTTLS"));
    assert!(!ehlo.lines.iter().any(|line| line.contains("AUTH")));

    let reply = client.auth_plain("mailuser", "mailpass").await.unwrap();
    assert_eq!(reply.code, 523);

    let mut client = client.starttls(&connector, "localhost").await.unwrap();

    let ehlo = client.ehlo().await.unwrap();
    assert!(!ehlo.lines.iter().any(|line| line.contains("STARTTLS")));
    assert!(ehlo.lines.iter().any(|line| line == "250-AUTH PLAIN"));

    let reply = client.command("STARTTLS").await.unwrap();
    assert_eq!(reply.code, 502);

    let reply = client.auth_plain("mailuser", "mailpass").await.unwrap();
    assert_eq!(reply.code, 235);

    let reply = client
        .send_message("a@test", &["b@test"], "Subject: Secure\r\n\r\nsecret\r\n")
        .await
        .unwrap();
    assert_eq!(reply.code, 250);

    let messages = harness.store().list().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].record.subject, "Secure");
    assert_eq!(messages[0].record.auth_user, "mailuser");

    harness.shutdown().await;
}

#[tokio::test]
async fn test_transaction_survives_upgrade() {
    let (dir, connector) = certificate();
    let harness = TestHarness::builder()
        .with_tls(dir.path().join("cert.pem"), dir.path().join("key.pem"))
        .build()
        .await
        .unwrap();

    let (mut client, _) = harness.connect().await.unwrap();
    client.ehlo().await.unwrap();
    client.command("MAIL FROM:<a@test>").await.unwrap();
    client.command("RCPT TO:<b@test>").await.unwrap();

    let mut client = client.starttls(&connector, "localhost").await.unwrap();

    let reply = client.command("DATA").await.unwrap();
    assert_eq!(reply.code, 354);
    client.send_raw(b"Subject: Upgraded\r\n\r\nbody\r\n").await.unwrap();
    let reply = client.command(".").await.unwrap();
    assert_eq!(reply.code, 250);

    let messages = harness.store().list().await.unwrap();
    assert_eq!(messages[0].record.sender, "a@test");
    assert_eq!(messages[0].record.recipients, ["b@test"]);

    harness.shutdown().await;
}
