//! End-to-end messaging through the facade: certificate exchange,
//! envelope round-trips over a simulated relay, trust policies, escrow.

use std::sync::Arc;

use ql_client::{Client, ClientConfig, ClientError};
use ql_crypto::identity::{CaVerifier, CertificateAuthority, SignedCertificate};
use ql_crypto::CryptoError;
use ql_proto::{Envelope, MessageContent};

async fn connected_pair() -> (Client, Client) {
    let (alice, alice_cert) =
        Client::init("alice", "alice-pass", None, ClientConfig::default()).unwrap();
    let (bob, bob_cert) = Client::init("bob", "bob-pass", None, ClientConfig::default()).unwrap();

    alice
        .receive_certificate(SignedCertificate::unattested(bob_cert))
        .await
        .unwrap();
    bob.receive_certificate(SignedCertificate::unattested(alice_cert))
        .await
        .unwrap();
    (alice, bob)
}

/// What the relay does: serialise, forward, deserialise.
fn relay(envelope: &Envelope) -> Envelope {
    let wire = serde_json::to_string(envelope).unwrap();
    serde_json::from_str(&wire).unwrap()
}

#[tokio::test]
async fn hello_roundtrip() {
    let (alice, bob) = connected_pair().await;

    let envelope = alice
        .encrypt("bob", &MessageContent::text("hello"))
        .await
        .unwrap();
    assert_eq!(envelope.header().count, 1);
    assert_eq!(envelope.header().prev_count, 0);

    let received = bob.decrypt("alice", &relay(&envelope)).await.unwrap();
    assert_eq!(received, MessageContent::text("hello"));

    // Reply direction has its own counters.
    let reply = bob.encrypt("alice", &MessageContent::text("hi")).await.unwrap();
    assert_eq!(reply.header().count, 1);
    let received = alice.decrypt("bob", &relay(&reply)).await.unwrap();
    assert_eq!(received, MessageContent::text("hi"));
}

#[tokio::test]
async fn out_of_order_delivery() {
    let (alice, bob) = connected_pair().await;

    let e1 = alice.encrypt("bob", &MessageContent::text("one")).await.unwrap();
    let e2 = alice.encrypt("bob", &MessageContent::text("two")).await.unwrap();
    let e3 = alice.encrypt("bob", &MessageContent::text("three")).await.unwrap();

    assert_eq!(
        bob.decrypt("alice", &relay(&e2)).await.unwrap(),
        MessageContent::text("two")
    );
    assert_eq!(
        bob.decrypt("alice", &relay(&e3)).await.unwrap(),
        MessageContent::text("three")
    );
    assert_eq!(
        bob.decrypt("alice", &relay(&e1)).await.unwrap(),
        MessageContent::text("one")
    );
}

#[tokio::test]
async fn file_message_roundtrip() {
    let (alice, bob) = connected_pair().await;

    let content = MessageContent::file("notes.txt", "text/plain", b"file bytes");
    let envelope = alice.encrypt("bob", &content).await.unwrap();
    let received = bob.decrypt("alice", &relay(&envelope)).await.unwrap();
    assert_eq!(received, content);
}

#[tokio::test]
async fn missing_certificate_is_recoverable() {
    let (alice, _alice_cert) =
        Client::init("alice", "pw", None, ClientConfig::default()).unwrap();
    let (bob, bob_cert) = Client::init("bob", "pw", None, ClientConfig::default()).unwrap();

    let err = alice
        .encrypt("bob", &MessageContent::text("too early"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::MissingCertificate(ref p) if p == "bob"));

    // Fetch the certificate and retry once.
    alice
        .receive_certificate(SignedCertificate::unattested(bob_cert))
        .await
        .unwrap();
    alice
        .encrypt("bob", &MessageContent::text("now it works"))
        .await
        .unwrap();
    drop(bob);
}

#[tokio::test]
async fn tampered_envelope_fails_closed() {
    let (alice, bob) = connected_pair().await;

    let envelope = alice
        .encrypt("bob", &MessageContent::text("payload"))
        .await
        .unwrap();
    let mut bytes = envelope.ciphertext().unwrap();
    bytes[0] ^= 0x01;
    let bent = Envelope::new(envelope.header().clone(), &bytes);

    let err = bob.decrypt("alice", &bent).await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::AeadOpen)));
}

#[tokio::test]
async fn envelope_from_wrong_peer_rejected() {
    let (alice, bob) = connected_pair().await;
    let (carol, carol_cert) =
        Client::init("carol", "pw", None, ClientConfig::default()).unwrap();
    bob.receive_certificate(SignedCertificate::unattested(carol_cert))
        .await
        .unwrap();
    drop(carol);

    let envelope = alice
        .encrypt("bob", &MessageContent::text("from alice"))
        .await
        .unwrap();
    // Bob is told the envelope came from carol; the header says alice.
    let err = bob.decrypt("carol", &relay(&envelope)).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Crypto(CryptoError::MisdirectedMessage(_))
    ));
}

#[tokio::test]
async fn ca_policy_rejects_unattested_certificates() {
    let ca = CertificateAuthority::generate();
    let config = ClientConfig {
        verifier: Arc::new(CaVerifier::new(ca.verifying_key())),
        escrow: None,
    };
    let (alice, _alice_cert) = Client::init("alice", "pw", None, config).unwrap();
    let (_bob, bob_cert) = Client::init("bob", "pw", None, ClientConfig::default()).unwrap();

    let err = alice
        .receive_certificate(SignedCertificate::unattested(bob_cert.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Crypto(_)));

    let issued = ca.issue(bob_cert).unwrap();
    alice.receive_certificate(issued).await.unwrap();
}

#[tokio::test]
async fn escrow_block_travels_with_the_envelope() {
    use ql_crypto::escrow::EscrowSecret;

    let holder = EscrowSecret::generate();
    let config = ClientConfig {
        escrow: Some(holder.escrow_key()),
        ..ClientConfig::default()
    };
    let (alice, alice_cert) = Client::init("alice", "pw", None, config).unwrap();
    let (bob, bob_cert) = Client::init("bob", "pw", None, ClientConfig::default()).unwrap();
    alice
        .receive_certificate(SignedCertificate::unattested(bob_cert))
        .await
        .unwrap();
    bob.receive_certificate(SignedCertificate::unattested(alice_cert))
        .await
        .unwrap();

    let envelope = alice
        .encrypt("bob", &MessageContent::text("escrowed"))
        .await
        .unwrap();
    let block = envelope.header().escrow.as_ref().expect("escrow present");
    holder.unwrap(block).expect("holder recovers the message key");

    // Escrow never affects the peer's decryption.
    assert_eq!(
        bob.decrypt("alice", &relay(&envelope)).await.unwrap(),
        MessageContent::text("escrowed")
    );
}

#[tokio::test]
async fn sessions_to_different_peers_are_independent() {
    let (alice, alice_cert) =
        Client::init("alice", "pw", None, ClientConfig::default()).unwrap();
    let (bob, bob_cert) = Client::init("bob", "pw", None, ClientConfig::default()).unwrap();
    let (carol, carol_cert) =
        Client::init("carol", "pw", None, ClientConfig::default()).unwrap();

    alice
        .receive_certificate(SignedCertificate::unattested(bob_cert))
        .await
        .unwrap();
    alice
        .receive_certificate(SignedCertificate::unattested(carol_cert))
        .await
        .unwrap();
    bob.receive_certificate(SignedCertificate::unattested(alice_cert.clone()))
        .await
        .unwrap();
    carol
        .receive_certificate(SignedCertificate::unattested(alice_cert))
        .await
        .unwrap();

    let to_bob = alice.encrypt("bob", &MessageContent::text("for bob")).await.unwrap();
    let to_carol = alice
        .encrypt("carol", &MessageContent::text("for carol"))
        .await
        .unwrap();

    // Each pairwise chain starts at 1 independently.
    assert_eq!(to_bob.header().count, 1);
    assert_eq!(to_carol.header().count, 1);

    assert_eq!(
        bob.decrypt("alice", &relay(&to_bob)).await.unwrap(),
        MessageContent::text("for bob")
    );
    assert_eq!(
        carol.decrypt("alice", &relay(&to_carol)).await.unwrap(),
        MessageContent::text("for carol")
    );
}
