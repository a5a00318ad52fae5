//! Vault access through the facade: entry operations, blob round-trips,
//! rollback detection, and the login path reusing a persisted salt.

use serde::{Deserialize, Serialize};

use ql_client::{Client, ClientConfig, ClientError};
use ql_vault::VaultError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Credential {
    site: String,
    user: String,
    pass: String,
}

#[tokio::test]
async fn entry_operations_through_facade() {
    let (client, _cert) = Client::init("alice", "pw", None, ClientConfig::default()).unwrap();

    client.vault_set("example.com", "alice:s3cret").await.unwrap();
    assert_eq!(
        client.vault_get("example.com").await.unwrap().unwrap(),
        "alice:s3cret"
    );
    assert_eq!(client.vault_get("unknown.test").await.unwrap(), None);

    assert!(client.vault_remove("example.com").await);
    assert!(!client.vault_remove("example.com").await);
}

#[tokio::test]
async fn dump_load_and_rollback() {
    let (client, _cert) = Client::init("alice", "pw", None, ClientConfig::default()).unwrap();

    let records = vec![Credential {
        site: "example.com".into(),
        user: "alice".into(),
        pass: "s3cret".into(),
    }];
    let old = client.vault_dump(&records).await.unwrap();

    let mut newer = records.clone();
    newer.push(Credential {
        site: "bank.test".into(),
        user: "alice".into(),
        pass: "hunter2".into(),
    });
    let new = client.vault_dump(&newer).await.unwrap();

    let loaded: Vec<Credential> = client
        .vault_load(&new.encrypted_vault, &new.vault_integrity)
        .await
        .unwrap();
    assert_eq!(loaded, newer);

    // An old blob served with the new tag is a rollback, surfaced as an
    // integrity failure the caller must not paper over.
    let err = client
        .vault_load::<Credential>(&old.encrypted_vault, &new.vault_integrity)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Vault(VaultError::IntegrityCheckFailed)
    ));
}

#[tokio::test]
async fn password_verification() {
    let (client, _cert) = Client::init("alice", "pw", None, ClientConfig::default()).unwrap();
    assert!(client.verify_password("pw").await);
    assert!(!client.verify_password("not-pw").await);
}

#[tokio::test]
async fn login_path_reuses_salt() {
    let (first, _cert) =
        Client::init("alice", "same password", None, ClientConfig::default()).unwrap();
    let salt = first.vault_salt().await;
    let export = first
        .vault_dump(&[Credential {
            site: "example.com".into(),
            user: "alice".into(),
            pass: "s3cret".into(),
        }])
        .await
        .unwrap();
    drop(first);

    // A later session with the persisted salt derives the same master key
    // and can read the stored blob.
    let (second, _cert) =
        Client::init("alice", "same password", Some(salt), ClientConfig::default()).unwrap();
    let loaded: Vec<Credential> = second
        .vault_load(&export.encrypted_vault, &export.vault_integrity)
        .await
        .unwrap();
    assert_eq!(loaded[0].site, "example.com");
}
