//! Shared fixtures for unit tests.

use std::sync::Arc;

use crate::auth::{Authenticator, KeyStore};

pub(crate) const ACTIVE_KID: &str = "54bb2165-71e1-41a6-af3e-7da4a0e1e2c1";
pub(crate) const PRIVATE_PEM: &str = include_str!("../fixtures/keys/54bb2165-71e1-41a6-af3e-7da4a0e1e2c1.pem");
pub(crate) const PUBLIC_PEM: &str = include_str!("../fixtures/keys/54bb2165-71e1-41a6-af3e-7da4a0e1e2c1.pub.pem");
pub(crate) const ROGUE_PRIVATE_PEM: &str = include_str!("../fixtures/keys/rogue.pem");
pub(crate) const ROGUE_PUBLIC_PEM: &str = include_str!("../fixtures/keys/rogue.pub.pem");

pub(crate) fn key_store() -> Arc<KeyStore> {
    let keys = KeyStore::new();
    keys.add_key_pair(ACTIVE_KID, PRIVATE_PEM.as_bytes(), PUBLIC_PEM.as_bytes())
        .expect("fixture key pair");
    Arc::new(keys)
}

pub(crate) async fn authenticator() -> Authenticator {
    Authenticator::new(ACTIVE_KID, key_store()).await.expect("fixture authenticator")
}
