//! Key resolution.
//!
//! The [`Authenticator`](super::Authenticator) never owns key material. It asks
//! a [`KeyLookup`] for the private key of the active key id when signing, and
//! for the public key named by a token's `kid` header when verifying.
//! [`KeyStore`] is the in-memory implementation.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use jsonwebtoken::{DecodingKey, EncodingKey};
use tracing::debug;

use crate::handler::BoxFuture;

/// Failure to produce a key.
#[derive(Debug, thiserror::Error)]
pub enum KeyLookupError {
    #[error("key id {0:?} not found")]
    NotFound(String),

    #[error("invalid key material for {kid:?}: {source}")]
    InvalidKey {
        kid: String,
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    #[error("key store: {0}")]
    Backend(String),

    #[error("reading keys: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves key ids to key material.
///
/// Implementations must support concurrent reads. A lookup may cross a network
/// boundary; callers bound it with a timeout.
pub trait KeyLookup: Send + Sync + 'static {
    fn private_key<'a>(&'a self, kid: &'a str) -> BoxFuture<'a, Result<EncodingKey, KeyLookupError>>;
    fn public_key<'a>(&'a self, kid: &'a str) -> BoxFuture<'a, Result<DecodingKey, KeyLookupError>>;
}

#[derive(Clone)]
struct KeyPair {
    private: Option<EncodingKey>,
    public: DecodingKey,
}

/// In-memory RSA key store keyed by key id.
///
/// Keys can be added and removed while the store is shared; rotating the
/// active signing key is up to whoever builds the next
/// [`Authenticator`](super::Authenticator). A key id with only a public half
/// can still verify tokens it signed in an earlier epoch.
#[derive(Default)]
pub struct KeyStore {
    keys: RwLock<HashMap<String, KeyPair>>,
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let mut kids: Vec<_> = keys.keys().collect();
        kids.sort();
        f.debug_struct("KeyStore").field("kids", &kids).finish()
    }
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signing key pair from PEM: an RSA private key (PKCS#1 or PKCS#8)
    /// and its public key.
    pub fn add_key_pair(&self, kid: &str, private_pem: &[u8], public_pem: &[u8]) -> Result<(), KeyLookupError> {
        let private = EncodingKey::from_rsa_pem(private_pem).map_err(|source| invalid(kid, source))?;
        let public = DecodingKey::from_rsa_pem(public_pem).map_err(|source| invalid(kid, source))?;
        self.insert(kid, KeyPair { private: Some(private), public });
        Ok(())
    }

    /// Adds a verify-only key.
    pub fn add_public_key(&self, kid: &str, public_pem: &[u8]) -> Result<(), KeyLookupError> {
        let public = DecodingKey::from_rsa_pem(public_pem).map_err(|source| invalid(kid, source))?;
        self.insert(kid, KeyPair { private: None, public });
        Ok(())
    }

    /// Removes a key id. Tokens signed with it stop validating.
    pub fn remove(&self, kid: &str) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.remove(kid).is_some()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.contains_key(kid)
    }

    /// Loads every key in `dir`.
    ///
    /// `<kid>.pub.pem` holds a public key; `<kid>.pem` the matching private
    /// key. A private key without its public half is an error. Other files are
    /// ignored.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, KeyLookupError> {
        let mut private = HashMap::new();
        let mut public = HashMap::new();

        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if let Some(kid) = name.strip_suffix(".pub.pem") {
                public.insert(kid.to_owned(), std::fs::read(&path)?);
            } else if let Some(kid) = name.strip_suffix(".pem") {
                private.insert(kid.to_owned(), std::fs::read(&path)?);
            }
        }

        let store = Self::new();
        for (kid, public_pem) in &public {
            match private.remove(kid) {
                Some(private_pem) => store.add_key_pair(kid, &private_pem, public_pem)?,
                None => store.add_public_key(kid, public_pem)?,
            }
            debug!(kid = %kid, "loaded key");
        }
        if let Some(kid) = private.keys().next() {
            return Err(KeyLookupError::Backend(format!("private key {kid:?} has no {kid}.pub.pem")));
        }
        Ok(store)
    }

    fn insert(&self, kid: &str, pair: KeyPair) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(kid.to_owned(), pair);
    }

    fn get(&self, kid: &str) -> Result<KeyPair, KeyLookupError> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid).cloned().ok_or_else(|| KeyLookupError::NotFound(kid.to_owned()))
    }
}

impl KeyLookup for KeyStore {
    fn private_key<'a>(&'a self, kid: &'a str) -> BoxFuture<'a, Result<EncodingKey, KeyLookupError>> {
        let key = self
            .get(kid)
            .and_then(|pair| pair.private.ok_or_else(|| KeyLookupError::NotFound(kid.to_owned())));
        Box::pin(std::future::ready(key))
    }

    fn public_key<'a>(&'a self, kid: &'a str) -> BoxFuture<'a, Result<DecodingKey, KeyLookupError>> {
        Box::pin(std::future::ready(self.get(kid).map(|pair| pair.public)))
    }
}

fn invalid(kid: &str, source: jsonwebtoken::errors::Error) -> KeyLookupError {
    KeyLookupError::InvalidKey { kid: kid.to_owned(), source }
}
