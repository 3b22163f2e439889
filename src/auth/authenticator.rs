use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::Deserialize;

use super::claims::Claims;
use super::error::AuthError;
use super::keys::{KeyLookup, KeyLookupError};
use crate::handler::BoxFuture;

/// The only signing method accepted or produced.
const METHOD: Algorithm = Algorithm::RS256;
const METHOD_NAME: &str = "RS256";

/// Mints and verifies RS256 tokens.
///
/// Holds one active key id for signing; verification accepts any key id the
/// [`KeyLookup`] can resolve to a public key. Immutable once built and safe to
/// share across concurrent requests. To rotate, build a new one and swap it
/// into an [`AuthHandle`].
pub struct Authenticator {
    active_kid: String,
    keys: Arc<dyn KeyLookup>,
    validation: Validation,
    lookup_timeout: Duration,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("Authenticator")
            .field("active_kid", &self.active_kid)
            .field("method", &METHOD)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish()
    }
}

/// Header fields read before any key is resolved.
///
/// `alg` is kept as a raw string so that names the JWT library does not know
/// (`none`, typos) still reach the method check.
#[derive(Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

impl TokenHeader {
    fn parse(token: &str) -> Result<Self, AuthError> {
        let mut segments = token.split('.');
        let (Some(header), Some(_), Some(_), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(AuthError::MalformedToken("expected header.payload.signature".into()));
        };
        let raw = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|e| AuthError::MalformedToken(format!("header encoding: {e}")))?;
        serde_json::from_slice(&raw).map_err(|e| AuthError::MalformedToken(format!("header: {e}")))
    }
}

impl Authenticator {
    pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

    /// Builds an authenticator signing with `active_kid`.
    ///
    /// Fails with [`AuthError::KeyResolution`] unless `keys` holds a private
    /// key for `active_kid`.
    pub async fn new(active_kid: impl Into<String>, keys: Arc<dyn KeyLookup>) -> Result<Self, AuthError> {
        Self::builder(active_kid, keys).build().await
    }

    pub fn builder(active_kid: impl Into<String>, keys: Arc<dyn KeyLookup>) -> AuthenticatorBuilder {
        AuthenticatorBuilder {
            active_kid: active_kid.into(),
            keys,
            lookup_timeout: Self::DEFAULT_LOOKUP_TIMEOUT,
            issuer: None,
            audience: None,
        }
    }

    pub fn active_kid(&self) -> &str {
        &self.active_kid
    }

    /// Signs `claims` with the active key, tagging the header with its key id.
    pub async fn generate_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let key = self
            .bounded(self.keys.private_key(&self.active_kid))
            .await?
            .map_err(|source| AuthError::KeyResolution { kid: self.active_kid.clone(), source })?;

        let mut header = Header::new(METHOD);
        header.kid = Some(self.active_kid.clone());
        jsonwebtoken::encode(&header, claims, &key).map_err(AuthError::Signing)
    }

    /// Recreates the claims a token was minted with, after checking it was
    /// signed by a key we know, with the configured method, and is currently
    /// valid.
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let header = TokenHeader::parse(token)?;
        if header.alg.parse::<Algorithm>().ok() != Some(METHOD) {
            return Err(AuthError::AlgorithmMismatch { expected: METHOD_NAME, found: header.alg });
        }

        let key = self.verification_key(header.kid).await?;
        let data = jsonwebtoken::decode::<Claims>(token, &key, &self.validation)
            .map_err(AuthError::from_validation)?;
        // A token is already expired at its exp second.
        if data.claims.expires_at <= jsonwebtoken::get_current_timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(data.claims)
    }

    /// Resolves the public key a token header points at.
    async fn verification_key(&self, kid: Option<String>) -> Result<DecodingKey, AuthError> {
        let Some(kid) = kid else {
            return Err(AuthError::UnknownKey(None));
        };
        match self.bounded(self.keys.public_key(&kid)).await? {
            Ok(key) => Ok(key),
            Err(KeyLookupError::NotFound(_)) => Err(AuthError::UnknownKey(Some(kid))),
            Err(e) => Err(AuthError::KeyLookup(e)),
        }
    }

    /// Runs a key lookup under the configured timeout.
    async fn bounded<T>(
        &self,
        lookup: BoxFuture<'_, Result<T, KeyLookupError>>,
    ) -> Result<Result<T, KeyLookupError>, AuthError> {
        tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| AuthError::KeyLookupTimeout(self.lookup_timeout))
    }
}

/// Optional settings for an [`Authenticator`].
pub struct AuthenticatorBuilder {
    active_kid: String,
    keys: Arc<dyn KeyLookup>,
    lookup_timeout: Duration,
    issuer: Option<String>,
    audience: Option<String>,
}

impl AuthenticatorBuilder {
    /// Upper bound on a single key lookup. Defaults to two seconds.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Reject tokens whose `iss` differs.
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Reject tokens whose `aud` differs.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub async fn build(self) -> Result<Authenticator, AuthError> {
        let mut validation = Validation::new(METHOD);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.validate_aud = self.audience.is_some();
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let auth = Authenticator {
            active_kid: self.active_kid,
            keys: self.keys,
            validation,
            lookup_timeout: self.lookup_timeout,
        };

        auth.bounded(auth.keys.private_key(&auth.active_kid))
            .await?
            .map_err(|source| AuthError::KeyResolution { kid: auth.active_kid.clone(), source })?;
        Ok(auth)
    }
}

// ── Rotation ──────────────────────────────────────────────────────────────────

/// Shared slot holding the current [`Authenticator`].
///
/// Requests take a snapshot with [`current`](AuthHandle::current); a rotation
/// swaps the whole value and never touches one that requests may be holding.
#[derive(Debug)]
pub struct AuthHandle {
    current: RwLock<Arc<Authenticator>>,
}

impl AuthHandle {
    pub fn new(auth: Authenticator) -> Self {
        Self { current: RwLock::new(Arc::new(auth)) }
    }

    pub fn current(&self) -> Arc<Authenticator> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs `next` and returns the authenticator it replaced.
    pub fn rotate(&self, next: Authenticator) -> Arc<Authenticator> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, Arc::new(next))
    }
}

impl From<Authenticator> for AuthHandle {
    fn from(auth: Authenticator) -> Self {
        Self::new(auth)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use jsonwebtoken::EncodingKey;

    use super::*;
    use crate::auth::{KeyStore, ROLE_ADMIN};
    use crate::testing::{self, ACTIVE_KID, ROGUE_PRIVATE_PEM};

    fn claims(ttl_secs: i64) -> Claims {
        let now = jsonwebtoken::get_current_timestamp();
        Claims {
            issuer: "service project".into(),
            subject: "123456789".into(),
            audience: None,
            expires_at: now.saturating_add_signed(ttl_secs),
            not_before: None,
            issued_at: now,
            id: Some("d3a0b1f4".into()),
            roles: BTreeSet::from([ROLE_ADMIN.to_owned()]),
        }
    }

    fn forge(header: &Header, claims: &Claims, private_pem: &str) -> String {
        let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
        jsonwebtoken::encode(header, claims, &key).unwrap()
    }

    fn segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    #[tokio::test]
    async fn valid_token_round_trips_to_equal_claims() {
        let auth = testing::authenticator().await;
        let original = claims(3600);
        let token = auth.generate_token(&original).await.unwrap();
        assert_eq!(auth.validate_token(&token).await.unwrap(), original);
    }

    #[tokio::test]
    async fn validating_twice_yields_identical_claims() {
        let auth = testing::authenticator().await;
        let token = auth.generate_token(&claims(3600)).await.unwrap();
        let first = auth.validate_token(&token).await.unwrap();
        let second = auth.validate_token(&token).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let auth = testing::authenticator().await;
        let token = auth.generate_token(&claims(-3600)).await.unwrap();
        assert!(matches!(auth.validate_token(&token).await, Err(AuthError::Expired)));
    }

    #[tokio::test]
    async fn token_expiring_now_is_rejected() {
        let auth = testing::authenticator().await;
        let token = auth.generate_token(&claims(0)).await.unwrap();
        assert!(matches!(auth.validate_token(&token).await, Err(AuthError::Expired)));

        let token = auth.generate_token(&claims(5)).await.unwrap();
        assert!(auth.validate_token(&token).await.is_ok());
    }

    #[tokio::test]
    async fn token_not_yet_valid_is_rejected() {
        let auth = testing::authenticator().await;
        let future = jsonwebtoken::get_current_timestamp() + 600;
        let token = auth.generate_token(&claims(3600).with_not_before(future)).await.unwrap();
        assert!(matches!(auth.validate_token(&token).await, Err(AuthError::NotYetValid)));
    }

    #[tokio::test]
    async fn header_carries_active_kid() {
        let auth = testing::authenticator().await;
        let token = auth.generate_token(&claims(60)).await.unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(ACTIVE_KID));
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let auth = testing::authenticator().await;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("not-in-store".into());
        let token = forge(&header, &claims(60), ROGUE_PRIVATE_PEM);
        assert!(matches!(
            auth.validate_token(&token).await,
            Err(AuthError::UnknownKey(Some(kid))) if kid == "not-in-store"
        ));
    }

    #[tokio::test]
    async fn missing_kid_is_rejected() {
        let auth = testing::authenticator().await;
        let token = forge(&Header::new(Algorithm::RS256), &claims(60), ROGUE_PRIVATE_PEM);
        assert!(matches!(auth.validate_token(&token).await, Err(AuthError::UnknownKey(None))));
    }

    #[tokio::test]
    async fn signature_from_another_key_is_rejected() {
        let auth = testing::authenticator().await;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(ACTIVE_KID.into());
        let token = forge(&header, &claims(60), ROGUE_PRIVATE_PEM);
        assert!(matches!(auth.validate_token(&token).await, Err(AuthError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let auth = testing::authenticator().await;
        let token = auth.generate_token(&claims(60)).await.unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut escalated = claims(60);
        escalated.subject = "someone-else".into();
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&escalated).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], payload, parts[2]);
        assert!(matches!(auth.validate_token(&tampered).await, Err(AuthError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn alg_none_is_an_algorithm_mismatch() {
        let auth = testing::authenticator().await;
        let header = segment(&format!(r#"{{"alg":"none","typ":"JWT","kid":"{ACTIVE_KID}"}}"#));
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(60)).unwrap());
        let token = format!("{header}.{payload}.");
        assert!(matches!(
            auth.validate_token(&token).await,
            Err(AuthError::AlgorithmMismatch { found, .. }) if found == "none"
        ));
    }

    #[tokio::test]
    async fn symmetric_algorithm_is_an_algorithm_mismatch() {
        let auth = testing::authenticator().await;
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(ACTIVE_KID.into());
        let token = jsonwebtoken::encode(
            &header,
            &claims(60),
            &EncodingKey::from_secret(testing::PUBLIC_PEM.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            auth.validate_token(&token).await,
            Err(AuthError::AlgorithmMismatch { found, .. }) if found == "HS256"
        ));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let auth = testing::authenticator().await;
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert!(
                matches!(auth.validate_token(token).await, Err(AuthError::MalformedToken(_))),
                "{token:?}"
            );
        }
    }

    #[tokio::test]
    async fn construction_requires_a_private_active_key() {
        let keys = Arc::new(KeyStore::new());
        keys.add_public_key(ACTIVE_KID, testing::PUBLIC_PEM.as_bytes()).unwrap();
        let err = Authenticator::new(ACTIVE_KID, keys).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyResolution { .. }));
        assert!(err.is_internal());

        let err = Authenticator::new("missing", testing::key_store()).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyResolution { kid, .. } if kid == "missing"));
    }

    #[tokio::test]
    async fn signing_fails_once_active_key_is_removed() {
        let keys = testing::key_store();
        let auth = Authenticator::new(ACTIVE_KID, keys.clone()).await.unwrap();
        keys.remove(ACTIVE_KID);
        assert!(matches!(
            auth.generate_token(&claims(60)).await,
            Err(AuthError::KeyResolution { .. })
        ));
    }

    #[tokio::test]
    async fn issuer_and_audience_are_enforced_when_configured() {
        let auth = Authenticator::builder(ACTIVE_KID, testing::key_store())
            .issuer("service project")
            .audience("sales-api")
            .build()
            .await
            .unwrap();

        let good = auth.generate_token(&claims(60).with_audience("sales-api")).await.unwrap();
        assert!(auth.validate_token(&good).await.is_ok());

        let wrong_aud = auth.generate_token(&claims(60).with_audience("billing")).await.unwrap();
        assert!(matches!(auth.validate_token(&wrong_aud).await, Err(AuthError::InvalidClaims(_))));

        let mut other_issuer = claims(60).with_audience("sales-api");
        other_issuer.issuer = "someone".into();
        let token = auth.generate_token(&other_issuer).await.unwrap();
        assert!(matches!(auth.validate_token(&token).await, Err(AuthError::InvalidClaims(_))));
    }

    struct SlowKeys(Arc<KeyStore>);

    impl KeyLookup for SlowKeys {
        fn private_key<'a>(&'a self, kid: &'a str) -> BoxFuture<'a, Result<jsonwebtoken::EncodingKey, KeyLookupError>> {
            self.0.private_key(kid)
        }

        fn public_key<'a>(&'a self, kid: &'a str) -> BoxFuture<'a, Result<DecodingKey, KeyLookupError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                self.0.public_key(kid).await
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_key_lookup_times_out() {
        let auth = Authenticator::builder(ACTIVE_KID, Arc::new(SlowKeys(testing::key_store())))
            .lookup_timeout(Duration::from_millis(100))
            .build()
            .await
            .unwrap();
        let token = auth.generate_token(&claims(3600)).await.unwrap();
        let err = auth.validate_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyLookupTimeout(_)));
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn rotation_swaps_the_whole_authenticator() {
        let keys = testing::key_store();
        keys.add_key_pair("next", ROGUE_PRIVATE_PEM.as_bytes(), testing::ROGUE_PUBLIC_PEM.as_bytes())
            .unwrap();
        let handle = AuthHandle::new(Authenticator::new(ACTIVE_KID, keys.clone()).await.unwrap());

        let before = handle.current();
        let old_token = before.generate_token(&claims(60)).await.unwrap();

        let previous = handle.rotate(Authenticator::new("next", keys).await.unwrap());
        assert_eq!(previous.active_kid(), ACTIVE_KID);
        assert_eq!(before.active_kid(), ACTIVE_KID);

        let after = handle.current();
        assert_eq!(after.active_kid(), "next");
        let new_token = after.generate_token(&claims(60)).await.unwrap();
        assert_eq!(jsonwebtoken::decode_header(&new_token).unwrap().kid.as_deref(), Some("next"));
        // Tokens from the previous epoch still verify while their key is kept.
        assert!(after.validate_token(&old_token).await.is_ok());
    }
}
