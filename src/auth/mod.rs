//! Token-based authentication and role authorization.
//!
//! ```text
//! KeyLookup ──private key──▶ Authenticator::generate_token(Claims) ──▶ header.payload.signature
//!           ◀──public key──  Authenticator::validate_token(token)   ──▶ Claims
//! ```
//!
//! Tokens are compact JWS values signed with RS256. The header names the key
//! id (`kid`) that produced the signature, so verification keeps working for
//! older tokens while a new key signs fresh ones.

mod authenticator;
mod claims;
mod error;
mod keys;

pub use authenticator::{AuthHandle, Authenticator, AuthenticatorBuilder};
pub use claims::{Claims, ROLE_ADMIN, ROLE_USER};
pub use error::AuthError;
pub use keys::{KeyLookup, KeyLookupError, KeyStore};
