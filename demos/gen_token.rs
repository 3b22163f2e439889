//! Mints an admin token with the active signing key and prints it to stdout.
//!
//! Run with:
//!   WARDEN_AUTH_ACTIVE_KID=54bb2165-71e1-41a6-af3e-7da4a0e1e2c1 cargo run --example gen_token [subject]
//!
//! The token is valid for a year and is checked against the same key set
//! before it is printed.

use std::sync::Arc;
use std::time::Duration;

use warden::auth::{Authenticator, Claims, KeyStore, ROLE_ADMIN};
use warden::config::Config;

const ONE_YEAR: Duration = Duration::from_secs(8760 * 60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env()?;
    let subject = std::env::args().nth(1).unwrap_or_else(|| "123456789".to_string());

    let keys = Arc::new(KeyStore::from_dir(&config.auth_keys_dir)?);
    let auth = Authenticator::builder(config.auth_active_kid.clone(), keys)
        .issuer(config.auth_issuer.clone())
        .build()
        .await?;

    let mut claims = Claims::new(config.auth_issuer, subject, ONE_YEAR).with_roles([ROLE_ADMIN]);
    if let Some(audience) = config.auth_audience {
        claims = claims.with_audience(audience);
    }

    let token = auth.generate_token(&claims).await?;
    auth.validate_token(&token).await?;

    println!("{token}");
    Ok(())
}
