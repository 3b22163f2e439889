//! Sales API demo: a paged user listing behind RS256 auth.
//!
//! Run with:
//!   WARDEN_AUTH_ACTIVE_KID=54bb2165-71e1-41a6-af3e-7da4a0e1e2c1 RUST_LOG=info cargo run --example sales_api
//!
//! Try:
//!   TOKEN=$(cargo run -q --example gen_token)
//!   curl -H "Authorization: Bearer $TOKEN" http://localhost:3000/v1/users/1/10
//!   curl http://localhost:3000/v1/users/1/10            # 401
//!   curl http://localhost:3000/v1/readiness
//!   curl http://localhost:3000/debug/metrics
//!   curl http://localhost:3000/metrics                  # Prometheus text

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use warden::auth::{AuthHandle, Authenticator, KeyStore, ROLE_ADMIN};
use warden::config::Config;
use warden::middleware::{self, Authenticate, Authorize, Metrics, Middleware};
use warden::{Error, FieldErrors, Json, Method, Request, RequestContext, Router, Server, health};

#[derive(Clone, Serialize)]
struct User {
    id: String,
    name: String,
    email: String,
    roles: Vec<&'static str>,
}

fn users() -> Vec<User> {
    (1..=42)
        .map(|n| User {
            id: format!("{n:08}"),
            name: format!("User {n}"),
            email: format!("user{n}@example.com"),
            roles: if n == 1 { vec!["ADMIN", "USER"] } else { vec!["USER"] },
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    info!(build = %config.build, addr = %config.addr, kid = %config.auth_active_kid, "starting sales api");

    let keys = Arc::new(KeyStore::from_dir(&config.auth_keys_dir)?);
    let mut builder = Authenticator::builder(config.auth_active_kid.clone(), keys)
        .issuer(config.auth_issuer.clone())
        .lookup_timeout(config.auth_key_lookup_timeout);
    if let Some(audience) = &config.auth_audience {
        builder = builder.audience(audience.clone());
    }
    let auth = Arc::new(AuthHandle::new(builder.build().await?));

    let metrics = Metrics::new();
    let store = Arc::new(users());

    let mut router = Router::new().with_stack(middleware::standard(metrics.clone()));
    if let Some(timeout) = config.request_timeout {
        router = router.request_timeout(timeout);
    }
    let router = router
        .handle(Method::GET, "v1", "/liveness", health::liveness(&config.build), [])
        .handle(Method::GET, "v1", "/readiness", health::readiness(&config.build), [])
        .handle(
            Method::GET,
            "v1",
            "/users/{page}/{rows}",
            move |ctx: RequestContext, req: Request| list_users(store.clone(), ctx, req),
            [Authenticate::new(auth).into_layer(), Authorize::new([ROLE_ADMIN]).into_layer()],
        )
        .on(Method::GET, "/debug/metrics", metrics.handler())
        .on(Method::GET, "/metrics", metrics.prometheus());

    Server::bind(config.addr).serve(router).await?;
    Ok(())
}

async fn list_users(store: Arc<Vec<User>>, ctx: RequestContext, req: Request) -> Result<Json<Vec<User>>, Error> {
    let page = req.param("page").and_then(|v| v.parse::<usize>().ok()).filter(|v| *v > 0);
    let rows = req.param("rows").and_then(|v| v.parse::<usize>().ok()).filter(|v| (1..=100).contains(v));

    let mut fields = FieldErrors::new();
    if page.is_none() {
        fields.push("page", "must be a positive integer");
    }
    if rows.is_none() {
        fields.push("rows", "must be between 1 and 100");
    }
    fields.into_result()?;
    let (page, rows) = (page.unwrap_or(1), rows.unwrap_or(1));

    let offset = (page - 1)
        .checked_mul(rows)
        .ok_or_else(|| Error::validation(FieldErrors::new().with("page", "out of range")))?;

    ctx.check_cancelled()?;
    let users = store.iter().skip(offset).take(rows).cloned().collect();
    Ok(Json(users))
}
