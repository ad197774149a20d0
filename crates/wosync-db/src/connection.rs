//! Database connection management.
//!
//! Turns the configured connection parameters into a URL and opens a pool
//! through `SQLx`'s `Any` driver, so the same store runs against PostgreSQL in
//! production and a SQLite file in tests.

use crate::error::{DatabaseError, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use url::Url;
use wosync_core::DatabaseConfig;

/// Connections per store. Each worker owns exactly one.
pub const CONNECTIONS_PER_STORE: u32 = 1;

/// Build the connection URL for `config`.
///
/// An explicit `url` wins; otherwise a `postgres://` URL is assembled from
/// host, port, user, password, and database name, percent-encoding the
/// credentials.
///
/// # Errors
/// Returns `DatabaseError::InvalidParams` if the host or credentials cannot be
/// represented in a URL.
pub fn connection_url(config: &DatabaseConfig) -> Result<String> {
    if let Some(url) = &config.url {
        return Ok(url.clone());
    }

    let invalid = |what: &str| DatabaseError::InvalidParams(format!("invalid {what}"));

    let mut url = Url::parse("postgres://localhost")
        .map_err(|e| DatabaseError::InvalidParams(e.to_string()))?;
    url.set_host(Some(&config.host))
        .map_err(|_| invalid("host"))?;
    url.set_port(Some(config.port)).map_err(|()| invalid("port"))?;
    url.set_username(&config.user)
        .map_err(|()| invalid("user"))?;
    if let Some(password) = &config.password {
        url.set_password(Some(password))
            .map_err(|()| invalid("password"))?;
    }
    url.set_path(&format!("/{}", config.dbname));

    Ok(url.to_string())
}

/// Open a pool of [`CONNECTIONS_PER_STORE`] connections to `url`.
///
/// # Errors
/// Returns `DatabaseError::Open` if the database is unreachable or the URL
/// scheme has no driver.
pub async fn connect(url: &str) -> Result<AnyPool> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(CONNECTIONS_PER_STORE)
        .connect(url)
        .await
        .map_err(|e| DatabaseError::Open(e.to_string()))?;

    tracing::info!("Result database connection opened");
    Ok(pool)
}
