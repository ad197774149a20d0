//! Collects portal credentials from flags, environment, or a prompt.

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use wosync_core::{GeneralConfig, Identity};

const USERNAME_VAR: &str = "WOSYNC_USERNAME";
const PASSWORD_VAR: &str = "WOSYNC_PASSWORD";

/// Resolve the identity once for the whole run.
pub fn resolve(username: Option<&str>, general: &GeneralConfig) -> Result<Identity> {
    resolve_with(username, general, |key| std::env::var(key).ok())
}

fn resolve_with(
    username: Option<&str>,
    general: &GeneralConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Identity> {
    let hidden = general.password_inputs_hidden;

    let username = match username.map(str::to_string).or_else(|| lookup(USERNAME_VAR)) {
        Some(name) => name,
        None => Input::<String>::new()
            .with_prompt("Portal username")
            .interact_text()
            .context("reading username")?,
    };

    let secret = match lookup(PASSWORD_VAR) {
        Some(secret) => secret,
        None if hidden => Password::new()
            .with_prompt("Portal password")
            .interact()
            .context("reading password")?,
        None => Input::<String>::new()
            .with_prompt("Portal password")
            .interact_text()
            .context("reading password")?,
    };

    Ok(Identity::new(username, secret, hidden))
}

/// Prompt for the database password when the config asks for it.
pub fn database_password() -> Result<String> {
    Password::new()
        .with_prompt("Database password")
        .interact()
        .context("reading database password")
}
