// ABOUTME: Matrix client initialization and authentication
// ABOUTME: Builds a client with a sqlite state store and logs in via access token or password

use anyhow::{Context, Result};
use matrix_sdk::{
    authentication::{matrix::MatrixSession, SessionTokens},
    ruma::OwnedUserId,
    AuthSession, Client, SessionMeta,
};
use relaybot_core::config::BotConfig;
use std::path::{Path, PathBuf};

/// Convert a string to a filesystem-safe slug
fn slugify(s: &str) -> String {
    s.trim_start_matches('@')
        .replace(':', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
        .collect()
}

/// State store location for one account/device pair under `data_path`
pub fn state_store_path(data_path: &Path, user_id: &str, device_id: &str) -> PathBuf {
    data_path
        .join("state_store")
        .join(format!("{}_{}", slugify(user_id), slugify(device_id)))
}

pub async fn create_client(config: &BotConfig) -> Result<Client> {
    let store_path = state_store_path(
        Path::new(&config.data_path),
        &config.user_id,
        &config.device_id,
    );

    std::fs::create_dir_all(&store_path).with_context(|| {
        format!(
            "Failed to create state store directory {}",
            store_path.display()
        )
    })?;

    tracing::debug!(path = %store_path.display(), "Using state store directory");

    let client = Client::builder()
        .homeserver_url(&config.base_url)
        .sqlite_store(&store_path, None)
        .build()
        .await
        .context("Failed to create Matrix client")?;

    Ok(client)
}

pub async fn login(client: &Client, config: &BotConfig) -> Result<()> {
    if let Some(ref token) = config.token {
        tracing::debug!("Logging in with access token");
        let user_id: OwnedUserId = config
            .user_id
            .parse()
            .with_context(|| format!("Invalid user ID {}", config.user_id))?;
        let session = AuthSession::Matrix(MatrixSession {
            meta: SessionMeta {
                user_id,
                device_id: config.device_id.clone().into(),
            },
            tokens: SessionTokens {
                access_token: token.clone(),
                refresh_token: None,
            },
        });
        client
            .restore_session(session)
            .await
            .context("Failed to restore session")?;
    } else if let Some(ref pwd) = config.password {
        tracing::debug!("Logging in with password");
        client
            .matrix_auth()
            .login_username(&config.user_id, pwd)
            .device_id(&config.device_id)
            .initial_device_display_name("relaybot")
            .send()
            .await
            .context("Failed to log in")?;
    } else {
        anyhow::bail!("Either token or password is required");
    }

    match client.user_id() {
        Some(user_id) => tracing::info!(user_id = %user_id, "Logged in"),
        None => tracing::warn!("Login succeeded but user_id not available"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_user_id() {
        assert_eq!(slugify("@bot:example.org"), "bot_example.org");
    }

    #[test]
    fn test_state_store_path_isolates_device() {
        let a = state_store_path(Path::new("/data"), "@bot:example.org", "one");
        let b = state_store_path(Path::new("/data"), "@bot:example.org", "two");
        assert_ne!(a, b);
        assert!(a.starts_with("/data/state_store"));
    }
}
