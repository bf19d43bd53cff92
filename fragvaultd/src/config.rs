use std::path::{Path, PathBuf};

use anyhow::Context;
use fragvault_core::{DEFAULT_MAX_EXPANDED_BYTES, Policy, PolicyPair};
use fragvault_integrations::ids::{
    ENV_DB_PATH, ENV_DEFAULT_EDIT_POLICY, ENV_DEFAULT_VIEW_POLICY, ENV_MAIL_CONFIG,
    ENV_MAX_ARCHIVE_BYTES, ENV_MAX_EXPANDED_BYTES,
};
use fragvault_integrations::paths::{default_db_path, expand_with_home};
use serde::Deserialize;

use crate::mail::{MailReceiverConfig, MailUser};

const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub default_policy: PolicyPair,
    pub max_archive_bytes: u64,
    /// Total file content one archive may inflate to.
    pub max_expanded_bytes: u64,
    pub mail_config: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let db_path = match std::env::var(ENV_DB_PATH) {
            Ok(value) => expand_with_home(&value, &home),
            Err(_) => default_db_path().context("XDG data directory is unavailable")?,
        };
        let view = read_policy_env(ENV_DEFAULT_VIEW_POLICY, Policy::Users)?;
        let edit = read_policy_env(ENV_DEFAULT_EDIT_POLICY, Policy::Users)?;
        let max_archive_bytes = read_u64_env(ENV_MAX_ARCHIVE_BYTES, DEFAULT_MAX_ARCHIVE_BYTES);
        let max_expanded_bytes = read_u64_env(ENV_MAX_EXPANDED_BYTES, DEFAULT_MAX_EXPANDED_BYTES);
        let mail_config = std::env::var(ENV_MAIL_CONFIG)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_with_home(&value, &home));

        Ok(Self {
            db_path,
            default_policy: PolicyPair::new(view, edit),
            max_archive_bytes,
            max_expanded_bytes,
            mail_config,
        })
    }
}

/// Contents of the file named by `FRAGVAULT_MAIL_CONFIG`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub receiver: MailReceiverConfig,
    pub users: Vec<MailUser>,
}

pub fn load_mail_settings(path: &Path) -> anyhow::Result<MailSettings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mail config at {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid mail config at {}", path.display()))
}

fn read_policy_env(name: &str, default: Policy) -> anyhow::Result<Policy> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .parse()
            .with_context(|| format!("{name} holds an invalid policy")),
        _ => Ok(default),
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsers_fall_back_to_defaults() {
        assert_eq!(read_u64_env("FRAGVAULT_DOES_NOT_EXIST_123", 10), 10);
        assert_eq!(
            read_policy_env("FRAGVAULT_DOES_NOT_EXIST_456", Policy::Admin).unwrap(),
            Policy::Admin
        );
    }

    #[test]
    fn mail_settings_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.json");
        std::fs::write(
            &path,
            r#"{
                "receiver": {"public_create_address": "tasks@example.com"},
                "users": [{"id": "user-1", "username": "alice", "addresses": ["alice@example.com"]}]
            }"#,
        )
        .unwrap();

        let settings = load_mail_settings(&path).unwrap();
        assert_eq!(
            settings.receiver.public_create_address.as_deref(),
            Some("tasks@example.com")
        );
        assert_eq!(settings.users.len(), 1);
        assert!(load_mail_settings(&dir.path().join("missing.json")).is_err());
    }
}
