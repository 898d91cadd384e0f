//! Runtime configuration.
//!
//! Loaded from an optional TOML file named by `WARDEN_CONFIG`, then
//! overridden by environment variables:
//!
//! - `WARDEN_BIND`: listen address
//! - `WARDEN_MAX_LOGIN_ATTEMPTS`: failed logins before lockout
//! - `WARDEN_LOCKOUT_MINUTES`: lockout duration
//! - `WARDEN_ADMIN_EMAIL` / `WARDEN_ADMIN_PASSWORD`: bootstrap administrator
//! - `WARDEN_TRUSTED_PROXIES`: comma-separated proxy addresses whose
//!   forwarding headers are believed
//!
//! Every section has defaults, so an empty file (or none) is valid.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use warden_auth::{HashingParams, LockoutPolicy, PasswordPolicy};

pub const CONFIG_PATH_VAR: &str = "WARDEN_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub password: PasswordPolicy,
    pub lockout: LockoutPolicy,
    pub reset: ResetConfig,
    pub session: SessionConfig,
    pub two_factor: TwoFactorConfig,
    pub hashing: HashingParams,
    pub reference: ReferenceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// Lifetime of a self-service reset token.
    pub reset_token_ttl_minutes: i64,
    /// Lifetime of a temporary password issued by an administrator.
    pub temporary_password_hours: i64,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            reset_token_ttl_minutes: 60,
            temporary_password_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_minutes: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwoFactorConfig {
    /// Issuer label shown in authenticator apps.
    pub issuer: String,
    /// Profiles whose members are told to enrol (reported on `/me`).
    pub required_for_profiles: Vec<String>,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            issuer: "Warden".to_string(),
            required_for_profiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub preload_types: Vec<String>,
    pub preload_modules: Vec<String>,
    /// Optional JSON file of reference items; the built-in set is used when
    /// absent.
    pub items_file: Option<String>,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            preload_types: vec!["status".to_string(), "role".to_string()],
            preload_modules: vec!["users".to_string()],
            items_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    /// Peers allowed to report the client address through
    /// `X-Forwarded-For` / `X-Real-IP`. Empty means the socket peer is
    /// always used.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            bootstrap_admin: None,
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl WardenConfig {
    /// File (if `WARDEN_CONFIG` is set) plus environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load_from_path(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `WARDEN_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("WARDEN_BIND") {
            self.server.bind = bind;
        }
        if let Some(raw) = lookup("WARDEN_MAX_LOGIN_ATTEMPTS") {
            self.lockout.max_attempts = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid WARDEN_MAX_LOGIN_ATTEMPTS: {raw}"))?;
        }
        if let Some(raw) = lookup("WARDEN_LOCKOUT_MINUTES") {
            self.lockout.duration_minutes = raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid WARDEN_LOCKOUT_MINUTES: {raw}"))?;
        }
        if let Some(raw) = lookup("WARDEN_TRUSTED_PROXIES") {
            self.server.trusted_proxies = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| p.parse::<IpAddr>())
                .collect::<Result<_, _>>()
                .with_context(|| format!("Invalid WARDEN_TRUSTED_PROXIES: {raw}"))?;
        }
        match (lookup("WARDEN_ADMIN_EMAIL"), lookup("WARDEN_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => {
                self.server.bootstrap_admin = Some(BootstrapAdmin { email, password });
            }
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("WARDEN_ADMIN_EMAIL and WARDEN_ADMIN_PASSWORD must be set together");
            }
            (None, None) => {}
        }
        self.validate()
    }

    /// Reject settings the service cannot honour. Every duration must be
    /// positive and at most a year (ten years for password expiry, where 0
    /// disables it).
    pub fn validate(&self) -> Result<()> {
        if self.lockout.max_attempts == 0 {
            anyhow::bail!("lockout.max_attempts must be at least 1");
        }
        check_range("lockout.duration_minutes", self.lockout.duration_minutes, MAX_MINUTES)?;
        check_range("session.ttl_minutes", self.session.ttl_minutes, MAX_MINUTES)?;
        check_range("reset.reset_token_ttl_minutes", self.reset.reset_token_ttl_minutes, MAX_MINUTES)?;
        check_range("reset.temporary_password_hours", self.reset.temporary_password_hours, MAX_HOURS)?;
        if self.password.expiry_days > MAX_EXPIRY_DAYS {
            anyhow::bail!("password.expiry_days must be at most {MAX_EXPIRY_DAYS} (0 disables expiry)");
        }
        Ok(())
    }
}

const MAX_MINUTES: i64 = 525_600;
const MAX_HOURS: i64 = 8_760;
const MAX_EXPIRY_DAYS: u32 = 3_650;

fn check_range(name: &str, value: i64, max: i64) -> Result<()> {
    if !(1..=max).contains(&value) {
        anyhow::bail!("{name} must be between 1 and {max}, got {value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = WardenConfig::from_toml("").unwrap();
        assert_eq!(config, WardenConfig::default());
        assert_eq!(config.lockout.max_attempts, 5);
        assert_eq!(config.password.min_length, 8);
        assert_eq!(config.reference.preload_types, vec!["status", "role"]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = WardenConfig::from_toml(
            r#"
            [password]
            min_length = 12
            require_special = false

            [lockout]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.password.min_length, 12);
        assert!(!config.password.require_special);
        assert!(config.password.require_uppercase);
        assert_eq!(config.lockout.max_attempts, 3);
        assert_eq!(config.lockout.duration_minutes, 30);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("WARDEN_BIND", "127.0.0.1:9000"),
            ("WARDEN_MAX_LOGIN_ATTEMPTS", "7"),
            ("WARDEN_TRUSTED_PROXIES", "10.0.0.1, ::1"),
            ("WARDEN_ADMIN_EMAIL", "root@example.com"),
            ("WARDEN_ADMIN_PASSWORD", "S3cure!pass"),
        ]
        .into_iter()
        .collect();
        let mut config = WardenConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.lockout.max_attempts, 7);
        assert_eq!(
            config.server.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse::<IpAddr>().unwrap()]
        );
        let admin = config.server.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "root@example.com");
        assert!(!format!("{admin:?}").contains("S3cure"));
    }

    #[test]
    fn out_of_range_durations_are_rejected() {
        let huge = WardenConfig::from_toml("[lockout]\nduration_minutes = 9223372036854775").unwrap();
        assert!(huge.validate().is_err());
        let mut huge = huge;
        assert!(huge.apply_env(|_| None).is_err());

        let negative = WardenConfig::from_toml("[reset]\ntemporary_password_hours = -5").unwrap();
        assert!(negative.validate().is_err());

        let session = WardenConfig::from_toml("[session]\nttl_minutes = 0").unwrap();
        assert!(session.validate().is_err());

        let expiry = WardenConfig::from_toml("[password]\nexpiry_days = 4000000000").unwrap();
        assert!(expiry.validate().is_err());

        let year = WardenConfig::from_toml("[lockout]\nduration_minutes = 525600\n[password]\nexpiry_days = 0").unwrap();
        assert!(year.validate().is_ok());
        assert!(WardenConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let mut config = WardenConfig::default();
        assert!(config
            .apply_env(|k| (k == "WARDEN_MAX_LOGIN_ATTEMPTS").then(|| "lots".to_string()))
            .is_err());
        let mut config = WardenConfig::default();
        assert!(config
            .apply_env(|k| (k == "WARDEN_TRUSTED_PROXIES").then(|| "proxy.local".to_string()))
            .is_err());
        let mut config = WardenConfig::default();
        assert!(config
            .apply_env(|k| (k == "WARDEN_ADMIN_EMAIL").then(|| "a@example.com".to_string()))
            .is_err());
    }
}
