//! Relay server configuration, loaded from environment variables.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("RELAY_SAFE_PATH_PREFIX is required when RELAY_ENABLE_SAFE_PATH is set")]
    MissingSafePathPrefix,
}

/// Runtime configuration for the relay service.
#[derive(Debug, Clone)]
pub struct RelayServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Mount point of the relay routes, e.g. `/relay`. Must match the
    /// `RelayRoute` base path the player is configured with.
    pub base_path: String,
    /// When enabled, only the path-form endpoint with the configured prefix
    /// is accepted; everything else is rejected before any upstream fetch.
    /// This keeps the relay from being usable as an open proxy.
    pub enable_safe_path: bool,
    /// Required path prefix for safe-path mode.
    pub safe_path_prefix: Option<String>,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 12590,
            base_path: "/relay".to_string(),
            enable_safe_path: false,
            safe_path_prefix: None,
        }
    }
}

impl RelayServerConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `RELAY_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `RELAY_PORT` (e.g. "12590")
    /// - `RELAY_BASE_PATH` (e.g. "/relay")
    /// - `RELAY_ENABLE_SAFE_PATH` ("true"/"1")
    /// - `RELAY_SAFE_PATH_PREFIX` (e.g. "media")
    ///
    /// Safe-path mode with no prefix is a structural misconfiguration and is
    /// rejected at load time rather than per request.
    pub fn from_env_or_default() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("RELAY_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("RELAY_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        if let Ok(base_path) = std::env::var("RELAY_BASE_PATH") {
            // A bare "/" or empty value keeps the default mount point; the
            // router cannot nest at the root.
            let trimmed = base_path.trim().trim_matches('/');
            if !trimmed.is_empty() {
                config.base_path = format!("/{trimmed}");
            }
        }

        if let Ok(flag) = std::env::var("RELAY_ENABLE_SAFE_PATH") {
            config.enable_safe_path = matches!(flag.trim(), "1" | "true" | "TRUE" | "True");
        }

        if let Ok(prefix) = std::env::var("RELAY_SAFE_PATH_PREFIX")
            && !prefix.trim().is_empty()
        {
            config.safe_path_prefix = Some(prefix.trim().trim_matches('/').to_string());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_safe_path
            && self
                .safe_path_prefix
                .as_deref()
                .is_none_or(|prefix| prefix.is_empty())
        {
            return Err(ConfigError::MissingSafePathPrefix);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_path_mode_requires_a_prefix() {
        let config = RelayServerConfig {
            enable_safe_path: true,
            safe_path_prefix: None,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RelayServerConfig {
            enable_safe_path: true,
            safe_path_prefix: Some("media".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_disable_safe_path() {
        let config = RelayServerConfig::default();
        assert!(!config.enable_safe_path);
        assert!(config.validate().is_ok());
    }
}
