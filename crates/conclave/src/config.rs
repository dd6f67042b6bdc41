//! Manager configuration.
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::{Error, Result};

/// Configuration for a party manager.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Settings for greeting sessions.
    pub greeting: GreetingConfig,

    /// Settings for peer authentication.
    pub auth: AuthConfig,
}

/// Configuration for greeting sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GreetingConfig {
    /// Timeout for a single greeting command in seconds.
    ///
    /// A session that does not receive its next command within
    /// this window is destroyed.
    ///
    /// Default is 30 seconds.
    pub command_timeout: u64,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            command_timeout: 30,
        }
    }
}

/// Configuration for peer authentication freshness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthConfig {
    /// Maximum age of a peer credential in seconds.
    ///
    /// Default is 24 hours.
    pub max_age: u64,

    /// Maximum tolerated clock skew into the future in seconds.
    ///
    /// Default is 1 hour.
    pub max_skew: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_age: 86_400,
            max_skew: 3_600,
        }
    }
}

impl ManagerConfig {
    /// Load a manager config from a file path.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !fs::try_exists(path.as_ref()).await? {
            return Err(Error::NotFile(
                path.as_ref().to_path_buf(),
            ));
        }
        let contents =
            fs::read_to_string(path.as_ref()).await?;
        let config: ManagerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.greeting.command_timeout == 0 {
            return Err(Error::CommandTimeoutConfig);
        }
        if self.auth.max_age == 0 {
            return Err(Error::AuthWindowConfig);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn load_overrides_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("conclave.toml");
        tokio::fs::write(
            &path,
            r#"
[greeting]
command-timeout = 5

[auth]
max-age = 600
max-skew = 60
"#,
        )
        .await?;

        let config = ManagerConfig::load(&path).await?;
        assert_eq!(5, config.greeting.command_timeout);
        assert_eq!(600, config.auth.max_age);
        assert_eq!(60, config.auth.max_skew);
        Ok(())
    }

    #[tokio::test]
    async fn rejects_zero_timeout() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("conclave.toml");
        tokio::fs::write(
            &path,
            "[greeting]\ncommand-timeout = 0\n",
        )
        .await?;

        let result = ManagerConfig::load(&path).await;
        assert!(matches!(
            result,
            Err(Error::CommandTimeoutConfig)
        ));
        Ok(())
    }
}
