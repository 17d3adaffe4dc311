//! Layered Configuration Loading
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!
//! 1. Type defaults (`#[serde(default)]` on the target struct)
//! 2. Base TOML file, e.g. `config/server.toml`
//! 3. Environment override next to it, e.g. `config/server.production.toml`
//! 4. Environment variables, e.g. `RPC__LISTEN__ADDRESS=0.0.0.0:7400`

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "RPC";

/// Separator between the prefix and nested keys in variable names
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    base: Option<PathBuf>,
    environment: Option<String>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            base: None,
            environment: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base TOML file; it must exist when set
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.base = Some(path.into());
        self
    }

    /// Environment name selecting `<base>.<environment>.toml`
    pub fn with_environment(mut self, environment: Option<&str>) -> Self {
        self.environment = environment.map(str::to_string);
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Path of the environment override for `base`
    pub fn environment_file(base: &Path, environment: &str) -> PathBuf {
        let stem = base
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        base.with_file_name(format!("{stem}.{environment}.toml"))
    }

    /// Load and deserialize configuration
    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        let mut builder = Config::builder();

        if let Some(base) = &self.base {
            info!("Loading configuration: {:?}", base);
            builder = builder.add_source(File::from(base.as_path()).required(true));

            if let Some(environment) = &self.environment {
                let env_file = Self::environment_file(base, environment);
                if env_file.exists() {
                    info!("Loading environment config: {:?}", env_file);
                    builder = builder.add_source(File::from(env_file));
                } else {
                    warn!("Environment config not found: {:?}", env_file);
                }
            }
        } else if self.environment.is_some() {
            warn!("Environment given without a base config file; ignoring it");
        }

        debug!(prefix = %self.env_prefix, "Applying environment variable overrides");
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

/// Render a configuration as TOML, e.g. for `--print-config`
pub fn to_toml<T: Serialize>(config: &T) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}
