//! # RPC Service Configuration
//!
//! Generic layered configuration loading shared by RPC services: a base
//! TOML file, an optional per-environment override file, then environment
//! variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rpc_config::ConfigLoader;
//! # #[derive(serde::Deserialize, Default)] struct ServerConfig {}
//!
//! let config: ServerConfig = ConfigLoader::new()
//!     .with_file("config/server.toml")
//!     .with_environment(Some("production"))
//!     .load()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod loader;

pub use loader::{to_toml, ConfigLoader, DEFAULT_ENV_PREFIX, ENV_SEPARATOR};
