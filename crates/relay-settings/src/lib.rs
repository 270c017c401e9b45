//! # relay-settings
//!
//! Layered configuration for the relay, lowest priority first:
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: optionally seeded from a `.env` file
//! 4. **CLI flags**: applied by the binary via [`CliOverrides`]

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_env_overrides_from, deep_merge, load_dotenv, load_settings,
    load_settings_from_path,
};
pub use types::*;
