//! # tether-settings
//!
//! Configuration management with layered sources for the tether stack.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** - [`TetherSettings::default()`]
//! 2. **Settings file** - `~/.tether/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables** - `TETHER_*` overrides (highest priority)
//!
//! The loaded value is owned by whoever calls [`load_settings`]; there is no
//! process-global copy. Servers build their state from one snapshot at
//! startup.
//!
//! # Usage
//!
//! ```no_run
//! use tether_settings::load_settings;
//!
//! let settings = load_settings(None).unwrap();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
