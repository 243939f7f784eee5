//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SupervisorConfig (validated, immutable)
//!     → live.rs (LiveConfig snapshot read by each attach)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs parses new config
//!     → validation.rs validates
//!     → LiveConfig::replace (atomic swap)
//!     → ConfigChange published with the phases that moved
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A request keeps the thresholds it was attached with across reloads

pub mod live;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use live::LiveConfig;
pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{LogFormat, ObservabilityConfig, SupervisorConfig};
pub use validation::{validate_config, ValidationError, MAX_THRESHOLD_MS};
pub use watcher::{apply_reload, ConfigChange, ConfigWatcher};
