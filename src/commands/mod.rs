//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build packages and optionally extract them
//! - `download` - Fetch package sources
//! - `extract` - Extract built package archives
//! - `list` - List descriptors
//! - `deps` - Show dependency levels
//! - `validate` - Check descriptors and dependency graphs
//! - `clean` - Remove ephemeral and stale build state

pub mod build;
pub mod clean;
pub mod deps;
pub mod download;
pub mod extract;
pub mod list;
pub mod validate;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use deps::cmd_deps;
pub use download::cmd_download;
pub use extract::cmd_extract;
pub use list::cmd_list;
pub use validate::cmd_validate;
