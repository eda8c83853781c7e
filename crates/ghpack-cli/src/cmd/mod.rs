//! Command implementations, one module per subcommand family.

pub mod download;
pub mod list;
pub mod repos;
