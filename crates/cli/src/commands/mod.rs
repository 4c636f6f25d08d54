//! Subcommand implementations.

pub mod init;
pub mod status;
pub mod style;
pub mod sync;
