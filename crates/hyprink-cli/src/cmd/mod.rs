//! Subcommand implementations

pub mod completions;
pub mod install;
pub mod list;
pub mod log;
pub mod pack;
pub mod unpack;
pub mod verify;
