//! Command-line front end for courier.

pub mod cli_args;
pub mod commands;

pub use cli_args::{Cli, Command, ConfigCommand, ExtractArgs};
pub use commands::dispatch;
