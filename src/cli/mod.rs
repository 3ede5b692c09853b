//! Command-line front end for the `rmbg` binary
//!
//! Compiled only when the `cli` feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, CliOutputFormat};
