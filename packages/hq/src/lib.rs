//! hq - an interactive job-control shell
//!
//! Reads commands line by line, launches programs as jobs with their stdin
//! and stdout connected to the shell, and lets the operator talk to, signal
//! and inspect them. Process management lives in the `job_manager` crate;
//! this crate holds command parsing, configuration and the command loop.

pub mod command;
pub mod config;
pub mod dispatcher;
pub mod session;

pub use command::{Command, CommandError};
pub use config::{FileConfig, HqConfig, ShutdownConfig, load_config};
pub use dispatcher::Dispatcher;
