//! CLI command implementations.

pub mod check;
pub mod common;
pub mod init;
pub mod tags;
pub mod update;
