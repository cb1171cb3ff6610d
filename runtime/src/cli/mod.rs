//! CLI subcommand implementations for the feargreed binary.

pub mod doctor;
pub mod run_cmd;
pub mod show_cmd;
