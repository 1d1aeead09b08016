//! CLI subcommands

pub mod historical;
