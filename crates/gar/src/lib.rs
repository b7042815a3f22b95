//! Command implementations for the `gar` tool.

pub mod commands;
