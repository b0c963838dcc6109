//! Task Lists MCP Server Library
//!
//! This module exports the core components for testing and integration.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod query;
pub mod scheduler;
pub mod tools;
pub mod types;
