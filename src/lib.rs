//! media-ledger - An idempotent media-ingestion ledger
//!
//! This crate provides:
//! - A SQLite-backed ledger of media resources deduplicated by `resource_id`
//! - Per-user checkpoints that only move forward
//! - Resumable ingestion passes over a JSON export or an HTTP media feed
//! - A CLI for running passes and inspecting the ledger

pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod meta;
pub mod pass;
pub mod progress;
pub mod retry;
pub mod source;

pub use config::Config;
pub use error::{Error, Result};
