//! qrlink Core - Shared types and protocol definitions
//!
//! This crate provides the foundational types used across all qrlink components.

pub mod config;
pub mod protocol;

pub use config::Config;
pub use protocol::{NotifyMessage, QrPayload, UserSummary};
