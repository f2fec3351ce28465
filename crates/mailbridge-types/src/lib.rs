//! # mailbridge-types
//!
//! Core type definitions for the mailbridge email channel.
//!
//! This crate is the foundation of the dependency graph -- the services,
//! channels and CLI crates all depend on it. It contains:
//!
//! - **[`error`]** -- [`MailbridgeError`] for configuration-level failures
//! - **[`config`]** -- Trigger, context-grouping and worker configuration
//! - **[`envelope`]** -- [`MessageEnvelope`], the decoded form of one mailbox item

pub mod config;
pub mod envelope;
pub mod error;

pub use config::{ContextMode, EmailChannelConfig, TriggerConfig, TriggerMode, WorkerConfig};
pub use envelope::MessageEnvelope;
pub use error::{MailbridgeError, Result};
