//! # nudge-core
//!
//! Core types, traits, configuration, reminder rules and error handling for Nudge.

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod records;
pub mod rules;
pub mod settings;
pub mod traits;
pub mod window;

pub use config::shellexpand;
