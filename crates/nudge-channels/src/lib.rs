//! # nudge-channels
//!
//! Notification transports for Nudge.

pub mod browser;
pub mod telegram;
mod utils;
