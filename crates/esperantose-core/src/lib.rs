//! Core of the Esperanto Stack Exchange relay and inline bot.
//!
//! Framework-agnostic: the Bot API and the Stack Exchange API live behind
//! ports (traits) implemented in adapter crates. This crate owns the
//! watermark, the dedup filter and the poll driver both loops share.

pub mod config;
pub mod dedup;
pub mod domain;
pub mod driver;
pub mod errors;
pub mod formatting;
pub mod forward;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod watermark;

pub use errors::{Error, Result};
