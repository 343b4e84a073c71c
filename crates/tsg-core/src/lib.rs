//! Core domain + application logic for the string-session generator bot.
//!
//! This crate is intentionally framework-agnostic. Telegram (Bot API) and the
//! MTProto login client live behind ports (traits) implemented in adapter
//! crates.

pub mod audit;
pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod limits;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod service;
pub mod wizard;

pub use errors::{Error, Result};
