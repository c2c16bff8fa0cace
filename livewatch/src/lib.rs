//! livewatch library crate.
//!
//! Health monitoring and auto-healing for live video units, plus a discovery
//! crawler that finds new ones.

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod prober;
pub mod recovery;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod utils;

pub use engine::{Capabilities, Engine, EngineStats};
pub use error::{Error, Result};
