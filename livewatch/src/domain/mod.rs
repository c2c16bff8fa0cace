//! Domain layer for livewatch.
//!
//! This module contains the core entities and value objects.

pub mod unit;
pub mod value_objects;

pub use unit::{Unit, UnitStatus};
pub use value_objects::*;
