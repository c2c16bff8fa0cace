//! Unit domain module.

mod entity;
mod status;

pub use entity::Unit;
pub use status::UnitStatus;
