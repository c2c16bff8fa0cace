//! Unit registry and its change events.

mod events;
mod manager;

pub use events::{UnitEvent, UnitEventBroadcaster};
pub use manager::{NewUnit, StatusCounts, UnitRegistry, UnitSlot};
