//! Recovery controller and its policy.

mod controller;
mod policy;

pub use controller::{CheckReport, RecoveryController, Transition};
pub use policy::RecoveryPolicy;
