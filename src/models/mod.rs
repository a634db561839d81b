//! Core data models for the agent dashboard.

mod ids;
mod player;
mod season;
mod summary;
mod tier;

pub use ids::*;
pub use player::*;
pub use season::*;
pub use summary::*;
pub use tier::*;
