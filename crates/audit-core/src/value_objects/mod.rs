//! Value objects - immutable types that represent domain concepts

mod ids;
mod window;

pub use ids::{EntityId, EventId, IdParseError};
pub use window::TimeWindow;
