//! Axum extractors for request handling
//!
//! Custom extractors for caller identification, validation, and path ids.

mod caller;
mod path;
mod validated;

pub use caller::{
    caller_from_headers, Caller, ACCESS_REASON_HEADER, ACTOR_ID_HEADER, FORWARDED_FOR_HEADER,
};
pub use path::EventIdPath;
pub use validated::ValidatedQuery;
