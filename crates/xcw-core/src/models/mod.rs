//! Data models for XCW

mod alert;
mod graph;
mod policy;

pub use alert::*;
pub use graph::*;
pub use policy::*;

pub(crate) use graph::epoch_seconds;
