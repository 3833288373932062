//! Request handlers.

pub mod cache;
pub mod health;
pub mod queue;
pub mod scan;

pub use cache::*;
pub use health::*;
pub use queue::*;
pub use scan::*;
