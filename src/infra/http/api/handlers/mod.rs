//! API handlers grouped by resource.

mod analytics;
mod blogs;
mod ops;
mod session;

pub use analytics::*;
pub use blogs::*;
pub use ops::*;
pub use session::*;
