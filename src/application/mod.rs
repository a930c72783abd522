//! Application services behind the demo HTTP surface.

pub mod error;
pub mod orders;
