#![forbid(unsafe_code)]

pub mod model;
pub mod rollup;
pub mod time;

pub use rollup::{DEFAULT_TOTAL_MODULES, Rollup};
pub use time::Clock;
