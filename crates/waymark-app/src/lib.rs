//! Headless waymark host.
//!
//! Drives the message client from a simulated viewer at the game's fixed
//! tick rate, with a presenter that logs instead of rendering.

pub mod driver;
pub mod headless;
pub mod platform;
pub mod tick_clock;
pub mod viewer;

pub use driver::{AppError, Driver, run};
