pub mod logging;
pub mod rounding;

pub use rounding::{round_to, round_tenth};
