pub mod analysis;
pub mod classify;
pub mod sample;
pub mod style;

pub use classify::*;
pub use style::*;
