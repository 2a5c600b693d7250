pub mod engine;
pub mod fetch;
pub mod reducer;
pub mod settings;

pub use engine::*;
pub use fetch::*;
pub use reducer::*;
pub use settings::*;
