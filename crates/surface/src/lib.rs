pub mod paint;
pub mod recording;
pub mod surface;
pub mod sync;

pub use paint::*;
pub use recording::*;
pub use surface::*;
pub use sync::*;
