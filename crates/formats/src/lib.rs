pub mod filter;
pub mod layer;
pub mod metadata;
pub mod page;
pub mod rows;
pub mod style;
pub mod visualisation;

pub use filter::*;
pub use layer::*;
pub use metadata::*;
pub use page::*;
pub use rows::*;
pub use style::*;
pub use visualisation::*;
