pub mod groups;
pub mod ids;
pub mod options;
pub mod state;
pub mod validity;

pub use groups::*;
pub use ids::*;
pub use options::*;
pub use state::*;
pub use validity::*;
