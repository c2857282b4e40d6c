pub mod analysis;
pub mod concept;
pub mod plan;
pub mod result;

pub use analysis::*;
pub use concept::*;
pub use plan::*;
pub use result::*;
