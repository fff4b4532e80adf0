pub mod errors;
pub mod parameter;
pub mod state;

pub use errors::*;
pub use parameter::*;
pub use state::*;
