//! Safe SQL builder: identifiers from the catalog only, values as parameters.

mod builder;
pub mod params;
pub mod person;
pub use builder::*;
pub(crate) use builder::quoted;
pub use params::*;
