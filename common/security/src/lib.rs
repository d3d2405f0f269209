pub mod error;
pub mod level;
pub mod policy;
pub mod resolver;

pub use error::{PolicyError, SecurityError};
pub use level::{ensure_level, AccessLevel};
pub use policy::{GroupMappingDocument, GroupMappingPolicy};
pub use resolver::resolve;
