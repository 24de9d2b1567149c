pub mod datatypes;
pub mod enums;
pub mod patient;
pub mod encounter;
pub mod clinical;
pub mod conversation;

pub use datatypes::*;
pub use patient::*;
pub use encounter::*;
pub use clinical::*;
pub use conversation::*;
