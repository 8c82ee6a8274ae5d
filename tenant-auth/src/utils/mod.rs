pub mod validation;

pub use validation::{PathId, ValidatedJson};
