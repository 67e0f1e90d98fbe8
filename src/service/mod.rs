//! Model backends and model rules that need the database or configuration.

mod pg;
mod validation;

pub use pg::{PgCursor, PgModelService, PgTransaction};
pub use validation::{RuleValidator, ValidationRule};
