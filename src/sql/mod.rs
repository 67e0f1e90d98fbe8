//! SQL for JSONB collection tables: identifiers quoted, values as parameters.

mod builder;
pub mod params;
mod translate;

pub use builder::*;
pub use params::PgBindValue;
pub use translate::{update_steps, where_clause};
