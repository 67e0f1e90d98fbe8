//! Method-aware route table keyed by `method:path`.

mod method;
mod table;

pub use method::{Method, UnsupportedMethod};
pub use table::{route_key, Route, Router};
