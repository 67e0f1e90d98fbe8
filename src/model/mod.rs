//! Models and their persistence: the query algebra, paging, the backend contract, the in-memory
//! backend and the controller/app layer exposing a model over HTTP-style endpoints.

mod app;
mod controller;
pub mod document;
mod error;
mod memory;
mod paging;
mod query;
mod service;
pub mod translate;

pub use app::{ModelAppProvider, ModelOperation};
pub use controller::{CrudMethod, ModelController, ModelRules, PassThrough};
pub use error::ModelError;
pub use memory::{MemoryCursor, MemoryModelService};
pub use paging::{last_page, FindOptions, PagedData, PagingKeys, PagingOptions, SortType, DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
pub use query::{FieldPredicates, Operator, Pop, Predicate, Query, QueryError, UpdateQuery, ID_FIELD};
pub use service::{
    document_id, to_document, with_cursor, Cursor, DeleteResult, InsertOrUpdateResult, Model, ModelService,
    ReplaceResult, UpdateResult,
};
