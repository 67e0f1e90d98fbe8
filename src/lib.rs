//! Scale Armor: endpoint routing, app composition and a document model layer served over axum.

pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod model;
pub mod router;
pub mod server;
pub mod service;
pub mod sql;
pub mod store;

pub use app::{App, AppProvider, AppWrapper, BindingRegistry, EndpointsProvider, ResponseBuilder, Routing, SimpleAppProvider, Status};
pub use config::Settings;
pub use controller::Controller;
pub use error::ConfigError;
pub use http::{common_routes, router};
pub use model::{MemoryModelService, ModelAppProvider, ModelController, ModelService, Query, UpdateQuery};
pub use server::Server;
pub use service::{PgModelService, PgTransaction, RuleValidator};
pub use store::{ensure_collection, ensure_database_exists};
