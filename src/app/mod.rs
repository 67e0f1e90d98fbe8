//! Request dispatch core: Apps, endpoints, request readers, response builders and the wrappers
//! that turn annotated handlers into endpoints.

mod application;
mod binding;
mod endpoint;
mod error;
mod params;
mod provider;
mod request;
mod response;
mod routing;
mod status;
mod wrapper;

pub use application::{default_error_response, default_not_found_response, App, ErrorCallback};
pub use binding::{bind_target_to_app_provider, BindingError, BindingMetadata, BindingRegistry, BoundAppProvider};
pub use endpoint::{Endpoint, EndpointCallback, EndpointFuture, EndpointsProvider, EndpointsResolver};
pub use error::{BoxError, Cause, HandlerError, RequestHandlingError, TraceableError, TracedError};
pub use params::{parse_params, Params};
pub use provider::{AppProvider, SimpleAppProvider};
pub use request::{
    BeforeHook, BufferedRequestReader, Request, RequestBody, RequestHead, RequestReader, SharedRequestReader,
    STREAM_CHUNK_SIZE,
};
pub use response::{Body, Response, ResponseBuilder, ResponseKind, APPLICATION_JSON, TEXT_HTML, TEXT_PLAIN};
pub use routing::Routing;
pub use status::Status;
pub use wrapper::{AppWrapper, Injector};
