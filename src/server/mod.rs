//! Request/response types and the HTTP/1.1 server they run on.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{
    parse_head, BodyReader, HeadError, HttpServer, HttpService, RequestHead, ServerHandle, MAX_HEADERS,
};
pub use request::{HeaderVec, ParamVec, Principal, RequestContext, RequestInfo};
pub use response::{FinishHook, ResponseWriter};
pub use service::AppService;
