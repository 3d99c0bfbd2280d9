//! HTTP side of the market-data protocol: the fire-and-forget [`Transport`]
//! the session engine is written against, its `reqwest` implementation, the
//! URL builders and the JSON wire types.

pub mod error;
pub mod http;
pub mod responses;
pub mod routes;
pub mod transport;

// --- Public API ---
pub use error::ApiError;
pub use http::ReqwestTransport;
pub use responses::{
    ConfigRequest, DataResponse, KlinesResponse, LoginResponse, ResultCode, StatusResponse,
    WireCandle, WireCatalogEntry, WireDetection, WireFilterRule, WireUserMessage, parse_element,
    parse_response,
};
pub use routes::Endpoints;
pub use transport::{
    CallGuard, Completion, HandleSequence, HttpRequest, InFlight, Method, RequestHandle,
    Transport, TransportError,
};
