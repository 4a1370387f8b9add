//! HTTP/1.x pieces the proxy speaks: request line parsing, header
//! filtering, outbound request reconstruction and error pages.

pub mod forward;
pub mod headers;
pub mod request;
pub mod response;

pub use forward::build_forward_request;
pub use headers::{HeaderField, HeaderList};
pub use request::{ParseError, RequestLine, Target};
pub use response::ErrorResponse;
