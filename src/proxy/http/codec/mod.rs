mod headers;
mod request;
mod response;

pub use headers::{HeaderLine, RequestHeaders};
pub use request::{
    ParseStatus, RequestHead, RequestLimits, parse_head, parse_request, read_request,
};
pub use response::{error_response, response_status};
