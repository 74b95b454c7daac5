pub mod form;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use form::decode_form;
pub use request::{read_request, RequestLine};
pub use response::Response;
pub use router::{Route, Router};
pub use server::AcceptLoop;
