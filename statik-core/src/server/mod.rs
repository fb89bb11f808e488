//! Gateway-independent request/response model and mount table

mod mount;
mod request;
mod response;

pub use self::mount::{Mount, MountTable};
pub use self::request::StaticRequest;
pub use self::response::{BodyStream, ResponseBody, StaticResponse};
