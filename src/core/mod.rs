pub mod client;
pub mod refresh;
pub mod resources;
pub mod session;

pub use crate::domain::model::{ApiRequest, ApiResponse, RequestOptions};
pub use crate::domain::ports::{SessionInvalidator, Transport};
pub use crate::utils::error::Result;
