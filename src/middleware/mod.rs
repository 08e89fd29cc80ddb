pub mod auth;
pub mod response;

pub use auth::{session_middleware, CallerSession};
pub use response::{ApiResponse, ApiResult};
