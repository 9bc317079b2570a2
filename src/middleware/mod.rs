pub mod auth;
pub mod https;
pub mod response;
pub mod throttle;

pub use auth::{auth_middleware, RequestContext};
pub use https::require_https_middleware;
pub use response::{ApiResponse, ApiResult};
pub use throttle::throttle_middleware;
