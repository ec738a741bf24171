//! API error type and its JSON response.

mod response;
mod types;

pub use types::{ApiError, ApiResult};
