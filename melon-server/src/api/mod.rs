pub mod auth;
pub mod error;
pub mod follows;
pub mod notifications;
pub mod onboarding;
pub mod posts;
pub mod profiles;
pub mod reactions;

pub use error::{ApiError, ApiResult};
