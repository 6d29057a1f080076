//! UserInfo endpoint access and response validation.

pub mod requestor;
pub mod response;
pub mod validator;

pub use requestor::{UserInfoError, UserInfoRequestor};
pub use response::EndpointResponse;
pub use validator::{TokenResponseError, TokenResponseValidator, validate_claims};
