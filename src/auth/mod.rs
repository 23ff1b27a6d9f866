//! BWS authentication: JWT signing and the request interceptor.

pub mod interceptor;
pub mod token;

pub use interceptor::BearerInterceptor;
pub use token::{BwsClaims, BwsTokenProvider};
