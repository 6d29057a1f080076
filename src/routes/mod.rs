//! HTTP route handlers.

pub mod backchannel;
pub mod end_session;
pub mod health;
pub mod logout;
pub mod me;
pub mod session;
