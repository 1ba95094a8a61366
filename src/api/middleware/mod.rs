//! API middleware components

pub mod acting_user;
pub mod logging;

pub use acting_user::{ActingUser, USER_ID_HEADER};
pub use logging::logging_middleware;
