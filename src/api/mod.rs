//! API layer - HTTP endpoints and middleware

pub mod approvals;
pub mod health;
pub mod middleware;
pub mod router;
pub mod state;
pub mod types;
pub mod workflow;

pub use middleware::ActingUser;
pub use router::{create_router, create_router_with_state};
pub use state::AppState;
