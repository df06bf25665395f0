pub mod admin_gate;
pub mod auth;
pub mod idempotency;
pub mod org_scope;

pub use admin_gate::{admin_gate_middleware, break_glass_capture_middleware};
pub use auth::{auth_middleware, AuthIdentity};
pub use idempotency::idempotency_middleware;
pub use org_scope::{org_scope_middleware, OrgContext};
