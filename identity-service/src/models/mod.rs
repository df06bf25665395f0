pub mod audit_event;
pub mod break_glass;
pub mod identity;
pub mod idempotency;
pub mod mfa;
pub mod portal_token;
pub mod role;
pub mod session;

pub use audit_event::{AuditEvent, AuditEventType};
pub use break_glass::{BreakGlassGrant, BreakGlassToken};
pub use identity::{Identity, IdentityKind, IdentityStatus};
pub use idempotency::{IdempotencyClaim, IdempotencyRecord, IdempotencyScope};
pub use mfa::{MfaSecret, MfaState};
pub use portal_token::PortalToken;
pub use role::{MaskingLevel, Role};
pub use session::{RevocationReason, RotationOutcome, Session};
