//! Permission resolver: pure (role, action) checks and masking levels.
//!
//! Authorization here is deliberately side-effect free. The 401/403 split is
//! owned by the error taxonomy: by the time these functions run, credentials
//! are valid, so a denial is always 403.

use crate::error::ServiceError;
use crate::models::{MaskingLevel, Role};

/// Actions the core itself gates. The CRUD surface outside this core defines
/// its own actions against the same matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewLeads,
    EditLeads,
    ManageInvoices,
    IssuePortalTokens,
    RevokeSessions,
    ToggleReadOnly,
    StartBreakGlass,
    DisableMfa,
    ViewAuditLog,
}

/// Pure permission check.
pub fn authorize(role: Role, action: Action) -> bool {
    match role {
        Role::Owner => true,
        Role::Admin => !matches!(action, Action::ToggleReadOnly | Action::DisableMfa),
        Role::Dispatcher => matches!(action, Action::ViewLeads | Action::EditLeads),
        Role::Finance => matches!(action, Action::ViewLeads | Action::ManageInvoices),
        Role::Viewer => matches!(action, Action::ViewLeads),
    }
}

/// Check a permission, mapping denial to the 403 error.
pub fn ensure(role: Role, action: Action) -> Result<(), ServiceError> {
    if authorize(role, action) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied)
    }
}

/// Field-level masking applied by response serialization downstream.
/// Viewer-equivalent roles see partially redacted contact fields.
pub fn masking_level(role: Role) -> MaskingLevel {
    match role {
        Role::Viewer => MaskingLevel::Partial,
        _ => MaskingLevel::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_can_do_everything() {
        for action in [
            Action::ViewLeads,
            Action::EditLeads,
            Action::ManageInvoices,
            Action::IssuePortalTokens,
            Action::RevokeSessions,
            Action::ToggleReadOnly,
            Action::StartBreakGlass,
            Action::DisableMfa,
            Action::ViewAuditLog,
        ] {
            assert!(authorize(Role::Owner, action), "{:?}", action);
        }
    }

    #[test]
    fn read_only_toggle_and_mfa_disable_are_owner_only() {
        for role in [Role::Admin, Role::Dispatcher, Role::Finance, Role::Viewer] {
            assert!(!authorize(role, Action::ToggleReadOnly), "{:?}", role);
            assert!(!authorize(role, Action::DisableMfa), "{:?}", role);
        }
    }

    #[test]
    fn admin_can_start_break_glass_but_dispatcher_cannot() {
        assert!(authorize(Role::Admin, Action::StartBreakGlass));
        assert!(!authorize(Role::Dispatcher, Action::StartBreakGlass));
    }

    #[test]
    fn finance_manages_invoices_not_leads() {
        assert!(authorize(Role::Finance, Action::ManageInvoices));
        assert!(!authorize(Role::Finance, Action::EditLeads));
        assert!(authorize(Role::Dispatcher, Action::EditLeads));
        assert!(!authorize(Role::Dispatcher, Action::ManageInvoices));
    }

    #[test]
    fn ensure_maps_denial_to_permission_denied() {
        assert!(matches!(
            ensure(Role::Viewer, Action::EditLeads),
            Err(ServiceError::PermissionDenied)
        ));
        assert!(ensure(Role::Viewer, Action::ViewLeads).is_ok());
    }

    #[test]
    fn only_viewer_gets_masked_fields() {
        assert_eq!(masking_level(Role::Viewer), MaskingLevel::Partial);
        for role in [Role::Owner, Role::Admin, Role::Dispatcher, Role::Finance] {
            assert_eq!(masking_level(role), MaskingLevel::None);
        }
    }
}
