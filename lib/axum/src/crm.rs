//! The CRM collaborator used to resolve organisation roles.

use async_trait::async_trait;
use idm_identity::ServiceRoles;
use rootcause::Report;

use crate::error::RoleResolutionError;

/// Source of a contact's organisation roles for a service.
///
/// Implemented by the hosting application against its CRM. Only the
/// token refresh path calls it.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// Returns the raw roles and id mappings for `contact_id` within
    /// `service_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the CRM is unavailable or does not know the
    /// contact.
    async fn resolve_authorization_roles(
        &self,
        service_id: &str,
        contact_id: &str,
    ) -> Result<ServiceRoles, Report<RoleResolutionError>>;
}
