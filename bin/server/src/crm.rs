//! A stand-in CRM that enrols every contact in one organisation.

use async_trait::async_trait;
use idm_axum::{RoleResolutionError, RoleResolver};
use idm_identity::ServiceRoles;
use rootcause::Report;
use tracing::debug;

use crate::config::DemoConfig;

pub struct DemoRoleResolver {
    org_id: String,
    org_name: String,
}

impl DemoRoleResolver {
    #[must_use]
    pub fn new(config: &DemoConfig) -> Self {
        Self {
            org_id: config.org_id.clone(),
            org_name: config.org_name.clone(),
        }
    }
}

#[async_trait]
impl RoleResolver for DemoRoleResolver {
    async fn resolve_authorization_roles(
        &self,
        service_id: &str,
        contact_id: &str,
    ) -> Result<ServiceRoles, Report<RoleResolutionError>> {
        if contact_id.trim().is_empty() {
            return Err(RoleResolutionError::UnknownContact {
                contact_id: contact_id.to_string(),
            }
            .into());
        }
        debug!(service_id, contact_id, "resolving demo roles");
        Ok(ServiceRoles {
            roles: vec![format!("{}:member:active", self.org_id)],
            mappings: vec![
                format!("{}:{}", self.org_id, self.org_name),
                "member:Member".to_string(),
                "active:Active".to_string(),
            ],
        })
    }
}
