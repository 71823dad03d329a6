//! Organisation roles resolved from the CRM.
//!
//! The CRM hands back two string lists. `roles` holds
//! `organisation-id:role-id:status-id` triples and `mappings` holds
//! `id:name` pairs naming every id used in `roles`. [`RoleSet::parse`]
//! turns them into lookups by organisation, by status and by role.

use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::RoleParseError;

/// Raw role data for one contact and service, as the CRM returns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRoles {
    pub roles: Vec<String>,
    pub mappings: Vec<String>,
}

impl ServiceRoles {
    /// # Errors
    ///
    /// Returns an error if the roles or mappings are malformed.
    pub fn parse(&self) -> Result<Option<RoleSet>, Report<RoleParseError>> {
        RoleSet::parse(&self.roles, &self.mappings)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleStatus {
    pub id: String,
    pub name: String,
}

/// A role held within one organisation, with its enrolment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRole {
    pub id: String,
    pub name: String,
    pub status: RoleStatus,
}

/// An organisation and the roles held in it, keyed by role id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgRoles {
    pub organisation: Organisation,
    pub roles: BTreeMap<String, OrgRole>,
}

impl OrgRoles {
    fn empty(organisation: &Organisation) -> Self {
        Self {
            organisation: organisation.clone(),
            roles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRole {
    pub org_id: String,
    pub org_name: String,
    pub role_id: String,
    pub role_name: String,
    pub status_id: String,
    pub status_name: String,
}

/// Parsed organisation roles.
///
/// Every grouping is ordered by id, and `flat` is sorted, so two inputs
/// listing the same roles in different orders parse to equal sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSet {
    /// organisation id -> roles in that organisation
    pub roles_by_org: BTreeMap<String, OrgRoles>,
    /// status id -> organisation id -> roles with that status
    pub roles_by_status: BTreeMap<String, BTreeMap<String, OrgRoles>>,
    /// role id -> organisation id -> the role held there
    pub roles_by_role: BTreeMap<String, BTreeMap<String, OrgRole>>,
    pub flat: Vec<FlatRole>,
}

impl RoleSet {
    /// Parses role triples and id mappings.
    ///
    /// Returns `Ok(None)` when either list is empty: the user has no
    /// enrolments yet.
    ///
    /// # Errors
    ///
    /// Returns an error for a role that is not a triple, a mapping without
    /// a `:`, or a role id that has no mapping.
    pub fn parse(
        roles: &[String],
        mappings: &[String],
    ) -> Result<Option<Self>, Report<RoleParseError>> {
        if roles.is_empty() || mappings.is_empty() {
            return Ok(None);
        }

        let mut names = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            let (id, name) =
                mapping
                    .split_once(':')
                    .ok_or_else(|| RoleParseError::MalformedMapping {
                        value: mapping.clone(),
                    })?;
            names.insert(id, name);
        }
        let name_of = |id: &str| -> Result<String, RoleParseError> {
            names
                .get(id)
                .map(|name| (*name).to_string())
                .ok_or_else(|| RoleParseError::UnmappedId { id: id.to_string() })
        };

        let mut set = Self::default();
        for role in roles {
            let mut parts = role.split(':');
            let (Some(org_id), Some(role_id), Some(status_id), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(RoleParseError::MalformedRole {
                    value: role.clone(),
                }
                .into());
            };

            let organisation = Organisation {
                id: org_id.to_string(),
                name: name_of(org_id)?,
            };
            let org_role = OrgRole {
                id: role_id.to_string(),
                name: name_of(role_id)?,
                status: RoleStatus {
                    id: status_id.to_string(),
                    name: name_of(status_id)?,
                },
            };

            set.flat.push(FlatRole {
                org_id: organisation.id.clone(),
                org_name: organisation.name.clone(),
                role_id: org_role.id.clone(),
                role_name: org_role.name.clone(),
                status_id: org_role.status.id.clone(),
                status_name: org_role.status.name.clone(),
            });
            set.roles_by_org
                .entry(organisation.id.clone())
                .or_insert_with(|| OrgRoles::empty(&organisation))
                .roles
                .insert(org_role.id.clone(), org_role.clone());
            set.roles_by_status
                .entry(org_role.status.id.clone())
                .or_default()
                .entry(organisation.id.clone())
                .or_insert_with(|| OrgRoles::empty(&organisation))
                .roles
                .insert(org_role.id.clone(), org_role.clone());
            set.roles_by_role
                .entry(org_role.id.clone())
                .or_default()
                .insert(organisation.id, org_role);
        }
        set.flat.sort();
        set.flat.dedup();

        Ok(Some(set))
    }

    /// Organisations in which the user holds `role_id` with any status.
    pub fn organisations_with_role<'a>(
        &'a self,
        role_id: &str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.roles_by_role
            .get(role_id)
            .into_iter()
            .flat_map(|orgs| orgs.keys().map(String::as_str))
    }
}
