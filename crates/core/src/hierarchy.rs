use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::travel_request::ValidationStatus;
use crate::domain::user::{Role, User};

/// One directed edge of the validation chain: `validator` signs off requests
/// submitted by `requester`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub validator: Role,
    pub requester: Role,
}

/// Data-driven description of who validates whom. The canonical district
/// chain ships as the default; tests and deployments can inject variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub edges: Vec<HierarchyEdge>,
    /// Roles that may validate any request regardless of chain position.
    pub wildcard_validators: Vec<Role>,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            edges: vec![
                HierarchyEdge { validator: Role::Principal, requester: Role::Teacher },
                HierarchyEdge { validator: Role::Psds, requester: Role::Principal },
                HierarchyEdge { validator: Role::Asds, requester: Role::Psds },
                HierarchyEdge { validator: Role::Sds, requester: Role::Asds },
            ],
            wildcard_validators: vec![Role::Admin, Role::AoAdmin, Role::AoAdminOfficer],
        }
    }
}

/// The per-role pending-request scope, expressed as data the repository layer
/// can turn into a query. Roles outside the chain get `Empty`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboxScope {
    Empty,
    /// Pending-validation requests from one requester role, optionally fenced
    /// to the viewer's school or district.
    PendingFrom { requester_role: Role, school_id: Option<String>, district: Option<String> },
    /// Every request awaiting hierarchical validation (administrative office).
    AllWithValidation(ValidationStatus),
}

#[derive(Clone, Debug)]
pub struct ApprovalHierarchy {
    validator_by_requester: HashMap<Role, Role>,
    requesters_by_validator: HashMap<Role, Vec<Role>>,
    wildcards: HashSet<Role>,
}

impl Default for ApprovalHierarchy {
    fn default() -> Self {
        Self::new(HierarchyConfig::default())
    }
}

impl ApprovalHierarchy {
    pub fn new(config: HierarchyConfig) -> Self {
        let mut validator_by_requester = HashMap::new();
        let mut requesters_by_validator: HashMap<Role, Vec<Role>> = HashMap::new();

        for edge in config.edges {
            validator_by_requester.insert(edge.requester, edge.validator);
            requesters_by_validator.entry(edge.validator).or_default().push(edge.requester);
        }

        Self {
            validator_by_requester,
            requesters_by_validator,
            wildcards: config.wildcard_validators.into_iter().collect(),
        }
    }

    /// May `validator` sign off a request submitted by `requester`?
    pub fn can_validate(&self, validator: Role, requester: Role) -> bool {
        if self.wildcards.contains(&validator) {
            return true;
        }

        self.requesters_by_validator
            .get(&validator)
            .is_some_and(|requesters| requesters.contains(&requester))
    }

    /// The role notified when `requester` submits a new request. Roles with no
    /// explicit edge fall through to Admin.
    pub fn direct_approver(&self, requester: Role) -> Role {
        self.validator_by_requester.get(&requester).copied().unwrap_or(Role::Admin)
    }

    /// Computes a viewer's pending-request inbox. Chain validators see their
    /// direct subordinates' pending requests, fenced to their own school or
    /// district where the original system fenced them; AO roles see every
    /// request still awaiting validation; Admin sees the forwarded-for-review
    /// set; everyone else sees nothing.
    pub fn inbox(&self, viewer: &User) -> InboxScope {
        match viewer.role {
            Role::Principal => InboxScope::PendingFrom {
                requester_role: Role::Teacher,
                school_id: Some(viewer.school_id.clone()),
                district: None,
            },
            Role::Psds => InboxScope::PendingFrom {
                requester_role: Role::Principal,
                school_id: None,
                district: Some(viewer.district.clone()),
            },
            Role::Asds => InboxScope::PendingFrom {
                requester_role: Role::Psds,
                school_id: None,
                district: None,
            },
            Role::Sds => InboxScope::PendingFrom {
                requester_role: Role::Asds,
                school_id: None,
                district: None,
            },
            Role::AoAdmin | Role::AoAdminOfficer => {
                InboxScope::AllWithValidation(ValidationStatus::Pending)
            }
            Role::Admin => InboxScope::AllWithValidation(ValidationStatus::Validated),
            Role::Teacher => InboxScope::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::travel_request::ValidationStatus;
    use crate::domain::user::{Role, User, UserId};

    use super::{ApprovalHierarchy, HierarchyConfig, HierarchyEdge, InboxScope};

    fn viewer(role: Role) -> User {
        User {
            id: UserId(format!("u-{}", role.as_str().to_ascii_lowercase())),
            username: "viewer".to_string(),
            first_name: "Vera".to_string(),
            last_name: "Cruz".to_string(),
            email: "vera@district.example".to_string(),
            school_id: "SCH-07".to_string(),
            school_name: "Mabini High School".to_string(),
            district: "District II".to_string(),
            position: role.as_str().to_string(),
            original_position: None,
            contact_no: "09170000002".to_string(),
            employee_number: "EMP-0002".to_string(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn canonical_chain_edges_validate_exactly_one_step_down() {
        let hierarchy = ApprovalHierarchy::default();

        assert!(hierarchy.can_validate(Role::Principal, Role::Teacher));
        assert!(hierarchy.can_validate(Role::Psds, Role::Principal));
        assert!(hierarchy.can_validate(Role::Asds, Role::Psds));
        assert!(hierarchy.can_validate(Role::Sds, Role::Asds));

        assert!(!hierarchy.can_validate(Role::Principal, Role::Principal));
        assert!(!hierarchy.can_validate(Role::Teacher, Role::Teacher));
        assert!(!hierarchy.can_validate(Role::Asds, Role::Teacher));
        assert!(!hierarchy.can_validate(Role::Sds, Role::Teacher));
    }

    #[test]
    fn administrative_office_roles_validate_anyone() {
        let hierarchy = ApprovalHierarchy::default();

        for validator in [Role::Admin, Role::AoAdmin, Role::AoAdminOfficer] {
            for requester in [Role::Teacher, Role::Principal, Role::Psds, Role::Asds, Role::Sds] {
                assert!(
                    hierarchy.can_validate(validator, requester),
                    "{validator} should validate {requester}"
                );
            }
        }
    }

    #[test]
    fn direct_approver_follows_the_chain_and_defaults_to_admin() {
        let hierarchy = ApprovalHierarchy::default();

        assert_eq!(hierarchy.direct_approver(Role::Teacher), Role::Principal);
        assert_eq!(hierarchy.direct_approver(Role::Principal), Role::Psds);
        assert_eq!(hierarchy.direct_approver(Role::Asds), Role::Sds);
        // SDS has no explicit edge upward.
        assert_eq!(hierarchy.direct_approver(Role::Sds), Role::Admin);
        assert_eq!(hierarchy.direct_approver(Role::AoAdmin), Role::Admin);
    }

    #[test]
    fn principal_inbox_is_fenced_to_own_school() {
        let hierarchy = ApprovalHierarchy::default();

        let scope = hierarchy.inbox(&viewer(Role::Principal));

        assert_eq!(
            scope,
            InboxScope::PendingFrom {
                requester_role: Role::Teacher,
                school_id: Some("SCH-07".to_string()),
                district: None,
            }
        );
    }

    #[test]
    fn psds_inbox_is_fenced_to_own_district() {
        let hierarchy = ApprovalHierarchy::default();

        let scope = hierarchy.inbox(&viewer(Role::Psds));

        assert_eq!(
            scope,
            InboxScope::PendingFrom {
                requester_role: Role::Principal,
                school_id: None,
                district: Some("District II".to_string()),
            }
        );
    }

    #[test]
    fn division_roles_see_their_subordinates_division_wide() {
        let hierarchy = ApprovalHierarchy::default();

        for (role, expected_requester) in [(Role::Asds, Role::Psds), (Role::Sds, Role::Asds)] {
            let scope = hierarchy.inbox(&viewer(role));
            assert_eq!(
                scope,
                InboxScope::PendingFrom {
                    requester_role: expected_requester,
                    school_id: None,
                    district: None,
                }
            );
        }
    }

    #[test]
    fn ao_roles_see_all_pending_and_admin_sees_forwarded() {
        let hierarchy = ApprovalHierarchy::default();

        assert_eq!(
            hierarchy.inbox(&viewer(Role::AoAdmin)),
            InboxScope::AllWithValidation(ValidationStatus::Pending)
        );
        assert_eq!(
            hierarchy.inbox(&viewer(Role::AoAdminOfficer)),
            InboxScope::AllWithValidation(ValidationStatus::Pending)
        );
        assert_eq!(
            hierarchy.inbox(&viewer(Role::Admin)),
            InboxScope::AllWithValidation(ValidationStatus::Validated)
        );
    }

    #[test]
    fn teacher_inbox_is_empty() {
        let hierarchy = ApprovalHierarchy::default();

        assert_eq!(hierarchy.inbox(&viewer(Role::Teacher)), InboxScope::Empty);
    }

    #[test]
    fn injected_variant_hierarchy_overrides_the_default_chain() {
        // Shortcut variant seen in earlier revisions: ASDS validates Principal.
        let hierarchy = ApprovalHierarchy::new(HierarchyConfig {
            edges: vec![
                HierarchyEdge { validator: Role::Principal, requester: Role::Teacher },
                HierarchyEdge { validator: Role::Asds, requester: Role::Principal },
            ],
            wildcard_validators: vec![Role::Admin],
        });

        assert!(hierarchy.can_validate(Role::Asds, Role::Principal));
        assert!(!hierarchy.can_validate(Role::Psds, Role::Principal));
        assert!(!hierarchy.can_validate(Role::AoAdmin, Role::Teacher));
        assert_eq!(hierarchy.direct_approver(Role::Principal), Role::Asds);
    }
}
