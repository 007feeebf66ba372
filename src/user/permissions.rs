use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Wildcard accepted both as a resource name and as an action.
pub const WILDCARD: &str = "*";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Guest,
    Customer,
    Barber,
    Manager,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::Guest,
        UserRole::Customer,
        UserRole::Barber,
        UserRole::Manager,
        UserRole::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Guest => "guest",
            UserRole::Customer => "customer",
            UserRole::Barber => "barber",
            UserRole::Manager => "manager",
            UserRole::Admin => "admin",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "guest" => Some(UserRole::Guest),
            "customer" => Some(UserRole::Customer),
            "barber" => Some(UserRole::Barber),
            "manager" => Some(UserRole::Manager),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    /// Position in the role hierarchy. Only used for coarse comparisons,
    /// never as a substitute for the permission table.
    pub fn level(self) -> u8 {
        match self {
            UserRole::Guest => 0,
            UserRole::Customer => 1,
            UserRole::Barber => 2,
            UserRole::Manager => 3,
            UserRole::Admin => 4,
        }
    }

    pub fn outranks(self, other: UserRole) -> bool {
        self.level() > other.level()
    }

    pub fn is_admin(self) -> bool {
        self == UserRole::Admin
    }

    pub fn is_manager(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Manager)
    }

    pub fn is_staff(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Manager | UserRole::Barber)
    }

    pub fn can_manage_users(self) -> bool {
        self.is_manager()
    }

    pub fn can_manage_appointments(self) -> bool {
        self.is_staff()
    }

    pub fn can_manage_content(self) -> bool {
        self.is_manager()
    }

    /// Roles allowed to discuss passwords, tokens and configuration without
    /// the sensitive-topic filter blocking them.
    pub fn is_authorized_for_sensitive_data(self) -> bool {
        self.is_manager()
    }

    pub fn permissions(self) -> &'static [Permission] {
        role_definition(self).permissions
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-level predicate attached to a permission entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The caller owns the resource.
    Owner,
    /// The caller's role is not the given one.
    RoleNot(UserRole),
    /// The resource (usually an appointment) is assigned to the caller.
    AssignedTo,
    /// The caller is one of the staff members with an appointment for the resource.
    HasAppointmentWith,
    /// The request does not ask for sensitive fields.
    ExcludeSensitive,
}

impl Condition {
    pub fn holds(&self, ctx: &EvaluationContext) -> bool {
        match self {
            Condition::Owner => matches_user(ctx, ctx.resource_owner_id.as_deref()),
            Condition::RoleNot(role) => ctx.user_role != *role,
            Condition::AssignedTo => matches_user(ctx, ctx.assigned_to.as_deref()),
            Condition::HasAppointmentWith => match ctx.user_id.as_deref() {
                Some(user_id) => ctx.appointment_staff_ids.iter().any(|id| id == user_id),
                None => false,
            },
            Condition::ExcludeSensitive => !ctx.includes_sensitive,
        }
    }
}

// Missing facts never satisfy an identity condition.
fn matches_user(ctx: &EvaluationContext, candidate: Option<&str>) -> bool {
    match (ctx.user_id.as_deref(), candidate) {
        (Some(user_id), Some(candidate)) => user_id == candidate,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub resource: &'static str,
    pub actions: &'static [&'static str],
    pub conditions: &'static [Condition],
}

impl Permission {
    pub fn covers_resource(&self, resource: &str) -> bool {
        self.resource == WILDCARD || self.resource == resource
    }

    pub fn allows_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| *a == WILDCARD || *a == action)
    }
}

#[derive(Debug)]
pub struct RoleDefinition {
    pub role: UserRole,
    pub permissions: &'static [Permission],
}

/// Request-scoped facts consulted by conditional permission entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub user_role: UserRole,
    pub tenant_id: Option<String>,
    pub resource_owner_id: Option<String>,
    pub resource_tenant_id: Option<String>,
    pub assigned_to: Option<String>,
    pub appointment_staff_ids: Vec<String>,
    pub includes_sensitive: bool,
}

const fn entry(
    resource: &'static str,
    actions: &'static [&'static str],
    conditions: &'static [Condition],
) -> Permission {
    Permission {
        resource,
        actions,
        conditions,
    }
}

const NONE: &[Condition] = &[];
const OWNER: &[Condition] = &[Condition::Owner];

const ADMIN_PERMISSIONS: &[Permission] = &[entry(WILDCARD, &[WILDCARD], NONE)];

const MANAGER_PERMISSIONS: &[Permission] = &[
    entry(
        "users",
        &["read", "create", "update"],
        &[Condition::RoleNot(UserRole::Admin)],
    ),
    entry("customers", &["read", "create", "update", "delete"], NONE),
    entry("appointments", &["read", "create", "update", "cancel"], NONE),
    entry("staff", &["read", "update"], &[Condition::ExcludeSensitive]),
    entry("services", &["read", "create", "update"], NONE),
    entry("products", &["read", "create", "update"], NONE),
    entry("payments", &["read", "process"], NONE),
    entry("financial", &["read"], NONE),
    entry("analytics", &["read"], NONE),
    entry("reports", &["read", "generate"], NONE),
    entry("content", &["read", "create", "update"], NONE),
    entry("settings", &["read", "update"], NONE),
];

const BARBER_PERMISSIONS: &[Permission] = &[
    entry(
        "appointments",
        &["read", "update", "complete"],
        &[Condition::AssignedTo],
    ),
    entry("customers", &["read"], &[Condition::HasAppointmentWith]),
    entry("services", &["read"], NONE),
    entry("schedule", &["read", "update"], OWNER),
    entry("profile", &["read", "update"], OWNER),
    entry("time_tracking", &["create", "update"], OWNER),
    entry("commissions", &["read"], OWNER),
];

const CUSTOMER_PERMISSIONS: &[Permission] = &[
    entry(
        "appointments",
        &["read", "create", "cancel", "reschedule"],
        OWNER,
    ),
    entry("profile", &["read", "update"], OWNER),
    entry("services", &["read"], NONE),
    entry("products", &["read"], NONE),
    entry("loyalty", &["read"], OWNER),
    entry("reviews", &["read", "create"], OWNER),
    entry("content", &["read"], NONE),
    entry("blog", &["read"], NONE),
];

const GUEST_PERMISSIONS: &[Permission] = &[
    entry("services", &["read"], NONE),
    entry("products", &["read"], NONE),
    entry("content", &["read"], NONE),
    entry("blog", &["read"], NONE),
];

static ROLE_DEFINITIONS: [RoleDefinition; 5] = [
    RoleDefinition {
        role: UserRole::Admin,
        permissions: ADMIN_PERMISSIONS,
    },
    RoleDefinition {
        role: UserRole::Manager,
        permissions: MANAGER_PERMISSIONS,
    },
    RoleDefinition {
        role: UserRole::Barber,
        permissions: BARBER_PERMISSIONS,
    },
    RoleDefinition {
        role: UserRole::Customer,
        permissions: CUSTOMER_PERMISSIONS,
    },
    RoleDefinition {
        role: UserRole::Guest,
        permissions: GUEST_PERMISSIONS,
    },
];

pub fn role_definitions() -> &'static [RoleDefinition] {
    &ROLE_DEFINITIONS
}

pub fn role_definition(role: UserRole) -> &'static RoleDefinition {
    match role {
        UserRole::Admin => &ROLE_DEFINITIONS[0],
        UserRole::Manager => &ROLE_DEFINITIONS[1],
        UserRole::Barber => &ROLE_DEFINITIONS[2],
        UserRole::Customer => &ROLE_DEFINITIONS[3],
        UserRole::Guest => &ROLE_DEFINITIONS[4],
    }
}

/// First entry of the role that covers `resource`. Later entries for the
/// same resource are never consulted.
pub fn find_permission(role: UserRole, resource: &str) -> Option<&'static Permission> {
    role.permissions()
        .iter()
        .find(|permission| permission.covers_resource(resource))
}

/// Whether `role` may perform `action` on `resource` given the facts in `ctx`.
pub fn has_permission(
    role: UserRole,
    action: &str,
    resource: &str,
    ctx: &EvaluationContext,
) -> bool {
    match find_permission(role, resource) {
        Some(permission) => {
            permission.allows_action(action) && check_conditions(permission.conditions, ctx)
        }
        None => false,
    }
}

/// Like [`has_permission`] but ignores row-level conditions. Used for
/// collection-scoped requests, where the handler narrows the result set.
pub fn grants_action(role: UserRole, action: &str, resource: &str) -> bool {
    find_permission(role, resource)
        .map(|permission| permission.allows_action(action))
        .unwrap_or(false)
}

pub fn check_conditions(conditions: &[Condition], ctx: &EvaluationContext) -> bool {
    conditions.iter().all(|condition| condition.holds(ctx))
}

pub fn allowed_actions(role: UserRole, resource: &str) -> BTreeSet<&'static str> {
    find_permission(role, resource)
        .map(|permission| permission.actions.iter().copied().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_for(role: UserRole, user_id: &str) -> EvaluationContext {
        EvaluationContext {
            user_id: Some(user_id.to_string()),
            user_role: role,
            tenant_id: Some("tenant-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn user_role_from_str_case_insensitive() {
        assert_eq!(UserRole::from_str("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::from_str("Manager"), Some(UserRole::Manager));
        assert_eq!(UserRole::from_str("BARBER"), Some(UserRole::Barber));
        assert_eq!(UserRole::from_str("customer"), Some(UserRole::Customer));
        assert_eq!(UserRole::from_str("Guest"), Some(UserRole::Guest));
    }

    #[test]
    fn user_role_from_str_invalid() {
        assert_eq!(UserRole::from_str(""), None);
        assert_eq!(UserRole::from_str("stylist"), None);
        assert_eq!(UserRole::from_str("superadmin"), None);
    }

    #[test]
    fn user_role_roundtrip() {
        for role in UserRole::ALL {
            assert_eq!(UserRole::from_str(role.as_str()), Some(role));
        }
    }

    #[test]
    fn role_hierarchy_is_totally_ordered() {
        assert!(UserRole::Admin.outranks(UserRole::Manager));
        assert!(UserRole::Manager.outranks(UserRole::Barber));
        assert!(UserRole::Barber.outranks(UserRole::Customer));
        assert!(UserRole::Customer.outranks(UserRole::Guest));
        assert!(!UserRole::Customer.outranks(UserRole::Customer));
        assert!(UserRole::Admin > UserRole::Guest);
    }

    #[test]
    fn role_helpers() {
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::Manager.is_admin());
        assert!(UserRole::Manager.is_manager());
        assert!(!UserRole::Barber.is_manager());
        assert!(UserRole::Barber.is_staff());
        assert!(!UserRole::Customer.is_staff());
        assert!(UserRole::Manager.can_manage_users());
        assert!(!UserRole::Barber.can_manage_users());
        assert!(UserRole::Barber.can_manage_appointments());
        assert!(!UserRole::Customer.can_manage_appointments());
        assert!(UserRole::Manager.can_manage_content());
        assert!(!UserRole::Barber.can_manage_content());
    }

    #[test]
    fn sensitive_data_authorization() {
        assert!(UserRole::Admin.is_authorized_for_sensitive_data());
        assert!(UserRole::Manager.is_authorized_for_sensitive_data());
        assert!(!UserRole::Barber.is_authorized_for_sensitive_data());
        assert!(!UserRole::Customer.is_authorized_for_sensitive_data());
        assert!(!UserRole::Guest.is_authorized_for_sensitive_data());
    }

    #[test]
    fn role_definitions_cover_every_role_once() {
        for role in UserRole::ALL {
            assert_eq!(role_definition(role).role, role);
        }
        assert_eq!(role_definitions().len(), UserRole::ALL.len());
    }

    #[test]
    fn role_definitions_have_no_duplicate_resources() {
        for definition in role_definitions() {
            let mut seen = BTreeSet::new();
            for permission in definition.permissions {
                assert!(
                    seen.insert(permission.resource),
                    "{} declares {} twice",
                    definition.role,
                    permission.resource
                );
            }
        }
    }

    #[test]
    fn unmatched_resources_are_denied() {
        let resources = [
            "users",
            "customers",
            "appointments",
            "staff",
            "services",
            "products",
            "payments",
            "financial",
            "analytics",
            "reports",
            "content",
            "settings",
            "schedule",
            "profile",
            "time_tracking",
            "commissions",
            "loyalty",
            "reviews",
            "blog",
            "system",
            "security",
            "nonexistent",
        ];
        for role in UserRole::ALL {
            for resource in resources {
                if find_permission(role, resource).is_none() {
                    let ctx = ctx_for(role, "u1");
                    for action in ["read", "create", "update", "delete", WILDCARD] {
                        assert!(
                            !has_permission(role, action, resource, &ctx),
                            "{role} unexpectedly allowed {action} on {resource}"
                        );
                    }
                    assert!(allowed_actions(role, resource).is_empty());
                }
            }
        }
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let ctx = ctx_for(UserRole::Admin, "admin-1");
        for resource in ["users", "system", "security", "anything"] {
            for action in ["read", "delete", "process", "backup"] {
                assert!(has_permission(UserRole::Admin, action, resource, &ctx));
            }
        }
        assert_eq!(
            allowed_actions(UserRole::Admin, "users"),
            BTreeSet::from([WILDCARD])
        );
    }

    #[test]
    fn action_must_be_listed() {
        let ctx = ctx_for(UserRole::Manager, "m1");
        assert!(has_permission(UserRole::Manager, "read", "users", &ctx));
        assert!(!has_permission(UserRole::Manager, "delete", "users", &ctx));
        assert!(has_permission(UserRole::Manager, "delete", "customers", &ctx));
    }

    #[test]
    fn owner_condition_requires_matching_owner() {
        for role in [UserRole::Customer, UserRole::Barber] {
            let mut ctx = ctx_for(role, "u1");
            ctx.resource_owner_id = Some("u1".to_string());
            assert!(has_permission(role, "read", "profile", &ctx));

            ctx.resource_owner_id = Some("u2".to_string());
            assert!(!has_permission(role, "read", "profile", &ctx));

            ctx.resource_owner_id = None;
            assert!(!has_permission(role, "read", "profile", &ctx));
        }
    }

    #[test]
    fn assigned_to_condition_for_barber_appointments() {
        let mut ctx = ctx_for(UserRole::Barber, "barber-1");
        ctx.assigned_to = Some("barber-1".to_string());
        assert!(has_permission(UserRole::Barber, "update", "appointments", &ctx));

        ctx.assigned_to = Some("barber-2".to_string());
        assert!(!has_permission(UserRole::Barber, "update", "appointments", &ctx));
    }

    #[test]
    fn has_appointment_with_condition() {
        let mut ctx = ctx_for(UserRole::Barber, "barber-1");
        ctx.appointment_staff_ids = vec!["barber-2".to_string(), "barber-1".to_string()];
        assert!(has_permission(UserRole::Barber, "read", "customers", &ctx));

        ctx.appointment_staff_ids = vec!["barber-2".to_string()];
        assert!(!has_permission(UserRole::Barber, "read", "customers", &ctx));
    }

    #[test]
    fn exclude_sensitive_condition() {
        let mut ctx = ctx_for(UserRole::Manager, "m1");
        assert!(has_permission(UserRole::Manager, "read", "staff", &ctx));
        ctx.includes_sensitive = true;
        assert!(!has_permission(UserRole::Manager, "read", "staff", &ctx));
    }

    #[test]
    fn role_not_condition() {
        let manager = Permission {
            resource: "users",
            actions: &["read"],
            conditions: &[Condition::RoleNot(UserRole::Admin)],
        };
        assert!(check_conditions(
            manager.conditions,
            &ctx_for(UserRole::Manager, "m1")
        ));
        assert!(!check_conditions(
            manager.conditions,
            &ctx_for(UserRole::Admin, "a1")
        ));
    }

    #[test]
    fn conditions_are_a_conjunction() {
        let conditions = [Condition::Owner, Condition::ExcludeSensitive];
        let mut ctx = ctx_for(UserRole::Customer, "u1");
        ctx.resource_owner_id = Some("u1".to_string());
        assert!(check_conditions(&conditions, &ctx));

        ctx.includes_sensitive = true;
        assert!(!check_conditions(&conditions, &ctx));
    }

    #[test]
    fn grants_action_ignores_conditions() {
        assert!(grants_action(UserRole::Barber, "read", "appointments"));
        assert!(!grants_action(UserRole::Barber, "delete", "appointments"));
        assert!(!grants_action(UserRole::Customer, "read", "users"));
    }

    #[test]
    fn allowed_actions_lists_entry_actions() {
        assert_eq!(
            allowed_actions(UserRole::Customer, "appointments"),
            BTreeSet::from(["read", "create", "cancel", "reschedule"])
        );
        assert_eq!(
            allowed_actions(UserRole::Guest, "services"),
            BTreeSet::from(["read"])
        );
    }

    #[test]
    fn first_match_wins() {
        static SHADOWED: [Permission; 2] = [
            entry("reports", &["read"], NONE),
            entry("reports", &["read", "generate"], NONE),
        ];
        let first = SHADOWED
            .iter()
            .find(|p| p.covers_resource("reports"))
            .unwrap();
        assert!(!first.allows_action("generate"));
    }
}
