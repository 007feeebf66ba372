//! Resource-level access policies.
//!
//! Complements the role table with facts about where a resource keeps its
//! owner and tenant, and which actions are public.

use super::permissions::{has_permission, EvaluationContext, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub resource: &'static str,
    pub owner_field: Option<&'static str>,
    pub tenant_field: Option<&'static str>,
    pub public_actions: &'static [&'static str],
}

impl ResourcePolicy {
    pub fn is_public(&self, action: &str) -> bool {
        self.public_actions.contains(&action)
    }
}

const fn policy(
    resource: &'static str,
    owner_field: Option<&'static str>,
    public_actions: &'static [&'static str],
) -> ResourcePolicy {
    ResourcePolicy {
        resource,
        owner_field,
        tenant_field: Some("tenant"),
        public_actions,
    }
}

const RESOURCE_POLICIES: &[ResourcePolicy] = &[
    policy("users", Some("id"), &[]),
    policy("customers", Some("id"), &[]),
    policy("staff", Some("id"), &[]),
    policy("appointments", Some("customer"), &[]),
    policy("payments", None, &[]),
    policy("services", None, &["read"]),
    policy("products", None, &["read"]),
    policy("content", None, &["read"]),
    policy("blog", None, &["read"]),
];

pub fn resource_policy(resource: &str) -> Option<&'static ResourcePolicy> {
    RESOURCE_POLICIES.iter().find(|p| p.resource == resource)
}

/// Tenant isolation: a resource living in another tenant is only reachable
/// by admins. Resources without a tenant field, or requests that carry no
/// tenant facts, are not restricted here.
pub fn tenant_allows(ctx: &EvaluationContext, resource: &str) -> bool {
    let Some(policy) = resource_policy(resource) else {
        return true;
    };
    if policy.tenant_field.is_none() || ctx.user_role == UserRole::Admin {
        return true;
    }
    match (&ctx.tenant_id, &ctx.resource_tenant_id) {
        (Some(tenant), Some(resource_tenant)) => tenant == resource_tenant,
        (None, Some(_)) => false,
        _ => true,
    }
}

/// Ownership: when a resource names its owner, only the owner and management
/// reach it. A barber also reaches records they are assigned to or have an
/// appointment with.
pub fn owner_allows(ctx: &EvaluationContext, resource: &str) -> bool {
    let owned = resource_policy(resource).is_some_and(|p| p.owner_field.is_some());
    let Some(owner) = ctx.resource_owner_id.as_deref().filter(|_| owned) else {
        return true;
    };
    let user_id = ctx.user_id.as_deref();
    match ctx.user_role {
        UserRole::Admin | UserRole::Manager => true,
        _ if user_id == Some(owner) => true,
        UserRole::Barber => user_id.is_some_and(|id| {
            ctx.assigned_to.as_deref() == Some(id)
                || ctx.appointment_staff_ids.iter().any(|staff| staff == id)
        }),
        _ => false,
    }
}

/// Full instance-level check: public actions pass, tenant isolation and
/// ownership apply, then the role table (including its row-level conditions)
/// decides.
pub fn can_access_resource(ctx: &EvaluationContext, action: &str, resource: &str) -> bool {
    if resource_policy(resource).is_some_and(|p| p.is_public(action)) {
        return true;
    }
    if !tenant_allows(ctx, resource) || !owner_allows(ctx, resource) {
        return false;
    }
    has_permission(ctx.user_role, action, resource, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(role: UserRole, user_id: &str, tenant: &str) -> EvaluationContext {
        EvaluationContext {
            user_id: Some(user_id.to_string()),
            user_role: role,
            tenant_id: Some(tenant.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn known_policies() {
        let appointments = resource_policy("appointments").unwrap();
        assert_eq!(appointments.owner_field, Some("customer"));
        assert_eq!(appointments.tenant_field, Some("tenant"));
        assert!(!appointments.is_public("read"));

        assert!(resource_policy("services").unwrap().is_public("read"));
        assert!(!resource_policy("services").unwrap().is_public("update"));
        assert!(resource_policy("system").is_none());
    }

    #[test]
    fn public_actions_bypass_role_table() {
        let guest = EvaluationContext::default();
        assert!(can_access_resource(&guest, "read", "blog"));
        assert!(!can_access_resource(&guest, "create", "blog"));
    }

    #[test]
    fn cross_tenant_access_denied_unless_admin() {
        let mut manager = ctx(UserRole::Manager, "m1", "tenant-a");
        manager.resource_tenant_id = Some("tenant-b".to_string());
        assert!(!tenant_allows(&manager, "customers"));
        assert!(!can_access_resource(&manager, "read", "customers"));

        manager.resource_tenant_id = Some("tenant-a".to_string());
        assert!(can_access_resource(&manager, "read", "customers"));

        let mut admin = ctx(UserRole::Admin, "a1", "tenant-a");
        admin.resource_tenant_id = Some("tenant-b".to_string());
        assert!(can_access_resource(&admin, "delete", "customers"));
    }

    #[test]
    fn missing_caller_tenant_is_denied_for_tenanted_resources() {
        let mut anonymous = EvaluationContext {
            user_role: UserRole::Manager,
            ..Default::default()
        };
        anonymous.resource_tenant_id = Some("tenant-a".to_string());
        assert!(!tenant_allows(&anonymous, "users"));
        assert!(tenant_allows(&anonymous, "system"));
    }

    #[test]
    fn ownership_flows_through_conditions() {
        let mut customer = ctx(UserRole::Customer, "c1", "tenant-a");
        customer.resource_owner_id = Some("c1".to_string());
        customer.resource_tenant_id = Some("tenant-a".to_string());
        assert!(can_access_resource(&customer, "cancel", "appointments"));

        customer.resource_owner_id = Some("c2".to_string());
        assert!(!can_access_resource(&customer, "cancel", "appointments"));
    }

    fn appointment(viewer: &mut EvaluationContext, customer: &str, barber: &str) {
        viewer.resource_owner_id = Some(customer.to_string());
        viewer.resource_tenant_id = Some("tenant-a".to_string());
        viewer.assigned_to = Some(barber.to_string());
    }

    #[test]
    fn owned_records_reach_owner_assigned_barber_and_management() {
        let mut stranger = ctx(UserRole::Customer, "c2", "tenant-a");
        appointment(&mut stranger, "c1", "b1");
        assert!(!owner_allows(&stranger, "appointments"));
        assert!(!can_access_resource(&stranger, "read", "appointments"));

        let mut owner = ctx(UserRole::Customer, "c1", "tenant-a");
        appointment(&mut owner, "c1", "b1");
        assert!(can_access_resource(&owner, "read", "appointments"));

        let mut assigned = ctx(UserRole::Barber, "b1", "tenant-a");
        appointment(&mut assigned, "c1", "b1");
        assert!(can_access_resource(&assigned, "read", "appointments"));

        let mut unassigned = ctx(UserRole::Barber, "b2", "tenant-a");
        appointment(&mut unassigned, "c1", "b1");
        assert!(!owner_allows(&unassigned, "appointments"));

        let mut manager = ctx(UserRole::Manager, "m1", "tenant-a");
        appointment(&mut manager, "c1", "b1");
        assert!(can_access_resource(&manager, "update", "appointments"));
    }

    #[test]
    fn barber_reaches_customers_they_have_served() {
        let mut barber = ctx(UserRole::Barber, "b1", "tenant-a");
        barber.resource_owner_id = Some("c1".to_string());
        assert!(!owner_allows(&barber, "customers"));

        barber.appointment_staff_ids = vec!["b1".to_string()];
        assert!(can_access_resource(&barber, "read", "customers"));
    }

    #[test]
    fn ownerless_resources_skip_the_owner_rule() {
        let mut customer = ctx(UserRole::Customer, "c2", "tenant-a");
        customer.resource_owner_id = Some("c1".to_string());
        assert!(owner_allows(&customer, "services"));
        assert!(owner_allows(&EvaluationContext::default(), "appointments"));
    }
}
