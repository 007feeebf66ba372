//! Users, customers, appointments and services.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::store::{
    AppointmentStatus, AppointmentUpdate, CustomerUpdate, NewAppointment, NewCustomer, NewService,
    NewUser, SalonStore, ServiceUpdate, UserUpdate,
};
use super::{caller_tenant, id_param, notify, record_facts, IdParams, WithId};
use crate::mcp::registry::{
    parse_params, roles, to_result, CommandScope::*, CommandSpec, Handler, HandlerError,
    HandlerResult,
};
use crate::mcp::{CommandContext, ResourceFacts};
use crate::user::UserRole;

const APP_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(
        "users_list",
        "users",
        "read",
        roles::MANAGEMENT,
        Collection,
        "List staff and customer accounts",
    ),
    CommandSpec::new(
        "users_get",
        "users",
        "read",
        roles::MANAGEMENT,
        Instance,
        "Get one account",
    ),
    CommandSpec::new(
        "users_create",
        "users",
        "create",
        roles::MANAGEMENT,
        Collection,
        "Create an account",
    ),
    CommandSpec::new(
        "users_update",
        "users",
        "update",
        roles::MANAGEMENT,
        Instance,
        "Update an account",
    ),
    CommandSpec::new(
        "users_delete",
        "users",
        "delete",
        roles::ADMIN_ONLY,
        Instance,
        "Delete an account",
    ),
    CommandSpec::new(
        "customers_list",
        "customers",
        "read",
        roles::STAFF,
        Collection,
        "List customers",
    ),
    CommandSpec::new(
        "customers_get",
        "customers",
        "read",
        roles::STAFF,
        Instance,
        "Get one customer",
    ),
    CommandSpec::new(
        "customers_create",
        "customers",
        "create",
        roles::MANAGEMENT,
        Collection,
        "Create a customer",
    ),
    CommandSpec::new(
        "customers_update",
        "customers",
        "update",
        roles::MANAGEMENT,
        Instance,
        "Update a customer",
    ),
    CommandSpec::new(
        "appointments_list",
        "appointments",
        "read",
        roles::STAFF,
        Collection,
        "List appointments",
    ),
    CommandSpec::new(
        "appointments_get",
        "appointments",
        "read",
        roles::SIGNED_IN,
        Instance,
        "Get one appointment",
    ),
    CommandSpec::new(
        "appointments_book",
        "appointments",
        "create",
        roles::CUSTOMER_OR_MANAGEMENT,
        Instance,
        "Book an appointment",
    ),
    CommandSpec::new(
        "appointments_update",
        "appointments",
        "update",
        roles::STAFF,
        Instance,
        "Reschedule or change status",
    ),
    CommandSpec::new(
        "appointments_cancel",
        "appointments",
        "cancel",
        roles::CUSTOMER_OR_MANAGEMENT,
        Instance,
        "Cancel an appointment",
    ),
    CommandSpec::new(
        "services_list",
        "services",
        "read",
        roles::EVERYONE,
        Collection,
        "List the service menu",
    ),
    CommandSpec::new(
        "services_get",
        "services",
        "read",
        roles::EVERYONE,
        Instance,
        "Get one service",
    ),
    CommandSpec::new(
        "services_create",
        "services",
        "create",
        roles::MANAGEMENT,
        Collection,
        "Add a service",
    ),
    CommandSpec::new(
        "services_update",
        "services",
        "update",
        roles::MANAGEMENT,
        Instance,
        "Change a service",
    ),
];

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserFilter {
    role: Option<UserRole>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppointmentFilter {
    status: Option<AppointmentStatus>,
    barber_id: Option<String>,
    customer_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceFilter {
    category: Option<String>,
    #[serde(default)]
    include_inactive: bool,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    id: String,
    #[serde(default)]
    reason: Option<String>,
}

pub struct AppHandler {
    store: Arc<SalonStore>,
}

impl AppHandler {
    pub fn new(store: Arc<SalonStore>) -> Self {
        Self { store }
    }

    /// Facts of a looked-up record. A missing record yields no facts.
    fn facts_of<T: serde::Serialize>(&self, resource: &str, record: Option<T>) -> ResourceFacts {
        record
            .and_then(|r| serde_json::to_value(r).ok())
            .map(|value| record_facts(&self.store, resource, &value))
            .unwrap_or_default()
    }

    // Users

    fn users_list(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let filter: UserFilter = parse_params(params)?;
        let users: Vec<_> = self
            .store
            .list_users()
            .into_iter()
            .filter(|u| ctx.sees_tenant(&u.tenant))
            .filter(|u| filter.role.map_or(true, |role| u.role == role))
            .collect();
        to_result(&users)
    }

    fn users_get(&self, params: Value) -> HandlerResult {
        let IdParams { id } = parse_params(params)?;
        let user = self
            .store
            .get_user(&id)
            .ok_or_else(|| HandlerError::NotFound(format!("user {}", id)))?;
        to_result(&user)
    }

    async fn users_create(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let new: NewUser = parse_params(params)?;
        if new.role.outranks(ctx.role()) {
            return Err(HandlerError::Forbidden {
                reason: format!("cannot create a {} account", new.role),
                allowed_roles: vec![UserRole::Admin],
            });
        }
        let user = self.store.create_user(new, caller_tenant(ctx))?;
        self.store.audit(ctx.user_id(), "users_create", &user.id);
        notify(ctx, &self.store, "users", "created", &user).await;
        to_result(&user)
    }

    async fn users_update(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let WithId { id, fields } = parse_params::<WithId<UserUpdate>>(params)?;
        if fields.role.is_some_and(|role| role.outranks(ctx.role())) {
            return Err(HandlerError::Forbidden {
                reason: "cannot promote above own role".to_string(),
                allowed_roles: vec![UserRole::Admin],
            });
        }
        let user = self.store.update_user(&id, fields)?;
        self.store.audit(ctx.user_id(), "users_update", &id);
        notify(ctx, &self.store, "users", "updated", &user).await;
        to_result(&user)
    }

    async fn users_delete(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let IdParams { id } = parse_params(params)?;
        if ctx.user_id() == Some(id.as_str()) {
            return Err(HandlerError::Failed("cannot delete own account".to_string()));
        }
        let user = self.store.delete_user(&id)?;
        self.store.audit(ctx.user_id(), "users_delete", &id);
        notify(ctx, &self.store, "users", "deleted", &user).await;
        to_result(&user)
    }

    // Customers

    fn customers_list(&self, ctx: &CommandContext) -> HandlerResult {
        let barber = (ctx.role() == UserRole::Barber).then(|| ctx.user_id()).flatten();
        let customers: Vec<_> = self
            .store
            .list_customers()
            .into_iter()
            .filter(|c| ctx.sees_tenant(&c.tenant))
            .filter(|c| match barber {
                Some(barber) => self
                    .store
                    .barbers_for_customer(&c.id)
                    .iter()
                    .any(|b| b == barber),
                None => true,
            })
            .collect();
        to_result(&customers)
    }

    fn customers_get(&self, params: Value) -> HandlerResult {
        let IdParams { id } = parse_params(params)?;
        let customer = self
            .store
            .get_customer(&id)
            .ok_or_else(|| HandlerError::NotFound(format!("customer {}", id)))?;
        to_result(&customer)
    }

    async fn customers_create(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let new: NewCustomer = parse_params(params)?;
        let customer = self.store.create_customer(new, caller_tenant(ctx))?;
        self.store.audit(ctx.user_id(), "customers_create", &customer.id);
        notify(ctx, &self.store, "customers", "created", &customer).await;
        to_result(&customer)
    }

    async fn customers_update(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let WithId { id, fields } = parse_params::<WithId<CustomerUpdate>>(params)?;
        let customer = self.store.update_customer(&id, fields)?;
        self.store.audit(ctx.user_id(), "customers_update", &id);
        notify(ctx, &self.store, "customers", "updated", &customer).await;
        to_result(&customer)
    }

    // Appointments

    fn appointments_list(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let filter: AppointmentFilter = parse_params(params)?;
        let barber = (ctx.role() == UserRole::Barber).then(|| ctx.user_id()).flatten();
        let appointments: Vec<_> = self
            .store
            .list_appointments()
            .into_iter()
            .filter(|a| ctx.sees_tenant(&a.tenant))
            .filter(|a| barber.map_or(true, |barber| a.barber == barber))
            .filter(|a| filter.status.map_or(true, |status| a.status == status))
            .filter(|a| filter.barber_id.as_ref().map_or(true, |b| &a.barber == b))
            .filter(|a| filter.customer_id.as_ref().map_or(true, |c| &a.customer == c))
            .collect();
        to_result(&appointments)
    }

    fn appointments_get(&self, params: Value) -> HandlerResult {
        let IdParams { id } = parse_params(params)?;
        let appointment = self
            .store
            .get_appointment(&id)
            .ok_or_else(|| HandlerError::NotFound(format!("appointment {}", id)))?;
        to_result(&appointment)
    }

    async fn appointments_book(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let new: NewAppointment = parse_params(params)?;
        let appointment = self.store.book_appointment(new)?;
        self.store.audit(ctx.user_id(), "appointments_book", &appointment.id);
        notify(ctx, &self.store, "appointments", "booked", &appointment).await;
        to_result(&appointment)
    }

    async fn appointments_update(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let WithId { id, fields } = parse_params::<WithId<AppointmentUpdate>>(params)?;
        let appointment = self.store.update_appointment(&id, fields)?;
        self.store.audit(ctx.user_id(), "appointments_update", &id);
        notify(ctx, &self.store, "appointments", "updated", &appointment).await;
        to_result(&appointment)
    }

    async fn appointments_cancel(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let CancelParams { id, reason } = parse_params(params)?;
        let appointment = self.store.cancel_appointment(&id, reason)?;
        self.store.audit(ctx.user_id(), "appointments_cancel", &id);
        notify(ctx, &self.store, "appointments", "cancelled", &appointment).await;
        to_result(&appointment)
    }

    // Services

    fn services_list(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let filter: ServiceFilter = parse_params(params)?;
        let show_inactive = filter.include_inactive && ctx.role().is_manager();
        let services: Vec<_> = self
            .store
            .list_services()
            .into_iter()
            .filter(|s| ctx.sees_tenant(&s.tenant))
            .filter(|s| s.active || show_inactive)
            .filter(|s| filter.category.as_ref().map_or(true, |c| &s.category == c))
            .collect();
        to_result(&services)
    }

    fn services_get(&self, params: Value) -> HandlerResult {
        let IdParams { id } = parse_params(params)?;
        let service = self
            .store
            .get_service(&id)
            .ok_or_else(|| HandlerError::NotFound(format!("service {}", id)))?;
        to_result(&service)
    }

    async fn services_create(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let new: NewService = parse_params(params)?;
        let service = self.store.create_service(new, caller_tenant(ctx))?;
        self.store.audit(ctx.user_id(), "services_create", &service.id);
        notify(ctx, &self.store, "services", "created", &service).await;
        to_result(&service)
    }

    async fn services_update(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let WithId { id, fields } = parse_params::<WithId<ServiceUpdate>>(params)?;
        let service = self.store.update_service(&id, fields)?;
        self.store.audit(ctx.user_id(), "services_update", &id);
        notify(ctx, &self.store, "services", "updated", &service).await;
        to_result(&service)
    }
}

#[async_trait]
impl Handler for AppHandler {
    fn namespace(&self) -> &'static str {
        "app"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        APP_COMMANDS
    }

    async fn resource_facts(&self, method: &str, params: &Value) -> ResourceFacts {
        let id = id_param(params, "id");
        let id = id.as_deref();
        match method {
            "users_get" | "users_update" | "users_delete" => {
                self.facts_of("users", id.and_then(|id| self.store.get_user(id)))
            }
            "customers_get" | "customers_update" => {
                self.facts_of("customers", id.and_then(|id| self.store.get_customer(id)))
            }
            "appointments_get" | "appointments_update" | "appointments_cancel" => {
                self.facts_of("appointments", id.and_then(|id| self.store.get_appointment(id)))
            }
            "appointments_book" => {
                // The booking is owned by the customer it is made for.
                let customer = id_param(params, "customerId");
                let tenant = customer
                    .as_deref()
                    .and_then(|id| self.store.get_customer(id))
                    .map(|c| c.tenant);
                ResourceFacts {
                    owner_id: customer,
                    tenant_id: tenant,
                    ..Default::default()
                }
            }
            "services_get" | "services_update" => {
                self.facts_of("services", id.and_then(|id| self.store.get_service(id)))
            }
            _ => ResourceFacts::default(),
        }
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            "users_list" => self.users_list(params, ctx),
            "users_get" => self.users_get(params),
            "users_create" => self.users_create(params, ctx).await,
            "users_update" => self.users_update(params, ctx).await,
            "users_delete" => self.users_delete(params, ctx).await,
            "customers_list" => self.customers_list(ctx),
            "customers_get" => self.customers_get(params),
            "customers_create" => self.customers_create(params, ctx).await,
            "customers_update" => self.customers_update(params, ctx).await,
            "appointments_list" => self.appointments_list(params, ctx),
            "appointments_get" => self.appointments_get(params),
            "appointments_book" => self.appointments_book(params, ctx).await,
            "appointments_update" => self.appointments_update(params, ctx).await,
            "appointments_cancel" => self.appointments_cancel(params, ctx).await,
            "services_list" => self.services_list(params, ctx),
            "services_get" => self.services_get(params),
            "services_create" => self.services_create(params, ctx).await,
            "services_update" => self.services_update(params, ctx).await,
            other => Err(HandlerError::Failed(format!("app handler cannot execute {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{ctx, ctx_with_broker, store};
    use crate::mcp::protocol::OutgoingMessage;
    use crate::mcp::pubsub::TopicBroker;
    use serde_json::json;

    fn handler() -> AppHandler {
        AppHandler::new(store())
    }

    #[tokio::test]
    async fn barber_sees_only_assigned_appointments() {
        let handler = handler();
        let result = handler
            .execute("appointments_list", json!({}), &ctx(UserRole::Barber, "barber-1"))
            .await
            .unwrap();
        let ids: Vec<_> = result.as_array().unwrap().iter().map(|a| a["id"].clone()).collect();
        assert_eq!(ids, vec![json!("apt-1")]);

        let all = handler
            .execute("appointments_list", json!({}), &ctx(UserRole::Manager, "manager-1"))
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn barber_sees_only_own_customers() {
        let handler = handler();
        let result = handler
            .execute("customers_list", json!({}), &ctx(UserRole::Barber, "barber-2"))
            .await
            .unwrap();
        let ids: Vec<_> = result.as_array().unwrap().iter().map(|c| c["id"].clone()).collect();
        assert_eq!(ids, vec![json!("customer-2")]);
    }

    #[tokio::test]
    async fn appointment_facts_carry_owner_and_assignee() {
        let handler = handler();
        let facts = handler
            .resource_facts("appointments_update", &json!({"id": "apt-2"}))
            .await;
        assert_eq!(facts.owner_id.as_deref(), Some("customer-2"));
        assert_eq!(facts.assigned_to.as_deref(), Some("barber-2"));
        assert_eq!(facts.tenant_id.as_deref(), Some("salon-1"));

        let missing = handler
            .resource_facts("appointments_update", &json!({"id": "apt-404"}))
            .await;
        assert_eq!(missing, ResourceFacts::default());
    }

    #[tokio::test]
    async fn customer_facts_list_staff_with_appointments() {
        let handler = handler();
        let facts = handler
            .resource_facts("customers_get", &json!({"id": "customer-1"}))
            .await;
        assert_eq!(facts.owner_id.as_deref(), Some("customer-1"));
        assert_eq!(facts.appointment_staff_ids, vec!["barber-1"]);
    }

    #[tokio::test]
    async fn booking_publishes_event() {
        let broker = Arc::new(TopicBroker::new());
        let (_tx, mut rx) = broker.register("watcher").await;
        let (_other_tx, mut other_rx) = broker.register("other-customer").await;
        for (connection, user) in [("watcher", "customer-1"), ("other-customer", "customer-2")] {
            let viewer = ctx(UserRole::Customer, user).evaluation;
            broker.set_viewer(connection, viewer).await;
            broker.subscribe(connection, "appointments").await.unwrap();
        }

        let handler = handler();
        let ctx = ctx_with_broker(UserRole::Customer, "customer-1", broker);
        let booked = handler
            .execute(
                "appointments_book",
                json!({
                    "customerId": "customer-1",
                    "barberId": "barber-2",
                    "serviceId": "svc-beard",
                    "startsAt": "2031-05-01T09:00:00Z",
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(booked["status"], "booked");

        match rx.recv().await.unwrap() {
            OutgoingMessage::Event(event) => {
                assert_eq!(event.topic, "appointments");
                assert_eq!(event.payload["action"], "booked");
                assert_eq!(event.payload["record"]["id"], booked["id"]);
            }
            other => panic!("Expected event, got {:?}", other),
        }
        // Another customer's booking is not theirs to see
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn manager_cannot_create_admin() {
        let handler = handler();
        let err = handler
            .execute(
                "users_create",
                json!({"email": "new@salon.test", "name": "New", "role": "admin"}),
                &ctx(UserRole::Manager, "manager-1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn update_validates_params() {
        let handler = handler();
        let err = handler
            .execute(
                "services_update",
                json!({"id": "svc-cut", "priceCents": "free"}),
                &ctx(UserRole::Manager, "manager-1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidParams(_)));

        let updated = handler
            .execute(
                "services_update",
                json!({"id": "svc-cut", "priceCents": 3000}),
                &ctx(UserRole::Manager, "manager-1"),
            )
            .await
            .unwrap();
        assert_eq!(updated["priceCents"], 3000);
    }

    #[tokio::test]
    async fn guests_only_see_active_services() {
        let handler = handler();
        let manager = ctx(UserRole::Manager, "manager-1");
        handler
            .execute("services_update", json!({"id": "svc-color", "active": false}), &manager)
            .await
            .unwrap();

        let guest = ctx(UserRole::Guest, "guest");
        let listed = handler
            .execute("services_list", json!({"includeInactive": true}), &guest)
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 2);

        let listed = handler
            .execute("services_list", json!({"includeInactive": true}), &manager)
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let handler = handler();
        let err = handler
            .execute("customers_get", json!({"id": "customer-9"}), &ctx(UserRole::Admin, "admin-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NotFound(_)));
    }
}
