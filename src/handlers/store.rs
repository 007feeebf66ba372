//! In-memory salon data backing the sample handlers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserRole;

pub const DEMO_TENANT: &str = "salon-1";
pub const AUDIT_LOG_CAPACITY: usize = 500;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
}

fn not_found(kind: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub active: bool,
    pub tenant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub loyalty_points: u32,
    pub tenant: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub customer: String,
    pub barber: String,
    pub service: String,
    /// RFC 3339, UTC.
    pub starts_at: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub tenant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price_cents: u32,
    pub duration_minutes: u32,
    pub active: bool,
    pub tenant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub published: bool,
    pub tenant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published_at: String,
    pub tenant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub appointment: String,
    pub amount_cents: u32,
    pub method: String,
    pub processed_at: String,
    pub processed_by: Option<String>,
    pub tenant: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor: Option<String>,
    pub action: String,
    pub target: String,
    pub timestamp: String,
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub customer_id: String,
    pub barber_id: String,
    pub service_id: String,
    pub starts_at: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdate {
    pub starts_at: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub name: String,
    pub category: String,
    pub price_cents: u32,
    pub duration_minutes: u32,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub price_cents: Option<u32>,
    pub duration_minutes: Option<u32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub slug: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub published: bool,
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct SalonData {
    users: BTreeMap<String, User>,
    customers: BTreeMap<String, Customer>,
    appointments: BTreeMap<String, Appointment>,
    services: BTreeMap<String, Service>,
    pages: BTreeMap<String, Page>,
    blog_posts: Vec<BlogPost>,
    payments: Vec<Payment>,
    next_id: u64,
}

impl SalonData {
    /// Next sequential id for `prefix` not already held in its collection.
    /// Seeded records use the same scheme, so taken ids are skipped.
    fn next_id(&mut self, prefix: &str, taken: fn(&SalonData, &str) -> bool) -> String {
        loop {
            self.next_id += 1;
            let id = format!("{}-{}", prefix, self.next_id);
            if !taken(self, &id) {
                return id;
            }
        }
    }
}

#[derive(Default)]
pub struct SalonStore {
    data: Mutex<SalonData>,
    audit: Mutex<VecDeque<AuditEntry>>,
}

pub fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("invalid timestamp {}: {}", value, e)))
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now() -> String {
    format_timestamp(Utc::now())
}

impl SalonStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small salon: one tenant, staff of each role, two customers with one
    /// appointment each and a short service menu.
    pub fn with_demo_data() -> Self {
        let store = Self::new();
        {
            let mut data = store.data.lock().unwrap();
            let tenant = DEMO_TENANT.to_string();

            for (id, name, role) in [
                ("admin-1", "Ada Admin", UserRole::Admin),
                ("manager-1", "Mia Manager", UserRole::Manager),
                ("barber-1", "Bruno Barber", UserRole::Barber),
                ("barber-2", "Bea Barber", UserRole::Barber),
                ("customer-1", "Carl Customer", UserRole::Customer),
                ("customer-2", "Cleo Customer", UserRole::Customer),
            ] {
                data.users.insert(
                    id.to_string(),
                    User {
                        id: id.to_string(),
                        email: format!("{}@salon.test", id),
                        name: name.to_string(),
                        role,
                        active: true,
                        tenant: tenant.clone(),
                    },
                );
            }

            for (id, name) in [("customer-1", "Carl Customer"), ("customer-2", "Cleo Customer")] {
                data.customers.insert(
                    id.to_string(),
                    Customer {
                        id: id.to_string(),
                        name: name.to_string(),
                        email: format!("{}@salon.test", id),
                        phone: None,
                        loyalty_points: 0,
                        tenant: tenant.clone(),
                    },
                );
            }

            for (id, name, category, price_cents, duration_minutes) in [
                ("svc-cut", "Haircut", "hair", 2500, 30),
                ("svc-beard", "Beard Trim", "beard", 1500, 15),
                ("svc-color", "Color", "hair", 6000, 90),
            ] {
                data.services.insert(
                    id.to_string(),
                    Service {
                        id: id.to_string(),
                        name: name.to_string(),
                        category: category.to_string(),
                        price_cents,
                        duration_minutes,
                        active: true,
                        tenant: tenant.clone(),
                    },
                );
            }

            let tomorrow = Utc::now() + Duration::days(1);
            for (id, customer, barber, service, offset_hours) in [
                ("apt-1", "customer-1", "barber-1", "svc-cut", 0),
                ("apt-2", "customer-2", "barber-2", "svc-beard", 2),
            ] {
                data.appointments.insert(
                    id.to_string(),
                    Appointment {
                        id: id.to_string(),
                        customer: customer.to_string(),
                        barber: barber.to_string(),
                        service: service.to_string(),
                        starts_at: format_timestamp(tomorrow + Duration::hours(offset_hours)),
                        status: AppointmentStatus::Booked,
                        notes: None,
                        cancel_reason: None,
                        tenant: tenant.clone(),
                    },
                );
            }

            data.pages.insert(
                "page-1".to_string(),
                Page {
                    id: "page-1".to_string(),
                    slug: "about".to_string(),
                    title: "About the salon".to_string(),
                    body: "Walk-ins welcome.".to_string(),
                    published: true,
                    tenant: tenant.clone(),
                },
            );
            data.blog_posts.push(BlogPost {
                id: "post-1".to_string(),
                title: "Summer styles".to_string(),
                summary: "Short cuts for hot days.".to_string(),
                published_at: now(),
                tenant,
            });
        }
        store
    }

    // Users

    pub fn list_users(&self) -> Vec<User> {
        self.data.lock().unwrap().users.values().cloned().collect()
    }

    pub fn get_user(&self, id: &str) -> Option<User> {
        self.data.lock().unwrap().users.get(id).cloned()
    }

    pub fn create_user(&self, new: NewUser, default_tenant: &str) -> StoreResult<User> {
        let mut data = self.data.lock().unwrap();
        if data
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Conflict(format!("email {} in use", new.email)));
        }
        let user = User {
            id: data.next_id("user", |d, id| d.users.contains_key(id)),
            email: new.email,
            name: new.name,
            role: new.role,
            active: true,
            tenant: new.tenant.unwrap_or_else(|| default_tenant.to_string()),
        };
        data.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    pub fn update_user(&self, id: &str, update: UserUpdate) -> StoreResult<User> {
        let mut data = self.data.lock().unwrap();
        let user = data.users.get_mut(id).ok_or_else(|| not_found("user", id))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(active) = update.active {
            user.active = active;
        }
        Ok(user.clone())
    }

    pub fn delete_user(&self, id: &str) -> StoreResult<User> {
        self.data
            .lock()
            .unwrap()
            .users
            .remove(id)
            .ok_or_else(|| not_found("user", id))
    }

    // Customers

    pub fn list_customers(&self) -> Vec<Customer> {
        self.data.lock().unwrap().customers.values().cloned().collect()
    }

    pub fn get_customer(&self, id: &str) -> Option<Customer> {
        self.data.lock().unwrap().customers.get(id).cloned()
    }

    pub fn create_customer(&self, new: NewCustomer, default_tenant: &str) -> StoreResult<Customer> {
        let mut data = self.data.lock().unwrap();
        let customer = Customer {
            id: data.next_id("customer", |d, id| d.customers.contains_key(id)),
            name: new.name,
            email: new.email,
            phone: new.phone,
            loyalty_points: 0,
            tenant: new.tenant.unwrap_or_else(|| default_tenant.to_string()),
        };
        data.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    pub fn update_customer(&self, id: &str, update: CustomerUpdate) -> StoreResult<Customer> {
        let mut data = self.data.lock().unwrap();
        let customer = data
            .customers
            .get_mut(id)
            .ok_or_else(|| not_found("customer", id))?;
        if let Some(name) = update.name {
            customer.name = name;
        }
        if let Some(email) = update.email {
            customer.email = email;
        }
        if update.phone.is_some() {
            customer.phone = update.phone;
        }
        Ok(customer.clone())
    }

    pub fn add_loyalty_points(&self, id: &str, points: u32) -> StoreResult<Customer> {
        let mut data = self.data.lock().unwrap();
        let customer = data
            .customers
            .get_mut(id)
            .ok_or_else(|| not_found("customer", id))?;
        customer.loyalty_points = customer.loyalty_points.saturating_add(points);
        Ok(customer.clone())
    }

    /// Barbers that have at least one appointment with the customer.
    pub fn barbers_for_customer(&self, customer_id: &str) -> Vec<String> {
        let data = self.data.lock().unwrap();
        let mut barbers: Vec<String> = data
            .appointments
            .values()
            .filter(|a| a.customer == customer_id)
            .map(|a| a.barber.clone())
            .collect();
        barbers.sort();
        barbers.dedup();
        barbers
    }

    // Appointments

    pub fn list_appointments(&self) -> Vec<Appointment> {
        self.data
            .lock()
            .unwrap()
            .appointments
            .values()
            .cloned()
            .collect()
    }

    pub fn get_appointment(&self, id: &str) -> Option<Appointment> {
        self.data.lock().unwrap().appointments.get(id).cloned()
    }

    /// Books a slot. The barber must not already have a live appointment
    /// overlapping the requested service duration.
    pub fn book_appointment(&self, new: NewAppointment) -> StoreResult<Appointment> {
        let starts_at = parse_timestamp(&new.starts_at)?;
        let mut data = self.data.lock().unwrap();

        let customer = data
            .customers
            .get(&new.customer_id)
            .ok_or_else(|| not_found("customer", &new.customer_id))?;
        let tenant = customer.tenant.clone();
        let service = data
            .services
            .get(&new.service_id)
            .filter(|s| s.active)
            .ok_or_else(|| not_found("service", &new.service_id))?;
        let duration = Duration::minutes(service.duration_minutes as i64);
        let barber_ok = data
            .users
            .get(&new.barber_id)
            .is_some_and(|u| u.role == UserRole::Barber && u.active);
        if !barber_ok {
            return Err(not_found("barber", &new.barber_id));
        }

        let ends_at = starts_at + duration;
        for existing in data.appointments.values() {
            if existing.barber != new.barber_id
                || matches!(
                    existing.status,
                    AppointmentStatus::Cancelled | AppointmentStatus::NoShow
                )
            {
                continue;
            }
            let existing_start = parse_timestamp(&existing.starts_at)?;
            let existing_end = existing_start
                + data
                    .services
                    .get(&existing.service)
                    .map_or(Duration::zero(), |s| {
                        Duration::minutes(s.duration_minutes as i64)
                    });
            if starts_at < existing_end && existing_start < ends_at {
                return Err(StoreError::Conflict("time slot is already booked".to_string()));
            }
        }

        let appointment = Appointment {
            id: data.next_id("apt", |d, id| d.appointments.contains_key(id)),
            customer: new.customer_id,
            barber: new.barber_id,
            service: new.service_id,
            starts_at: format_timestamp(starts_at),
            status: AppointmentStatus::Booked,
            notes: new.notes,
            cancel_reason: None,
            tenant,
        };
        data.appointments
            .insert(appointment.id.clone(), appointment.clone());
        Ok(appointment)
    }

    pub fn update_appointment(
        &self,
        id: &str,
        update: AppointmentUpdate,
    ) -> StoreResult<Appointment> {
        let starts_at = update
            .starts_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;
        let mut data = self.data.lock().unwrap();
        let appointment = data
            .appointments
            .get_mut(id)
            .ok_or_else(|| not_found("appointment", id))?;
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(StoreError::Conflict(format!("appointment {} is cancelled", id)));
        }
        if let Some(starts_at) = starts_at {
            appointment.starts_at = format_timestamp(starts_at);
        }
        if let Some(status) = update.status {
            appointment.status = status;
        }
        if update.notes.is_some() {
            appointment.notes = update.notes;
        }
        Ok(appointment.clone())
    }

    pub fn cancel_appointment(&self, id: &str, reason: Option<String>) -> StoreResult<Appointment> {
        let mut data = self.data.lock().unwrap();
        let appointment = data
            .appointments
            .get_mut(id)
            .ok_or_else(|| not_found("appointment", id))?;
        match appointment.status {
            AppointmentStatus::Cancelled => {
                return Err(StoreError::Conflict(format!("appointment {} already cancelled", id)))
            }
            AppointmentStatus::Completed => {
                return Err(StoreError::Conflict(format!("appointment {} already completed", id)))
            }
            _ => {}
        }
        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancel_reason = reason;
        Ok(appointment.clone())
    }

    // Services

    pub fn list_services(&self) -> Vec<Service> {
        self.data.lock().unwrap().services.values().cloned().collect()
    }

    pub fn get_service(&self, id: &str) -> Option<Service> {
        self.data.lock().unwrap().services.get(id).cloned()
    }

    pub fn create_service(&self, new: NewService, default_tenant: &str) -> StoreResult<Service> {
        if new.duration_minutes == 0 {
            return Err(StoreError::Invalid("duration must be positive".to_string()));
        }
        let mut data = self.data.lock().unwrap();
        let service = Service {
            id: data.next_id("svc", |d, id| d.services.contains_key(id)),
            name: new.name,
            category: new.category,
            price_cents: new.price_cents,
            duration_minutes: new.duration_minutes,
            active: true,
            tenant: new.tenant.unwrap_or_else(|| default_tenant.to_string()),
        };
        data.services.insert(service.id.clone(), service.clone());
        Ok(service)
    }

    pub fn update_service(&self, id: &str, update: ServiceUpdate) -> StoreResult<Service> {
        let mut data = self.data.lock().unwrap();
        let service = data
            .services
            .get_mut(id)
            .ok_or_else(|| not_found("service", id))?;
        if let Some(name) = update.name {
            service.name = name;
        }
        if let Some(price) = update.price_cents {
            service.price_cents = price;
        }
        if let Some(duration) = update.duration_minutes {
            if duration == 0 {
                return Err(StoreError::Invalid("duration must be positive".to_string()));
            }
            service.duration_minutes = duration;
        }
        if let Some(active) = update.active {
            service.active = active;
        }
        Ok(service.clone())
    }

    // Content

    pub fn list_pages(&self) -> Vec<Page> {
        self.data.lock().unwrap().pages.values().cloned().collect()
    }

    pub fn create_page(&self, new: NewPage, tenant: &str) -> StoreResult<Page> {
        let mut data = self.data.lock().unwrap();
        if data
            .pages
            .values()
            .any(|p| p.tenant == tenant && p.slug == new.slug)
        {
            return Err(StoreError::Conflict(format!("slug {} in use", new.slug)));
        }
        let page = Page {
            id: data.next_id("page", |d, id| d.pages.contains_key(id)),
            slug: new.slug,
            title: new.title,
            body: new.body,
            published: new.published,
            tenant: tenant.to_string(),
        };
        data.pages.insert(page.id.clone(), page.clone());
        Ok(page)
    }

    pub fn list_blog_posts(&self) -> Vec<BlogPost> {
        self.data.lock().unwrap().blog_posts.clone()
    }

    // Payments

    pub fn record_payment(
        &self,
        appointment_id: &str,
        amount_cents: u32,
        method: &str,
        processed_by: Option<String>,
    ) -> StoreResult<Payment> {
        if amount_cents == 0 {
            return Err(StoreError::Invalid("amount must be positive".to_string()));
        }
        let mut data = self.data.lock().unwrap();
        let tenant = data
            .appointments
            .get(appointment_id)
            .map(|a| a.tenant.clone())
            .ok_or_else(|| not_found("appointment", appointment_id))?;
        let payment = Payment {
            id: data.next_id("pay", |d, id| d.payments.iter().any(|p| p.id == id)),
            appointment: appointment_id.to_string(),
            amount_cents,
            method: method.to_string(),
            processed_at: now(),
            processed_by,
            tenant,
        };
        data.payments.push(payment.clone());
        Ok(payment)
    }

    pub fn payments_for(&self, appointment_id: &str) -> Vec<Payment> {
        self.data
            .lock()
            .unwrap()
            .payments
            .iter()
            .filter(|p| p.appointment == appointment_id)
            .cloned()
            .collect()
    }

    pub fn list_payments(&self) -> Vec<Payment> {
        self.data.lock().unwrap().payments.clone()
    }

    // Audit

    pub fn audit(&self, actor: Option<&str>, action: &str, target: &str) {
        let mut audit = self.audit.lock().unwrap();
        if audit.len() == AUDIT_LOG_CAPACITY {
            audit.pop_front();
        }
        audit.push_back(AuditEntry {
            actor: actor.map(str::to_string),
            action: action.to_string(),
            target: target.to_string(),
            timestamp: now(),
        });
    }

    /// Up to `limit` most recent audit entries, newest last.
    pub fn audit_entries(&self, limit: usize) -> Vec<AuditEntry> {
        let audit = self.audit.lock().unwrap();
        let skip = audit.len().saturating_sub(limit);
        audit.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(starts_at: &str) -> NewAppointment {
        NewAppointment {
            customer_id: "customer-1".to_string(),
            barber_id: "barber-1".to_string(),
            service_id: "svc-cut".to_string(),
            starts_at: starts_at.to_string(),
            notes: None,
        }
    }

    #[test]
    fn demo_data_is_seeded() {
        let store = SalonStore::with_demo_data();
        assert_eq!(store.list_users().len(), 6);
        assert_eq!(store.list_customers().len(), 2);
        assert_eq!(store.list_services().len(), 3);
        assert_eq!(store.get_appointment("apt-1").unwrap().barber, "barber-1");
        assert_eq!(store.barbers_for_customer("customer-2"), vec!["barber-2"]);
    }

    #[test]
    fn new_records_never_reuse_seeded_ids() {
        let store = SalonStore::with_demo_data();
        let booked = store
            .book_appointment(NewAppointment {
                customer_id: "customer-2".to_string(),
                barber_id: "barber-2".to_string(),
                service_id: "svc-cut".to_string(),
                starts_at: "2030-02-01T10:00:00Z".to_string(),
                notes: None,
            })
            .unwrap();
        assert_ne!(booked.id, "apt-1");
        assert_ne!(booked.id, "apt-2");

        let seeded = store.get_appointment("apt-1").unwrap();
        assert_eq!(seeded.customer, "customer-1");
        assert_eq!(store.list_appointments().len(), 3);

        let customer = store
            .create_customer(
                NewCustomer {
                    name: "Nia New".to_string(),
                    email: "nia@salon.test".to_string(),
                    phone: None,
                    tenant: None,
                },
                DEMO_TENANT,
            )
            .unwrap();
        assert!(customer.id != "customer-1" && customer.id != "customer-2");
        assert_eq!(store.get_customer("customer-1").unwrap().name, "Carl Customer");
        assert_eq!(store.list_customers().len(), 3);
    }

    #[test]
    fn booking_rejects_overlap_for_same_barber() {
        let store = SalonStore::with_demo_data();
        let first = store.book_appointment(booking("2030-01-01T10:00:00Z")).unwrap();
        assert_eq!(first.status, AppointmentStatus::Booked);
        assert_eq!(first.tenant, DEMO_TENANT);

        let err = store
            .book_appointment(booking("2030-01-01T10:15:00Z"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Back to back is fine
        store.book_appointment(booking("2030-01-01T10:30:00Z")).unwrap();
    }

    #[test]
    fn cancelled_slots_can_be_rebooked() {
        let store = SalonStore::with_demo_data();
        let first = store.book_appointment(booking("2030-01-01T10:00:00Z")).unwrap();
        store.cancel_appointment(&first.id, Some("sick".to_string())).unwrap();
        store.book_appointment(booking("2030-01-01T10:00:00Z")).unwrap();
    }

    #[test]
    fn booking_validates_references() {
        let store = SalonStore::with_demo_data();
        let mut bad = booking("2030-01-01T10:00:00Z");
        bad.barber_id = "customer-2".to_string();
        assert!(matches!(
            store.book_appointment(bad).unwrap_err(),
            StoreError::NotFound { kind: "barber", .. }
        ));
        assert!(matches!(
            store.book_appointment(booking("tomorrow")).unwrap_err(),
            StoreError::Invalid(_)
        ));
    }

    #[test]
    fn cancel_twice_conflicts() {
        let store = SalonStore::with_demo_data();
        store.cancel_appointment("apt-1", None).unwrap();
        assert!(matches!(
            store.cancel_appointment("apt-1", None).unwrap_err(),
            StoreError::Conflict(_)
        ));
    }

    #[test]
    fn loyalty_points_accumulate() {
        let store = SalonStore::with_demo_data();
        store.add_loyalty_points("customer-1", 10).unwrap();
        let customer = store.add_loyalty_points("customer-1", 5).unwrap();
        assert_eq!(customer.loyalty_points, 15);
    }

    #[test]
    fn payments_require_appointment_and_amount() {
        let store = SalonStore::with_demo_data();
        assert!(store.record_payment("apt-9", 100, "card", None).is_err());
        assert!(store.record_payment("apt-1", 0, "card", None).is_err());
        let payment = store.record_payment("apt-1", 2500, "card", None).unwrap();
        assert_eq!(store.payments_for("apt-1"), vec![payment]);
    }

    #[test]
    fn duplicate_email_conflicts() {
        let store = SalonStore::with_demo_data();
        let err = store
            .create_user(
                NewUser {
                    email: "BARBER-1@salon.test".to_string(),
                    name: "Dup".to_string(),
                    role: UserRole::Barber,
                    tenant: None,
                },
                DEMO_TENANT,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn audit_log_is_bounded() {
        let store = SalonStore::new();
        for i in 0..(AUDIT_LOG_CAPACITY + 5) {
            store.audit(Some("admin-1"), "update", &format!("t{}", i));
        }
        let entries = store.audit_entries(usize::MAX);
        assert_eq!(entries.len(), AUDIT_LOG_CAPACITY);
        assert_eq!(entries[0].target, "t5");
    }
}
