mod in_memory_user_store;
pub mod permissions;
pub mod policy;
pub mod user_models;
mod user_store;

pub use in_memory_user_store::InMemoryUserStore;
pub use permissions::{Condition, EvaluationContext, Permission, RoleDefinition, UserRole};
pub use policy::ResourcePolicy;
pub use user_models::{Credentials, UserContext, UserRecord};
pub use user_store::{AuthError, UserStore};
