use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::user_models::{Credentials, UserContext, UserRecord};
use super::user_store::{AuthError, UserStore};

/// User store backed by a map, populated from the config file or tests.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new(records: impl IntoIterator<Item = UserRecord>) -> Self {
        let store = Self::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: UserRecord) {
        self.users
            .write()
            .unwrap()
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserContext, AuthError> {
        let users = self.users.read().unwrap();
        let found = match credentials {
            Credentials::Password { email, password } => users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email) && &u.password == password),
            Credentials::ApiToken { token } => users
                .values()
                .find(|u| u.api_token.as_deref() == Some(token.as_str())),
        };
        found
            .map(UserRecord::context)
            .ok_or(AuthError::InvalidCredentials)
    }

    async fn get_user(&self, user_id: &str) -> Option<UserContext> {
        self.users
            .read()
            .unwrap()
            .get(user_id)
            .map(UserRecord::context)
    }

    async fn user_count(&self) -> usize {
        self.users.read().unwrap().len()
    }
}
