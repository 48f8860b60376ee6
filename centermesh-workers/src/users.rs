use std::sync::Arc;
use tracing::info;

use centermesh::{DomainError, PatternRegistry, Result};

use crate::models::{CreateUser, UpdateRequest, User, UserChanges};
use crate::method;
use crate::store::{MemoryStore, StoreError, StoreResult};

pub const SERVICE: &str = "user_service";

centermesh::define_patterns! {
    pub enum UserPattern {
        Create => "user.create",
        GetAll => "user.getAll",
        Get => "user.get",
        Update => "user.update",
        Delete => "user.delete",
    }
}

#[derive(Debug)]
pub struct UserService {
    users: MemoryStore<User>,
}

impl Default for UserService {
    fn default() -> Self {
        Self {
            users: MemoryStore::new("User"),
        }
    }
}

fn positive_id(id: i64) -> std::result::Result<u64, DomainError> {
    u64::try_from(id)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| DomainError::invalid("Invalid user ID"))
}

fn email_taken(email: &str) -> StoreError {
    StoreError::Conflict(format!("Email {} already exists", email))
}

impl UserService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails are unique across users
    pub fn create(&self, request: CreateUser) -> std::result::Result<User, DomainError> {
        if request.email.trim().is_empty() {
            return Err(DomainError::invalid("Email is required"));
        }

        let user = self.users.transaction(|rows, next_id| -> StoreResult<User> {
            if rows.values().any(|u| u.email == request.email) {
                return Err(email_taken(&request.email));
            }
            let user = User::new(next_id(), request);
            rows.insert(user.id, user.clone());
            Ok(user)
        })?;

        info!("Created user {} ({})", user.id, user.email);
        Ok(user)
    }

    pub fn get_all(&self, _: ()) -> std::result::Result<Vec<User>, DomainError> {
        Ok(self.users.all()?)
    }

    pub fn get(&self, id: i64) -> std::result::Result<User, DomainError> {
        Ok(self.users.get(positive_id(id)?)?)
    }

    pub fn update(&self, request: UpdateRequest<UserChanges>) -> std::result::Result<User, DomainError> {
        let UpdateRequest { id, data: changes } = request;
        if id == 0 {
            return Err(DomainError::invalid("Invalid user ID"));
        }

        let user = self.users.transaction(|rows, _| -> StoreResult<User> {
            if let Some(email) = changes.email.as_deref().filter(|e| !e.trim().is_empty()) {
                if rows.values().any(|u| u.id != id && u.email == email) {
                    return Err(email_taken(email));
                }
            }
            let user = rows.get_mut(&id).ok_or(StoreError::NotFound { entity: "User", id })?;
            user.apply(changes);
            Ok(user.clone())
        })?;

        info!("Updated user {}", user.id);
        Ok(user)
    }

    pub fn delete(&self, id: i64) -> std::result::Result<bool, DomainError> {
        self.users.remove(positive_id(id)?)?;
        info!("Deleted user {}", id);
        Ok(true)
    }
}

pub fn registry(service: Arc<UserService>) -> Result<PatternRegistry> {
    PatternRegistry::builder::<UserPattern>()
        .json(UserPattern::Create, method(&service, UserService::create))
        .json(UserPattern::GetAll, method(&service, UserService::get_all))
        .json(UserPattern::Get, method(&service, UserService::get))
        .json(UserPattern::Update, method(&service, UserService::update))
        .json(UserPattern::Delete, method(&service, UserService::delete))
        .build()
}
