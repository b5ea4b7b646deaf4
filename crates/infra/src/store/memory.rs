use std::collections::HashMap;
use std::sync::RwLock;

use habbot_auth::User;
use habbot_core::{EmployeeId, Entity, Page, PageRequest, UserId};
use habbot_employees::{Employee, EmployeeFilter};

use super::{EmployeeStore, UserStore};
use crate::error::StoreError;

/// Documents keyed by entity id, with unique-email enforcement under the
/// write lock.
///
/// Intended for tests/dev.
#[derive(Debug)]
pub struct InMemoryDocuments<E: Entity> {
    docs: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> Default for InMemoryDocuments<E> {
    fn default() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::backend("lock poisoned")
}

impl<E: Entity + Clone> InMemoryDocuments<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn email_taken(docs: &HashMap<E::Id, E>, doc: &E) -> Option<String> {
        let email = doc.unique_email()?;
        docs.values()
            .filter(|other| other.id() != doc.id())
            .any(|other| other.unique_email() == Some(email))
            .then(|| email.to_string())
    }

    pub fn insert(&self, doc: E) -> Result<E, StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if docs.contains_key(doc.id()) {
            return Err(StoreError::Duplicate(doc.id().to_string()));
        }
        if let Some(email) = Self::email_taken(&docs, &doc) {
            return Err(StoreError::Duplicate(email));
        }
        docs.insert(*doc.id(), doc.clone());
        Ok(doc)
    }

    /// Replace an existing document, refreshing `updated_at`.
    pub fn replace(&self, doc: E) -> Result<E, StoreError> {
        self.replace_where(doc, |_| true)
    }

    /// Replace only while the stored version satisfies `current`; otherwise
    /// `NotFound`. Checked under the same write lock as the write.
    pub fn replace_where(&self, mut doc: E, current: impl Fn(&E) -> bool) -> Result<E, StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        if !docs.get(doc.id()).is_some_and(|stored| current(stored)) {
            return Err(StoreError::NotFound(doc.id().to_string()));
        }
        if let Some(email) = Self::email_taken(&docs, &doc) {
            return Err(StoreError::Duplicate(email));
        }
        doc.timestamps_mut().touch();
        docs.insert(*doc.id(), doc.clone());
        Ok(doc)
    }

    /// Apply `change` to the stored document in place. `Ok(false)` when the
    /// document is missing or `change` declines.
    pub fn modify(&self, id: &E::Id, change: impl FnOnce(&mut E) -> bool) -> Result<bool, StoreError> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        let Some(doc) = docs.get_mut(id) else {
            return Ok(false);
        };
        if !change(doc) {
            return Ok(false);
        }
        doc.timestamps_mut().touch();
        Ok(true)
    }

    pub fn get(&self, id: &E::Id) -> Result<Option<E>, StoreError> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.get(id).cloned())
    }

    pub fn find(&self, pred: impl Fn(&E) -> bool) -> Result<Option<E>, StoreError> {
        let docs = self.docs.read().map_err(poisoned)?;
        Ok(docs.values().find(|d| pred(d)).cloned())
    }

    /// Matching documents, oldest first (ties broken by id).
    pub fn filter(&self, pred: impl Fn(&E) -> bool) -> Result<Vec<E>, StoreError>
    where
        E::Id: Ord,
    {
        let docs = self.docs.read().map_err(poisoned)?;
        let mut out: Vec<E> = docs.values().filter(|d| pred(d)).cloned().collect();
        out.sort_by(|a, b| {
            a.timestamps()
                .created_at
                .cmp(&b.timestamps().created_at)
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    docs: InMemoryDocuments<User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: User) -> Result<User, StoreError> {
        self.docs.insert(user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.docs.get(&id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = email.trim().to_lowercase();
        self.docs.find(|u| u.email.as_str() == email)
    }

    async fn update(&self, user: User) -> Result<User, StoreError> {
        self.docs.replace(user)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEmployeeStore {
    docs: InMemoryDocuments<Employee>,
}

impl InMemoryEmployeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EmployeeStore for InMemoryEmployeeStore {
    async fn insert(&self, employee: Employee) -> Result<Employee, StoreError> {
        self.docs.insert(employee)
    }

    async fn get(&self, id: EmployeeId) -> Result<Option<Employee>, StoreError> {
        Ok(self.docs.get(&id)?.filter(|e| e.is_active))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Employee>, StoreError> {
        let email = email.trim().to_lowercase();
        self.docs.find(|e| e.is_active && e.email.as_str() == email)
    }

    async fn list(&self, filter: EmployeeFilter, page: PageRequest) -> Result<Page<Employee>, StoreError> {
        let matching = self.docs.filter(|e| filter.matches(e))?;
        Ok(Page::from_all(matching, page))
    }

    async fn update(&self, employee: Employee) -> Result<Employee, StoreError> {
        self.docs.replace_where(employee, |stored| stored.is_active)
    }

    async fn deactivate(&self, id: EmployeeId) -> Result<bool, StoreError> {
        self.docs.modify(&id, |employee| std::mem::replace(&mut employee.is_active, false))
    }
}
