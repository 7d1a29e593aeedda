use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::error::AuthError;
use crate::users::repo::UserDirectory;
use crate::users::repo_types::{NewUser, ProfileChanges, User, UserId};

/// In-process directory used by `AppState::fake()` and the tests.
#[derive(Default)]
pub struct MemoryUserDirectory {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: UserId,
    users: BTreeMap<UserId, User>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully specified record, bypassing the signup rules.
    pub async fn insert(&self, mut user: User) -> User {
        let mut inner = self.inner.lock().await;
        inner.next_id = inner.next_id.max(user.id);
        if user.id == 0 {
            inner.next_id += 1;
            user.id = inner.next_id;
        }
        inner.users.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AuthError::DuplicateEmail);
        }
        inner.next_id += 1;
        let created = User {
            id: inner.next_id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            password_hash: user.password_hash,
            confirmed: false,
            admin: false,
            metadata: user.metadata.map(serde_json::Value::Object),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn confirm(
        &self,
        id: UserId,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let mut inner = self.inner.lock().await;
        let Some(user) = inner.users.get_mut(&id).filter(|u| !u.confirmed) else {
            return Ok(None);
        };
        user.confirmed = true;
        if let Some(hash) = password_hash {
            user.password_hash = Some(hash.to_string());
        }
        Ok(Some(user.clone()))
    }

    async fn set_password_hash(
        &self,
        id: UserId,
        new_hash: &str,
        expected: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let mut inner = self.inner.lock().await;
        let Some(user) = inner
            .users
            .get_mut(&id)
            .filter(|u| u.password_hash.as_deref() == expected)
        else {
            return Ok(None);
        };
        user.password_hash = Some(new_hash.to_string());
        Ok(Some(user.clone()))
    }

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        let mut inner = self.inner.lock().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(metadata) = changes.metadata {
            user.metadata = Some(serde_json::Value::Object(metadata));
        }
        Ok(Some(user.clone()))
    }

    async fn count(&self) -> anyhow::Result<i64> {
        Ok(self.inner.lock().await.users.len() as i64)
    }
}

/// Serves `find_by_id` from a fixed snapshot and everything else from the
/// wrapped directory, as a request that read just before another one wrote.
pub struct StaleReads {
    pub inner: Arc<MemoryUserDirectory>,
    pub snapshot: User,
}

#[async_trait]
impl UserDirectory for StaleReads {
    async fn find_by_id(&self, id: UserId) -> anyhow::Result<Option<User>> {
        Ok((id == self.snapshot.id).then(|| self.snapshot.clone()))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.inner.find_by_email(email).await
    }

    async fn create(&self, user: NewUser) -> Result<User, AuthError> {
        self.inner.create(user).await
    }

    async fn confirm(
        &self,
        id: UserId,
        password_hash: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        self.inner.confirm(id, password_hash).await
    }

    async fn set_password_hash(
        &self,
        id: UserId,
        new_hash: &str,
        expected: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        self.inner.set_password_hash(id, new_hash, expected).await
    }

    async fn update_profile(
        &self,
        id: UserId,
        changes: ProfileChanges,
    ) -> anyhow::Result<Option<User>> {
        self.inner.update_profile(id, changes).await
    }

    async fn count(&self) -> anyhow::Result<i64> {
        self.inner.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            first_name: "a".into(),
            last_name: None,
            password_hash: Some("h1".into()),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_rejects_duplicates_case_insensitively() {
        let dir = MemoryUserDirectory::new();
        let first = dir.create(new_user("a@a.com")).await.unwrap();
        let second = dir.create(new_user("b@a.com")).await.unwrap();
        assert_eq!(second.id, first.id + 1);
        assert!(!first.confirmed);

        let err = dir.create(new_user("A@A.COM")).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
        assert_eq!(dir.count().await.unwrap(), 2);
        assert!(dir.find_by_email("B@a.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn confirm_applies_once() {
        let dir = MemoryUserDirectory::new();
        let user = dir.create(new_user("a@a.com")).await.unwrap();
        let confirmed = dir.confirm(user.id, Some("h2")).await.unwrap().unwrap();
        assert!(confirmed.confirmed);
        assert_eq!(confirmed.password_hash.as_deref(), Some("h2"));
        assert!(dir.confirm(user.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_password_hash_compares_and_swaps() {
        let dir = MemoryUserDirectory::new();
        let user = dir.create(new_user("a@a.com")).await.unwrap();
        assert!(dir
            .set_password_hash(user.id, "h2", Some("stale"))
            .await
            .unwrap()
            .is_none());
        let updated = dir
            .set_password_hash(user.id, "h2", Some("h1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.password_hash.as_deref(), Some("h2"));
        assert!(dir
            .set_password_hash(user.id, "h3", Some("h1"))
            .await
            .unwrap()
            .is_none());
    }
}
