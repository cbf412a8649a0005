//! Account persistence.
//!
//! The login flow only reads; registration inserts. Both go through the
//! [`CredentialStore`] trait so handlers can be exercised against an
//! in-memory store.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::{text_field, Database, DbError, Params, QueryOptions, Record};

/// Full account row, including the password hash. Never serialized.
#[derive(Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl UserRecord {
    #[must_use]
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Fields safe to return to clients.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(PublicUser),
    EmailTaken,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an account by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DbError>;

    /// Look up public fields by account id.
    async fn find_public_by_id(&self, id: &str) -> Result<Option<PublicUser>, DbError>;

    async fn create(&self, user: NewUser) -> Result<CreateOutcome, DbError>;
}

/// Postgres-backed store over the query layer.
#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    db: Database,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn public_from_record(record: &Record) -> Result<PublicUser, DbError> {
    Ok(PublicUser {
        id: text_field(record, "id")?,
        name: text_field(record, "name")?,
        email: text_field(record, "email")?,
    })
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DbError> {
        let query = r"
            SELECT id, email, name, password_hash
            FROM users
            WHERE email = :email
            LIMIT 1
        ";
        let outcome = self
            .db
            .query(query, Params::new().bind("email", email), QueryOptions::default())
            .await?;

        outcome
            .rows
            .first()
            .map(|record| {
                Ok(UserRecord {
                    id: text_field(record, "id")?,
                    email: text_field(record, "email")?,
                    name: text_field(record, "name")?,
                    password_hash: text_field(record, "password_hash")?,
                })
            })
            .transpose()
    }

    async fn find_public_by_id(&self, id: &str) -> Result<Option<PublicUser>, DbError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let query = "SELECT id, name, email FROM users WHERE id = :id LIMIT 1";
        let outcome = self
            .db
            .query(query, Params::new().bind("id", id), QueryOptions::cached())
            .await?;
        outcome.rows.first().map(public_from_record).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome, DbError> {
        let query = r"
            INSERT INTO users (email, name, password_hash)
            VALUES (:email, :name, :password_hash)
            RETURNING id, name, email
        ";
        let params = Params::new()
            .bind("email", user.email)
            .bind("name", user.name)
            .bind("password_hash", user.password_hash);

        match self.db.query(query, params, QueryOptions::default()).await {
            Ok(outcome) => {
                let record = outcome
                    .rows
                    .first()
                    .ok_or_else(|| DbError::Decode("id".to_string()))?;
                Ok(CreateOutcome::Created(public_from_record(record)?))
            }
            Err(DbError::UniqueViolation) => Ok(CreateOutcome::EmailTaken),
            Err(err) => Err(err),
        }
    }
}

/// Process-local store keyed by normalized email. Used for tests and local
/// runs without a database.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: DashMap<String, UserRecord>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(self.users.get(email).map(|entry| entry.clone()))
    }

    async fn find_public_by_id(&self, id: &str) -> Result<Option<PublicUser>, DbError> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.public()))
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome, DbError> {
        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => Ok(CreateOutcome::EmailTaken),
            Entry::Vacant(slot) => {
                let record = UserRecord {
                    id: Uuid::new_v4().to_string(),
                    email: user.email,
                    name: user.name,
                    password_hash: user.password_hash,
                };
                let public = record.public();
                slot.insert(record);
                Ok(CreateOutcome::Created(public))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            name: "User".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn memory_store_enforces_unique_email() -> anyhow::Result<()> {
        let store = MemoryCredentialStore::new();
        let CreateOutcome::Created(user) = store.create(new_user("a@example.com")).await? else {
            anyhow::bail!("first insert should succeed");
        };
        assert_eq!(
            store.create(new_user("a@example.com")).await?,
            CreateOutcome::EmailTaken
        );
        assert_eq!(store.find_public_by_id(&user.id).await?, Some(user));
        assert!(store.find_by_email("b@example.com").await?.is_none());
        Ok(())
    }

    #[test]
    fn public_view_drops_the_hash() -> anyhow::Result<()> {
        let record = UserRecord {
            id: "7".to_string(),
            email: "user@example.com".to_string(),
            name: "User".to_string(),
            password_hash: "$argon2id$secret".to_string(),
        };
        let value = serde_json::to_value(record.public())?;
        assert!(value.get("password_hash").is_none());
        assert!(!value.to_string().contains("argon2id"));
        assert!(!format!("{record:?}").contains("argon2id"));
        Ok(())
    }

    #[test]
    fn record_conversion_requires_all_columns() {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::from("7"));
        record.insert("name".to_string(), Value::from("User"));
        assert!(matches!(
            public_from_record(&record),
            Err(DbError::Decode(column)) if column == "email"
        ));
    }
}
