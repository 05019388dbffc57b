use async_trait::async_trait;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::ReturnDocument,
    Collection, Database,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{from_bson, is_duplicate_key, to_bson, USERS},
    errors::AppError,
    models::user::UserRecord,
    principal::{new_user, username_taken, PrincipalStore},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,

    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: BsonDateTime,
}

fn default_active() -> bool {
    true
}

impl TryFrom<UserDoc> for UserRecord {
    type Error = AppError;

    fn try_from(u: UserDoc) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&u.id)
                .map_err(|_| AppError::Db(format!("bad uuid in users: {}", u.id)))?,
            username: u.username,
            password_hash: u.password_hash,
            is_admin: u.is_admin,
            is_active: u.is_active,
            created_at: from_bson(u.created_at),
        })
    }
}

impl From<&UserRecord> for UserDoc {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id.to_string(),
            username: u.username.clone(),
            password_hash: u.password_hash.clone(),
            is_admin: u.is_admin,
            is_active: u.is_active,
            created_at: to_bson(u.created_at),
        }
    }
}

#[derive(Clone)]
pub struct MongoPrincipalStore {
    users: Collection<UserDoc>,
}

impl MongoPrincipalStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection(USERS),
        }
    }
}

#[async_trait]
impl PrincipalStore for MongoPrincipalStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError> {
        self.users
            .find_one(doc! { "username": username })
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        self.users
            .find_one(doc! { "_id": id.to_string() })
            .await?
            .map(UserRecord::try_from)
            .transpose()
    }

    async fn create(&self, username: &str, password_hash: &str) -> Result<UserRecord, AppError> {
        let user = new_user(username, password_hash);
        self.users
            .insert_one(UserDoc::from(&user))
            .await
            .map_err(|e| if is_duplicate_key(&e) { username_taken() } else { e.into() })?;
        Ok(user)
    }

    async fn toggle_active(&self, id: Uuid) -> Result<Option<bool>, AppError> {
        // Flip in place with an update pipeline.
        let updated = self
            .users
            .find_one_and_update(
                doc! { "_id": id.to_string() },
                vec![doc! { "$set": { "is_active": { "$not": [{ "$ifNull": ["$is_active", true] }] } } }],
            )
            .return_document(ReturnDocument::After)
            .await?;
        Ok(updated.map(|u| u.is_active))
    }
}
