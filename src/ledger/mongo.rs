use async_trait::async_trait;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    Client, Collection, Database,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{from_bson, is_duplicate_key, to_bson, REFRESH_TOKENS},
    errors::AppError,
    ledger::RefreshTokenLedger,
    models::refresh_token::RefreshTokenRecord,
};

const MAX_TXN_ATTEMPTS: usize = 3;
const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenDoc {
    #[serde(rename = "_id")]
    pub id: String,

    pub user_id: String,
    pub family_id: String,
    pub token_hash: String,

    pub issued_at: BsonDateTime,
    pub expires_at: BsonDateTime,
    pub family_created_at: BsonDateTime,

    pub revoked_at: Option<BsonDateTime>,
    pub replaced_by: Option<String>,
}

impl From<&RefreshTokenRecord> for RefreshTokenDoc {
    fn from(r: &RefreshTokenRecord) -> Self {
        Self {
            id: r.id.to_string(),
            user_id: r.user_id.to_string(),
            family_id: r.family_id.to_string(),
            token_hash: r.token_hash.clone(),
            issued_at: to_bson(r.issued_at),
            expires_at: to_bson(r.expires_at),
            family_created_at: to_bson(r.family_created_at),
            revoked_at: r.revoked_at.map(to_bson),
            replaced_by: r.replaced_by.map(|id| id.to_string()),
        }
    }
}

impl TryFrom<RefreshTokenDoc> for RefreshTokenRecord {
    type Error = AppError;

    fn try_from(d: RefreshTokenDoc) -> Result<Self, Self::Error> {
        let parse = |s: &str| {
            Uuid::parse_str(s).map_err(|_| AppError::Db(format!("bad uuid in refresh_tokens: {s}")))
        };
        Ok(Self {
            id: parse(&d.id)?,
            user_id: parse(&d.user_id)?,
            family_id: parse(&d.family_id)?,
            token_hash: d.token_hash,
            issued_at: from_bson(d.issued_at),
            expires_at: from_bson(d.expires_at),
            family_created_at: from_bson(d.family_created_at),
            revoked_at: d.revoked_at.map(from_bson),
            replaced_by: d.replaced_by.as_deref().map(parse).transpose()?,
        })
    }
}

/// Ledger backed by a MongoDB replica set. `claim_and_replace` runs as a
/// multi-document transaction.
#[derive(Clone)]
pub struct MongoLedger {
    client: Client,
    records: Collection<RefreshTokenDoc>,
}

impl MongoLedger {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            records: db.collection(REFRESH_TOKENS),
        }
    }

    async fn find_one(&self, filter: Document) -> Result<Option<RefreshTokenRecord>, AppError> {
        self.records
            .find_one(filter)
            .await?
            .map(RefreshTokenRecord::try_from)
            .transpose()
    }

    async fn revoke_many(&self, filter: Document) -> Result<u64, AppError> {
        let res = self
            .records
            .update_many(filter, doc! { "$set": { "revoked_at": BsonDateTime::now() } })
            .await?;
        Ok(res.modified_count)
    }

    async fn try_claim(
        &self,
        old_id: &str,
        successor: &RefreshTokenDoc,
    ) -> mongodb::error::Result<bool> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let res = self
            .records
            .update_one(
                doc! { "_id": old_id, "revoked_at": Bson::Null },
                doc! { "$set": {
                    "revoked_at": BsonDateTime::now(),
                    "replaced_by": successor.id.clone(),
                } },
            )
            .session(&mut session)
            .await?;

        if res.matched_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }

        self.records
            .insert_one(successor)
            .session(&mut session)
            .await?;

        let mut attempt = 1;
        loop {
            match session.commit_transaction().await {
                Ok(()) => return Ok(true),
                Err(e)
                    if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    attempt += 1;
                    tracing::debug!(attempt, "retrying refresh token commit");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl RefreshTokenLedger for MongoLedger {
    async fn create(&self, record: RefreshTokenRecord) -> Result<RefreshTokenRecord, AppError> {
        self.records
            .insert_one(RefreshTokenDoc::from(&record))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::Db("duplicate refresh token record".into())
                } else {
                    e.into()
                }
            })?;
        Ok(record)
    }

    async fn find_active_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        self.find_one(doc! {
            "token_hash": token_hash,
            "revoked_at": Bson::Null,
            "expires_at": { "$gt": BsonDateTime::now() },
        })
        .await
    }

    async fn find_any_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        self.find_one(doc! { "token_hash": token_hash }).await
    }

    async fn claim_and_replace(
        &self,
        old_id: Uuid,
        successor: RefreshTokenRecord,
    ) -> Result<bool, AppError> {
        let old_id = old_id.to_string();
        let successor = RefreshTokenDoc::from(&successor);

        // A write conflict with a concurrent rotation of the same record aborts
        // one side as transient; re-running it re-evaluates the filter.
        let mut attempt = 1;
        loop {
            match self.try_claim(&old_id, &successor).await {
                Ok(claimed) => return Ok(claimed),
                Err(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR) && attempt < MAX_TXN_ATTEMPTS => {
                    attempt += 1;
                    tracing::debug!(attempt, "retrying refresh token claim");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        let res = self
            .records
            .update_one(
                doc! { "_id": id.to_string(), "revoked_at": Bson::Null },
                doc! { "$set": { "revoked_at": BsonDateTime::now() } },
            )
            .await?;
        Ok(res.modified_count == 1)
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, AppError> {
        self.revoke_many(doc! { "family_id": family_id.to_string(), "revoked_at": Bson::Null })
            .await
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        self.revoke_many(doc! { "user_id": user_id.to_string(), "revoked_at": Bson::Null })
            .await
    }

    async fn list_family(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let mut cursor = self
            .records
            .find(doc! { "family_id": family_id.to_string() })
            .sort(doc! { "issued_at": 1 })
            .await?;

        let mut out = Vec::new();
        while cursor.advance().await? {
            out.push(RefreshTokenRecord::try_from(cursor.deserialize_current()?)?);
        }
        Ok(out)
    }
}
