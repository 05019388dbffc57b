use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{errors::AppError, ledger::RefreshTokenLedger, models::refresh_token::RefreshTokenRecord};

#[derive(Default)]
struct Table {
    records: HashMap<Uuid, RefreshTokenRecord>,
    by_hash: HashMap<String, Uuid>,
}

impl Table {
    fn by_hash(&self, token_hash: &str) -> Option<&RefreshTokenRecord> {
        self.by_hash
            .get(token_hash)
            .and_then(|id| self.records.get(id))
    }

    fn insert(&mut self, record: RefreshTokenRecord) -> Result<(), AppError> {
        if self.by_hash.contains_key(&record.token_hash) || self.records.contains_key(&record.id) {
            return Err(AppError::Db("duplicate refresh token record".into()));
        }
        self.by_hash.insert(record.token_hash.clone(), record.id);
        self.records.insert(record.id, record);
        Ok(())
    }

    fn revoke_where(&mut self, pred: impl Fn(&RefreshTokenRecord) -> bool) -> u64 {
        let now = Utc::now();
        let mut count = 0;
        for record in self.records.values_mut() {
            if record.revoked_at.is_none() && pred(record) {
                record.revoked_at = Some(now);
                count += 1;
            }
        }
        count
    }
}

/// Single-process ledger. One lock guards the whole table, so every
/// operation, `claim_and_replace` included, is atomic with respect to the
/// others. Suitable for tests and local development only.
#[derive(Default)]
pub struct MemoryLedger {
    table: Mutex<Table>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RefreshTokenLedger for MemoryLedger {
    async fn create(&self, record: RefreshTokenRecord) -> Result<RefreshTokenRecord, AppError> {
        self.table.lock().insert(record.clone())?;
        Ok(record)
    }

    async fn find_active_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let now = Utc::now();
        Ok(self
            .table
            .lock()
            .by_hash(token_hash)
            .filter(|r| r.is_active_at(now))
            .cloned())
    }

    async fn find_any_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.table.lock().by_hash(token_hash).cloned())
    }

    async fn claim_and_replace(
        &self,
        old_id: Uuid,
        successor: RefreshTokenRecord,
    ) -> Result<bool, AppError> {
        let mut table = self.table.lock();

        match table.records.get(&old_id) {
            Some(old) if old.revoked_at.is_none() => {}
            _ => return Ok(false),
        }

        let successor_id = successor.id;
        table.insert(successor)?;
        if let Some(old) = table.records.get_mut(&old_id) {
            old.revoked_at = Some(Utc::now());
            old.replaced_by = Some(successor_id);
        }
        Ok(true)
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        let mut table = self.table.lock();
        match table.records.get_mut(&id) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, AppError> {
        Ok(self.table.lock().revoke_where(|r| r.family_id == family_id))
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError> {
        Ok(self.table.lock().revoke_where(|r| r.user_id == user_id))
    }

    async fn list_family(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let mut records: Vec<_> = self
            .table
            .lock()
            .records
            .values()
            .filter(|r| r.family_id == family_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.issued_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(user: Uuid, family: Uuid, hash: &str) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord::first_in_family(user, family, hash.into(), now, now + Duration::days(1))
    }

    #[tokio::test]
    async fn active_lookup_skips_revoked_and_expired() {
        let ledger = MemoryLedger::new();
        let user = Uuid::new_v4();

        let live = ledger.create(record(user, Uuid::new_v4(), "live")).await.unwrap();
        let revoked = ledger.create(record(user, Uuid::new_v4(), "revoked")).await.unwrap();
        ledger.revoke(revoked.id).await.unwrap();

        let mut stale = record(user, Uuid::new_v4(), "stale");
        stale.expires_at = Utc::now() - Duration::seconds(1);
        ledger.create(stale).await.unwrap();

        assert_eq!(ledger.find_active_by_hash("live").await.unwrap(), Some(live));
        assert!(ledger.find_active_by_hash("revoked").await.unwrap().is_none());
        assert!(ledger.find_active_by_hash("stale").await.unwrap().is_none());

        assert!(ledger.find_any_by_hash("revoked").await.unwrap().is_some());
        assert!(ledger.find_any_by_hash("stale").await.unwrap().is_some());
        assert!(ledger.find_any_by_hash("never").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected() {
        let ledger = MemoryLedger::new();
        let user = Uuid::new_v4();
        ledger.create(record(user, Uuid::new_v4(), "same")).await.unwrap();
        assert!(ledger.create(record(user, Uuid::new_v4(), "same")).await.is_err());
    }

    #[tokio::test]
    async fn claim_succeeds_once() {
        let ledger = MemoryLedger::new();
        let first = ledger
            .create(record(Uuid::new_v4(), Uuid::new_v4(), "h0"))
            .await
            .unwrap();

        let now = Utc::now();
        let a = first.successor("h1".into(), now, now + Duration::days(1));
        let b = first.successor("h2".into(), now, now + Duration::days(1));

        assert!(ledger.claim_and_replace(first.id, a.clone()).await.unwrap());
        assert!(!ledger.claim_and_replace(first.id, b).await.unwrap());

        let old = ledger.find_any_by_hash("h0").await.unwrap().unwrap();
        assert!(old.is_revoked());
        assert_eq!(old.replaced_by, Some(a.id));
        assert!(ledger.find_any_by_hash("h2").await.unwrap().is_none());
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn revocation_scopes() {
        let ledger = MemoryLedger::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let fam = Uuid::new_v4();

        ledger.create(record(alice, fam, "a1")).await.unwrap();
        ledger.create(record(alice, Uuid::new_v4(), "a2")).await.unwrap();
        ledger.create(record(bob, Uuid::new_v4(), "b1")).await.unwrap();

        assert_eq!(ledger.revoke_family(fam).await.unwrap(), 1);
        assert_eq!(ledger.revoke_family(fam).await.unwrap(), 0);
        assert_eq!(ledger.revoke_all_for_user(alice).await.unwrap(), 1);
        assert!(ledger.find_active_by_hash("b1").await.unwrap().is_some());
    }
}
