//! The view store: a document keyed by account id holding the projected
//! `funds` balance and the set of event timestamps already folded into
//! it — the durable record of "already applied" that makes re-delivery
//! idempotent.

use async_trait::async_trait;
use ledger_core::{AccountId, DomainError, DomainResult, StreamId};

/// Snapshot of a projected account, as read back from the view store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRecord {
    pub id: String,
    pub funds: i64,
    pub timestamps: Vec<String>,
}

#[async_trait]
pub trait ViewStore: Send + Sync {
    /// Conditionally apply `delta` to `id`'s `funds` and record
    /// `timestamp` as applied, unless `timestamp` is already present —
    /// in which case this is a no-op. Returns whether the delta was
    /// actually applied (`false` means "already applied", not a
    /// failure).
    async fn apply_delta(&self, id: &AccountId, delta: i64, timestamp: StreamId) -> DomainResult<bool>;

    /// Read back the current projection for `id`, if any has been
    /// created.
    async fn get(&self, id: &AccountId) -> DomainResult<Option<ViewRecord>>;
}

pub mod mongo {
    use super::*;
    use bson::{doc, Document};
    use mongodb::options::ReturnDocument;
    use mongodb::{Client, Collection};

    fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
        e.to_string().contains("E11000")
    }

    /// Mongo-backed `ViewStore`.
    ///
    /// `apply_delta` issues a single `findOneAndUpdate` with
    /// `{_id, timestamps: {$ne: timestamp}}` as the filter and `$inc`
    /// `funds` / `$addToSet` `timestamps` as the update, with upsert
    /// enabled so a brand-new account gets its first record created on
    /// its first projected event. Two concurrent "first event for a new
    /// id" upserts can both observe "no match" and both attempt an
    /// insert; the loser gets a duplicate-key error on `_id` and is
    /// retried once with upsert disabled, by which point the winner's
    /// document exists and the conditional update either applies
    /// cleanly or is absorbed as a no-op (§4.4).
    pub struct MongoViewStore {
        collection: Collection<Document>,
    }

    impl MongoViewStore {
        pub async fn connect(uri: &str, database: &str, collection: &str) -> DomainResult<Self> {
            let client = Client::with_uri_str(uri)
                .await
                .map_err(|e| DomainError::backend(format!("mongo connect: {e}")))?;
            Ok(Self {
                collection: client.database(database).collection(collection),
            })
        }

        async fn try_apply(
            &self,
            filter: &Document,
            update: &Document,
            upsert: bool,
        ) -> Result<bool, mongodb::error::Error> {
            let result = self
                .collection
                .find_one_and_update(filter.clone(), update.clone())
                .upsert(upsert)
                .return_document(ReturnDocument::After)
                .await?;
            Ok(result.is_some())
        }
    }

    #[async_trait]
    impl ViewStore for MongoViewStore {
        async fn apply_delta(
            &self,
            id: &AccountId,
            delta: i64,
            timestamp: StreamId,
        ) -> DomainResult<bool> {
            let ts = timestamp.to_string();
            let filter = doc! { "_id": id.as_str(), "timestamps": { "$ne": &ts } };
            let update = doc! {
                "$inc": { "funds": delta },
                "$addToSet": { "timestamps": &ts },
            };

            match self.try_apply(&filter, &update, true).await {
                Ok(applied) => Ok(applied),
                Err(e) if is_duplicate_key(&e) => self
                    .try_apply(&filter, &update, false)
                    .await
                    .map_err(|e| DomainError::backend(format!("view store upsert retry: {e}"))),
                Err(e) => Err(DomainError::backend(format!("view store upsert: {e}"))),
            }
        }

        async fn get(&self, id: &AccountId) -> DomainResult<Option<ViewRecord>> {
            let found = self
                .collection
                .find_one(doc! { "_id": id.as_str() })
                .await
                .map_err(|e| DomainError::backend(format!("view store read: {e}")))?;

            Ok(found.map(|doc| ViewRecord {
                id: doc
                    .get_str("_id")
                    .unwrap_or_default()
                    .to_string(),
                funds: doc.get_i64("funds").unwrap_or_default(),
                timestamps: doc
                    .get_array("timestamps")
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default(),
            }))
        }
    }
}

pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct Record {
        funds: i64,
        timestamps: HashSet<StreamId>,
    }

    /// In-memory `ViewStore` for hermetic projector tests.
    #[derive(Default)]
    pub struct InMemoryViewStore {
        records: RwLock<HashMap<AccountId, Record>>,
    }

    impl InMemoryViewStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ViewStore for InMemoryViewStore {
        async fn apply_delta(
            &self,
            id: &AccountId,
            delta: i64,
            timestamp: StreamId,
        ) -> DomainResult<bool> {
            let mut guard = self.records.write().await;
            let record = guard.entry(id.clone()).or_default();
            if !record.timestamps.insert(timestamp) {
                return Ok(false);
            }
            record.funds += delta;
            Ok(true)
        }

        async fn get(&self, id: &AccountId) -> DomainResult<Option<ViewRecord>> {
            let guard = self.records.read().await;
            Ok(guard.get(id).map(|record| ViewRecord {
                id: id.as_str().to_string(),
                funds: record.funds,
                timestamps: record.timestamps.iter().map(StreamId::to_string).collect(),
            }))
        }
    }
}
