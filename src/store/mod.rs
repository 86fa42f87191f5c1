//! The backing document store boundary.
//!
//! Wire-protocol details live behind [`DocumentStore`]; the gateway only
//! forwards operations and attaches the exchange's transaction value
//! without interpreting it. [`MemoryStore`] backs tests and demos.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::session::Txn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Deleted,
    Bulk { affected: u64 },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn list_collections(&self, db: &str, txn: Txn) -> Result<Vec<String>, StoreError>;

    async fn list(&self, db: &str, coll: &str, txn: Txn) -> Result<Vec<Value>, StoreError>;

    async fn get(&self, db: &str, coll: &str, id: &str, txn: Txn)
        -> Result<Option<Value>, StoreError>;

    async fn put(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        doc: Value,
        txn: Txn,
    ) -> Result<WriteOutcome, StoreError>;

    async fn patch(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        patch: Value,
        txn: Txn,
    ) -> Result<WriteOutcome, StoreError>;

    async fn delete(&self, db: &str, coll: &str, id: &str, txn: Txn)
        -> Result<WriteOutcome, StoreError>;

    async fn bulk_insert(
        &self,
        db: &str,
        coll: &str,
        docs: Vec<Value>,
        txn: Txn,
    ) -> Result<WriteOutcome, StoreError>;

    async fn bulk_patch(
        &self,
        db: &str,
        coll: &str,
        patch: Value,
        txn: Txn,
    ) -> Result<WriteOutcome, StoreError>;

    async fn bulk_delete(&self, db: &str, coll: &str, txn: Txn)
        -> Result<WriteOutcome, StoreError>;
}

type Collections = HashMap<String, HashMap<String, HashMap<String, Value>>>;

/// Upsert-style in-memory store. Databases and collections come into
/// existence on first write, like the document stores it stands in for.
/// Transaction values are accepted and ignored.
pub struct MemoryStore {
    data: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_into(doc: &mut Value, patch: &Value) {
    if let (Value::Object(doc), Value::Object(patch)) = (doc, patch) {
        for (key, value) in patch {
            doc.insert(key.clone(), value.clone());
        }
    }
}

fn generated_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_collections(&self, db: &str, _txn: Txn) -> Result<Vec<String>, StoreError> {
        let data = self.data.read().await;
        let database = data
            .get(db)
            .ok_or_else(|| StoreError::DatabaseNotFound(db.to_string()))?;
        let mut names: Vec<String> = database.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn list(&self, db: &str, coll: &str, _txn: Txn) -> Result<Vec<Value>, StoreError> {
        let data = self.data.read().await;
        let docs = data
            .get(db)
            .and_then(|database| database.get(coll))
            .map(|documents| {
                let mut pairs: Vec<(&String, &Value)> = documents.iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                pairs.into_iter().map(|(_, doc)| doc.clone()).collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    async fn get(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        _txn: Txn,
    ) -> Result<Option<Value>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .get(db)
            .and_then(|database| database.get(coll))
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn put(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        mut doc: Value,
        _txn: Txn,
    ) -> Result<WriteOutcome, StoreError> {
        if let Value::Object(map) = &mut doc {
            map.insert("_id".to_string(), Value::String(id.to_string()));
        }
        let mut data = self.data.write().await;
        let documents = data
            .entry(db.to_string())
            .or_default()
            .entry(coll.to_string())
            .or_default();
        match documents.insert(id.to_string(), doc) {
            None => Ok(WriteOutcome::Created),
            Some(_) => Ok(WriteOutcome::Updated),
        }
    }

    async fn patch(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        patch: Value,
        _txn: Txn,
    ) -> Result<WriteOutcome, StoreError> {
        let mut data = self.data.write().await;
        let doc = data
            .get_mut(db)
            .and_then(|database| database.get_mut(coll))
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| StoreError::DocumentNotFound(id.to_string()))?;
        merge_into(doc, &patch);
        Ok(WriteOutcome::Updated)
    }

    async fn delete(
        &self,
        db: &str,
        coll: &str,
        id: &str,
        _txn: Txn,
    ) -> Result<WriteOutcome, StoreError> {
        let mut data = self.data.write().await;
        let removed = data
            .get_mut(db)
            .and_then(|database| database.get_mut(coll))
            .and_then(|documents| documents.remove(id));
        match removed {
            Some(_) => Ok(WriteOutcome::Deleted),
            None => Err(StoreError::DocumentNotFound(id.to_string())),
        }
    }

    async fn bulk_insert(
        &self,
        db: &str,
        coll: &str,
        docs: Vec<Value>,
        _txn: Txn,
    ) -> Result<WriteOutcome, StoreError> {
        let mut data = self.data.write().await;
        let documents = data
            .entry(db.to_string())
            .or_default()
            .entry(coll.to_string())
            .or_default();
        let affected = docs.len() as u64;
        for mut doc in docs {
            let id = doc
                .get("_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(generated_id);
            if let Value::Object(map) = &mut doc {
                map.insert("_id".to_string(), Value::String(id.clone()));
            }
            documents.insert(id, doc);
        }
        Ok(WriteOutcome::Bulk { affected })
    }

    async fn bulk_patch(
        &self,
        db: &str,
        coll: &str,
        patch: Value,
        _txn: Txn,
    ) -> Result<WriteOutcome, StoreError> {
        let mut data = self.data.write().await;
        let documents = data
            .get_mut(db)
            .and_then(|database| database.get_mut(coll))
            .ok_or_else(|| StoreError::CollectionNotFound(coll.to_string()))?;
        for doc in documents.values_mut() {
            merge_into(doc, &patch);
        }
        Ok(WriteOutcome::Bulk {
            affected: documents.len() as u64,
        })
    }

    async fn bulk_delete(
        &self,
        db: &str,
        coll: &str,
        _txn: Txn,
    ) -> Result<WriteOutcome, StoreError> {
        let mut data = self.data.write().await;
        let documents = data
            .get_mut(db)
            .and_then(|database| database.get_mut(coll))
            .ok_or_else(|| StoreError::CollectionNotFound(coll.to_string()))?;
        let affected = documents.len() as u64;
        documents.clear();
        Ok(WriteOutcome::Bulk { affected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    fn txn() -> Txn {
        Txn::not_supported()
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemoryStore::new();
        assert_ok!(store.ping().await);
        let outcome = store
            .put("inv", "parts", "p1", json!({ "qty": 3 }), txn())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let doc = store.get("inv", "parts", "p1", txn()).await.unwrap().unwrap();
        assert_eq!(doc["qty"], 3);
        assert_eq!(doc["_id"], "p1");

        let outcome = store
            .put("inv", "parts", "p1", json!({ "qty": 4 }), txn())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);

        assert_eq!(
            store.delete("inv", "parts", "p1", txn()).await.unwrap(),
            WriteOutcome::Deleted
        );
        assert!(store.get("inv", "parts", "p1", txn()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn patch_merges_top_level_keys() {
        let store = MemoryStore::new();
        store
            .put("inv", "parts", "p1", json!({ "qty": 3, "loc": "a" }), txn())
            .await
            .unwrap();
        store
            .patch("inv", "parts", "p1", json!({ "qty": 9 }), txn())
            .await
            .unwrap();
        let doc = store.get("inv", "parts", "p1", txn()).await.unwrap().unwrap();
        assert_eq!(doc["qty"], 9);
        assert_eq!(doc["loc"], "a");
    }

    #[tokio::test]
    async fn deleting_a_missing_document_is_an_error() {
        let store = MemoryStore::new();
        let err = store.delete("inv", "parts", "ghost", txn()).await.unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn bulk_operations_cover_the_collection() {
        let store = MemoryStore::new();
        let outcome = store
            .bulk_insert(
                "inv",
                "parts",
                vec![json!({ "n": 1 }), json!({ "n": 2 }), json!({ "n": 3 })],
                txn(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Bulk { affected: 3 });

        let outcome = store
            .bulk_patch("inv", "parts", json!({ "seen": true }), txn())
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Bulk { affected: 3 });
        for doc in store.list("inv", "parts", txn()).await.unwrap() {
            assert_eq!(doc["seen"], true);
        }

        let outcome = store.bulk_delete("inv", "parts", txn()).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Bulk { affected: 3 });
        assert!(store.list("inv", "parts", txn()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collections_are_listed_sorted() {
        let store = MemoryStore::new();
        store.put("inv", "b", "1", json!({}), txn()).await.unwrap();
        store.put("inv", "a", "1", json!({}), txn()).await.unwrap();
        assert_eq!(
            store.list_collections("inv", txn()).await.unwrap(),
            vec!["a", "b"]
        );
    }
}
