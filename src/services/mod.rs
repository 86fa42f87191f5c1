//! Built-in services: the forwarding stage for document operations, the
//! liveness probe, and the store health initializer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::exchange::{Method, Request, ResourceRef, Response};
use crate::plugin::{Initializer, Service};
use crate::store::{DocumentStore, WriteOutcome};

/// Forwards permitted document operations to the backing store, tagging
/// each with the exchange's transaction value. Catch-all: register it
/// after more specific services.
pub struct DocumentsService {
    store: Arc<dyn DocumentStore>,
}

impl DocumentsService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn parse_body(request: &Request, response: &mut Response) -> Option<Value> {
        match serde_json::from_slice(&request.read_content()) {
            Ok(value) => Some(value),
            Err(e) => {
                response.set_error(400, &format!("malformed request body: {e}"));
                None
            }
        }
    }
}

fn write_outcome_reply(response: &mut Response, outcome: WriteOutcome) -> crate::error::Result<()> {
    match outcome {
        WriteOutcome::Created => response.write_json(201, &json!({ "created": true })),
        WriteOutcome::Updated => response.write_json(200, &json!({ "updated": true })),
        WriteOutcome::Deleted => {
            response.set_status(204);
            response.write_content(None)?;
            Ok(())
        }
        WriteOutcome::Bulk { affected } => {
            response.write_json(200, &json!({ "affected": affected }))
        }
    }
}

#[async_trait]
impl Service for DocumentsService {
    fn accepts(&self, _request: &Request) -> bool {
        true
    }

    async fn handle(&self, request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        let txn = request.txn();
        let resource = request.resource().clone();

        match (request.method(), resource) {
            (Method::Get, ResourceRef::Root) => {
                response.write_json(
                    200,
                    &json!({ "name": "docgate", "version": env!("CARGO_PKG_VERSION") }),
                )?;
            }
            (Method::Get, ResourceRef::Database { db }) => {
                match self.store.list_collections(&db, txn).await {
                    Ok(collections) => response.write_json(200, &json!(collections))?,
                    Err(e) => response.set_error(404, &e.to_string()),
                }
            }
            (Method::Get, ResourceRef::Collection { db, coll }) => {
                let docs = self.store.list(&db, &coll, txn).await?;
                response.write_json(200, &Value::Array(docs))?;
            }
            (Method::Get, ResourceRef::Document { db, coll, id }) => {
                match self.store.get(&db, &coll, &id, txn).await? {
                    Some(doc) => response.write_json(200, &doc)?,
                    None => response.set_error(404, &format!("document '{id}' does not exist")),
                }
            }
            (Method::Put, ResourceRef::Document { db, coll, id }) => {
                if let Some(doc) = Self::parse_body(request, response) {
                    let outcome = self.store.put(&db, &coll, &id, doc, txn).await?;
                    write_outcome_reply(response, outcome)?;
                }
            }
            (Method::Patch, ResourceRef::Document { db, coll, id }) => {
                if let Some(patch) = Self::parse_body(request, response) {
                    match self.store.patch(&db, &coll, &id, patch, txn).await {
                        Ok(outcome) => write_outcome_reply(response, outcome)?,
                        Err(e) => response.set_error(404, &e.to_string()),
                    }
                }
            }
            (Method::Delete, ResourceRef::Document { db, coll, id }) => {
                match self.store.delete(&db, &coll, &id, txn).await {
                    Ok(outcome) => write_outcome_reply(response, outcome)?,
                    Err(e) => response.set_error(404, &e.to_string()),
                }
            }
            (Method::Post, ResourceRef::Collection { db, coll }) => {
                if let Some(body) = Self::parse_body(request, response) {
                    match body {
                        Value::Array(docs) => {
                            let outcome = self.store.bulk_insert(&db, &coll, docs, txn).await?;
                            write_outcome_reply(response, outcome)?;
                        }
                        doc @ Value::Object(_) => {
                            let id = doc
                                .get("_id")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                            let outcome = self.store.put(&db, &coll, &id, doc, txn).await?;
                            write_outcome_reply(response, outcome)?;
                        }
                        _ => response.set_error(400, "request body must be a document or an array"),
                    }
                }
            }
            (Method::Patch, ResourceRef::BulkDocuments { db, coll }) => {
                if let Some(patch) = Self::parse_body(request, response) {
                    match self.store.bulk_patch(&db, &coll, patch, txn).await {
                        Ok(outcome) => write_outcome_reply(response, outcome)?,
                        Err(e) => response.set_error(404, &e.to_string()),
                    }
                }
            }
            (Method::Delete, ResourceRef::BulkDocuments { db, coll }) => {
                match self.store.bulk_delete(&db, &coll, txn).await {
                    Ok(outcome) => write_outcome_reply(response, outcome)?,
                    Err(e) => response.set_error(404, &e.to_string()),
                }
            }
            (Method::Options, _) => {
                response.set_status(200);
                response.set_header("allow", "GET, POST, PUT, PATCH, DELETE, OPTIONS");
            }
            _ => response.set_error(405, "method not allowed for this resource"),
        }

        Ok(())
    }
}

/// Answers `/ping` without touching the store.
pub struct PingService;

#[async_trait]
impl Service for PingService {
    fn accepts(&self, request: &Request) -> bool {
        request.path().trim_end_matches('/') == "/ping"
    }

    async fn handle(&self, _request: &mut Request, response: &mut Response) -> anyhow::Result<()> {
        response.write_json(200, &json!({ "message": "pong" }))?;
        Ok(())
    }
}

/// Fails startup early when the backing store is unreachable.
pub struct StoreHealthInitializer {
    store: Arc<dyn DocumentStore>,
}

impl StoreHealthInitializer {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Initializer for StoreHealthInitializer {
    async fn init(&self) -> anyhow::Result<()> {
        self.store.ping().await?;
        info!("Backing store is reachable");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::BufferPool;
    use crate::store::MemoryStore;

    fn service() -> DocumentsService {
        DocumentsService::new(Arc::new(MemoryStore::new()))
    }

    fn exchange(method: Method, path: &str, body: Option<&[u8]>) -> (Request, Response) {
        let pool = BufferPool::new(1024, 16);
        let mut request = Request::new(method, path, pool.clone());
        if let Some(body) = body {
            request.write_content(Some(body)).unwrap();
        }
        (request, Response::new(pool))
    }

    #[tokio::test]
    async fn put_then_get_round_trips_a_document() {
        let service = service();

        let (mut request, mut response) =
            exchange(Method::Put, "/inv/parts/p1", Some(b"{\"qty\":3}"));
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 201);

        let (mut request, mut response) = exchange(Method::Get, "/inv/parts/p1", None);
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 200);
        let doc: Value = serde_json::from_slice(&response.read_content()).unwrap();
        assert_eq!(doc["qty"], 3);
    }

    #[tokio::test]
    async fn missing_documents_answer_404() {
        let service = service();
        let (mut request, mut response) = exchange(Method::Get, "/inv/parts/ghost", None);
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 404);
        assert!(response.is_in_error());
    }

    #[tokio::test]
    async fn malformed_bodies_answer_400() {
        let service = service();
        let (mut request, mut response) =
            exchange(Method::Put, "/inv/parts/p1", Some(b"{not json"));
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn posting_an_array_bulk_inserts() {
        let service = service();
        let (mut request, mut response) = exchange(
            Method::Post,
            "/inv/parts",
            Some(b"[{\"n\":1},{\"n\":2}]"),
        );
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(&response.read_content()).unwrap();
        assert_eq!(body["affected"], 2);
    }

    #[tokio::test]
    async fn bulk_delete_clears_the_collection() {
        let service = service();
        let (mut request, mut response) =
            exchange(Method::Put, "/inv/parts/p1", Some(b"{\"qty\":3}"));
        service.handle(&mut request, &mut response).await.unwrap();

        let (mut request, mut response) = exchange(Method::Delete, "/inv/parts/*", None);
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(&response.read_content()).unwrap();
        assert_eq!(body["affected"], 1);
    }

    #[tokio::test]
    async fn ping_answers_without_a_store() {
        let service = PingService;
        let pool = BufferPool::new(1024, 4);
        let mut request = Request::new(Method::Get, "/ping", pool.clone());
        assert!(service.accepts(&request));
        let mut response = Response::new(pool);
        service.handle(&mut request, &mut response).await.unwrap();
        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn store_health_initializer_propagates_ping_failures() {
        use crate::error::StoreError;
        use crate::store::MockDocumentStore;

        let mut store = MockDocumentStore::new();
        store
            .expect_ping()
            .returning(|| Err(StoreError::Unavailable("store is down".to_string())));

        let initializer = StoreHealthInitializer::new(Arc::new(store));
        assert!(initializer.init().await.is_err());
    }
}
