//! The HTTP exchange as the pipeline sees it: a classified request and a
//! mutable response, both carrying pooled buffered content.

pub mod content;

pub use content::{BufferPool, ExchangeContent, PooledSegment};

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::acl::MongoPermissions;
use crate::auth::Principal;
use crate::error::ContentError;
use crate::session::Txn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

/// The database resource an exchange addresses, parsed from the URI path.
/// The reserved document id `*` addresses every document of a collection
/// (bulk operations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    Root,
    Database { db: String },
    Collection { db: String, coll: String },
    BulkDocuments { db: String, coll: String },
    Document { db: String, coll: String, id: String },
}

impl ResourceRef {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Self::Root,
            [db] => Self::Database { db: db.to_string() },
            [db, coll] => Self::Collection {
                db: db.to_string(),
                coll: coll.to_string(),
            },
            [db, coll, "*"] => Self::BulkDocuments {
                db: db.to_string(),
                coll: coll.to_string(),
            },
            [db, coll, id @ ..] => Self::Document {
                db: db.to_string(),
                coll: coll.to_string(),
                id: id.join("/"),
            },
        }
    }
}

/// An inbound exchange. Transport code builds one per HTTP request; the
/// pipeline classifies, authenticates, and possibly rewrites it before
/// the forwarding stage.
pub struct Request {
    id: Uuid,
    received_at: DateTime<Utc>,
    method: Method,
    path: String,
    resource: ResourceRef,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    content: ExchangeContent,
    txn: Txn,
    handled_by: Option<String>,
    principal: Option<Principal>,
    permissions: Option<Arc<MongoPermissions>>,
    requested_transformers: Vec<String>,
    requested_checkers: Vec<String>,
    requested_hooks: Vec<String>,
}

impl Request {
    pub fn new(method: Method, path: &str, pool: Arc<BufferPool>) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            method,
            path: path.to_string(),
            resource: ResourceRef::parse(path),
            query: HashMap::new(),
            headers: HashMap::new(),
            content: ExchangeContent::absent(pool),
            // sessions start on the not-supported sentinel; external
            // session management swaps in live transaction values
            txn: Txn::not_supported(),
            handled_by: None,
            principal: None,
            permissions: None,
            requested_transformers: Vec::new(),
            requested_checkers: Vec::new(),
            requested_hooks: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn set_query_param(&mut self, key: &str, value: &str) {
        self.query.insert(key.to_string(), value.to_string());
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Header names are case-insensitive; they are stored lowercased.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn txn(&self) -> Txn {
        self.txn
    }

    pub fn set_txn(&mut self, txn: Txn) {
        self.txn = txn;
    }

    pub fn set_handled_by(&mut self, service: &str) {
        self.handled_by = Some(service.to_string());
    }

    pub fn handled_by(&self) -> Option<&str> {
        self.handled_by.as_deref()
    }

    pub fn is_handled_by(&self, service: &str) -> bool {
        self.handled_by.as_deref() == Some(service)
    }

    pub fn set_authenticated(&mut self, principal: Principal, permissions: Arc<MongoPermissions>) {
        self.principal = Some(principal);
        self.permissions = Some(permissions);
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn permissions(&self) -> Option<&Arc<MongoPermissions>> {
        self.permissions.as_ref()
    }

    pub fn requested_transformers(&self) -> &[String] {
        &self.requested_transformers
    }

    pub fn requested_checkers(&self) -> &[String] {
        &self.requested_checkers
    }

    pub fn requested_hooks(&self) -> &[String] {
        &self.requested_hooks
    }

    /// Names of addressable plugins this exchange asks for, usually taken
    /// from resource metadata by the handling service.
    pub fn request_transformer(&mut self, name: &str) {
        self.requested_transformers.push(name.to_string());
    }

    pub fn request_checker(&mut self, name: &str) {
        self.requested_checkers.push(name.to_string());
    }

    pub fn request_hook(&mut self, name: &str) {
        self.requested_hooks.push(name.to_string());
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    pub fn is_put(&self) -> bool {
        self.method == Method::Put
    }

    pub fn is_patch(&self) -> bool {
        self.method == Method::Patch
    }

    pub fn is_delete(&self) -> bool {
        self.method == Method::Delete
    }

    pub fn is_write_request(&self) -> bool {
        self.method.is_write()
    }

    /// True for requests addressing every document of a collection: the
    /// `*` document id, or a POST whose body is a document array.
    pub fn is_bulk_documents(&self) -> bool {
        match &self.resource {
            ResourceRef::BulkDocuments { .. } => true,
            ResourceRef::Collection { .. } if self.method == Method::Post => {
                self.read_content().first() == Some(&b'[')
            }
            _ => false,
        }
    }

    /// Structure-level writes: creating, reshaping, or dropping databases
    /// and collections, as opposed to document writes.
    pub fn is_management_request(&self) -> bool {
        matches!(
            self.resource,
            ResourceRef::Database { .. } | ResourceRef::Collection { .. }
        ) && matches!(self.method, Method::Put | Method::Patch | Method::Delete)
    }

    /// The `wm` qualifier selecting a non-default write mode.
    pub fn write_mode(&self) -> Option<&str> {
        self.query_param("wm")
    }

    pub fn content(&self) -> &ExchangeContent {
        &self.content
    }

    pub fn read_content(&self) -> Bytes {
        self.content.read()
    }

    /// Buffers the body and updates the declared content length to the
    /// copied byte count, which is the caller obligation the content
    /// component itself does not take on.
    pub fn write_content(&mut self, body: Option<&[u8]>) -> Result<usize, ContentError> {
        let copied = self.content.write(body)?;
        self.headers
            .insert("content-length".to_string(), copied.to_string());
        Ok(copied)
    }
}

/// The mutable response half of an exchange. Interceptors may rewrite it
/// or mark it errored; an errored response stops normal processing at the
/// next stage boundary.
pub struct Response {
    status: u16,
    headers: HashMap<String, String>,
    content: ExchangeContent,
    in_error: bool,
}

impl Response {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            content: ExchangeContent::absent(pool),
            in_error: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn is_in_error(&self) -> bool {
        self.in_error
    }

    pub fn set_in_error(&mut self, in_error: bool) {
        self.in_error = in_error;
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn content(&self) -> &ExchangeContent {
        &self.content
    }

    pub fn read_content(&self) -> Bytes {
        self.content.read()
    }

    pub fn write_content(&mut self, body: Option<&[u8]>) -> Result<usize, ContentError> {
        let copied = self.content.write(body)?;
        self.headers
            .insert("content-length".to_string(), copied.to_string());
        Ok(copied)
    }

    pub fn write_json(&mut self, status: u16, value: &Value) -> crate::error::Result<()> {
        let body = serde_json::to_vec(value)?;
        self.set_status(status);
        self.set_header("content-type", "application/json");
        self.write_content(Some(&body))?;
        Ok(())
    }

    /// Marks the exchange failed with a JSON error body. Failure to
    /// buffer the body leaves the status and error mark in place.
    pub fn set_error(&mut self, status: u16, message: &str) {
        self.status = status;
        self.in_error = true;
        self.set_header("content-type", "application/json");
        let body = serde_json::json!({ "status": status, "message": message }).to_string();
        if self.write_content(Some(body.as_bytes())).is_err() {
            self.write_content(None).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<BufferPool> {
        BufferPool::new(1024, 8)
    }

    fn request(method: Method, path: &str) -> Request {
        Request::new(method, path, pool())
    }

    #[test]
    fn parses_resource_refs() {
        assert_eq!(ResourceRef::parse("/"), ResourceRef::Root);
        assert_eq!(
            ResourceRef::parse("/inventory"),
            ResourceRef::Database {
                db: "inventory".to_string()
            }
        );
        assert_eq!(
            ResourceRef::parse("/inventory/parts"),
            ResourceRef::Collection {
                db: "inventory".to_string(),
                coll: "parts".to_string()
            }
        );
        assert_eq!(
            ResourceRef::parse("/inventory/parts/*"),
            ResourceRef::BulkDocuments {
                db: "inventory".to_string(),
                coll: "parts".to_string()
            }
        );
        assert_eq!(
            ResourceRef::parse("/inventory/parts/p1"),
            ResourceRef::Document {
                db: "inventory".to_string(),
                coll: "parts".to_string(),
                id: "p1".to_string()
            }
        );
    }

    #[test]
    fn classifies_bulk_documents() {
        assert!(request(Method::Delete, "/db/coll/*").is_bulk_documents());
        assert!(!request(Method::Delete, "/db/coll/one").is_bulk_documents());

        let mut post_array = request(Method::Post, "/db/coll");
        post_array.write_content(Some(b"[{\"a\":1},{\"a\":2}]")).unwrap();
        assert!(post_array.is_bulk_documents());

        let mut post_doc = request(Method::Post, "/db/coll");
        post_doc.write_content(Some(b"{\"a\":1}")).unwrap();
        assert!(!post_doc.is_bulk_documents());
    }

    #[test]
    fn classifies_management_requests() {
        assert!(request(Method::Put, "/db").is_management_request());
        assert!(request(Method::Delete, "/db/coll").is_management_request());
        assert!(!request(Method::Get, "/db/coll").is_management_request());
        assert!(!request(Method::Post, "/db/coll").is_management_request());
        assert!(!request(Method::Put, "/db/coll/doc").is_management_request());
    }

    #[test]
    fn handled_by_tracks_the_routing_decision() {
        let mut req = request(Method::Get, "/db/coll");
        assert!(!req.is_handled_by("documents"));
        req.set_handled_by("documents");
        assert!(req.is_handled_by("documents"));
        assert!(!req.is_handled_by("ping"));
    }

    #[test]
    fn write_content_updates_declared_length() {
        let mut req = request(Method::Put, "/db/coll/doc");
        req.write_content(Some(b"0123456789")).unwrap();
        assert_eq!(req.header("content-length"), Some("10"));

        req.write_content(None).unwrap();
        assert_eq!(req.header("content-length"), Some("0"));
        assert!(req.content().is_absent());
    }

    #[test]
    fn headers_are_case_insensitive() {
        let mut req = request(Method::Get, "/");
        req.set_header("X-Forwarded-User", "ada");
        assert_eq!(req.header("x-forwarded-user"), Some("ada"));
        assert_eq!(req.header("X-FORWARDED-USER"), Some("ada"));
    }

    #[test]
    fn error_responses_carry_a_json_body() {
        let mut res = Response::new(pool());
        res.set_error(403, "forbidden");
        assert_eq!(res.status(), 403);
        assert!(res.is_in_error());
        let body: Value = serde_json::from_slice(&res.read_content()).unwrap();
        assert_eq!(body["status"], 403);
        assert_eq!(body["message"], "forbidden");
        assert_eq!(res.header("content-length"), Some(res.read_content().len().to_string()).as_deref());
    }

    #[test]
    fn write_mode_qualifier_comes_from_the_query() {
        let mut req = request(Method::Post, "/db/coll");
        assert!(req.write_mode().is_none());
        req.set_query_param("wm", "upsert");
        assert_eq!(req.write_mode(), Some("upsert"));
    }
}
