//! The per-role ACL value gating document-store operations.
//!
//! SECURITY DEFAULT: the four whitelist flags default to TRUE when their
//! key is absent from configuration. Operations stay allowed until an
//! operator explicitly sets a flag to `false` for the role. Reading
//! "whitelist" as default-deny here would flip the meaning of every
//! deployed configuration. Property collections are the opposite: absent
//! means empty, so nothing is hidden, protected, or overridden unless
//! configured.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::exchange::Request;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoPermissions {
    whitelist_management_requests: bool,
    whitelist_bulk_patch: bool,
    whitelist_bulk_delete: bool,
    allow_all_write_modes: bool,
    hidden_props: HashSet<String>,
    protected_props: HashSet<String>,
    overridden_props: HashMap<String, String>,
}

impl Default for MongoPermissions {
    fn default() -> Self {
        Self {
            whitelist_management_requests: true,
            whitelist_bulk_patch: true,
            whitelist_bulk_delete: true,
            allow_all_write_modes: true,
            hidden_props: HashSet::new(),
            protected_props: HashSet::new(),
            overridden_props: HashMap::new(),
        }
    }
}

impl MongoPermissions {
    /// Parses permissions from a raw key/value mapping. All-or-nothing:
    /// the first malformed key aborts the parse with an error naming it,
    /// never a partially built value and never a silent coercion.
    pub fn from(args: &Map<String, Value>) -> Result<Self, ConfigError> {
        if args.is_empty() {
            return Ok(Self::default());
        }

        Ok(Self {
            whitelist_management_requests: parse_boolean_arg(args, "whitelistManagementRequests")?,
            whitelist_bulk_patch: parse_boolean_arg(args, "whitelistBulkPatch")?,
            whitelist_bulk_delete: parse_boolean_arg(args, "whitelistBulkDelete")?,
            allow_all_write_modes: parse_boolean_arg(args, "allowAllWriteModes")?,
            hidden_props: parse_string_set_arg(args, "hiddenProps")?,
            protected_props: parse_string_set_arg(args, "protectedProps")?,
            overridden_props: parse_string_map_arg(args, "overriddenProps")?,
        })
    }

    /// Same as [`MongoPermissions::from`] for a structured document.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from(map),
            _ => Err(ConfigError::WrongType {
                key: "mongo".to_string(),
                expected: "a key/value mapping",
            }),
        }
    }

    pub fn whitelist_management_requests(&self) -> bool {
        self.whitelist_management_requests
    }

    pub fn whitelist_bulk_patch(&self) -> bool {
        self.whitelist_bulk_patch
    }

    pub fn whitelist_bulk_delete(&self) -> bool {
        self.whitelist_bulk_delete
    }

    pub fn allow_all_write_modes(&self) -> bool {
        self.allow_all_write_modes
    }

    pub fn hidden_props(&self) -> &HashSet<String> {
        &self.hidden_props
    }

    pub fn protected_props(&self) -> &HashSet<String> {
        &self.protected_props
    }

    pub fn overridden_props(&self) -> &HashMap<String, String> {
        &self.overridden_props
    }

    /// Evaluates every operation gate for the request.
    pub fn evaluate(&self, request: &Request) -> Decision {
        if !self.whitelist_bulk_delete && request.is_bulk_documents() && request.is_delete() {
            return Decision::forbid("bulk delete is not whitelisted for this role");
        }

        if !self.whitelist_bulk_patch && request.is_bulk_documents() && request.is_patch() {
            return Decision::forbid("bulk patch is not whitelisted for this role");
        }

        if !self.whitelist_management_requests && request.is_management_request() {
            return Decision::forbid("management requests are not whitelisted for this role");
        }

        if !self.allow_all_write_modes && request.write_mode().is_some() {
            return Decision::forbid("write mode qualifiers are not allowed for this role");
        }

        Decision::allow(self.hidden_props.clone())
    }
}

/// Outcome of evaluating a request against a permission model. A forbid
/// is a normal pipeline result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    reason: Option<String>,
    hidden_props: HashSet<String>,
}

impl Decision {
    pub fn allow(hidden_props: HashSet<String>) -> Self {
        Self {
            allowed: true,
            reason: None,
            hidden_props,
        }
    }

    pub fn forbid(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            hidden_props: HashSet::new(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Property names to strip from documents before they reach the
    /// client.
    pub fn hidden_props(&self) -> &HashSet<String> {
        &self.hidden_props
    }
}

fn parse_boolean_arg(args: &Map<String, Value>, key: &str) -> Result<bool, ConfigError> {
    match args.get(key) {
        None => Ok(true),
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "a boolean",
        }),
    }
}

fn parse_string_set_arg(args: &Map<String, Value>, key: &str) -> Result<HashSet<String>, ConfigError> {
    match args.get(key) {
        None => Ok(HashSet::new()),
        Some(Value::Array(entries)) => {
            let mut set = HashSet::new();
            for entry in entries {
                match entry {
                    Value::String(s) => {
                        set.insert(s.clone());
                    }
                    _ => {
                        return Err(ConfigError::WrongType {
                            key: key.to_string(),
                            expected: "a list of strings",
                        })
                    }
                }
            }
            Ok(set)
        }
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "a list of strings",
        }),
    }
}

fn parse_string_map_arg(
    args: &Map<String, Value>,
    key: &str,
) -> Result<HashMap<String, String>, ConfigError> {
    match args.get(key) {
        None => Ok(HashMap::new()),
        Some(Value::Object(entries)) => {
            let mut map = HashMap::new();
            for (prop, expr) in entries {
                match expr {
                    Value::String(s) => {
                        map.insert(prop.clone(), s.clone());
                    }
                    _ => {
                        return Err(ConfigError::WrongType {
                            key: key.to_string(),
                            expected: "a mapping from property names to expressions",
                        })
                    }
                }
            }
            Ok(map)
        }
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "a mapping from property names to expressions",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from_json(value: Value) -> Result<MongoPermissions, ConfigError> {
        MongoPermissions::from_value(&value)
    }

    #[test]
    fn empty_mapping_yields_permissive_defaults() {
        let perms = from_json(json!({})).unwrap();
        assert!(perms.whitelist_management_requests());
        assert!(perms.whitelist_bulk_patch());
        assert!(perms.whitelist_bulk_delete());
        assert!(perms.allow_all_write_modes());
        assert!(perms.hidden_props().is_empty());
        assert!(perms.protected_props().is_empty());
        assert!(perms.overridden_props().is_empty());
    }

    #[test]
    fn absent_booleans_default_true_even_when_other_keys_exist() {
        let perms = from_json(json!({ "hiddenProps": ["secret"] })).unwrap();
        assert!(perms.whitelist_bulk_delete());
        assert_eq!(perms.hidden_props().len(), 1);
    }

    #[test]
    fn wrong_boolean_type_fails_naming_the_key() {
        let err = from_json(json!({ "whitelistBulkDelete": "yes" })).unwrap_err();
        assert!(err.to_string().contains("whitelistBulkDelete"));
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn wrong_list_type_fails_naming_the_key() {
        let err = from_json(json!({ "hiddenProps": "password" })).unwrap_err();
        assert!(err.to_string().contains("hiddenProps"));

        let err = from_json(json!({ "protectedProps": [1, 2] })).unwrap_err();
        assert!(err.to_string().contains("protectedProps"));
    }

    #[test]
    fn one_malformed_key_aborts_the_whole_parse() {
        let err = from_json(json!({
            "whitelistBulkPatch": false,
            "hiddenProps": 7
        }))
        .unwrap_err();
        assert!(err.to_string().contains("hiddenProps"));
    }

    #[test]
    fn overridden_props_parse_as_string_map() {
        let perms = from_json(json!({ "overriddenProps": { "author": "@user.id" } })).unwrap();
        assert_eq!(
            perms.overridden_props().get("author").map(String::as_str),
            Some("@user.id")
        );

        let err = from_json(json!({ "overriddenProps": { "author": 42 } })).unwrap_err();
        assert!(err.to_string().contains("overriddenProps"));
    }

    #[test]
    fn explicit_false_disables_the_whitelist() {
        let perms = from_json(json!({ "whitelistBulkDelete": false })).unwrap();
        assert!(!perms.whitelist_bulk_delete());
        // the sibling flags keep their permissive default
        assert!(perms.whitelist_bulk_patch());
    }

    mod evaluate {
        use super::*;
        use crate::exchange::{BufferPool, Method, Request};

        fn request(method: Method, path: &str) -> Request {
            Request::new(method, path, BufferPool::new(256, 4))
        }

        #[test]
        fn bulk_delete_is_forbidden_only_with_the_flag_off() {
            let restricted = from_json(json!({ "whitelistBulkDelete": false })).unwrap();
            let decision = restricted.evaluate(&request(Method::Delete, "/db/coll/*"));
            assert!(!decision.is_allowed());
            assert!(decision.reason().unwrap().contains("bulk delete"));

            let permissive = from_json(json!({})).unwrap();
            assert!(permissive
                .evaluate(&request(Method::Delete, "/db/coll/*"))
                .is_allowed());

            // not bulk, so the flag does not apply
            assert!(restricted
                .evaluate(&request(Method::Delete, "/db/coll/one"))
                .is_allowed());
        }

        #[test]
        fn bulk_patch_rule_is_symmetric() {
            let restricted = from_json(json!({ "whitelistBulkPatch": false })).unwrap();
            assert!(!restricted
                .evaluate(&request(Method::Patch, "/db/coll/*"))
                .is_allowed());
            assert!(restricted
                .evaluate(&request(Method::Delete, "/db/coll/*"))
                .is_allowed());
        }

        #[test]
        fn management_and_write_mode_gates() {
            let no_mgmt = from_json(json!({ "whitelistManagementRequests": false })).unwrap();
            assert!(!no_mgmt.evaluate(&request(Method::Put, "/db/coll")).is_allowed());
            assert!(no_mgmt.evaluate(&request(Method::Get, "/db/coll")).is_allowed());

            let no_wm = from_json(json!({ "allowAllWriteModes": false })).unwrap();
            let mut req = request(Method::Post, "/db/coll");
            req.set_query_param("wm", "upsert");
            assert!(!no_wm.evaluate(&req).is_allowed());
        }

        #[test]
        fn allowed_decisions_carry_the_hidden_props_filter() {
            let perms = from_json(json!({ "hiddenProps": ["password"] })).unwrap();
            let decision = perms.evaluate(&request(Method::Get, "/db/coll/doc"));
            assert!(decision.is_allowed());
            assert!(decision.hidden_props().contains("password"));
        }
    }
}
