//! ACL-based authorization: the permission model plus the property-level
//! helpers the built-in interceptors apply to documents.

pub mod permissions;

pub use permissions::{Decision, MongoPermissions};

use std::collections::HashSet;

use serde_json::Value;

use crate::auth::Principal;

/// Removes hidden properties from a document, or from every element of a
/// document array, before it is returned to the client.
pub fn strip_hidden_props(doc: &mut Value, hidden: &HashSet<String>) {
    match doc {
        Value::Object(map) => {
            map.retain(|key, _| !hidden.contains(key));
        }
        Value::Array(docs) => {
            for entry in docs {
                strip_hidden_props(entry, hidden);
            }
        }
        _ => {}
    }
}

/// Resolves an overridden-property expression. `@user.<prop>` reads from
/// the authenticated principal; anything else is parsed as a JSON literal
/// and falls back to a plain string.
pub fn resolve_override_expression(expr: &str, principal: Option<&Principal>) -> Value {
    if let Some(prop) = expr.strip_prefix("@user.") {
        return match (prop, principal) {
            ("id", Some(p)) => Value::String(p.id.clone()),
            ("roles", Some(p)) => Value::Array(
                p.roles.iter().map(|r| Value::String(r.clone())).collect(),
            ),
            _ => Value::Null,
        };
    }

    serde_json::from_str(expr).unwrap_or_else(|_| Value::String(expr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hidden(props: &[&str]) -> HashSet<String> {
        props.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn strips_hidden_props_from_objects_and_arrays() {
        let mut doc = json!({ "_id": "a", "password": "x", "name": "ada" });
        strip_hidden_props(&mut doc, &hidden(&["password"]));
        assert_eq!(doc, json!({ "_id": "a", "name": "ada" }));

        let mut docs = json!([
            { "_id": "a", "password": "x" },
            { "_id": "b", "password": "y" }
        ]);
        strip_hidden_props(&mut docs, &hidden(&["password"]));
        assert_eq!(docs, json!([{ "_id": "a" }, { "_id": "b" }]));
    }

    #[test]
    fn resolves_user_expressions() {
        let principal = Principal {
            id: "ada".to_string(),
            roles: vec!["admin".to_string()],
        };
        assert_eq!(
            resolve_override_expression("@user.id", Some(&principal)),
            json!("ada")
        );
        assert_eq!(
            resolve_override_expression("@user.roles", Some(&principal)),
            json!(["admin"])
        );
        assert_eq!(
            resolve_override_expression("@user.id", None),
            Value::Null
        );
    }

    #[test]
    fn resolves_literals_and_plain_strings() {
        assert_eq!(resolve_override_expression("42", None), json!(42));
        assert_eq!(resolve_override_expression("true", None), json!(true));
        assert_eq!(
            resolve_override_expression("reviewed", None),
            json!("reviewed")
        );
    }
}
