//! Path-prefix route table.
//!
//! Maps an inbound `(method, path, body)` to the service that owns it and the
//! message pattern to call there. Entries are tried in table order and the
//! first match wins, so more specific prefixes must be listed first.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use centermesh::{ChannelRegistry, MeshError, RpcError};

/// One row of the route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Path prefix, e.g. `/admin/user`
    pub prefix: String,
    /// Service owning the prefix, as named in the channel registry
    pub service: String,
    /// Pattern namespace, e.g. `user` for `user.create`
    pub namespace: String,
}

impl RouteEntry {
    pub fn new(prefix: impl Into<String>, service: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
            namespace: namespace.into(),
        }
    }

    /// Path remainder after this prefix, if the prefix matches on a segment boundary
    fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.trim_end_matches('/'))?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

/// The admin entries precede their plain counterparts
pub fn default_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new("/admin/user", "user_service", "user"),
        RouteEntry::new("/admin/center", "center_service", "center"),
        RouteEntry::new("/admin/task", "task_service", "task"),
        RouteEntry::new("/admin/front", "front_service", "front"),
        RouteEntry::new("/user", "user_service", "user"),
        RouteEntry::new("/center", "center_service", "center"),
        RouteEntry::new("/task", "task_service", "task"),
        RouteEntry::new("/front", "front_service", "front"),
    ]
}

/// A resolved call
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedCall {
    pub service: String,
    pub pattern: String,
    pub payload: Value,
}

/// Ordered, read-only route table
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(default_routes())
    }
}

impl RouteTable {
    pub fn new(entries: Vec<RouteEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Check every entry names a service present in `channels`
    pub fn validate(&self, channels: &ChannelRegistry) -> Result<(), MeshError> {
        for entry in &self.entries {
            if !entry.prefix.starts_with('/') {
                return Err(MeshError::config_error(format!(
                    "route prefix '{}' must start with '/'",
                    entry.prefix
                )));
            }
            channels.require(&entry.service)?;
        }
        Ok(())
    }

    /// Resolve a request to its service, pattern and payload.
    ///
    /// The body is forwarded only for POST and PUT.
    pub fn route(&self, method: &Method, path: &str, body: Option<Value>) -> Result<RoutedCall, RpcError> {
        let unroutable = || RpcError::Unroutable {
            target: format!("{} {}", method, path),
        };

        let (entry, rest) = self
            .entries
            .iter()
            .find_map(|entry| entry.strip(path).map(|rest| (entry, rest)))
            .ok_or_else(unroutable)?;

        let carries_body = *method == Method::POST || *method == Method::PUT;
        let body = if carries_body { body.unwrap_or(Value::Null) } else { Value::Null };
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        let (operation, payload) = match segments.as_slice() {
            [] => match *method {
                Method::POST => ("create".to_string(), body),
                Method::GET => ("getAll".to_string(), Value::Null),
                _ => return Err(unroutable()),
            },
            [id] if is_identifier(id) => match *method {
                Method::GET => ("get".to_string(), id_value(id)),
                Method::PUT => ("update".to_string(), json!({ "id": id_value(id), "data": body })),
                Method::DELETE => ("delete".to_string(), id_value(id)),
                _ => return Err(unroutable()),
            },
            [action] => {
                let payload = if carries_body { body } else { Value::Null };
                (camel_case(action), payload)
            }
            [action, id] if !is_identifier(action) => {
                let payload = match body {
                    Value::Null => id_value(id),
                    data => json!({ "id": id_value(id), "data": data }),
                };
                (camel_case(action), payload)
            }
            _ => return Err(unroutable()),
        };

        let pattern = format!("{}.{}", entry.namespace, operation);
        debug!("Routed {} {} to {} ({})", method, path, entry.service, pattern);

        Ok(RoutedCall {
            service: entry.service.clone(),
            pattern,
            payload,
        })
    }
}

/// Record ids carry digits; action names never do
fn is_identifier(segment: &str) -> bool {
    segment.bytes().any(|b| b.is_ascii_digit())
}

fn id_value(segment: &str) -> Value {
    segment
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(segment.to_string()))
}

/// `create-task` -> `createTask`; already camel-cased names pass through
fn camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper = false;
    for c in segment.chars() {
        if c == '-' || c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use centermesh::channel::default_channels;

    fn table() -> RouteTable {
        RouteTable::default()
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::new(vec![
            RouteEntry::new("/admin/user", "S1", "admin"),
            RouteEntry::new("/user", "S2", "user"),
        ]);

        let call = table.route(&Method::GET, "/admin/user/5", None).unwrap();
        assert_eq!(call.service, "S1");
        assert_eq!(table.route(&Method::GET, "/user/5", None).unwrap().service, "S2");
    }

    #[test]
    fn test_table_order_is_the_contract() {
        let table = RouteTable::new(vec![
            RouteEntry::new("/admin", "S2", "admin"),
            RouteEntry::new("/admin/user", "S1", "user"),
        ]);

        // The broader prefix is listed first, so it shadows the specific one
        let call = table.route(&Method::GET, "/admin/user/5", None).unwrap();
        assert_eq!(call.service, "S2");
        assert_eq!(call.pattern, "admin.user");
        assert_eq!(call.payload, json!(5));
    }

    #[test]
    fn test_prefix_matches_on_segment_boundary() {
        assert!(table().route(&Method::GET, "/username", None).is_err());
        assert_eq!(table().route(&Method::GET, "/user", None).unwrap().pattern, "user.getAll");
        assert_eq!(table().route(&Method::GET, "/user/", None).unwrap().pattern, "user.getAll");
    }

    #[test]
    fn test_crud_shapes() {
        let body = json!({"email": "a@b.com"});

        let create = table().route(&Method::POST, "/user", Some(body.clone())).unwrap();
        assert_eq!(
            create,
            RoutedCall {
                service: "user_service".to_string(),
                pattern: "user.create".to_string(),
                payload: body.clone(),
            }
        );

        let get = table().route(&Method::GET, "/center/7", None).unwrap();
        assert_eq!((get.service.as_str(), get.pattern.as_str()), ("center_service", "center.get"));
        assert_eq!(get.payload, json!(7));

        let update = table().route(&Method::PUT, "/user/3", Some(body.clone())).unwrap();
        assert_eq!(update.pattern, "user.update");
        assert_eq!(update.payload, json!({"id": 3, "data": {"email": "a@b.com"}}));

        let delete = table().route(&Method::DELETE, "/front/9", None).unwrap();
        assert_eq!(delete.pattern, "front.delete");
        assert_eq!(delete.payload, json!(9));
    }

    #[test]
    fn test_action_routes() {
        let body = json!({"title": "wash"});
        let call = table().route(&Method::POST, "/task/create-task", Some(body.clone())).unwrap();
        assert_eq!(call.service, "task_service");
        assert_eq!(call.pattern, "task.createTask");
        assert_eq!(call.payload, body);

        let call = table().route(&Method::GET, "/front/front-for-task", None).unwrap();
        assert_eq!(call.pattern, "front.frontForTask");
        assert_eq!(call.payload, Value::Null);

        let call = table().route(&Method::GET, "/center/getCenterWithFrontId/4", None).unwrap();
        assert_eq!(call.pattern, "center.getCenterWithFrontId");
        assert_eq!(call.payload, json!(4));
    }

    #[test]
    fn test_action_id_is_kept_alongside_body() {
        let call = table().route(&Method::POST, "/front/add-task-length/5", None).unwrap();
        assert_eq!(call.pattern, "front.addTaskLength");
        assert_eq!(call.payload, json!(5));

        let body = json!({"length": 3});
        let call = table()
            .route(&Method::PUT, "/front/update-length/5", Some(body.clone()))
            .unwrap();
        assert_eq!(call.pattern, "front.updateLength");
        assert_eq!(call.payload, json!({"id": 5, "data": body}));
    }

    #[test]
    fn test_admin_routes_to_same_service() {
        let call = table().route(&Method::GET, "/admin/user/5", None).unwrap();
        assert_eq!(call.service, "user_service");
        assert_eq!(call.pattern, "user.get");
    }

    #[test]
    fn test_body_dropped_for_get_and_delete() {
        let call = table().route(&Method::GET, "/task/list", Some(json!({"x": 1}))).unwrap();
        assert_eq!(call.payload, Value::Null);
    }

    #[test]
    fn test_non_numeric_id_stays_a_string() {
        let call = table().route(&Method::GET, "/user/a1b2", None).unwrap();
        assert_eq!(call.payload, json!("a1b2"));
    }

    #[test]
    fn test_unroutable_shapes() {
        for (method, path) in [
            (Method::GET, "/unknown/1"),
            (Method::DELETE, "/user"),
            (Method::POST, "/user/5"),
            (Method::GET, "/user/a/b/c"),
            (Method::GET, "/"),
        ] {
            match table().route(&method, path, None) {
                Err(RpcError::Unroutable { target }) => assert_eq!(target, format!("{} {}", method, path)),
                other => panic!("expected {} {} to be unroutable, got {:?}", method, path, other),
            }
        }
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("create-task"), "createTask");
        assert_eq!(camel_case("add_best_task_to_front"), "addBestTaskToFront");
        assert_eq!(camel_case("getAll"), "getAll");
    }

    #[test]
    fn test_validate_against_channels() {
        let channels = ChannelRegistry::new(default_channels()).unwrap();
        table().validate(&channels).unwrap();

        let bad = RouteTable::new(vec![RouteEntry::new("/billing", "billing_service", "billing")]);
        assert!(matches!(bad.validate(&channels), Err(MeshError::ServiceNotFound { .. })));

        let relative = RouteTable::new(vec![RouteEntry::new("user", "user_service", "user")]);
        assert!(matches!(relative.validate(&channels), Err(MeshError::Config(_))));
    }
}
