// Inbound command / outbound result model

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header name carrying the JSON content type
pub const CONTENT_TYPE: &str = "Content-Type";

/// JSON media type (required by the Server's parser)
pub const APPLICATION_JSON: &str = "application/json";

/// HTTP method of an inbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

impl std::str::FromStr for Method {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(DomainError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Inbound routed request (immutable once received)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub method: Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RouteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Routed result: status, headers and optional body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteResult {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl RouteResult {
    /// Result without a body
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Result with a JSON body; always carries the JSON content type
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string());
        Self {
            status,
            headers,
            body: Some(body.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Inbound command envelope ("abridged task")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    pub id: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Outbound result envelope ("abridged result")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub id: String,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    pub service_id: String,
}

impl ResultEnvelope {
    pub fn from_result(id: impl Into<String>, service_id: impl Into<String>, result: RouteResult) -> Self {
        Self {
            id: id.into(),
            status: result.status,
            headers: result.headers,
            body: result.body,
            service_id: service_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
        assert!("PATCH".parse::<Method>().is_err());
    }

    #[test]
    fn test_json_result_sets_content_type() {
        let result = RouteResult::json(200, &serde_json::json!({"ok": true}));
        assert_eq!(
            result.headers.get(CONTENT_TYPE).map(String::as_str),
            Some(APPLICATION_JSON)
        );
        assert_eq!(result.body.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn test_result_envelope_wire_names() {
        let envelope = ResultEnvelope::from_result("t-1", "svc", RouteResult::empty(404));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["serviceId"], "svc");
        assert_eq!(value["status"], 404);
    }

    #[test]
    fn test_task_envelope_defaults() {
        let envelope: TaskEnvelope =
            serde_json::from_str(r#"{"id":"1","method":"GET","url":"/ns/status"}"#).unwrap();
        assert!(envelope.headers.is_empty());
        assert!(envelope.body.is_none());
    }
}
