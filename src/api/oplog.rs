//! Operational log
//!
//! One structured record per request with the request and response bodies.
//! The `password` form field and the `token` in the login response never
//! reach the log.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::UserId;

const MASK: &str = "***";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MASKED_FORM_FIELDS: &[&str] = &["password"];
const MASKED_RESPONSE_FIELDS: &[&str] = &["token"];

/// Paths whose response body carries a credential
const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoggedRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedResponse {
    pub body: Option<Value>,
    pub code: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalLog {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub time: DateTime<Utc>,
    pub level: &'static str,
    pub protocol: &'static str,
    pub host: String,
    pub path: String,
    pub method: String,
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub request: LoggedRequest,
    pub response: LoggedResponse,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl OperationalLog {
    pub fn new(host: String, path: String, method: String) -> Self {
        Self {
            kind: "OPERATIONAL",
            time: Utc::now(),
            level: "INFO",
            protocol: "http",
            host,
            path,
            method,
            user_id: None,
            request: LoggedRequest::default(),
            response: LoggedResponse {
                body: None,
                code: 0,
            },
            errors: Vec::new(),
        }
    }

    /// Capture the request body. Forms are decoded with sensitive fields
    /// masked; anything else must be JSON.
    pub fn with_request(mut self, content_type: Option<&str>, body: &[u8]) -> Self {
        if body.is_empty() {
            return self;
        }

        let is_form = content_type
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));

        if is_form {
            self.request.form = Some(masked_form(body));
        } else {
            match serde_json::from_slice(body) {
                Ok(value) => self.request.body = Some(value),
                Err(e) => self.errors.push(format!("request body is not JSON: {e}")),
            }
        }
        self
    }

    /// Capture the response status and body, masking credentials on login.
    pub fn with_response(mut self, status: StatusCode, body: &[u8]) -> Self {
        self.response.code = status.as_u16();
        if body.is_empty() {
            return self;
        }

        let value = serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).trim().to_string()));
        self.response.body = Some(if self.path == LOGIN_PATH {
            masked_response(value)
        } else {
            value
        });
        self
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }
}

/// Decode a urlencoded form into field -> list of values
fn masked_form(body: &[u8]) -> Map<String, Value> {
    let mut form = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let key = key.into_owned();
        let value = if MASKED_FORM_FIELDS.contains(&key.as_str()) {
            Value::String(MASK.to_string())
        } else {
            Value::String(value.into_owned())
        };
        match form.entry(key).or_insert_with(|| Value::Array(Vec::new())) {
            Value::Array(values) => values.push(value),
            other => *other = value,
        }
    }
    form
}

fn masked_response(mut value: Value) -> Value {
    if let Value::Object(fields) = &mut value {
        for name in MASKED_RESPONSE_FIELDS {
            if let Some(field) = fields.get_mut(*name) {
                *field = Value::String(MASK.to_string());
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log(path: &str) -> OperationalLog {
        OperationalLog::new("localhost:8000".to_string(), path.to_string(), "POST".to_string())
    }

    #[test]
    fn test_login_form_password_is_masked() {
        let entry = log("/login").with_request(
            Some("application/x-www-form-urlencoded"),
            b"username=alice&password=s%3Dcret",
        );

        let form = entry.request.form.unwrap();
        assert_eq!(form["username"], json!(["alice"]));
        assert_eq!(form["password"], json!(["***"]));
        assert!(entry.request.body.is_none());
    }

    #[test]
    fn test_login_token_is_masked() {
        let entry = log("/login").with_response(StatusCode::CREATED, br#"{"token":"abc.def.ghi"}"#);

        assert_eq!(entry.response.code, 201);
        assert_eq!(entry.response.body, Some(json!({ "token": "***" })));
    }

    #[test]
    fn test_other_bodies_are_kept() {
        let entry = log("/api/v1/transactions")
            .with_request(
                Some("application/json"),
                br#"{"senderBalanceId":1,"receiverBalanceId":2,"amount":"11.49"}"#,
            )
            .with_response(StatusCode::CREATED, br#"{"id":7,"amount":"11.49"}"#)
            .with_user(Some(1));

        assert_eq!(entry.request.body.unwrap()["amount"], "11.49");
        assert_eq!(entry.response.body.unwrap()["id"], 7);
        assert_eq!(entry.user_id, Some(1));
        assert!(entry.errors.is_empty());
    }

    #[test]
    fn test_non_json_request_is_reported() {
        let entry = log("/api/v1/transactions").with_request(Some("text/plain"), b"hello");
        assert!(entry.request.body.is_none());
        assert_eq!(entry.errors.len(), 1);
    }

    #[test]
    fn test_plain_text_response_is_kept_as_string() {
        let entry = log("/health").with_response(StatusCode::OK, b"OK");
        assert_eq!(entry.response.body, Some(json!("OK")));
    }

    #[test]
    fn test_serialized_shape() {
        let entry = log("/login").with_response(StatusCode::UNAUTHORIZED, b"");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["type"], "OPERATIONAL");
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["protocol"], "http");
        assert_eq!(json["response"]["code"], 401);
        assert!(json.get("userID").is_none());
        assert!(json.get("errors").is_none());
    }
}
