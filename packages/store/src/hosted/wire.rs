//! JSON shapes of the hosted REST endpoints.
//!
//! Documents travel as typed values (`{"stringValue": ..}`,
//! `{"timestampValue": ..}`, ...). [`encode_value`] and [`decode_value`] map
//! between those and the plain JSON fields the rest of the crate works with.
//! Timestamps become `{"seconds", "nanos"}` objects on the way in so ordering
//! and [`crate::CreatedAt`] see the same shape the in-process backend writes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::backend::{is_timestamp, timestamp_value, Document, Fields, FieldValue, NewDocument};
use crate::error::{BackendError, ErrorCode};
use crate::models::ServerTimestamp;
use crate::schema::{Direction, OrderBy};

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Identity endpoint messages (`INVALID_PASSWORD`, `WEAK_PASSWORD : ...`) as
/// client error code strings.
fn identity_code(message: &str) -> &'static str {
    let reason = message.split(" : ").next().unwrap_or_default().trim();
    match reason {
        "EMAIL_NOT_FOUND" => "auth/user-not-found",
        "INVALID_PASSWORD" => "auth/wrong-password",
        "INVALID_LOGIN_CREDENTIALS" => "auth/invalid-login-credentials",
        "INVALID_EMAIL" => "auth/invalid-email",
        "EMAIL_EXISTS" => "auth/email-already-in-use",
        "WEAK_PASSWORD" => "auth/weak-password",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "auth/too-many-requests",
        _ => "unknown",
    }
}

/// Error for a failed identity call.
pub(crate) fn identity_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = ErrorCode::parse(identity_code(&envelope.error.message));
            let code = match code {
                ErrorCode::Unknown => status_code(status),
                code => code,
            };
            BackendError::new(code, envelope.error.message)
        }
        Err(_) => BackendError::new(status_code(status), format!("HTTP {status}")),
    }
}

/// Error for a failed document or storage call. Canonical statuses such as
/// `PERMISSION_DENIED` map onto the client codes `permission-denied`, etc.
pub(crate) fn service_error(status: u16, body: &str) -> BackendError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope
                .error
                .status
                .as_deref()
                .map(|s| ErrorCode::parse(&s.to_ascii_lowercase().replace('_', "-")))
                .filter(|code| *code != ErrorCode::Unknown)
                .unwrap_or_else(|| status_code(status));
            BackendError::new(code, envelope.error.message)
        }
        Err(_) => BackendError::new(status_code(status), format!("HTTP {status}")),
    }
}

fn status_code(status: u16) -> ErrorCode {
    match status {
        401 | 403 => ErrorCode::PermissionDenied,
        404 => ErrorCode::NotFound,
        408 | 429 | 500..=599 => ErrorCode::Unavailable,
        _ => ErrorCode::Unknown,
    }
}

pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) if is_timestamp(map) => {
            let ts = ServerTimestamp {
                seconds: map.get("seconds").and_then(Value::as_i64).unwrap_or_default(),
                nanos: map
                    .get("nanos")
                    .and_then(Value::as_u64)
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or_default(),
            };
            match ts.to_datetime() {
                Some(at) => json!({ "timestampValue": at.to_rfc3339_opts(SecondsFormat::AutoSi, true) }),
                None => json!({ "nullValue": null }),
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

pub(crate) fn parse_timestamp(text: &str) -> Option<ServerTimestamp> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|at| ServerTimestamp::from_datetime(at.with_timezone(&Utc)))
}

pub(crate) fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|map| map.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "booleanValue" => inner.as_bool().map_or(Value::Null, Value::Bool),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map_or(Value::Null, Value::from),
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        // Non-finite doubles arrive as strings and have no JSON number form.
        "doubleValue" => inner.as_f64().map_or(Value::Null, Value::from),
        "stringValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "timestampValue" => inner
            .as_str()
            .and_then(parse_timestamp)
            .map_or(Value::Null, timestamp_value),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "geoPointValue" => inner.clone(),
        _ => Value::Null,
    }
}

pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Fields {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), decode_value(value)))
        .collect()
}

/// A document resource as the REST API returns it.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RawDocument {
    pub fn into_document(self) -> Document {
        let id = self
            .name
            .rsplit_once('/')
            .map_or(self.name.as_str(), |(_, id)| id)
            .to_string();
        Document {
            id,
            fields: decode_fields(&self.fields),
        }
    }
}

/// One row of a `runQuery` response stream.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryRow {
    #[serde(default)]
    pub document: Option<RawDocument>,
}

pub(crate) fn run_query_body(collection_id: &str, order: &OrderBy) -> Value {
    let direction = match order.direction {
        Direction::Ascending => "ASCENDING",
        Direction::Descending => "DESCENDING",
    };
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection_id }],
            "orderBy": [{ "field": { "fieldPath": order.field }, "direction": direction }],
        }
    })
}

/// Single-write commit that creates `name` and fills server timestamps from
/// the request time. Fails if the document already exists.
pub(crate) fn commit_body(name: &str, doc: &NewDocument) -> Value {
    let mut fields = Map::new();
    let mut transforms = Vec::new();
    for (field, value) in &doc.fields {
        match value {
            FieldValue::Value(v) => {
                fields.insert(field.clone(), encode_value(v));
            }
            FieldValue::ServerTimestamp => {
                transforms.push(json!({ "fieldPath": field, "setToServerValue": "REQUEST_TIME" }));
            }
        }
    }
    json!({
        "writes": [{
            "update": { "name": name, "fields": fields },
            "updateTransforms": transforms,
            "currentDocument": { "exists": false },
        }]
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
    commit_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<Value>,
}

impl CommitResponse {
    /// The resolved server timestamp, falling back to the commit time.
    pub fn server_time(&self) -> Option<ServerTimestamp> {
        self.write_results
            .iter()
            .flat_map(|result| &result.transform_results)
            .find_map(|value| value.get("timestampValue").and_then(Value::as_str))
            .and_then(parse_timestamp)
            .or_else(|| parse_timestamp(&self.commit_time))
    }
}

/// Identity endpoint response for sign-in and sign-up.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthResponse {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
}

/// Token endpoint response for a refresh.
#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
}

/// Object metadata from blob storage.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObjectMetadata {
    #[serde(default)]
    pub download_tokens: Option<String>,
}

impl ObjectMetadata {
    pub fn first_token(&self) -> Option<&str> {
        self.download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreatedAt, Post};

    #[test]
    fn decodes_a_post_document() {
        let raw: RawDocument = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/posts/abc",
            "fields": {
                "title": { "stringValue": "Hello" },
                "content": { "stringValue": "World" },
                "imageUrl": { "nullValue": null },
                "userId": { "stringValue": "u1" },
                "createdAt": { "timestampValue": "2023-11-14T22:13:20.000000500Z" },
            },
            "createTime": "2023-11-14T22:13:20.1Z",
        }))
        .unwrap();

        let doc = raw.into_document();
        assert_eq!(doc.id, "abc");
        let post = Post::from_document(&doc).unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.image_url, None);
        assert_eq!(
            post.created_at,
            Some(CreatedAt::Server(ServerTimestamp {
                seconds: 1_700_000_000,
                nanos: 500
            }))
        );
    }

    #[test]
    fn nested_values_survive_both_directions() {
        let plain = json!({
            "n": 42,
            "x": 1.5,
            "tags": ["a", true],
            "meta": { "at": { "seconds": 1_700_000_000, "nanos": 0 } },
        });
        let Value::Object(plain) = plain else { unreachable!() };

        let encoded = encode_fields(&plain);
        assert_eq!(encoded["n"], json!({ "integerValue": "42" }));
        assert_eq!(
            encoded["meta"]["mapValue"]["fields"]["at"],
            json!({ "timestampValue": "2023-11-14T22:13:20Z" })
        );
        assert_eq!(decode_fields(&encoded), plain);
    }

    #[test]
    fn commit_moves_server_timestamps_into_transforms() {
        let doc = NewDocument::new()
            .set("content", "hi")
            .set("userId", "u1")
            .server_timestamp("createdAt");
        let body = commit_body("projects/p/databases/(default)/documents/posts/a/comments/c", &doc);
        let write = &body["writes"][0];
        assert_eq!(write["update"]["fields"]["content"], json!({ "stringValue": "hi" }));
        assert!(write["update"]["fields"].get("createdAt").is_none());
        assert_eq!(
            write["updateTransforms"],
            json!([{ "fieldPath": "createdAt", "setToServerValue": "REQUEST_TIME" }])
        );
        assert_eq!(write["currentDocument"], json!({ "exists": false }));
    }

    #[test]
    fn commit_response_prefers_the_transform_result() {
        let response: CommitResponse = serde_json::from_value(json!({
            "writeResults": [{
                "updateTime": "2024-01-01T00:00:01Z",
                "transformResults": [{ "timestampValue": "2024-01-01T00:00:00.25Z" }],
            }],
            "commitTime": "2024-01-01T00:00:01Z",
        }))
        .unwrap();
        assert_eq!(
            response.server_time(),
            Some(ServerTimestamp {
                seconds: 1_704_067_200,
                nanos: 250_000_000
            })
        );
    }

    #[test]
    fn query_orders_by_the_requested_field() {
        let body = run_query_body("comments", &OrderBy::oldest_first());
        assert_eq!(
            body["structuredQuery"]["orderBy"][0],
            json!({ "field": { "fieldPath": "createdAt" }, "direction": "ASCENDING" })
        );
        assert_eq!(body["structuredQuery"]["from"][0]["collectionId"], "comments");
    }

    #[test]
    fn identity_errors_map_to_client_codes() {
        let body = r#"{"error":{"code":400,"message":"INVALID_PASSWORD","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(identity_error(400, body).code, ErrorCode::WrongPassword);

        let body = r#"{"error":{"code":400,"message":"WEAK_PASSWORD : Password should be at least 6 characters"}}"#;
        assert_eq!(identity_error(400, body).code, ErrorCode::WeakPassword);

        let body = r#"{"error":{"code":400,"message":"TOO_MANY_ATTEMPTS_TRY_LATER : Access disabled"}}"#;
        assert_eq!(identity_error(400, body).code, ErrorCode::TooManyRequests);

        assert_eq!(identity_error(503, "<html>").code, ErrorCode::Unavailable);
    }

    #[test]
    fn service_errors_use_the_canonical_status() {
        let body = r#"{"error":{"code":403,"message":"Missing or insufficient permissions.","status":"PERMISSION_DENIED"}}"#;
        let err = service_error(403, body);
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.message, "Missing or insufficient permissions.");

        let storage = r#"{"error":{"code":404,"message":"Not Found."}}"#;
        assert_eq!(service_error(404, storage).code, ErrorCode::NotFound);
    }

    #[test]
    fn first_download_token() {
        let meta: ObjectMetadata =
            serde_json::from_value(json!({ "name": "x", "downloadTokens": "t1,t2" })).unwrap();
        assert_eq!(meta.first_token(), Some("t1"));
        let meta: ObjectMetadata = serde_json::from_value(json!({ "name": "x" })).unwrap();
        assert_eq!(meta.first_token(), None);
    }
}
