use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::document::{Document, Fields};
use crate::models::session::Session;
use crate::models::settings::Settings;
use super::traits::DocumentStore;

const BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Document store backed by the hosted documents REST API.
///
/// - **Endpoints**: `documents:runQuery`, `documents/{collection}`,
///   `documents/{collection}/{id}`
/// - **Auth**: the session's id token as a bearer token; anonymous calls
///   go out without one and are subject to the backend's rules.
///
/// Values are stored in the API's typed form (`stringValue`, `mapValue`, ...);
/// [`encode_value`] and [`decode_value`] translate to and from plain JSON.
pub struct FirestoreStore {
    client: Client,
    documents_url: String,
}

impl FirestoreStore {
    pub fn new(settings: &Settings) -> Result<Self, CoreError> {
        settings.validate_remote()?;
        let builder = Client::builder();
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        Ok(Self {
            client: builder.build().unwrap_or_else(|_| Client::new()),
            documents_url: format!(
                "{BASE_URL}/projects/{}/databases/{}/documents",
                settings.project_id, settings.database_id
            ),
        })
    }

    fn authorized(request: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
        match session {
            Some(s) if !s.id_token().is_empty() => request.bearer_auth(s.id_token()),
            _ => request,
        }
    }

    /// Turn a non-success response into the matching error.
    async fn check(resp: Response, what: &str) -> Result<Response, CoreError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<ErrorEnvelope>()
            .await
            .map(|e| e.error.message)
            .unwrap_or_default();
        tracing::warn!(%status, what, message = %message, "document request rejected");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CoreError::Unauthorized),
            _ => Err(CoreError::StoreUnavailable(format!(
                "{what} failed with HTTP {status}: {message}"
            ))),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<Value>,
}

// ── Typed value codec ───────────────────────────────────────────────

/// Plain JSON → typed API value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // 64-bit integers travel as strings
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Plain JSON object → typed `fields` map.
pub fn encode_fields(fields: &Fields) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    Value::Object(encoded)
}

/// Typed API value → plain JSON.
///
/// Timestamps, references and bytes come back as strings.
pub fn decode_value(value: &Value) -> Result<Value, CoreError> {
    let malformed = || CoreError::Deserialization(format!("Malformed typed value: {value}"));
    let obj = value.as_object().ok_or_else(malformed)?;
    let (kind, inner) = obj.iter().next().ok_or_else(malformed)?;

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().ok_or_else(malformed)?),
        "integerValue" => {
            let n: i64 = match inner {
                Value::String(s) => s.parse().map_err(|_| malformed())?,
                Value::Number(n) => n.as_i64().ok_or_else(malformed)?,
                _ => return Err(malformed()),
            };
            Value::Number(n.into())
        }
        "doubleValue" => {
            let f = inner.as_f64().ok_or_else(malformed)?;
            Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
        }
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            Value::String(inner.as_str().ok_or_else(malformed)?.to_string())
        }
        "arrayValue" => {
            let items = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => return Err(malformed()),
                None => Vec::new(),
            };
            Value::Array(items)
        }
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))?),
        "geoPointValue" => inner.clone(),
        _ => return Err(malformed()),
    };
    Ok(decoded)
}

/// Typed `fields` map (possibly absent) → plain JSON object.
pub fn decode_fields(fields: Option<&Value>) -> Result<Fields, CoreError> {
    match fields {
        None => Ok(Fields::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| decode_value(v).map(|decoded| (k.clone(), decoded)))
            .collect(),
        Some(other) => Err(CoreError::Deserialization(format!(
            "Document fields must be a map, got {other}"
        ))),
    }
}

/// A full API document (`name`, `fields`, timestamps) → [`Document`].
/// The id is the last segment of the resource name.
pub fn decode_document(raw: &Value) -> Result<Document, CoreError> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::Deserialization("Document without a name".into()))?;
    let id = name.rsplit('/').next().unwrap_or(name);
    Ok(Document::new(id, decode_fields(raw.get("fields"))?))
}

/// Request body for an equality query on one field.
pub fn equality_query(collection: &str, field_path: &str, equals: &Value) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": field_path },
                    "op": "EQUAL",
                    "value": encode_value(equals),
                }
            }
        }
    })
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl DocumentStore for FirestoreStore {
    fn name(&self) -> &str {
        "Firestore"
    }

    async fn query(
        &self,
        session: Option<&Session>,
        collection: &str,
        field_path: &str,
        equals: &Value,
    ) -> Result<Vec<Document>, CoreError> {
        let url = format!("{}:runQuery", self.documents_url);
        let request = self
            .client
            .post(&url)
            .json(&equality_query(collection, field_path, equals));
        let resp = Self::authorized(request, session).send().await?;
        let items: Vec<RunQueryItem> = Self::check(resp, "query").await?.json().await?;

        // Items without a document only carry read metadata.
        items
            .iter()
            .filter_map(|item| item.document.as_ref())
            .map(decode_document)
            .collect()
    }

    async fn insert(
        &self,
        session: Option<&Session>,
        collection: &str,
        fields: Fields,
    ) -> Result<String, CoreError> {
        let url = format!("{}/{collection}", self.documents_url);
        let request = self
            .client
            .post(&url)
            .json(&json!({ "fields": encode_fields(&fields) }));
        let resp = Self::authorized(request, session).send().await?;
        let created: Value = Self::check(resp, "insert").await?.json().await?;
        Ok(decode_document(&created)?.id)
    }

    async fn set(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), CoreError> {
        // PATCH without an update mask replaces the whole document, creating
        // it when missing.
        let url = format!("{}/{collection}/{id}", self.documents_url);
        let request = self
            .client
            .patch(&url)
            .json(&json!({ "fields": encode_fields(&fields) }));
        let resp = Self::authorized(request, session).send().await?;
        Self::check(resp, "set").await?;
        Ok(())
    }

    async fn delete(
        &self,
        session: Option<&Session>,
        collection: &str,
        id: &str,
    ) -> Result<(), CoreError> {
        let url = format!("{}/{collection}/{id}", self.documents_url);
        let request = self.client.delete(&url);
        let resp = Self::authorized(request, session).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(resp, "delete").await?;
        Ok(())
    }
}
