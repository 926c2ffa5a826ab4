//! Write requests as submitted in a bulk call.
//!
//! Each request is encoded as `{method, api, payload}`, matching the backing
//! store's bulk-write contract exactly.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{AppId, RecordId, Revision};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// API path for single-record writes.
pub const RECORD_API: &str = "/record";

/// API path for multi-record deletes.
pub const RECORDS_API: &str = "/records";

/// HTTP method of a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Update.
    Put,
    /// Delete.
    Delete,
}

impl HttpMethod {
    /// Returns the method name as sent on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parses a method name.
    pub fn parse(name: &str) -> ProtocolResult<Self> {
        match name {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ProtocolError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A field/value pair identifying a record by a unique field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateKey {
    /// Field code.
    pub field: String,
    /// Value the field must hold.
    pub value: Value,
}

impl UpdateKey {
    /// Creates an update key.
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Resolved target of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    /// Target by record id.
    Id(RecordId),
    /// Target by unique field value.
    UpdateKey(UpdateKey),
}

/// Caller-supplied target of an update: an id, an update key, or both.
///
/// When both are given the id wins, as with the store API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateTarget {
    /// Record id.
    pub id: Option<RecordId>,
    /// Update key.
    pub update_key: Option<UpdateKey>,
}

impl UpdateTarget {
    /// Targets a record by id.
    pub fn id(id: impl Into<RecordId>) -> Self {
        Self {
            id: Some(id.into()),
            update_key: None,
        }
    }

    /// Targets a record by update key.
    pub fn update_key(key: UpdateKey) -> Self {
        Self {
            id: None,
            update_key: Some(key),
        }
    }

    /// Resolves to exactly one key, or `None` when neither was supplied.
    #[must_use]
    pub fn resolve(&self) -> Option<RecordKey> {
        match (&self.id, &self.update_key) {
            (Some(id), _) => Some(RecordKey::Id(id.clone())),
            (None, Some(key)) => Some(RecordKey::UpdateKey(key.clone())),
            (None, None) => None,
        }
    }
}

/// One record to delete, with an optional known revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteTarget {
    /// Record id.
    pub id: RecordId,
    /// Revision the caller already knows, if any.
    pub revision: Option<Revision>,
}

impl DeleteTarget {
    /// Creates a target without a revision.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            revision: None,
        }
    }

    /// Attaches a known revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<Revision>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

/// A write staged for a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    /// Create a record.
    Create {
        /// Target app.
        app: AppId,
        /// Record to add.
        record: Record,
    },
    /// Update a record, conditioned on its revision.
    Update {
        /// Target app.
        app: AppId,
        /// New field values.
        record: Record,
        /// Record id or update key.
        key: RecordKey,
        /// Revision the record must still have.
        revision: Revision,
    },
    /// Delete records, each conditioned on its revision.
    Delete {
        /// Target app.
        app: AppId,
        /// Record ids, paired positionally with `revisions`.
        ids: Vec<RecordId>,
        /// Revisions, paired positionally with `ids`.
        revisions: Vec<Revision>,
    },
}

impl WriteRequest {
    /// Creates a create request.
    pub fn create(app: AppId, record: Record) -> Self {
        WriteRequest::Create { app, record }
    }

    /// Creates an update request.
    ///
    /// When targeting by update key, the key field is stripped from the
    /// record so the request does not rewrite it.
    pub fn update(app: AppId, record: Record, key: RecordKey, revision: Revision) -> Self {
        let record = match &key {
            RecordKey::UpdateKey(k) => record.without_field(&k.field),
            RecordKey::Id(_) => record,
        };
        WriteRequest::Update {
            app,
            record,
            key,
            revision,
        }
    }

    /// Creates a delete request from `(id, revision)` pairs.
    pub fn delete(app: AppId, pairs: Vec<(RecordId, Revision)>) -> Self {
        let (ids, revisions) = pairs.into_iter().unzip();
        WriteRequest::Delete {
            app,
            ids,
            revisions,
        }
    }

    /// Returns the target app.
    #[must_use]
    pub fn app(&self) -> &AppId {
        match self {
            WriteRequest::Create { app, .. }
            | WriteRequest::Update { app, .. }
            | WriteRequest::Delete { app, .. } => app,
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        match self {
            WriteRequest::Create { .. } => HttpMethod::Post,
            WriteRequest::Update { .. } => HttpMethod::Put,
            WriteRequest::Delete { .. } => HttpMethod::Delete,
        }
    }

    /// Returns the API path.
    #[must_use]
    pub fn api(&self) -> &'static str {
        match self {
            WriteRequest::Create { .. } | WriteRequest::Update { .. } => RECORD_API,
            WriteRequest::Delete { .. } => RECORDS_API,
        }
    }

    /// Encodes the request payload.
    ///
    /// Records are encoded without their markers.
    pub fn payload(&self) -> ProtocolResult<Value> {
        let payload = match self {
            WriteRequest::Create { app, record } => json!({
                "app": app,
                "record": serde_json::to_value(&record.fields)?,
            }),
            WriteRequest::Update {
                app,
                record,
                key,
                revision,
            } => {
                let mut map = Map::new();
                map.insert("app".into(), json!(app));
                map.insert("record".into(), serde_json::to_value(&record.fields)?);
                match key {
                    RecordKey::Id(id) => map.insert("id".into(), json!(id)),
                    RecordKey::UpdateKey(k) => map.insert("updateKey".into(), serde_json::to_value(k)?),
                };
                map.insert("revision".into(), json!(revision));
                Value::Object(map)
            }
            WriteRequest::Delete {
                app,
                ids,
                revisions,
            } => json!({
                "app": app,
                "ids": ids,
                "revisions": revisions,
            }),
        };
        Ok(payload)
    }

    /// Encodes to `{method, api, payload}`.
    pub fn encode(&self) -> ProtocolResult<Value> {
        self.encode_with_prefix("")
    }

    /// Encodes with the API path prefixed, e.g. by a versioned base path.
    pub fn encode_with_prefix(&self, api_prefix: &str) -> ProtocolResult<Value> {
        self.encode_with_affixes(api_prefix, "")
    }

    /// Encodes with the API path wrapped in a prefix and a suffix.
    pub fn encode_with_affixes(&self, api_prefix: &str, api_suffix: &str) -> ProtocolResult<Value> {
        Ok(json!({
            "method": self.method().as_str(),
            "api": format!("{}{}{}", api_prefix, self.api(), api_suffix),
            "payload": self.payload()?,
        }))
    }

    /// Decodes from `{method, api, payload}`.
    pub fn decode(value: &Value) -> ProtocolResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid_structure("expected object for WriteRequest"))?;

        let method = map
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::invalid_structure("missing method"))?;
        let payload = map
            .get("payload")
            .and_then(Value::as_object)
            .ok_or_else(|| ProtocolError::invalid_structure("missing payload"))?;

        let app: AppId = payload
            .get("app")
            .map(id_from_value)
            .ok_or_else(|| ProtocolError::invalid_structure("missing app"))??;

        match HttpMethod::parse(method)? {
            HttpMethod::Post => Ok(WriteRequest::Create {
                app,
                record: record_from_payload(payload)?,
            }),
            HttpMethod::Put => {
                let key = if let Some(id) = payload.get("id") {
                    RecordKey::Id(id_from_value(id)?)
                } else if let Some(k) = payload.get("updateKey") {
                    RecordKey::UpdateKey(serde_json::from_value(k.clone())?)
                } else {
                    return Err(ProtocolError::invalid_structure(
                        "update needs id or updateKey",
                    ));
                };
                let revision = payload
                    .get("revision")
                    .map(id_from_value)
                    .ok_or_else(|| ProtocolError::invalid_structure("missing revision"))??;
                Ok(WriteRequest::Update {
                    app,
                    record: record_from_payload(payload)?,
                    key,
                    revision,
                })
            }
            HttpMethod::Delete => {
                let ids: Vec<RecordId> = list_from_payload(payload, "ids")?;
                let revisions: Vec<Revision> = list_from_payload(payload, "revisions")?;
                if ids.len() != revisions.len() {
                    return Err(ProtocolError::invalid_structure(
                        "ids and revisions differ in length",
                    ));
                }
                Ok(WriteRequest::Delete {
                    app,
                    ids,
                    revisions,
                })
            }
            HttpMethod::Get => Err(ProtocolError::UnsupportedMethod(method.to_string())),
        }
    }
}

/// Accepts ids encoded either as JSON strings or numbers.
fn id_from_value<T: From<String>>(value: &Value) -> ProtocolResult<T> {
    match value {
        Value::String(s) => Ok(T::from(s.clone())),
        Value::Number(n) => Ok(T::from(n.to_string())),
        _ => Err(ProtocolError::invalid_structure("id must be string or number")),
    }
}

fn record_from_payload(payload: &Map<String, Value>) -> ProtocolResult<Record> {
    let fields = payload
        .get("record")
        .ok_or_else(|| ProtocolError::invalid_structure("missing record"))?;
    Ok(Record {
        id: None,
        revision: None,
        fields: serde_json::from_value(fields.clone())?,
    })
}

fn list_from_payload<T: From<String>>(
    payload: &Map<String, Value>,
    name: &str,
) -> ProtocolResult<Vec<T>> {
    payload
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| ProtocolError::invalid_structure(format!("missing {name}")))?
        .iter()
        .map(id_from_value)
        .collect()
}
