//! Inbound request body parsing.
//!
//! A body is parsed by content type into exactly one of JSON, multipart form
//! or URL-encoded form. Unknown content types fall back to URL-encoded form and
//! empty bodies yield an empty field map.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use serde_json::{Map, Value};
use thiserror::Error;

/// Upper bound for buffered bodies.
pub const BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BodyError {
    #[error("malformed request body: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<UploadedFile>,
    },
    Form(Vec<(String, String)>),
}

impl Default for ParsedBody {
    fn default() -> Self {
        ParsedBody::Form(Vec::new())
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl ParsedBody {
    pub async fn from_request(req: Request) -> Result<Self, BodyError> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if content_type.starts_with("multipart/form-data") {
            return Self::multipart(req).await;
        }

        let bytes = axum::body::to_bytes(req.into_body(), BODY_LIMIT)
            .await
            .map_err(|e| BodyError::Malformed(e.to_string()))?;

        if content_type.starts_with("application/json") {
            Self::json(&bytes)
        } else {
            Self::form(&bytes)
        }
    }

    pub fn json(bytes: &[u8]) -> Result<Self, BodyError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ParsedBody::Json(Value::Object(Map::new())));
        }
        serde_json::from_slice(bytes)
            .map(ParsedBody::Json)
            .map_err(|e| BodyError::Malformed(e.to_string()))
    }

    pub fn form(bytes: &[u8]) -> Result<Self, BodyError> {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
            .map(ParsedBody::Form)
            .map_err(|e| BodyError::Malformed(e.to_string()))
    }

    async fn multipart(req: Request) -> Result<Self, BodyError> {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| BodyError::Malformed(e.body_text()))?;

        let mut fields = Vec::new();
        let mut files = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| BodyError::Malformed(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| BodyError::Malformed(e.body_text()))?;

            if file_name.is_some() {
                files.push(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    bytes,
                });
            } else {
                fields.push((name, String::from_utf8_lossy(&bytes).into_owned()));
            }
        }
        Ok(ParsedBody::Multipart { fields, files })
    }

    /// Value of a scalar field, as text.
    pub fn field(&self, name: &str) -> Option<String> {
        match self {
            ParsedBody::Json(Value::Object(map)) => map.get(name).and_then(scalar_text),
            ParsedBody::Json(_) => None,
            ParsedBody::Multipart { fields, .. } | ParsedBody::Form(fields) => {
                fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
            }
        }
    }

    /// Scalar fields flattened to pairs, as sent in a query string.
    pub fn scalar_fields(&self) -> Vec<(String, String)> {
        match self {
            ParsedBody::Json(Value::Object(map)) => map
                .iter()
                .filter_map(|(k, v)| scalar_text(v).map(|v| (k.clone(), v)))
                .collect(),
            ParsedBody::Json(_) => Vec::new(),
            ParsedBody::Multipart { fields, .. } | ParsedBody::Form(fields) => fields.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParsedBody::Json(_) => "json",
            ParsedBody::Multipart { .. } => "multipart",
            ParsedBody::Form(_) => "form",
        }
    }
}
