use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, multipart};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::{DEFAULT_API_URL, DEFAULT_UPLOAD_URL};
use crate::upload::UploadIo;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid upload part: {0}")]
    Multipart(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Multipart upload: `attributes` is sent as a JSON text field ahead of
    /// the file part. Always routed to the upload host.
    Upload { attributes: Value, upload: UploadIo },
}

/// A single call against the storage API. `path` is relative to the API root
/// (`files/12`, `folders/0/items`).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn upload(mut self, attributes: Value, upload: UploadIo) -> Self {
        self.body = RequestBody::Upload { attributes, upload };
        self
    }

    pub fn is_upload(&self) -> bool {
        matches!(self.body, RequestBody::Upload { .. })
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: StatusCode, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Vec::new())
    }
}

/// Request/response collaborator the entity layer talks through. Status codes
/// are returned as-is; mapping them to errors is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Default transport over HTTPS with a bearer access token.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    api_url: Url,
    upload_url: Url,
    token: String,
}

impl HttpTransport {
    pub fn new(token: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_base_urls(DEFAULT_API_URL, DEFAULT_UPLOAD_URL, token)
    }

    pub fn with_base_urls(
        api_url: &str,
        upload_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            http: Client::new(),
            api_url: parse_base(api_url)?,
            upload_url: parse_base(upload_url)?,
            token: token.into(),
        })
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let base = if request.is_upload() {
            &self.upload_url
        } else {
            &self.api_url
        };
        let mut url = base.join(request.path.trim_start_matches('/'))?;
        if !request.query.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &request.query {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.endpoint(&request)?;
        let builder = self
            .http
            .request(request.method, url)
            .header("Authorization", self.auth_header_value());
        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Upload { attributes, upload } => {
                let part = multipart::Part::bytes(upload.content)
                    .file_name(upload.filename)
                    .mime_str(&upload.mime_type)
                    .map_err(TransportError::Multipart)?;
                let form = multipart::Form::new()
                    .text("attributes", attributes.to_string())
                    .part("file", part);
                builder.multipart(form)
            }
        };
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}

// `Url::join` drops the last path segment unless the base ends with a slash.
fn parse_base(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}
