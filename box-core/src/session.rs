use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::{ClientConfig, DEFAULT_PAGE_SIZE};
use crate::entity::{Data, ItemKind};
use crate::error::BoxError;
use crate::file::File;
use crate::folder::{Folder, FolderRef, Item};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::upload::UploadIo;

pub const ROOT_FOLDER_ID: &str = "0";

/// Explicit handle on one transport. Cheap to clone; every entity carries a
/// clone so it can fetch its own metadata.
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    page_size: u32,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct EntryPage {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    entries: Vec<Data>,
}

impl Session {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_arc(Arc::new(transport))
    }

    pub fn from_arc(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, BoxError> {
        let transport = HttpTransport::with_base_urls(
            &config.api_url,
            &config.upload_url,
            config.access_token.clone(),
        )?;
        Ok(Self::new(transport).with_page_size(config.page_size))
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub async fn root(&self) -> Result<Folder, BoxError> {
        self.folder(ROOT_FOLDER_ID).await
    }

    pub async fn folder(&self, id: &str) -> Result<Folder, BoxError> {
        let data = self.get_object(&format!("folders/{id}")).await?;
        let parent = parent_of(&data);
        Folder::from_data(self.clone(), data, parent)
    }

    pub async fn file(&self, id: &str) -> Result<File, BoxError> {
        let data = self.get_object(&format!("files/{id}")).await?;
        let parent = parent_of(&data);
        File::from_data(self.clone(), data, parent)
    }

    /// Resolves a slash separated path below the root folder, one listing per
    /// segment.
    pub async fn folder_by_path(&self, path: &str) -> Result<Folder, BoxError> {
        let mut current = self.root().await?;
        for segment in segments(path) {
            current = self
                .child(&current, segment, ItemKind::Folder)
                .await?
                .into_folder()
                .ok_or_else(|| not_found(path))?;
        }
        Ok(current)
    }

    pub async fn file_by_path(&self, path: &str) -> Result<File, BoxError> {
        let (dir, name) = match path.trim_matches('/').rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path.trim_matches('/')),
        };
        let folder = self.folder_by_path(dir).await?;
        self.child(&folder, name, ItemKind::File)
            .await?
            .into_file()
            .ok_or_else(|| not_found(path))
    }

    async fn child(&self, folder: &Folder, name: &str, kind: ItemKind) -> Result<Item, BoxError> {
        folder
            .items()
            .await?
            .into_iter()
            .find(|item| item.kind() == kind && item.name() == Some(name))
            .ok_or_else(|| not_found(name))
    }

    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse, BoxError> {
        let method = request.method.clone();
        let path = request.path.clone();
        let response = self.transport.perform(request).await?;
        tracing::debug!(%method, %path, status = %response.status, "box api request");
        if response.status.is_success() {
            Ok(response)
        } else {
            let body = String::from_utf8_lossy(&response.body).into_owned();
            Err(BoxError::from_status(response.status, body))
        }
    }

    pub(crate) async fn send_json(&self, request: ApiRequest) -> Result<Value, BoxError> {
        let response = self.send(request).await?;
        if response.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&response.body)?)
    }

    pub(crate) async fn send_object(&self, request: ApiRequest) -> Result<Data, BoxError> {
        match self.send_json(request).await? {
            Value::Object(data) => Ok(data),
            _ => Err(BoxError::MissingField("id")),
        }
    }

    pub(crate) async fn get_object(&self, path: &str) -> Result<Data, BoxError> {
        self.send_object(ApiRequest::get(path)).await
    }

    /// Every entry of a paged collection endpoint, following `offset` until
    /// `total_count` is reached.
    pub(crate) async fn list_entries(&self, path: &str) -> Result<Vec<Data>, BoxError> {
        let page_size = self.page_size.max(1);
        let mut offset = 0u64;
        let mut entries = Vec::new();
        loop {
            let request = ApiRequest::get(path)
                .query("limit", page_size.to_string())
                .query("offset", offset.to_string());
            let page: EntryPage = serde_json::from_value(self.send_json(request).await?)?;
            let received = page.entries.len() as u64;
            offset = offset.saturating_add(received);
            entries.extend(page.entries);
            if received == 0 || offset >= page.total_count {
                break;
            }
        }
        Ok(entries)
    }

    pub(crate) async fn list_items(&self, folder_id: &str) -> Result<Vec<Data>, BoxError> {
        self.list_entries(&format!("folders/{folder_id}/items"))
            .await
    }

    /// Uploads a new file named `name` into `folder_id` and returns the
    /// created entry.
    pub(crate) async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        upload: UploadIo,
    ) -> Result<Data, BoxError> {
        let attributes = json!({ "name": name, "parent": { "id": folder_id } });
        let request = ApiRequest::post("files/content").upload(attributes, upload);
        first_entry(self.send_json(request).await?)
    }

    /// Replaces the content of `file_id`, keeping its identity.
    pub(crate) async fn upload_version(
        &self,
        file_id: &str,
        upload: UploadIo,
    ) -> Result<Data, BoxError> {
        let request =
            ApiRequest::post(format!("files/{file_id}/content")).upload(json!({}), upload);
        first_entry(self.send_json(request).await?)
    }
}

pub(crate) fn parent_of(data: &Data) -> Option<FolderRef> {
    match data.get("parent")? {
        Value::Object(parent) => FolderRef::from_data(parent),
        _ => None,
    }
}

fn first_entry(value: Value) -> Result<Data, BoxError> {
    let page: EntryPage = serde_json::from_value(value)?;
    page.entries
        .into_iter()
        .next()
        .ok_or(BoxError::MissingField("entries"))
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn not_found(what: &str) -> BoxError {
    BoxError::NotFound {
        body: format!("no item at {what}"),
    }
}
