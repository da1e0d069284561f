#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use box_core::{
    ApiRequest, ApiResponse, File, Folder, RequestBody, Session, Transport, TransportError,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const HELLO_CONTENT: &[u8] = b"Hello World!";
pub const VEGETABLES_CONTENT: &[u8] = b"banana, orange, avachokado";

#[derive(Debug, Clone)]
struct FolderRecord {
    name: String,
    parent: Option<u64>,
    description: String,
}

#[derive(Debug, Clone)]
struct FileRecord {
    name: String,
    parent: u64,
    content: Vec<u8>,
    description: String,
    version: u64,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: u64,
    file: u64,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    folders: BTreeMap<u64, FolderRecord>,
    files: BTreeMap<u64, FileRecord>,
    comments: Vec<CommentRecord>,
    log: Vec<String>,
    fail_next: Option<StatusCode>,
}

/// Box-like backend kept in memory. Implements the transport directly so the
/// entity layer can be exercised without HTTP.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.lock().unwrap();
            state.folders.insert(
                0,
                FolderRecord {
                    name: "All Files".into(),
                    parent: None,
                    description: String::new(),
                },
            );
            state.next_id = 1;
        }
        backend
    }

    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Requests seen so far, as `METHOD path`.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    /// Makes the next request fail with `status` without touching state.
    pub fn fail_next(&self, status: StatusCode) {
        self.state.lock().unwrap().fail_next = Some(status);
    }

    pub fn content_of(&self, id: &str) -> Option<Vec<u8>> {
        let id = id.parse::<u64>().ok()?;
        self.state
            .lock()
            .unwrap()
            .files
            .get(&id)
            .map(|f| f.content.clone())
    }
}

#[async_trait]
impl Transport for MemoryBackend {
    async fn perform(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let response = {
            let mut state = self.state.lock().unwrap();
            state.log.push(format!("{} {}", request.method, request.path));
            match state.fail_next.take() {
                Some(status) => error(status, "injected"),
                None => state.route(&request),
            }
        };
        Ok(response)
    }
}

impl State {
    fn route(&mut self, request: &ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", ["folders", id]) => self.folder_info(id),
            ("GET", ["folders", id, "items"]) => self.folder_items(id, request),
            ("POST", ["folders"]) => self.create_folder(&request.body),
            ("PUT", ["folders", id]) => self.update_folder(id, &request.body),
            ("DELETE", ["folders", id]) => self.delete_folder(id),
            ("GET", ["files", id]) => self.file_info(id),
            ("PUT", ["files", id]) => self.update_file(id, &request.body),
            ("DELETE", ["files", id]) => self.delete_file(id),
            ("POST", ["files", "content"]) => self.upload(&request.body),
            ("POST", ["files", id, "content"]) => self.overwrite(id, &request.body),
            ("GET", ["files", id, "content"]) => self.file_content(id),
            ("POST", ["files", id, "copy"]) => self.copy_file(id, &request.body),
            ("GET", ["files", id, "comments"]) => self.file_comments(id, request),
            ("POST", ["comments"]) => self.add_comment(&request.body),
            ("GET", ["comments", id]) => self.comment_info(id),
            ("DELETE", ["comments", id]) => self.delete_comment(id),
            _ => error(StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn name_taken(&self, parent: u64, name: &str, except: Option<u64>) -> bool {
        let folders = self
            .folders
            .iter()
            .any(|(id, f)| f.parent == Some(parent) && f.name == name && Some(*id) != except);
        let files = self
            .files
            .iter()
            .any(|(id, f)| f.parent == parent && f.name == name && Some(*id) != except);
        folders || files
    }

    fn parent_json(&self, parent: u64) -> Value {
        match self.folders.get(&parent) {
            Some(folder) => {
                json!({ "type": "folder", "id": parent.to_string(), "name": folder.name })
            }
            None => Value::Null,
        }
    }

    fn folder_json(&self, id: u64) -> Value {
        let folder = &self.folders[&id];
        json!({
            "type": "folder",
            "id": id.to_string(),
            "name": folder.name,
            "description": folder.description,
            "created_at": "2024-01-01T00:00:00Z",
            "parent": folder.parent.map(|p| self.parent_json(p)).unwrap_or(Value::Null),
        })
    }

    fn file_json(&self, id: u64) -> Value {
        let file = &self.files[&id];
        json!({
            "type": "file",
            "id": id.to_string(),
            "name": file.name,
            "sha1": digest(&file.content),
            "size": file.content.len(),
            "etag": file.version.to_string(),
            "description": file.description,
            "created_at": "2024-01-01T00:00:00Z",
            "modified_at": format!("2024-01-01T00:00:{:02}Z", file.version),
            "parent": self.parent_json(file.parent),
        })
    }

    fn comment_json(comment: &CommentRecord) -> Value {
        json!({
            "type": "comment",
            "id": comment.id.to_string(),
            "message": comment.message,
            "item": { "type": "file", "id": comment.file.to_string() },
            "created_at": "2024-01-01T00:00:00Z",
        })
    }

    fn folder_info(&self, id: &str) -> ApiResponse {
        match parse_id(id).filter(|id| self.folders.contains_key(id)) {
            Some(id) => ok(StatusCode::OK, self.folder_json(id)),
            None => error(StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn folder_items(&self, id: &str, request: &ApiRequest) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.folders.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let mut entries: Vec<Value> = self
            .folders
            .iter()
            .filter(|(_, f)| f.parent == Some(id))
            .map(|(child, f)| json!({ "type": "folder", "id": child.to_string(), "name": f.name }))
            .collect();
        entries.extend(self.files.iter().filter(|(_, f)| f.parent == id).map(|(child, f)| {
            json!({
                "type": "file",
                "id": child.to_string(),
                "name": f.name,
                "sha1": digest(&f.content),
                "etag": f.version.to_string(),
            })
        }));
        page(entries, request)
    }

    fn create_folder(&mut self, body: &RequestBody) -> ApiResponse {
        let RequestBody::Json(body) = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        let name = body["name"].as_str().unwrap_or_default().to_string();
        let Some(parent) = body["parent"]["id"]
            .as_str()
            .and_then(parse_id)
            .filter(|p| self.folders.contains_key(p))
        else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        if self.name_taken(parent, &name, None) {
            return error(StatusCode::CONFLICT, "item_name_in_use");
        }
        let id = self.allocate();
        self.folders.insert(
            id,
            FolderRecord {
                name,
                parent: Some(parent),
                description: String::new(),
            },
        );
        ok(StatusCode::CREATED, self.folder_json(id))
    }

    fn update_folder(&mut self, id: &str, body: &RequestBody) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.folders.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let RequestBody::Json(body) = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        if let Some(description) = body["description"].as_str() {
            let folder = self.folders.get_mut(&id).unwrap();
            folder.description = description.to_string();
        }
        ok(StatusCode::OK, self.folder_json(id))
    }

    fn delete_folder(&mut self, id: &str) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.folders.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        if id == 0 {
            return error(StatusCode::FORBIDDEN, "access_denied");
        }
        let mut doomed = vec![id];
        let mut index = 0;
        while index < doomed.len() {
            let current = doomed[index];
            doomed.extend(
                self.folders
                    .iter()
                    .filter(|(_, f)| f.parent == Some(current))
                    .map(|(child, _)| *child),
            );
            index += 1;
        }
        let files: Vec<u64> = self
            .files
            .iter()
            .filter(|(_, f)| doomed.contains(&f.parent))
            .map(|(file, _)| *file)
            .collect();
        for file in files {
            self.files.remove(&file);
            self.comments.retain(|c| c.file != file);
        }
        for folder in doomed {
            self.folders.remove(&folder);
        }
        ApiResponse::empty(StatusCode::NO_CONTENT)
    }

    fn file_info(&self, id: &str) -> ApiResponse {
        match parse_id(id).filter(|id| self.files.contains_key(id)) {
            Some(id) => ok(StatusCode::OK, self.file_json(id)),
            None => error(StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn update_file(&mut self, id: &str, body: &RequestBody) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.files.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let RequestBody::Json(body) = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        let current = self.files[&id].clone();
        let name = body["name"].as_str().map(str::to_owned).unwrap_or(current.name);
        let parent = match body["parent"]["id"].as_str() {
            Some(raw) => match parse_id(raw).filter(|p| self.folders.contains_key(p)) {
                Some(parent) => parent,
                None => return error(StatusCode::NOT_FOUND, "not_found"),
            },
            None => current.parent,
        };
        if self.name_taken(parent, &name, Some(id)) {
            return error(StatusCode::CONFLICT, "item_name_in_use");
        }
        let file = self.files.get_mut(&id).unwrap();
        file.name = name;
        file.parent = parent;
        if let Some(description) = body["description"].as_str() {
            file.description = description.to_string();
        }
        ok(StatusCode::OK, self.file_json(id))
    }

    fn delete_file(&mut self, id: &str) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.files.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        self.files.remove(&id);
        self.comments.retain(|c| c.file != id);
        ApiResponse::empty(StatusCode::NO_CONTENT)
    }

    fn upload(&mut self, body: &RequestBody) -> ApiResponse {
        let RequestBody::Upload { attributes, upload } = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        let name = attributes["name"].as_str().unwrap_or_default().to_string();
        let Some(parent) = attributes["parent"]["id"]
            .as_str()
            .and_then(parse_id)
            .filter(|p| self.folders.contains_key(p))
        else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        if self.name_taken(parent, &name, None) {
            return error(StatusCode::CONFLICT, "item_name_in_use");
        }
        let id = self.allocate();
        self.files.insert(
            id,
            FileRecord {
                name,
                parent,
                content: upload.content.clone(),
                description: String::new(),
                version: 1,
            },
        );
        ok(
            StatusCode::CREATED,
            json!({ "total_count": 1, "entries": [self.file_json(id)] }),
        )
    }

    fn overwrite(&mut self, id: &str, body: &RequestBody) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.files.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let RequestBody::Upload { upload, .. } = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        let file = self.files.get_mut(&id).unwrap();
        file.content = upload.content.clone();
        file.version += 1;
        ok(
            StatusCode::CREATED,
            json!({ "total_count": 1, "entries": [self.file_json(id)] }),
        )
    }

    fn file_content(&self, id: &str) -> ApiResponse {
        match parse_id(id).and_then(|id| self.files.get(&id)) {
            Some(file) => ApiResponse::new(StatusCode::OK, file.content.clone()),
            None => error(StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn copy_file(&mut self, id: &str, body: &RequestBody) -> ApiResponse {
        let Some(source) = parse_id(id).and_then(|id| self.files.get(&id)).cloned() else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let RequestBody::Json(body) = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        let Some(parent) = body["parent"]["id"]
            .as_str()
            .and_then(parse_id)
            .filter(|p| self.folders.contains_key(p))
        else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let name = body["name"].as_str().map(str::to_owned).unwrap_or(source.name);
        if self.name_taken(parent, &name, None) {
            return error(StatusCode::CONFLICT, "item_name_in_use");
        }
        let id = self.allocate();
        self.files.insert(
            id,
            FileRecord {
                name,
                parent,
                content: source.content,
                description: source.description,
                version: 1,
            },
        );
        ok(StatusCode::CREATED, self.file_json(id))
    }

    fn file_comments(&self, id: &str, request: &ApiRequest) -> ApiResponse {
        let Some(id) = parse_id(id).filter(|id| self.files.contains_key(id)) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let entries = self
            .comments
            .iter()
            .filter(|c| c.file == id)
            .map(Self::comment_json)
            .collect();
        page(entries, request)
    }

    fn add_comment(&mut self, body: &RequestBody) -> ApiResponse {
        let RequestBody::Json(body) = body else {
            return error(StatusCode::BAD_REQUEST, "bad_request");
        };
        let Some(file) = body["item"]["id"]
            .as_str()
            .and_then(parse_id)
            .filter(|f| self.files.contains_key(f))
        else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let comment = CommentRecord {
            id: self.allocate(),
            file,
            message: body["message"].as_str().unwrap_or_default().to_string(),
        };
        let response = ok(StatusCode::CREATED, Self::comment_json(&comment));
        self.comments.push(comment);
        response
    }

    fn comment_info(&self, id: &str) -> ApiResponse {
        match parse_id(id).and_then(|id| self.comments.iter().find(|c| c.id == id)) {
            Some(comment) => ok(StatusCode::OK, Self::comment_json(comment)),
            None => error(StatusCode::NOT_FOUND, "not_found"),
        }
    }

    fn delete_comment(&mut self, id: &str) -> ApiResponse {
        let Some(id) = parse_id(id) else {
            return error(StatusCode::NOT_FOUND, "not_found");
        };
        let before = self.comments.len();
        self.comments.retain(|c| c.id != id);
        if self.comments.len() == before {
            return error(StatusCode::NOT_FOUND, "not_found");
        }
        ApiResponse::empty(StatusCode::NO_CONTENT)
    }
}

fn parse_id(raw: &str) -> Option<u64> {
    raw.parse().ok()
}

fn digest(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

fn page(entries: Vec<Value>, request: &ApiRequest) -> ApiResponse {
    let total = entries.len();
    let offset = request
        .query_value("offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let limit = request
        .query_value("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(100);
    let window: Vec<Value> = entries.into_iter().skip(offset).take(limit).collect();
    ok(
        StatusCode::OK,
        json!({ "total_count": total, "offset": offset, "limit": limit, "entries": window }),
    )
}

fn ok(status: StatusCode, body: Value) -> ApiResponse {
    ApiResponse::json(status, &body)
}

fn error(status: StatusCode, code: &str) -> ApiResponse {
    ApiResponse::json(
        status,
        &json!({ "type": "error", "status": status.as_u16(), "code": code }),
    )
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Per-test setup: a `fixture folder` under the root holding `dummy.test`,
/// plus a second local file with different content.
pub struct Fixture {
    pub backend: MemoryBackend,
    pub session: Session,
    pub test_root: Folder,
    pub dummy: File,
    pub hello: PathBuf,
    pub vegetables: PathBuf,
    pub dir: TempDir,
}

pub async fn fixture() -> Fixture {
    init_tracing();
    let backend = MemoryBackend::new();
    let session = backend.session();
    let dir = tempfile::tempdir().unwrap();
    let hello = dir.path().join("dummy.test");
    let vegetables = dir.path().join("veg.test");
    std::fs::write(&hello, HELLO_CONTENT).unwrap();
    std::fs::write(&vegetables, VEGETABLES_CONTENT).unwrap();

    let root = session.root().await.unwrap();
    let test_root = root.create("fixture folder").await.unwrap();
    let dummy = test_root.upload(&hello).await.unwrap();
    backend.clear_log();

    Fixture {
        backend,
        session,
        test_root,
        dummy,
        hello,
        vegetables,
        dir,
    }
}
