use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

use crate::comment::Comment;
use crate::entity::{Data, Entity, EntityCore, ItemKind};
use crate::error::BoxError;
use crate::folder::{Folder, FolderRef, non_empty_string};
use crate::naming;
use crate::session::{Session, parent_of};
use crate::transport::ApiRequest;
use crate::upload::UploadSource;

/// Keys an upload response is trusted for; content metadata is fetched on
/// first access.
const UPLOAD_SEED_KEYS: &[&str] = &["type", "id", "name"];

/// Keys that change whenever the content does.
const CONTENT_KEYS: &[&str] = &[
    "sha1",
    "size",
    "etag",
    "sequence_id",
    "modified_at",
    "content_modified_at",
    "file_version",
];

#[derive(Debug, Clone)]
pub struct File {
    core: EntityCore,
    parent: Option<FolderRef>,
    comments: Option<Vec<Comment>>,
}

impl Entity for File {
    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl File {
    pub(crate) fn from_data(
        session: Session,
        data: Data,
        parent: Option<FolderRef>,
    ) -> Result<Self, BoxError> {
        Ok(Self {
            core: EntityCore::new(session, ItemKind::File, data)?,
            parent,
            comments: None,
        })
    }

    pub(crate) fn from_upload(
        session: Session,
        mut data: Data,
        parent: Option<FolderRef>,
    ) -> Result<Self, BoxError> {
        data.retain(|key, _| UPLOAD_SEED_KEYS.contains(&key.as_str()));
        Self::from_data(session, data, parent)
    }

    /// Folder this file lives in; `None` once the file is deleted.
    pub fn parent(&self) -> Option<&FolderRef> {
        self.parent.as_ref()
    }

    pub async fn name(&mut self) -> Result<String, BoxError> {
        self.core.required_string("name").await
    }

    pub async fn sha1(&mut self) -> Result<String, BoxError> {
        self.core.required_string("sha1").await
    }

    pub async fn size(&mut self) -> Result<Option<u64>, BoxError> {
        Ok(self.core.attr("size").await?.and_then(Value::as_u64))
    }

    pub async fn etag(&mut self) -> Result<Option<String>, BoxError> {
        self.core.attr_string("etag").await
    }

    pub async fn created_at(&mut self) -> Result<Option<String>, BoxError> {
        self.core.attr_string("created_at").await
    }

    pub async fn modified_at(&mut self) -> Result<Option<String>, BoxError> {
        self.core.attr_string("modified_at").await
    }

    /// An empty description reads as `None`, same as an unset one.
    pub async fn description(&mut self, force: bool) -> Result<Option<String>, BoxError> {
        let value = self.core.attr_reloaded("description", force).await?;
        Ok(non_empty_string(value))
    }

    pub async fn set_description(&mut self, description: &str) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        let request =
            ApiRequest::put(self.core.path()).json(json!({ "description": description }));
        let data = self.core.session().send_object(request).await?;
        let confirmed = data.contains_key("description");
        self.core.apply(data);
        if !confirmed {
            self.core
                .set("description", Value::String(description.to_string()));
        }
        Ok(())
    }

    /// Re-fetches every attribute, discarding the cache.
    pub async fn reload(&mut self) -> Result<(), BoxError> {
        self.core.reload().await?;
        if let Some(parent) = parent_of(self.core.data()) {
            self.parent = Some(parent);
        }
        Ok(())
    }

    /// Writes the content to `target`. Data lands in a `.partial` sibling
    /// first and is renamed into place once complete.
    pub async fn download(&mut self, target: &Path) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        let request = ApiRequest::get(format!("{}/content", self.core.path()));
        let response = self.core.session().send(request).await?;

        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        if let Err(err) = write_partial(&partial, target, &response.body).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err.into());
        }
        tracing::debug!(
            id = %self.core.id(),
            target = %target.display(),
            bytes = response.body.len(),
            "downloaded file"
        );
        Ok(())
    }

    /// Uploads `source` as a new sibling of this file. Without `new_name` the
    /// copy takes this file's name, numbered `name (n).ext` on collision.
    pub async fn upload_copy(
        &mut self,
        source: impl Into<UploadSource>,
        new_name: Option<&str>,
    ) -> Result<File, BoxError> {
        self.core.ensure_live()?;
        let parent = self.parent.clone().ok_or_else(|| self.stale())?;
        let upload = source.into().into_upload_io()?;
        let name = match new_name {
            Some(name) => name.to_string(),
            None => {
                let own = self.name().await?;
                let siblings = self.core.session().list_items(&parent.id).await?;
                naming::disambiguate(
                    &own,
                    siblings
                        .iter()
                        .filter_map(|entry| entry.get("name").and_then(Value::as_str)),
                )
            }
        };
        let session = self.core.session().clone();
        let entry = session.upload_file(&parent.id, &name, upload).await?;
        tracing::info!(source = %self.core.id(), %name, "uploaded copy");
        File::from_upload(session, entry, Some(parent))
    }

    /// Replaces the content in place. Identity, name and parent stay; content
    /// metadata is taken from the upload response, and any content key it
    /// lacks is fetched again on access.
    pub async fn upload_overwrite(
        &mut self,
        source: impl Into<UploadSource>,
    ) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        let upload = source.into().into_upload_io()?;
        let mut entry = self
            .core
            .session()
            .upload_version(self.core.id(), upload)
            .await?;
        entry.retain(|key, _| CONTENT_KEYS.contains(&key.as_str()));
        self.core.invalidate(CONTENT_KEYS);
        self.core.apply(entry);
        tracing::info!(id = %self.core.id(), "overwrote file content");
        Ok(())
    }

    pub async fn move_to(&mut self, destination: &Folder) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        destination.core().ensure_live()?;
        let request = ApiRequest::put(self.core.path())
            .json(json!({ "parent": { "id": destination.id() } }));
        let data = self.core.session().send_object(request).await?;
        self.core.apply(data);
        self.parent = Some(destination.reference());
        tracing::info!(id = %self.core.id(), to = %destination.id(), "moved file");
        Ok(())
    }

    /// Copies into `destination` under the same name. The copy is a separate
    /// entity with its own id.
    pub async fn copy_to(&mut self, destination: &Folder) -> Result<File, BoxError> {
        self.core.ensure_live()?;
        destination.core().ensure_live()?;
        let request = ApiRequest::post(format!("{}/copy", self.core.path()))
            .json(json!({ "parent": { "id": destination.id() } }));
        let data = self.core.session().send_object(request).await?;
        tracing::info!(id = %self.core.id(), to = %destination.id(), "copied file");
        File::from_data(
            self.core.session().clone(),
            data,
            Some(destination.reference()),
        )
    }

    pub async fn rename(&mut self, new_name: &str) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        let request = ApiRequest::put(self.core.path()).json(json!({ "name": new_name }));
        let data = self.core.session().send_object(request).await?;
        let confirmed = data.contains_key("name");
        self.core.apply(data);
        if !confirmed {
            self.core.set("name", Value::String(new_name.to_string()));
        }
        Ok(())
    }

    pub async fn delete(&mut self) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        self.core
            .session()
            .send(ApiRequest::delete(self.core.path()))
            .await?;
        tracing::info!(id = %self.core.id(), "deleted file");
        self.parent = None;
        self.comments = None;
        self.core.mark_deleted();
        Ok(())
    }

    /// Posts a comment. If the comment list was already loaded the confirmed
    /// comment is appended to it.
    pub async fn add_comment(&mut self, message: &str) -> Result<Comment, BoxError> {
        self.core.ensure_live()?;
        let request = ApiRequest::post("comments").json(json!({
            "item": { "type": "file", "id": self.core.id() },
            "message": message,
        }));
        let data = self.core.session().send_object(request).await?;
        let comment = Comment::from_data(
            self.core.session().clone(),
            data,
            self.core.id().to_string(),
        )?;
        if let Some(comments) = self.comments.as_mut() {
            comments.push(comment.clone());
        }
        Ok(comment)
    }

    /// Comments in creation order. Loaded on first use and cached until
    /// `force` is set.
    pub async fn comments(&mut self, force: bool) -> Result<&[Comment], BoxError> {
        self.core.ensure_live()?;
        if force || self.comments.is_none() {
            let session = self.core.session();
            let entries = session
                .list_entries(&format!("{}/comments", self.core.path()))
                .await?;
            let comments = entries
                .into_iter()
                .map(|entry| Comment::from_data(session.clone(), entry, self.core.id().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            self.comments = Some(comments);
        }
        Ok(self.comments.as_deref().unwrap_or_default())
    }

    fn stale(&self) -> BoxError {
        BoxError::StaleEntity {
            id: self.core.id().to_string(),
        }
    }
}

async fn write_partial(partial: &Path, target: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(partial).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(partial, target).await
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
