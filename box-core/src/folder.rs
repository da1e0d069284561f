use std::collections::VecDeque;

use serde_json::{Value, json};

use crate::entity::{Data, Entity, EntityCore, ItemKind, id_of};
use crate::error::BoxError;
use crate::file::File;
use crate::session::{Session, parent_of};
use crate::transport::ApiRequest;
use crate::upload::UploadSource;

/// Non-owning reference from a child to the folder that contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    pub id: String,
    pub name: Option<String>,
}

impl FolderRef {
    pub(crate) fn from_data(data: &Data) -> Option<Self> {
        Some(Self {
            id: id_of(data)?,
            name: data.get("name").and_then(Value::as_str).map(str::to_owned),
        })
    }

    pub fn refers_to(&self, folder: &Folder) -> bool {
        self.id == folder.id()
    }
}

#[derive(Debug, Clone)]
pub struct Folder {
    core: EntityCore,
    parent: Option<FolderRef>,
}

impl Entity for Folder {
    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl Folder {
    pub(crate) fn from_data(
        session: Session,
        data: Data,
        parent: Option<FolderRef>,
    ) -> Result<Self, BoxError> {
        Ok(Self {
            core: EntityCore::new(session, ItemKind::Folder, data)?,
            parent,
        })
    }

    pub fn reference(&self) -> FolderRef {
        FolderRef {
            id: self.core.id().to_string(),
            name: self.cached_str("name").map(str::to_owned),
        }
    }

    pub fn parent(&self) -> Option<&FolderRef> {
        self.parent.as_ref()
    }

    pub async fn name(&mut self) -> Result<String, BoxError> {
        self.core.required_string("name").await
    }

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

    pub async fn created_at(&mut self) -> Result<Option<String>, BoxError> {
        self.core.attr_string("created_at").await
    }

    pub async fn reload(&mut self) -> Result<(), BoxError> {
        self.core.reload().await?;
        if let Some(parent) = parent_of(self.core.data()) {
            self.parent = Some(parent);
        }
        Ok(())
    }

    /// Creates a sub-folder. A sibling with the same name fails with
    /// `NameConflict`.
    pub async fn create(&self, name: &str) -> Result<Folder, BoxError> {
        self.core.ensure_live()?;
        let request = ApiRequest::post("folders")
            .json(json!({ "name": name, "parent": { "id": self.core.id() } }));
        let data = self.core.session().send_object(request).await?;
        tracing::info!(parent = %self.core.id(), %name, "created folder");
        Folder::from_data(self.core.session().clone(), data, Some(self.reference()))
    }

    /// Lists every child. Each call goes back to the backend.
    pub async fn items(&self) -> Result<Vec<Item>, BoxError> {
        self.core.ensure_live()?;
        let session = self.core.session();
        let parent = self.reference();
        let mut items = Vec::new();
        for entry in session.list_items(self.core.id()).await? {
            if let Some(item) = Item::from_entry(session, entry, &parent)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    pub async fn files(&self) -> Result<Vec<File>, BoxError> {
        Ok(self
            .items()
            .await?
            .into_iter()
            .filter_map(Item::into_file)
            .collect())
    }

    pub async fn folders(&self) -> Result<Vec<Folder>, BoxError> {
        Ok(self
            .items()
            .await?
            .into_iter()
            .filter_map(Item::into_folder)
            .collect())
    }

    /// Uploads under the source's own file name. If a file with that name is
    /// already here, nothing is sent and the existing file is returned.
    pub async fn upload(&self, source: impl Into<UploadSource>) -> Result<File, BoxError> {
        self.upload_inner(source.into(), None).await
    }

    pub async fn upload_as(
        &self,
        source: impl Into<UploadSource>,
        name: &str,
    ) -> Result<File, BoxError> {
        self.upload_inner(source.into(), Some(name)).await
    }

    async fn upload_inner(
        &self,
        source: UploadSource,
        name: Option<&str>,
    ) -> Result<File, BoxError> {
        self.core.ensure_live()?;
        let upload = source.into_upload_io()?;
        let name = name.unwrap_or(upload.filename.as_str()).to_string();

        if let Some(existing) = self
            .files()
            .await?
            .into_iter()
            .find(|file| file.cached_str("name") == Some(name.as_str()))
        {
            tracing::info!(
                folder = %self.core.id(),
                %name,
                id = %existing.id(),
                "upload skipped, name already present"
            );
            return Ok(existing);
        }

        let session = self.core.session();
        let entry = session.upload_file(self.core.id(), &name, upload).await?;
        tracing::info!(folder = %self.core.id(), %name, "uploaded file");
        File::from_upload(session.clone(), entry, Some(self.reference()))
    }

    /// Deletes the folder and everything under it.
    pub async fn delete(&mut self) -> Result<(), BoxError> {
        self.core.ensure_live()?;
        let request = ApiRequest::delete(self.core.path()).query("recursive", "true");
        self.core.session().send(request).await?;
        tracing::info!(id = %self.core.id(), "deleted folder");
        self.parent = None;
        self.core.mark_deleted();
        Ok(())
    }

    /// Starts a search below this folder. Nothing is listed until the first
    /// call to [`Finder::next`]; on a deleted folder that call fails with
    /// `StaleEntity`.
    pub fn find(&self, criteria: FindCriteria) -> Finder {
        let stale = self.core.is_deleted().then(|| self.core.id().to_string());
        let mut pending = VecDeque::new();
        if stale.is_none() {
            pending.push_back(self.reference());
        }
        Finder {
            session: self.core.session().clone(),
            criteria,
            stale,
            pending,
            ready: VecDeque::new(),
        }
    }
}

/// A child entry of a folder listing.
#[derive(Debug, Clone)]
pub enum Item {
    File(File),
    Folder(Folder),
}

impl Item {
    /// Builds an item from a listing entry; entry types other than files and
    /// folders (web links) are skipped.
    pub(crate) fn from_entry(
        session: &Session,
        entry: Data,
        parent: &FolderRef,
    ) -> Result<Option<Self>, BoxError> {
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .and_then(ItemKind::from_type);
        let item = match kind {
            Some(ItemKind::File) => {
                Item::File(File::from_data(session.clone(), entry, Some(parent.clone()))?)
            }
            Some(ItemKind::Folder) => {
                Item::Folder(Folder::from_data(session.clone(), entry, Some(parent.clone()))?)
            }
            _ => return Ok(None),
        };
        Ok(Some(item))
    }

    pub fn as_entity(&self) -> &dyn Entity {
        match self {
            Item::File(file) => file,
            Item::Folder(folder) => folder,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.as_entity().kind()
    }

    pub fn id(&self) -> &str {
        self.as_entity().id()
    }

    /// Name as reported by the listing, without fetching.
    pub fn name(&self) -> Option<&str> {
        self.as_entity().cached_str("name")
    }

    pub fn into_file(self) -> Option<File> {
        match self {
            Item::File(file) => Some(file),
            Item::Folder(_) => None,
        }
    }

    pub fn into_folder(self) -> Option<Folder> {
        match self {
            Item::Folder(folder) => Some(folder),
            Item::File(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindCriteria {
    pub name: Option<String>,
    pub kind: Option<ItemKind>,
    pub recursive: bool,
}

impl Default for FindCriteria {
    fn default() -> Self {
        Self {
            name: None,
            kind: None,
            recursive: true,
        }
    }
}

impl FindCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: ItemKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.kind.is_none_or(|kind| item.kind() == kind)
            && self
                .name
                .as_deref()
                .is_none_or(|name| item.name() == Some(name))
    }
}

/// Breadth-first search over a folder tree. A folder is listed only when the
/// caller asks for more results than are already buffered.
#[derive(Debug)]
pub struct Finder {
    session: Session,
    criteria: FindCriteria,
    stale: Option<String>,
    pending: VecDeque<FolderRef>,
    ready: VecDeque<Item>,
}

impl Finder {
    pub async fn next(&mut self) -> Result<Option<Item>, BoxError> {
        if let Some(id) = &self.stale {
            return Err(BoxError::StaleEntity { id: id.clone() });
        }
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Ok(Some(item));
            }
            let Some(folder) = self.pending.pop_front() else {
                return Ok(None);
            };
            for entry in self.session.list_items(&folder.id).await? {
                let Some(item) = Item::from_entry(&self.session, entry, &folder)? else {
                    continue;
                };
                if self.criteria.recursive
                    && let Item::Folder(child) = &item
                {
                    self.pending.push_back(child.reference());
                }
                if self.criteria.matches(&item) {
                    self.ready.push_back(item);
                }
            }
        }
    }

    pub async fn collect_all(mut self) -> Result<Vec<Item>, BoxError> {
        let mut found = Vec::new();
        while let Some(item) = self.next().await? {
            found.push(item);
        }
        Ok(found)
    }
}

pub(crate) fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}
