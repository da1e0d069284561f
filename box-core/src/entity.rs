use serde_json::{Map, Value};

use crate::error::BoxError;
use crate::session::Session;

pub type Data = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    File,
    Folder,
    Comment,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Folder => "folder",
            ItemKind::Comment => "comment",
        }
    }

    pub fn from_type(value: &str) -> Option<Self> {
        match value {
            "file" => Some(ItemKind::File),
            "folder" => Some(ItemKind::Folder),
            "comment" => Some(ItemKind::Comment),
            _ => None,
        }
    }

    fn collection(self) -> &'static str {
        match self {
            ItemKind::File => "files",
            ItemKind::Folder => "folders",
            ItemKind::Comment => "comments",
        }
    }
}

/// Partially populated attribute map. A key that was never fetched is absent;
/// a key the backend reported as null is present with `Value::Null`.
///
/// `complete` records whether a full fetch happened since the last
/// invalidation, so keys the backend never sends do not refetch forever.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    data: Data,
    complete: bool,
}

impl EntityCache {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            complete: false,
        }
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Lazy-fetch merge: only absent keys are taken from `incoming`.
    pub fn fill(&mut self, incoming: Data) {
        for (key, value) in incoming {
            self.data.entry(key).or_insert(value);
        }
        self.complete = true;
    }

    /// Confirmed mutation response: every key it carries wins.
    pub fn apply(&mut self, incoming: Data) {
        self.data.extend(incoming);
    }

    /// Forced reload: the response becomes the cache.
    pub fn replace(&mut self, incoming: Data) {
        let id = self.data.remove("id");
        self.data = incoming;
        if let Some(id) = id {
            self.data.entry("id").or_insert(id);
        }
        self.complete = true;
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn invalidate(&mut self, keys: &[&str]) {
        for key in keys {
            self.data.remove(*key);
        }
        self.complete = false;
    }
}

/// State shared by every remote entity: its identity, its cache and the
/// session used for lazy fetches.
#[derive(Debug, Clone)]
pub struct EntityCore {
    session: Session,
    kind: ItemKind,
    id: String,
    cache: EntityCache,
    deleted: bool,
}

impl EntityCore {
    pub(crate) fn new(session: Session, kind: ItemKind, data: Data) -> Result<Self, BoxError> {
        let id = id_of(&data).ok_or(BoxError::MissingField("id"))?;
        Ok(Self {
            session,
            kind,
            id,
            cache: EntityCache::new(data),
            deleted: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn data(&self) -> &Data {
        self.cache.data()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn path(&self) -> String {
        format!("{}/{}", self.kind.collection(), self.id)
    }

    pub(crate) fn ensure_live(&self) -> Result<(), BoxError> {
        if self.deleted {
            return Err(BoxError::StaleEntity {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) async fn attr(&mut self, key: &str) -> Result<Option<&Value>, BoxError> {
        if !self.cache.contains(key) && !self.cache.is_complete() {
            self.fetch().await?;
        }
        Ok(self.cache.get(key))
    }

    pub(crate) async fn attr_reloaded(
        &mut self,
        key: &str,
        force: bool,
    ) -> Result<Option<&Value>, BoxError> {
        if force {
            self.reload().await?;
        }
        self.attr(key).await
    }

    pub(crate) async fn attr_string(&mut self, key: &str) -> Result<Option<String>, BoxError> {
        Ok(self
            .attr(key)
            .await?
            .and_then(Value::as_str)
            .map(str::to_owned))
    }

    pub(crate) async fn required_string(
        &mut self,
        key: &'static str,
    ) -> Result<String, BoxError> {
        self.attr_string(key)
            .await?
            .ok_or(BoxError::MissingField(key))
    }

    pub(crate) async fn fetch(&mut self) -> Result<(), BoxError> {
        self.ensure_live()?;
        let data = self.session.get_object(&self.path()).await?;
        self.cache.fill(data);
        Ok(())
    }

    pub(crate) async fn reload(&mut self) -> Result<(), BoxError> {
        self.ensure_live()?;
        let data = self.session.get_object(&self.path()).await?;
        self.cache.replace(data);
        Ok(())
    }

    pub(crate) fn apply(&mut self, data: Data) {
        self.cache.apply(data);
    }

    pub(crate) fn set(&mut self, key: &str, value: Value) {
        self.cache.set(key, value);
    }

    pub(crate) fn invalidate(&mut self, keys: &[&str]) {
        self.cache.invalidate(keys);
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

/// Common read-only view over files, folders and comments.
pub trait Entity {
    fn core(&self) -> &EntityCore;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn kind(&self) -> ItemKind {
        self.core().kind()
    }

    /// Raw cached attributes; never triggers a fetch.
    fn data(&self) -> &Data {
        self.core().data()
    }

    fn cached_str(&self, key: &str) -> Option<&str> {
        self.data().get(key).and_then(Value::as_str)
    }

    fn is_deleted(&self) -> bool {
        self.core().is_deleted()
    }
}

/// Ids come back as strings, but tolerate numeric ids from older endpoints.
pub(crate) fn id_of(data: &Data) -> Option<String> {
    match data.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
