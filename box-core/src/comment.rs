use crate::entity::{Data, Entity, EntityCore, ItemKind};
use crate::error::BoxError;
use crate::session::Session;
use crate::transport::ApiRequest;

/// A comment on a file. Holds the file id only; it does not keep the file's
/// comment list up to date.
#[derive(Debug, Clone)]
pub struct Comment {
    core: EntityCore,
    file_id: String,
}

impl Entity for Comment {
    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl Comment {
    pub(crate) fn from_data(
        session: Session,
        data: Data,
        file_id: String,
    ) -> Result<Self, BoxError> {
        Ok(Self {
            core: EntityCore::new(session, ItemKind::Comment, data)?,
            file_id,
        })
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub async fn message(&mut self) -> Result<String, BoxError> {
        self.core.required_string("message").await
    }

    pub async fn created_at(&mut self) -> Result<Option<String>, BoxError> {
        self.core.attr_string("created_at").await
    }

    pub async fn reload(&mut self) -> Result<(), BoxError> {
        self.core.reload().await
    }

    /// Removes the comment remotely. Returns `true` once the backend confirms.
    pub async fn delete(&mut self) -> Result<bool, BoxError> {
        self.core.ensure_live()?;
        let response = self
            .core
            .session()
            .send(ApiRequest::delete(self.core.path()))
            .await?;
        tracing::info!(id = %self.core.id(), file = %self.file_id, "deleted comment");
        self.core.mark_deleted();
        Ok(response.status.is_success())
    }
}
