//! Client library for the Box content API.
//!
//! Files, folders and comments keep a partial cache of their remote metadata
//! and fetch missing attributes on first access. All remote calls go through a
//! [`Transport`], with [`HttpTransport`] as the default implementation.

mod comment;
mod config;
mod entity;
mod error;
mod file;
mod folder;
pub mod naming;
mod session;
mod transport;
mod upload;

pub use comment::Comment;
pub use config::{ClientConfig, DEFAULT_API_URL, DEFAULT_PAGE_SIZE, DEFAULT_UPLOAD_URL};
pub use entity::{Data, Entity, EntityCache, EntityCore, ItemKind};
pub use error::{ApiErrorClass, BoxError};
pub use file::File;
pub use folder::{FindCriteria, Finder, Folder, FolderRef, Item};
pub use session::{ROOT_FOLDER_ID, Session};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, RequestBody, Transport, TransportError,
};
pub use upload::{UploadIo, UploadSource};
