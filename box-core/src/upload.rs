use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Upload payload in the shape the transport sends: content bytes, a MIME type
/// and the remote file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadIo {
    pub content: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

impl UploadIo {
    pub fn new(
        content: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            mime_type: mime_type.into(),
            filename: filename.into(),
        }
    }

    /// Drains `reader`, guessing the MIME type from `filename`.
    pub fn from_reader<R: Read>(mut reader: R, filename: impl Into<String>) -> io::Result<Self> {
        let filename = filename.into();
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        let mime_type = guess_mime(Path::new(&filename));
        Ok(Self {
            content,
            mime_type,
            filename,
        })
    }

    pub fn from_path(path: &Path) -> io::Result<Self> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        // The handle is dropped when this call returns, on success or error.
        let file = fs::File::open(path)?;
        Self::from_reader(file, filename)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// What callers may hand to an upload: a local path, or an already tagged
/// payload. Both normalise to [`UploadIo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    Path(PathBuf),
    Tagged(UploadIo),
}

impl UploadSource {
    pub fn from_reader<R: Read>(reader: R, filename: impl Into<String>) -> io::Result<Self> {
        Ok(Self::Tagged(UploadIo::from_reader(reader, filename)?))
    }

    pub fn into_upload_io(self) -> io::Result<UploadIo> {
        match self {
            UploadSource::Path(path) => UploadIo::from_path(&path),
            UploadSource::Tagged(upload) => Ok(upload),
        }
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        UploadSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::Path(path)
    }
}

impl From<&PathBuf> for UploadSource {
    fn from(path: &PathBuf) -> Self {
        UploadSource::Path(path.clone())
    }
}

impl From<UploadIo> for UploadSource {
    fn from(upload: UploadIo) -> Self {
        UploadSource::Tagged(upload)
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
