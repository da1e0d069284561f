use crate::error::BoxError;

pub const DEFAULT_API_URL: &str = "https://api.box.com/2.0/";
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.box.com/api/2.0/";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub upload_url: String,
    pub access_token: String,
    pub page_size: u32,
}

impl ClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            access_token: access_token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Reads `BOX_ACCESS_TOKEN`, `BOX_API_URL`, `BOX_UPLOAD_URL` and
    /// `BOX_PAGE_SIZE` from the process environment.
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BoxError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let access_token = lookup("BOX_ACCESS_TOKEN")
            .filter(|value| !value.trim().is_empty())
            .ok_or(BoxError::MissingConfig("BOX_ACCESS_TOKEN"))?;
        let api_url = lookup("BOX_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let upload_url =
            lookup("BOX_UPLOAD_URL").unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string());
        let page_size = read_u32(lookup("BOX_PAGE_SIZE"), DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);

        Ok(Self {
            api_url,
            upload_url,
            access_token,
            page_size,
        })
    }
}

fn read_u32(value: Option<String>, default: u32) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}
