use async_trait::async_trait;

use super::{StorageBackend, StorageError, validate_path};

/// Uploads reports with HTTP PUT under a base URL
pub struct HttpStorage {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Send a bearer token with every upload
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn object_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }
}

#[async_trait]
impl StorageBackend for HttpStorage {
    async fn store(&self, path: &str, content: &[u8]) -> Result<String, StorageError> {
        validate_path(path)?;
        let url = self.object_url(path);

        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", "text/markdown; charset=utf-8")
            .body(content.to_vec());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected {
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(location.unwrap_or(url))
    }

    fn name(&self) -> &str {
        "http"
    }
}
