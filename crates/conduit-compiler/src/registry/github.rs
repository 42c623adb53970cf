//! GitHub contents API client.

use async_trait::async_trait;
use tracing::debug;

use super::{Registry, RegistryError, RegistrySource};

const PUBLIC_HOST: &str = "github.com";

/// Fetches templates through `GET /repos/{org}/{repo}/contents/{path}`.
///
/// Sources on `github.com` (or without a host) go to the configured API
/// address. Other hosts are treated as GitHub Enterprise at
/// `https://{host}/api/v3`.
pub struct GitHubRegistry {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubRegistry {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn api_base(&self, host: Option<&str>) -> String {
        match host {
            None | Some(PUBLIC_HOST) => self.api_url.clone(),
            Some(host) => format!("https://{}/api/v3", host),
        }
    }

    fn contents_url(&self, source: &RegistrySource) -> String {
        let path = source
            .path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base(source.host.as_deref()),
            urlencoding::encode(&source.org),
            urlencoding::encode(&source.repo),
            path
        );
        if let Some(reference) = &source.reference {
            url.push_str(&format!("?ref={}", urlencoding::encode(reference)));
        }
        url
    }
}

#[async_trait]
impl Registry for GitHubRegistry {
    async fn template(
        &self,
        token: Option<&str>,
        source: &RegistrySource,
    ) -> Result<Vec<u8>, RegistryError> {
        let url = self.contents_url(source);
        debug!(%url, "fetching template");

        let mut request = self
            .client
            .get(&url)
            .header("User-Agent", "Conduit-CI")
            .header("Accept", "application/vnd.github.raw");
        if let Some(token) = token.or(self.token.as_deref()) {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
