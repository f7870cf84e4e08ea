//! Static-hosting REST client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::poll::{poll_until, PollConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ssl_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deploy {
    pub id: String,
    #[serde(default)]
    pub site_id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ssl_url: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Deploy {
    /// `ready`, `uploaded` and `error` end a deploy; `prepared` and friends do not
    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "ready" | "uploaded" | "error")
    }

    pub fn is_failed(&self) -> bool {
        self.state == "error"
    }

    pub fn public_url(&self) -> Option<&str> {
        self.ssl_url.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Serialize)]
struct CreateSiteRequest<'a> {
    name: &'a str,
}

pub struct NetlifyClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl NetlifyClient {
    pub const DEFAULT_API_URL: &'static str = "https://api.netlify.com/api/v1";

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Netlify API error: {} - {}", status, body);
        }
        Ok(response)
    }

    pub async fn create_site(&self, name: &str) -> Result<Site> {
        let url = format!("{}/sites", self.base_url);
        debug!("Creating site {}", name);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&CreateSiteRequest { name })
            .send()
            .await
            .context("Failed to create site")?;

        let site: Site = Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse site response")?;

        info!("Created site {}", site.id);
        Ok(site)
    }

    /// Upload a zipped build as a new deploy
    pub async fn deploy_zip(&self, site_id: &str, archive: Vec<u8>) -> Result<Deploy> {
        let url = format!("{}/sites/{}/deploys", self.base_url, site_id);
        debug!("Uploading {} byte archive to site {}", archive.len(), site_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(archive)
            .send()
            .await
            .context("Failed to upload deploy archive")?;

        let deploy: Deploy = Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse deploy response")?;

        info!("Created deploy {} ({})", deploy.id, deploy.state);
        Ok(deploy)
    }

    pub async fn get_deploy(&self, site_id: &str, deploy_id: &str) -> Result<Deploy> {
        let url = format!("{}/sites/{}/deploys/{}", self.base_url, site_id, deploy_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("Failed to get deploy status")?;

        Self::check(response)
            .await?
            .json()
            .await
            .context("Failed to parse deploy status")
    }

    /// Poll until the deploy is ready or failed
    pub async fn wait_for_deploy(
        &self,
        site_id: &str,
        deploy_id: &str,
        config: &PollConfig,
    ) -> Result<Deploy> {
        let deploy = poll_until(
            config,
            move || self.get_deploy(site_id, deploy_id),
            Deploy::is_terminal,
        )
        .await
        .context("Deployment timed out")?;

        if deploy.is_failed() {
            anyhow::bail!(
                "Deployment failed: {}",
                deploy.error_message.as_deref().unwrap_or("Unknown error")
            );
        }

        Ok(deploy)
    }
}
