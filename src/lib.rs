use std::cmp::min;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, trace};

pub mod download;
pub mod error;
pub mod model;
pub mod sidecar;

pub use download::{download_generation, image_path, IMAGE_EXTENSION};
pub use error::{Error, Operation, Result};
pub use model::{
    DeleteResponse, DownloadResult, GenerationListItem, GenerationListResponse,
    GenerationRequest, GenerationResponse, GenerationState, GenerationStatus, UserInfo,
};

use model::wire;

pub const MAIN_API_URL: &str = "https://cloud.leonardo.ai/api/rest/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client settings, read from `LEONARDO_*` environment variables.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub api_token: Option<String>,
    /// Whether new generations default to private visibility.
    #[serde(deserialize_with = "lenient_flag")]
    pub private: bool,
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout: u64,
}

impl Config {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: Some(api_token.into()),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Reads `LEONARDO_API_TOKEN`, `LEONARDO_PRIVATE`, `LEONARDO_BASE_URL` and
    /// `LEONARDO_TIMEOUT`. Unset variables keep their defaults.
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        envy::prefixed("LEONARDO_").from_env::<Config>()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_token: None,
            private: false,
            base_url: MAIN_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("private", &self.private)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `1`, `t` and `true` in any case are true; everything else, including
/// unparseable values, is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "t" | "true")
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(parse_flag(&String::deserialize(deserializer)?))
}

/// Remote operations a generation workflow relies on.
#[allow(async_fn_in_trait)]
pub trait GenerationApi {
    async fn create_generation(&self, request: &GenerationRequest) -> Result<GenerationResponse>;
    async fn generation_status(&self, id: &str) -> Result<GenerationStatus>;
    async fn delete_generation(&self, id: &str) -> Result<DeleteResponse>;
    async fn user_info(&self) -> Result<UserInfo>;
    async fn list_generations(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<GenerationListResponse>;
    /// Fetches `url` into `dest`. Nothing is left at `dest` on failure.
    async fn download_image(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP client for the Leonardo.Ai REST API.
#[derive(Clone)]
pub struct Leonardo {
    client: reqwest::Client,
    config: Config,
    api_token: String,
    show_progress: bool,
}

impl fmt::Debug for Leonardo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leonardo")
            .field("config", &self.config)
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

impl Leonardo {
    #[tracing::instrument(level = "debug")]
    pub fn new(config: Config) -> Result<Self> {
        let api_token = config
            .api_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("environment variable LEONARDO_API_TOKEN is not set".to_string())
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(Error::Client)?;
        debug!("Constructed client for {}", config.base_url);

        Ok(Leonardo {
            client,
            config,
            api_token,
            show_progress: false,
        })
    }

    /// Draws a progress bar on stderr while images download.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.api_token)
    }

    /// Sends `request` and returns the body of a 2xx response.
    async fn execute(&self, operation: Operation, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = request
            .send()
            .await
            .map_err(|source| Error::Transport { operation, source })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| Error::Transport { operation, source })?
            .to_vec();
        trace!("{operation} returned {status} with {} bytes", body.len());

        if status.as_u16() >= 300 {
            debug!("{operation} rejected with status {status}");
            return Err(Error::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn progress_bar(&self, url: &str, total_size: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = match total_size {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            }
            None => ProgressBar::new_spinner(),
        };
        pb.set_message(url.to_string());
        pb
    }

    async fn stream_to_file(
        &self,
        response: reqwest::Response,
        url: &str,
        path: &Path,
    ) -> Result<()> {
        let operation = Operation::DownloadImage;
        let total_size = response.content_length();
        let pb = self.progress_bar(url, total_size);

        let mut file = File::create(path).map_err(|e| Error::io_at("creating file", path, e))?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|source| Error::Transport { operation, source })?;
            file.write_all(&chunk)
                .map_err(|e| Error::io_at("writing to file", path, e))?;
            downloaded += chunk.len() as u64;
            pb.set_position(total_size.map_or(downloaded, |total| min(downloaded, total)));
        }
        file.flush()
            .map_err(|e| Error::io_at("writing to file", path, e))?;

        pb.finish_and_clear();
        Ok(())
    }
}

/// Download target while bytes are still arriving.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl GenerationApi for Leonardo {
    #[tracing::instrument(level = "debug", skip(self, request))]
    async fn create_generation(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let body = model::encode_request(request)?;
        let url = self.endpoint("generations");
        let raw = self
            .execute(
                Operation::CreateGeneration,
                self.authorized(Method::POST, &url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body),
            )
            .await?;
        wire::decode_create(raw)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn generation_status(&self, id: &str) -> Result<GenerationStatus> {
        let url = self.endpoint(&format!("generations/{id}"));
        let raw = self
            .execute(
                Operation::GenerationStatus,
                self.authorized(Method::GET, &url),
            )
            .await?;
        wire::decode_status(raw)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_generation(&self, id: &str) -> Result<DeleteResponse> {
        let url = self.endpoint(&format!("generations/{id}"));
        let raw = self
            .execute(
                Operation::DeleteGeneration,
                self.authorized(Method::DELETE, &url),
            )
            .await?;
        wire::decode_delete(raw)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn user_info(&self) -> Result<UserInfo> {
        let url = self.endpoint("me");
        let raw = self
            .execute(Operation::UserInfo, self.authorized(Method::GET, &url))
            .await?;
        wire::decode_user_info(raw)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_generations(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<GenerationListResponse> {
        let url = self.endpoint(&format!(
            "generations/user/{user_id}?offset={offset}&limit={limit}"
        ));
        let raw = self
            .execute(
                Operation::ListGenerations,
                self.authorized(Method::GET, &url),
            )
            .await?;
        wire::decode_list(raw)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn download_image(&self, url: &str, dest: &Path) -> Result<()> {
        let operation = Operation::DownloadImage;
        // Image links are pre-signed CDN URLs: no credentials are sent.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| Error::Transport { operation, source })?;

        let status = response.status();
        trace!("Headers: {:#?}", response.headers());
        if status.as_u16() >= 300 {
            let body = response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .unwrap_or_default();
            return Err(Error::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let part = partial_path(dest);
        if let Err(e) = self.stream_to_file(response, url, &part).await {
            let _ = std::fs::remove_file(&part);
            return Err(e);
        }
        std::fs::rename(&part, dest).map_err(|e| {
            let _ = std::fs::remove_file(&part);
            Error::io_at("moving download into place at", dest, e)
        })?;
        debug!("Downloaded {} to {}", url, dest.to_string_lossy());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_leniently() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("1"));
        assert!(parse_flag("t"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("definitely"));
    }

    #[test]
    fn default_config_targets_public_api() {
        let config = Config::default();
        assert_eq!(config.base_url, MAIN_API_URL);
        assert_eq!(config.timeout, 60);
        assert!(!config.private);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn client_requires_a_token() {
        let err = Leonardo::new(Config::default()).unwrap_err();
        assert!(err.to_string().contains("LEONARDO_API_TOKEN"));
        assert!(Leonardo::new(Config::new("   ")).is_err());
    }

    #[test]
    fn debug_output_hides_token() {
        let client = Leonardo::new(Config::new("secret-token")).unwrap();
        let shown = format!("{client:?}");
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn endpoints_join_base_and_path_verbatim() {
        let client =
            Leonardo::new(Config::new("key").with_base_url("http://localhost:9/api/")).unwrap();
        assert_eq!(client.endpoint("generations/a b"), "http://localhost:9/api/generations/a b");
    }

    #[test]
    fn partial_download_uses_sibling_file() {
        assert_eq!(
            partial_path(Path::new("out/gen_1.png")),
            PathBuf::from("out/gen_1.png.part")
        );
    }
}
