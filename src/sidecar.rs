//! JSON metadata files stored next to generation outputs.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::GenerationRequest;

/// Sidecar written beside each downloaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSidecar {
    pub generation_id: String,
    pub image_url: String,
    pub timestamp: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Sidecar written when a generation is created, recording what was asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSidecar {
    pub generation_id: String,
    pub timestamp: String,
    pub prompt: String,
    pub num_images: u32,
    pub private: bool,
    pub alchemy: bool,
    pub ultra: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `{image}.json`, keeping the image extension in the name.
pub fn image_sidecar_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

impl ImageSidecar {
    pub fn new(generation_id: &str, image_url: &str, parameters: Map<String, Value>) -> Self {
        Self {
            generation_id: generation_id.to_string(),
            image_url: image_url.to_string(),
            timestamp: timestamp(),
            parameters,
        }
    }

    /// Writes the sidecar for `image_path` and returns where it went.
    pub fn write_beside(&self, image_path: &Path) -> Result<PathBuf> {
        let path = image_sidecar_path(image_path);
        write_json(&path, self)?;
        Ok(path)
    }
}

/// The id names the request sidecar file, so it must be a single plain
/// path component.
fn check_generation_id(generation_id: &str) -> Result<()> {
    if generation_id.trim().is_empty() {
        return Err(Error::Sidecar(
            "generation ID is empty; cannot write sidecar metadata".to_string(),
        ));
    }
    if generation_id.contains(['/', '\\']) || generation_id == ".." || generation_id == "." {
        return Err(Error::Sidecar(format!(
            "generation ID '{generation_id}' is not a valid file name"
        )));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

impl RequestSidecar {
    pub fn new(request: &GenerationRequest, generation_id: &str) -> Result<Self> {
        check_generation_id(generation_id)?;
        Ok(Self {
            generation_id: generation_id.to_string(),
            timestamp: timestamp(),
            prompt: request.prompt.clone(),
            num_images: request.resolved_num_images(),
            private: request.private,
            alchemy: request.alchemy,
            ultra: request.ultra,
            negative_prompt: non_empty(&request.negative_prompt),
            model_id: non_empty(&request.model_id),
            style_uuid: non_empty(&request.style_uuid),
            seed: request.seed,
            width: request.width,
            height: request.height,
            tags: request.tags.clone(),
            contrast: request.contrast,
            guidance_scale: request.guidance_scale,
        })
    }

    /// Writes `{dir}/{generation_id}.json` and returns its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        check_generation_id(&self.generation_id)?;
        let path = dir.join(format!("{}.json", self.generation_id));
        write_json(&path, self)?;
        Ok(path)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Sidecar(format!("encoding '{}': {e}", path.to_string_lossy())))?;
    std::fs::write(path, data).map_err(|e| Error::io_at("writing sidecar", path, e))?;
    debug!("Wrote sidecar {}", path.to_string_lossy());
    Ok(())
}

/// Loads any sidecar file as JSON, failing if it is not valid JSON.
pub fn inspect(path: &Path) -> Result<Value> {
    let data = std::fs::read(path).map_err(|e| Error::io_at("reading sidecar", path, e))?;
    serde_json::from_slice(&data)
        .map_err(|e| Error::Sidecar(format!("parsing '{}': {e}", path.to_string_lossy())))
}
