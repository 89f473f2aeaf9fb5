//! Fetching every image of a finished generation.
//!
//! Images are downloaded one after the other, in the order the API lists
//! them. The first failure ends the run; files already written stay on disk.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::{generation_parameters, DownloadResult};
use crate::sidecar::ImageSidecar;
use crate::GenerationApi;

/// Format the API renders generated images in.
pub const IMAGE_EXTENSION: &str = "png";

/// `{output_dir}/{generation_id}_{index}.png`, with `index` starting at 1.
pub fn image_path(output_dir: &Path, generation_id: &str, index: usize) -> PathBuf {
    output_dir.join(format!("{generation_id}_{index}.{IMAGE_EXTENSION}"))
}

#[tracing::instrument(level = "debug", skip(client))]
pub async fn download_generation<C: GenerationApi>(
    client: &C,
    generation_id: &str,
    output_dir: &Path,
) -> Result<DownloadResult> {
    let status = client.generation_status(generation_id).await?;
    if !status.is_complete() {
        return Err(Error::NotComplete(status.status));
    }
    if status.images.is_empty() {
        return Err(Error::NoImages(generation_id.to_string()));
    }

    std::fs::create_dir_all(output_dir)
        .map_err(|e| Error::io_at("creating output directory", output_dir, e))?;
    let parameters = generation_parameters(&status.raw);
    debug!(
        "Generation {generation_id} has {} images and {} recorded parameters",
        status.images.len(),
        parameters.len()
    );

    let mut file_paths = Vec::with_capacity(status.images.len());
    for (i, url) in status.images.iter().enumerate() {
        let index = i + 1;
        let dest = image_path(output_dir, generation_id, index);
        save_image(client, generation_id, url, &dest, &parameters)
            .await
            .map_err(|e| Error::Image {
                index,
                source: Box::new(e),
            })?;
        info!("Saved image {index} of {generation_id}");
        file_paths.push(dest);
    }

    Ok(DownloadResult { file_paths })
}

async fn save_image<C: GenerationApi>(
    client: &C,
    generation_id: &str,
    url: &str,
    dest: &Path,
    parameters: &Map<String, Value>,
) -> Result<()> {
    client.download_image(url, dest).await?;
    ImageSidecar::new(generation_id, url, parameters.clone()).write_beside(dest)?;
    Ok(())
}
