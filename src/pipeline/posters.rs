use crate::app::ports::HttpClientPort;
use crate::config::KopisConfig;
use crate::constants::{DISPLAY_POSTER_DIR, FULL_POSTER_DIR};
use crate::error::{IngestError, Result};
use crate::types::PosterKind;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Canvas size and per-image x offsets for a left-to-right, top-aligned merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLayout {
    pub width: u32,
    pub height: u32,
    pub offsets: Vec<u32>,
}

pub fn merge_layout(sizes: &[(u32, u32)]) -> MergeLayout {
    let mut offsets = Vec::with_capacity(sizes.len());
    let mut width = 0u32;
    let mut height = 0u32;
    for &(w, h) in sizes {
        offsets.push(width);
        width += w;
        height = height.max(h);
    }
    MergeLayout {
        width,
        height,
        offsets,
    }
}

/// Pastes `images` side by side at their native sizes on a black RGB canvas.
pub fn merge_images(images: &[DynamicImage]) -> RgbImage {
    let sizes: Vec<(u32, u32)> = images.iter().map(|img| img.dimensions()).collect();
    let layout = merge_layout(&sizes);
    let mut canvas = RgbImage::new(layout.width, layout.height);
    for (img, x) in images.iter().zip(&layout.offsets) {
        imageops::replace(&mut canvas, &img.to_rgb8(), i64::from(*x), 0);
    }
    canvas
}

/// Downloads posters into `{media_root}/display_poster` and
/// `{media_root}/full_poster`, and builds merged program images.
pub struct PosterStore {
    http: Arc<dyn HttpClientPort>,
    display_base: String,
    full_base: String,
    media_root: PathBuf,
}

impl PosterStore {
    pub fn new(http: Arc<dyn HttpClientPort>, kopis: &KopisConfig, media_root: &Path) -> Self {
        Self {
            http,
            display_base: kopis.display_poster_base.clone(),
            full_base: kopis.full_poster_base.clone(),
            media_root: media_root.to_path_buf(),
        }
    }

    pub fn dir_for(&self, kind: PosterKind) -> PathBuf {
        match kind {
            PosterKind::Display => self.media_root.join(DISPLAY_POSTER_DIR),
            PosterKind::Full => self.media_root.join(FULL_POSTER_DIR),
        }
    }

    pub fn remote_url(&self, filename: &str, kind: PosterKind) -> String {
        let base = match kind {
            PosterKind::Display => &self.display_base,
            PosterKind::Full => &self.full_base,
        };
        format!("{}/{}", base.trim_end_matches('/'), filename)
    }

    pub fn merged_path(&self, external_id: &str) -> PathBuf {
        self.dir_for(PosterKind::Full)
            .join(format!("{external_id}_merged.jpg"))
    }

    /// Fetches one poster and writes it under its own filename.
    pub async fn fetch(&self, filename: &str, kind: PosterKind) -> Result<PathBuf> {
        let poster_error = |reason: String| IngestError::Poster {
            filename: filename.to_string(),
            kind: kind.to_string(),
            reason,
        };
        if filename.is_empty() {
            return Err(poster_error("empty filename".into()));
        }

        let url = self.remote_url(filename, kind);
        let response = self
            .http
            .get(&url)
            .await
            .map_err(|e| poster_error(e.to_string()))?;
        if !response.is_success() {
            return Err(poster_error(format!("HTTP {}", response.status)));
        }

        let dir = self.dir_for(kind);
        let path = dir.join(filename);
        fs::create_dir_all(&dir)
            .and_then(|_| fs::write(&path, &response.bytes))
            .map_err(|e| poster_error(e.to_string()))?;
        debug!(%url, bytes = response.bytes.len(), "Saved {} poster {}", kind, filename);
        Ok(path)
    }

    /// Concatenates already-fetched full posters into `{external_id}_merged.jpg`.
    pub fn merge(&self, external_id: &str, filenames: &[String]) -> Result<PathBuf> {
        if filenames.is_empty() {
            return Err(IngestError::Poster {
                filename: format!("{external_id}_merged.jpg"),
                kind: PosterKind::Full.to_string(),
                reason: "no full posters to merge".into(),
            });
        }

        let dir = self.dir_for(PosterKind::Full);
        let images = filenames
            .iter()
            .map(|name| image::open(dir.join(name)))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let canvas = merge_images(&images);
        let path = self.merged_path(external_id);
        canvas.save_with_format(&path, ImageFormat::Jpeg)?;
        info!(
            external_id,
            posters = filenames.len(),
            width = canvas.width(),
            height = canvas.height(),
            "Merged full posters"
        );
        Ok(path)
    }
}
