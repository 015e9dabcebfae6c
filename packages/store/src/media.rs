//! # Device media port
//!
//! [`MediaLibrary`] is the device's photo library as the post form sees it:
//! ask for permission, let the user pick one image, re-encode it, read its bytes.
//!
//! [`MemoryMedia`] keeps "files" in memory. Shells stage a picked file with
//! [`MemoryMedia::stage`] (the file input hands over its bytes) and the next
//! [`MediaLibrary::pick_image`] returns it. Re-encoding decodes the stored
//! bytes (JPEG, PNG, GIF or WebP), drops any alpha channel and writes a
//! baseline JPEG at the requested quality to a new `.jpg` cache URI. Bytes
//! that do not decode fail with [`MediaError::Encode`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::models::LocalImage;

/// Result of a permission prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Output formats for [`MediaLibrary::reencode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Encode decoded pixels in this format. `quality` is `0.0..=1.0`.
    pub fn encode(&self, image: &DynamicImage, quality: f32) -> Result<Vec<u8>, MediaError> {
        match self {
            ImageFormat::Jpeg => {
                let quality = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
                let mut out = Vec::new();
                let encoder = JpegEncoder::new_with_quality(&mut out, quality);
                DynamicImage::ImageRgb8(image.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(|e| MediaError::Encode(e.to_string()))?;
                Ok(out)
            }
        }
    }
}

/// Decode `bytes` and re-encode them as `format`.
pub fn transcode(bytes: &[u8], format: ImageFormat, quality: f32) -> Result<Vec<u8>, MediaError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| MediaError::Encode(e.to_string()))?;
    format.encode(&decoded, quality)
}

/// Picker hints: one image, optional crop to `aspect`, compression `quality`.
#[derive(Clone, Debug, PartialEq)]
pub struct PickOptions {
    pub aspect: (u32, u32),
    pub quality: f32,
    pub allows_editing: bool,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self::from(&crate::config::PickerConfig::default())
    }
}

impl From<&crate::config::PickerConfig> for PickOptions {
    fn from(config: &crate::config::PickerConfig) -> Self {
        Self {
            aspect: (config.aspect[0], config.aspect[1]),
            quality: config.quality,
            allows_editing: config.allows_editing,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("Unreadable image {0}")]
    Unreadable(String),
    #[error("Could not re-encode image: {0}")]
    Encode(String),
    #[error("Image picker failed: {0}")]
    Picker(String),
}

/// The device's media subsystem.
pub trait MediaLibrary {
    fn request_permission(&self) -> impl std::future::Future<Output = PermissionStatus>;
    /// `Ok(None)` when the user cancels.
    fn pick_image(
        &self,
        options: &PickOptions,
    ) -> impl std::future::Future<Output = Result<Option<LocalImage>, MediaError>>;
    fn reencode(
        &self,
        image: &LocalImage,
        format: ImageFormat,
        quality: f32,
    ) -> impl std::future::Future<Output = Result<LocalImage, MediaError>>;
    fn read(&self, image: &LocalImage) -> impl std::future::Future<Output = Result<Vec<u8>, MediaError>>;
}

#[derive(Debug)]
struct MediaState {
    permission: PermissionStatus,
    staged: Option<LocalImage>,
    files: HashMap<String, Vec<u8>>,
    reencode_error: Option<String>,
    reencodes: Vec<(String, f32)>,
    last_pick: Option<PickOptions>,
}

/// In-memory media library.
#[derive(Clone, Debug)]
pub struct MemoryMedia {
    state: Arc<Mutex<MediaState>>,
}

impl Default for MemoryMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMedia {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MediaState {
                permission: PermissionStatus::Granted,
                staged: None,
                files: HashMap::new(),
                reencode_error: None,
                reencodes: Vec::new(),
                last_pick: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MediaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        self.lock().permission = permission;
    }

    /// Add a file and make it the next pick result.
    pub fn stage(&self, uri: impl Into<String>, bytes: Vec<u8>) -> LocalImage {
        let image = LocalImage::new(uri);
        let mut state = self.lock();
        state.files.insert(image.uri.clone(), bytes);
        state.staged = Some(image.clone());
        image
    }

    /// Add a file without staging it for the picker.
    pub fn insert(&self, uri: impl Into<String>, bytes: Vec<u8>) -> LocalImage {
        let image = LocalImage::new(uri);
        self.lock().files.insert(image.uri.clone(), bytes);
        image
    }

    /// Make every re-encode fail with `reason`, or succeed again with `None`.
    pub fn fail_reencode(&self, reason: Option<&str>) {
        self.lock().reencode_error = reason.map(str::to_string);
    }

    /// `(source uri, quality)` of every successful re-encode.
    pub fn reencodes(&self) -> Vec<(String, f32)> {
        self.lock().reencodes.clone()
    }

    pub fn last_pick_options(&self) -> Option<PickOptions> {
        self.lock().last_pick.clone()
    }
}

impl MediaLibrary for MemoryMedia {
    async fn request_permission(&self) -> PermissionStatus {
        self.lock().permission
    }

    async fn pick_image(&self, options: &PickOptions) -> Result<Option<LocalImage>, MediaError> {
        let mut state = self.lock();
        state.last_pick = Some(options.clone());
        Ok(state.staged.take())
    }

    async fn reencode(
        &self,
        image: &LocalImage,
        format: ImageFormat,
        quality: f32,
    ) -> Result<LocalImage, MediaError> {
        let mut state = self.lock();
        if let Some(reason) = &state.reencode_error {
            return Err(MediaError::Encode(reason.clone()));
        }
        let source = state
            .files
            .get(&image.uri)
            .ok_or_else(|| MediaError::Unreadable(image.uri.clone()))?;
        let bytes = transcode(source, format, quality)?;
        let out = LocalImage::new(format!(
            "file:///cache/ImageManipulator/{}.{}",
            uuid::Uuid::new_v4().simple(),
            format.extension()
        ));
        state.files.insert(out.uri.clone(), bytes);
        state.reencodes.push((image.uri.clone(), quality));
        Ok(out)
    }

    async fn read(&self, image: &LocalImage) -> Result<Vec<u8>, MediaError> {
        self.lock()
            .files
            .get(&image.uri)
            .cloned()
            .ok_or_else(|| MediaError::Unreadable(image.uri.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// A small RGBA PNG, the kind a screenshot picker hands over.
    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(8, 6, image::Rgba([200, 40, 40, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_pick_returns_staged_once() {
        let media = MemoryMedia::new();
        let staged = media.stage("ph://asset/1", vec![1, 2, 3]);

        let picked = media.pick_image(&PickOptions::default()).await.unwrap();
        assert_eq!(picked, Some(staged));
        assert_eq!(media.last_pick_options().unwrap().aspect, (4, 3));

        // Nothing staged: the user cancelled.
        assert_eq!(media.pick_image(&PickOptions::default()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reencode_writes_a_jpeg_copy() {
        let media = MemoryMedia::new();
        let original = media.insert("ph://asset/2", png_bytes());

        let out = media.reencode(&original, ImageFormat::Jpeg, 0.9).await.unwrap();
        assert!(out.uri.starts_with("file:///cache/"));
        assert!(out.uri.ends_with(".jpg"));

        let jpeg = media.read(&out).await.unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
        assert_eq!(media.reencodes(), vec![("ph://asset/2".to_string(), 0.9)]);
    }

    #[test]
    fn lower_quality_gives_smaller_output() {
        let img = image::RgbImage::from_fn(64, 64, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();
        let png = png.into_inner();

        let high = transcode(&png, ImageFormat::Jpeg, 0.95).unwrap();
        let low = transcode(&png, ImageFormat::Jpeg, 0.1).unwrap();
        assert!(low.len() < high.len());
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fail_to_reencode() {
        let media = MemoryMedia::new();
        let original = media.insert("ph://asset/heic", vec![0, 0, 0, 24, b'f', b't', b'y', b'p']);
        assert!(matches!(
            media.reencode(&original, ImageFormat::Jpeg, 0.9).await,
            Err(MediaError::Encode(_))
        ));
        assert!(media.reencodes().is_empty());
    }

    #[tokio::test]
    async fn test_reencode_failure_and_missing_files() {
        let media = MemoryMedia::new();
        let original = media.insert("ph://asset/3", vec![1]);
        media.fail_reencode(Some("unsupported"));
        assert_eq!(
            media.reencode(&original, ImageFormat::Jpeg, 0.9).await,
            Err(MediaError::Encode("unsupported".to_string()))
        );

        let missing = LocalImage::new("file:///gone.jpg");
        assert!(matches!(media.read(&missing).await, Err(MediaError::Unreadable(_))));
    }
}
