//! Image selection and best-effort normalisation before upload.
//!
//! Picked images can carry platform URI schemes the blob upload cannot read, so
//! they are re-encoded to a cache JPEG first. If that fails the original
//! reference is used; [`NormalizedImage`] records which path was taken.

use store::{ImageFormat, LocalImage, MediaLibrary, PermissionStatus, PickOptions};

use crate::error::AppError;

/// Ask for media-library access and let the user pick one image.
///
/// `Ok(None)` means the user closed the picker without choosing.
pub async fn pick_image<M: MediaLibrary>(
    media: &M,
    options: &PickOptions,
) -> Result<Option<LocalImage>, AppError> {
    if media.request_permission().await == PermissionStatus::Denied {
        tracing::warn!("Media library permission denied");
        return Err(AppError::PermissionDenied(
            "Access to the photo library is needed to attach an image".to_string(),
        ));
    }

    match media.pick_image(options).await {
        Ok(Some(image)) => {
            tracing::debug!("Picked {}", image.uri);
            Ok(Some(image))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            tracing::error!("Image picker failed: {}", e);
            Err(AppError::Unknown(e.to_string()))
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NormalizedImage {
    Normalized(LocalImage),
    Fallback { original: LocalImage, reason: String },
}

impl NormalizedImage {
    /// The reference to upload.
    pub fn image(&self) -> &LocalImage {
        match self {
            NormalizedImage::Normalized(image) => image,
            NormalizedImage::Fallback { original, .. } => original,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, NormalizedImage::Fallback { .. })
    }
}

/// Re-encode `image` as JPEG at `quality`. Never fails.
pub async fn normalize_image<M: MediaLibrary>(
    media: &M,
    image: &LocalImage,
    quality: f32,
) -> NormalizedImage {
    match media.reencode(image, ImageFormat::Jpeg, quality).await {
        Ok(jpeg) => NormalizedImage::Normalized(jpeg),
        Err(e) => {
            tracing::warn!("Image normalisation failed, uploading original: {}", e);
            NormalizedImage::Fallback {
                original: image.clone(),
                reason: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use store::MemoryMedia;

    /// An opaque PNG as a gallery pick would return it.
    pub(crate) fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(12, 9, image::Rgb([30, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_denied_permission() {
        let media = MemoryMedia::new();
        media.stage("ph://asset/1", vec![1]);
        media.set_permission(PermissionStatus::Denied);

        let result = pick_image(&media, &PickOptions::default()).await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
        assert!(media.last_pick_options().is_none());
    }

    #[tokio::test]
    async fn test_pick_and_cancel() {
        let media = MemoryMedia::new();
        let staged = media.stage("ph://asset/1", vec![1]);

        let options = PickOptions::default();
        assert_eq!(pick_image(&media, &options).await, Ok(Some(staged)));
        assert_eq!(media.last_pick_options(), Some(options.clone()));
        assert!(options.allows_editing);
        assert_eq!(pick_image(&media, &options).await, Ok(None));
    }

    #[tokio::test]
    async fn test_normalize_both_paths() {
        let media = MemoryMedia::new();
        let original = media.insert("ph://asset/7", png_bytes());

        let normalized = normalize_image(&media, &original, 0.9).await;
        assert!(!normalized.is_fallback());
        assert!(normalized.image().uri.ends_with(".jpg"));
        let jpeg = media.read(normalized.image()).await.unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);

        media.fail_reencode(Some("HEIC not supported"));
        let fallback = normalize_image(&media, &original, 0.9).await;
        assert_eq!(
            fallback,
            NormalizedImage::Fallback {
                original: original.clone(),
                reason: "Could not re-encode image: HEIC not supported".to_string(),
            }
        );
        assert_eq!(fallback.image(), &original);
    }

    #[tokio::test]
    async fn test_undecodable_image_falls_back() {
        let media = MemoryMedia::new();
        let original = media.insert("content://media/raw", vec![4, 2]);

        let normalized = normalize_image(&media, &original, 0.9).await;
        assert!(normalized.is_fallback());
        assert_eq!(normalized.image(), &original);
        assert_eq!(media.read(normalized.image()).await.unwrap(), vec![4, 2]);
    }
}
