//! # Client configuration (`postboard.toml`)
//!
//! Settings the workflows read at runtime: which hosted project to talk to,
//! where uploaded images are served from, how images are re-encoded before
//! upload, and the hints passed to the device's image picker.
//!
//! ## Structure
//!
//! ```toml
//! [hosted]
//! project_id = "postboard-prod"
//! api_key = "AIza..."
//! storage_bucket = "postboard-prod.appspot.com"
//! poll_interval_ms = 2000 # live-listener refresh
//!
//! [storage]
//! public_url_base = "https://storage.postboard.local"
//!
//! [upload]
//! jpeg_quality = 0.9      # re-encode quality before upload
//!
//! [picker]
//! aspect = [4, 3]
//! quality = 0.8
//! allows_editing = true
//! ```
//!
//! | Struct | Purpose |
//! |--------|---------|
//! | [`PostboardConfig`] | Top-level config with builder helpers, TOML (de)serialisation and the canonical filename. |
//! | [`HostedConfig`] | Hosted project credentials. Without all three the in-process backend is used. |
//! | [`StorageConfig`] | Base URL used when resolving public download URLs. |
//! | [`UploadConfig`] | JPEG quality for image normalisation, default **0.9**. |
//! | [`PickerConfig`] | Aspect and quality hints for the image picker, default **4:3 / 0.8**. |
//!
//! Every section has production defaults, so a missing or empty file is the
//! default configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration stored in `postboard.toml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostboardConfig {
    #[serde(default)]
    pub hosted: HostedConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub picker: PickerConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
    /// How often live listeners re-read their document or query.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            api_key: None,
            storage_bucket: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// A hosted project with every credential present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostedProject {
    pub project_id: String,
    pub api_key: String,
    pub storage_bucket: String,
    pub poll_interval_ms: u64,
}

impl HostedConfig {
    /// `None` unless project id, API key and bucket are all set and non-blank.
    pub fn project(&self) -> Option<HostedProject> {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Some(HostedProject {
            project_id: present(&self.project_id)?,
            api_key: present(&self.api_key)?,
            storage_bucket: present(&self.storage_bucket)?,
            poll_interval_ms: self.poll_interval_ms.max(250),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_public_url_base")]
    pub public_url_base: String,
}

fn default_public_url_base() -> String {
    "https://storage.postboard.local".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_url_base: default_public_url_base(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// JPEG quality in `0.0..=1.0`.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,
}

fn default_jpeg_quality() -> f32 {
    0.9
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PickerConfig {
    #[serde(default = "default_aspect")]
    pub aspect: [u32; 2],
    #[serde(default = "default_picker_quality")]
    pub quality: f32,
    #[serde(default = "default_allows_editing")]
    pub allows_editing: bool,
}

fn default_aspect() -> [u32; 2] {
    [4, 3]
}

fn default_picker_quality() -> f32 {
    0.8
}

fn default_allows_editing() -> bool {
    true
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            aspect: default_aspect(),
            quality: default_picker_quality(),
            allows_editing: default_allows_editing(),
        }
    }
}

impl PostboardConfig {
    /// Builder method to point the client at a hosted project.
    pub fn with_hosted_project(
        mut self,
        project_id: impl Into<String>,
        api_key: impl Into<String>,
        storage_bucket: impl Into<String>,
    ) -> Self {
        self.hosted.project_id = Some(project_id.into());
        self.hosted.api_key = Some(api_key.into());
        self.hosted.storage_bucket = Some(storage_bucket.into());
        self
    }

    /// Builder method to set the public URL base for uploaded blobs.
    pub fn with_public_url_base(mut self, base: impl Into<String>) -> Self {
        self.storage.public_url_base = base.into();
        self
    }

    /// Builder method to set the re-encode quality, clamped to `0.0..=1.0`.
    pub fn with_jpeg_quality(mut self, quality: f32) -> Self {
        self.upload.jpeg_quality = quality.clamp(0.0, 1.0);
        self
    }

    /// The well-known filename for the config file.
    pub fn filename() -> &'static str {
        "postboard.toml"
    }

    /// Parse from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
