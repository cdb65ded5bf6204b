//! Media artifacts: images, videos, and their encodings.
//!
//! Images are the unit of edit history; videos stand outside it. Both can be
//! round-tripped through base64 data URLs, which is the interchange format
//! the synthesis services speak.

use crate::error::{RetouchError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from a MIME type string.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Attempts to detect format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// An image with its raw bytes and format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Image format.
    pub format: ImageFormat,
}

impl ImageArtifact {
    /// Creates a new image artifact.
    pub fn new(data: Vec<u8>, format: ImageFormat) -> Self {
        Self { data, format }
    }

    /// Creates an image artifact, detecting the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| RetouchError::Decode("Unknown image format".into()))?;
        Ok(Self::new(data, format))
    }

    /// Reads an image from disk, detecting the format from magic bytes.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Parses a `data:<mime>;base64,<payload>` URL into an image artifact.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let (mime, payload) = split_data_url(url)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| RetouchError::Decode(e.to_string()))?;

        let format = ImageFormat::from_mime_type(mime)
            .or_else(|| ImageFormat::from_magic_bytes(&data))
            .ok_or_else(|| {
                RetouchError::Decode(format!("unsupported image MIME type: {mime}"))
            })?;

        Ok(Self::new(data, format))
    }

    /// Returns the MIME type for this image.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Returns the MIME-derived file extension.
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }

    /// Saves the image to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

/// A video with its raw bytes and MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoArtifact {
    /// Raw video bytes.
    pub data: Vec<u8>,
    /// MIME type (e.g., "video/mp4").
    pub mime_type: String,
}

impl VideoArtifact {
    /// Creates a new video artifact.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Returns the MIME-derived file extension.
    pub fn extension(&self) -> &str {
        self.mime_type
            .split_once('/')
            .map(|(_, sub)| sub)
            .filter(|s| !s.is_empty())
            .unwrap_or("mp4")
    }

    /// Returns the size of the video data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Returns the video as a data URL.
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }

    /// Saves the video to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

/// The kind of a media artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Still image; participates in edit history.
    Image,
    /// Video clip; stands outside the undo chain.
    Video,
}

/// A piece of displayable media. Images participate in edit history;
/// videos do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// An image snapshot.
    Image(ImageArtifact),
    /// A generated video.
    Video(VideoArtifact),
}

impl Artifact {
    /// Returns the kind tag for this artifact.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Image(_) => ArtifactKind::Image,
            Self::Video(_) => ArtifactKind::Video,
        }
    }

    /// Returns the image, if this artifact is one.
    pub fn as_image(&self) -> Option<&ImageArtifact> {
        match self {
            Self::Image(image) => Some(image),
            Self::Video(_) => None,
        }
    }

    /// Returns the MIME-derived file extension for downloads.
    pub fn extension(&self) -> &str {
        match self {
            Self::Image(image) => image.extension(),
            Self::Video(video) => video.extension(),
        }
    }

    /// Saves the artifact to the specified path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        match self {
            Self::Image(image) => image.save(path),
            Self::Video(video) => video.save(path),
        }
    }
}

impl From<ImageArtifact> for Artifact {
    fn from(image: ImageArtifact) -> Self {
        Self::Image(image)
    }
}

impl From<VideoArtifact> for Artifact {
    fn from(video: VideoArtifact) -> Self {
        Self::Video(video)
    }
}

/// Splits a data URL into its MIME type and base64 payload.
fn split_data_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| RetouchError::Decode("not a data URL".into()))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| RetouchError::Decode("data URL is not base64-encoded".into()))?;
    Ok((mime, payload))
}
