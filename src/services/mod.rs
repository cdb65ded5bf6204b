//! External synthesis services.
//!
//! The session core treats image editing, image generation, and video
//! generation as black boxes behind these traits. Concrete implementations
//! talk to Google's generative APIs: Gemini for images, Veo for video.

mod auth;
mod gemini;
mod veo;

pub use auth::{EnvKeyGate, TerminalAuthGate};
pub use gemini::{GeminiImageModel, GeminiImageService, GeminiImageServiceBuilder};
pub use veo::{VeoModel, VeoVideoService, VeoVideoServiceBuilder};

use crate::error::Result;
use crate::media::{ImageArtifact, VideoArtifact};
use async_trait::async_trait;

/// A reference to a generated video that has not been downloaded yet.
///
/// Video generation is two-phase: the service returns a handle when
/// synthesis completes, and the playable bytes are fetched separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHandle {
    /// Download URI for the video file.
    pub uri: String,
    /// Expected MIME type of the downloaded bytes.
    pub mime_type: String,
}

/// Image editing and generation service.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Applies an instruction to an existing image and returns the edited result.
    async fn edit(&self, image: &ImageArtifact, instruction: &str) -> Result<ImageArtifact>;

    /// Generates a new image from a text prompt.
    async fn generate(&self, prompt: &str) -> Result<ImageArtifact>;
}

/// Video generation service.
#[async_trait]
pub trait VideoService: Send + Sync {
    /// Generates a video from a text prompt, optionally conditioned on a
    /// seed image, and returns a handle to the finished video.
    async fn generate(
        &self,
        prompt: &str,
        seed: Option<&ImageArtifact>,
    ) -> Result<VideoHandle>;

    /// Downloads the playable video bytes for a handle.
    async fn fetch(&self, handle: &VideoHandle) -> Result<VideoArtifact>;
}

/// One-time authorization gate for video generation.
#[async_trait]
pub trait AuthGate: Send + Sync {
    /// Returns true if authorization has already been granted.
    async fn has_authorization(&self) -> bool;

    /// Interactively requests authorization from the user.
    async fn request_authorization(&self) -> Result<()>;
}
