#![warn(missing_docs)]
//! Retouch - AI-assisted image editing sessions with undo history.
//!
//! This crate wraps Google's generative APIs (Gemini for image editing and
//! generation, Veo for video generation) in an editing [`Session`]: load an
//! image, apply tools, undo/redo/reset, and export the result.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use retouch::{
//!     EnvKeyGate, GeminiImageService, ImageArtifact, Session, Tool, VeoVideoService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> retouch::Result<()> {
//!     let mut session = Session::new(
//!         Arc::new(GeminiImageService::builder().build()?),
//!         Arc::new(VeoVideoService::builder().build()?),
//!         Arc::new(EnvKeyGate::new()),
//!     );
//!
//!     session.upload(ImageArtifact::from_path("photo.png")?);
//!     session.apply(Tool::RemoveBackground, "").await?;
//!     session.apply(Tool::Prompt, "make the sky dramatic").await?;
//!     session.undo();
//!
//!     if let Some(artifact) = session.current() {
//!         artifact.save("edited.png")?;
//!     }
//!     Ok(())
//! }
//! ```

mod error;

pub mod history;
pub mod media;
pub mod services;
pub mod session;
pub mod tool;

// Re-export error types at crate root
pub use error::{Result, RetouchError};

// Re-export commonly used types
pub use history::History;
pub use media::{Artifact, ArtifactKind, ImageArtifact, ImageFormat, VideoArtifact};
pub use services::{
    AuthGate, EnvKeyGate, GeminiImageModel, GeminiImageService, GeminiImageServiceBuilder,
    ImageService, TerminalAuthGate, VeoModel, VeoVideoService, VeoVideoServiceBuilder,
    VideoHandle, VideoService,
};
pub use session::{ApplyOutcome, Session};
pub use tool::{PromptMode, Tool, ToolConfig};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, RetouchError};
    pub use crate::history::History;
    pub use crate::media::{Artifact, ArtifactKind, ImageArtifact, ImageFormat, VideoArtifact};
    pub use crate::services::{AuthGate, ImageService, VideoService};
    pub use crate::session::{ApplyOutcome, Session};
    pub use crate::tool::Tool;
}
