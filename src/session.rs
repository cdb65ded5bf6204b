//! Editing session: routes tool invocations to the synthesis services and
//! folds results back into the edit history.
//!
//! A session runs one invocation at a time through the phases
//! validate -> (reject | await authorization | in flight) -> (succeed | fail).
//! Video generation may suspend awaiting authorization; the validated request
//! is snapshotted and replayed verbatim once authorization is granted, so a
//! prompt or tool change made in the meantime cannot alter what runs.

use crate::error::{Result, RetouchError, STALE_KEY_SIGNATURE};
use crate::history::History;
use crate::media::{Artifact, ImageArtifact};
use crate::services::{AuthGate, ImageService, VideoService};
use crate::tool::{PromptMode, Tool};
use std::sync::Arc;

/// What a completed invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The current image was edited and appended to history.
    ImageEdited,
    /// A fresh image replaced the history.
    ImageGenerated,
    /// A video replaced the current content; history was cleared.
    VideoGenerated,
    /// Video generation is suspended until authorization is granted;
    /// call [`Session::authorize_and_resume`] to continue.
    AwaitingAuthorization,
}

/// A validated video request held while authorization is pending.
#[derive(Debug, Clone)]
struct PendingVideo {
    prompt: String,
    seed: Option<ImageArtifact>,
}

/// An editing session over one piece of media.
///
/// Invocations run strictly one at a time: [`Session::apply`] and
/// [`Session::authorize_and_resume`] take `&mut self`, so exclusive
/// ownership rules out a second request while one is outstanding.
pub struct Session {
    image_service: Arc<dyn ImageService>,
    video_service: Arc<dyn VideoService>,
    auth_gate: Arc<dyn AuthGate>,
    history: History,
    current: Option<Artifact>,
    /// Cached authorization state; None means not yet queried.
    authorized: Option<bool>,
    pending: Option<PendingVideo>,
}

impl Session {
    /// Creates a session with no content loaded.
    pub fn new(
        image_service: Arc<dyn ImageService>,
        video_service: Arc<dyn VideoService>,
        auth_gate: Arc<dyn AuthGate>,
    ) -> Self {
        Self {
            image_service,
            video_service,
            auth_gate,
            history: History::new(),
            current: None,
            authorized: None,
            pending: None,
        }
    }

    /// Loads an uploaded image as the new original, discarding any history.
    pub fn upload(&mut self, image: ImageArtifact) {
        self.history.load(image.clone());
        self.current = Some(Artifact::Image(image));
    }

    /// Runs one tool invocation against the current content.
    pub async fn apply(&mut self, tool: Tool, prompt: &str) -> Result<ApplyOutcome> {
        let instruction = resolve_instruction(tool, prompt)?;

        if tool.is_image_edit() && self.current_image().is_none() {
            return Err(RetouchError::NotAnImage);
        }

        if tool == Tool::GenerateVideo && !self.check_authorization().await {
            self.pending = Some(PendingVideo {
                prompt: instruction,
                seed: self.current_image().cloned(),
            });
            tracing::info!("video generation suspended pending authorization");
            return Ok(ApplyOutcome::AwaitingAuthorization);
        }

        self.dispatch(tool, instruction)
            .await
            .map_err(|e| self.classify_failure(tool == Tool::GenerateVideo, e))
    }

    /// Requests authorization and replays the suspended video request.
    /// The snapshot is consumed whether or not authorization succeeds, so
    /// the logical request runs at most once.
    pub async fn authorize_and_resume(&mut self) -> Result<ApplyOutcome> {
        let pending = self.pending.take().ok_or_else(|| {
            RetouchError::InvalidRequest("no suspended video request to resume".into())
        })?;

        self.auth_gate.request_authorization().await?;
        self.authorized = Some(true);

        self.generate_video(pending.prompt, pending.seed)
            .await
            .map_err(|e| self.classify_failure(true, e))
    }

    /// Discards a suspended video request, if any. Returns true if one existed.
    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Returns true if a video request is suspended awaiting authorization.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Steps back one edit. Returns false at the origin or when the
    /// current content is not part of a history.
    pub fn undo(&mut self) -> bool {
        let moved = self.history.undo();
        if moved {
            self.sync_current();
        }
        moved
    }

    /// Steps forward one edit. Returns false at the newest entry.
    pub fn redo(&mut self) -> bool {
        let moved = self.history.redo();
        if moved {
            self.sync_current();
        }
        moved
    }

    /// Returns to the original image without discarding later edits.
    pub fn reset(&mut self) -> bool {
        let moved = self.history.reset();
        if moved {
            self.sync_current();
        }
        moved
    }

    /// The artifact currently displayed, if any.
    pub fn current(&self) -> Option<&Artifact> {
        self.current.as_ref()
    }

    /// The edit history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Suggested download file name, extension derived from the current
    /// artifact's MIME type.
    pub fn download_file_name(&self) -> Option<String> {
        self.current
            .as_ref()
            .map(|a| format!("generated-content.{}", a.extension()))
    }

    fn current_image(&self) -> Option<&ImageArtifact> {
        self.current.as_ref().and_then(|a| a.as_image())
    }

    fn sync_current(&mut self) {
        if let Some(image) = self.history.current() {
            self.current = Some(Artifact::Image(image.clone()));
        }
    }

    async fn check_authorization(&mut self) -> bool {
        match self.authorized {
            Some(authorized) => authorized,
            None => {
                let authorized = self.auth_gate.has_authorization().await;
                self.authorized = Some(authorized);
                authorized
            }
        }
    }

    async fn dispatch(&mut self, tool: Tool, instruction: String) -> Result<ApplyOutcome> {
        match tool {
            Tool::Prompt | Tool::RemoveObject | Tool::Restore | Tool::RemoveBackground => {
                let image = self
                    .current_image()
                    .cloned()
                    .ok_or(RetouchError::NotAnImage)?;
                let edited = self.image_service.edit(&image, &instruction).await?;
                self.history.append(edited.clone());
                self.current = Some(Artifact::Image(edited));
                Ok(ApplyOutcome::ImageEdited)
            }
            Tool::GenerateImage => {
                let image = self.image_service.generate(&instruction).await?;
                self.history.load(image.clone());
                self.current = Some(Artifact::Image(image));
                Ok(ApplyOutcome::ImageGenerated)
            }
            Tool::GenerateVideo => {
                let seed = self.current_image().cloned();
                self.generate_video(instruction, seed).await
            }
        }
    }

    async fn generate_video(
        &mut self,
        prompt: String,
        seed: Option<ImageArtifact>,
    ) -> Result<ApplyOutcome> {
        let handle = self.video_service.generate(&prompt, seed.as_ref()).await?;
        let video = self.video_service.fetch(&handle).await?;

        // Videos are not part of the undo chain
        self.history.clear();
        self.current = Some(Artifact::Video(video));
        Ok(ApplyOutcome::VideoGenerated)
    }

    /// Invalidates the cached authorization on the known stale-key signature
    /// so the next video attempt re-prompts instead of retrying a dead key.
    fn classify_failure(&mut self, was_video: bool, err: RetouchError) -> RetouchError {
        if was_video && err.to_string().contains(STALE_KEY_SIGNATURE) {
            self.authorized = Some(false);
            tracing::warn!("stale API key detected, authorization invalidated");
            return RetouchError::Auth(
                "API Key error. Please re-select your API key and try again.".into(),
            );
        }
        err
    }
}

/// Resolves the instruction text for a tool, rejecting empty free text.
fn resolve_instruction(tool: Tool, prompt: &str) -> Result<String> {
    match tool.config().prompt_mode {
        PromptMode::FreeText { .. } => {
            let trimmed = prompt.trim();
            if trimmed.is_empty() {
                Err(RetouchError::MissingPrompt)
            } else {
                Ok(trimmed.to_string())
            }
        }
        PromptMode::Fixed { instruction } => Ok(instruction.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ArtifactKind, ImageFormat, VideoArtifact};
    use crate::services::VideoHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const PNG_MAGIC: [u8; 12] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn original() -> ImageArtifact {
        ImageArtifact::new(PNG_MAGIC.to_vec(), ImageFormat::Png)
    }

    #[derive(Default)]
    struct MockImageService {
        edit_calls: AtomicUsize,
        generate_calls: AtomicUsize,
        last_instruction: Mutex<Option<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ImageService for MockImageService {
        async fn edit(&self, _image: &ImageArtifact, instruction: &str) -> Result<ImageArtifact> {
            let n = self.edit_calls.fetch_add(1, Ordering::SeqCst) as u8;
            *self.last_instruction.lock().unwrap() = Some(instruction.to_string());
            if self.fail {
                return Err(RetouchError::Api {
                    status: 500,
                    message: "edit blew up".into(),
                });
            }
            Ok(ImageArtifact::new(vec![0xED, n], ImageFormat::Png))
        }

        async fn generate(&self, prompt: &str) -> Result<ImageArtifact> {
            let n = self.generate_calls.fetch_add(1, Ordering::SeqCst) as u8;
            *self.last_instruction.lock().unwrap() = Some(prompt.to_string());
            Ok(ImageArtifact::new(vec![0x6E, n], ImageFormat::Jpeg))
        }
    }

    #[derive(Default)]
    struct MockVideoService {
        generate_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
        seeded: AtomicBool,
        fail_message: Option<String>,
    }

    #[async_trait]
    impl VideoService for MockVideoService {
        async fn generate(
            &self,
            _prompt: &str,
            seed: Option<&ImageArtifact>,
        ) -> Result<VideoHandle> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.seeded.store(seed.is_some(), Ordering::SeqCst);
            if let Some(ref msg) = self.fail_message {
                return Err(RetouchError::VideoGeneration(msg.clone()));
            }
            Ok(VideoHandle {
                uri: "https://example.com/video.mp4".into(),
                mime_type: "video/mp4".into(),
            })
        }

        async fn fetch(&self, handle: &VideoHandle) -> Result<VideoArtifact> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(VideoArtifact::new(vec![1, 2, 3], handle.mime_type.clone()))
        }
    }

    struct MockAuthGate {
        authorized: AtomicBool,
        requests: AtomicUsize,
        grant: bool,
    }

    impl MockAuthGate {
        fn granted() -> Self {
            Self {
                authorized: AtomicBool::new(true),
                requests: AtomicUsize::new(0),
                grant: true,
            }
        }

        fn ungranted(grant_on_request: bool) -> Self {
            Self {
                authorized: AtomicBool::new(false),
                requests: AtomicUsize::new(0),
                grant: grant_on_request,
            }
        }
    }

    #[async_trait]
    impl AuthGate for MockAuthGate {
        async fn has_authorization(&self) -> bool {
            self.authorized.load(Ordering::SeqCst)
        }

        async fn request_authorization(&self) -> Result<()> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.grant {
                self.authorized.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(RetouchError::Auth("declined".into()))
            }
        }
    }

    struct Fixture {
        images: Arc<MockImageService>,
        videos: Arc<MockVideoService>,
        gate: Arc<MockAuthGate>,
        session: Session,
    }

    fn fixture_with(
        images: MockImageService,
        videos: MockVideoService,
        gate: MockAuthGate,
    ) -> Fixture {
        let images = Arc::new(images);
        let videos = Arc::new(videos);
        let gate = Arc::new(gate);
        let session = Session::new(images.clone(), videos.clone(), gate.clone());
        Fixture {
            images,
            videos,
            gate,
            session,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            MockImageService::default(),
            MockVideoService::default(),
            MockAuthGate::granted(),
        )
    }

    #[tokio::test]
    async fn test_fixed_instruction_edit_appends() {
        let mut f = fixture();
        f.session.upload(original());

        let outcome = f.session.apply(Tool::RemoveBackground, "").await.unwrap();
        assert_eq!(outcome, ApplyOutcome::ImageEdited);
        assert_eq!(f.session.history().len(), 2);
        assert_eq!(f.session.history().cursor(), 1);
        assert_eq!(
            f.images.last_instruction.lock().unwrap().as_deref(),
            Some("remove the background")
        );
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_service_call() {
        let mut f = fixture();
        f.session.upload(original());

        let err = f.session.apply(Tool::Prompt, "   ").await.unwrap_err();
        assert!(matches!(err, RetouchError::MissingPrompt));
        assert_eq!(f.images.edit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_tool_without_content_rejected() {
        let mut f = fixture();

        let err = f.session.apply(Tool::Restore, "").await.unwrap_err();
        assert!(matches!(err, RetouchError::NotAnImage));
        assert_eq!(f.images.edit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_tool_on_video_rejected() {
        let mut f = fixture();
        f.session.upload(original());
        f.session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap();
        assert_eq!(f.session.current().unwrap().kind(), ArtifactKind::Video);

        let err = f.session.apply(Tool::Prompt, "more contrast").await.unwrap_err();
        assert!(matches!(err, RetouchError::NotAnImage));
        assert_eq!(f.images.edit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_image_replaces_history() {
        let mut f = fixture();
        f.session.upload(original());
        f.session.apply(Tool::RemoveBackground, "").await.unwrap();
        assert_eq!(f.session.history().len(), 2);

        let outcome = f
            .session
            .apply(Tool::GenerateImage, "a cat astronaut on Mars")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::ImageGenerated);
        assert_eq!(f.session.history().len(), 1);
        assert_eq!(f.session.history().cursor(), 0);
        assert_eq!(
            f.images.last_instruction.lock().unwrap().as_deref(),
            Some("a cat astronaut on Mars")
        );
    }

    #[tokio::test]
    async fn test_video_clears_history_and_forwards_seed() {
        let mut f = fixture();
        f.session.upload(original());

        let outcome = f
            .session
            .apply(Tool::GenerateVideo, "a drone shot of a city")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::VideoGenerated);
        assert!(f.session.history().is_empty());
        assert_eq!(f.session.current().unwrap().kind(), ArtifactKind::Video);
        // The displayed image was forwarded as conditioning seed
        assert!(f.videos.seeded.load(Ordering::SeqCst));
        assert_eq!(f.videos.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_video_without_image_has_no_seed() {
        let mut f = fixture();

        f.session
            .apply(Tool::GenerateVideo, "ocean waves")
            .await
            .unwrap();
        assert!(!f.videos.seeded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unauthorized_video_suspends_then_resumes_once() {
        let mut f = fixture_with(
            MockImageService::default(),
            MockVideoService::default(),
            MockAuthGate::ungranted(true),
        );
        f.session.upload(original());

        let outcome = f
            .session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::AwaitingAuthorization);
        assert!(f.session.has_pending());
        // Suspended before any service call
        assert_eq!(f.videos.generate_calls.load(Ordering::SeqCst), 0);

        let outcome = f.session.authorize_and_resume().await.unwrap();
        assert_eq!(outcome, ApplyOutcome::VideoGenerated);
        assert_eq!(f.gate.requests.load(Ordering::SeqCst), 1);
        assert_eq!(f.videos.generate_calls.load(Ordering::SeqCst), 1);
        assert!(!f.session.has_pending());

        // The logical request ran exactly once; nothing left to resume
        let err = f.session.authorize_and_resume().await.unwrap_err();
        assert!(matches!(err, RetouchError::InvalidRequest(_)));
        assert_eq!(f.videos.generate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authorization_declined_consumes_pending() {
        let mut f = fixture_with(
            MockImageService::default(),
            MockVideoService::default(),
            MockAuthGate::ungranted(false),
        );

        f.session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap();
        assert!(f.session.has_pending());

        let err = f.session.authorize_and_resume().await.unwrap_err();
        assert!(matches!(err, RetouchError::Auth(_)));
        assert!(!f.session.has_pending());
        assert_eq!(f.videos.generate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_pending() {
        let mut f = fixture_with(
            MockImageService::default(),
            MockVideoService::default(),
            MockAuthGate::ungranted(true),
        );

        f.session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap();
        assert!(f.session.cancel_pending());
        assert!(!f.session.cancel_pending());

        let err = f.session.authorize_and_resume().await.unwrap_err();
        assert!(matches!(err, RetouchError::InvalidRequest(_)));
    }

    /// Video service that fails its first call with a preloaded error.
    struct OneShotFailingVideoService {
        err: Mutex<Option<RetouchError>>,
    }

    #[async_trait]
    impl VideoService for OneShotFailingVideoService {
        async fn generate(
            &self,
            _prompt: &str,
            _seed: Option<&ImageArtifact>,
        ) -> Result<VideoHandle> {
            Err(self
                .err
                .lock()
                .unwrap()
                .take()
                .expect("service was called more than once"))
        }

        async fn fetch(&self, _handle: &VideoHandle) -> Result<VideoArtifact> {
            panic!("fetch should never be reached");
        }
    }

    #[tokio::test]
    async fn test_stale_key_404_body_invalidates_authorization() {
        // The API reports a stale or revoked key as a 404 with this body;
        // drive the real error mapping, not a hand-built error
        let veo = crate::services::VeoVideoService::builder()
            .api_key("test-key")
            .build()
            .unwrap();
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;
        let err = veo.parse_error(404, body, &reqwest::header::HeaderMap::new());

        let mut session = Session::new(
            Arc::new(MockImageService::default()),
            Arc::new(OneShotFailingVideoService {
                err: Mutex::new(Some(err)),
            }),
            Arc::new(MockAuthGate::granted()),
        );

        let err = session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap_err();
        match err {
            RetouchError::Auth(msg) => assert!(msg.contains("re-select")),
            other => panic!("expected Auth error, got: {other:?}"),
        }

        // Authorization was invalidated, so the next attempt re-prompts
        // instead of retrying the dead key
        let outcome = session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::AwaitingAuthorization);
    }

    #[tokio::test]
    async fn test_stale_key_invalidates_authorization() {
        let mut f = fixture_with(
            MockImageService::default(),
            MockVideoService {
                fail_message: Some("Requested entity was not found.".into()),
                ..Default::default()
            },
            MockAuthGate::granted(),
        );

        let err = f
            .session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap_err();
        match err {
            RetouchError::Auth(msg) => assert!(msg.contains("re-select")),
            other => panic!("expected Auth error, got: {other:?}"),
        }

        // Cached authorization is now false: the next attempt re-prompts
        // even though the gate itself still reports authorized
        let outcome = f
            .session
            .apply(Tool::GenerateVideo, "a drone shot")
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::AwaitingAuthorization);
    }

    #[tokio::test]
    async fn test_service_failure_surfaces_and_leaves_history_intact() {
        let mut f = fixture_with(
            MockImageService {
                fail: true,
                ..Default::default()
            },
            MockVideoService::default(),
            MockAuthGate::granted(),
        );
        f.session.upload(original());

        let err = f.session.apply(Tool::Prompt, "add a hat").await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "Operation failed: API error: 500 - edit blew up"
        );
        assert_eq!(f.session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_edit_undo_branch_discard() {
        let mut f = fixture();
        let i0 = original();
        f.session.upload(i0.clone());

        // remove-bg -> [I0, I1]
        f.session.apply(Tool::RemoveBackground, "").await.unwrap();
        assert_eq!(f.session.history().len(), 2);
        assert_eq!(f.session.history().cursor(), 1);

        // undo -> displaying I0
        assert!(f.session.undo());
        assert_eq!(f.session.history().cursor(), 0);
        assert_eq!(f.session.current().unwrap().as_image(), Some(&i0));

        // prompt edit -> I1 discarded, [I0, I2]
        f.session
            .apply(Tool::Prompt, "make the sky dramatic")
            .await
            .unwrap();
        assert_eq!(f.session.history().len(), 2);
        assert_eq!(f.session.history().cursor(), 1);
        assert!(!f.session.redo());

        // download name extension follows the current artifact's MIME type
        assert_eq!(
            f.session.download_file_name().as_deref(),
            Some("generated-content.png")
        );
    }

    #[tokio::test]
    async fn test_reset_returns_to_original() {
        let mut f = fixture();
        let i0 = original();
        f.session.upload(i0.clone());
        f.session.apply(Tool::RemoveBackground, "").await.unwrap();
        f.session.apply(Tool::Restore, "").await.unwrap();

        assert!(f.session.reset());
        assert_eq!(f.session.current().unwrap().as_image(), Some(&i0));
        assert_eq!(f.session.history().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_resets_session_content() {
        let mut f = fixture();
        f.session.upload(original());
        f.session.apply(Tool::RemoveBackground, "").await.unwrap();

        let fresh = ImageArtifact::new(vec![0xFF, 0xD8, 0xFF, 0xE0], ImageFormat::Jpeg);
        f.session.upload(fresh.clone());
        assert_eq!(f.session.history().len(), 1);
        assert_eq!(f.session.current().unwrap().as_image(), Some(&fresh));
        assert_eq!(
            f.session.download_file_name().as_deref(),
            Some("generated-content.jpg")
        );
    }

    #[tokio::test]
    async fn test_download_name_for_video() {
        let mut f = fixture();
        f.session.apply(Tool::GenerateVideo, "waves").await.unwrap();
        assert_eq!(
            f.session.download_file_name().as_deref(),
            Some("generated-content.mp4")
        );
    }
}
