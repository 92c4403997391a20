use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{AnalysisError, AnalysisResult, ErrorKind};
use crate::models::{
    AnalysisRequest, CanonicalImage, PromptVersion, ResultTab, SessionSnapshot, SessionState,
};
use crate::services::{ImageSource, ParsedAnalysis, ResponseParser, UploadedFile, VisionService};

const DEGRADED_NOTICE: &str =
    "Some details could not be read from the analysis. Showing what was recovered.";

/// What happened to a capture/upload trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Another analysis was already in flight; nothing was done.
    Ignored,
    Ready { degraded: bool },
    Failed(ErrorKind),
}

/// Drives one user's scan flow: image in, analysis out, one provider call
/// at a time. The current `SessionSnapshot` lives in a watch channel so the
/// presentation layer can subscribe to transitions.
pub struct AnalysisSession {
    vision: Arc<dyn VisionService>,
    image_source: ImageSource,
    prompt_version: PromptVersion,
    state: watch::Sender<SessionSnapshot>,
}

impl AnalysisSession {
    pub fn new(vision: Arc<dyn VisionService>, image_source: ImageSource) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            vision,
            image_source,
            prompt_version: PromptVersion::CURRENT,
            state,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Returns false when the transition does not apply in the current state.
    pub fn start_camera(&self) -> bool {
        let changed = self.update(|s| match s.state {
            SessionState::Analyzing | SessionState::CapturingPreview => false,
            _ => {
                s.state = SessionState::CapturingPreview;
                s.error = None;
                true
            }
        });

        if changed {
            log::info!("📷 Camera preview started");
        }
        changed
    }

    /// Closes the preview only. An analysis in flight keeps running.
    pub fn cancel_camera(&self) -> bool {
        let changed = self.update(|s| match s.state {
            SessionState::CapturingPreview => {
                s.state = SessionState::Idle;
                true
            }
            _ => false,
        });

        if changed {
            log::info!("📷 Camera preview closed");
        }
        changed
    }

    pub fn select_tab(&self, tab: ResultTab) {
        self.update(|s| {
            if s.tab == tab {
                return false;
            }
            s.tab = tab;
            true
        });
    }

    pub async fn capture_and_analyze(&self, frame_bytes: Vec<u8>) -> TriggerOutcome {
        if self.is_analyzing() {
            log::info!("⏳ Capture ignored, analysis already in progress");
            return TriggerOutcome::Ignored;
        }

        let image = self.image_source.from_capture(frame_bytes);
        self.analyze(image).await
    }

    pub async fn upload_and_analyze(&self, files: Vec<UploadedFile>) -> TriggerOutcome {
        if self.is_analyzing() {
            log::info!("⏳ Upload ignored, analysis already in progress");
            return TriggerOutcome::Ignored;
        }

        let image = self.image_source.from_first_upload(files).await;
        self.analyze(image).await
    }

    fn is_analyzing(&self) -> bool {
        self.state.borrow().state.is_analyzing()
    }

    async fn analyze(&self, image: AnalysisResult<CanonicalImage>) -> TriggerOutcome {
        let image = match image {
            Ok(image) => image,
            Err(e) => return self.fail(e),
        };

        // Check-and-claim in one step; whoever loses the race is ignored.
        let claimed = self.update(|s| {
            if s.state.is_analyzing() {
                return false;
            }
            s.state = SessionState::Analyzing;
            s.error = None;
            s.notice = None;
            s.degraded = false;
            true
        });
        if !claimed {
            log::info!("⏳ Trigger ignored, analysis already in progress");
            return TriggerOutcome::Ignored;
        }

        let request = AnalysisRequest::new(image, self.prompt_version);
        log::info!(
            "🔍 Analyzing {} image ({} bytes)",
            request.image().mime_type(),
            request.image().len()
        );

        let result = self.vision.analyze(&request).await;
        let parser = ResponseParser::new(request.prompt_version());
        drop(request);

        match result {
            Ok(text) => self.finish(parser.parse(&text)),
            Err(e) => self.fail(e),
        }
    }

    fn finish(&self, parsed: ParsedAnalysis) -> TriggerOutcome {
        let degraded = parsed.is_degraded();
        let analysis = parsed.analysis;

        log::info!(
            "✅ Analysis ready: '{}' rated {:.1}/10{}",
            analysis.name,
            analysis.rating,
            if degraded { " (degraded)" } else { "" }
        );

        self.update(|s| {
            s.state = SessionState::Ready(analysis.clone());
            s.analysis = Some(analysis);
            s.degraded = degraded;
            s.notice = degraded.then(|| DEGRADED_NOTICE.to_string());
            s.error = None;
            s.tab = ResultTab::Info;
            true
        });

        TriggerOutcome::Ready { degraded }
    }

    /// Enters `Failed`, keeping the last good analysis for display.
    fn fail(&self, err: AnalysisError) -> TriggerOutcome {
        let kind = err.kind();
        let failed = self.update(|s| {
            // An input error must not clobber an analysis that started meanwhile.
            if kind.is_input_stage() && s.state.is_analyzing() {
                return false;
            }
            s.state = SessionState::Failed(kind);
            s.error = Some(kind.user_message().to_string());
            s.notice = None;
            s.degraded = false;
            true
        });

        if !failed {
            return TriggerOutcome::Ignored;
        }

        if kind.is_input_stage() {
            log::warn!("⚠️ Input rejected: {}", err);
        } else {
            log::error!("❌ Analysis failed: {}", err);
        }
        TriggerOutcome::Failed(kind)
    }

    fn update(&self, modify: impl FnOnce(&mut SessionSnapshot) -> bool) -> bool {
        self.state.send_if_modified(|s| {
            let changed = modify(s);
            if changed {
                s.updated_at = Utc::now();
                log::debug!("Session state -> {}", s.state);
            }
            changed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    const FULL_REPLY: &str = "Medicine Name: Paracetamol 500 mg\nSafety Rating: 8/10\n\
        Side Effects:\n- Rare rash\nRecent Studies:\n- 2021 liver safety review\n\
        Recommendations: Max 4 g per day\nUser Stories:\n- Works well\n\
        Alternatives:\n- Ibuprofen\nPrice Range: $2-$5\nAvailability: Over the counter";

    struct StubVision {
        replies: Mutex<VecDeque<AnalysisResult<String>>>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl StubVision {
        fn new(replies: Vec<AnalysisResult<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn gated(reply: &str, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(vec![Ok(reply.to_string())])
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl VisionService for StubVision {
        async fn analyze(&self, _request: &AnalysisRequest) -> AnalysisResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AnalysisError::Transport("no reply queued".to_string())))
        }
    }

    fn session(vision: Arc<StubVision>) -> AnalysisSession {
        AnalysisSession::new(vision, ImageSource::default())
    }

    #[tokio::test]
    async fn test_capture_to_ready() {
        let vision = Arc::new(StubVision::new(vec![Ok(FULL_REPLY.to_string())]));
        let session = session(vision.clone());

        assert!(session.start_camera());
        assert_eq!(session.snapshot().state, SessionState::CapturingPreview);

        let outcome = session.capture_and_analyze(vec![0xff, 0xd8, 0xff]).await;
        assert_eq!(outcome, TriggerOutcome::Ready { degraded: false });

        let snapshot = session.snapshot();
        let analysis = snapshot.analysis.clone().unwrap();
        assert_eq!(analysis.name, "Paracetamol 500 mg");
        assert_eq!(analysis.rating, 8.0);
        assert_eq!(snapshot.state, SessionState::Ready(analysis));
        assert!(!snapshot.degraded);
        assert!(snapshot.error.is_none());
        assert_eq!(vision.calls(), 1);
    }

    #[tokio::test]
    async fn test_degraded_result_is_ready_with_notice() {
        let vision = Arc::new(StubVision::new(vec![Ok("Medicine Name: Mystery pill".to_string())]));
        let session = session(vision);

        let outcome = session.capture_and_analyze(vec![1]).await;
        assert_eq!(outcome, TriggerOutcome::Ready { degraded: true });

        let snapshot = session.snapshot();
        assert!(matches!(snapshot.state, SessionState::Ready(_)));
        assert!(snapshot.degraded);
        assert!(snapshot.notice.is_some());
        assert_eq!(snapshot.analysis.unwrap().name, "Mystery pill");
    }

    #[tokio::test]
    async fn test_bmp_upload_rejected_without_call() {
        let vision = Arc::new(StubVision::new(vec![Ok(FULL_REPLY.to_string())]));
        let session = session(vision.clone());

        let bmp = vec![0x42, 0x4d];
        let bmp = UploadedFile::from_bytes("box.bmp", Some("image/bmp".to_string()), bmp);
        let files = vec![bmp];
        let outcome = session.upload_and_analyze(files).await;

        assert_eq!(outcome, TriggerOutcome::Failed(ErrorKind::UnsupportedFormat));
        assert_eq!(session.snapshot().state, SessionState::Failed(ErrorKind::UnsupportedFormat));
        assert!(session.snapshot().error.is_some());
        assert_eq!(vision.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_keeps_previous_result() {
        let vision = Arc::new(StubVision::new(vec![
            Ok(FULL_REPLY.to_string()),
            Err(AnalysisError::Timeout(Duration::from_secs(30))),
        ]));
        let session = session(vision.clone());

        session.capture_and_analyze(vec![1]).await;
        let outcome = session
            .upload_and_analyze(vec![UploadedFile::from_bytes("box.png", None, vec![2])])
            .await;

        assert_eq!(outcome, TriggerOutcome::Failed(ErrorKind::Timeout));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Failed(ErrorKind::Timeout));
        assert_eq!(snapshot.error.as_deref(), Some(ErrorKind::Timeout.user_message()));
        assert_eq!(snapshot.analysis.unwrap().name, "Paracetamol 500 mg");
        assert_eq!(vision.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_failure_reaches_ready() {
        let vision = Arc::new(StubVision::new(vec![
            Ok("Medicine Name: Mystery pill".to_string()),
            Err(AnalysisError::Timeout(Duration::from_secs(30))),
            Ok(FULL_REPLY.to_string()),
        ]));
        let session = session(vision.clone());

        let outcome = session.capture_and_analyze(vec![1]).await;
        assert_eq!(outcome, TriggerOutcome::Ready { degraded: true });
        assert!(session.snapshot().degraded);

        let outcome = session.capture_and_analyze(vec![2]).await;
        assert_eq!(outcome, TriggerOutcome::Failed(ErrorKind::Timeout));
        let snapshot = session.snapshot();
        assert!(!snapshot.degraded);
        assert!(snapshot.notice.is_none());
        assert_eq!(snapshot.analysis.unwrap().name, "Mystery pill");

        let mut rx = session.subscribe();
        let retry = session.capture_and_analyze(vec![3]).await;
        assert_eq!(retry, TriggerOutcome::Ready { degraded: false });
        assert!(rx.has_changed().unwrap());

        let snapshot = session.snapshot();
        let analysis = snapshot.analysis.clone().unwrap();
        assert_eq!(analysis.name, "Paracetamol 500 mg");
        assert_eq!(snapshot.state, SessionState::Ready(analysis));
        assert!(snapshot.error.is_none());
        assert!(!snapshot.degraded);
        assert_eq!(vision.calls(), 3);
    }

    #[tokio::test]
    async fn test_provider_error_text_not_exposed() {
        let vision = Arc::new(StubVision::new(vec![Err(AnalysisError::Provider {
            status: 401,
            message: "invalid key sk-or-secret".to_string(),
        })]));
        let session = session(vision);

        session.capture_and_analyze(vec![1]).await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Failed(ErrorKind::ProviderError));
        assert!(!snapshot.error.unwrap().contains("sk-or-secret"));
        assert!(snapshot.analysis.is_none());
    }

    #[tokio::test]
    async fn test_new_result_replaces_previous() {
        let vision = Arc::new(StubVision::new(vec![
            Ok(FULL_REPLY.to_string()),
            Ok("Medicine Name: Aspirin\nSafety Rating: 6".to_string()),
        ]));
        let session = session(vision);

        session.capture_and_analyze(vec![1]).await;
        session.capture_and_analyze(vec![2]).await;

        let analysis = session.snapshot().analysis.unwrap();
        assert_eq!(analysis.name, "Aspirin");
        assert!(analysis.side_effects.is_empty());
        assert_eq!(analysis.rating, 6.0);
    }

    #[tokio::test]
    async fn test_trigger_while_analyzing_is_ignored() {
        let gate = Arc::new(Notify::new());
        let vision = Arc::new(StubVision::gated(FULL_REPLY, gate.clone()));
        let session = Arc::new(session(vision.clone()));
        let mut rx = session.subscribe();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.capture_and_analyze(vec![1]).await }
        });

        rx.wait_for(|s| s.state.is_analyzing()).await.unwrap();

        assert_eq!(session.capture_and_analyze(vec![2]).await, TriggerOutcome::Ignored);
        let files = vec![UploadedFile::from_bytes("box.png", None, vec![3])];
        assert_eq!(session.upload_and_analyze(files).await, TriggerOutcome::Ignored);
        assert!(!session.start_camera());

        // Closing the camera does not touch the running analysis.
        assert!(!session.cancel_camera());
        assert!(session.snapshot().state.is_analyzing());

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Ready { degraded: false });
        assert_eq!(vision.calls(), 1);
    }

    #[tokio::test]
    async fn test_camera_transitions() {
        let session = session(Arc::new(StubVision::new(Vec::new())));

        assert!(!session.cancel_camera());
        assert!(session.start_camera());
        assert!(!session.start_camera());
        assert!(session.cancel_camera());
        assert_eq!(session.snapshot().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_select_tab() {
        let session = session(Arc::new(StubVision::new(Vec::new())));
        let mut rx = session.subscribe();

        session.select_tab(ResultTab::Stories);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().tab, ResultTab::Stories);

        session.select_tab(ResultTab::Stories);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_initial_snapshot() {
        let session = session(Arc::new(StubVision::new(Vec::new())));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Idle);
        assert!(snapshot.analysis.is_none());
        assert_eq!(snapshot.tab, ResultTab::Info);
    }
}
