//! Capture session state machine.
//!
//! ```text
//! Idle → Acquiring → Streaming → Detecting → Detected → Capturing → Extracting → Ready
//!           │                        ▲                                  │
//!           ▼                        └──────── extraction failed ───────┘
//!      Unavailable ── start() retries ──▶ Acquiring
//! ```
//!
//! State lives in a `watch` channel: callers subscribe instead of polling,
//! and every transition is a compare-and-set through `send_if_modified`, so
//! a capture request that loses the race observes `Capturing` and is ignored.
//! Camera tracks are released by `stop()` and unconditionally on drop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::detection::{DocumentDetector, SettleDelayDetector};
use super::media::{MediaError, MediaSource, MediaStream, VideoConstraints};
use crate::config::IntakeConfig;
use crate::models::DocumentSource;
use crate::pipeline::draft::{scanned_document_name, DraftDocument, ExtractionOutcome};
use crate::pipeline::extraction::{extract_with_timeout, ExtractionRequest, Extractor};
use crate::pipeline::IntakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailability {
    PermissionDenied,
    NoDevice,
    DeviceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Acquiring,
    /// Camera could not be opened; `start()` retries from here.
    Unavailable { reason: Unavailability },
    Streaming,
    Detecting,
    Detected,
    Capturing,
    Extracting,
    Ready,
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Unavailable { .. } => "unavailable",
            Self::Streaming => "streaming",
            Self::Detecting => "detecting",
            Self::Detected => "detected",
            Self::Capturing => "capturing",
            Self::Extracting => "extracting",
            Self::Ready => "ready",
        }
    }

    /// Short prompt shown over the viewfinder.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Idle => "Camera is off",
            Self::Acquiring => "Opening camera...",
            Self::Unavailable { .. } => "Camera access required. Please allow camera permissions.",
            Self::Streaming | Self::Detecting => "Position document in the frame",
            Self::Detected => "Document detected! Tap to capture",
            Self::Capturing | Self::Extracting => "Processing...",
            Self::Ready => "Document captured",
        }
    }

    /// True when a capture request would be accepted.
    pub fn can_capture(&self) -> bool {
        matches!(self, Self::Detected)
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(DraftDocument),
    /// Not in `Detected`, e.g. a second tap while the first is in flight.
    Ignored,
}

pub struct CaptureSession {
    inner: Arc<Inner>,
}

struct Inner {
    media: Arc<dyn MediaSource>,
    extractor: Arc<dyn Extractor>,
    detector: Arc<dyn DocumentDetector>,
    constraints: VideoConstraints,
    poll: Duration,
    extraction_timeout: Duration,
    state: watch::Sender<CaptureState>,
    stream: Mutex<Option<Arc<dyn MediaStream>>>,
    detection: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CaptureSession {
    pub fn new(
        media: Arc<dyn MediaSource>,
        extractor: Arc<dyn Extractor>,
        config: &IntakeConfig,
    ) -> Self {
        let detector = Arc::new(SettleDelayDetector::new(config.detection_settle()));
        Self::with_detector(media, extractor, detector, config)
    }

    pub fn with_detector(
        media: Arc<dyn MediaSource>,
        extractor: Arc<dyn Extractor>,
        detector: Arc<dyn DocumentDetector>,
        config: &IntakeConfig,
    ) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        Self {
            inner: Arc::new(Inner {
                media,
                extractor,
                detector,
                constraints: VideoConstraints::default(),
                poll: config.detection_poll(),
                extraction_timeout: config.extraction_timeout(),
                state,
                stream: Mutex::new(None),
                detection: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.inner.state.subscribe()
    }

    /// Open the camera and start watching for a document.
    /// Valid from `Idle`, and from `Unavailable` as a retry.
    pub async fn start(&self) -> Result<(), IntakeError> {
        let inner = &self.inner;
        if !inner.transition(
            |s| matches!(s, CaptureState::Idle | CaptureState::Unavailable { .. }),
            CaptureState::Acquiring,
        ) {
            return Err(IntakeError::InvalidTransition {
                action: "start the camera",
                state: self.state().name().into(),
            });
        }

        tracing::info!("Requesting camera access");
        let stream = match inner.media.acquire(&inner.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                let reason = match e {
                    MediaError::PermissionDenied => Unavailability::PermissionDenied,
                    MediaError::NoDevice => Unavailability::NoDevice,
                    _ => Unavailability::DeviceError,
                };
                tracing::warn!(error = %e, "Camera unavailable");
                inner.transition(
                    |s| matches!(s, CaptureState::Acquiring),
                    CaptureState::Unavailable { reason },
                );
                return Err(e.into());
            }
        };

        inner.replace_stream(Some(stream));
        if !inner.transition(|s| matches!(s, CaptureState::Acquiring), CaptureState::Streaming) {
            // Stopped while the permission prompt was up.
            inner.replace_stream(None);
            return Err(IntakeError::Cancelled);
        }

        inner.resume_detection(|s| matches!(s, CaptureState::Streaming));
        Ok(())
    }

    /// Grab the current frame and run extraction on it.
    ///
    /// Single-shot: only accepted in `Detected`. Requests arriving in any
    /// other state, including while a capture is in flight, are ignored.
    pub async fn capture(&self) -> Result<CaptureOutcome, IntakeError> {
        let inner = &self.inner;
        if !inner.transition(|s| matches!(s, CaptureState::Detected), CaptureState::Capturing) {
            tracing::debug!(state = self.state().name(), "Capture request ignored");
            return Ok(CaptureOutcome::Ignored);
        }

        let stream = inner.current_stream().ok_or(IntakeError::Cancelled)?;
        let frame = match stream.grab_frame().await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Frame grab failed");
                inner.resume_detection(|s| matches!(s, CaptureState::Capturing));
                return Err(IntakeError::CaptureFailed(e.to_string()));
            }
        };

        if !inner.transition(|s| matches!(s, CaptureState::Capturing), CaptureState::Extracting) {
            return Err(IntakeError::Cancelled);
        }

        let request = ExtractionRequest::bytes(frame.data.clone(), frame.mime_type.clone());
        let result =
            match extract_with_timeout(inner.extractor.as_ref(), request, inner.extraction_timeout)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    // Keep the stream; the user retries without re-acquiring.
                    inner.resume_detection(|s| matches!(s, CaptureState::Extracting));
                    return Err(IntakeError::ExtractionFailed(e));
                }
            };

        if !inner.transition(|s| matches!(s, CaptureState::Extracting), CaptureState::Ready) {
            return Err(IntakeError::Cancelled);
        }

        let now = Utc::now();
        tracing::info!(
            bytes = frame.data.len(),
            width = frame.width,
            height = frame.height,
            confidence = result.confidence,
            "Document captured"
        );

        Ok(CaptureOutcome::Captured(DraftDocument {
            suggested_name: scanned_document_name(now),
            source: DocumentSource::Camera,
            mime_type: frame.mime_type,
            size_bytes: Some(frame.data.len() as u64),
            source_file_name: None,
            created_at: now,
            extraction: ExtractionOutcome::Completed(result),
            ignored_files: Vec::new(),
            content: Some(frame.data),
        }))
    }

    /// After a capture, go back to detection on the same stream. The
    /// detection task is spawned on the current runtime.
    pub async fn scan_another(&self) -> Result<(), IntakeError> {
        if self
            .inner
            .resume_detection(|s| matches!(s, CaptureState::Ready))
        {
            Ok(())
        } else {
            Err(IntakeError::InvalidTransition {
                action: "scan another",
                state: self.state().name().into(),
            })
        }
    }

    /// Release the camera and return to `Idle`. Safe in any state.
    pub fn stop(&self) {
        self.inner.teardown();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl Inner {
    /// Compare-and-set on the state. Returns whether the transition happened.
    fn transition(&self, from: impl FnOnce(&CaptureState) -> bool, to: CaptureState) -> bool {
        self.state.send_if_modified(move |current| {
            if !from(current) {
                return false;
            }
            tracing::debug!(from = current.name(), to = to.name(), "Capture state");
            *current = to;
            true
        })
    }

    fn current_stream(&self) -> Option<Arc<dyn MediaStream>> {
        lock(&self.stream).clone()
    }

    fn replace_stream(&self, next: Option<Arc<dyn MediaStream>>) {
        let previous = std::mem::replace(&mut *lock(&self.stream), next);
        if let Some(stream) = previous {
            stream.release();
            tracing::info!("Camera tracks released");
        }
    }

    /// Move to `Detecting` from a state accepted by `from`, then start a
    /// fresh detection run.
    fn resume_detection(self: &Arc<Self>, from: impl FnOnce(&CaptureState) -> bool) -> bool {
        if !self.transition(from, CaptureState::Detecting) {
            return false;
        }
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.run_detection().await });
        if let Some(previous) = lock(&self.detection).replace(handle) {
            previous.abort();
        }
        true
    }

    /// One detection run: ends after a single `Detected` transition, or as
    /// soon as the session leaves `Detecting`.
    async fn run_detection(&self) {
        let started = tokio::time::Instant::now();
        let mut ticker = tokio::time::interval(self.poll);

        loop {
            ticker.tick().await;

            let detecting = matches!(*self.state.borrow(), CaptureState::Detecting);
            if !detecting {
                return;
            }
            let Some(stream) = self.current_stream() else {
                return;
            };

            let frame = match stream.grab_frame().await {
                Ok(frame) => frame,
                Err(MediaError::StreamEnded) => {
                    tracing::warn!("Stream ended during detection");
                    return;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping frame");
                    continue;
                }
            };

            if self.detector.detect(&frame, started.elapsed()) {
                if self.transition(|s| matches!(s, CaptureState::Detecting), CaptureState::Detected)
                {
                    tracing::info!(
                        after_ms = started.elapsed().as_millis() as u64,
                        "Document detected"
                    );
                }
                return;
            }
        }
    }

    fn teardown(&self) {
        if let Some(handle) = lock(&self.detection).take() {
            handle.abort();
        }
        self.replace_stream(None);
        self.transition(|s| !matches!(s, CaptureState::Idle), CaptureState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::capture::media::{CameraAccess, SyntheticCamera};
    use crate::pipeline::extraction::{CannedExtractor, ExtractionError};

    fn session(camera: &SyntheticCamera, extractor: &Arc<CannedExtractor>) -> CaptureSession {
        CaptureSession::new(
            Arc::new(camera.clone()),
            extractor.clone(),
            &IntakeConfig::default(),
        )
    }

    async fn wait_for(session: &CaptureSession, want: CaptureState) {
        let mut rx = session.subscribe();
        rx.wait_for(|s| *s == want).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn start_reaches_detected_after_settle() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);

        session.start().await.unwrap();
        assert_eq!(session.state(), CaptureState::Detecting);

        wait_for(&session, CaptureState::Detected).await;
        assert!(session.state().can_capture());
        assert_eq!(camera.live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn detected_holds_until_capture() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;

        let mut rx = session.subscribe();
        rx.mark_unchanged();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(session.state(), CaptureState::Detected);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_before_detection_is_ignored() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();

        let outcome = session.capture().await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Ignored));
        assert_eq!(extractor.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_double_capture_runs_once() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;

        let (first, second) = tokio::join!(session.capture(), session.capture());
        let outcomes = [first.unwrap(), second.unwrap()];

        let captured = outcomes
            .iter()
            .filter(|o| matches!(o, CaptureOutcome::Captured(_)))
            .count();
        let ignored = outcomes
            .iter()
            .filter(|o| matches!(o, CaptureOutcome::Ignored))
            .count();
        assert_eq!((captured, ignored), (1, 1));
        assert_eq!(extractor.calls(), 1);
        assert_eq!(session.state(), CaptureState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn captured_draft_carries_extraction() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;

        let CaptureOutcome::Captured(draft) = session.capture().await.unwrap() else {
            panic!("expected a draft");
        };
        assert_eq!(draft.source, DocumentSource::Camera);
        assert!(draft.suggested_name.starts_with("Scanned Document "));
        assert_eq!(draft.mime_type, "image/jpeg");
        assert_eq!(draft.size_bytes, Some(64));
        let result = draft.extraction.result().unwrap();
        assert_eq!(result.document_type, "Insurance Card");
        assert_eq!(result.confidence, 0.95);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_extraction_keeps_stream_and_redetects() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::failing("glare"));
        let session = session(&camera, &extractor);
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;

        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, IntakeError::ExtractionFailed(ExtractionError::Failed(_))));
        assert!(err.is_recoverable());
        assert_eq!(session.state(), CaptureState::Detecting);

        wait_for(&session, CaptureState::Detected).await;
        assert_eq!(camera.acquisitions(), 1);
        assert_eq!(camera.live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_extraction_resolves_to_failure() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(
            CannedExtractor::insurance_card().with_delay(Duration::from_secs(3600)),
        );
        let config = IntakeConfig {
            extraction_timeout_ms: 5_000,
            ..IntakeConfig::default()
        };
        let session = CaptureSession::new(Arc::new(camera.clone()), extractor.clone(), &config);
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;

        let err = session.capture().await.unwrap_err();
        assert!(matches!(
            err,
            IntakeError::ExtractionFailed(ExtractionError::TimedOut(_))
        ));
        assert_eq!(session.state(), CaptureState::Detecting);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_then_retry() {
        let camera = SyntheticCamera::new(CameraAccess::Denied);
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, IntakeError::PermissionDenied));
        assert_eq!(
            session.state(),
            CaptureState::Unavailable {
                reason: Unavailability::PermissionDenied
            }
        );

        camera.set_access(CameraAccess::Granted);
        session.start().await.unwrap();
        assert_eq!(session.state(), CaptureState::Detecting);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_device_reported() {
        let camera = SyntheticCamera::new(CameraAccess::Missing);
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);

        assert!(matches!(session.start().await, Err(IntakeError::NoDevice)));
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_rejected() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();

        assert!(matches!(
            session.start().await,
            Err(IntakeError::InvalidTransition { .. })
        ));
        assert_eq!(camera.acquisitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_another_returns_to_detection() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;
        session.capture().await.unwrap();

        session.scan_another().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;
        assert_eq!(camera.acquisitions(), 1);
        assert!(session.scan_another().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_releases_tracks() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = session(&camera, &extractor);
        session.start().await.unwrap();

        session.stop();
        assert_eq!(camera.live_streams(), 0);
        assert_eq!(session.state(), CaptureState::Idle);
        session.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn drop_releases_tracks() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        {
            let session = session(&camera, &extractor);
            session.start().await.unwrap();
            wait_for(&session, CaptureState::Detected).await;
            assert_eq!(camera.live_streams(), 1);
        }
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_extraction_discards_draft() {
        let camera = SyntheticCamera::granted();
        let extractor = Arc::new(CannedExtractor::insurance_card());
        let session = Arc::new(session(&camera, &extractor));
        session.start().await.unwrap();
        wait_for(&session, CaptureState::Detected).await;

        let task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.capture().await }
        });
        wait_for(&session, CaptureState::Extracting).await;
        session.stop();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(IntakeError::Cancelled)));
        assert_eq!(session.state(), CaptureState::Idle);
        assert_eq!(camera.live_streams(), 0);
    }
}
