use std::sync::Arc;

use serde::Serialize;

use super::capture::{CaptureSession, CaptureState, MediaSource};
use super::extraction::Extractor;
use super::upload::UploadSession;
use super::IntakeError;
use crate::config::IntakeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeMode {
    Camera,
    Upload,
}

pub enum ActiveSession {
    Camera(CaptureSession),
    Upload(UploadSession),
}

impl ActiveSession {
    pub fn mode(&self) -> IntakeMode {
        match self {
            Self::Camera(_) => IntakeMode::Camera,
            Self::Upload(_) => IntakeMode::Upload,
        }
    }
}

/// One document-intake flow. Camera and upload are mutually exclusive:
/// opening one mode tears the other down first.
pub struct IntakeFlow {
    media: Arc<dyn MediaSource>,
    extractor: Arc<dyn Extractor>,
    config: IntakeConfig,
    active: Option<ActiveSession>,
}

impl IntakeFlow {
    pub fn new(
        media: Arc<dyn MediaSource>,
        extractor: Arc<dyn Extractor>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            media,
            extractor,
            config,
            active: None,
        }
    }

    pub fn mode(&self) -> Option<IntakeMode> {
        self.active.as_ref().map(ActiveSession::mode)
    }

    /// Switch to the camera and start it. A camera that could not be opened
    /// stays active in `Unavailable`; calling this again retries acquisition.
    pub async fn open_camera(&mut self) -> Result<(), IntakeError> {
        if let Some(session) = self.camera() {
            if !matches!(session.state(), CaptureState::Unavailable { .. }) {
                return Ok(());
            }
            let retried = session.start().await;
            tracing::info!(ok = retried.is_ok(), "Camera intake retried");
            return retried;
        }
        self.close();

        let session = CaptureSession::new(
            Arc::clone(&self.media),
            Arc::clone(&self.extractor),
            &self.config,
        );
        let started = session.start().await;
        self.active = Some(ActiveSession::Camera(session));
        tracing::info!(ok = started.is_ok(), "Camera intake opened");
        started
    }

    /// Switch to file upload. Reach the session through `upload()`.
    pub fn open_upload(&mut self) {
        if self.mode() == Some(IntakeMode::Upload) {
            return;
        }
        self.close();
        self.active = Some(ActiveSession::Upload(UploadSession::new(
            Arc::clone(&self.extractor),
            &self.config,
        )));
        tracing::info!("Upload intake opened");
    }

    pub fn camera(&self) -> Option<&CaptureSession> {
        match &self.active {
            Some(ActiveSession::Camera(session)) => Some(session),
            _ => None,
        }
    }

    pub fn upload(&mut self) -> Option<&mut UploadSession> {
        match &mut self.active {
            Some(ActiveSession::Upload(session)) => Some(session),
            _ => None,
        }
    }

    /// Tear down whatever is active. Camera tracks are released here.
    pub fn close(&mut self) {
        match self.active.take() {
            Some(ActiveSession::Camera(session)) => {
                session.stop();
                tracing::info!("Camera intake closed");
            }
            Some(ActiveSession::Upload(mut session)) => {
                session.cancel();
                tracing::info!("Upload intake closed");
            }
            None => {}
        }
    }
}

impl Drop for IntakeFlow {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::capture::{CameraAccess, CaptureState, SyntheticCamera};
    use crate::pipeline::extraction::CannedExtractor;
    use crate::pipeline::upload::CandidateFile;

    fn flow(camera: &SyntheticCamera) -> IntakeFlow {
        IntakeFlow::new(
            Arc::new(camera.clone()),
            Arc::new(CannedExtractor::insurance_card()),
            IntakeConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_upload_releases_camera() {
        let camera = SyntheticCamera::granted();
        let mut flow = flow(&camera);

        flow.open_camera().await.unwrap();
        assert_eq!(camera.live_streams(), 1);

        flow.open_upload();
        assert_eq!(flow.mode(), Some(IntakeMode::Upload));
        assert!(flow.camera().is_none());
        assert_eq!(camera.live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_camera_discards_staged_upload() {
        let camera = SyntheticCamera::granted();
        let mut flow = flow(&camera);

        flow.open_upload();
        flow.upload()
            .unwrap()
            .select(vec![CandidateFile::from_bytes("lease.pdf", b"%PDF-1.7".to_vec())])
            .await
            .unwrap();

        flow.open_camera().await.unwrap();
        assert!(flow.upload().is_none());
        assert_eq!(flow.camera().map(|c| c.state()), Some(CaptureState::Detecting));
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_same_mode_keeps_session() {
        let camera = SyntheticCamera::granted();
        let mut flow = flow(&camera);

        flow.open_camera().await.unwrap();
        flow.open_camera().await.unwrap();
        assert_eq!(camera.acquisitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_stays_open_for_retry() {
        let camera = SyntheticCamera::new(CameraAccess::Denied);
        let mut flow = flow(&camera);

        assert!(matches!(
            flow.open_camera().await,
            Err(IntakeError::PermissionDenied)
        ));
        assert_eq!(flow.mode(), Some(IntakeMode::Camera));

        camera.set_access(CameraAccess::Granted);
        flow.camera().unwrap().start().await.unwrap();
        assert_eq!(camera.live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_unavailable_camera_retries() {
        let camera = SyntheticCamera::new(CameraAccess::Denied);
        let mut flow = flow(&camera);
        assert!(flow.open_camera().await.is_err());

        camera.set_access(CameraAccess::Granted);
        flow.open_camera().await.unwrap();
        assert_eq!(camera.acquisitions(), 1);
        assert_eq!(camera.live_streams(), 1);
        assert_eq!(flow.camera().map(|c| c.state()), Some(CaptureState::Detecting));
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_still_denied_camera_reports_failure() {
        let camera = SyntheticCamera::new(CameraAccess::Denied);
        let mut flow = flow(&camera);
        assert!(flow.open_camera().await.is_err());
        assert!(matches!(
            flow.open_camera().await,
            Err(IntakeError::PermissionDenied)
        ));
        assert_eq!(flow.mode(), Some(IntakeMode::Camera));
    }

    #[tokio::test(start_paused = true)]
    async fn close_and_drop_release_camera() {
        let camera = SyntheticCamera::granted();
        let mut flow = flow(&camera);
        flow.open_camera().await.unwrap();
        flow.close();
        assert_eq!(flow.mode(), None);
        assert_eq!(camera.live_streams(), 0);

        flow.open_camera().await.unwrap();
        drop(flow);
        assert_eq!(camera.live_streams(), 0);
    }
}
