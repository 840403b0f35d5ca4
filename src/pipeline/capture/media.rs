use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device found")]
    NoDevice,

    #[error("Video stream ended")]
    StreamEnded,

    #[error("Frame grab failed: {0}")]
    Frame(String),
}

/// A single still grabbed from the live feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera on phones.
    Environment,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

/// Media acquisition boundary.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Request a live feed. May suspend on a permission prompt.
    async fn acquire(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError>;
}

#[async_trait]
pub trait MediaStream: Send + Sync {
    async fn grab_frame(&self) -> Result<Frame, MediaError>;

    /// Stop every track on this stream. Must be idempotent.
    fn release(&self);

    fn is_live(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Synthetic camera
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAccess {
    Granted,
    Denied,
    Missing,
}

#[derive(Debug)]
struct CameraCounters {
    acquisitions: AtomicUsize,
    live_streams: AtomicUsize,
}

/// A camera that always sees the same frame. Access can be flipped at
/// runtime to model a user who denies the prompt and later allows it.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    access: Arc<Mutex<CameraAccess>>,
    counters: Arc<CameraCounters>,
    frame: Frame,
}

impl SyntheticCamera {
    pub fn new(access: CameraAccess) -> Self {
        // JPEG SOI + APP0 marker, then an empty body.
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.resize(64, 0);

        Self {
            access: Arc::new(Mutex::new(access)),
            counters: Arc::new(CameraCounters {
                acquisitions: AtomicUsize::new(0),
                live_streams: AtomicUsize::new(0),
            }),
            frame: Frame {
                data,
                mime_type: "image/jpeg".into(),
                width: 1920,
                height: 1080,
            },
        }
    }

    pub fn granted() -> Self {
        Self::new(CameraAccess::Granted)
    }

    pub fn set_access(&self, access: CameraAccess) {
        *self.access.lock().unwrap_or_else(PoisonError::into_inner) = access;
    }

    pub fn acquisitions(&self) -> usize {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    /// Streams acquired and not yet released.
    pub fn live_streams(&self) -> usize {
        self.counters.live_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for SyntheticCamera {
    async fn acquire(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Arc<dyn MediaStream>, MediaError> {
        let access = *self.access.lock().unwrap_or_else(PoisonError::into_inner);
        match access {
            CameraAccess::Denied => return Err(MediaError::PermissionDenied),
            CameraAccess::Missing => return Err(MediaError::NoDevice),
            CameraAccess::Granted => {}
        }

        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.counters.live_streams.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            facing = ?constraints.facing,
            width = constraints.ideal_width,
            height = constraints.ideal_height,
            "Synthetic camera stream opened"
        );

        Ok(Arc::new(SyntheticStream {
            live: AtomicBool::new(true),
            counters: self.counters.clone(),
            frame: self.frame.clone(),
        }))
    }
}

struct SyntheticStream {
    live: AtomicBool,
    counters: Arc<CameraCounters>,
    frame: Frame,
}

#[async_trait]
impl MediaStream for SyntheticStream {
    async fn grab_frame(&self) -> Result<Frame, MediaError> {
        if !self.is_live() {
            return Err(MediaError::StreamEnded);
        }
        Ok(self.frame.clone())
    }

    fn release(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.counters.live_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.release();
    }
}
