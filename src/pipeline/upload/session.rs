//! Upload session state machine.
//!
//! ```text
//! Idle → Selecting → Validating → {Rejected, Staged} → Transferring → Processing → {Ready, Failed}
//! ```
//!
//! Transfer progress is published on a `watch` channel and never decreases
//! within a commit. Cancellation is a `CancellationToken` handed out by
//! `canceller()`: it aborts a transfer in flight, and once processing has
//! begun the session still settles in `Failed`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::format::{format_file_size, resolve_mime, sanitize_filename, validate_candidate, HEADER_LEN};
use crate::config::IntakeConfig;
use crate::models::DocumentSource;
use crate::pipeline::draft::{name_from_file, DraftDocument, ExtractionOutcome};
use crate::pipeline::extraction::{extract_with_timeout, ExtractionRequest, Extractor};
use crate::pipeline::IntakeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Selecting,
    Validating,
    Rejected,
    Staged,
    Transferring,
    Processing,
    Ready,
    Failed,
}

impl UploadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::Staged => "staged",
            Self::Transferring => "transferring",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Where a candidate's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Memory(Vec<u8>),
    Path(PathBuf),
}

/// A file offered by the user, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub file_name: String,
    /// MIME type reported by the picker, if any.
    pub declared_mime: Option<String>,
    pub size_bytes: u64,
    pub source: FileSource,
}

impl CandidateFile {
    pub fn from_bytes(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            declared_mime: None,
            size_bytes: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            declared_mime: None,
            size_bytes: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.declared_mime = Some(mime.into());
        self
    }

    async fn header(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Memory(data) => Ok(data.iter().take(HEADER_LEN).copied().collect()),
            FileSource::Path(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                let mut header = vec![0u8; HEADER_LEN];
                let n = file.read(&mut header).await?;
                header.truncate(n);
                Ok(header)
            }
        }
    }

    async fn reader(&self) -> std::io::Result<Box<dyn AsyncRead + Unpin + Send>> {
        Ok(match &self.source {
            FileSource::Memory(data) => Box::new(std::io::Cursor::new(data.clone())),
            FileSource::Path(path) => Box::new(tokio::fs::File::open(path).await?),
        })
    }
}

/// A validated file awaiting confirmation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedFile {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub size_label: String,
    #[serde(skip)]
    candidate: CandidateFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub file_name: String,
    pub reason: String,
}

/// What a `select` call did with a multi-file batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    pub staged: usize,
    pub rejected: Vec<Rejection>,
}

pub struct UploadSession {
    config: IntakeConfig,
    extractor: Arc<dyn Extractor>,
    state: watch::Sender<UploadState>,
    progress: watch::Sender<u8>,
    staged: Vec<StagedFile>,
    cancel: CancellationToken,
}

impl UploadSession {
    pub fn new(extractor: Arc<dyn Extractor>, config: &IntakeConfig) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        let (progress, _) = watch::channel(0);
        Self {
            config: config.clone(),
            extractor,
            state,
            progress,
            staged: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// Transfer progress, 0 to 100.
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub fn staged(&self) -> &[StagedFile] {
        &self.staged
    }

    /// Token that aborts the current or next commit. Clone it before
    /// awaiting `commit` to cancel from elsewhere.
    pub fn canceller(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate a batch of candidates and stage the valid ones.
    ///
    /// A lone invalid candidate is reported as an error. In a batch of
    /// several, invalid files are dropped and listed in the report. The
    /// previous staged set is replaced only when something new is valid.
    pub async fn select(
        &mut self,
        files: Vec<CandidateFile>,
    ) -> Result<SelectionReport, IntakeError> {
        self.ensure_idle_phase("select files")?;
        self.set_state(UploadState::Selecting);

        let sole = files.len() == 1;
        self.set_state(UploadState::Validating);

        let mut accepted = Vec::new();
        let mut report = SelectionReport::default();
        for file in files {
            match self.validate(file).await {
                Ok(staged) => accepted.push(staged),
                Err((file_name, err)) if sole => {
                    tracing::info!(file = %file_name, error = %err, "File rejected");
                    self.settle_selection();
                    return Err(err);
                }
                Err((file_name, err)) => {
                    tracing::info!(file = %file_name, error = %err, "Dropping file from batch");
                    report.rejected.push(Rejection {
                        file_name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if !accepted.is_empty() {
            self.staged = accepted;
        }
        report.staged = self.staged.len();
        self.settle_selection();

        tracing::debug!(
            staged = report.staged,
            rejected = report.rejected.len(),
            "Selection validated"
        );
        Ok(report)
    }

    /// Drop one staged file. Returns whether it was present.
    pub fn remove_staged(&mut self, id: Uuid) -> bool {
        let before = self.staged.len();
        self.staged.retain(|f| f.id != id);
        let removed = self.staged.len() != before;
        if removed && self.staged.is_empty() && self.state() == UploadState::Staged {
            self.set_state(UploadState::Idle);
        }
        removed
    }

    /// Transfer the primary staged file and run extraction on it.
    ///
    /// Valid from `Staged`, or from `Failed` as a retry. Only the first
    /// staged file becomes the document; the others are named on the draft.
    pub async fn commit(&mut self) -> Result<DraftDocument, IntakeError> {
        let state = self.state();
        if !matches!(state, UploadState::Staged | UploadState::Failed) {
            return Err(IntakeError::InvalidTransition {
                action: "commit the upload",
                state: state.as_str().into(),
            });
        }
        let Some(primary) = self.staged.first().cloned() else {
            return Err(IntakeError::EmptyBatch);
        };

        let token = self.cancel.clone();
        let result = self.run(&primary, &token).await;
        if token.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        match result {
            Ok(draft) => {
                self.staged.clear();
                self.set_state(UploadState::Ready);
                Ok(draft)
            }
            Err(IntakeError::Cancelled) if self.state() == UploadState::Transferring => {
                tracing::info!(file = %primary.file_name, "Upload cancelled during transfer");
                self.reset();
                Err(IntakeError::Cancelled)
            }
            Err(err) => {
                tracing::warn!(file = %primary.file_name, error = %err, "Upload failed");
                self.set_state(UploadState::Failed);
                Err(err)
            }
        }
    }

    /// Abandon the session: stop any transfer and discard staged files.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.reset();
    }

    async fn run(
        &self,
        primary: &StagedFile,
        token: &CancellationToken,
    ) -> Result<DraftDocument, IntakeError> {
        self.set_state(UploadState::Transferring);
        let content = self.transfer(&primary.candidate, token).await?;

        self.set_state(UploadState::Processing);
        let extraction = if self.config.extract_uploads {
            let request = ExtractionRequest::bytes(content.clone(), primary.mime_type.clone())
                .with_file_name(primary.file_name.clone());
            match extract_with_timeout(
                self.extractor.as_ref(),
                request,
                self.config.extraction_timeout(),
            )
            .await
            {
                Ok(result) => ExtractionOutcome::Completed(result),
                Err(e) => ExtractionOutcome::Failed {
                    reason: e.to_string(),
                },
            }
        } else {
            ExtractionOutcome::Pending
        };

        // Extraction is not interrupted; a late cancel still lands in Failed.
        if token.is_cancelled() {
            return Err(IntakeError::Cancelled);
        }

        let ignored_files: Vec<String> =
            self.staged.iter().skip(1).map(|f| f.file_name.clone()).collect();
        if !ignored_files.is_empty() {
            tracing::info!(
                primary = %primary.file_name,
                ignored = ignored_files.len(),
                "Only the first staged file becomes a document"
            );
        }

        Ok(DraftDocument {
            suggested_name: name_from_file(&primary.file_name),
            source: DocumentSource::Upload,
            mime_type: primary.mime_type.clone(),
            size_bytes: Some(content.len() as u64),
            source_file_name: Some(primary.file_name.clone()),
            created_at: Utc::now(),
            extraction,
            ignored_files,
            content: Some(content),
        })
    }

    async fn transfer(
        &self,
        file: &CandidateFile,
        token: &CancellationToken,
    ) -> Result<Vec<u8>, IntakeError> {
        self.progress.send_replace(0);

        let mut reader = file.reader().await?;
        let total = file.size_bytes.max(1);
        let max_bytes = self.config.max_file_size_bytes;
        let mut content = Vec::with_capacity(file.size_bytes.min(max_bytes) as usize);
        let mut chunk = vec![0u8; self.config.transfer_chunk_bytes.max(1)];
        let pacing = self.config.transfer_pacing();

        loop {
            let n = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(IntakeError::Cancelled),
                read = reader.read(&mut chunk) => read?,
            };
            if n == 0 {
                break;
            }
            content.extend_from_slice(&chunk[..n]);
            // The file may have grown on disk since it was staged.
            if content.len() as u64 > max_bytes {
                return Err(IntakeError::FileTooLarge {
                    file_name: file.file_name.clone(),
                    size_bytes: content.len() as u64,
                    max_bytes,
                });
            }
            self.report_progress(content.len() as u64 * 100 / total);

            if let Some(pacing) = pacing {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(IntakeError::Cancelled),
                    _ = tokio::time::sleep(pacing) => {}
                }
            }
        }

        self.report_progress(100);
        tracing::debug!(file = %file.file_name, bytes = content.len(), "Transfer complete");
        Ok(content)
    }

    fn report_progress(&self, percent: u64) {
        let percent = percent.min(100) as u8;
        self.progress.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }

    async fn validate(&self, file: CandidateFile) -> Result<StagedFile, (String, IntakeError)> {
        let file_name = sanitize_filename(&file.file_name);
        let declared = file
            .declared_mime
            .as_deref()
            .filter(|m| !m.trim().is_empty());
        let header = match declared {
            Some(_) => Vec::new(),
            None => file
                .header()
                .await
                .map_err(|e| (file_name.clone(), IntakeError::Io(e)))?,
        };
        let mime_type = resolve_mime(declared, &header, &file_name);

        validate_candidate(&file_name, &mime_type, file.size_bytes, &self.config)
            .map_err(|e| (file_name.clone(), e))?;

        Ok(StagedFile {
            id: Uuid::new_v4(),
            size_label: format_file_size(file.size_bytes),
            size_bytes: file.size_bytes,
            mime_type,
            file_name,
            candidate: file,
        })
    }

    fn ensure_idle_phase(&self, action: &'static str) -> Result<(), IntakeError> {
        let state = self.state();
        if matches!(state, UploadState::Transferring | UploadState::Processing) {
            return Err(IntakeError::InvalidTransition {
                action,
                state: state.as_str().into(),
            });
        }
        Ok(())
    }

    fn settle_selection(&self) {
        if self.staged.is_empty() {
            self.set_state(UploadState::Rejected);
        } else {
            self.set_state(UploadState::Staged);
        }
    }

    fn reset(&mut self) {
        self.staged.clear();
        self.progress.send_replace(0);
        self.set_state(UploadState::Idle);
    }

    fn set_state(&self, next: UploadState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            tracing::debug!(from = current.as_str(), to = next.as_str(), "Upload state");
            *current = next;
            true
        });
    }
}
