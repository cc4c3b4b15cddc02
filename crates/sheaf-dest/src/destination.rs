//! Per-descriptor pipeline and stream adapters.
//!
//! # Design
//!
//! - Each descriptor runs `resolve -> ensure_dir -> write_content | create_symlink
//!   -> sync_mode -> emit`, strictly in order.
//! - Every step is recorded through [`Destination::execute_step`], which logs
//!   the outcome and feeds the `dest_steps_total` counter.
//! - A failure ends that descriptor only; the stream keeps going. Configuration
//!   errors stop intake; descriptors already in flight finish and are emitted,
//!   then the error, then the stream ends.
//! - [`Destination::pipe`] overlaps up to `concurrency` descriptors and emits
//!   results in input order.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{Stream, StreamExt};
use sheaf_config::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use sheaf_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::config::{DestinationConfig, ResolvedConfig};
use crate::dirs::{ensure_directory, ensure_parent};
use crate::error::{DestError, DestResult};
use crate::fs::{FsBackend, LocalFs};
use crate::mode::{desired_mode, mask_mode, sync_mode};
use crate::model::{FileDescriptor, FileStat};
use crate::resolve::{ResolvedLocation, resolve_location};
use crate::symlink::{SymlinkOutcome, create_symlink};
use crate::write::{WriteOptions, WriteOutcome, write_contents};

/// Stage of the per-descriptor pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Compute the output location.
    Resolve,
    /// Create parent (and, for directories, target) directories.
    EnsureDir,
    /// Write buffered or streamed contents.
    WriteContent,
    /// Create a symbolic link.
    CreateSymlink,
    /// Reconcile permission bits.
    SyncMode,
    /// Hand the descriptor downstream.
    Emit,
}

impl Step {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::EnsureDir => "ensure_dir",
            Self::WriteContent => "write_content",
            Self::CreateSymlink => "create_symlink",
            Self::SyncMode => "sync_mode",
            Self::Emit => "emit",
        }
    }
}

/// Recorded status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step began.
    Started,
    /// The step did its work.
    Completed,
    /// The step had nothing to do.
    Skipped,
    /// The step failed and ended the descriptor.
    Failed,
}

impl StepStatus {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

enum StepOutcome<T> {
    Completed(T),
    Skipped(T),
}

impl<T> StepOutcome<T> {
    const fn status(&self) -> StepStatus {
        match self {
            Self::Completed(_) => StepStatus::Completed,
            Self::Skipped(_) => StepStatus::Skipped,
        }
    }

    fn into_inner(self) -> T {
        match self {
            Self::Completed(value) | Self::Skipped(value) => value,
        }
    }
}

/// Writes descriptors under a configured folder.
#[derive(Clone)]
pub struct Destination {
    id: Uuid,
    config: Arc<ResolvedConfig>,
    backend: Arc<dyn FsBackend>,
    metrics: Option<Metrics>,
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

/// Running destination task fed through channels.
///
/// Drop (or let go of) `input` to signal the end of input; `output` ends once
/// every accepted descriptor has been emitted. The consumer must drain
/// `output` while sending, since both channels are bounded.
#[derive(Debug)]
pub struct DestinationHandle {
    /// Descriptor intake.
    pub input: mpsc::Sender<FileDescriptor>,
    /// Processed descriptors and per-descriptor errors, in input order.
    pub output: ReceiverStream<DestResult<FileDescriptor>>,
    /// Resolves once the output has been fully produced.
    pub task: JoinHandle<()>,
}

impl Destination {
    /// Validate `config` and build a destination over the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the options are invalid.
    pub fn new(config: DestinationConfig) -> DestResult<Self> {
        Self::with_backend(config, Arc::new(LocalFs::new()))
    }

    /// Validate `config` and build a destination over `backend`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the options are invalid.
    pub fn with_backend(config: DestinationConfig, backend: Arc<dyn FsBackend>) -> DestResult<Self> {
        let config = config.resolve()?;
        Ok(Self {
            id: Uuid::new_v4(),
            config: Arc::new(config),
            backend,
            metrics: None,
        })
    }

    /// Attach a metrics registry.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Identifier recorded on every log span.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Validated options.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Materialise one descriptor and return it with its updated location.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. Nothing is retried.
    pub async fn write(&self, file: FileDescriptor) -> DestResult<FileDescriptor> {
        let location = resolve_location(&file, &self.config);
        self.write_resolved(file, location).await
    }

    async fn write_resolved(
        &self,
        file: FileDescriptor,
        location: DestResult<ResolvedLocation>,
    ) -> DestResult<FileDescriptor> {
        let span = info_span!("destination", destination_id = %self.id);
        let result = self.process(file, location).instrument(span).await;
        match &result {
            Ok(file) => {
                self.count_descriptor("emitted");
                debug!(destination_id = %self.id, path = %file.path.display(), "descriptor emitted");
            }
            Err(err) => {
                self.count_descriptor("failed");
                warn!(
                    destination_id = %self.id,
                    error = %err,
                    kind = err.label(),
                    path = ?err.path(),
                    "descriptor failed"
                );
            }
        }
        result
    }

    /// Process a stream of descriptors.
    ///
    /// Up to `concurrency` descriptors are in flight; results come out in
    /// input order. Locations are resolved as descriptors are taken from the
    /// input, so a configuration error stops intake without cancelling
    /// descriptors already in flight. The stream ends once every accepted
    /// descriptor has been emitted.
    pub fn pipe<S>(&self, input: S) -> impl Stream<Item = DestResult<FileDescriptor>> + Send + 'static
    where
        S: Stream<Item = FileDescriptor> + Send + 'static,
    {
        let destination = self.clone();
        let config = Arc::clone(&self.config);
        let concurrency = self.config.concurrency;
        input
            .scan(false, move |halted, file| {
                if *halted {
                    return future::ready(None);
                }
                let location = resolve_location(&file, &config);
                *halted = location.as_ref().is_err_and(|err| err.is_configuration());
                future::ready(Some((file, location)))
            })
            .map(move |(file, location)| {
                let destination = destination.clone();
                async move { destination.write_resolved(file, location).await }
            })
            .buffered(concurrency)
    }

    /// Run the destination on a background task fed by a channel.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(&self) -> DestinationHandle {
        let capacity = self.config.concurrency;
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (output_tx, output_rx) = mpsc::channel(capacity);
        let stream = self.pipe(ReceiverStream::new(input_rx));
        let id = self.id;
        let task = tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(result) = stream.next().await {
                if output_tx.send(result).await.is_err() {
                    debug!(destination_id = %id, "destination output dropped");
                    break;
                }
            }
            debug!(destination_id = %id, "destination finished");
        });
        DestinationHandle {
            input: input_tx,
            output: ReceiverStream::new(output_rx),
            task,
        }
    }

    async fn process(
        &self,
        file: FileDescriptor,
        location: DestResult<ResolvedLocation>,
    ) -> DestResult<FileDescriptor> {
        let backend = &*self.backend;
        let config = &*self.config;

        let location = self
            .execute_step(Step::Resolve, &file.path, async {
                location.map(StepOutcome::Completed)
            })
            .await?;
        let mut file = location.apply(file);
        let target = file.path.clone();

        let desired = if file.symlink.is_some() {
            None
        } else {
            desired_mode(&file, config).map(mask_mode)
        };
        if let Some(mode) = desired
            && file.stat_mode().is_none()
        {
            file.stat.get_or_insert_with(FileStat::default).mode = Some(mode);
        }

        let dir_mode = config.dir_mode.unwrap_or(DEFAULT_DIR_MODE);
        let is_directory = file.is_directory();
        self.execute_step(Step::EnsureDir, &target, async {
            ensure_parent(backend, &target, dir_mode).await?;
            if is_directory {
                ensure_directory(backend, &target, desired.unwrap_or(dir_mode)).await?;
            }
            Ok::<_, DestError>(StepOutcome::Completed(()))
        })
        .await?;

        if let Some(link_target) = file.symlink.clone() {
            let linked = self
                .execute_step(Step::CreateSymlink, &target, async {
                    let outcome =
                        create_symlink(backend, &link_target, &target, config.overwrite).await?;
                    Ok::<_, DestError>(if outcome.changed() {
                        StepOutcome::Completed(outcome)
                    } else {
                        StepOutcome::Skipped(outcome)
                    })
                })
                .await?;
            if linked == SymlinkOutcome::Replaced {
                debug!(path = %target.display(), "replaced existing entry with symlink");
            }
            self.record_step(Step::SyncMode, StepStatus::Skipped);
        } else {
            let options = WriteOptions {
                creation_mode: desired.unwrap_or(DEFAULT_FILE_MODE),
                overwrite: config.overwrite,
            };
            let written = self
                .execute_step(Step::WriteContent, &target, async {
                    let outcome = write_contents(backend, &mut file, options).await?;
                    Ok::<_, DestError>(match outcome {
                        WriteOutcome::Written { .. } => StepOutcome::Completed(outcome),
                        _ => StepOutcome::Skipped(outcome),
                    })
                })
                .await?;
            if let (WriteOutcome::Written { bytes }, Some(metrics)) = (written, &self.metrics) {
                metrics.add_bytes_written(bytes);
            }

            if written.has_target() {
                let sync = self
                    .execute_step(Step::SyncMode, &target, async {
                        let sync = sync_mode(backend, &target, desired).await?;
                        Ok::<_, DestError>(if sync.changed() {
                            StepOutcome::Completed(sync)
                        } else {
                            StepOutcome::Skipped(sync)
                        })
                    })
                    .await?;
                if sync.changed()
                    && let Some(metrics) = &self.metrics
                {
                    metrics.inc_chmod();
                }
            } else {
                self.record_step(Step::SyncMode, StepStatus::Skipped);
            }
        }

        self.record_step(Step::Emit, StepStatus::Completed);
        Ok(file)
    }

    async fn execute_step<T, F>(&self, step: Step, path: &Path, op: F) -> DestResult<T>
    where
        F: Future<Output = DestResult<StepOutcome<T>>>,
    {
        self.record_step(step, StepStatus::Started);
        match op.await {
            Ok(outcome) => {
                let status = outcome.status();
                self.record_step(step, status);
                debug!(
                    step = step.as_str(),
                    status = status.as_str(),
                    path = %path.display(),
                    "destination step finished"
                );
                Ok(outcome.into_inner())
            }
            Err(err) => {
                self.record_step(step, StepStatus::Failed);
                warn!(
                    step = step.as_str(),
                    error = %err,
                    path = %path.display(),
                    "destination step failed"
                );
                Err(err)
            }
        }
    }

    fn record_step(&self, step: Step, status: StepStatus) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_dest_step(step.as_str(), status.as_str());
        }
    }

    fn count_descriptor(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_descriptor(outcome);
        }
    }
}
