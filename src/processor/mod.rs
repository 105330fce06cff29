//! Scan session processor.
//!
//! The processor owns the [`SessionState`] and is its only writer. Callers
//! submit [`Command`]s through a [`ProcessorHandle`]; a dedicated thread pops
//! them off an unbounded queue and executes them one at a time, publishing a
//! [`ProcessorEvent`] for every state transition and prompt.
//!
//! # Architecture Note
//!
//! ```text
//! ProcessorHandle ──mpsc──▶ command loop thread ──broadcast──▶ subscribers
//!                                │
//!                                ├─ InstallationResolver
//!                                ├─ ProfileResolver
//!                                └─ ScanInvoker (blocks the loop while NAPS2 runs)
//! ```
//!
//! A command runs to completion before the next is dequeued, so the events of
//! one command are never interleaved with those of another. Commands that
//! re-bootstrap enqueue a fresh [`Command::Bootstrap`] at the back of the queue.
//!
//! # Error Handling
//!
//! - Scan failures end the scan, publish [`ProcessorEvent::ScanFailed`], and the
//!   loop keeps serving.
//! - Anything else (persistence failures, session invariant violations, panics)
//!   publishes [`ProcessorEvent::Crashed`] and stops the loop.

mod command;

pub use command::Command;

use crate::metrics::Metrics;
use crate::models::{Installation, ProfileConfig, ScanSide, SessionError, SessionState};
use crate::services::{InstallationResolver, ProfileResolver, ScanError, ScanInvoker, ScanOutputPolicy};
use crate::state::{ProcessorEvent, StateNotifier};
use anyhow::Context;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Name of the thread running the command loop
pub const PROCESSOR_THREAD_NAME: &str = "fscan-processor";

/// Pause before prompting for an installation on startup
pub const DEFAULT_PROMPT_DELAY: Duration = Duration::from_millis(500);

/// External services the processor drives
pub struct Collaborators {
    pub installations: Box<dyn InstallationResolver>,
    pub profiles: Box<dyn ProfileResolver>,
    pub scanner: Box<dyn ScanInvoker>,
    pub output: ScanOutputPolicy,
}

/// Tunables for the command loop
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Delay before `Bootstrap` prompts for an installation, so the
    /// presentation layer is up before the prompt arrives
    pub prompt_delay: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            prompt_delay: DEFAULT_PROMPT_DELAY,
        }
    }
}

/// Why a command did not complete
#[derive(Error, Debug)]
pub enum CommandError {
    /// The scan tool failed; the session is still usable
    #[error("{side} scan failed: {source}")]
    Scan {
        side: ScanSide,
        #[source]
        source: ScanError,
    },

    #[error("session invariant violated: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl CommandError {
    /// Full message including the cause chain
    pub fn diagnostic(&self) -> String {
        match self {
            CommandError::Fatal(e) => format!("{:#}", e),
            other => other.to_string(),
        }
    }
}

/// Returned when submitting to a processor that has stopped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("scan session processor has stopped; {} was not queued", .0.name())]
pub struct SubmitError(pub Command);

/// Whether the loop keeps going after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Enqueue-only access to a running processor
///
/// Cloning is cheap; every clone feeds the same queue.
#[derive(Clone)]
pub struct ProcessorHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    notifier: StateNotifier,
}

impl ProcessorHandle {
    pub fn submit(&self, command: Command) -> Result<(), SubmitError> {
        tracing::trace!("Submitting command: {}", command.name());
        self.command_tx
            .send(command)
            .map_err(|mpsc::error::SendError(command)| SubmitError(command))
    }

    pub fn bootstrap(&self) -> Result<(), SubmitError> {
        self.submit(Command::Bootstrap)
    }

    pub fn request_configure_installation(&self) -> Result<(), SubmitError> {
        self.submit(Command::RequestConfigureInstallation)
    }

    pub fn request_configure_profiles(&self) -> Result<(), SubmitError> {
        self.submit(Command::RequestConfigureProfiles)
    }

    pub fn set_installation(&self, installation: Installation) -> Result<(), SubmitError> {
        self.submit(Command::SetInstallation(installation))
    }

    pub fn set_profile_config(&self, profile_config: ProfileConfig) -> Result<(), SubmitError> {
        self.submit(Command::SetProfileConfig(profile_config))
    }

    pub fn disable_integration(&self) -> Result<(), SubmitError> {
        self.submit(Command::DisableIntegration)
    }

    pub fn auto_install(&self) -> Result<(), SubmitError> {
        self.submit(Command::AutoInstall)
    }

    pub fn scan(&self, side: ScanSide) -> Result<(), SubmitError> {
        self.submit(Command::Scan { side })
    }

    pub fn exit(&self) -> Result<(), SubmitError> {
        self.submit(Command::Exit)
    }

    /// Receive every event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.notifier.subscribe()
    }
}

/// A scan session processor that has not been started yet
///
/// # Example
/// ```ignore
/// let processor = Processor::new(collaborators, ProcessorOptions::default(), metrics);
/// let mut events = processor.subscribe();
/// let (handle, thread) = processor.spawn()?;
/// handle.scan(ScanSide::Front)?;
/// handle.exit()?;
/// thread.join().ok();
/// ```
pub struct Processor {
    collaborators: Collaborators,
    options: ProcessorOptions,
    notifier: StateNotifier,
    metrics: Arc<Metrics>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
}

impl Processor {
    pub fn new(collaborators: Collaborators, options: ProcessorOptions, metrics: Arc<Metrics>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            collaborators,
            options,
            notifier: StateNotifier::new(Arc::clone(&metrics)),
            metrics,
            command_tx,
            command_rx,
        }
    }

    /// Subscribe before [`Processor::spawn`] to observe the startup `Bootstrap`.
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.notifier.subscribe()
    }

    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            command_tx: self.command_tx.clone(),
            notifier: self.notifier.clone(),
        }
    }

    /// Queue the initial `Bootstrap` and start the command loop thread.
    pub fn spawn(self) -> anyhow::Result<(ProcessorHandle, JoinHandle<()>)> {
        let handle = self.handle();
        handle
            .bootstrap()
            .context("Failed to queue initial Bootstrap")?;

        let thread = thread::Builder::new()
            .name(PROCESSOR_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .context("Failed to spawn processor thread")?;

        Ok((handle, thread))
    }

    /// Run the command loop on the current thread until `Exit`, a fatal
    /// error, or every handle is dropped.
    pub fn run(self) {
        let Processor {
            collaborators,
            options,
            notifier,
            metrics,
            command_tx,
            command_rx,
        } = self;

        // Only handles keep the queue open; the loop re-enqueues through a weak sender
        let requeue_tx = command_tx.downgrade();
        drop(command_tx);

        let mut command_loop = CommandLoop {
            state: SessionState::new(),
            collaborators,
            options,
            notifier,
            metrics,
            requeue_tx,
        };
        command_loop.run(command_rx);
    }
}

struct CommandLoop {
    state: SessionState,
    collaborators: Collaborators,
    options: ProcessorOptions,
    notifier: StateNotifier,
    metrics: Arc<Metrics>,
    requeue_tx: mpsc::WeakUnboundedSender<Command>,
}

impl CommandLoop {
    fn run(&mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        tracing::info!("Scan session processor started");

        while let Some(command) = command_rx.blocking_recv() {
            self.metrics.record_command();
            let name = command.name();
            tracing::debug!("Executing command: {}", name);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(command)));

            match outcome {
                Ok(Ok(Flow::Continue)) => {}
                Ok(Ok(Flow::Exit)) => {
                    tracing::info!("Scan session processor exiting");
                    self.notifier.publish(ProcessorEvent::Finished);
                    return;
                }
                Ok(Err(CommandError::Scan { side, source })) => {
                    tracing::error!("{} scan failed: {}", side, source);
                    self.notifier.publish(ProcessorEvent::ScanFailed {
                        side,
                        reason: source.to_string(),
                    });
                }
                Ok(Err(e)) => {
                    self.crash(name, e.diagnostic());
                    return;
                }
                Err(payload) => {
                    self.crash(name, panic_message(&*payload));
                    return;
                }
            }
        }

        tracing::info!("All processor handles dropped; stopping");
        self.notifier.publish(ProcessorEvent::Finished);
    }

    fn crash(&self, command: &str, diagnostic: String) {
        tracing::error!("Unhandled error in {}: {}", command, diagnostic);
        self.notifier
            .publish(ProcessorEvent::Crashed(format!("{}: {}", command, diagnostic)));
    }

    fn execute(&mut self, command: Command) -> Result<Flow, CommandError> {
        match command {
            Command::Bootstrap => self.bootstrap()?,
            Command::RequestConfigureInstallation => self.request_configure_installation(),
            Command::RequestConfigureProfiles => self.request_configure_profiles(),
            Command::SetInstallation(installation) => {
                self.collaborators
                    .installations
                    .set_configured(&installation)
                    .context("Failed to save NAPS2 installation")?;
                self.enqueue(Command::Bootstrap);
            }
            Command::SetProfileConfig(profile_config) => self.set_profile_config(profile_config)?,
            Command::DisableIntegration => {
                self.collaborators
                    .installations
                    .disable()
                    .context("Failed to save NAPS2 opt-out")?;
                self.enqueue(Command::Bootstrap);
            }
            Command::AutoInstall => self.auto_install(),
            Command::Scan { side } => self.scan(side)?,
            Command::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    fn enqueue(&self, command: Command) {
        let name = command.name();
        let queued = self
            .requeue_tx
            .upgrade()
            .is_some_and(|tx| tx.send(command).is_ok());
        if !queued {
            tracing::warn!("Processor is shutting down; dropping follow-up {}", name);
        }
    }

    fn publish_state(&self) {
        self.notifier.publish_state(&self.state);
    }

    fn bootstrap(&mut self) -> Result<(), CommandError> {
        self.state.clear()?;
        self.publish_state();

        let installations = &self.collaborators.installations;
        let Some(installation) = installations.configured() else {
            if installations.is_disabled() {
                tracing::info!("NAPS2 integration is disabled; not prompting for an installation.");
                return Ok(());
            }

            tracing::info!("No NAPS2 installation configured.");
            if !self.options.prompt_delay.is_zero() {
                thread::sleep(self.options.prompt_delay);
            }
            let candidate = installations.suggested();
            self.notifier
                .publish(ProcessorEvent::PromptForInstallation { candidate });
            return Ok(());
        };

        tracing::info!("Using NAPS2 installation at {}", installation.app_dir());
        let data_dir = installation.data_dir().to_path_buf();
        self.state.set_installation(installation)?;
        self.publish_state();

        if let Some(profile_config) = self.collaborators.profiles.profile_config(&data_dir) {
            tracing::info!(
                "Using scan profiles: front='{}', back='{}'",
                profile_config.front_profile_name(),
                profile_config.back_profile_name()
            );
            self.state.set_profile_config(profile_config)?;
            self.publish_state();
        }

        Ok(())
    }

    fn request_configure_installation(&self) {
        let installations = &self.collaborators.installations;
        let candidate = installations
            .configured()
            .or_else(|| installations.suggested());
        self.notifier
            .publish(ProcessorEvent::PromptForInstallation { candidate });
    }

    fn request_configure_profiles(&self) {
        let Some(installation) = self.state.installation().cloned() else {
            tracing::error!("Cannot configure profiles: no NAPS2 installation is configured.");
            return;
        };

        let profiles = &self.collaborators.profiles;
        let profile_names = profiles
            .list_profile_names(installation.data_dir())
            .into_iter()
            .collect();
        let devices = profiles.list_devices(installation.data_dir());

        self.notifier.publish(ProcessorEvent::PromptForProfiles {
            profile_config: self.state.profile_config().cloned(),
            installation,
            profile_names,
            devices,
        });
    }

    fn set_profile_config(&mut self, profile_config: ProfileConfig) -> Result<(), CommandError> {
        if self.state.installation().is_none() {
            tracing::error!("Cannot set profiles: no NAPS2 installation is configured.");
            return Ok(());
        }

        self.collaborators
            .profiles
            .set_profile_config(&profile_config)
            .context("Failed to save scan profiles")?;
        self.enqueue(Command::Bootstrap);
        Ok(())
    }

    fn auto_install(&self) {
        match self.collaborators.installations.install_portable() {
            Some(installation) => {
                tracing::info!("Installed portable NAPS2 at {}", installation.app_dir());
                self.enqueue(Command::SetInstallation(installation));
            }
            None => tracing::error!("Automatic NAPS2 installation failed."),
        }
    }

    fn scan(&mut self, side: ScanSide) -> Result<(), CommandError> {
        if self.state.is_scanning() {
            tracing::warn!("Scan requested, but a scan is already in progress.");
            return Ok(());
        }

        let (installation, profile_name) =
            match (self.state.installation(), self.state.profile_config()) {
                (Some(installation), Some(profile_config)) => (
                    installation.clone(),
                    profile_config.profile_for(side).to_string(),
                ),
                _ => {
                    tracing::warn!("Scan requested, but NAPS2 is not configured.");
                    return Ok(());
                }
            };

        let output_path = self
            .collaborators
            .output
            .path_for(side, chrono::Local::now());

        self.state.begin_scan()?;
        self.publish_state();

        tracing::info!("Scanning {} side with profile '{}'", side, profile_name);
        let started = Instant::now();
        let result = self
            .collaborators
            .scanner
            .invoke(&installation, &profile_name, &output_path);

        self.state.finish_scan();
        self.publish_state();
        self.metrics.record_scan(result.is_ok(), started.elapsed());

        result.map_err(|source| CommandError::Scan { side, source })?;

        self.notifier.publish(ProcessorEvent::ScanCompleted { side, output_path });
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string())
}
