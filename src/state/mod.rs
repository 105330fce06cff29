// Event publication module
//
// This module provides the StateNotifier, which broadcasts processor events
// (state snapshots and prompts) to any number of subscribers.

use crate::metrics::Metrics;
use crate::models::{Installation, ProfileConfig, ScanSide, SessionState, StateSnapshot};
use crate::services::ScanDevice;
use camino::Utf8PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Events emitted by the scan session processor
///
/// These are pushed to the presentation layer, which never reads session
/// state directly. Every payload is an owned copy.
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessorEvent {
    /// Session state was mutated
    StateChanged(StateSnapshot),

    /// Ask the user to confirm or choose an installation
    PromptForInstallation { candidate: Option<Installation> },

    /// Ask the user to choose front/back scan profiles
    PromptForProfiles {
        installation: Installation,
        profile_config: Option<ProfileConfig>,
        profile_names: Vec<String>,
        devices: Vec<ScanDevice>,
    },

    /// A scan wrote its output file
    ScanCompleted {
        side: ScanSide,
        output_path: Utf8PathBuf,
    },

    /// The external tool failed; the processor is still usable
    ScanFailed { side: ScanSide, reason: String },

    /// The command loop hit an unrecoverable error and stopped
    Crashed(String),

    /// The command loop exited after an `Exit` command
    Finished,
}

/// Broadcasts [`ProcessorEvent`]s to subscribers
///
/// Cloning is cheap; all clones share the same channel. Subscribers only see
/// events published after they subscribed.
#[derive(Clone, Debug)]
pub struct StateNotifier {
    event_tx: broadcast::Sender<ProcessorEvent>,
    metrics: Arc<Metrics>,
}

impl StateNotifier {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { event_tx, metrics }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessorEvent> {
        self.event_tx.subscribe()
    }

    pub fn publish(&self, event: ProcessorEvent) {
        tracing::trace!("Publishing event: {:?}", event);
        self.metrics.record_event();

        // A send error only means nobody is listening right now
        if self.event_tx.send(event).is_err() {
            self.metrics.record_unobserved_event();
        }
    }

    /// Publish a snapshot of `state`
    pub fn publish_state(&self, state: &SessionState) {
        let snapshot = state.snapshot();
        tracing::debug!(
            "State changed: {} (installation: {}, profiles: {})",
            snapshot.status,
            snapshot.installation.is_some(),
            snapshot.profile_config.is_some()
        );
        self.publish(ProcessorEvent::StateChanged(snapshot));
    }
}
