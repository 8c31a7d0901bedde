//! Lifecycle of a release: install → waiting → active
//!
//! A freshly installed generation waits until every consumer of the old
//! generation has released its lease, or until a `SKIP_WAITING` control
//! message forces activation. The very first generation activates at once
//! since nothing can be holding an older one.

use crate::cache::generation::{ActivationReport, GenerationManager, InstallReport};
use crate::cache::types::GenerationTag;
use crate::config::OfflineConfig;
use crate::error::{OfflineError, Result};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Out-of-band control messages, e.g. `{"type": "SKIP_WAITING"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
}

impl ControlMessage {
    /// Decode a JSON message; anything unrecognised is ignored
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                debug!("Ignoring control message {:?}: {}", raw, e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Uninstalled,
    Installing { tag: GenerationTag },
    Waiting { tag: GenerationTag },
    Active { tag: GenerationTag },
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Uninstalled => write!(f, "uninstalled"),
            LifecycleState::Installing { tag } => write!(f, "installing {}", tag),
            LifecycleState::Waiting { tag } => write!(f, "waiting {}", tag),
            LifecycleState::Active { tag } => write!(f, "active {}", tag),
        }
    }
}

/// Held by a consumer of the active generation. Dropping it releases the
/// consumer.
pub struct ConsumerLease {
    counter: Arc<watch::Sender<usize>>,
}

impl Drop for ConsumerLease {
    fn drop(&mut self) {
        self.counter.send_modify(|count| *count = count.saturating_sub(1));
    }
}

pub struct ActivationController {
    generations: Arc<GenerationManager>,
    transport: Arc<dyn Transport>,
    config: OfflineConfig,
    state: watch::Sender<LifecycleState>,
    transition: Mutex<()>,
    consumers: Arc<watch::Sender<usize>>,
    skip_waiting: watch::Sender<bool>,
}

impl ActivationController {
    /// Create a controller. Starts in `Active` when the manager already has
    /// a current generation.
    pub async fn new(
        generations: Arc<GenerationManager>,
        transport: Arc<dyn Transport>,
        config: OfflineConfig,
    ) -> Self {
        let initial = match generations.current().await {
            Some(tag) => LifecycleState::Active { tag },
            None => LifecycleState::Uninstalled,
        };

        Self {
            generations,
            transport,
            config,
            state: watch::channel(initial).0,
            transition: Mutex::new(()),
            consumers: Arc::new(watch::channel(0).0),
            skip_waiting: watch::channel(false).0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    pub fn generations(&self) -> &Arc<GenerationManager> {
        &self.generations
    }

    /// Register a consumer of the currently served generation
    pub fn acquire_consumer(&self) -> ConsumerLease {
        self.consumers.send_modify(|count| *count += 1);
        ConsumerLease {
            counter: Arc::clone(&self.consumers),
        }
    }

    pub fn consumer_count(&self) -> usize {
        *self.consumers.borrow()
    }

    /// Install the configured generation and move to `Waiting`.
    ///
    /// On failure the controller returns to its previous state and the
    /// previously current generation keeps serving.
    pub async fn install(&self) -> Result<InstallReport> {
        let tag = self.config.generation_tag.clone();
        let manifest = self.config.manifest_urls()?;

        let previous = {
            let _transition = self.transition.lock().await;
            let previous = self.state();
            if let LifecycleState::Installing { tag: busy } = &previous {
                return Err(OfflineError::Other(format!(
                    "generation {} is already installing",
                    busy
                )));
            }
            self.state
                .send_replace(LifecycleState::Installing { tag: tag.clone() });
            previous
        };

        let result = self
            .generations
            .install(&tag, &manifest, self.transport.as_ref())
            .await;

        let _transition = self.transition.lock().await;
        match result {
            Ok(report) => {
                let next = if self.generations.current().await.as_deref() == Some(tag.as_str()) {
                    LifecycleState::Active { tag: tag.clone() }
                } else {
                    LifecycleState::Waiting { tag: tag.clone() }
                };
                info!("Lifecycle: {}", next);
                self.state.send_replace(next);

                if self.config.skip_waiting_on_install {
                    self.skip_waiting.send_replace(true);
                }
                Ok(report)
            }
            Err(e) => {
                warn!("Install of {} failed, staying {}: {}", tag, previous, e);
                self.state.send_replace(previous);
                Err(e)
            }
        }
    }

    /// Wait for the old generation's consumers to release (or for a forced
    /// activation), then activate the waiting generation
    pub async fn wait_and_activate(&self) -> Result<ActivationReport> {
        let tag = match self.state() {
            LifecycleState::Waiting { tag } => tag,
            // Reinstalling the current tag leaves nothing to wait for
            LifecycleState::Active { .. } => return self.activate_waiting().await,
            other => {
                return Err(OfflineError::ActivationError(format!(
                    "no generation is waiting to activate ({})",
                    other
                )))
            }
        };

        if self.generations.current().await.is_some() {
            debug!(
                "Generation {} waiting on {} consumer(s)",
                tag,
                self.consumer_count()
            );

            let mut consumers = self.consumers.subscribe();
            let mut skip = self.skip_waiting.subscribe();
            let mut state = self.state.subscribe();

            tokio::select! {
                _ = consumers.wait_for(|count| *count == 0) => {
                    debug!("All consumers released");
                }
                _ = skip.wait_for(|skip| *skip) => {
                    debug!("Skip waiting requested");
                }
                _ = state.wait_for(|s| !matches!(s, LifecycleState::Waiting { .. })) => {
                    debug!("Lifecycle moved on while waiting");
                }
            }
        }

        self.activate_waiting().await
    }

    /// Activate the waiting generation now, ignoring outstanding consumers.
    /// Returns `None` when nothing is waiting yet; a pending install will
    /// then activate as soon as it finishes waiting.
    pub async fn force_activate(&self) -> Result<Option<ActivationReport>> {
        info!("Forced activation requested");
        self.skip_waiting.send_replace(true);

        if matches!(self.state(), LifecycleState::Waiting { .. }) {
            self.activate_waiting().await.map(Some)
        } else {
            Ok(None)
        }
    }

    async fn activate_waiting(&self) -> Result<ActivationReport> {
        let _transition = self.transition.lock().await;

        let tag = match self.state() {
            LifecycleState::Waiting { tag } | LifecycleState::Active { tag } => tag,
            other => {
                return Err(OfflineError::ActivationError(format!(
                    "cannot activate while {}",
                    other
                )))
            }
        };

        let report = self.generations.activate(&tag).await?;
        self.state.send_replace(LifecycleState::Active { tag });
        self.skip_waiting.send_replace(false);

        if !report.already_current {
            info!("Lifecycle: active {}", report.tag);
        }
        Ok(report)
    }

    /// Install, wait, activate
    pub async fn run(&self) -> Result<ActivationReport> {
        self.install().await?;
        self.wait_and_activate().await
    }

    /// Apply a raw JSON control message
    pub async fn handle_message(&self, raw: &str) -> Result<Option<ActivationReport>> {
        match ControlMessage::parse(raw) {
            Some(ControlMessage::SkipWaiting) => self.force_activate().await,
            None => Ok(None),
        }
    }

    /// Drain a control channel until every sender is dropped
    pub async fn run_control_loop(self: Arc<Self>, mut messages: mpsc::Receiver<ControlMessage>) {
        while let Some(message) = messages.recv().await {
            match message {
                ControlMessage::SkipWaiting => {
                    if let Err(e) = self.force_activate().await {
                        warn!("Forced activation failed: {}", e);
                    }
                }
            }
        }
        debug!("Control channel closed");
    }
}
