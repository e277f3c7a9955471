//! Mapping engine lifecycle with statum state machine
//!
//! Implements a 5-state lifecycle around [`EngineCore`] with compile-time
//! state safety. The active engine runs in its own tokio task and serializes
//! controller events, the poll tick and classifier deadlines on one loop.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Configured ──► Active ──► Deactivating ──► Deactivated
//! ```
//!
//! # Architecture
//!
//! ```text
//! ControllerEvent ──► [EngineCore] ──► OutputSink
//!       ▲                  │
//!   Input Channel          └──► EngineEvent channel
//! ```

use super::core::EngineCore;
use super::error::EngineError;
use crate::config::EngineSettings;
use crate::controller::button::ControllerEvent;
use crate::mapping::profile::{Profile, ProfileStore};
use crate::output::{EngineEvent, OutputSink};
use statum::{machine, state};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// States for mapping engine lifecycle using statum
#[state]
#[derive(Debug, Clone)]
pub enum MappingEngineState {
    Initializing, // Channels wired, nothing validated
    Configured,   // Settings and profile validated, core built
    Active,       // Running the event loop
    Deactivating, // Releasing held outputs
    Deactivated,  // Fully stopped
}

#[machine]
pub struct MappingEngine<S: MappingEngineState> {
    name: String,
    settings: EngineSettings,
    input_receiver: mpsc::Receiver<ControllerEvent>,
    profiles: watch::Receiver<Arc<Profile>>,
    sink: Arc<dyn OutputSink>,
    event_sender: Option<mpsc::Sender<EngineEvent>>,
    core: Option<Arc<EngineCore>>,
}

impl<S: MappingEngineState> MappingEngine<S> {
    pub fn get_name(&self) -> &str {
        &self.name
    }
}

impl MappingEngine<Initializing> {
    pub fn create(
        name: String,
        settings: EngineSettings,
        input_receiver: mpsc::Receiver<ControllerEvent>,
        profiles: watch::Receiver<Arc<Profile>>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        info!("Initializing new mapping engine: {}", name);

        Self::new(
            name,
            settings,
            input_receiver,
            profiles,
            sink,
            None, // event_sender
            None, // core
        )
    }

    /// Publishes engine events to `sender` once configured.
    pub fn with_events(mut self, sender: mpsc::Sender<EngineEvent>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Validates settings and the current profile, then builds the core.
    pub fn configure(mut self) -> Result<MappingEngine<Configured>, EngineError> {
        info!("Configuring mapping engine: {}", self.name);

        self.settings.validate()?;
        let profile = self.profiles.borrow().clone();
        profile.validate()?;
        debug!("Profile '{}' validated", profile.name);

        let mut core = EngineCore::new(
            &self.settings,
            self.sink.clone(),
            Arc::new(self.profiles.clone()),
        );
        if let Some(sender) = self.event_sender.clone() {
            core = core.with_events(sender);
        }
        self.core = Some(Arc::new(core));

        info!("Engine configured successfully: {}", self.name);
        Ok(self.transition())
    }
}

impl MappingEngine<Configured> {
    pub fn activate(self) -> MappingEngine<Active> {
        info!("Activating mapping engine: {}", self.name);
        self.transition()
    }

    pub fn core(&self) -> Option<Arc<EngineCore>> {
        self.core.clone()
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

impl MappingEngine<Active> {
    /// Main processing loop with graceful shutdown support
    ///
    /// Runs until the shutdown signal arrives or the input channel closes.
    /// A profile swap resets all engine state before the next event.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<MappingEngine<Deactivating>, EngineError> {
        let core = self.core.clone().ok_or_else(|| {
            EngineError::InvalidStateTransition("Active engine without core".to_string())
        })?;
        info!("Starting event processing loop for: {}", self.name);

        let mut poll = tokio::time::interval(self.settings.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut profiles_open = true;

        loop {
            let deadline = core.next_deadline();
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Shutdown signal received for: {}", self.name);
                    break;
                }

                event = self.input_receiver.recv() => match event {
                    Some(event) => core.handle(event),
                    None => {
                        info!("Input channel closed for: {}", self.name);
                        break;
                    }
                },

                changed = self.profiles.changed(), if profiles_open => match changed {
                    Ok(()) => {
                        let name = self.profiles.borrow_and_update().name.clone();
                        info!("Profile changed to '{}', resetting engine state", name);
                        core.reset();
                    }
                    Err(_) => {
                        warn!("Profile store dropped, keeping last profile");
                        profiles_open = false;
                    }
                },

                _ = wait_for_deadline(deadline) => core.fire_due(now()),

                _ = poll.tick() => core.tick(now()),
            }
        }

        info!("Transitioning to Deactivating state: {}", self.name);
        Ok(self.transition())
    }

    pub fn deactivate(self) -> MappingEngine<Deactivating> {
        info!("Deactivating mapping engine: {}", self.name);
        self.transition()
    }
}

impl MappingEngine<Deactivating> {
    /// Releases everything still held and transitions to Deactivated
    pub fn shutdown(self) -> MappingEngine<Deactivated> {
        info!("Shutting down mapping engine: {}", self.name);
        if let Some(core) = &self.core {
            core.reset();
        }
        info!("Engine shut down successfully: {}", self.name);
        self.transition()
    }
}

impl MappingEngine<Deactivated> {}

/// Handle for an engine running in a tokio task
#[derive(Debug)]
pub struct MappingEngineHandle {
    pub name: String,
    input_sender: mpsc::Sender<ControllerEvent>,
    core: Arc<EngineCore>,
    task_handle: Option<JoinHandle<Result<(), EngineError>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MappingEngineHandle {
    /// Configures, activates and spawns an engine.
    ///
    /// # Returns
    ///
    /// * The handle; controller events go through [`Self::input`]
    /// * Receiver for engine events
    pub fn spawn(
        name: impl Into<String>,
        settings: EngineSettings,
        profiles: &ProfileStore,
        sink: Arc<dyn OutputSink>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>), EngineError> {
        let name = name.into();
        let buffer = settings.timing.event_buffer.max(1);
        let (input_sender, input_receiver) = mpsc::channel(buffer);
        let (event_sender, event_receiver) = mpsc::channel(buffer);

        let engine = MappingEngine::create(
            name.clone(),
            settings,
            input_receiver,
            profiles.subscribe(),
            sink,
        )
        .with_events(event_sender)
        .configure()?;
        let core = engine.core().ok_or_else(|| {
            EngineError::InvalidStateTransition("Configured engine without core".to_string())
        })?;
        let active_engine = engine.activate();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let engine_name = name.clone();
        let task_handle = tokio::spawn(async move {
            info!("Spawning running engine: {}", engine_name);
            match active_engine.run_until_shutdown(shutdown_rx).await {
                Ok(deactivating_engine) => {
                    let _ = deactivating_engine.shutdown();
                    Ok(())
                }
                Err(e) => {
                    error!("Error running engine: {} - {}", engine_name, e);
                    Err(e)
                }
            }
        });

        info!("Mapping engine activated: {}", name);
        Ok((
            Self {
                name,
                input_sender,
                core,
                task_handle: Some(task_handle),
                shutdown_tx: Some(shutdown_tx),
            },
            event_receiver,
        ))
    }

    pub fn input(&self) -> mpsc::Sender<ControllerEvent> {
        self.input_sender.clone()
    }

    /// Direct access for enable/disable and frontmost-app updates.
    pub fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    pub async fn send(&self, event: ControllerEvent) -> Result<(), EngineError> {
        self.input_sender
            .send(event)
            .await
            .map_err(|e| EngineError::ChannelError(format!("Engine input closed: {}", e)))
    }

    /// Gracefully shuts down the engine and waits for the task
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        debug!("Sending shutdown signal to engine: {}", self.name);

        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("Engine task already terminated: {}", self.name);
            }
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => {
                    debug!("Engine task completed: {}", self.name);
                    result
                }
                Err(e) => {
                    error!("Engine task panicked: {} - {}", self.name, e);
                    Err(EngineError::TaskError(format!("Engine task panicked: {}", e)))
                }
            }
        } else {
            debug!("Engine already shut down: {}", self.name);
            Ok(())
        }
    }
}
