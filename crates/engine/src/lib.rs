use crate::error::EngineError;
use crate::event::{Command, Timer};
use crate::scheduler::TokioScheduler;
use crate::session::{SessionMachine, SessionSettings};
use api_client::{Completion, Endpoints, ReqwestTransport};
use configuration::{Config, CredentialStore};
use core_types::FilterRule;
use events::ClientEvent;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

pub mod catalog;
pub mod error;
pub mod event;
pub mod ingest;
pub mod scheduler;
pub mod session;
pub mod tracker;

pub use catalog::{ALL_SYMBOLS, Catalog, FilterModel};
pub use ingest::KlineBook;
pub use scheduler::Scheduler;
pub use session::{Session, SessionState};
pub use tracker::{RequestKind, RequestTracker};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 1024;

/// Cloneable front of a running [`SessionEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ClientEvent>,
}

impl EngineHandle {
    /// Receives every event appended to the log after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::EngineStopped)
    }

    pub async fn replace_filter(&self, rules: Vec<FilterRule>) -> Result<(), EngineError> {
        self.send(Command::ReplaceFilter(rules)).await
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(Command::Shutdown).await
    }
}

/// The live client: a [`SessionMachine`] over `reqwest` and tokio timers,
/// driven by a single `select!` loop.
pub struct SessionEngine<S: CredentialStore> {
    machine: SessionMachine<ReqwestTransport, TokioScheduler, S>,
    completions: mpsc::UnboundedReceiver<Completion>,
    timers: mpsc::UnboundedReceiver<Timer>,
    commands: mpsc::Receiver<Command>,
    publisher: broadcast::Sender<ClientEvent>,
    published: usize,
    maintenance_interval: Duration,
}

impl<S: CredentialStore> SessionEngine<S> {
    /// Wires the engine from the loaded configuration.
    pub fn new(config: &Config, store: S) -> Result<(Self, EngineHandle), EngineError> {
        let (completion_tx, completions) = mpsc::unbounded_channel();
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (publisher, _) = broadcast::channel(EVENT_BUFFER);

        let transport = ReqwestTransport::new(&config.server, completion_tx)?;
        let machine = SessionMachine::new(
            transport,
            TokioScheduler::new(timer_tx),
            store,
            Endpoints::new(&config.server.base_url),
            SessionSettings::from(&config.session),
        )
        .with_startup_filter(config.filter_rules());

        let handle = EngineHandle {
            commands: command_tx,
            events: publisher.clone(),
        };
        let engine = Self {
            machine,
            completions,
            timers,
            commands,
            publisher,
            published: 0,
            maintenance_interval: config.session.maintenance_interval(),
        };
        Ok((engine, handle))
    }

    /// Runs until a `Shutdown` command arrives or every handle is dropped.
    pub async fn run(mut self) -> Result<(), EngineError> {
        tracing::info!(server = %self.machine_endpoint(), "Session engine starting.");
        let started = self.machine.start();
        self.publish();
        started?;

        let mut maintenance = tokio::time::interval(self.maintenance_interval);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(completion) = self.completions.recv() => {
                    self.machine.handle_completion(completion);
                }
                Some(timer) = self.timers.recv() => {
                    self.machine.handle_timer(timer);
                }
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.machine.handle_command(command),
                },
                _ = maintenance.tick() => {
                    self.machine.sweep(Instant::now());
                }
            }
            self.publish();
        }

        tracing::info!(
            detections = self.machine.klines().len(),
            in_flight = self.machine.tracker().len(),
            "Session engine stopped."
        );
        Ok(())
    }

    fn machine_endpoint(&self) -> &str {
        self.machine.endpoints().base_url()
    }

    // Forwards log entries appended since the last call.
    fn publish(&mut self) {
        let log = self.machine.events();
        for event in log.since(self.published) {
            // Err only means nobody is subscribed.
            let _ = self.publisher.send(event.clone());
        }
        self.published = log.len();
    }
}
