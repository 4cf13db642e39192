//! Command routing between external callers, behavior modules, and the host.
//!
//! External requests (HTTP) wait for a response; internal commands (emitted by
//! the active behavior module on the tick thread) are fire-and-forget. Each
//! poll cycle serves at most one external request, then drains the internal
//! queue.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use tracing::{debug, info_span, warn};

use crate::engine::{
    host::ModuleHost,
    protocol::{Command, CommandResponse},
    watchdog::{EngineHealth, HealthComponent},
};

pub(crate) const IDLE_SLEEP: Duration = Duration::from_millis(10);
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const EXTERNAL_QUEUE_CAPACITY: usize = 32;

struct ExternalRequest {
    command: Command,
    reply: Sender<CommandResponse>,
}

type InternalQueue = Arc<Mutex<VecDeque<Command>>>;

/// Cloneable entry point used by the server and the tick loop.
#[derive(Clone)]
pub(crate) struct RouterHandle {
    external: Sender<ExternalRequest>,
    internal: InternalQueue,
}

impl RouterHandle {
    /// Submit a command and wait for the router's answer.
    pub(crate) fn request(&self, command: Command, timeout: Duration) -> CommandResponse {
        let kind = command.kind();
        let (reply, response) = crossbeam_channel::bounded(1);
        match self
            .external
            .send_timeout(ExternalRequest { command, reply }, timeout)
        {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                return CommandResponse::fail(format!("{kind}: command queue is full"));
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                return CommandResponse::fail(format!("{kind}: engine is shutting down"));
            }
        }
        match response.recv_timeout(timeout) {
            Ok(response) => response,
            Err(RecvTimeoutError::Timeout) => {
                CommandResponse::fail(format!("{kind}: no response within {timeout:?}"))
            }
            Err(RecvTimeoutError::Disconnected) => {
                CommandResponse::fail(format!("{kind}: engine is shutting down"))
            }
        }
    }

    /// Queue a command from inside the engine; never blocks on I/O.
    pub(crate) fn enqueue(&self, command: Command) {
        self.internal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(command);
    }

    #[cfg(test)]
    pub(crate) fn pending_internal(&self) -> Vec<Command> {
        self.internal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

pub(crate) struct CommandRouter {
    host: Arc<ModuleHost>,
    external: Receiver<ExternalRequest>,
    internal: InternalQueue,
    health: Option<Arc<EngineHealth>>,
}

impl CommandRouter {
    pub(crate) fn new(host: Arc<ModuleHost>) -> (Self, RouterHandle) {
        let (tx, rx) = crossbeam_channel::bounded(EXTERNAL_QUEUE_CAPACITY);
        let internal: InternalQueue = Arc::default();
        let handle = RouterHandle {
            external: tx,
            internal: internal.clone(),
        };
        (
            Self {
                host,
                external: rx,
                internal,
                health: None,
            },
            handle,
        )
    }

    /// Beat `health` once per poll cycle while running.
    pub(crate) fn with_heartbeat(mut self, health: Arc<EngineHealth>) -> Self {
        self.health = Some(health);
        self
    }

    /// One poll cycle. Returns whether any command was processed.
    pub(crate) fn poll_once(&self) -> bool {
        let mut worked = false;

        if let Ok(request) = self.external.try_recv() {
            worked = true;
            let response = self.dispatch(&request.command, "external");
            // Caller may have timed out and dropped its receiver.
            let _ = request.reply.send(response);
        }

        while let Some(command) = self.pop_internal() {
            worked = true;
            let response = self.dispatch(&command, "internal");
            if !response.success {
                debug!(command = command.kind(), "internal command failed: {}", response.message);
            }
        }
        worked
    }

    fn pop_internal(&self) -> Option<Command> {
        self.internal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn dispatch(&self, command: &Command, source: &'static str) -> CommandResponse {
        let _span = info_span!("router.command", kind = command.kind(), source).entered();
        metrics::counter!("juggler_commands_total", "source" => source).increment(1);
        let response = self.host.handle(command);
        if source == "external" && !response.success {
            warn!(command = command.kind(), "{}", response.message);
        }
        response
    }

    /// Poll until `shutdown` is set, sleeping briefly when idle.
    pub(crate) fn run(self, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            if let Some(health) = &self.health {
                health.beat(HealthComponent::Commands);
            }
            if !self.poll_once() {
                thread::sleep(IDLE_SLEEP);
            }
        }
        debug!("command router stopped");
    }
}
