//! Heartbeat monitor for the tick and command threads.
//!
//! The tick thread beats on every frame it receives; the command router beats
//! on every poll cycle. A stale capture heartbeat marks the camera as
//! disconnected until the next frame arrives. A stale command loop is logged.
//! The watchdog never restarts anything.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tracing::{error, info, warn};

use crate::engine::telemetry;

pub(crate) const WATCHDOG_POLL_INTERVAL_MS: u64 = 250;
pub(crate) const WATCHDOG_STALE_THRESHOLD_MS: u64 = 1_500;
pub(crate) const WATCHDOG_STARTUP_GRACE_MS: u64 = 5_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum HealthComponent {
    Capture,
    Commands,
}

impl HealthComponent {
    pub(crate) fn label(self) -> &'static str {
        match self {
            HealthComponent::Capture => "capture",
            HealthComponent::Commands => "command loop",
        }
    }
}

/// Transition observed by one watchdog check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    Stale(HealthComponent),
    Recovered(HealthComponent),
}

pub(crate) struct EngineHealth {
    capture: AtomicU64,
    commands: AtomicU64,
    camera_connected: AtomicBool,
    commands_alive: AtomicBool,
}

impl EngineHealth {
    pub(crate) fn new() -> Self {
        Self::starting_at(current_millis())
    }

    fn starting_at(now: u64) -> Self {
        let grace_deadline = now.saturating_add(WATCHDOG_STARTUP_GRACE_MS);
        Self {
            capture: AtomicU64::new(grace_deadline),
            commands: AtomicU64::new(grace_deadline),
            camera_connected: AtomicBool::new(true),
            commands_alive: AtomicBool::new(true),
        }
    }

    pub(crate) fn beat(&self, component: HealthComponent) {
        self.beat_at(component, current_millis());
    }

    fn beat_at(&self, component: HealthComponent, now: u64) {
        self.slot(component).0.store(now, Ordering::Relaxed);
    }

    pub(crate) fn is_camera_connected(&self) -> bool {
        self.camera_connected.load(Ordering::Relaxed)
    }

    fn slot(&self, component: HealthComponent) -> (&AtomicU64, &AtomicBool) {
        match component {
            HealthComponent::Capture => (&self.capture, &self.camera_connected),
            HealthComponent::Commands => (&self.commands, &self.commands_alive),
        }
    }

    /// Re-evaluate every component and report the ones whose state flipped.
    fn check(&self, now: u64) -> Vec<HealthEvent> {
        [HealthComponent::Capture, HealthComponent::Commands]
            .into_iter()
            .filter_map(|component| {
                let (last_beat, alive) = self.slot(component);
                let fresh = now.saturating_sub(last_beat.load(Ordering::Relaxed))
                    <= WATCHDOG_STALE_THRESHOLD_MS;
                let previous = alive.swap(fresh, Ordering::SeqCst);
                match (previous, fresh) {
                    (true, false) => Some(HealthEvent::Stale(component)),
                    (false, true) => Some(HealthEvent::Recovered(component)),
                    _ => None,
                }
            })
            .collect()
    }
}

pub(crate) fn spawn_watchdog(
    health: Arc<EngineHealth>,
    shutdown: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    telemetry::spawn_thread("engine-watchdog", move || {
        while !shutdown.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
            for event in health.check(current_millis()) {
                match event {
                    HealthEvent::Stale(HealthComponent::Capture) => warn!(
                        "no frames for over {WATCHDOG_STALE_THRESHOLD_MS} ms; camera marked disconnected"
                    ),
                    HealthEvent::Stale(component) => error!(
                        "{} stalled for over {WATCHDOG_STALE_THRESHOLD_MS} ms",
                        component.label()
                    ),
                    HealthEvent::Recovered(component) => info!("{} recovered", component.label()),
                }
            }
        }
    })
    .expect("failed to spawn watchdog thread")
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_grace_keeps_everything_alive() {
        let health = EngineHealth::starting_at(1_000);
        assert!(health.check(1_000 + WATCHDOG_STARTUP_GRACE_MS).is_empty());
        assert!(health.is_camera_connected());
    }

    #[test]
    fn stale_capture_disconnects_camera_until_frames_resume() {
        let health = EngineHealth::starting_at(0);
        health.beat_at(HealthComponent::Capture, 10_000);
        health.beat_at(HealthComponent::Commands, 11_500);

        let now = 10_000 + WATCHDOG_STALE_THRESHOLD_MS + 1;
        assert_eq!(
            health.check(now),
            vec![HealthEvent::Stale(HealthComponent::Capture)]
        );
        assert!(!health.is_camera_connected());
        assert!(health.check(now + 1).is_empty());

        health.beat_at(HealthComponent::Capture, 12_000);
        assert_eq!(
            health.check(12_100),
            vec![HealthEvent::Recovered(HealthComponent::Capture)]
        );
        assert!(health.is_camera_connected());
    }

    #[test]
    fn stale_command_loop_leaves_camera_flag_alone() {
        let health = EngineHealth::starting_at(0);
        health.beat_at(HealthComponent::Capture, 20_000);
        health.beat_at(HealthComponent::Commands, 10_000);
        assert_eq!(
            health.check(20_100),
            vec![HealthEvent::Stale(HealthComponent::Commands)]
        );
        assert!(health.is_camera_connected());
    }

    #[test]
    fn watchdog_thread_stops_on_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(true));
        spawn_watchdog(Arc::new(EngineHealth::new()), shutdown)
            .join()
            .unwrap();
    }
}
