//! Engine supervisor: wires the frame source, tracker, module host, router,
//! publisher, and auxiliary threads, then runs the tick loop until Ctrl+C.

use std::{
    any::Any,
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow, bail};
use ball_tracking::{BallTracker, ObjectDetector, SettingsStore};
use depth_ingest::{CaptureError, DepthCamera, FrameSource, RecordingCamera, SyntheticCamera};
use tracing::{debug, error, info, info_span, warn};

use crate::engine::{
    actuator::ActuatorModule,
    config::{CameraSource, EngineConfig},
    console::ConsoleWriter,
    data::{FrameSnapshot, SharedSnapshot, SystemStatus},
    host::ModuleHost,
    protocol::Command,
    publisher::Publisher,
    router::{CommandRouter, RouterHandle},
    server::spawn_command_server,
    telemetry::{self, RecorderInit},
    watchdog::{EngineHealth, HealthComponent, spawn_watchdog},
};

/// Upper bound on one wait for frames, so shutdown is observed promptly.
pub(crate) const FRAME_WAIT: Duration = Duration::from_millis(100);
const CAPTURE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The tick-thread half of the engine.
pub(crate) struct Engine {
    source: FrameSource,
    detector: Box<dyn ObjectDetector>,
    host: Arc<ModuleHost>,
    router: RouterHandle,
    publisher: Arc<Publisher>,
    console: Option<ConsoleWriter>,
    health: Arc<EngineHealth>,
    frame_number: u64,
    smoothed_fps: f32,
    last_instant: Option<Instant>,
}

impl Engine {
    pub(crate) fn new(
        source: FrameSource,
        detector: Box<dyn ObjectDetector>,
        host: Arc<ModuleHost>,
        router: RouterHandle,
        publisher: Arc<Publisher>,
        console: Option<ConsoleWriter>,
        health: Arc<EngineHealth>,
    ) -> Self {
        Self {
            source,
            detector,
            host,
            router,
            publisher,
            console,
            health,
            frame_number: 0,
            smoothed_fps: 0.0,
            last_instant: None,
        }
    }

    /// Acquire, detect, update the active module, publish.
    ///
    /// Returns `Ok(None)` when the tick was skipped (no frames within
    /// [`FRAME_WAIT`], or a color/depth frame missing).
    pub(crate) fn tick(&mut self) -> Result<Option<SharedSnapshot>, CaptureError> {
        let frames = match self.source.next_frames(FRAME_WAIT) {
            Ok(frames) => frames,
            Err(CaptureError::Timeout(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        self.health.beat(HealthComponent::Capture);

        let Some(pair) = frames.into_pair() else {
            metrics::counter!("juggler_frames_skipped_total").increment(1);
            debug!("incomplete frame set; tick skipped");
            return Ok(None);
        };

        let started = Instant::now();
        if let Some(last) = self.last_instant.replace(started) {
            let elapsed = started.duration_since(last).as_secs_f32();
            if elapsed > 0.0 {
                let instant = 1.0 / elapsed;
                self.smoothed_fps = if self.smoothed_fps == 0.0 {
                    instant
                } else {
                    0.9 * self.smoothed_fps + 0.1 * instant
                };
            }
        }
        self.frame_number = self.frame_number.wrapping_add(1);

        let _tick_span = info_span!(
            "engine.tick",
            frame = self.frame_number,
            timestamp = pair.timestamp_us
        )
        .entered();

        let intrinsics = self.source.intrinsics();
        let observations = self.detector.detect(&pair, &intrinsics);
        let snapshot = Arc::new(FrameSnapshot {
            frame_number: self.frame_number,
            timestamp_us: pair.timestamp_us,
            width: pair.color.width(),
            height: pair.color.height(),
            intrinsics,
            observations,
            status: SystemStatus {
                running: true,
                camera_connected: self.health.is_camera_connected(),
                fps: self.smoothed_fps,
                frame_count: self.frame_number,
                mode: self.source.mode().to_string(),
            },
        });

        let router = &self.router;
        self.host.update(&snapshot, &mut |command| router.enqueue(command));
        self.publisher.publish(snapshot.clone());
        if let Some(console) = &self.console {
            if let Err(err) = console.write(&snapshot) {
                warn!("console output failed: {err}");
            }
        }

        metrics::histogram!("juggler_tick_seconds").record(started.elapsed().as_secs_f64());
        metrics::gauge!("juggler_fps").set(f64::from(self.smoothed_fps));
        metrics::gauge!("juggler_observations").set(snapshot.observations.len() as f64);
        if self.frame_number % 300 == 0 {
            debug!(
                "heartbeat: frame #{}, {:.1} fps, {} object(s)",
                self.frame_number,
                self.smoothed_fps,
                snapshot.observations.len()
            );
        }
        Ok(Some(snapshot))
    }
}

/// Join a worker thread, turning a panic into an error carrying its message.
fn join_worker<T>(name: &str, handle: JoinHandle<T>) -> Result<T> {
    handle.join().map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!(thread = name, "thread panicked: {message}");
        anyhow!("{name} thread panicked: {message}")
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn open_camera(source: &CameraSource) -> Result<Box<dyn DepthCamera>> {
    Ok(match source {
        CameraSource::Synthetic => Box::new(SyntheticCamera::new().paced(true)),
        CameraSource::Recording(dir) => Box::new(
            RecordingCamera::open(dir)
                .with_context(|| format!("Failed to open recording at {}", dir.display()))?,
        ),
    })
}

/// Run the engine until Ctrl+C.
pub fn run(config: EngineConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    match telemetry::init_metrics_recorder() {
        RecorderInit::Installed => debug!("prometheus recorder installed"),
        RecorderInit::Reused => debug!("prometheus recorder already installed"),
        RecorderInit::Foreign(err) => warn!("prometheus recorder not installed: {err}"),
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let engine_span = info_span!(
        "engine",
        camera = ?config.camera,
        http = %config.http_addr,
        format = ?config.output_format
    );
    let _engine_guard = engine_span.enter();

    let table = SettingsStore::new(&config.settings_path).load();
    info!(
        "tracking {} color(s): {}",
        table.len(),
        table.names().collect::<Vec<_>>().join(", ")
    );

    let camera = open_camera(&config.camera)?;
    let source = FrameSource::open(camera, &config.modes).context("Camera setup failed")?;
    let tracker = BallTracker::new(table, config.tracker);

    let actuator = ActuatorModule::udp(config.actuator);
    info!(
        "actuator targets {}.x:{}",
        actuator.config().subnet,
        actuator.config().port
    );
    let health = Arc::new(EngineHealth::new());
    let host = Arc::new(ModuleHost::new(actuator));
    let (router, router_handle) = CommandRouter::new(host.clone());
    let router = router.with_heartbeat(health.clone());
    let router_thread = telemetry::spawn_thread("engine-commands", {
        let shutdown = shutdown.clone();
        move || router.run(shutdown)
    })
    .context("Failed to spawn command thread")?;

    let publisher = Arc::new(Publisher::new());
    let server = spawn_command_server(config.http_addr, router_handle.clone(), publisher.clone())
        .context("Failed to start command server")?;

    let watchdog = spawn_watchdog(health.clone(), shutdown.clone());

    let console = config.console.then(|| ConsoleWriter::new(config.output_format));
    let mut engine = Engine::new(
        source,
        Box::new(tracker),
        host.clone(),
        router_handle,
        publisher,
        console,
        health,
    );

    info!("engine running; press Ctrl+C to stop");
    let mut router_died = false;
    while !shutdown.load(Ordering::Relaxed) {
        // The router only returns once shutdown is set.
        if router_thread.is_finished() {
            error!("command thread exited unexpectedly; stopping engine");
            router_died = true;
            shutdown.store(true, Ordering::SeqCst);
            break;
        }
        if let Err(err) = engine.tick() {
            warn!("capture error: {err}");
            thread::sleep(CAPTURE_ERROR_BACKOFF);
        }
    }

    info!("stopping engine");
    drop(engine);
    let router_result = join_worker("engine-commands", router_thread);
    if let Some(name) = host.active_name() {
        info!(module = name, "unloading active module");
        host.handle(&Command::UnloadModule);
    }
    let watchdog_result = join_worker("engine-watchdog", watchdog);
    server.stop();

    router_result?;
    watchdog_result?;
    if router_died {
        bail!("command thread stopped before shutdown");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ball_tracking::{ColorTable, TrackerConfig};
    use depth_ingest::{DEFAULT_MODE_CANDIDATES, StreamMode};

    use super::*;
    use crate::engine::{
        actuator::{ActuatorConfig, testing::RecordingSink},
        data::FrameSnapshot,
        host::testing::{Counters, counting_host},
        modules::{BehaviorModule, ConfigError},
        protocol::{Command, ModuleArgs, Target},
    };

    type Harness = (Engine, RouterHandle, Arc<ModuleHost>, Arc<Counters>, Arc<Publisher>);

    fn engine_with(camera: SyntheticCamera) -> Harness {
        let source = FrameSource::open(Box::new(camera), &DEFAULT_MODE_CANDIDATES).unwrap();
        let (host, a, _, _) = counting_host();
        let host = Arc::new(host);
        let (_router, handle) = CommandRouter::new(host.clone());
        let publisher = Arc::new(Publisher::new());
        let engine = Engine::new(
            source,
            Box::new(BallTracker::new(ColorTable::starter(), TrackerConfig::default())),
            host.clone(),
            handle.clone(),
            publisher.clone(),
            None,
            Arc::new(EngineHealth::new()),
        );
        (engine, handle, host, a, publisher)
    }

    #[test]
    fn tick_publishes_observations_and_queues_module_commands() {
        let camera = SyntheticCamera::new().with_supported_modes(vec![StreamMode::new(640, 480, 30)]);
        let (mut engine, handle, host, counters, publisher) = engine_with(camera);
        assert!(host.handle(&Command::LoadModule { name: "counter_a".into() }).success);

        let snapshot = engine.tick().unwrap().expect("tick produced a snapshot");
        assert_eq!(snapshot.frame_number, 1);
        assert_eq!(snapshot.status.mode, "640x480@30");
        assert_eq!(snapshot.observations.len(), 2);
        assert!(snapshot.status.running);

        assert_eq!(Counters::get(&counters.updates), 1);
        assert!(matches!(
            handle.pending_internal().as_slice(),
            [Command::SendColor { target: Target::Object(9), .. }]
        ));
        assert_eq!(publisher.latest().unwrap().frame_number, 1);
    }

    #[test]
    fn missing_depth_skips_the_tick() {
        let camera = SyntheticCamera::new().drop_depth_every(2);
        let (mut engine, _, _, _, publisher) = engine_with(camera);

        assert!(engine.tick().unwrap().is_some());
        assert!(engine.tick().unwrap().is_none());
        let third = engine.tick().unwrap().unwrap();
        assert_eq!(third.frame_number, 2);
        assert_eq!(publisher.latest().unwrap().frame_number, 2);
    }

    struct FaultyModule;

    impl BehaviorModule for FaultyModule {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn setup(&mut self) {
            panic!("faulty setup");
        }

        fn update(&mut self, _snapshot: &FrameSnapshot, _emit: &mut dyn FnMut(Command)) {}

        fn configure(&mut self, _args: &ModuleArgs) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    #[test]
    fn command_thread_panic_is_reported_on_join() {
        let factory = |name: &str| -> Result<Box<dyn BehaviorModule>, ConfigError> {
            match name {
                "faulty" => Ok(Box::new(FaultyModule)),
                other => Err(ConfigError::UnknownModule(other.into())),
            }
        };
        let actuator =
            ActuatorModule::new(ActuatorConfig::default(), Box::new(RecordingSink::default()));
        let host = Arc::new(ModuleHost::with_factory(actuator, Box::new(factory)));
        let (router, handle) = CommandRouter::new(host);
        let shutdown = Arc::new(AtomicBool::new(false));
        let router_thread = telemetry::spawn_thread("engine-commands", {
            let shutdown = shutdown.clone();
            move || router.run(shutdown)
        })
        .unwrap();

        let response = handle.request(
            Command::LoadModule { name: "faulty".into() },
            Duration::from_secs(5),
        );
        assert!(!response.success);
        assert!(response.message.contains("shutting down"), "{response:?}");

        // The router never saw shutdown, so only a panic can have ended it.
        assert!(!shutdown.load(Ordering::SeqCst));
        let err = join_worker("engine-commands", router_thread).unwrap_err();
        assert!(err.to_string().contains("faulty setup"), "{err}");
    }

    #[test]
    fn panic_payloads_render_as_text() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&7_u32), "non-string panic payload");
    }

    #[test]
    fn clean_exit_passes_the_value_through() {
        let worker = thread::spawn(|| 42);
        assert_eq!(join_worker("worker", worker).unwrap(), 42);
    }
}
