//! Behavior module slot plus the always-resident actuator.
//!
//! The slot is shared between the tick thread (per-frame `update`) and the
//! command thread (load/unload/configure); both hold the lock only for the
//! duration of one call.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::engine::{
    actuator::ActuatorModule,
    data::FrameSnapshot,
    modules::{BehaviorModule, ModuleFactory, canonical_name, create_module},
    protocol::{Command, CommandResponse, ModuleArgs},
};

type Slot = Option<Box<dyn BehaviorModule>>;

pub(crate) struct ModuleHost {
    active: Mutex<Slot>,
    factory: Box<ModuleFactory>,
    actuator: ActuatorModule,
}

impl ModuleHost {
    pub(crate) fn new(actuator: ActuatorModule) -> Self {
        Self::with_factory(actuator, Box::new(create_module))
    }

    pub(crate) fn with_factory(actuator: ActuatorModule, factory: Box<ModuleFactory>) -> Self {
        Self {
            active: Mutex::new(None),
            factory,
            actuator,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn active_name(&self) -> Option<&'static str> {
        self.slot().as_ref().map(|module| module.name())
    }

    /// Run the active module, if any, against one snapshot.
    pub(crate) fn update(&self, snapshot: &FrameSnapshot, emit: &mut dyn FnMut(Command)) {
        if let Some(module) = self.slot().as_mut() {
            module.update(snapshot, emit);
        }
    }

    pub(crate) fn handle(&self, command: &Command) -> CommandResponse {
        match command {
            Command::LoadModule { name } => self.load(name),
            Command::UnloadModule => self.unload(),
            Command::ConfigureModule { name, args } => self.configure(name, args),
            _ if ActuatorModule::handles(command) => self.actuator.handle(command),
            other => CommandResponse::fail(format!("no handler for {}", other.kind())),
        }
    }

    fn load(&self, name: &str) -> CommandResponse {
        let mut module = match (self.factory)(name) {
            Ok(module) => module,
            Err(err) => {
                warn!("load rejected: {err}");
                return CommandResponse::fail(err.to_string());
            }
        };

        let mut slot = self.slot();
        if let Some(mut previous) = slot.take() {
            info!(module = previous.name(), "replacing active module");
            previous.cleanup();
        }
        module.setup();
        let loaded = module.name();
        *slot = Some(module);
        info!(module = loaded, "module loaded");
        CommandResponse::ok(format!("module {loaded} loaded"))
    }

    fn unload(&self) -> CommandResponse {
        match self.slot().take() {
            Some(mut module) => {
                module.cleanup();
                info!(module = module.name(), "module unloaded");
                CommandResponse::ok(format!("module {} unloaded", module.name()))
            }
            None => CommandResponse::fail("no active module"),
        }
    }

    fn configure(&self, name: &str, args: &ModuleArgs) -> CommandResponse {
        let mut slot = self.slot();
        let Some(module) = slot.as_mut() else {
            return CommandResponse::fail("no active module");
        };
        let requested = canonical_name(name).unwrap_or(name);
        if requested != module.name() {
            return CommandResponse::fail(format!(
                "module {name} is not active (active: {})",
                module.name()
            ));
        }
        match module.configure(args) {
            Ok(()) => CommandResponse::ok(format!("module {} configured", module.name())),
            Err(err) => {
                warn!(module = module.name(), "configure rejected: {err}");
                CommandResponse::fail(err.to_string())
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use crate::engine::{
        actuator::{ActuatorConfig, testing::RecordingSink},
        data::fixtures::snapshot,
        protocol::{Rgb, Target},
    };

    fn load(name: &str) -> Command {
        Command::LoadModule { name: name.into() }
    }

    fn tick(host: &ModuleHost) -> usize {
        let mut emitted = 0;
        host.update(&snapshot(Vec::new()), &mut |_| emitted += 1);
        emitted
    }

    #[test]
    fn unknown_load_keeps_active_module_running() {
        let (host, a, _, _) = counting_host();
        assert!(host.handle(&load("counter_a")).success);

        let response = host.handle(&load("nonexistent"));
        assert!(!response.success);
        assert_eq!(host.active_name(), Some("counter_a"));
        assert_eq!(tick(&host), 1);
        assert_eq!(Counters::get(&a.updates), 1);
        assert_eq!(Counters::get(&a.cleanups), 0);
    }

    #[test]
    fn load_while_active_cleans_up_the_old_module_first() {
        let (host, a, b, _) = counting_host();
        host.handle(&load("counter_a"));
        let response = host.handle(&load("counter_b"));
        assert!(response.success);
        assert!(response.message.contains("counter_b"));

        assert_eq!(Counters::get(&a.setups), 1);
        assert_eq!(Counters::get(&a.cleanups), 1);
        assert_eq!(Counters::get(&b.setups), 1);
        tick(&host);
        assert_eq!(Counters::get(&a.updates), 0);
        assert_eq!(Counters::get(&b.updates), 1);
    }

    #[test]
    fn load_into_idle_slot() {
        let (host, a, _, _) = counting_host();
        assert_eq!(tick(&host), 0);
        assert!(host.handle(&load("counter_a")).success);
        assert_eq!(Counters::get(&a.setups), 1);
        assert_eq!(Counters::get(&a.cleanups), 0);
    }

    #[test]
    fn unload_runs_cleanup_and_fails_when_idle() {
        let (host, a, _, _) = counting_host();
        host.handle(&load("counter_a"));
        assert!(host.handle(&Command::UnloadModule).success);
        assert_eq!(Counters::get(&a.cleanups), 1);
        assert_eq!(host.active_name(), None);

        let response = host.handle(&Command::UnloadModule);
        assert!(!response.success);
        assert_eq!(response.message, "no active module");
    }

    #[test]
    fn configure_requires_matching_active_module() {
        let (host, a, _, _) = counting_host();
        let configure = |name: &str, key: &str| Command::ConfigureModule {
            name: name.into(),
            args: [(key.to_string(), "1".to_string())].into(),
        };

        assert!(!host.handle(&configure("counter_a", "k")).success);
        host.handle(&load("counter_a"));
        assert!(!host.handle(&configure("counter_b", "k")).success);
        assert!(!host.handle(&configure("counter_a", "bad")).success);
        assert!(host.handle(&configure("counter_a", "k")).success);
        assert_eq!(Counters::get(&a.configures), 1);
        assert_eq!(Counters::get(&a.builds), 1);
    }

    #[test]
    fn built_in_modules_configure_through_aliases() {
        let sink = RecordingSink::default();
        let host = ModuleHost::new(ActuatorModule::new(ActuatorConfig::default(), Box::new(sink)));
        assert!(host.handle(&load("PositionToRgbModule")).success);
        assert_eq!(host.active_name(), Some("position_to_rgb"));
        let response = host.handle(&Command::ConfigureModule {
            name: "PositionToRgbModule".into(),
            args: [("target_ball_id".to_string(), "202".to_string())].into(),
        });
        assert!(response.success, "{response:?}");

        let response = host.handle(&Command::ConfigureModule {
            name: "HeightToBrightnessModule".into(),
            args: ModuleArgs::new(),
        });
        assert!(!response.success);
        assert!(response.message.contains("not active"), "{response:?}");
    }

    #[test]
    fn actuator_commands_bypass_the_slot() {
        let (host, _, _, sink) = counting_host();
        let response = host.handle(&Command::SendColor {
            target: Target::Object(205),
            color: Rgb::new(0, 0, 255),
        });
        assert!(response.success);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }
}
