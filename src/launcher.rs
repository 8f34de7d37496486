//! The launcher scheduler: owns the set of components, runs the monitor
//! loop, enforces the relaunch cool-down, resolves class names, and
//! dispatches queue-driven launches.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::component::Component;
use crate::logging::EventLog;
use crate::task_poller::PollHandle;

/// `{ping, quit, terminate, kill}`, all positive, `ping < quit < terminate
/// < kill`.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub ping: Duration,
    pub quit: Duration,
    pub terminate: Duration,
    pub kill: Duration,
}

/// The interval between monitor loop ticks.
const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// The delay between successive launches within a single `launch()` call,
/// to stagger JVM startup pressure.
const LAUNCH_STAGGER: Duration = Duration::from_secs(5);

/// Owns one child process per catalog entry (or ad hoc name) and the
/// monitor loop that supervises them.
pub struct Launcher {
    jar: PathBuf,
    agent: Option<PathBuf>,
    catalog: Catalog,
    components: HashMap<String, Component>,
    log: Arc<dyn EventLog>,
    task_poller: Option<PollHandle>,
}

impl Launcher {
    /// `task_poller` is optional; without it `handle_tasks()` is a no-op.
    pub fn new(
        jar: impl Into<PathBuf>,
        catalog: Catalog,
        log: Arc<dyn EventLog>,
        task_poller: Option<PollHandle>,
        agent: Option<PathBuf>,
    ) -> Self {
        Launcher {
            jar: jar.into(),
            agent,
            catalog,
            components: HashMap::new(),
            log,
            task_poller,
        }
    }

    /// Number of components currently tracked (alive or awaiting relaunch).
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Resolve `class_name` (falling back to the catalog's substring
    /// resolver), construct and launch a `Component`, and insert it into
    /// the component set keyed by name — overwriting any prior entry with
    /// the same name.
    pub fn launch_new_component(&mut self, class_name: &str) -> Option<&Component> {
        let resolved = self.catalog.resolve(class_name);

        let mut component = Component::new(&self.jar, &resolved, self.agent.as_deref());
        let name = component.name().to_string();

        match component.launch() {
            Ok(pid) => {
                self.log.info(
                    "Launched",
                    &[("pid", &pid.to_string()), ("procname", &name)],
                );
                self.components.insert(name.clone(), component);
                self.log.info(
                    "Managing processes",
                    &[("count", &self.components.len().to_string())],
                );
                self.components.get(&name)
            }
            Err(e) => {
                self.log.error(
                    "Unable to launch",
                    &[
                        ("error", &e.to_string()),
                        ("jar", &self.jar.display().to_string()),
                        ("procname", &name),
                    ],
                );
                None
            }
        }
    }

    /// Launch each name provided, or the catalog's default enabled subset
    /// if none are given. Sleeps `LAUNCH_STAGGER` between launches.
    pub fn launch(&mut self, names: &[String]) {
        let targets: Vec<String> = if names.is_empty() {
            self.catalog.enabled_subset()
        } else {
            names.to_vec()
        };

        let mut first = true;
        for class_name in targets {
            if !first {
                std::thread::sleep(LAUNCH_STAGGER);
            }
            first = false;
            self.launch_new_component(&class_name);
        }
    }

    /// Drain at most one task from the poller and dispatch it. A no-op if
    /// no poller was configured.
    pub fn handle_tasks(&mut self) {
        let Some(poller) = self.task_poller.as_ref() else {
            return;
        };
        let Some(task) = poller.get() else {
            return;
        };

        let class_name = task.params.get("classname").and_then(|v| v.as_str());
        let Some(class_name) = class_name else {
            self.log.error(
                "failed to launch component from task: missing classname",
                &[("error", "missing classname")],
            );
            let _ = task.fail(Some("missing classname"));
            return;
        };

        match self.launch_new_component(class_name) {
            Some(component) => {
                let pid = component.pid().unwrap_or(0).to_string();
                if let Err(e) = task.complete(Some(&pid)) {
                    self.log.error("failed to complete task", &[("error", &e.to_string())]);
                }
            }
            None => {
                let message = format!("unable to launch {class_name}");
                self.log.error("failed to launch component from task", &[("error", &message)]);
                if let Err(e) = task.fail(Some(&message)) {
                    self.log.error("failed to fail task", &[("error", &e.to_string())]);
                }
            }
        }
    }

    /// Drain and forward a component's stdout/stderr to the logger, tagged
    /// with `pid` and `procname`.
    fn log_component(&mut self, name: &str) {
        let Some(component) = self.components.get_mut(name) else {
            return;
        };
        let pid = component.pid().unwrap_or(0).to_string();
        let procname = component.name().to_string();
        for line in component.stdout() {
            self.log.info(
                &format!("stdout: {line}"),
                &[("pid", &pid), ("procname", &procname)],
            );
        }
        for line in component.stderr() {
            self.log.error(
                &format!("stderr: {line}"),
                &[("pid", &pid), ("procname", &procname)],
            );
        }
    }

    /// Check a single component's responsiveness against `timeouts` and
    /// escalate as needed.
    fn check_responsiveness(&mut self, name: &str, timeouts: &Timeouts) {
        let Some(component) = self.components.get_mut(name) else {
            return;
        };
        let tlhf = component.last_heard_from().elapsed();
        let pid = component.pid().unwrap_or(0).to_string();
        let procname = component.name().to_string();
        let fields = [("pid", pid.as_str()), ("procname", procname.as_str())];

        if tlhf > timeouts.kill {
            if component.kill() {
                self.log.error(&format!("no response for {:?}: kill", tlhf), &fields);
            }
        } else if tlhf > timeouts.terminate {
            if component.terminate() {
                self.log.error(&format!("no response for {:?}: terminate", tlhf), &fields);
            }
        } else if tlhf > timeouts.quit {
            if component.quit() {
                self.log.warn(&format!("no response for {:?}: quit", tlhf), &fields);
            }
        } else if tlhf > timeouts.ping {
            if component.ping() {
                self.log.info(&format!("no response for {:?}: ping", tlhf), &fields);
            }
        } else {
            component.responsive();
        }
    }

    /// One iteration of the monitor loop (exposed for tests; `monitor`
    /// just calls this in a sleep loop forever).
    pub fn tick(&mut self, cool_down: Duration, timeouts: &Timeouts) {
        self.handle_tasks();

        let names: Vec<String> = self.components.keys().cloned().collect();
        for name in names {
            self.log_component(&name);

            let is_alive = self
                .components
                .get_mut(&name)
                .map(Component::is_alive)
                .unwrap_or(false);

            if is_alive {
                self.check_responsiveness(&name, timeouts);
                continue;
            }

            let Some(component) = self.components.get_mut(&name) else {
                continue;
            };
            let launch_time = component.launch_time().unwrap_or_else(Instant::now);
            let tslt = launch_time.elapsed();

            if !component.waiting() {
                let pid = component.pid().unwrap_or(0).to_string();
                self.log.error(
                    &format!("died after {:?}", tslt),
                    &[("pid", pid.as_str()), ("procname", name.as_str())],
                );
                component.set_waiting(true);
            }

            if tslt > cool_down {
                match component.launch() {
                    Ok(pid) => {
                        self.log.warn(
                            "relaunched",
                            &[("pid", &pid.to_string()), ("procname", name.as_str())],
                        );
                    }
                    Err(e) => {
                        self.log.error(
                            "Unable to relaunch",
                            &[("error", &e.to_string()), ("procname", name.as_str())],
                        );
                    }
                }
            }
        }
    }

    /// The steady-state monitor loop: runs forever, ticking every 200 ms.
    pub fn monitor(&mut self, cool_down: Duration, timeouts: &Timeouts) -> ! {
        loop {
            self.tick(cool_down, timeouts);
            std::thread::sleep(TICK_INTERVAL);
        }
    }
}
