//! Scenario simulator
//!
//! Loads a YAML scenario (subscribers with scripted behaviour, interfaces
//! and a list of steps), runs it through a real dispatcher and reports the
//! verdict of every step plus the final interface table.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use eyre::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::coordinator::CoordinatorConfig;
use crate::dispatch::{DispatchMetrics, EventCompletion, IntfManager, IntfManagerHandle, Registration};
use crate::domain::{
    CreateRequest, EventData, EventMask, EventNotice, InterfaceRecord, IntfId, Outcome, PortEvent, Priority,
    StartupDone, StartupPhase, SubscriberId,
};
use crate::error::{IntfError, IntfResult};

/// How a scripted subscriber answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Behaviour {
    #[default]
    Succeed,
    Fail,
    /// Accept the event and never report
    Silent,
    /// Refuse the event in the callback
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScriptedSubscriber {
    pub id: String,
    /// Events of interest; empty means every event
    #[serde(default)]
    pub events: Vec<PortEvent>,
    #[serde(default)]
    pub behaviour: Behaviour,
    /// Report after this delay instead of inline
    #[serde(default)]
    pub delay_ms: u64,
    /// Register a startup hook with this priority
    #[serde(default)]
    pub startup: Option<Priority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotifyStep {
    pub intf: IntfId,
    pub event: PortEvent,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdminStep {
    pub intf: IntfId,
    pub enabled: bool,
}

/// One scenario step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioStep {
    Notify(NotifyStep),
    Create(CreateRequest),
    AdminState(AdminStep),
    DiagDisable(IntfId),
    StartPorts,
    /// Pause for this many milliseconds
    Settle(u64),
}

impl std::fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notify(step) => write!(f, "notify {} on {}", step.event, step.intf),
            Self::Create(request) => write!(f, "create {} ({})", request.id, request.name),
            Self::AdminState(step) => {
                let state = if step.enabled { "enable" } else { "disable" };
                write!(f, "admin {} {}", state, step.intf)
            }
            Self::DiagDisable(intf) => write!(f, "diag-disable {}", intf),
            Self::StartPorts => write!(f, "start-ports"),
            Self::Settle(ms) => write!(f, "settle {}ms", ms),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Scenario {
    /// Overrides the loaded coordinator settings
    pub coordinator: Option<CoordinatorConfig>,
    pub subscribers: Vec<ScriptedSubscriber>,
    /// Created, in order, before the steps run
    pub interfaces: Vec<CreateRequest>,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Scenario::load: called");
        let content = std::fs::read_to_string(path).context(format!("Failed to read scenario {}", path.display()))?;
        serde_yaml::from_str(&content).context(format!("Failed to parse scenario {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepReport {
    pub step: String,
    pub ok: bool,
    pub verdict: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimulationReport {
    pub steps: Vec<StepReport>,
    pub interfaces: Vec<InterfaceRecord>,
    /// Notices received per subscriber
    pub notices: BTreeMap<String, usize>,
    pub startup: Vec<String>,
    pub metrics: DispatchMetrics,
}

type Tally = Arc<Mutex<BTreeMap<String, usize>>>;

fn register_scripted(
    handle: &IntfManagerHandle,
    script: &ScriptedSubscriber,
    notices: &Tally,
    startup_log: &Arc<Mutex<Vec<String>>>,
) -> IntfResult<()> {
    let interest = if script.events.is_empty() {
        EventMask::all()
    } else {
        script.events.iter().copied().collect()
    };
    let id = SubscriberId::new(script.id.clone());
    let behaviour = script.behaviour;
    let delay = Duration::from_millis(script.delay_ms);
    let reporter = handle.clone();
    let seen = Arc::clone(notices);

    let callback = move |notice: &EventNotice| {
        *seen.lock().entry(id.to_string()).or_default() += 1;
        let outcome = match behaviour {
            Behaviour::Succeed => Outcome::Success,
            Behaviour::Fail => Outcome::Failure,
            Behaviour::Silent => return true,
            Behaviour::Reject => return false,
        };
        if delay.is_zero() {
            let _ = reporter.report(notice.correlator, &id, outcome);
        } else {
            let reporter = reporter.clone();
            let id = id.clone();
            let correlator = notice.correlator;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = reporter.report(correlator, &id, outcome);
            });
        }
        true
    };

    let mut registration = Registration::new(script.id.clone(), callback, interest);
    if let Some(priority) = script.startup {
        let log = Arc::clone(startup_log);
        let name = script.id.clone();
        registration = registration.with_startup(
            move |phase: StartupPhase, done: StartupDone| {
                log.lock().push(format!("{}:{}", name, phase));
                done.complete();
            },
            priority,
        );
    }
    handle.register(registration)
}

async fn run_step(handle: &IntfManagerHandle, step: &ScenarioStep) -> IntfResult<()> {
    match step {
        ScenarioStep::Notify(n) => handle.notify_event_wait(n.intf, n.event, n.data.clone()).await,
        ScenarioStep::Create(request) => handle.create_interface_wait(request.clone()).await,
        ScenarioStep::AdminState(a) => {
            let event = if a.enabled {
                PortEvent::AdminEnable
            } else {
                PortEvent::AdminDisable
            };
            handle.notify_event_wait(a.intf, event, EventData::None).await
        }
        ScenarioStep::DiagDisable(intf) => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle
                .diag_disable(
                    *intf,
                    Some(Box::new(move |c: EventCompletion| {
                        let _ = tx.send(c);
                    })),
                )
                .await?;
            rx.await.map_err(|_| IntfError::ChannelClosed)?.result
        }
        ScenarioStep::StartPorts => handle.start_ports(),
        ScenarioStep::Settle(ms) => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(())
        }
    }
}

/// Wait until no correlator is outstanding, so queued follow-ons have run
async fn quiesce(handle: &IntfManagerHandle, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if handle.correlators_in_use() == 0 && handle.open_transaction().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `scenario` against a fresh dispatcher
pub async fn run(mut config: Config, scenario: Scenario) -> Result<SimulationReport> {
    if let Some(coordinator) = scenario.coordinator.clone() {
        config.coordinator = coordinator;
    }
    let limit = config.coordinator.event_timeout() * 4 + Duration::from_millis(100);
    let (handle, task) = IntfManager::spawn(config);

    let notices: Tally = Arc::default();
    let startup_log: Arc<Mutex<Vec<String>>> = Arc::default();
    for script in &scenario.subscribers {
        register_scripted(&handle, script, &notices, &startup_log)
            .context(format!("Failed to register subscriber {}", script.id))?;
    }

    let creates = scenario.interfaces.iter().cloned().map(ScenarioStep::Create);
    let mut steps = Vec::new();
    for step in creates.chain(scenario.steps.iter().cloned()) {
        let result = run_step(&handle, &step).await;
        quiesce(&handle, limit).await;
        info!(step = %step, ok = result.is_ok(), "Scenario step finished");
        steps.push(StepReport {
            step: step.to_string(),
            ok: result.is_ok(),
            verdict: match result {
                Ok(()) => "ok".to_string(),
                Err(e) => e.to_string(),
            },
        });
    }

    let report = SimulationReport {
        steps,
        interfaces: handle.list_interfaces(),
        notices: notices.lock().clone(),
        startup: startup_log.lock().clone(),
        metrics: handle.metrics(),
    };

    handle.shutdown().await.context("Dispatcher already stopped")?;
    task.await.context("Dispatcher task failed")?;
    Ok(report)
}

/// Human-readable report
pub fn render_text(report: &SimulationReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("{}\n", "Steps".bold()));
    for (i, step) in report.steps.iter().enumerate() {
        let icon = if step.ok { "✓".green() } else { "✗".red() };
        out.push_str(&format!("  {} {:>2}. {:<32} {}\n", icon, i + 1, step.step, step.verdict));
    }

    out.push_str(&format!("\n{}\n", "Interfaces".bold()));
    for r in &report.interfaces {
        let f = &r.flags;
        out.push_str(&format!(
            "  {:>4} {:<16} {:<12} {:<10} link={} fwd={} auth={} admin={}\n",
            r.id,
            r.name,
            r.intf_type.to_string(),
            r.state.to_string(),
            up_down(f.link_up),
            up_down(f.forwarding),
            up_down(f.authorized),
            up_down(f.admin_enabled),
        ));
    }

    if !report.startup.is_empty() {
        out.push_str(&format!("\n{}\n  {}\n", "Startup".bold(), report.startup.join(", ")));
    }

    out.push_str(&format!("\n{}\n", "Notices".bold()));
    for (id, count) in &report.notices {
        out.push_str(&format!("  {:<16} {}\n", id, count));
    }

    let m = &report.metrics;
    out.push_str(&format!(
        "\nevents={} broadcasts={} short-circuited={} failures={} timeouts={} follow-ons={}\n",
        m.events_received, m.broadcasts, m.short_circuited, m.failures, m.timeouts, m.follow_ons
    ));
    out
}

fn up_down(flag: bool) -> &'static str {
    if flag { "up" } else { "down" }
}
