//! Scripted replays of a page session against the coordinator task.
//!
//! A scenario is a layout, the initial element geometry, and a list of timed
//! steps. Steps either send a message or change geometry, so a replay can
//! reproduce "the card grew while the scroll was pending" without a browser.
//! Timing runs on the tokio clock, which lets tests run replays with the
//! clock paused.

#[cfg(test)]
#[path = "scenario_test.rs"]
mod scenario_test;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use compass::config::{ConfigError, Layout, Settings};
use compass::coordinator::{Coordinator, Snapshot};
use compass::driver::{self, DriverError, ScrollSink};
use compass::geometry::{ElementGeometry, SharedLayout};
use compass::message::{Effect, Message};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub layout: Layout,
    /// Overrides the environment-derived settings when present.
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub geometry: Vec<ElementGeometry>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scripted action, applied `after_ms` after the previous step.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub after_ms: u64,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Send(Message),
    Measure(ElementGeometry),
    Unmount(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// A smooth scroll the coordinator asked for, relative to replay start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollRecord {
    pub at_ms: u64,
    pub offset: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub snapshot: Snapshot,
    pub scrolls: Vec<ScrollRecord>,
    pub effects: Vec<Effect>,
}

impl Scenario {
    /// # Errors
    ///
    /// Returns [`ScenarioError::Parse`] for malformed JSON and
    /// [`ScenarioError::Config`] for an invalid layout.
    pub fn from_json(raw: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(raw)?;
        scenario.layout.validate()?;
        Ok(scenario)
    }
}

#[derive(Debug, Default)]
struct Journal {
    scrolls: Vec<ScrollRecord>,
    effects: Vec<Effect>,
}

#[derive(Clone)]
struct JournalSink {
    started: Instant,
    journal: Arc<Mutex<Journal>>,
}

impl ScrollSink for JournalSink {
    fn smooth_scroll_to(&mut self, offset: f64) {
        let at_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(at_ms, offset, "scroll");
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scrolls
            .push(ScrollRecord { at_ms, offset });
    }

    fn observe(&mut self, effect: &Effect) {
        debug!(?effect, "effect");
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .effects
            .push(effect.clone());
    }
}

/// Run every step, wait `settle` for trailing timers, and report.
///
/// # Errors
///
/// Returns an error if the layout is invalid or the coordinator task stops
/// mid-replay.
pub async fn replay(scenario: Scenario, fallback: Settings, settle: Duration) -> Result<Report, ScenarioError> {
    let Scenario { layout, settings, geometry, steps } = scenario;
    let coordinator = Coordinator::new(layout, settings.unwrap_or(fallback))?;

    let probe = SharedLayout::new(geometry.into_iter().collect());
    let journal = Arc::new(Mutex::new(Journal::default()));
    let sink = JournalSink { started: Instant::now(), journal: Arc::clone(&journal) };
    let running = driver::spawn(coordinator, probe.clone(), sink);
    let handle = running.handle();

    for (index, step) in steps.into_iter().enumerate() {
        if step.after_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
        }
        debug!(index, action = ?step.action, "step");
        match step.action {
            Action::Send(message) => handle.send(message)?,
            Action::Measure(element) => probe.set(element),
            Action::Unmount(id) => {
                if probe.remove(&id).is_none() {
                    debug!(id = %id, "unmount of unknown element");
                }
            }
        }
        tokio::task::yield_now().await;
    }

    tokio::time::sleep(settle).await;
    let snapshot = handle.snapshot();
    running.shutdown().await;

    let journal = std::mem::take(&mut *journal.lock().unwrap_or_else(PoisonError::into_inner));
    Ok(Report { snapshot, scrolls: journal.scrolls, effects: journal.effects })
}
