//! Orchestration: authenticate, resolve the gym, then poll its attendance.
//!
//! A [`Monitor`] moves through `Uninitialized → Initializing → Ready` and then
//! either `Polling` (a background poller is running) or `Idle`. Every check,
//! scheduled or manual, runs the same `check_and_report` logic and may overlap
//! with others; the latest successful report simply replaces the previous one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::attendance::{AttendanceClient, AttendanceLevel};
use crate::config::AppConfig;
use crate::directory::{GymDirectory, GymRecord};
use crate::error::{MonitorError, Result};
use crate::session::{Credentials, TokenSession};
use crate::traits::{Clock, Reporter, SystemClock};

/// Gym spec that selects the member's home gym instead of a name search.
pub const HOME_GYM: &str = "home";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Uninitialized,
    Initializing,
    Ready,
    Polling,
    Idle,
}

/// What the presentation layer receives after a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceReport {
    pub gym_name: String,
    pub people: u32,
    pub level: AttendanceLevel,
    pub refreshed_at: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
}

/// Convert a poll interval in minutes; zero or negative means single-shot.
pub fn poll_interval(minutes: i64) -> Duration {
    if minutes <= 0 {
        Duration::ZERO
    } else {
        Duration::from_secs(minutes.unsigned_abs() * 60)
    }
}

#[derive(Debug, Clone, Copy)]
enum Command {
    CheckNow,
}

/// Handle for requesting an immediate check from another context (an input
/// listener, a tray menu). Cheap to clone.
#[derive(Debug, Clone)]
pub struct CheckTrigger {
    commands: mpsc::Sender<Command>,
}

impl CheckTrigger {
    /// Queue a manual check without blocking. Returns `false` if the poller
    /// has stopped or already has a backlog of requests.
    pub fn check_now(&self) -> bool {
        self.commands.try_send(Command::CheckNow).is_ok()
    }
}

/// Everything a single check needs, shared by the poller and manual checks.
#[derive(Clone)]
struct Checker {
    attendance: AttendanceClient,
    gym: GymRecord,
    reporter: Arc<dyn Reporter>,
    clock: Arc<dyn Clock>,
    latest: Arc<Mutex<Option<AttendanceReport>>>,
}

impl Checker {
    async fn check_and_report(&self) -> Result<AttendanceReport> {
        match self.attendance.get_attendance(self.gym.id).await {
            Ok(snapshot) => {
                let report = AttendanceReport {
                    gym_name: self.gym.name.clone(),
                    people: snapshot.people,
                    level: snapshot.level(),
                    refreshed_at: snapshot.refreshed_at,
                    checked_at: self.clock.now_utc(),
                };
                tracing::debug!(
                    gym_id = self.gym.id,
                    people = report.people,
                    level = %report.level,
                    "Attendance check succeeded"
                );
                // Publish under the lock so the reporter sees writes in the
                // same order as `latest`.
                let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
                *latest = Some(report.clone());
                self.reporter.report(&report);
                drop(latest);
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(gym_id = self.gym.id, reason = e.reason(), "Attendance check failed: {}", e);
                self.reporter.report_error(&e);
                Err(e)
            }
        }
    }
}

struct Poller {
    cancel: CancellationToken,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

pub struct Monitor {
    session: TokenSession,
    directory: GymDirectory,
    attendance: AttendanceClient,
    credentials: Credentials,
    gym_spec: String,
    state: MonitorState,
    checker: Option<Checker>,
    poller: Option<Poller>,
    reporter: Arc<dyn Reporter>,
    clock: Arc<dyn Clock>,
    latest: Arc<Mutex<Option<AttendanceReport>>>,
}

impl Monitor {
    pub fn new(
        session: TokenSession,
        credentials: Credentials,
        gym_spec: impl Into<String>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            directory: GymDirectory::new(session.clone()),
            attendance: AttendanceClient::new(session.clone()),
            session,
            credentials,
            gym_spec: gym_spec.into(),
            state: MonitorState::Uninitialized,
            checker: None,
            poller: None,
            reporter,
            clock: Arc::new(SystemClock),
            latest: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a monitor with its own session from application configuration.
    pub fn from_config(
        config: &AppConfig,
        credentials: Credentials,
        reporter: Arc<dyn Reporter>,
    ) -> anyhow::Result<Self> {
        let session = TokenSession::new(&config.api, &config.network)?;
        Ok(Self::new(session, credentials, config.monitor.gym.clone(), reporter))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// The resolved gym, once initialized.
    pub fn gym(&self) -> Option<&GymRecord> {
        self.checker.as_ref().map(|c| &c.gym)
    }

    /// The most recent successful report, if any.
    pub fn latest_report(&self) -> Option<AttendanceReport> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Authenticate and resolve the configured gym.
    ///
    /// Any earlier resolution is discarded first and a running poller is
    /// stopped. On failure the monitor stays `Uninitialized`; nothing is
    /// retried.
    pub async fn initialize(&mut self) -> Result<GymRecord> {
        self.stop_polling().await;
        self.checker = None;
        self.state = MonitorState::Initializing;
        tracing::info!(identity = self.credentials.identity(), gym = %self.gym_spec, "Initializing monitor");

        match self.resolve().await {
            Ok(gym) => {
                tracing::info!(id = gym.id, name = %gym.name, "Monitoring gym");
                self.checker = Some(Checker {
                    attendance: self.attendance.clone(),
                    gym: gym.clone(),
                    reporter: Arc::clone(&self.reporter),
                    clock: Arc::clone(&self.clock),
                    latest: Arc::clone(&self.latest),
                });
                self.state = MonitorState::Ready;
                Ok(gym)
            }
            Err(e) => {
                tracing::error!(reason = e.reason(), "Initialization failed: {}", e);
                self.state = MonitorState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn resolve(&self) -> Result<GymRecord> {
        if !self.session.authenticate(&self.credentials).await? {
            return Err(MonitorError::BadCredentials);
        }
        tracing::info!("Authenticated");

        if self.gym_spec.eq_ignore_ascii_case(HOME_GYM) {
            return self.attendance.get_home_gym().await.map_err(|e| {
                tracing::debug!("Home gym lookup failed: {}", e);
                MonitorError::HomeGymUnavailable
            });
        }

        match self.directory.find_by_name(&self.gym_spec).await {
            Ok(Some(gym)) => Ok(gym),
            Ok(None) => Err(MonitorError::GymNotFound(self.gym_spec.clone())),
            Err(e) => {
                tracing::warn!("Gym directory fetch failed: {}", e);
                Err(MonitorError::GymNotFound(self.gym_spec.clone()))
            }
        }
    }

    fn checker(&self) -> Result<&Checker> {
        match self.state {
            MonitorState::Ready | MonitorState::Polling | MonitorState::Idle => {
                self.checker.as_ref().ok_or(MonitorError::NotReady)
            }
            MonitorState::Uninitialized | MonitorState::Initializing => Err(MonitorError::NotReady),
        }
    }

    /// Run one check right now, independent of any schedule.
    ///
    /// Failures are handed to the reporter and returned; they never affect
    /// the poller.
    pub async fn check_now(&self) -> Result<AttendanceReport> {
        self.checker()?.check_and_report().await
    }

    /// Start checking attendance: immediately, then every `interval`.
    ///
    /// A zero interval performs exactly one check and starts no background
    /// task. Calling this again replaces a running poller.
    pub async fn start_polling(&mut self, interval: Duration) -> Result<()> {
        let checker = self.checker()?.clone();
        self.stop_polling().await;

        if interval.is_zero() {
            tracing::info!("Single check, no schedule");
            // Failures were already reported.
            let _ = checker.check_and_report().await;
            self.state = MonitorState::Idle;
            return Ok(());
        }

        tracing::info!(interval_secs = interval.as_secs(), "Starting poller");
        let cancel = CancellationToken::new();
        let (commands, receiver) = mpsc::channel(8);
        let task = tokio::spawn(run_poller(checker, interval, cancel.clone(), receiver));

        self.poller = Some(Poller {
            cancel,
            commands,
            task,
        });
        self.state = MonitorState::Polling;
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// A trigger for manual checks, while a poller is running.
    pub fn trigger(&self) -> Option<CheckTrigger> {
        self.poller.as_ref().map(|p| CheckTrigger {
            commands: p.commands.clone(),
        })
    }

    /// Cancel future ticks and abandon in-flight checks.
    pub async fn stop_polling(&mut self) {
        let Some(poller) = self.poller.take() else {
            return;
        };
        poller.cancel.cancel();
        if let Err(e) = poller.task.await {
            tracing::warn!("Poller task ended abnormally: {}", e);
        }
        self.state = MonitorState::Idle;
        tracing::info!("Poller stopped");
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(poller) = &self.poller {
            poller.cancel.cancel();
        }
    }
}

async fn run_poller(
    checker: Checker,
    every: Duration,
    cancel: CancellationToken,
    mut commands: mpsc::Receiver<Command>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();
    let mut commands_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let checker = checker.clone();
                in_flight.spawn(async move {
                    let _ = checker.check_and_report().await;
                });
            }
            command = commands.recv(), if commands_open => match command {
                Some(Command::CheckNow) => {
                    tracing::debug!("Manual check requested");
                    let checker = checker.clone();
                    in_flight.spawn(async move {
                        let _ = checker.check_and_report().await;
                    });
                }
                None => commands_open = false,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!("Attendance check panicked: {}", e);
                    }
                }
            }
        }
    }

    in_flight.shutdown().await;
}
