//! Session control surface
//!
//! The request layer talks to a running session only through this handle:
//! start, stop, status and event log, plus corrections from a perception
//! collaborator. The session itself runs as a single spawned task; this
//! handle never touches the device.

use super::events::{EventLog, SessionEvent};
use super::machine::{ControlInbox, Correction, SessionContext, SessionMachine};
use super::report::SessionReport;
use super::state::SessionStatus;
use crate::error::SessionError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

struct RunningSession {
    stop: Arc<AtomicBool>,
    corrections: mpsc::UnboundedSender<Correction>,
    status: watch::Receiver<SessionStatus>,
    events: EventLog,
    task: JoinHandle<SessionReport>,
}

/// Starts and supervises one session at a time
pub struct SessionController {
    ctx: SessionContext,
    current: Option<RunningSession>,
}

impl SessionController {
    pub fn new(ctx: SessionContext) -> Self {
        Self { ctx, current: None }
    }

    /// Check if a session is past start and not yet ended
    pub fn is_running(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| !s.status.borrow().phase.is_terminal())
    }

    /// Start a session and wait until its first track is playing
    ///
    /// Only a failure to bring up the first track is reported here; every
    /// later failure is absorbed by the session and shows up in the event log.
    pub async fn start_session(&mut self, genre: &str, minutes: f64) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        let target = match Duration::try_from_secs_f64(minutes * 60.0) {
            Ok(target) if !target.is_zero() => target,
            _ => return Err(SessionError::InvalidDuration(minutes)),
        };
        self.ctx.config.validate()?;
        let profile = self
            .ctx
            .config
            .genre(genre)
            .cloned()
            .ok_or_else(|| SessionError::UnknownGenre(genre.to_string()))?;

        log::info!("SessionController: starting {} session for {} min", genre, minutes);

        let (status_tx, status_rx) = watch::channel(SessionStatus::idle());
        let (correction_tx, correction_rx) = mpsc::unbounded_channel();
        let (init_tx, init_rx) = oneshot::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let events = EventLog::new();

        let mut machine = SessionMachine::new(
            self.ctx.clone(),
            profile,
            genre,
            target,
            events.clone(),
            ControlInbox {
                stop: stop.clone(),
                corrections: correction_rx,
            },
            status_tx,
        );
        let log_dir = self.ctx.config.session_log_dir.clone();

        let task = tokio::spawn(async move {
            let init = machine.initialize().await;
            let started = init.is_ok();
            // Caller may have gone away; the session still runs to completion
            let _ = init_tx.send(init);

            let report = if started {
                machine.run().await
            } else {
                machine.into_report()
            };
            if let Some(dir) = log_dir {
                if let Err(e) = report.save(&dir) {
                    log::warn!("SessionController: failed to persist session report: {:#}", e);
                }
            }
            report
        });

        self.current = Some(RunningSession {
            stop,
            corrections: correction_tx,
            status: status_rx,
            events,
            task,
        });

        match init_rx.await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Task("session task ended during initialization".to_string())),
        }
    }

    /// Ask the running session to fade out and end
    ///
    /// Serviced at the next state boundary; an in-flight crossfade finishes
    /// first.
    pub fn stop_session(&self) -> Result<(), SessionError> {
        let session = self.current.as_ref().ok_or(SessionError::NotRunning)?;
        if session.status.borrow().phase.is_terminal() {
            return Err(SessionError::NotRunning);
        }
        log::info!("SessionController: stop requested");
        session.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Current phase, tracks played and deck states
    pub fn status(&self) -> SessionStatus {
        match &self.current {
            Some(session) => session.status.borrow().clone(),
            None => SessionStatus::idle(),
        }
    }

    /// Copy of the session's event log
    pub fn event_log(&self) -> Vec<SessionEvent> {
        self.current
            .as_ref()
            .map(|s| s.events.snapshot())
            .unwrap_or_default()
    }

    /// Hand in an externally observed position or deck state
    ///
    /// Applied at the session's next checkpoint. Position corrections are never
    /// trusted directly; they trigger a re-home.
    pub fn submit_correction(&self, correction: Correction) -> Result<(), SessionError> {
        let session = self.current.as_ref().ok_or(SessionError::NotRunning)?;
        session
            .corrections
            .send(correction)
            .map_err(|_| SessionError::NotRunning)
    }

    /// Wait for the current session to finish and take its report
    pub async fn wait(&mut self) -> Result<SessionReport, SessionError> {
        let session = self.current.take().ok_or(SessionError::NotRunning)?;
        session
            .task
            .await
            .map_err(|e| SessionError::Task(e.to_string()))
    }
}
