//! The coordinating session task
//!
//! One [`SessionMachine`] owns the device link, the navigator and the session
//! state for the lifetime of a session. Everything it does is sequential; the
//! audible deck keeps playing on the device while the machine is suspended in
//! settle delays, crossfade steps or the decision call.
//!
//! ```text
//!   Idle → Initializing → Playing ⇄ LoadingNext → Mixing → Playing … → Ending → Ended
//!                 └──────────────────→ Aborted
//! ```

use super::events::{DecisionSource, EventKind, EventLog};
use super::report::SessionReport;
use super::state::{SessionPhase, SessionState, SessionStatus};
use crate::catalog::{Catalog, CatalogScope};
use crate::config::{AutoDeckConfig, GenreProfile};
use crate::decision::{propose_within, DecisionRequest, DecisionService, ShortlistEntry};
use crate::device::{CommandChannel, CommandClass, DeviceCommand, DeviceError};
use crate::error::{CycleError, LoadError, SessionError};
use crate::matcher::{find_compatible, Candidate, MatchMode, MatchOptions};
use crate::music::HarmonicKey;
use crate::navigation::{BrowsePosition, DeviceLink, NavigationController, NavigationError};
use crate::types::{DeckId, EqBand, Track, TrackId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Externally observed state handed in by a perception collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// Where the browse cursor actually is
    Position(BrowsePosition),
    /// Actual playback position of a deck
    Deck {
        deck: DeckId,
        elapsed: Duration,
        playing: bool,
    },
}

/// Control inputs drained at checkpoints
pub(crate) struct ControlInbox {
    pub stop: Arc<AtomicBool>,
    pub corrections: mpsc::UnboundedReceiver<Correction>,
}

/// Shared collaborators of a session
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<AutoDeckConfig>,
    pub catalog: Arc<dyn Catalog>,
    pub channel: Arc<dyn CommandChannel>,
    pub decision: Option<Arc<dyn DecisionService>>,
}

/// A track picked for loading and why
#[derive(Debug, Clone)]
struct Choice {
    track: Track,
    source: DecisionSource,
    score: Option<u8>,
    rationale: Option<String>,
}

pub(crate) struct SessionMachine {
    config: Arc<AutoDeckConfig>,
    catalog: Arc<dyn Catalog>,
    decision: Option<Arc<dyn DecisionService>>,
    profile: GenreProfile,
    link: DeviceLink,
    nav: NavigationController,
    state: SessionState,
    inbox: ControlInbox,
    status: watch::Sender<SessionStatus>,
    /// Earliest time the next load cycle may start after a failure
    retry_at: Option<Instant>,
}

impl SessionMachine {
    pub fn new(
        ctx: SessionContext,
        profile: GenreProfile,
        genre: &str,
        target: Duration,
        events: EventLog,
        inbox: ControlInbox,
        status: watch::Sender<SessionStatus>,
    ) -> Self {
        let scope = CatalogScope::under(profile.root.iter().cloned());
        let state = SessionState::new(genre, scope, target, profile.energy, events);
        Self {
            link: DeviceLink::new(ctx.channel, ctx.config.timing.settle),
            nav: NavigationController::new(ctx.config.navigation),
            config: ctx.config,
            catalog: ctx.catalog,
            decision: ctx.decision,
            profile,
            state,
            inbox,
            status,
            retry_at: None,
        }
    }

    fn events(&self) -> &EventLog {
        &self.state.events
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.state.phase != phase {
            log::info!("Session: {} -> {}", self.state.phase, phase);
            self.state.phase = phase;
        }
        self.publish();
    }

    fn publish(&self) {
        let status = self.state.status(
            Instant::now(),
            self.config.timing.beats_per_bar,
            Some(self.nav.position().clone()),
        );
        self.status.send_replace(status);
    }

    /// Bring the first track up on deck A
    ///
    /// Any failure leaves the session `Aborted`; there is nothing to fall back
    /// to.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        self.state.started_at = Instant::now();
        self.events().record(EventKind::SessionStarted {
            genre: self.state.genre.clone(),
            target_minutes: self.state.target.as_secs_f64() / 60.0,
        });
        self.set_phase(SessionPhase::Initializing);

        match self.bring_up_first_track().await {
            Ok(()) => {
                self.set_phase(SessionPhase::Playing);
                Ok(())
            }
            Err(e) => {
                log::error!("Session: initialization failed: {}", e);
                self.events().record(EventKind::SessionAborted {
                    reason: e.to_string(),
                });
                self.set_phase(SessionPhase::Aborted);
                Err(SessionError::FatalInitialization(e.to_string()))
            }
        }
    }

    async fn bring_up_first_track(&mut self) -> Result<(), CycleError> {
        let root = self.catalog.resolve_folders(&self.profile.root).ok_or_else(|| {
            NavigationError::UnknownTarget(self.profile.root.join("/"))
        })?;
        self.nav.navigate_to_folder(&mut self.link, &root).await?;

        let choice = self
            .genre_default_choice()
            .or_else(|| self.first_in_scope())
            .ok_or_else(|| CycleError::NoCompatibleTrack {
                genre: self.state.genre.clone(),
            })?;
        self.record_choice(&choice);

        self.load_onto(DeckId::A, &choice.track).await?;
        self.play(DeckId::A).await?;
        Ok(())
    }

    /// Run until the session ends; returns the final report
    pub async fn run(mut self) -> SessionReport {
        loop {
            self.checkpoint().await;

            let now = Instant::now();
            if self.inbox.stop.load(Ordering::SeqCst) {
                break;
            }
            if self.state.elapsed(now) >= self.state.target {
                log::info!("Session: target duration reached");
                break;
            }

            self.detect_dead_air(now);

            if self.should_load(now) {
                self.load_cycle().await;
            } else {
                self.publish();
                tokio::time::sleep(self.config.timing.poll_interval()).await;
            }
        }

        self.end().await;
        self.report()
    }

    /// Final report for a session that never got past initialization
    pub fn into_report(self) -> SessionReport {
        self.report()
    }

    fn report(&self) -> SessionReport {
        SessionReport::from_state(&self.state)
    }

    /// Apply control inputs; only called between states
    async fn checkpoint(&mut self) {
        while let Ok(correction) = self.inbox.corrections.try_recv() {
            self.apply_correction(correction).await;
        }
    }

    async fn apply_correction(&mut self, correction: Correction) {
        match correction {
            Correction::Position(reported) => {
                self.events().record(EventKind::PositionCorrected {
                    reported: reported.clone(),
                });
                if reported.folder_path != self.nav.position().folder_path
                    || reported.index != self.nav.position().index
                {
                    log::warn!(
                        "Session: reported position {} differs from belief {}, re-homing",
                        reported,
                        self.nav.position()
                    );
                    self.nav.mark_suspect();
                    if let Err(e) = self.nav.rehome(&mut self.link).await {
                        log::warn!("Session: re-home failed: {}", e);
                    }
                }
            }
            Correction::Deck { deck, elapsed, playing } => {
                self.events().record(EventKind::DeckCorrected {
                    deck,
                    elapsed_secs: elapsed.as_secs_f64(),
                    playing,
                });
                self.state.deck_mut(deck).correct(elapsed, playing, Instant::now());
            }
        }
        self.publish();
    }

    /// Mark the audible deck stopped once its track must have run out
    fn detect_dead_air(&mut self, now: Instant) {
        let active = self.state.active;
        let deck = self.state.deck(active);
        if !deck.playing || deck.remaining(now) != Some(Duration::ZERO) {
            return;
        }
        let Some(track) = deck.track.as_ref().map(|t| t.id) else {
            return;
        };
        log::warn!("Session: deck {} ran out of track {}", active, track);
        self.state.deck_mut(active).stop(now);
        self.events().record(EventKind::TrackEnded { deck: active, track });
        self.publish();
    }

    fn should_load(&self, now: Instant) -> bool {
        if self.retry_at.is_some_and(|at| now < at) {
            return false;
        }
        let deck = self.state.active_deck();
        if !deck.playing {
            // Dead air: anything is better than silence
            return true;
        }
        deck.remaining_bars(now, self.config.timing.beats_per_bar)
            .is_some_and(|bars| bars < self.config.timing.trigger_bars)
    }

    async fn load_cycle(&mut self) {
        self.set_phase(SessionPhase::LoadingNext);
        let incoming = self.state.active.other();

        match self.load_next(incoming).await {
            Ok(()) => {
                self.retry_at = None;
                self.crossfade(incoming).await;
            }
            Err(e) => {
                log::warn!("Session: load cycle failed: {}", e);
                self.abandon_incoming(incoming).await;
                self.retry_at = Some(Instant::now() + self.config.timing.load_retry());
            }
        }
        self.set_phase(SessionPhase::Playing);
    }

    async fn load_next(&mut self, incoming: DeckId) -> Result<(), CycleError> {
        let choice = self.choose_next().await?;
        self.record_choice(&choice);
        self.load_onto(incoming, &choice.track).await?;
        self.play(incoming).await?;
        Ok(())
    }

    /// Pick the next track: service refinement, matcher top, genre defaults
    async fn choose_next(&mut self) -> Result<Choice, CycleError> {
        let reference = self.state.active_deck().track.clone();
        let candidates = match &reference {
            Some(track) => self.candidates(track.key, track.bpm, MatchMode::Harmonic),
            None => Vec::new(),
        };

        if candidates.is_empty() {
            self.events().record(EventKind::NoCompatibleTrack {
                reference: reference.as_ref().map(|t| t.id),
            });
            return self.genre_default_choice().ok_or_else(|| CycleError::NoCompatibleTrack {
                genre: self.state.genre.clone(),
            });
        }

        if let (Some(service), Some(track)) = (self.decision.clone(), reference.as_ref()) {
            let shortlist: Vec<&Candidate> = candidates
                .iter()
                .take(self.config.matching.shortlist_len)
                .collect();
            let request = DecisionRequest {
                active_key: track.key,
                active_bpm: track.bpm,
                energy: self.state.energy,
                tracks_played: self.state.tracks_played,
                shortlist: shortlist.iter().map(|c| ShortlistEntry::from(*c)).collect(),
            };

            match propose_within(service.as_ref(), &request, self.config.timing.decision_timeout()).await {
                Ok(response) => {
                    let picked = shortlist[response.index];
                    return Ok(Choice {
                        track: picked.track.clone(),
                        source: DecisionSource::Service,
                        score: Some(picked.score.total()),
                        rationale: Some(response.rationale),
                    });
                }
                Err(e) => {
                    log::warn!("Session: decision service unavailable: {}", e);
                    self.events().record(EventKind::DecisionFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }

        let top = &candidates[0];
        Ok(Choice {
            track: top.track.clone(),
            source: DecisionSource::MatcherTop,
            score: Some(top.score.total()),
            rationale: None,
        })
    }

    /// Ranked, not-yet-played candidates in the session scope
    fn candidates(&self, key: HarmonicKey, bpm: f64, mode: MatchMode) -> Vec<Candidate> {
        let excluded = self.state.excluded();
        let options = MatchOptions {
            tempo_tolerance_pct: self.config.matching.tempo_tolerance_pct,
            mode,
        };
        find_compatible(self.catalog.as_ref(), &key, bpm, &self.state.scope, &options)
            .into_iter()
            .filter(|c| !excluded.contains(&c.track.id))
            .collect()
    }

    /// Best match for the genre's default key and tempo, harmonic first
    fn genre_default_choice(&self) -> Option<Choice> {
        let key = self.profile.default_key;
        let bpm = self.profile.default_bpm;
        [MatchMode::Harmonic, MatchMode::TempoOnly]
            .into_iter()
            .find_map(|mode| self.candidates(key, bpm, mode).into_iter().next())
            .map(|c| Choice {
                score: Some(c.score.total()),
                track: c.track,
                source: DecisionSource::GenreDefault,
                rationale: None,
            })
    }

    fn first_in_scope(&self) -> Option<Choice> {
        let excluded = self.state.excluded();
        self.catalog
            .tracks_in_scope(&self.state.scope)
            .into_iter()
            .find(|t| !excluded.contains(&t.id))
            .map(|track| Choice {
                track,
                source: DecisionSource::ScopeFirst,
                score: None,
                rationale: None,
            })
    }

    fn record_choice(&self, choice: &Choice) {
        log::info!(
            "Session: next track {} via {:?}",
            choice.track.label(),
            choice.source
        );
        self.events().record(EventKind::DecisionMade {
            track: choice.track.id,
            source: choice.source,
            score: choice.score,
            rationale: choice.rationale.clone(),
        });
    }

    /// Navigate to a track, load it onto `deck` and arm the deck
    async fn load_onto(&mut self, deck: DeckId, track: &Track) -> Result<(), CycleError> {
        if self.state.deck(deck).playing {
            return Err(self.load_failed(deck, track.id, LoadError::DeckPlaying(deck)));
        }
        if self.state.phase != SessionPhase::Initializing && deck == self.state.active {
            return Err(self.load_failed(deck, track.id, LoadError::DeckActive(deck)));
        }

        let target = track.location.to_string();
        self.events().record(EventKind::NavigationAttempt {
            track: track.id,
            target: target.clone(),
        });
        if let Err(e) = self
            .nav
            .navigate_to_location(&mut self.link, self.catalog.as_ref(), &track.location)
            .await
        {
            self.events().record(EventKind::NavigationFailed {
                track: track.id,
                target,
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        self.events().record(EventKind::LoadAttempt { deck, track: track.id });
        if let Err(e) = self.link.send(DeviceCommand::LoadDeck { deck }).await {
            return Err(self.load_failed(deck, track.id, e.into()));
        }
        self.state.deck_mut(deck).load(track.clone());

        if let Err(e) = self.safety_setup(deck).await {
            return Err(self.load_failed(deck, track.id, e.into()));
        }
        self.publish();
        Ok(())
    }

    fn load_failed(&self, deck: DeckId, track: TrackId, error: LoadError) -> CycleError {
        self.events().record(EventKind::LoadFailed {
            deck,
            track,
            reason: error.to_string(),
        });
        error.into()
    }

    /// Silence a freshly loaded deck and keep it out of the mix
    async fn safety_setup(&mut self, deck: DeckId) -> Result<(), DeviceError> {
        self.set_volume(deck, 0.0).await?;
        let neutral = self.config.mixer.eq_neutral;
        for band in EqBand::ALL {
            self.link.send(DeviceCommand::SetEq { deck, band, level: neutral }).await?;
        }
        let side = self.state.active.crossfader_side();
        self.link.send(DeviceCommand::SetCrossfader { position: side }).await?;
        self.state.deck_mut(deck).armed = true;
        Ok(())
    }

    /// Start an armed deck and bring its channel up
    async fn play(&mut self, deck: DeckId) -> Result<(), CycleError> {
        let Some(track) = self.state.deck(deck).track.as_ref().map(|t| t.id) else {
            return Ok(());
        };
        if let Err(e) = self.start_deck(deck).await {
            return Err(self.load_failed(deck, track, e.into()));
        }

        self.state.history.push(track);
        self.state.tracks_played += 1;
        self.events().record(EventKind::PlaybackStarted { deck, track });
        self.publish();
        Ok(())
    }

    async fn start_deck(&mut self, deck: DeckId) -> Result<(), DeviceError> {
        self.link.send(DeviceCommand::PlayToggle { deck }).await?;
        self.state.deck_mut(deck).start(Instant::now());
        let level = self.config.mixer.play_volume;
        self.set_volume(deck, level).await
    }

    async fn set_volume(&mut self, deck: DeckId, level: f32) -> Result<(), DeviceError> {
        self.link.send(DeviceCommand::SetVolume { deck, level }).await?;
        self.state.deck_mut(deck).volume = level;
        Ok(())
    }

    async fn stop_deck(&mut self, deck: DeckId) -> Result<(), DeviceError> {
        if self.state.deck(deck).playing {
            self.link.send(DeviceCommand::PlayToggle { deck }).await?;
            self.state.deck_mut(deck).stop(Instant::now());
        }
        Ok(())
    }

    /// Best-effort stop of a deck left half-armed by a failed cycle
    async fn abandon_incoming(&mut self, deck: DeckId) {
        if let Err(e) = self.stop_deck(deck).await {
            log::warn!("Session: could not stop deck {}: {}", deck, e);
        }
    }

    /// Linear crossfader ramp to `incoming`; runs to completion once begun
    async fn crossfade(&mut self, incoming: DeckId) {
        let outgoing = self.state.active;
        self.set_phase(SessionPhase::Mixing);
        self.events().record(EventKind::MixStarted {
            from: outgoing,
            to: incoming,
        });

        let steps = self.config.timing.crossfade_steps();
        let gap = self
            .config
            .timing
            .crossfade_step()
            .saturating_sub(self.link.settle().for_class(CommandClass::Mixer));
        let start = outgoing.crossfader_side();
        let end = incoming.crossfader_side();
        let mut failed_steps = 0;

        // Step 0 pins the outgoing side at t=0; step `steps` lands on the
        // incoming side one full crossfade later
        for step in 0..=steps {
            let position = if step == steps {
                end
            } else {
                start + (end - start) * (step as f32 / steps as f32)
            };
            if let Err(e) = self.link.send(DeviceCommand::SetCrossfader { position }).await {
                log::warn!("Session: crossfade step {} failed: {}", step, e);
                failed_steps += 1;
            }
            if step < steps {
                tokio::time::sleep(gap).await;
            }
        }

        if let Err(e) = self.stop_deck(outgoing).await {
            log::warn!("Session: could not stop outgoing deck {}: {}", outgoing, e);
        }
        if let Err(e) = self.set_volume(outgoing, 0.0).await {
            log::warn!("Session: could not silence outgoing deck {}: {}", outgoing, e);
        }
        self.state.active = incoming;
        self.events().record(EventKind::MixCompleted {
            active: incoming,
            failed_steps,
        });
    }

    /// Fade the audible deck out, stop everything and close the log
    async fn end(&mut self) {
        if self.inbox.stop.load(Ordering::SeqCst) {
            self.events().record(EventKind::StopRequested);
        }
        self.set_phase(SessionPhase::Ending);

        let active = self.state.active;
        if self.state.deck(active).playing {
            self.fade_out(active).await;
        }
        for deck in DeckId::ALL {
            if let Err(e) = self.stop_deck(deck).await {
                log::warn!("Session: could not stop deck {}: {}", deck, e);
            }
        }

        self.events().record(EventKind::SessionEnded {
            tracks_played: self.state.tracks_played,
        });
        self.set_phase(SessionPhase::Ended);
    }

    async fn fade_out(&mut self, deck: DeckId) {
        let timing = &self.config.timing;
        let step = timing.crossfade_step();
        let steps = ((timing.fade_out().as_secs_f64() / step.as_secs_f64()).round() as u32).max(1);
        let gap = step.saturating_sub(self.link.settle().for_class(CommandClass::Mixer));
        let from = self.state.deck(deck).volume;

        for i in 0..=steps {
            let level = if i == steps {
                0.0
            } else {
                from * (1.0 - i as f32 / steps as f32)
            };
            if let Err(e) = self.set_volume(deck, level).await {
                log::warn!("Session: fade-out step {} failed: {}", i, e);
            }
            if i < steps {
                tokio::time::sleep(gap).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{track, tree};
    use crate::catalog::InMemoryCatalog;
    use crate::device::SimulatedDevice;

    fn machine(device: Arc<SimulatedDevice>) -> SessionMachine {
        let config = Arc::new(AutoDeckConfig::default());
        let profile = config.genre("house").cloned().unwrap();
        let catalog = InMemoryCatalog::new(
            tree(),
            vec![
                track(1, HarmonicKey::minor(8), 124.0, &["House", "Deep"], 0),
                track(2, HarmonicKey::major(8), 124.0, &["House", "Deep"], 1),
            ],
        )
        .unwrap();
        let (_corrections_tx, corrections) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SessionStatus::idle());
        SessionMachine::new(
            SessionContext {
                config,
                catalog: Arc::new(catalog),
                channel: device,
                decision: None,
            },
            profile,
            "house",
            Duration::from_secs(600),
            EventLog::new(),
            ControlInbox {
                stop: Arc::new(AtomicBool::new(false)),
                corrections,
            },
            status,
        )
    }

    fn load_failures(machine: &SessionMachine) -> Vec<(DeckId, String)> {
        machine
            .events()
            .snapshot()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::LoadFailed { deck, reason, .. } => Some((deck, reason)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_refused_onto_playing_or_audible_deck() {
        let device = Arc::new(SimulatedDevice::new(tree(), 4));
        let mut machine = machine(device.clone());
        machine.initialize().await.unwrap();
        let next = machine.catalog.track(TrackId(2)).unwrap();
        let sent = device.recorder().len();

        // Deck A carries the audible track
        assert_eq!(
            machine.load_onto(DeckId::A, &next).await,
            Err(CycleError::Load(LoadError::DeckPlaying(DeckId::A)))
        );

        // Even once stopped, the active deck is never reloaded mid-session
        machine.state.deck_mut(DeckId::A).correct(Duration::ZERO, false, Instant::now());
        assert_eq!(
            machine.load_onto(DeckId::A, &next).await,
            Err(CycleError::Load(LoadError::DeckActive(DeckId::A)))
        );

        assert_eq!(device.recorder().len(), sent);
        assert_eq!(
            load_failures(&machine),
            vec![
                (DeckId::A, "Deck A is still playing".to_string()),
                (DeckId::A, "Deck A is the audible deck".to_string()),
            ]
        );
        assert!(!machine
            .events()
            .snapshot()
            .iter()
            .any(|e| matches!(e.kind, EventKind::NavigationAttempt { track: TrackId(2), .. })));
    }
}
