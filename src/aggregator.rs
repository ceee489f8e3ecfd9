/// Stateful combat aggregation — the "brain" of the pipeline.
///
/// Applies typed `DomainEvent`s in delivery order, maintaining cumulative
/// session totals, per-ability/per-target breakdowns, combat segmentation,
/// and windowed DPS/HPS rates.
///
/// Per-event algorithm:
///   1. Replace the session if it is marked inactive.
///   2. Combat continuity: no active combat, or >= 10s since the last
///      activity, ends the current combat and opens a new one at `now`.
///   3. Dispatch by event kind into the counters.
///   4. Append to the recent-event window and recompute the affected rate.
///   5. Record `now` as the last activity.
///
/// All state lives in a single `CombatAggregator`. The tailer task mutates
/// it while snapshot readers query it concurrently, so the shared form wraps
/// it in a mutex (`SharedAggregator`); the raw maps are never exposed.
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::parser::DomainEvent;
use crate::session::{combat_gap, Combat, Session};
use crate::snapshot::{self, AbilityRow, SessionSnapshot, TargetRow};

pub struct CombatAggregator {
    session: Session,
}

impl Default for CombatAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatAggregator {
    pub fn new() -> Self {
        Self { session: Session::new(Utc::now()) }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Apply one event at the current wall-clock time.
    pub fn apply(&mut self, event: DomainEvent) {
        self.apply_at(event, Utc::now());
    }

    /// Apply one event at an explicit processing time. Exposed so callers
    /// (and tests) can drive a deterministic clock.
    pub fn apply_at(&mut self, event: DomainEvent, now: DateTime<Utc>) {
        if !self.session.is_active {
            // An event arriving against an inactive session silently
            // replaces it with a fresh one.
            self.session = Session::new(now);
        }

        self.check_combat(now);

        match &event {
            DomainEvent::Damage { amount, is_crit, target, ability, timestamp, .. } => {
                self.record_damage(*amount, *is_crit, target, ability, *timestamp);
            }
            DomainEvent::Heal { amount, is_crit, target, ability, timestamp, .. } => {
                self.record_heal(*amount, *is_crit, target, ability, *timestamp);
            }
            DomainEvent::Kill { target, ability, timestamp, .. } => {
                self.record_kill(target, ability, *timestamp);
            }
            // Buffs update no counters; they only enter the recent window.
            DomainEvent::Buff { .. } => {}
        }

        let recompute_dps = matches!(event, DomainEvent::Damage { .. });
        let recompute_hps = matches!(event, DomainEvent::Heal { .. });

        self.session.recent_events.push(event, now);

        if recompute_dps {
            self.recompute_dps(now);
        }
        if recompute_hps {
            self.recompute_hps(now);
        }

        self.session.last_activity = now;
    }

    /// Replace the session outright, abandoning any combat in progress.
    pub fn reset(&mut self) {
        self.reset_at(Utc::now());
    }

    pub fn reset_at(&mut self, now: DateTime<Utc>) {
        tracing::info!(old = %self.session.id, "session reset");
        self.session = Session::new(now);
    }

    /// Mark the session inactive (e.g. at monitoring stop). The next event
    /// applied afterwards starts a fresh session.
    pub fn end_session_at(&mut self, now: DateTime<Utc>) {
        self.session.end(now);
        if let Some(combat) = self.session.current_combat.as_mut() {
            if combat.is_active {
                combat.end(now);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Combat segmentation
    // -----------------------------------------------------------------------

    /// Lazily end a combat whose inactivity gap has elapsed, then make sure
    /// an active combat exists for the incoming event.
    fn check_combat(&mut self, now: DateTime<Utc>) {
        let gap_expired = now - self.session.last_activity >= combat_gap();
        let active = self.session.in_combat();

        if active && !gap_expired {
            return;
        }

        if let Some(combat) = self.session.current_combat.as_mut() {
            if combat.is_active {
                combat.end(now);
                tracing::debug!(
                    id = %combat.id,
                    duration_secs = combat.duration().map(|d| d.num_seconds()).unwrap_or(0),
                    "combat ended"
                );
            }
        }

        let combat = Combat::begin(now);
        tracing::debug!(id = %combat.id, "combat started");
        self.session.current_combat = Some(combat);
    }

    // -----------------------------------------------------------------------
    // Counter dispatch
    // -----------------------------------------------------------------------

    fn record_damage(
        &mut self,
        amount: u64,
        is_crit: bool,
        target: &str,
        ability: &str,
        timestamp: DateTime<Utc>,
    ) {
        let stats = &mut self.session.stats;
        stats.total_damage += amount;
        stats.total_hits += 1;
        if is_crit {
            stats.crit_hits += 1;
        }

        let a = self.session.ability_entry(ability);
        a.damage += amount;
        a.hits += 1;
        if is_crit {
            a.crits += 1;
        }
        a.last_used = Some(timestamp);

        let t = self.session.target_entry(target);
        t.damage += amount;
        t.hits += 1;
        if is_crit {
            t.crits += 1;
        }
        t.last_hit = Some(timestamp);
    }

    fn record_heal(
        &mut self,
        amount: u64,
        is_crit: bool,
        target: &str,
        ability: &str,
        timestamp: DateTime<Utc>,
    ) {
        let stats = &mut self.session.stats;
        stats.total_healing += amount;
        stats.total_healing_hits += 1;
        if is_crit {
            stats.crit_healing += 1;
        }

        let a = self.session.ability_entry(ability);
        a.healing += amount;
        a.healing_hits += 1;
        if is_crit {
            a.crit_healing += 1;
        }
        a.last_used = Some(timestamp);

        let t = self.session.target_entry(target);
        t.healing += amount;
        t.healing_hits += 1;
        if is_crit {
            t.crit_healing += 1;
        }
        t.last_hit = Some(timestamp);
    }

    /// Kills bump kill counters only. The killing blow's damage figure is
    /// not folded into damage or hit counters.
    fn record_kill(&mut self, target: &str, ability: &str, timestamp: DateTime<Utc>) {
        self.session.stats.total_kills += 1;

        let a = self.session.ability_entry(ability);
        a.kills += 1;
        a.last_used = Some(timestamp);

        let t = self.session.target_entry(target);
        t.kills += 1;
        t.last_hit = Some(timestamp);
    }

    // -----------------------------------------------------------------------
    // Windowed rates
    // -----------------------------------------------------------------------

    fn recompute_dps(&mut self, now: DateTime<Utc>) {
        let start = match &self.session.current_combat {
            Some(c) if c.is_active => c.start_time,
            _ => {
                self.session.dps.current = 0.0;
                return;
            }
        };

        let damage: u64 = self
            .session
            .recent_events
            .iter()
            .filter(|w| w.timestamp > start)
            .filter_map(|w| match &w.event {
                DomainEvent::Damage { amount, is_dealt: true, .. } => Some(*amount),
                _ => None,
            })
            .sum();

        let secs = (now - start).num_milliseconds() as f64 / 1000.0;
        self.session.dps.current = if secs > 0.0 { damage as f64 / secs } else { 0.0 };
        if self.session.dps.current > self.session.dps.max {
            self.session.dps.max = self.session.dps.current;
        }
        self.session.dps.total = self.session.stats.total_damage;
        self.session.dps.duration_secs = self.session.elapsed_secs(now);
    }

    fn recompute_hps(&mut self, now: DateTime<Utc>) {
        let start = match &self.session.current_combat {
            Some(c) if c.is_active => c.start_time,
            _ => {
                self.session.hps.current = 0.0;
                return;
            }
        };

        let healing: u64 = self
            .session
            .recent_events
            .iter()
            .filter(|w| w.timestamp > start)
            .filter_map(|w| match &w.event {
                DomainEvent::Heal { amount, is_dealt: false, .. } => Some(*amount),
                _ => None,
            })
            .sum();

        let secs = (now - start).num_milliseconds() as f64 / 1000.0;
        self.session.hps.current = if secs > 0.0 { healing as f64 / secs } else { 0.0 };
        if self.session.hps.current > self.session.hps.max {
            self.session.hps.max = self.session.hps.current;
        }
        self.session.hps.total = self.session.stats.total_healing;
        self.session.hps.duration_secs = self.session.elapsed_secs(now);
    }
}

// ---------------------------------------------------------------------------
// Shared, mutex-guarded form
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle shared between the tailer task (writer) and
/// snapshot readers. All access goes through the lock; internal maps are
/// never handed out.
#[derive(Clone, Default)]
pub struct SharedAggregator {
    inner: Arc<Mutex<CombatAggregator>>,
}

impl SharedAggregator {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(CombatAggregator::new())) }
    }

    fn lock(&self) -> MutexGuard<'_, CombatAggregator> {
        // Counters stay consistent even if a writer panicked mid-lock, so a
        // poisoned lock keeps serving.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn apply(&self, event: DomainEvent) {
        self.lock().apply(event);
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn end_session(&self) {
        self.lock().end_session_at(Utc::now());
    }

    pub fn stats(&self) -> SessionSnapshot {
        SessionSnapshot::capture(self.lock().session(), Utc::now())
    }

    pub fn abilities(&self) -> Vec<AbilityRow> {
        snapshot::ability_breakdown(self.lock().session())
    }

    pub fn targets(&self) -> Vec<TargetRow> {
        snapshot::target_breakdown(self.lock().session())
    }
}
