/// Stateful combat session model — mutated by the aggregator, projected by
/// the snapshot layer.
///
/// A `Session` is the cumulative state of one monitoring run across possibly
/// many `Combat`s; it lives until it is explicitly reset or replaced. A
/// `Combat` is a contiguous span of activity bounded by inactivity gaps of
/// ten seconds or more. History of past combats is not retained — only the
/// currently-referenced combat and the session-level totals survive.
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::parser::DomainEvent;

/// Recent-event retention, relative to the latest insert.
pub fn event_window_retention() -> Duration {
    Duration::minutes(2)
}

/// Inactivity gap that ends a combat (evaluated lazily on the next event).
pub fn combat_gap() -> Duration {
    Duration::seconds(10)
}

fn stamp_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S%3f").to_string()
}

// ---------------------------------------------------------------------------
// Rolling event window (last N relative to newest insert)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WindowedEvent {
    /// Processing time of the insert, not the event's own log timestamp.
    pub timestamp: DateTime<Utc>,
    pub event:     DomainEvent,
}

#[derive(Debug)]
pub struct EventWindow {
    events:    Vec<WindowedEvent>,
    retention: Duration,
}

impl EventWindow {
    pub fn new(retention: Duration) -> Self {
        Self { events: Vec::new(), retention }
    }

    /// Append and prune anything older than the retention relative to `now`.
    pub fn push(&mut self, event: DomainEvent, now: DateTime<Utc>) {
        self.events.push(WindowedEvent { timestamp: now, event });
        let cutoff = now - self.retention;
        self.events.retain(|e| e.timestamp > cutoff);
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowedEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Cumulative counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CombatStats {
    pub total_damage:       u64,
    pub total_healing:      u64,
    pub total_kills:        u32,
    pub total_hits:         u32,
    pub crit_hits:          u32,
    pub total_healing_hits: u32,
    pub crit_healing:       u32,
}

/// Windowed per-second rate. One instance each for DPS and HPS.
#[derive(Debug, Clone, Default)]
pub struct RateStats {
    pub current: f64,
    /// Monotone for the life of the session; resets only with it.
    pub max:           f64,
    pub total:         u64,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AbilityStats {
    pub name:         String,
    pub damage:       u64,
    pub healing:      u64,
    pub hits:         u32,
    pub crits:        u32,
    pub kills:        u32,
    pub healing_hits: u32,
    pub crit_healing: u32,
    pub last_used:    Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TargetStats {
    pub name:         String,
    pub damage:       u64,
    pub healing:      u64,
    pub hits:         u32,
    pub crits:        u32,
    pub kills:        u32,
    pub healing_hits: u32,
    pub crit_healing: u32,
    pub last_hit:     Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Combat {
    pub id:         String,
    pub start_time: DateTime<Utc>,
    /// Set once the combat has ended; the end condition is evaluated when the
    /// next event arrives, not by a standalone timer.
    pub end_time:  Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Combat {
    pub fn begin(now: DateTime<Utc>) -> Self {
        Self {
            id:         stamp_id(now),
            start_time: now,
            end_time:   None,
            is_active:  true,
        }
    }

    pub fn end(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.is_active = false;
    }

    /// Valid only once ended.
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        now - self.start_time
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Session {
    pub id:         String,
    pub start_time: DateTime<Utc>,
    pub end_time:   Option<DateTime<Utc>>,
    pub is_active:  bool,
    pub stats:      CombatStats,
    pub dps:        RateStats,
    pub hps:        RateStats,
    pub abilities:  HashMap<String, AbilityStats>,
    pub targets:    HashMap<String, TargetStats>,
    pub recent_events:  EventWindow,
    pub current_combat: Option<Combat>,
    /// Wall-clock time the last event was processed (not its log timestamp).
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id:             stamp_id(now),
            start_time:     now,
            end_time:       None,
            is_active:      true,
            stats:          CombatStats::default(),
            dps:            RateStats::default(),
            hps:            RateStats::default(),
            abilities:      HashMap::new(),
            targets:        HashMap::new(),
            recent_events:  EventWindow::new(event_window_retention()),
            current_combat: None,
            last_activity:  now,
        }
    }

    /// Existing entry, or a fresh one created on first sight of the name.
    pub fn ability_entry(&mut self, name: &str) -> &mut AbilityStats {
        self.abilities
            .entry(name.to_owned())
            .or_insert_with(|| AbilityStats { name: name.to_owned(), ..Default::default() })
    }

    pub fn target_entry(&mut self, name: &str) -> &mut TargetStats {
        self.targets
            .entry(name.to_owned())
            .or_insert_with(|| TargetStats { name: name.to_owned(), ..Default::default() })
    }

    pub fn end(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.is_active = false;
    }

    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn in_combat(&self) -> bool {
        self.current_combat.as_ref().is_some_and(|c| c.is_active)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn buff(ts: DateTime<Utc>) -> DomainEvent {
        DomainEvent::Buff {
            timestamp: ts,
            kind:      crate::parser::BuffKind::Received,
            name:      "Divine Power".to_owned(),
            actor:     "Unknown".to_owned(),
            target:    "You".to_owned(),
        }
    }

    #[test]
    fn window_prunes_relative_to_latest_insert() {
        let mut window = EventWindow::new(event_window_retention());
        window.push(buff(at(0)), at(0));
        window.push(buff(at(60)), at(60));
        assert_eq!(window.len(), 2);

        // 150s later the first insert is older than two minutes
        window.push(buff(at(150)), at(150));
        assert_eq!(window.len(), 2);
        assert!(window.iter().all(|e| e.timestamp > at(150) - event_window_retention()));
    }

    #[test]
    fn window_keeps_entry_exactly_at_cutoff_out() {
        let mut window = EventWindow::new(event_window_retention());
        window.push(buff(at(0)), at(0));
        window.push(buff(at(120)), at(120));
        // entry at t=0 is exactly two minutes old — pruned (strictly-after cutoff)
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn combat_lifecycle() {
        let mut combat = Combat::begin(at(0));
        assert!(combat.is_active);
        assert!(combat.duration().is_none());
        assert_eq!(combat.elapsed(at(7)).num_seconds(), 7);

        combat.end(at(9));
        assert!(!combat.is_active);
        assert_eq!(combat.duration().unwrap().num_seconds(), 9);
    }

    #[test]
    fn entries_created_on_first_sight() {
        let mut session = Session::new(at(0));
        assert!(session.abilities.is_empty());
        session.ability_entry("Fireball").damage += 10;
        session.ability_entry("Fireball").damage += 5;
        assert_eq!(session.abilities.len(), 1);
        assert_eq!(session.abilities["Fireball"].damage, 15);
        assert_eq!(session.abilities["Fireball"].name, "Fireball");
    }

    #[test]
    fn session_end_marks_inactive() {
        let mut session = Session::new(at(0));
        assert!(session.is_active);
        session.end(at(30));
        assert!(!session.is_active);
        assert_eq!(session.end_time, Some(at(30)));
    }
}
