/// Read-only serializable views over a `Session`, consumed by whatever
/// presentation layer sits on top (overlay, CLI printer, web view).
///
/// Snapshots are copies: nothing here retains a reference into the live
/// session, so the aggregator lock can be released as soon as capture ends.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::{AbilityStats, Session, TargetStats};

fn percent(part: u32, whole: u32) -> f64 {
    if whole > 0 {
        f64::from(part) / f64::from(whole) * 100.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Cumulative snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id:       String,
    pub is_active:        bool,
    pub duration_secs:    f64,
    pub total_damage:     u64,
    pub total_hits:       u32,
    pub crit_hits:        u32,
    pub crit_rate:        f64,
    pub dps:              f64,
    pub max_dps:          f64,
    pub total_healing:    u64,
    pub healing_hits:     u32,
    pub healing_crits:    u32,
    pub healing_crit_rate: f64,
    pub hps:              f64,
    pub max_hps:          f64,
    pub kills:            u32,
    pub in_combat:        bool,
    pub combat_elapsed_secs: f64,
}

impl SessionSnapshot {
    pub fn capture(session: &Session, now: DateTime<Utc>) -> Self {
        let stats = &session.stats;
        let combat_elapsed_secs = session
            .current_combat
            .as_ref()
            .filter(|c| c.is_active)
            .map(|c| c.elapsed(now).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        Self {
            session_id:        session.id.clone(),
            is_active:         session.is_active,
            duration_secs:     session.elapsed_secs(now),
            total_damage:      stats.total_damage,
            total_hits:        stats.total_hits,
            crit_hits:         stats.crit_hits,
            crit_rate:         percent(stats.crit_hits, stats.total_hits),
            dps:               session.dps.current,
            max_dps:           session.dps.max,
            total_healing:     stats.total_healing,
            healing_hits:      stats.total_healing_hits,
            healing_crits:     stats.crit_healing,
            healing_crit_rate: percent(stats.crit_healing, stats.total_healing_hits),
            hps:               session.hps.current,
            max_hps:           session.hps.max,
            kills:             stats.total_kills,
            in_combat:         session.in_combat(),
            combat_elapsed_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Breakdowns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityRow {
    pub name:              String,
    pub damage:            u64,
    pub healing:           u64,
    pub hits:              u32,
    pub crits:             u32,
    pub crit_rate:         f64,
    pub kills:             u32,
    pub healing_hits:      u32,
    pub healing_crits:     u32,
    pub healing_crit_rate: f64,
}

impl From<&AbilityStats> for AbilityRow {
    fn from(a: &AbilityStats) -> Self {
        Self {
            name:              a.name.clone(),
            damage:            a.damage,
            healing:           a.healing,
            hits:              a.hits,
            crits:             a.crits,
            crit_rate:         percent(a.crits, a.hits),
            kills:             a.kills,
            healing_hits:      a.healing_hits,
            healing_crits:     a.crit_healing,
            healing_crit_rate: percent(a.crit_healing, a.healing_hits),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRow {
    pub name:              String,
    pub damage:            u64,
    pub healing:           u64,
    pub hits:              u32,
    pub crits:             u32,
    pub crit_rate:         f64,
    pub kills:             u32,
    pub healing_hits:      u32,
    pub healing_crits:     u32,
    pub healing_crit_rate: f64,
}

impl From<&TargetStats> for TargetRow {
    fn from(t: &TargetStats) -> Self {
        Self {
            name:              t.name.clone(),
            damage:            t.damage,
            healing:           t.healing,
            hits:              t.hits,
            crits:             t.crits,
            crit_rate:         percent(t.crits, t.hits),
            kills:             t.kills,
            healing_hits:      t.healing_hits,
            healing_crits:     t.crit_healing,
            healing_crit_rate: percent(t.crit_healing, t.healing_hits),
        }
    }
}

/// Abilities with nonzero damage, sorted descending by damage.
/// Tie order between equal-damage rows is unspecified.
pub fn ability_breakdown(session: &Session) -> Vec<AbilityRow> {
    let mut rows: Vec<AbilityRow> = session
        .abilities
        .values()
        .filter(|a| a.damage > 0)
        .map(AbilityRow::from)
        .collect();
    rows.sort_by(|a, b| b.damage.cmp(&a.damage));
    rows
}

/// Targets with nonzero damage, sorted descending by damage.
pub fn target_breakdown(session: &Session) -> Vec<TargetRow> {
    let mut rows: Vec<TargetRow> = session
        .targets
        .values()
        .filter(|t| t.damage > 0)
        .map(TargetRow::from)
        .collect();
    rows.sort_by(|a, b| b.damage.cmp(&a.damage));
    rows
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

    fn session_with_stats() -> Session {
        let mut session = Session::new(at(0));
        session.stats.total_damage = 100;
        session.stats.total_hits = 4;
        session.stats.crit_hits = 1;

        let a = session.ability_entry("Fireball");
        a.damage = 60;
        a.hits = 2;
        let a = session.ability_entry("Wand");
        a.damage = 40;
        a.hits = 2;
        let a = session.ability_entry("Soothe");
        a.healing = 30;
        a.healing_hits = 1;

        let t = session.target_entry("Boar");
        t.damage = 100;
        t.hits = 4;
        session
    }

    #[test]
    fn crit_rate_never_divides_by_zero() {
        let session = Session::new(at(0));
        let snap = SessionSnapshot::capture(&session, at(1));
        assert_eq!(snap.crit_rate, 0.0);
        assert_eq!(snap.healing_crit_rate, 0.0);
    }

    #[test]
    fn crit_rate_is_percentage() {
        let session = session_with_stats();
        let snap = SessionSnapshot::capture(&session, at(10));
        assert!((snap.crit_rate - 25.0).abs() < f64::EPSILON);
        assert_eq!(snap.total_damage, 100);
        assert!((snap.duration_secs - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn breakdown_filters_zero_damage_and_sorts_descending() {
        let session = session_with_stats();
        let rows = ability_breakdown(&session);
        // "Soothe" healed but dealt no damage — excluded
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Fireball");
        assert_eq!(rows[1].name, "Wand");
        assert!(rows[0].damage >= rows[1].damage);
    }

    #[test]
    fn target_breakdown_carries_crit_rate() {
        let mut session = session_with_stats();
        let t = session.target_entry("Boar");
        t.crits = 2;
        let rows = target_breakdown(&session);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].crit_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let session = session_with_stats();
        let snap = SessionSnapshot::capture(&session, at(1));
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json.get("totalDamage").is_some());
        assert!(json.get("maxDps").is_some());
        assert!(json.get("critRate").is_some());
    }
}
