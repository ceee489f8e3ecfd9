/// Parses raw AOC log lines into typed `DomainEvent`s.
///
/// The game client writes newline-delimited JSON envelopes, one per line:
///
///   {"timestamp":"2024-06-15T18:30:01.123Z","frame":4812,
///    "category":"LogAoC_CombatLog","message":"83 damage(Crit) dealt to ..."}
///
/// Only `LogAoC_CombatLog` records are inspected further. The `message`
/// field carries one of seven known grammars:
///
///   <n> damage[(Crit)][(Lethal)] dealt to <target> - <ability>
///   <n> damage[(Crit)][(Lethal)] received from <source> - <ability>
///   <n> healing[(Crit)] received from <source> - <ability>
///   <n> damage... dealt to <target> - <ability> [&Kill][KILL]Killed <target>
///   Received  [<name>]
///   Applied [<name>] to [<target>]
///   Removed [<name>] from [<target>]
///
/// The log never names the local player; wherever a grammar implies the
/// player acted or was hit, a fixed sentinel label is substituted.
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Category value of combat records; every other category is skipped.
pub const COMBAT_LOG_CATEGORY: &str = "LogAoC_CombatLog";

/// Default sentinel label for the local player.
pub const DEFAULT_PLAYER_LABEL: &str = "You";

/// Actor label used when the grammar gives no source at all.
pub const UNKNOWN_ACTOR: &str = "Unknown";

/// Envelope timestamps look like "2024-06-15T18:30:01.123Z".
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// ---------------------------------------------------------------------------
// Typed events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuffKind {
    Received,
    Applied,
    Removed,
}

/// Typed combat log events the aggregator consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    Damage {
        timestamp: DateTime<Utc>,
        amount:    u64,
        is_crit:   bool,
        is_lethal: bool,
        actor:     String,
        target:    String,
        ability:   String,
        /// true = dealt by the player, false = received by the player
        is_dealt:  bool,
    },
    Heal {
        timestamp: DateTime<Utc>,
        amount:    u64,
        is_crit:   bool,
        actor:     String,
        target:    String,
        ability:   String,
        is_dealt:  bool,
    },
    Kill {
        timestamp: DateTime<Utc>,
        target:    String,
        actor:     String,
        ability:   String,
        /// Damage figure of the killing blow. Carried on the event but never
        /// added to damage totals (kill counters only).
        damage:    u64,
        is_crit:   bool,
    },
    Buff {
        timestamp: DateTime<Utc>,
        kind:      BuffKind,
        name:      String,
        actor:     String,
        target:    String,
    },
}

impl DomainEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Damage { timestamp, .. } => *timestamp,
            Self::Heal   { timestamp, .. } => *timestamp,
            Self::Kill   { timestamp, .. } => *timestamp,
            Self::Buff   { timestamp, .. } => *timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope + grammars
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    timestamp: String,
    #[serde(default)]
    frame:     i64,
    category:  String,
    message:   String,
}

static DAMAGE_DEALT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:,\d+)*) damage(\(Crit\))?(\(Lethal\))? dealt to (.+) - (.+)").unwrap()
});
static DAMAGE_RECEIVED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:,\d+)*) damage(\(Crit\))?(\(Lethal\))? received from (.+) - (.+)").unwrap()
});
static HEAL_RECEIVED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:,\d+)*) healing(\(Crit\))? received from (.+) - (.+)").unwrap()
});
static KILL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d+(?:,\d+)*) damage(\(Crit\))?(\(Lethal\))? dealt to (.+) - (.+) \[&Kill\]\[KILL\]Killed (.+)",
    )
    .unwrap()
});
static BUFF_RECEIVED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Received\s+\[(.+)\]").unwrap());
static BUFF_APPLIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Applied \[(.+)\] to \[(.+)\]").unwrap());
static BUFF_REMOVED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Removed \[(.+)\] from \[(.+)\]").unwrap());

/// Strip thousands-separator commas: "1,234" -> 1234.
fn parse_amount(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct EventParser {
    /// Sentinel substituted wherever the grammar implies the local player.
    player: String,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_LABEL.to_owned())
    }
}

impl EventParser {
    pub fn new(player_label: String) -> Self {
        Self { player: player_label }
    }

    /// Map one raw line to zero-or-one typed event.
    ///
    /// Malformed JSON, an unknown category, or an unparsable timestamp drop
    /// the line silently; none of these escalate past the parser boundary.
    pub fn parse(&self, raw: &str) -> Option<DomainEvent> {
        let env: Envelope = serde_json::from_str(raw).ok()?;
        if env.category != COMBAT_LOG_CATEGORY {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(&env.timestamp, TIMESTAMP_FORMAT)
            .ok()?
            .and_utc();
        tracing::trace!(frame = env.frame, message = %env.message, "combat log line");
        self.parse_message(&env.message, timestamp)
    }

    fn parse_message(&self, msg: &str, timestamp: DateTime<Utc>) -> Option<DomainEvent> {
        // A killing blow also satisfies the dealt-damage grammar, so the kill
        // rule must run first; first match governs.
        if let Some(c) = KILL.captures(msg) {
            return Some(DomainEvent::Kill {
                timestamp,
                damage:  parse_amount(&c[1])?,
                is_crit: c.get(2).is_some(),
                target:  c[4].to_owned(),
                actor:   self.player.clone(),
                ability: c[5].to_owned(),
            });
        }

        if let Some(c) = DAMAGE_DEALT.captures(msg) {
            return Some(DomainEvent::Damage {
                timestamp,
                amount:    parse_amount(&c[1])?,
                is_crit:   c.get(2).is_some(),
                is_lethal: c.get(3).is_some(),
                actor:     self.player.clone(),
                target:    c[4].to_owned(),
                ability:   c[5].to_owned(),
                is_dealt:  true,
            });
        }

        if let Some(c) = DAMAGE_RECEIVED.captures(msg) {
            return Some(DomainEvent::Damage {
                timestamp,
                amount:    parse_amount(&c[1])?,
                is_crit:   c.get(2).is_some(),
                is_lethal: c.get(3).is_some(),
                actor:     c[4].to_owned(),
                target:    self.player.clone(),
                ability:   c[5].to_owned(),
                is_dealt:  false,
            });
        }

        if let Some(c) = HEAL_RECEIVED.captures(msg) {
            return Some(DomainEvent::Heal {
                timestamp,
                amount:   parse_amount(&c[1])?,
                is_crit:  c.get(2).is_some(),
                actor:    c[3].to_owned(),
                target:   self.player.clone(),
                ability:  c[4].to_owned(),
                is_dealt: false,
            });
        }

        // Buff grammars are evaluated independently of damage/heal shape.
        if let Some(c) = BUFF_APPLIED.captures(msg) {
            return Some(DomainEvent::Buff {
                timestamp,
                kind:   BuffKind::Applied,
                name:   c[1].to_owned(),
                actor:  self.player.clone(),
                target: c[2].to_owned(),
            });
        }

        if let Some(c) = BUFF_REMOVED.captures(msg) {
            return Some(DomainEvent::Buff {
                timestamp,
                kind:   BuffKind::Removed,
                name:   c[1].to_owned(),
                actor:  UNKNOWN_ACTOR.to_owned(),
                target: c[2].to_owned(),
            });
        }

        if let Some(c) = BUFF_RECEIVED.captures(msg) {
            return Some(DomainEvent::Buff {
                timestamp,
                kind:   BuffKind::Received,
                name:   c[1].to_owned(),
                actor:  UNKNOWN_ACTOR.to_owned(),
                target: self.player.clone(),
            });
        }

        None // Well-formed line, no recognised grammar — not an error
    }
}
