//! `TimeRule` matching (spec §4.6): rule matching is a pure function of
//! `(rule, last-fire time, now)` so replay is deterministic given a clock.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// The four rule kinds named in spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRuleKind {
    Cron,
    Interval,
    At,
    Condition,
}

/// A scheduled rule. `expression` is interpreted per `kind`:
/// - `Interval`: whole seconds, relative to `anchor`.
/// - `At`: an RFC3339 timestamp, fires once.
/// - `Cron`: a 5-field `min hour dom month dow` expression; each field is
///   `*` or a comma-separated list of integers.
/// - `Condition`: `"always"` fires on every tick; anything else never
///   fires (conditions evaluated against live external state are a
///   collaborator concern outside the core, spec §1).
#[derive(Debug, Clone)]
pub struct TimeRule {
    pub id: Uuid,
    pub kind: TimeRuleKind,
    pub expression: String,
    pub payload: Value,
    pub anchor: DateTime<Utc>,
}

impl TimeRule {
    #[must_use]
    pub fn interval(seconds: i64, payload: Value, anchor: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TimeRuleKind::Interval,
            expression: seconds.to_string(),
            payload,
            anchor,
        }
    }

    #[must_use]
    pub fn at(when: DateTime<Utc>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TimeRuleKind::At,
            expression: when.to_rfc3339(),
            payload,
            anchor: when,
        }
    }

    #[must_use]
    pub fn cron(expression: impl Into<String>, payload: Value, anchor: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: TimeRuleKind::Cron,
            expression: expression.into(),
            payload,
            anchor,
        }
    }

    /// All fire instants in `(last_fire, now]`, per spec §4.6's pure
    /// matching function. `last_fire = None` means "never fired" and is
    /// treated as `anchor` for interval rules.
    #[must_use]
    pub fn fire_times(&self, last_fire: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        match self.kind {
            TimeRuleKind::Interval => self.interval_fire_times(last_fire, now),
            TimeRuleKind::At => self.at_fire_times(last_fire, now),
            TimeRuleKind::Cron => self.cron_fire_times(last_fire, now),
            TimeRuleKind::Condition => self.condition_fire_times(last_fire, now),
        }
    }

    fn interval_fire_times(&self, last_fire: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let Ok(seconds) = self.expression.parse::<i64>() else {
            return Vec::new();
        };
        if seconds <= 0 {
            return Vec::new();
        }
        let since = last_fire.unwrap_or(self.anchor);
        let mut fires = Vec::new();
        let mut n = 1i64;
        loop {
            let candidate = self.anchor + chrono::Duration::seconds(seconds * n);
            if candidate > now {
                break;
            }
            if candidate > since {
                fires.push(candidate);
            }
            n += 1;
            if n > 1_000_000 {
                break;
            }
        }
        fires
    }

    fn at_fire_times(&self, last_fire: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if last_fire.is_some() {
            return Vec::new();
        }
        let Ok(when) = DateTime::parse_from_rfc3339(&self.expression) else {
            return Vec::new();
        };
        let when = when.with_timezone(&Utc);
        if when <= now { vec![when] } else { Vec::new() }
    }

    fn condition_fire_times(&self, last_fire: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if self.expression == "always" && last_fire != Some(now) {
            vec![now]
        } else {
            Vec::new()
        }
    }

    fn cron_fire_times(&self, last_fire: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let Some(fields) = parse_cron(&self.expression) else {
            return Vec::new();
        };
        let start = last_fire.unwrap_or(self.anchor);
        let mut cursor = truncate_to_minute(start) + chrono::Duration::minutes(1);
        let mut fires = Vec::new();
        let mut guard = 0;
        while cursor <= now && guard < 527_040 {
            if fields.matches(cursor) {
                fires.push(cursor);
            }
            cursor += chrono::Duration::minutes(1);
            guard += 1;
        }
        fires
    }
}

fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Timelike;
    t - chrono::Duration::seconds(i64::from(t.second())) - chrono::Duration::nanoseconds(i64::from(t.nanosecond()))
}

struct CronFields {
    minute: Vec<u32>,
    hour: Vec<u32>,
    dom: Vec<u32>,
    month: Vec<u32>,
    dow: Vec<u32>,
}

impl CronFields {
    fn matches(&self, t: DateTime<Utc>) -> bool {
        use chrono::{Datelike, Timelike};
        field_matches(&self.minute, t.minute())
            && field_matches(&self.hour, t.hour())
            && field_matches(&self.dom, t.day())
            && field_matches(&self.month, t.month())
            && field_matches(&self.dow, t.weekday().num_days_from_sunday())
    }
}

fn field_matches(values: &[u32], actual: u32) -> bool {
    values.is_empty() || values.contains(&actual)
}

fn parse_cron(expr: &str) -> Option<CronFields> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 5 {
        return None;
    }
    Some(CronFields {
        minute: parse_field(parts[0]),
        hour: parse_field(parts[1]),
        dom: parse_field(parts[2]),
        month: parse_field(parts[3]),
        dow: parse_field(parts[4]),
    })
}

fn parse_field(field: &str) -> Vec<u32> {
    if field == "*" {
        return Vec::new();
    }
    field.split(',').filter_map(|p| p.parse::<u32>().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interval_rule_catches_up_multiple_fires_in_one_tick() {
        let anchor = Utc::now();
        let rule = TimeRule::interval(60, json!({"task": "remind_to_drink_water"}), anchor);
        let now = anchor + chrono::Duration::seconds(125);
        let fires = rule.fire_times(None, now);
        assert_eq!(fires.len(), 2);
    }

    #[test]
    fn interval_rule_does_not_refire_already_passed_instants() {
        let anchor = Utc::now();
        let rule = TimeRule::interval(60, Value::Null, anchor);
        let first_tick = anchor + chrono::Duration::seconds(65);
        let first = rule.fire_times(None, first_tick);
        assert_eq!(first.len(), 1);
        let last_fire = *first.last().unwrap();
        let second_tick = anchor + chrono::Duration::seconds(125);
        let second = rule.fire_times(Some(last_fire), second_tick);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn at_rule_fires_exactly_once() {
        let when = Utc::now();
        let rule = TimeRule::at(when, Value::Null);
        let first = rule.fire_times(None, when + chrono::Duration::seconds(1));
        assert_eq!(first.len(), 1);
        let second = rule.fire_times(Some(first[0]), when + chrono::Duration::seconds(10));
        assert!(second.is_empty());
    }
}
