//! Per-unit timing state machine and metadata write-back.

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tessera_rs_normalize::correlation_key;
use tessera_rs_protocol::{
    DURATION_KEY, Fragment, Message, MessageId, RESERVED_NAMESPACE, ReasoningState,
};

/// Key identifying one logical reasoning unit within a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct UnitKey {
    /// Message carrying the unit.
    message_id: MessageId,
    /// Correlation id when the provider assigned one, position otherwise.
    unit: Unit,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Unit {
    Correlated(String),
    Position(usize),
}

/// Timing state for one reasoning unit.
///
/// A unit is running while only `started_at` is set and finalized once
/// `finished_at` is recorded; finalization happens at most once.
#[derive(Debug, Clone)]
struct UnitTiming {
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration_secs: Option<i64>,
}

/// Tracks reasoning durations across live snapshots of one thread.
///
/// Created when the thread session starts and dropped with it; callers
/// pass the store explicitly rather than holding it as ambient state.
#[derive(Debug, Default)]
pub struct DurationTracker {
    units: HashMap<UnitKey, UnitTiming>,
}

impl DurationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one live snapshot at the given instant.
    ///
    /// Starts timing units first seen streaming, finalizes units first
    /// seen done, writes finalized durations into fragment metadata when
    /// the stored value differs, and purges state for units no longer in
    /// the snapshot. Returns whether any fragment changed, so unchanged
    /// snapshots never trigger downstream updates.
    pub fn observe(&mut self, messages: &mut [Message], now: DateTime<Utc>) -> bool {
        let mut changed = false;
        let mut live = HashSet::new();

        for message in messages.iter_mut() {
            let message_id = message.id.clone();
            for (position, part) in message.payload.parts.iter_mut().enumerate() {
                if !matches!(part, Fragment::Reasoning { .. }) {
                    continue;
                }
                let unit = match correlation_key(part) {
                    Some(key) => Unit::Correlated(key),
                    None => Unit::Position(position),
                };
                let key = UnitKey {
                    message_id: message_id.clone(),
                    unit,
                };
                live.insert(key.clone());
                changed |= self.observe_unit(key, part, now);
            }
        }

        let before = self.units.len();
        self.units.retain(|key, _| live.contains(key));
        if self.units.len() < before {
            debug!(
                "purged stale reasoning units (purged={}, tracked={})",
                before - self.units.len(),
                self.units.len()
            );
        }
        changed
    }

    /// Number of units currently tracked.
    pub fn tracked_units(&self) -> usize {
        self.units.len()
    }

    /// Advance one unit's state machine and apply the write-back rule.
    fn observe_unit(&mut self, key: UnitKey, part: &mut Fragment, now: DateTime<Utc>) -> bool {
        let Fragment::Reasoning {
            state,
            provider_metadata,
            ..
        } = part
        else {
            return false;
        };
        match state {
            Some(ReasoningState::Streaming) => {
                self.units.entry(key).or_insert(UnitTiming {
                    started_at: now,
                    finished_at: None,
                    duration_secs: None,
                });
                false
            }
            Some(ReasoningState::Done) => {
                // A unit first seen done never streamed here; there is
                // nothing to measure.
                let Some(timing) = self.units.get_mut(&key) else {
                    return false;
                };
                if timing.finished_at.is_none() {
                    timing.finished_at = Some(now);
                    let duration = elapsed_secs(timing.started_at, now);
                    timing.duration_secs = Some(duration);
                    debug!(
                        "finalized reasoning unit (message_id={}, duration_secs={})",
                        key.message_id, duration
                    );
                }
                match timing.duration_secs {
                    Some(duration) => write_duration(provider_metadata, duration),
                    None => false,
                }
            }
            None => false,
        }
    }
}

/// Whole seconds between start and end, rounded up, never negative.
fn elapsed_secs(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> i64 {
    let millis = (finished_at - started_at).num_milliseconds().max(0);
    (millis as u64).div_ceil(1000) as i64
}

/// Write a finalized duration under the reserved namespace.
///
/// Leaves the fragment untouched when the stored value already matches;
/// malformed metadata counts as empty and is replaced.
fn write_duration(metadata: &mut Option<Value>, duration: i64) -> bool {
    let current = metadata
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|namespaces| namespaces.get(RESERVED_NAMESPACE))
        .and_then(Value::as_object)
        .and_then(|reserved| reserved.get(DURATION_KEY));
    if current == Some(&Value::from(duration)) {
        return false;
    }

    if !matches!(metadata, Some(Value::Object(_))) {
        *metadata = Some(Value::Object(Map::new()));
    }
    let Some(Value::Object(namespaces)) = metadata else {
        return false;
    };
    let reserved = namespaces
        .entry(RESERVED_NAMESPACE)
        .or_insert_with(|| Value::Object(Map::new()));
    if !reserved.is_object() {
        *reserved = Value::Object(Map::new());
    }
    let Value::Object(reserved) = reserved else {
        return false;
    };
    reserved.insert(DURATION_KEY.to_string(), Value::from(duration));
    true
}

#[cfg(test)]
mod tests {
    use super::{DurationTracker, elapsed_secs};
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};
    use tessera_rs_protocol::{Fragment, Message, MessagePayload, ReasoningState, Role};

    fn reasoning_message(id: &str, state: ReasoningState, item_id: Option<&str>) -> Message {
        Message {
            id: id.to_string(),
            payload: MessagePayload {
                role: Role::Assistant,
                parts: vec![Fragment::Reasoning {
                    text: "thinking".to_string(),
                    state: Some(state),
                    provider_metadata: item_id.map(|id| json!({ "openai": { "itemId": id } })),
                }],
                rest: Map::new(),
            },
        }
    }

    fn duration_of(message: &Message) -> Option<serde_json::Value> {
        let Fragment::Reasoning {
            provider_metadata, ..
        } = &message.payload.parts[0]
        else {
            return None;
        };
        provider_metadata
            .as_ref()
            .and_then(|metadata| metadata.pointer("/tessera/duration"))
            .cloned()
    }

    fn at(base: DateTime<Utc>, offset_millis: i64) -> DateTime<Utc> {
        base + Duration::milliseconds(offset_millis)
    }

    #[test]
    fn elapsed_secs_rounds_up_and_clamps() {
        let base = Utc::now();
        assert_eq!(elapsed_secs(base, at(base, 0)), 0);
        assert_eq!(elapsed_secs(base, at(base, 1)), 1);
        assert_eq!(elapsed_secs(base, at(base, 1000)), 1);
        assert_eq!(elapsed_secs(base, at(base, 2400)), 3);
        assert_eq!(elapsed_secs(at(base, 500), base), 0);
    }

    #[test]
    fn writes_duration_once_the_unit_completes() {
        let base = Utc::now();
        let mut tracker = DurationTracker::new();

        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Streaming, Some("rs_1"))];
        assert!(!tracker.observe(&mut messages, base));
        assert_eq!(duration_of(&messages[0]), None);

        messages[0] = reasoning_message("msg_1", ReasoningState::Done, Some("rs_1"));
        assert!(tracker.observe(&mut messages, at(base, 2400)));
        assert_eq!(duration_of(&messages[0]), Some(json!(3)));
    }

    #[test]
    fn reapplication_is_idempotent() {
        let base = Utc::now();
        let mut tracker = DurationTracker::new();

        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Streaming, Some("rs_1"))];
        tracker.observe(&mut messages, base);
        messages[0] = reasoning_message("msg_1", ReasoningState::Done, Some("rs_1"));
        assert!(tracker.observe(&mut messages, at(base, 1200)));

        // A later pass over the finalized snapshot changes nothing, even
        // though the clock moved on.
        let snapshot = messages.clone();
        assert!(!tracker.observe(&mut messages, at(base, 60_000)));
        assert_eq!(messages, snapshot);
    }

    #[test]
    fn unit_first_seen_done_is_not_timed() {
        let mut tracker = DurationTracker::new();
        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Done, Some("rs_1"))];
        assert!(!tracker.observe(&mut messages, Utc::now()));
        assert_eq!(duration_of(&messages[0]), None);
    }

    #[test]
    fn keyless_units_are_tracked_by_position() {
        let base = Utc::now();
        let mut tracker = DurationTracker::new();

        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Streaming, None)];
        tracker.observe(&mut messages, base);
        messages[0] = reasoning_message("msg_1", ReasoningState::Done, None);
        assert!(tracker.observe(&mut messages, at(base, 500)));
        assert_eq!(duration_of(&messages[0]), Some(json!(1)));
    }

    #[test]
    fn rewrites_when_stored_duration_differs() {
        let base = Utc::now();
        let mut tracker = DurationTracker::new();

        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Streaming, Some("rs_1"))];
        tracker.observe(&mut messages, base);
        messages[0] = reasoning_message("msg_1", ReasoningState::Done, Some("rs_1"));
        tracker.observe(&mut messages, at(base, 1000));
        assert_eq!(duration_of(&messages[0]), Some(json!(1)));

        // Regenerated fragment lost the written value; the finalized
        // duration is applied again without re-timing.
        messages[0] = reasoning_message("msg_1", ReasoningState::Done, Some("rs_1"));
        assert!(tracker.observe(&mut messages, at(base, 90_000)));
        assert_eq!(duration_of(&messages[0]), Some(json!(1)));
    }

    #[test]
    fn purges_units_missing_from_the_snapshot() {
        let base = Utc::now();
        let mut tracker = DurationTracker::new();

        let mut messages = vec![
            reasoning_message("msg_1", ReasoningState::Streaming, Some("rs_1")),
            reasoning_message("msg_2", ReasoningState::Streaming, Some("rs_2")),
        ];
        tracker.observe(&mut messages, base);
        assert_eq!(tracker.tracked_units(), 2);

        // msg_2 was deleted from the live stream.
        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Streaming, Some("rs_1"))];
        tracker.observe(&mut messages, at(base, 100));
        assert_eq!(tracker.tracked_units(), 1);
    }

    #[test]
    fn does_not_touch_running_fragments() {
        let base = Utc::now();
        let mut tracker = DurationTracker::new();
        let mut messages = vec![reasoning_message("msg_1", ReasoningState::Streaming, Some("rs_1"))];
        tracker.observe(&mut messages, base);
        assert!(!tracker.observe(&mut messages, at(base, 5_000)));
        assert_eq!(duration_of(&messages[0]), None);
    }
}
