//! Buffer-sizing heuristics (spec §4.I). Hints only — correctness never
//! depends on them, only throughput.

use crate::event::{Event, EventKind};

const SMALL: usize = 512;
const MEDIUM: usize = 2 * 1024;
const LARGE: usize = 8 * 1024;
const VERY_LARGE: usize = 16 * 1024;

/// Per-event-type expected byte count, used to pick a pool tier up front.
pub fn hint_for(kind: EventKind) -> usize {
    match kind {
        EventKind::MessageStart | EventKind::MessageEnd | EventKind::ToolCallEnd | EventKind::StepStarted | EventKind::StepFinished => SMALL,
        EventKind::TextMessageContent | EventKind::ToolCallStart | EventKind::ToolCallArgs | EventKind::RunStarted | EventKind::RunFinished => MEDIUM,
        EventKind::StateDelta | EventKind::Custom => LARGE,
        EventKind::StateSnapshot | EventKind::Raw => VERY_LARGE,
    }
}

/// `hint_for` applied to a concrete event.
pub fn hint_for_event(event: &Event) -> usize {
    hint_for(event.kind())
}

/// Per-event overhead added on top of the sum of per-event hints for a
/// multi-event encode (spec §4.I).
pub const MULTI_EVENT_OVERHEAD: usize = 50;

/// Combined hint for a batch: `sum(per_event_hint) + overhead_per_event`.
pub fn hint_for_batch<'a>(events: impl IntoIterator<Item = &'a Event>) -> usize {
    events
        .into_iter()
        .map(|e| hint_for_event(e) + MULTI_EVENT_OVERHEAD)
        .sum()
}

/// Binary codecs may halve the hint (denser encoding, no field names).
pub fn binary_hint(base: usize) -> usize {
    (base / 2).max(1)
}

/// Text codecs in pretty-print mode may double the hint (indentation).
pub fn text_hint(base: usize, pretty: bool) -> usize {
    if pretty { base * 2 } else { base }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_hint_includes_overhead_per_event() {
        let events = vec![
            Event::StepStarted { step_name: "a".into() },
            Event::StepFinished { step_name: "a".into() },
        ];
        let expected = hint_for(EventKind::StepStarted) + MULTI_EVENT_OVERHEAD
            + hint_for(EventKind::StepFinished) + MULTI_EVENT_OVERHEAD;
        assert_eq!(hint_for_batch(&events), expected);
    }

    #[test]
    fn pretty_doubles_text_hint() {
        assert_eq!(text_hint(100, true), 200);
        assert_eq!(text_hint(100, false), 100);
    }
}
