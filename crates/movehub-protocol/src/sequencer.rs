//! Sender-side move stamping.
//!
//! Moves carry two ordering properties that the codec doesn't enforce:
//! sequence numbers are unique within a sender's session, and timestamps
//! never go backwards for moves produced in order. [`MoveSequencer`]
//! hands out both.

use chrono::{DateTime, Utc};

use crate::{DataMap, Move, MoveKind};

/// Stamps outgoing moves with sequence numbers and timestamps.
///
/// Sequence numbers start at 1 and increase by one per move. Timestamps
/// come from the wall clock but are clamped to the previous move's
/// timestamp, so a clock step backwards (NTP adjustment, manual change)
/// can't make a later move look older.
#[derive(Debug, Default)]
pub struct MoveSequencer {
    last_sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MoveSequencer {
    /// Creates a sequencer whose first move gets sequence number 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the next move, timestamped now.
    pub fn next_move(&mut self, kind: MoveKind, data: DataMap) -> Move {
        self.next_move_at(Utc::now(), kind, data)
    }

    /// Creates the next move with an explicit clock reading.
    ///
    /// `now` is clamped to the previous move's timestamp if it is older.
    pub fn next_move_at(
        &mut self,
        now: DateTime<Utc>,
        kind: MoveKind,
        data: DataMap,
    ) -> Move {
        self.last_sequence += 1;
        let timestamp = match self.last_timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        Move {
            sequence: self.last_sequence,
            timestamp,
            kind,
            data,
        }
    }

    /// Sequence number of the most recent move (0 before the first).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}
