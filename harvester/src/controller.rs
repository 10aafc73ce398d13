//! Row selection and loop-progress accounting.
//!
//! The listing behaves differently depending on whether confirmation is on.
//! With confirmation, each processed order disappears from the next round, so
//! the controller always takes the first row. Without it, rows persist, so the
//! controller tracks processed row identifiers itself and counts consecutive
//! rounds that surfaced nothing new.

use std::collections::HashSet;

use tracing::debug;

use crate::driver::ElementHandle;

/// One row in the order listing grid.
#[derive(Debug, Clone)]
pub struct OrderRow {
    pub handle: ElementHandle,
    /// Full server-side identifier of the row link, stable across rounds.
    pub row_id: String,
}

#[derive(Debug)]
pub struct PaginationController {
    confirmation_enabled: bool,
    stall_limit: u32,
    processed: HashSet<String>,
    consecutive_stalls: u32,
}

impl PaginationController {
    pub fn new(confirmation_enabled: bool, stall_limit: u32) -> Self {
        Self {
            confirmation_enabled,
            stall_limit,
            processed: HashSet::new(),
            consecutive_stalls: 0,
        }
    }

    /// Picks the row to open this round, or `None` when the round offers no
    /// work. A `None` in confirmation-disabled mode counts toward the stall
    /// limit; any hit resets the count.
    pub fn select_row<'a>(&mut self, rows: &'a [OrderRow]) -> Option<&'a OrderRow> {
        let pick = if self.confirmation_enabled {
            rows.first()
        } else {
            rows.iter().find(|r| !self.processed.contains(&r.row_id))
        };

        match pick {
            Some(row) => {
                self.consecutive_stalls = 0;
                Some(row)
            }
            None => {
                self.consecutive_stalls += 1;
                debug!(stalls = self.consecutive_stalls, "round surfaced no new rows");
                None
            }
        }
    }

    /// Records a row as fully handled so later rounds skip it.
    pub fn note_processed(&mut self, row_id: &str) {
        self.processed.insert(row_id.to_string());
    }

    /// True once enough consecutive empty rounds have passed to conclude the
    /// backlog is drained. Never trips in confirmation-enabled mode, where the
    /// sentinel is the authoritative end signal.
    pub fn stalled_out(&self) -> bool {
        !self.confirmation_enabled && self.consecutive_stalls >= self.stall_limit
    }
}
