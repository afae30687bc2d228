// Ordered log of the labels produced during one session
//
// The history lives for the whole session and is only replaced when a new
// session starts; it is read once, at finalization.

use crate::session::types::Classification;

#[derive(Debug, Default)]
pub struct SessionHistory {
    entries: Vec<Classification>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one window's result.
    pub fn record(&mut self, classification: Classification) {
        self.entries.push(classification);
    }

    /// The most frequent label, with ties broken in favor of the label that
    /// occurred earliest in the session. `None` when the history is empty.
    pub fn mode(&self) -> Option<String> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for entry in &self.entries {
            match counts.iter_mut().find(|(label, _)| *label == entry.label) {
                Some((_, n)) => *n += 1,
                None => counts.push((&entry.label, 1)),
            }
        }

        // First-seen wins ties: only a strictly greater count replaces.
        let mut best: Option<(&str, usize)> = None;
        for (label, n) in counts {
            match best {
                Some((_, best_n)) if n <= best_n => {}
                _ => best = Some((label, n)),
            }
        }
        best.map(|(label, _)| label.to_string())
    }

    /// The most recent successful classification, if any.
    pub fn last(&self) -> Option<&Classification> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
