// Text delta reconciliation
//
// Streaming backends are not consistent about granularity: some send true
// incremental deltas, others resend the whole accumulated text of the turn
// with each chunk. `reconcile` turns either shape into a clean delta stream:
// given the running accumulator and a newly observed fragment, it yields the
// text to emit (if any) and the new accumulator.
//
// A fragment that neither extends nor duplicates the accumulator is emitted
// verbatim as a new increment. No fuzzy diffing is attempted; that trade-off
// favors robustness over a guaranteed-minimal diff.

/// Outcome of reconciling one fragment against the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Text to forward to the client, if any
    pub emit: Option<String>,
    /// The new accumulator value
    pub acc: String,
}

/// Reconcile one raw fragment against the turn's accumulated text.
pub fn reconcile(acc: &str, frag: &str) -> Reconciled {
    if frag.is_empty() {
        return Reconciled {
            emit: None,
            acc: acc.to_string(),
        };
    }

    if !acc.is_empty() {
        // Exact duplicate: the backend resent what we already have.
        if frag == acc {
            return Reconciled {
                emit: None,
                acc: acc.to_string(),
            };
        }

        // Cumulative resend: the fragment restates the accumulator plus new
        // text. Strip the prefix and emit only the residual.
        if let Some(residual) = frag.strip_prefix(acc) {
            return Reconciled {
                emit: Some(residual.to_string()),
                acc: frag.to_string(),
            };
        }
    }

    // Genuine new increment.
    Reconciled {
        emit: Some(frag.to_string()),
        acc: format!("{acc}{frag}"),
    }
}

/// Per-turn mutable wrapper around `reconcile`.
///
/// Owned by the turn executor for the duration of one turn; a new turn gets
/// a fresh accumulator.
#[derive(Debug, Default)]
pub struct TextAccumulator {
    text: String,
}

impl TextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one raw fragment, returning the delta to emit (if any).
    pub fn absorb(&mut self, frag: &str) -> Option<String> {
        let reconciled = reconcile(&self.text, frag);
        self.text = reconciled.acc;
        reconciled.emit
    }

    /// All text accumulated so far in this turn
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the accumulator, yielding the turn's full text
    pub fn into_text(self) -> String {
        self.text
    }
}
