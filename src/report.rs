/// Identity/content pair of the last surfaced notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub name: String,
    pub output: String,
}

impl Report {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
        }
    }
}

/// Deduplicates notifications across cycles.
///
/// `current` is replaced wholesale on every update; `previous` only moves
/// forward when the candidate differs, i.e. when the caller is told to notify.
#[derive(Debug, Default)]
pub struct ReportTracker {
    previous: Report,
    current: Report,
}

impl ReportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candidate` as this cycle's report. Returns true when it differs
    /// from the last emitted one and must be sent.
    pub fn update(&mut self, candidate: Report) -> bool {
        self.current = candidate;
        if self.current == self.previous {
            return false;
        }
        self.previous = self.current.clone();
        true
    }

    /// Last emitted report.
    pub fn previous(&self) -> &Report {
        &self.previous
    }

    /// This cycle's candidate.
    pub fn current(&self) -> &Report {
        &self.current
    }
}
