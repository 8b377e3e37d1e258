//! Terminal reporting for `inkset build`.

use console::{Style, Term};
use inkset_diagrams::PrepareStats;

/// Writes build progress and the final summary to stderr.
pub(crate) struct Output {
    term: Term,
    green: Style,
    yellow: Style,
    red: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
        }
    }

    /// Plain progress line.
    pub(crate) fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    /// Fatal error, in red.
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Report diagram totals for the whole build.
    ///
    /// Failed renders get a yellow warning line before the green summary.
    pub(crate) fn build_summary(&self, documents: usize, totals: &PrepareStats) {
        if let Some(warning) = failure_line(totals) {
            let _ = self.term.write_line(&self.yellow.apply_to(warning).to_string());
        }
        let summary = summary_line(documents, totals);
        let _ = self.term.write_line(&self.green.apply_to(summary).to_string());
    }
}

fn summary_line(documents: usize, totals: &PrepareStats) -> String {
    format!(
        "Built {} document{}: {} diagram{} rendered, {} cached",
        documents,
        plural(documents),
        totals.rendered,
        plural(totals.rendered),
        totals.cached
    )
}

fn failure_line(totals: &PrepareStats) -> Option<String> {
    (totals.failed > 0).then(|| {
        format!(
            "{} diagram{} failed to render; run with --verbose for details",
            totals.failed,
            plural(totals.failed)
        )
    })
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
