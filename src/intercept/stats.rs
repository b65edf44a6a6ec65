use crate::analytics;

/// Per-session interception counters. Every bump is mirrored into the
/// process-wide totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptStats {
    pub statements: u64,
    pub reroutes: u64,
    pub rewrites: u64,
    pub overflows: u64,
    pub decision_failures: u64,
    pub invalid_routes: u64,
    pub pinned_routes: u64,
}

impl InterceptStats {
    pub(super) fn statement(&mut self) {
        self.statements += 1;
        analytics::inc_statement();
    }

    pub(super) fn reroute(&mut self) {
        self.reroutes += 1;
        analytics::inc_reroute();
    }

    pub(super) fn rewrite(&mut self) {
        self.rewrites += 1;
        analytics::inc_rewrite();
    }

    pub(super) fn overflow(&mut self) {
        self.overflows += 1;
        analytics::inc_overflow();
    }

    pub(super) fn decision_failure(&mut self) {
        self.decision_failures += 1;
        analytics::inc_decision_failure();
    }

    pub(super) fn invalid_route(&mut self) {
        self.invalid_routes += 1;
        analytics::inc_invalid_route();
    }

    pub(super) fn pinned_route(&mut self) {
        self.pinned_routes += 1;
        analytics::inc_pinned_route();
    }
}
