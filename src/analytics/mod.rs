use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide interception totals, summed over every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterceptTotals {
    pub statements: u64,
    pub reroutes: u64,
    pub rewrites: u64,
    pub overflows: u64,
    pub decision_failures: u64,
    pub invalid_routes: u64,
    pub pinned_routes: u64,
}

static STATEMENTS: AtomicU64 = AtomicU64::new(0);
static REROUTES: AtomicU64 = AtomicU64::new(0);
static REWRITES: AtomicU64 = AtomicU64::new(0);
static OVERFLOWS: AtomicU64 = AtomicU64::new(0);
static DECISION_FAILURES: AtomicU64 = AtomicU64::new(0);
static INVALID_ROUTES: AtomicU64 = AtomicU64::new(0);
static PINNED_ROUTES: AtomicU64 = AtomicU64::new(0);

pub fn inc_statement() {
    STATEMENTS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_reroute() {
    REROUTES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_rewrite() {
    REWRITES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_overflow() {
    OVERFLOWS.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_decision_failure() {
    DECISION_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_invalid_route() {
    INVALID_ROUTES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_pinned_route() {
    PINNED_ROUTES.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> InterceptTotals {
    InterceptTotals {
        statements: STATEMENTS.load(Ordering::Relaxed),
        reroutes: REROUTES.load(Ordering::Relaxed),
        rewrites: REWRITES.load(Ordering::Relaxed),
        overflows: OVERFLOWS.load(Ordering::Relaxed),
        decision_failures: DECISION_FAILURES.load(Ordering::Relaxed),
        invalid_routes: INVALID_ROUTES.load(Ordering::Relaxed),
        pinned_routes: PINNED_ROUTES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Other tests bump the same counters concurrently; compare deltas.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_statement();
        inc_reroute();
        inc_reroute();
        inc_overflow();
        inc_pinned_route();
        let after = snapshot();

        assert!(after.statements > before.statements);
        assert!(after.reroutes >= before.reroutes + 2);
        assert!(after.overflows > before.overflows);
        assert!(after.pinned_routes > before.pinned_routes);
        assert!(after.rewrites >= before.rewrites);
    }
}
