use super::capability::RouteVerdict;

// -----------------------------------------------------------------------------
// ----- RouteOutcome ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Unchanged,
    Switched { from: String, to: String },
    /// The verdict named a dbkey that is not configured. The prior pool stays.
    Invalid { requested: String },
    /// The backend is inside a transaction on `pinned`; the switch is refused.
    Pinned { requested: String, pinned: String },
}

// -----------------------------------------------------------------------------
// ----- PoolRouter ------------------------------------------------------------

/// Tracks the pool a session's statements go to.
#[derive(Debug, Clone)]
pub struct PoolRouter {
    current: String,
}

impl PoolRouter {
    pub fn new(default_key: impl Into<String>) -> Self {
        Self {
            current: default_key.into(),
        }
    }

    #[inline]
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Apply a routing verdict. The switch takes effect before the statement
    /// that triggered it is forwarded.
    pub fn apply(
        &mut self,
        verdict: &RouteVerdict,
        is_valid: impl Fn(&str) -> bool,
        pinned: Option<&str>,
    ) -> RouteOutcome {
        let RouteVerdict::Route(requested) = verdict else {
            return RouteOutcome::Unchanged;
        };

        if *requested == self.current {
            return RouteOutcome::Unchanged;
        }

        if !is_valid(requested) {
            return RouteOutcome::Invalid {
                requested: requested.clone(),
            };
        }

        if let Some(pinned) = pinned {
            return RouteOutcome::Pinned {
                requested: requested.clone(),
                pinned: pinned.to_string(),
            };
        }

        let from = std::mem::replace(&mut self.current, requested.clone());
        RouteOutcome::Switched {
            from,
            to: requested.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
