use rand::Rng;

// -----------------------------------------------------------------------------
// ----- BackendIdentity -------------------------------------------------------

/// Key data handed to the client in BackendKeyData. pgswitch never forwards
/// CancelRequest, so the pair only has to look like a real backend's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendIdentity {
    pub process_id: i32,
    pub secret_key: i32,
}

impl BackendIdentity {
    /// Process ids are positive, as a real postmaster would report.
    pub fn random() -> Self {
        let mut rng = rand::rng();

        Self {
            process_id: rng.random_range(1..=i32::MAX),
            secret_key: rng.random(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_is_positive() {
        for _ in 0..64 {
            assert!(BackendIdentity::random().process_id > 0);
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
