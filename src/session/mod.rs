//! Multi-document transaction state.
//!
//! The gateway never drives transactions itself: it tags forwarded store
//! operations with the session's current [`Txn`] value and leaves
//! interpretation to the session manager in front of the store. Every
//! lifecycle transition (NONE -> IN -> COMMITTED/ABORTED) produces a new
//! value; nothing here mutates in place.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnStatus {
    None,
    In,
    Committed,
    Aborted,
}

/// Immutable marker of a multi-document transaction's identity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Txn {
    id: i64,
    status: TxnStatus,
}

impl Txn {
    pub fn new(id: i64, status: TxnStatus) -> Self {
        Self { id, status }
    }

    /// Sentinel for sessions whose backing store cannot or will not run
    /// multi-document transactions: id -1 with status NONE. Neither field
    /// alone implies the sentinel.
    pub fn not_supported() -> Self {
        Self::new(-1, TxnStatus::None)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn status(&self) -> TxnStatus {
        self.status
    }

    pub fn supports_txns(&self) -> bool {
        self.id == -1 && self.status == TxnStatus::None
    }
}

impl fmt::Display for Txn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.supports_txns() {
            write!(f, "Txn(status=NOT_SUPPORTED)")
        } else {
            write!(f, "Txn(id={}, status={:?})", self.id, self.status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_the_conjunction_of_both_fields() {
        assert!(Txn::new(-1, TxnStatus::None).supports_txns());
        assert!(!Txn::new(-1, TxnStatus::In).supports_txns());
        assert!(!Txn::new(7, TxnStatus::None).supports_txns());
        assert!(!Txn::new(7, TxnStatus::In).supports_txns());
    }

    #[test]
    fn not_supported_constructor_matches_sentinel() {
        assert_eq!(Txn::not_supported(), Txn::new(-1, TxnStatus::None));
        assert!(Txn::not_supported().supports_txns());
    }

    #[test]
    fn transitions_build_new_values() {
        let started = Txn::new(42, TxnStatus::In);
        let committed = Txn::new(started.id(), TxnStatus::Committed);
        assert_eq!(started.status(), TxnStatus::In);
        assert_eq!(committed.status(), TxnStatus::Committed);
        assert_eq!(started.id(), committed.id());
    }

    #[test]
    fn display_marks_the_sentinel() {
        assert_eq!(Txn::not_supported().to_string(), "Txn(status=NOT_SUPPORTED)");
        assert_eq!(
            Txn::new(3, TxnStatus::In).to_string(),
            "Txn(id=3, status=In)"
        );
    }
}
