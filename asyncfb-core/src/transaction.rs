//! Transaction configuration types
//!
//! More info about transactions in firebird:
//! https://firebirdsql.org/file/documentation/html/en/refdocs/fblangref30/firebird-30-language-reference.html#fblangref30-transacs

/// Transaction isolation level
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TrIsolationLevel {
    /// Transactions can't see alterations commited after they started
    Concurrency,
    /// Table locking
    Consistency,
    /// Transactions can see alterations commited after they started
    ReadCommitted,
}

impl Default for TrIsolationLevel {
    fn default() -> Self {
        Self::Concurrency
    }
}

/// Lock resolution modes
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TrLockResolution {
    /// A conflict immediately raises an error on the waiting transaction
    NoWait,
    /// The transaction waits until the other transaction has finished
    Wait,
}

impl Default for TrLockResolution {
    fn default() -> Self {
        Self::Wait
    }
}

/// Data access mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TrAccessMode {
    /// Reads and data updates can run in the context of this transaction
    Write,
    /// Only select operations can run in the context of this transaction
    Read,
}

impl Default for TrAccessMode {
    fn default() -> Self {
        Self::Write
    }
}

/// Table reservation modes, declared before the transaction starts
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TrReservation {
    SharedRead,
    ProtectedRead,
    SharedWrite,
    ProtectedWrite,
}

/// Commit / Rollback operations
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TrOp {
    Commit,
    CommitRetaining,
    Rollback,
}

/// Parameters of a new transaction
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct TransactionConfiguration {
    pub access: TrAccessMode,
    pub isolation: TrIsolationLevel,
    pub lock_resolution: TrLockResolution,
    /// `(table, mode)` pairs reserved when the transaction starts
    pub reservations: Vec<(String, TrReservation)>,
}

impl TransactionConfiguration {
    pub fn read_only() -> Self {
        TransactionConfiguration {
            access: TrAccessMode::Read,
            ..Default::default()
        }
    }
}
