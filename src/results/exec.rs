use crate::error::RdbmsError;

/// Outcome of a statement executed for its side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Generated id, when the driver reports one.
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    #[must_use]
    pub fn new(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }

    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// The driver-reported id of the inserted row.
    ///
    /// # Errors
    /// Returns [`RdbmsError::NoInsertId`] if the driver did not report one.
    pub fn last_insert_id(&self) -> Result<i64, RdbmsError> {
        self.last_insert_id.ok_or(RdbmsError::NoInsertId)
    }
}
