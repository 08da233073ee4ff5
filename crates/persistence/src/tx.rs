use domain::RepositoryError;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

use crate::errors::classify;

pub type PgTransaction = Transaction<'static, Postgres>;

/// Open the outermost transaction for an aggregate operation.
pub async fn begin(pool: &PgPool) -> Result<PgTransaction, RepositoryError> {
    pool.begin().await.map_err(classify)
}

/// Commit when every nested operation succeeded, otherwise roll back and
/// return the classified original error.
///
/// A failed rollback is logged and does not replace the original error.
pub async fn finish<T>(
    tx: PgTransaction,
    result: Result<T, sqlx::Error>,
) -> Result<T, RepositoryError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(classify)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(classify(err))
        }
    }
}
