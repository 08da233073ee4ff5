use domain::RepositoryError;

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const NOT_NULL_VIOLATION: &str = "23502";

/// Map a store-native error onto the repository taxonomy.
///
/// Only constraint violations are treated as rejections of the data; every
/// other failure (connectivity, pool timeout, deadlock, decoding) is internal.
pub fn classify(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound("no rows in result set".to_string()),
        sqlx::Error::Database(db) => {
            let detail = match db.constraint() {
                Some(constraint) => format!("{} ({})", db.message(), constraint),
                None => db.message().to_string(),
            };
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => RepositoryError::AlreadyExists(detail),
                Some(CHECK_VIOLATION) => RepositoryError::Validation(detail),
                Some(NOT_NULL_VIOLATION) => RepositoryError::MissingField(detail),
                _ => RepositoryError::InternalFailure(detail),
            }
        }
        other => RepositoryError::InternalFailure(other.to_string()),
    }
}
