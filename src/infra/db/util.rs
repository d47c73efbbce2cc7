use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db)
            if db.message().contains("canceling statement due to statement timeout")
                || db
                    .message()
                    .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::Database(db) if db.message().contains("invalid input syntax") => {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.message().contains("violates") => RepoError::Integrity {
            message: db.message().to_string(),
        },
        other => RepoError::from_persistence(other),
    }
}
