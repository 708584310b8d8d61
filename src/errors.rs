//! Mapping driver errors onto [`StageError`].
//!
//! | Source | Transient | Fatal |
//! |--------|-----------|-------|
//! | sqlx | I/O, TLS, pool timeout/closed, worker crash, SQLSTATE 08xxx / 57P0x / 40001 / 40P01 | everything else |
//! | reqwest | connect, timeout, request dropped mid-flight, body cut off | decode/builder errors |
//! | HTTP status | 429, 5xx | other 4xx |

use anyhow::anyhow;
use reqwest::StatusCode;

use movies_etl_core::StageError;

fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")
        || matches!(code, "57P01" | "57P02" | "57P03" | "40001" | "40P01" | "53300")
}

pub fn classify_sqlx(err: sqlx::Error) -> StageError {
    let transient = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|c| is_transient_sqlstate(&c)),
        _ => false,
    };
    if transient {
        StageError::transient(err)
    } else {
        StageError::fatal(err)
    }
}

pub fn classify_reqwest(err: reqwest::Error) -> StageError {
    if err.is_builder() {
        return StageError::fatal(err);
    }
    // `is_request` covers a connection closed or reset after sending.
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        return StageError::transient(err);
    }
    match err.status() {
        Some(status) if is_transient_status(status) => StageError::transient(err),
        _ => StageError::fatal(err),
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Classify a non-success HTTP response by status.
pub fn classify_status(status: StatusCode, body: &str) -> StageError {
    let err = anyhow!("Elasticsearch error {}: {}", status, body);
    if is_transient_status(status) {
        StageError::transient(err)
    } else {
        StageError::fatal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_transient() {
        let err = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(classify_sqlx(err).is_transient());
        assert!(classify_sqlx(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn query_errors_are_fatal() {
        assert!(!classify_sqlx(sqlx::Error::RowNotFound).is_transient());
        assert!(!classify_sqlx(sqlx::Error::ColumnNotFound("modified".into())).is_transient());
    }

    #[test]
    fn sqlstate_classes() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("57P01"));
        assert!(!is_transient_sqlstate("42P01"));
        assert!(!is_transient_sqlstate("23505"));
    }

    #[test]
    fn http_statuses() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        let err = classify_status(StatusCode::BAD_REQUEST, "mapper_parsing_exception");
        assert!(!err.is_transient());
        assert!(err.to_string().contains("mapper_parsing_exception"));
    }

    #[test]
    fn builder_errors_are_fatal() {
        let err = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        assert!(err.is_builder());
        assert!(!classify_reqwest(err).is_transient());
    }
}
