use std::error::Error as StdError;

use diesel::result::{DatabaseErrorKind, Error as DieselError};

use crate::hn_client::HnClientError;

use super::types::{SourceErrorKind, SourceUnavailable, StoreUnavailable};

pub fn map_diesel_error(error: DieselError) -> StoreUnavailable {
    match error {
        DieselError::DatabaseError(kind, info) => match kind {
            DatabaseErrorKind::SerializationFailure
            | DatabaseErrorKind::ClosedConnection
            | DatabaseErrorKind::UnableToSendCommand => StoreUnavailable::retryable(format!(
                "transient database error ({kind:?}): {}",
                info.message()
            )),
            // SQLite reports a held write lock as an unclassified error.
            DatabaseErrorKind::Unknown if info.message().contains("database is locked") => {
                StoreUnavailable::retryable(format!("database is locked: {}", info.message()))
            }
            _ => StoreUnavailable::fatal(format!(
                "fatal database error ({kind:?}): {}",
                info.message()
            )),
        },
        DieselError::RollbackTransaction => {
            StoreUnavailable::retryable("transaction rollback requested by database")
        }
        DieselError::BrokenTransactionManager => {
            StoreUnavailable::fatal("transaction manager is in a broken state")
        }
        other => StoreUnavailable::fatal(format!("fatal diesel error: {other}")),
    }
}

pub fn map_hn_error(error: HnClientError) -> SourceUnavailable {
    match error {
        HnClientError::UnexpectedStatus { resource, status } => map_status(&resource, status),
        HnClientError::RequestError(req_err) => {
            if let Some(status) = req_err.status() {
                return map_status("item", status.as_u16());
            }

            let chain = render_error_chain(&req_err);
            tracing::debug!(
                event = "hn_request_error",
                is_timeout = req_err.is_timeout(),
                is_connect = req_err.is_connect(),
                is_decode = req_err.is_decode(),
                url = ?req_err.url().map(|url| url.as_str()),
                error_chain = %chain,
                "captured reqwest diagnostics"
            );

            if req_err.is_timeout()
                || req_err.is_connect()
                || req_err.is_request()
                || req_err.is_body()
                || req_err.is_decode()
            {
                SourceUnavailable::new(
                    SourceErrorKind::Network,
                    format!("network/transport error: {chain}"),
                )
            } else {
                SourceUnavailable::new(SourceErrorKind::Other, chain)
            }
        }
        HnClientError::JsonParseError(err) => SourceUnavailable::new(
            SourceErrorKind::MalformedResponse,
            format!("invalid JSON payload: {err}"),
        ),
        HnClientError::ParseError(message) => {
            SourceUnavailable::new(SourceErrorKind::MalformedResponse, message)
        }
        HnClientError::ConnectError(message) => {
            SourceUnavailable::new(SourceErrorKind::Network, message)
        }
    }
}

fn map_status(resource: &str, status: u16) -> SourceUnavailable {
    let (kind, message) = match status {
        401 => (
            SourceErrorKind::Unauthorized,
            format!("unauthorized while fetching {resource}"),
        ),
        403 => (
            SourceErrorKind::Forbidden,
            format!("forbidden while fetching {resource}"),
        ),
        429 => (
            SourceErrorKind::RateLimited,
            format!("rate limited while fetching {resource}"),
        ),
        500..=599 => (
            SourceErrorKind::UpstreamUnavailable,
            format!("upstream server error {status} while fetching {resource}"),
        ),
        _ => (
            SourceErrorKind::Other,
            format!("unexpected HTTP status {status} while fetching {resource}"),
        ),
    };
    SourceUnavailable::new(kind, message)
}

fn render_error_chain(error: &reqwest::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(next) = source {
        parts.push(next.to_string());
        source = next.source();
    }
    parts.join(" | caused_by: ")
}
