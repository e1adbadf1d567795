//! Response validation.
//!
//! Each check inspects an [`Outcome`] against what the virtual user knows should be
//! true and returns `Err(reason)` on failure. A transport error always fails with a
//! reason starting with `transport:`.
//!
//! The one deliberate asymmetry: a plain read treats `404` as success (the id may
//! simply never have been written), while a read issued right after the same user's
//! write treats `404` as failure. That second check is the contention probe.

use serde::Deserialize;

use crate::{request::Outcome, resource::ResourceId};

/// Result of validating one or more outcomes.
pub type Check = Result<(), String>;

pub const MALFORMED_BODY: &str = "malformed body";
pub const EXPECTED_EXISTENCE: &str = "expected existence after write";

#[derive(Deserialize)]
struct IdentifiedBody {
    product_id: Option<i64>,
}

fn status_of(outcome: &Outcome) -> Result<u16, String> {
    if let Some(err) = &outcome.transport_error {
        return Err(format!("transport: {err}"));
    }
    outcome
        .status
        .ok_or_else(|| "transport: no status received".to_string())
}

/// A write is acknowledged with `204 No Content`.
pub fn validate_write(outcome: &Outcome) -> Check {
    match status_of(outcome)? {
        204 => Ok(()),
        status => Err(format!("expected 204, got {status}")),
    }
}

/// A read returns the requested record, or `404` if it was never written.
pub fn validate_read(outcome: &Outcome, expected: ResourceId) -> Check {
    match status_of(outcome)? {
        200 => {
            let body: IdentifiedBody =
                serde_json::from_slice(&outcome.body).map_err(|_| MALFORMED_BODY.to_string())?;
            match body.product_id {
                Some(id) if id == i64::from(expected) => Ok(()),
                Some(id) => Err(format!(
                    "identifier mismatch: expected {expected}, got {id}"
                )),
                None => Err(format!(
                    "identifier mismatch: expected {expected}, got none"
                )),
            }
        }
        404 => Ok(()),
        status => Err(format!("unexpected status: {status}")),
    }
}

/// The read that immediately follows this user's own successful write must find the
/// record.
pub fn validate_read_after_write(read: &Outcome) -> Check {
    match status_of(read)? {
        200 => Ok(()),
        404 => Err(format!("{EXPECTED_EXISTENCE}: got 404")),
        status => Err(format!("read after write failed: {status}")),
    }
}

pub fn validate_health(outcome: &Outcome) -> Check {
    match status_of(outcome)? {
        200 => Ok(()),
        status => Err(format!("health check failed: {status}")),
    }
}
