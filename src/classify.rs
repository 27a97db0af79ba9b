//! Failure classification
//!
//! Turns whatever accompanies a failed job-creation or feed call into one
//! presentable string. Every function here is total: any input yields a message.

use crate::error::{Error, ErrorBody, ErrorDetail, RateLimitDetail};

/// Message shown when a failure carries nothing presentable
pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// Presentable message for a decoded `detail` payload
pub fn classify_detail(detail: &ErrorDetail) -> String {
    match detail {
        ErrorDetail::Message(msg) => msg.clone(),
        ErrorDetail::RateLimited(limit) => rate_limit_message(limit),
        ErrorDetail::Unrecognized(_) => FALLBACK_MESSAGE.to_string(),
    }
}

/// Presentable message for any crate error
///
/// Only errors that carry a server-supplied detail are shown verbatim;
/// transport failures, timeouts and undecodable bodies get the fallback.
pub fn classify_error(error: &Error) -> String {
    match error {
        Error::Api { detail, .. } => classify_detail(detail),
        _ => FALLBACK_MESSAGE.to_string(),
    }
}

/// Presentable message for a raw `detail` value
pub fn classify_value(value: &serde_json::Value) -> String {
    match serde_json::from_value::<ErrorDetail>(value.clone()) {
        Ok(detail) => classify_detail(&detail),
        Err(_) => FALLBACK_MESSAGE.to_string(),
    }
}

/// Presentable message for a raw failure body (`{"detail": ...}`)
pub fn classify_body(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(body) => classify_detail(&body.detail),
        Err(_) => FALLBACK_MESSAGE.to_string(),
    }
}

fn rate_limit_message(limit: &RateLimitDetail) -> String {
    format!(
        "{}. Hourly limit: {}/{}, daily limit: {}/{}",
        limit.error, limit.hourly_count, limit.hourly_limit, limit.daily_count, limit.daily_limit
    )
}
