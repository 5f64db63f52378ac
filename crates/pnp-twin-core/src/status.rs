//! HTTP-like status codes used by property responses and acknowledgements.

/// Request succeeded
pub const OK: u16 = 200;
/// Request accepted for processing
pub const ACCEPTED: u16 = 202;
/// Request succeeded with no response body
pub const NO_CONTENT: u16 = 204;
/// Request was malformed
pub const BAD_REQUEST: u16 = 400;
/// Target does not exist
pub const NOT_FOUND: u16 = 404;
/// Request was throttled
pub const TOO_MANY_REQUESTS: u16 = 429;
/// Service-side failure
pub const SERVER_ERROR: u16 = 500;

/// Whether `status` is in the 2xx range.
#[must_use]
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
