//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use playlist_import_core::application::AuthError;
use playlist_import_core::error::AppError;
use serde::Serialize;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const UNAUTHENTICATED: i32 = 4004;
    pub const INVALID_TOKEN: i32 = 4005;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const QUEUE_ERROR: i32 = 5001;
    pub const AUTH_MISCONFIGURED: i32 = 5003;
}

/// Attached to auth errors so HTTP-minded callers get the equivalent status
#[derive(Debug, Serialize)]
struct HttpStatus {
    http_status: u16,
}

pub fn auth_code(err: &AuthError) -> i32 {
    match err {
        AuthError::Misconfigured => code::AUTH_MISCONFIGURED,
        AuthError::Unauthenticated => code::UNAUTHENTICATED,
        AuthError::InvalidToken => code::INVALID_TOKEN,
    }
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, msg, None::<()>)
        }
        AppError::NotFound(msg) => ErrorObjectOwned::owned(code::NOT_FOUND, msg, None::<()>),
        AppError::Auth(e) => ErrorObjectOwned::owned(
            auth_code(&e),
            e.to_string(),
            Some(HttpStatus {
                http_status: e.status_code(),
            }),
        ),
        AppError::Queue(e) => ErrorObjectOwned::owned(code::QUEUE_ERROR, e.to_string(), None::<()>),
        AppError::Internal(msg) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, msg, None::<()>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playlist_import_core::port::QueueError;

    #[test]
    fn test_auth_errors_have_distinct_codes() {
        let missing = to_rpc_error(AppError::Auth(AuthError::Unauthenticated));
        let wrong = to_rpc_error(AppError::Auth(AuthError::InvalidToken));
        let misconfigured = to_rpc_error(AppError::Auth(AuthError::Misconfigured));

        assert_eq!(missing.code(), code::UNAUTHENTICATED);
        assert_eq!(wrong.code(), code::INVALID_TOKEN);
        assert_eq!(misconfigured.code(), code::AUTH_MISCONFIGURED);

        let data: serde_json::Value =
            serde_json::from_str(wrong.data().unwrap().get()).unwrap();
        assert_eq!(data["http_status"], 403);
    }

    #[test]
    fn test_other_mappings() {
        assert_eq!(
            to_rpc_error(AppError::Validation("bad".into())).code(),
            code::VALIDATION_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::NotFound("job".into())).code(),
            code::NOT_FOUND
        );
        assert_eq!(
            to_rpc_error(AppError::Queue(QueueError::Closed)).code(),
            code::QUEUE_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::Internal("worker task failed".into())).code(),
            code::INTERNAL_ERROR
        );
    }
}
