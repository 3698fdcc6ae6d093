//! Error types for the Instagram downloader

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("Login required: {0}")]
    LoginRequired(String),

    #[error("Bad credentials: {0}")]
    BadCredentials(String),

    #[error("Two-factor authentication required")]
    TwoFactorRequired { identifier: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Forbidden (403): {0}")]
    Forbidden(String),

    #[error("Instagram API error: {0}")]
    ApiError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Session file not found: {0}")]
    SessionNotFound(String),

    #[error("Session is locked by another process")]
    SessionLocked,

    #[error("Failed to acquire session lock: {0}")]
    LockError(String),

    #[error("Encryption error: {0}")]
    CryptoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Interrupted by user")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that should slow the request rate down aggressively.
    pub fn is_rate_limit(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Forbidden(_) | Error::ConnectionError(_)
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::ProfileNotFound(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return Error::ConnectionError(err.to_string());
        }
        match err.status().map(|s| s.as_u16()) {
            Some(429) => Error::RateLimited(err.to_string()),
            Some(403) => Error::Forbidden(err.to_string()),
            Some(404) => Error::NotFound(err.to_string()),
            _ => Error::ApiError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_profile_not_found() {
        let err = Error::ProfileNotFound("natgeo".to_string());
        assert!(err.to_string().contains("Profile not found"));
        assert!(err.to_string().contains("natgeo"));
    }

    #[test]
    fn test_error_display_session_locked() {
        let err = Error::SessionLocked;
        assert!(err.to_string().contains("locked by another process"));
    }

    #[test]
    fn test_error_display_two_factor() {
        let err = Error::TwoFactorRequired {
            identifier: "abc".to_string(),
        };
        assert!(err.to_string().contains("Two-factor"));
    }

    #[test]
    fn rate_limit_classification() {
        assert!(Error::RateLimited("429".into()).is_rate_limit());
        assert!(Error::Forbidden("403".into()).is_rate_limit());
        assert!(Error::ConnectionError("reset".into()).is_rate_limit());
        assert!(!Error::NotFound("gone".into()).is_rate_limit());
        assert!(!Error::ApiError("boom".into()).is_rate_limit());
    }

    #[test]
    fn forbidden_is_singled_out() {
        assert!(Error::Forbidden("nope".into()).is_forbidden());
        assert!(!Error::RateLimited("slow down".into()).is_forbidden());
    }

    #[test]
    fn not_found_covers_profiles_and_media() {
        assert!(Error::NotFound("post".into()).is_not_found());
        assert!(Error::ProfileNotFound("user".into()).is_not_found());
        assert!(!Error::LoginRequired("stories".into()).is_not_found());
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_io_various_kinds() {
        let kinds = [
            std::io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::TimedOut,
        ];

        for kind in kinds {
            let io_err = std::io::Error::new(kind, "test");
            let err: Error = io_err.into();
            assert!(matches!(err, Error::IoError(_)));
        }
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();

        assert!(matches!(err, Error::SerializationError(_)));
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_from_serde_yaml() {
        let yaml_err = serde_yaml::from_str::<Vec<i32>>("{ invalid [").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_error_all_variants_debug() {
        let variants: Vec<Error> = vec![
            Error::InvalidUsername("u".to_string()),
            Error::ProfileNotFound("p".to_string()),
            Error::NotFound("n".to_string()),
            Error::LoginRequired("l".to_string()),
            Error::BadCredentials("b".to_string()),
            Error::RateLimited("r".to_string()),
            Error::Forbidden("f".to_string()),
            Error::ApiError("a".to_string()),
            Error::ConnectionError("c".to_string()),
            Error::SessionNotFound("s".to_string()),
            Error::SessionLocked,
            Error::LockError("lock".to_string()),
            Error::CryptoError("crypto".to_string()),
            Error::ConfigError("cfg".to_string()),
            Error::InvalidArgument("arg".to_string()),
            Error::SerializationError("serial".to_string()),
            Error::Interrupted,
        ];

        for err in variants {
            let debug_str = format!("{:?}", err);
            assert!(!debug_str.is_empty());
            assert!(!err.to_string().is_empty());
        }
    }
}
