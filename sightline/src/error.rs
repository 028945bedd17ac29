use sightline_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index already exists: {0}")]
    IndexAlreadyExists(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::IndexNotFound(name) => Error::IndexNotFound(name),
            StoreError::IndexAlreadyExists(name) => Error::IndexAlreadyExists(name),
            StoreError::Serialization(e) => Error::Json(e),
            StoreError::Config(msg) => Error::Config(msg),
            StoreError::Unavailable(msg) => Error::StoreUnavailable(msg),
            other @ StoreError::Http { .. } => Error::StoreUnavailable(other.to_string()),
        }
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::EntryNotFound(_) | Error::IndexNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let err: Error = StoreError::IndexNotFound("sightline".into()).into();
        assert!(matches!(err, Error::IndexNotFound(ref n) if n == "sightline"));

        let err: Error = StoreError::Http {
            status: 400,
            reason: "parsing_exception".into(),
        }
        .into();
        assert!(matches!(err, Error::StoreUnavailable(ref m) if m.contains("400")));

        let err: Error = StoreError::IndexAlreadyExists("x".into()).into();
        assert!(matches!(err, Error::IndexAlreadyExists(_)));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::EntryNotFound("u1".into()).is_not_found());
        assert!(!Error::MalformedDocument("no uuid".into()).is_not_found());
    }
}
