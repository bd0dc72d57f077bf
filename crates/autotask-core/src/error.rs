use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutotaskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}

pub type Result<T> = std::result::Result<T, AutotaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_names_its_cause() {
        for err in [
            AutotaskError::Config("missing file".into()),
            AutotaskError::InvalidTimestamp("yesterday".into()),
            AutotaskError::InvalidDuration("too long".into()),
        ] {
            let kind = match &err {
                AutotaskError::Config(_) => "Configuration",
                AutotaskError::InvalidTimestamp(_) => "Invalid timestamp",
                AutotaskError::InvalidDuration(_) => "Invalid duration",
            };
            assert!(err.to_string().starts_with(kind), "{err}");
        }
    }
}
