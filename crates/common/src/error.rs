use thiserror::Error;

#[derive(Debug, Error)]
pub enum TollgateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// The MAC primitive could not be initialised. Carries no detail so that
    /// key material can never end up in a log line.
    #[error("request signature could not be computed")]
    SignatureComputation,
}

pub type TollgateResult<T> = Result<T, TollgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_error_message_is_generic() {
        let msg = TollgateError::SignatureComputation.to_string();
        assert_eq!(msg, "request signature could not be computed");
    }

    #[test]
    fn unsupported_configuration_names_the_variant() {
        let err = TollgateError::UnsupportedConfiguration("algorithm 'leaky_bucket'".into());
        assert!(err.to_string().contains("leaky_bucket"));
    }
}
