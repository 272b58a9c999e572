use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("policy parse error: {0}")]
    PolicyParse(String),

    /// A policy value outside its allowed range.
    #[error("policy validation error: {0}")]
    PolicyValidation(String),
}
