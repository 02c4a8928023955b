use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Invalid {kind} id: {value} (ids start at 1)")]
    InvalidId { kind: &'static str, value: i64 },

    #[error("Id overflow: {kind} {base} + {offset}")]
    IdOverflow {
        kind: &'static str,
        base: u32,
        offset: i64,
    },
}
