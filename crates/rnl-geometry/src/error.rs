use thiserror::Error;

pub type GeometryResult<T> = Result<T, GeometryError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Cut should result in 2 polygons, not {pieces}")]
    SplitFailed { pieces: usize },

    #[error("Cut-line crosses the polygon boundary {found} times, expected 2")]
    CutLineCrossings { found: usize },

    #[error("Cut-line does not intersect any polygon")]
    NoIntersection,

    #[error("Empty geometry: {what}")]
    Empty { what: &'static str },

    #[error("Invalid WKT: {message}")]
    InvalidWkt { message: String },

    #[error("Unsupported geometry type {found}, expected {expected}")]
    UnsupportedType {
        found: String,
        expected: &'static str,
    },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },
}
