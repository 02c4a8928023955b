use thiserror::Error;

pub type RasterResult<T> = Result<T, RasterError>;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid ASCII grid at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Raster shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("No valid raster cells for {what}")]
    EmptySample { what: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },
}
