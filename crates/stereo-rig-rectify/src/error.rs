use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RectifyError {
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("image is {actual_width}x{actual_height}, remap table expects {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },
}
