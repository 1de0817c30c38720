use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconstructError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("color image is {actual_width}x{actual_height}, disparity map is {expected_width}x{expected_height}")]
    SizeMismatch {
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },
}
