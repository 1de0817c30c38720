use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("invalid matcher configuration: {0}")]
    Configuration(String),
    #[error("left image is {left_width}x{left_height}, right image is {right_width}x{right_height}")]
    SizeMismatch {
        left_width: usize,
        left_height: usize,
        right_width: usize,
        right_height: usize,
    },
}
