use std::{
    error::Error,
    fmt::{self, Display},
};

/// Returned whenever a flat parameter or gradient buffer doesn't match the size the layers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeMismatchErr {
    pub got: usize,
    pub expected: usize,
}

impl SizeMismatchErr {
    pub fn new(got: usize, expected: usize) -> Self {
        Self { got, expected }
    }
}

impl Display for SizeMismatchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the buffer holds {} values but the layers need {}",
            self.got, self.expected
        )
    }
}

impl Error for SizeMismatchErr {}
