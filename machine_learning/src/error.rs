use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    DuplicateParam {
        name: String,
    },
    AmbiguousGroup {
        name: String,
    },
    UntaggedParam {
        name: String,
    },
    UnexpectedTag {
        name: String,
    },
    PartitionMismatch {
        grouped: usize,
        expected: usize,
    },
    MissingGradient {
        name: String,
    },
    MissingForwardPass {
        layer: &'static str,
    },
    EmptySchedule,
    InvalidInit(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => format!("There's a size mismatch in {what}, got {got} and expected {expected}"),
            MlErr::Shape(e) => format!("Invalid tensor shape: {e}"),
            MlErr::DuplicateParam { name } => {
                format!("A parameter named '{name}' is already registered")
            }
            MlErr::AmbiguousGroup { name } => format!(
                "The parameter '{name}' matches both the head and the first layer naming markers"
            ),
            MlErr::UntaggedParam { name } => {
                format!("The trainable parameter '{name}' has no variable group")
            }
            MlErr::UnexpectedTag { name } => format!(
                "The parameter '{name}' carries a variable group but is not optimized"
            ),
            MlErr::PartitionMismatch { grouped, expected } => format!(
                "The variable groups hold {grouped} parameters but {expected} are trainable"
            ),
            MlErr::MissingGradient { name } => {
                format!("The backward pass produced no gradient for '{name}'")
            }
            MlErr::MissingForwardPass { layer } => {
                format!("Tried to run the backward pass of a {layer} layer before its forward pass")
            }
            MlErr::EmptySchedule => {
                "The learning rate schedule needs at least one training step".to_string()
            }
            MlErr::InvalidInit(msg) => format!("Failed to initialize parameters: {msg}"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
