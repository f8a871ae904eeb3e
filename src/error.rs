use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum StitchError {
    NoStitchGroups,
    BufferNotFound(String),
    UnsizedBuffer(String),
    MissingAlias(String),
    InvalidShape(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStitchGroups => write!(f, "buffer_stitch.stitch_op has no stitch tensors"),
            Self::BufferNotFound(name) => write!(f, "tracked buffer `{name}` does not appear in any op"),
            Self::UnsizedBuffer(name) => write!(f, "tracked buffer `{name}` was not reached by any subgraph"),
            Self::MissingAlias(name) => write!(f, "fake output `{name}` has no in-place assign source"),
            Self::InvalidShape(name) => write!(f, "buffer `{name}` has a dynamic or overflowing shape"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StitchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for StitchError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StitchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
