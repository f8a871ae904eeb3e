use serde_json::Value;

use super::OpDesc;

pub const INPLACE_ASSIGN: &str = "InplaceAssign";
pub const FAKE_OUTPUT: &str = "fake_output";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// Aggregates over one or more axes. Its output is never aliased onto another buffer.
    Reduce,
    /// Writes its second operand into the first. A `fake_output` only orders the write.
    InplaceAssign { fake_output: bool },
    Compute,
}

impl OpKind {
    pub fn of(op: &OpDesc) -> Self {
        if op.name == INPLACE_ASSIGN {
            let fake_output = matches!(op.attr(FAKE_OUTPUT), Some(Value::Bool(true)))
                || op.attr(FAKE_OUTPUT).and_then(Value::as_i64) == Some(1);

            Self::InplaceAssign { fake_output }
        } else if op.name.starts_with("Reduce") {
            Self::Reduce
        } else {
            Self::Compute
        }
    }

    pub fn is_reduce(self) -> bool {
        self == Self::Reduce
    }
}
