use super::TensorDesc;
use crate::error::StitchError;

/// Width in bytes of a wire-format data type. Unknown types are treated as single bytes.
pub fn type_bytes(data_type: &str) -> i64 {
    match data_type {
        "float64" | "int64" | "uint64" => 8,
        "float32" | "int32" | "uint32" => 4,
        "float16" | "bfloat16" | "int16" | "uint16" => 2,
        _ => 1,
    }
}

impl TensorDesc {
    /// Bytes needed to materialise this tensor. Scalars and attribute-only outputs
    /// without a shape or dtype occupy a single unit. Dynamic (negative) dims cannot be sized.
    pub fn byte_size(&self) -> Result<i64, StitchError> {
        let (shape, data_type) = (self.shape(), self.data_type());

        if shape.is_empty() || data_type.is_empty() {
            return Ok(1);
        }

        shape
            .iter()
            .try_fold(type_bytes(data_type), |size, &dim| if dim < 0 { None } else { size.checked_mul(dim) })
            .ok_or_else(|| StitchError::InvalidShape(self.tensor_name.clone()))
    }
}
