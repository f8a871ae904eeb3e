pub mod dtype;
pub mod kind;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::StitchError;

pub use kind::OpKind;

/// A named tensor as it appears in the wire format. Keys this crate does not interpret
/// (`format`, `param_type`, ...) are carried in `extra` so records round-trip unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub tensor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TensorDesc {
    pub fn new(name: &str, shape: &[i64], data_type: &str) -> Self {
        let tensor_name = name.to_string();
        Self { tensor_name, shape: Some(shape.to_vec()), data_type: Some(data_type.to_string()), extra: Map::new() }
    }

    pub fn shape(&self) -> &[i64] {
        self.shape.as_deref().unwrap_or_default()
    }

    pub fn data_type(&self) -> &str {
        self.data_type.as_deref().unwrap_or_default()
    }
}

/// Tells a key given as `null` (`Some(None)` for optional payloads) apart from a missing one (`None`).
fn present<'de, D: Deserializer<'de>, T: Deserialize<'de>>(deserializer: D) -> Result<Option<T>, D::Error> {
    T::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiteralDesc {
    #[serde(flatten)]
    pub desc: TensorDesc,
    pub value: Value,
}

/// An op operand: a descriptor is a literal exactly when it carries a `value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputDesc {
    Literal(LiteralDesc),
    Tensor(TensorDesc),
}

impl InputDesc {
    pub fn name(&self) -> &str {
        match self {
            Self::Literal(literal) => &literal.desc.tensor_name,
            Self::Tensor(tensor) => &tensor.tensor_name,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorDesc> {
        match self {
            Self::Tensor(tensor) => Some(tensor),
            Self::Literal(_) => None,
        }
    }
}

impl From<TensorDesc> for InputDesc {
    fn from(value: TensorDesc) -> Self {
        Self::Tensor(value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttrDesc {
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    pub name: String,
    #[serde(default)]
    pub input_desc: Vec<Vec<InputDesc>>,
    #[serde(default)]
    pub output_desc: Vec<TensorDesc>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub attr: Option<Option<Vec<AttrDesc>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OpDesc {
    pub fn kind(&self) -> OpKind {
        OpKind::of(self)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputDesc> {
        self.input_desc.iter().flatten()
    }

    pub fn tensor_inputs(&self) -> impl Iterator<Item = &TensorDesc> {
        self.inputs().filter_map(InputDesc::as_tensor)
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attr.iter().flatten().flatten().find(|attr| attr.name == name).map(|attr| &attr.value)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferStitch {
    #[serde(default)]
    pub stitch_op: Vec<Vec<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub sub_block_size: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The merged description of a fused kernel, as handed over by the graph-kernel fusion pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelDesc {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub input_desc: Vec<Vec<TensorDesc>>,
    #[serde(default)]
    pub output_desc: Vec<TensorDesc>,
    #[serde(default)]
    pub op_desc: Vec<OpDesc>,
    #[serde(default)]
    pub buffer_stitch: BufferStitch,
    #[serde(default)]
    pub process: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub composite_graph: Value,
    #[serde(default)]
    pub id: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KernelDesc {
    pub fn from_json(json: &str) -> Result<Self, StitchError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, StitchError> {
        Ok(serde_json::to_string(self)?)
    }

    /// First tensor of every input group.
    pub fn input_names(&self) -> Vec<String> {
        self.input_desc.iter().filter_map(|group| group.first()).map(|tensor| tensor.tensor_name.clone()).collect()
    }

    pub fn output_names(&self) -> Vec<String> {
        self.output_desc.iter().map(|tensor| tensor.tensor_name.clone()).collect()
    }

    pub fn stitch_names(&self) -> Vec<String> {
        self.buffer_stitch.stitch_op.iter().flatten().cloned().collect()
    }
}

/// A self-contained sub-kernel cut out of a merged description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubKernelDesc {
    pub composite: bool,
    pub composite_graph: Value,
    pub id: Value,
    pub op: String,
    pub input_desc: Vec<Vec<TensorDesc>>,
    pub op_desc: Vec<OpDesc>,
    pub output_desc: Vec<TensorDesc>,
    pub platform: String,
    pub process: String,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub blocksize: Option<Value>,
}

impl SubKernelDesc {
    pub fn to_json(&self) -> Result<String, StitchError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.input_desc.iter().flatten().map(|tensor| tensor.tensor_name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.output_desc.iter().map(|tensor| tensor.tensor_name.as_str()).collect()
    }
}
