//! The subset of `onnx.proto` needed to rewrite graphs and their initializers.

/// `TensorProto.DataType` values.
pub mod data_type {
    pub const FLOAT: i32 = 1;
    pub const UINT8: i32 = 2;
    pub const INT8: i32 = 3;
    pub const INT32: i32 = 6;
    pub const INT64: i32 = 7;
    pub const DOUBLE: i32 = 11;
}

/// `TensorProto.DataLocation` values.
pub mod data_location {
    pub const DEFAULT: i32 = 0;
    pub const EXTERNAL: i32 = 1;
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ModelProto {
    #[prost(int64, optional, tag = "1")]
    pub ir_version: Option<i64>,

    #[prost(message, repeated, tag = "8")]
    pub opset_import: Vec<OperatorSetIdProto>,

    #[prost(string, optional, tag = "2")]
    pub producer_name: Option<String>,

    #[prost(string, optional, tag = "3")]
    pub producer_version: Option<String>,

    #[prost(string, optional, tag = "4")]
    pub domain: Option<String>,

    #[prost(int64, optional, tag = "5")]
    pub model_version: Option<i64>,

    #[prost(string, optional, tag = "6")]
    pub doc_string: Option<String>,

    #[prost(message, optional, tag = "7")]
    pub graph: Option<GraphProto>,

    #[prost(message, repeated, tag = "14")]
    pub metadata_props: Vec<StringStringEntryProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OperatorSetIdProto {
    #[prost(string, optional, tag = "1")]
    pub domain: Option<String>,

    #[prost(int64, optional, tag = "2")]
    pub version: Option<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StringStringEntryProto {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,

    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GraphProto {
    /// Topologically sorted.
    #[prost(message, repeated, tag = "1")]
    pub node: Vec<NodeProto>,

    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,

    #[prost(message, repeated, tag = "5")]
    pub initializer: Vec<TensorProto>,

    #[prost(string, optional, tag = "10")]
    pub doc_string: Option<String>,

    #[prost(message, repeated, tag = "11")]
    pub input: Vec<ValueInfoProto>,

    #[prost(message, repeated, tag = "12")]
    pub output: Vec<ValueInfoProto>,

    #[prost(message, repeated, tag = "13")]
    pub value_info: Vec<ValueInfoProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct NodeProto {
    #[prost(string, repeated, tag = "1")]
    pub input: Vec<String>,

    #[prost(string, repeated, tag = "2")]
    pub output: Vec<String>,

    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,

    #[prost(string, optional, tag = "4")]
    pub op_type: Option<String>,

    #[prost(string, optional, tag = "7")]
    pub domain: Option<String>,

    #[prost(message, repeated, tag = "5")]
    pub attribute: Vec<AttributeProto>,

    #[prost(string, optional, tag = "6")]
    pub doc_string: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AttributeProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    #[prost(string, optional, tag = "21")]
    pub ref_attr_name: Option<String>,

    #[prost(string, optional, tag = "13")]
    pub doc_string: Option<String>,

    /// `AttributeProto.AttributeType`.
    #[prost(int32, optional, tag = "20")]
    pub r#type: Option<i32>,

    #[prost(float, optional, tag = "2")]
    pub f: Option<f32>,

    #[prost(int64, optional, tag = "3")]
    pub i: Option<i64>,

    #[prost(bytes = "vec", optional, tag = "4")]
    pub s: Option<Vec<u8>>,

    #[prost(message, optional, tag = "5")]
    pub t: Option<TensorProto>,

    #[prost(message, optional, boxed, tag = "6")]
    pub g: Option<Box<GraphProto>>,

    #[prost(float, repeated, packed = "false", tag = "7")]
    pub floats: Vec<f32>,

    #[prost(int64, repeated, packed = "false", tag = "8")]
    pub ints: Vec<i64>,

    #[prost(bytes = "vec", repeated, tag = "9")]
    pub strings: Vec<Vec<u8>>,

    #[prost(message, repeated, tag = "10")]
    pub tensors: Vec<TensorProto>,

    #[prost(message, repeated, tag = "11")]
    pub graphs: Vec<GraphProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TensorProto {
    #[prost(int64, repeated, packed = "false", tag = "1")]
    pub dims: Vec<i64>,

    /// `TensorProto.DataType`.
    #[prost(int32, optional, tag = "2")]
    pub data_type: Option<i32>,

    #[prost(float, repeated, tag = "4")]
    pub float_data: Vec<f32>,

    #[prost(int32, repeated, tag = "5")]
    pub int32_data: Vec<i32>,

    #[prost(bytes = "vec", repeated, tag = "6")]
    pub string_data: Vec<Vec<u8>>,

    #[prost(int64, repeated, tag = "7")]
    pub int64_data: Vec<i64>,

    #[prost(string, optional, tag = "8")]
    pub name: Option<String>,

    #[prost(string, optional, tag = "12")]
    pub doc_string: Option<String>,

    #[prost(bytes = "vec", optional, tag = "9")]
    pub raw_data: Option<Vec<u8>>,

    /// `TensorProto.DataLocation`.
    #[prost(int32, optional, tag = "14")]
    pub data_location: Option<i32>,

    #[prost(double, repeated, tag = "10")]
    pub double_data: Vec<f64>,

    #[prost(uint64, repeated, tag = "11")]
    pub uint64_data: Vec<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ValueInfoProto {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,

    #[prost(message, optional, tag = "2")]
    pub r#type: Option<TypeProto>,

    #[prost(string, optional, tag = "3")]
    pub doc_string: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TypeProto {
    #[prost(oneof = "type_proto::Value", tags = "1")]
    pub value: Option<type_proto::Value>,

    #[prost(string, optional, tag = "6")]
    pub denotation: Option<String>,
}

pub mod type_proto {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        TensorType(Tensor),
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Tensor {
        /// `TensorProto.DataType`.
        #[prost(int32, optional, tag = "1")]
        pub elem_type: Option<i32>,

        #[prost(message, optional, tag = "2")]
        pub shape: Option<super::TensorShapeProto>,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TensorShapeProto {
    #[prost(message, repeated, tag = "1")]
    pub dim: Vec<tensor_shape_proto::Dimension>,
}

pub mod tensor_shape_proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Dimension {
        #[prost(oneof = "dimension::Value", tags = "1, 2")]
        pub value: Option<dimension::Value>,

        #[prost(string, optional, tag = "3")]
        pub denotation: Option<String>,
    }

    pub mod dimension {
        #[derive(Clone, PartialEq, prost::Oneof)]
        pub enum Value {
            #[prost(int64, tag = "1")]
            DimValue(i64),
            #[prost(string, tag = "2")]
            DimParam(String),
        }
    }
}

impl TensorProto {
    pub fn is_float(&self) -> bool {
        self.data_type == Some(data_type::FLOAT)
    }

    pub fn is_external(&self) -> bool {
        self.data_location == Some(data_location::EXTERNAL)
    }
}

impl ValueInfoProto {
    pub fn tensor_type(&self) -> Option<&type_proto::Tensor> {
        match self.r#type.as_ref()?.value.as_ref()? {
            type_proto::Value::TensorType(t) => Some(t),
        }
    }

    /// Declared dimensions; symbolic or unknown axes are `None`. The outer
    /// `None` means the value has no tensor shape at all.
    pub fn dims(&self) -> Option<Vec<Option<usize>>> {
        let shape = self.tensor_type()?.shape.as_ref()?;
        Some(
            shape
                .dim
                .iter()
                .map(|d| match d.value {
                    Some(tensor_shape_proto::dimension::Value::DimValue(v)) if v >= 0 => {
                        Some(v as usize)
                    }
                    _ => None,
                })
                .collect(),
        )
    }
}

