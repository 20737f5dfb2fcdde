//! Protobuf messages read and written by the engine binding.
//!
//! Only the fields the tools touch are declared. Unknown fields are dropped on
//! decode, so models relying on local functions or external tensor data are not
//! round-tripped.

pub mod caffe;
pub mod onnx;
