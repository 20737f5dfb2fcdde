//! `BlobProto` as written by Caffe's `.binaryproto` mean files.

#[derive(Clone, PartialEq, prost::Message)]
pub struct BlobShape {
    #[prost(int64, repeated, tag = "1")]
    pub dim: Vec<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BlobProto {
    #[prost(message, optional, tag = "7")]
    pub shape: Option<BlobShape>,

    #[prost(float, repeated, tag = "5")]
    pub data: Vec<f32>,

    #[prost(float, repeated, tag = "6")]
    pub diff: Vec<f32>,

    #[prost(double, repeated, tag = "8")]
    pub double_data: Vec<f64>,

    #[prost(double, repeated, tag = "9")]
    pub double_diff: Vec<f64>,

    // 4-d legacy dimensions, used when `shape` is absent.
    #[prost(int32, optional, tag = "1")]
    pub num: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub channels: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub height: Option<i32>,
    #[prost(int32, optional, tag = "4")]
    pub width: Option<i32>,
}

impl BlobProto {
    /// Dimensions from `shape`, falling back to the legacy fields.
    pub fn dims(&self) -> Vec<i64> {
        match &self.shape {
            Some(shape) => shape.dim.clone(),
            None => [self.num, self.channels, self.height, self.width]
                .iter()
                .map(|d| i64::from(d.unwrap_or(0)))
                .collect(),
        }
    }
}
