pub mod artifact;
pub mod backend;
pub mod features;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use features::*;
pub use tensor::*;
