pub mod bench;
mod device;
mod error;
mod precision;
pub mod report;
pub mod tensor;
pub mod timer;

pub use device::{backend_version, select_device, Device};
pub use error::{Error, Result};
pub use precision::{resolve_precisions, Precision, PrecisionFlags, PrecisionSupport};
pub use tensor::{Tensor, Tensor2D};
