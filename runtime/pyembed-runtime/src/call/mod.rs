pub mod shim;
pub mod status;

pub use shim::{DescriptorCall, DirectCall, PlatformStrategy, StatusCalls, StatusEntry, StatusStrategy};
pub use status::{Status, StatusKind};
