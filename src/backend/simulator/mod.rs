mod device;
mod input;
mod space;

pub use device::SimGpuDevice;
pub use input::SimSources;
pub use space::{SimHolographicSpace, SimParams};
