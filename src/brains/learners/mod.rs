use candle_core::Device;

use crate::tb::TbWriter;

pub mod maddpg;
pub mod utils;

lazy_static::lazy_static! {
    /// Selected once per process: CUDA device 0 when built with the `cuda`
    /// feature and a device is present, otherwise the CPU.
    pub static ref DEVICE: Device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
}

pub trait Status {
    fn log(&self, writer: &mut TbWriter, step: usize);
}
