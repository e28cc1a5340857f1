//! What the wrapper needs from the host application.

use std::path::PathBuf;

use crate::core::value::Device;

pub trait HostEnvironment: Send + Sync {
    /// Directory the host serves temporary preview files from.
    fn temp_directory(&self) -> PathBuf;

    /// Device node inputs should be placed on before the call.
    fn device(&self) -> Device {
        Device::Cpu
    }
}

/// A host backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalHost {
    temp_dir: PathBuf,
    device: Device,
}

impl Default for LocalHost {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("nodefunc"),
            device: Device::Cpu,
        }
    }
}

impl LocalHost {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            device: Device::Cpu,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

impl HostEnvironment for LocalHost {
    fn temp_directory(&self) -> PathBuf {
        self.temp_dir.clone()
    }

    fn device(&self) -> Device {
        self.device
    }
}
