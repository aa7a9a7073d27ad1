//! Accelerator detection and device selection
//!
//! Models run on a compute accelerator when one is usable by this build,
//! otherwise on the CPU. Detection runs once per process.

use candle::Device;
use serde::Serialize;
use std::sync::OnceLock;

/// Cached accelerator information detected at startup
static ACCELERATOR_INFO: OnceLock<AcceleratorInfo> = OnceLock::new();

/// Which accelerator backends are usable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcceleratorInfo {
    pub cuda: bool,
    pub metal: bool,
}

impl AcceleratorInfo {
    /// True if any accelerator is usable
    pub fn is_available(&self) -> bool {
        self.cuda || self.metal
    }

    /// Pick the device a model is placed on
    ///
    /// Falls back to the CPU if the accelerator fails to initialize.
    pub fn select_device(&self) -> Device {
        if self.cuda {
            match Device::new_cuda(0) {
                Ok(device) => return device,
                Err(e) => {
                    tracing::warn!(error = %e, "CUDA device init failed, using CPU");
                }
            }
        }

        if self.metal {
            match Device::new_metal(0) {
                Ok(device) => return device,
                Err(e) => {
                    tracing::warn!(error = %e, "Metal device init failed, using CPU");
                }
            }
        }

        Device::Cpu
    }
}

/// Detect accelerators compiled into and visible to candle
pub fn detect_accelerator() -> AcceleratorInfo {
    let info = AcceleratorInfo {
        cuda: candle::utils::cuda_is_available(),
        metal: candle::utils::metal_is_available(),
    };

    tracing::info!(
        cuda = info.cuda,
        metal = info.metal,
        "Detected accelerator support"
    );

    info
}

/// Get cached accelerator info, or detect if not initialized
pub fn get_or_init() -> &'static AcceleratorInfo {
    ACCELERATOR_INFO.get_or_init(detect_accelerator)
}

/// Label used in logs for the selected device
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
