//! Maps the configured [`DevicePreference`] onto a candle [`Device`].

use candle_core::Device;
use tracing::{info, warn};

use lexsearch_core::config::DevicePreference;

/// Device for `preference`. Falls back to CPU when Metal is unavailable; an
/// explicit Metal request that cannot be met is logged as a warning.
pub fn select_device(preference: DevicePreference) -> Device {
    if preference == DevicePreference::Cpu {
        info!("device: CPU (configured)");
        return Device::Cpu;
    }
    match metal_device() {
        Some(dev) => {
            info!("device: Metal (MPS)");
            dev
        }
        None => {
            if preference == DevicePreference::Metal {
                warn!("Metal requested but unavailable; embedding on CPU");
            } else {
                info!("device: CPU");
            }
            Device::Cpu
        }
    }
}

#[cfg(feature = "metal")]
fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(dev) => Some(dev),
        Err(e) => {
            warn!(error = %e, "opening Metal device failed");
            None
        }
    }
}

#[cfg(not(feature = "metal"))]
fn metal_device() -> Option<Device> { None }
