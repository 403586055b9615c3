use candle_core::Device;
use lexsearch_core::config::DevicePreference;
use lexsearch_embed::select_device;

#[test]
fn cpu_preference_selects_cpu() {
    assert!(matches!(select_device(DevicePreference::Cpu), Device::Cpu));
}

#[cfg(not(feature = "metal"))]
#[test]
fn metal_request_without_metal_support_falls_back_to_cpu() {
    assert!(matches!(select_device(DevicePreference::Metal), Device::Cpu));
    assert!(matches!(select_device(DevicePreference::Auto), Device::Cpu));
}
