pub mod analysis_tap;
pub mod capture_device;
pub mod loopback_delegate;
pub mod playback_device;
pub mod snapshot_sink;
