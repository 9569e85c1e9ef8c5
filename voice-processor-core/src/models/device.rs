/// How an audio device is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Hardware,
    Virtual,
}

/// An audio input device the session can open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub is_default: bool,
    /// Sample rates the device reports it can open natively. Empty if unknown.
    pub supported_sample_rates: Vec<u32>,
}
