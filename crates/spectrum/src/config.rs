//! Machine configuration.

/// Construction-time configuration for a [`crate::Spectrum`].
pub struct SpectrumConfig {
    /// ROM image loaded at $0000 (16 KiB for the 48K machine; shorter
    /// images are allowed for test fixtures).
    pub rom: Vec<u8>,
    /// Whether a Kempston joystick interface is attached.
    pub kempston: bool,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            rom: Vec::new(),
            kempston: true,
        }
    }
}
