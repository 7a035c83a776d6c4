//! The persisted collector/window configuration blob.
//!
//! Layout, little-endian: `u16 sampling_interval_ms, u16 samples_in_window, u32 reserved`
//! followed by 16-byte entries `u64 device_id (0 = any), u32 service_class,
//! u8 service_index, u8 sample_size, u8 sample_type, i8 scale`.

use comms::Device;

use crate::error::{Result, ServiceErr};

pub const HEADER_SIZE: usize = 8;
pub const ENTRY_SIZE: usize = 16;

/// Fixed-width integer encodings a remote sensor may report in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl SampleType {
    /// Maps a wire code into a sample type.
    ///
    /// # Returns
    /// `None` if the code isn't one of the six known encodings.
    pub fn from_code(code: u8) -> Option<Self> {
        let ty = match code {
            0x08 => Self::U8,
            0x88 => Self::I8,
            0x10 => Self::U16,
            0x90 => Self::I16,
            0x20 => Self::U32,
            0xa0 => Self::I32,
            _ => return None,
        };

        Some(ty)
    }

    pub fn code(self) -> u8 {
        match self {
            Self::U8 => 0x08,
            Self::I8 => 0x88,
            Self::U16 => 0x10,
            Self::I16 => 0x90,
            Self::U32 => 0x20,
            Self::I32 => 0xa0,
        }
    }

    /// The size in bytes of a single element.
    pub fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
        }
    }

    /// Decodes one little-endian element.
    ///
    /// # Arguments
    /// * `bytes` - Exactly `self.width()` bytes.
    pub fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            Self::U8 => bytes[0] as f32,
            Self::I8 => bytes[0] as i8 as f32,
            Self::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
        }
    }
}

/// Which remote service instance a collector attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The first free instance of the service class.
    AnyOf { service_class: u32 },
    /// One exact service instance on one device.
    Pinned {
        device_id: u64,
        service_class: u32,
        service_index: u8,
    },
}

impl Binding {
    /// Tells whether `device` satisfies this binding.
    pub fn matches(&self, device: &Device) -> bool {
        match *self {
            Binding::AnyOf { service_class } => device.service_class == service_class,
            Binding::Pinned {
                device_id,
                service_class,
                service_index,
            } => {
                device.device_id == device_id
                    && device.service_class == service_class
                    && device.service_index == service_index
            }
        }
    }
}

/// One collector entry of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSpec {
    pub binding: Binding,
    pub sample_size: u8,
    pub sample_type: SampleType,
    pub scale: i8,
}

impl CollectorSpec {
    fn parse(entry: &[u8]) -> Result<Self> {
        // SAFETY: Entries come from `chunks_exact(ENTRY_SIZE)`.
        let device_id = u64::from_le_bytes(entry[0..8].try_into().unwrap());
        let service_class = u32::from_le_bytes(entry[8..12].try_into().unwrap());
        let (service_index, sample_size) = (entry[12], entry[13]);
        let (sample_type, scale) = (entry[14], entry[15]);

        let Some(sample_type) = SampleType::from_code(sample_type) else {
            return Err(ServiceErr::Configuration(format!(
                "unknown sample type {sample_type:#04x}"
            )));
        };

        let width = sample_type.width();
        if sample_size == 0 || sample_size as usize % width != 0 {
            return Err(ServiceErr::Configuration(format!(
                "sample size {sample_size} is not a multiple of the element width {width}"
            )));
        }

        let binding = match device_id {
            0 => Binding::AnyOf { service_class },
            device_id => Binding::Pinned {
                device_id,
                service_class,
                service_index,
            },
        };

        Ok(Self {
            binding,
            sample_size,
            sample_type,
            scale: scale as i8,
        })
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        let (device_id, service_class, service_index) = match self.binding {
            Binding::AnyOf { service_class } => (0, service_class, 0),
            Binding::Pinned {
                device_id,
                service_class,
                service_index,
            } => (device_id, service_class, service_index),
        };

        buf.extend_from_slice(&device_id.to_le_bytes());
        buf.extend_from_slice(&service_class.to_le_bytes());
        buf.extend_from_slice(&[
            service_index,
            self.sample_size,
            self.sample_type.code(),
            self.scale as u8,
        ]);
    }

    /// The amount of elements each reading holds.
    pub fn elements(&self) -> usize {
        self.sample_size as usize / self.sample_type.width()
    }
}

/// The sampling setup of the service, the default one has no collectors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub sampling_interval_ms: u16,
    pub samples_in_window: u16,
    pub collectors: Vec<CollectorSpec>,
}

impl WindowConfig {
    /// Parses a configuration blob.
    ///
    /// # Arguments
    /// * `blob` - The raw register contents.
    ///
    /// # Returns
    /// `None` for an empty blob, which stands for an unconfigured service,
    /// or a `ServiceErr::Configuration` if the layout is invalid.
    pub fn parse(blob: &[u8]) -> Result<Option<Self>> {
        if blob.is_empty() {
            return Ok(None);
        }

        if blob.len() < HEADER_SIZE || (blob.len() - HEADER_SIZE) % ENTRY_SIZE != 0 {
            return Err(ServiceErr::Configuration(format!(
                "blob of {} bytes is not a header plus whole {ENTRY_SIZE}-byte entries",
                blob.len()
            )));
        }

        let sampling_interval_ms = u16::from_le_bytes([blob[0], blob[1]]);
        let samples_in_window = u16::from_le_bytes([blob[2], blob[3]]);

        if sampling_interval_ms == 0 || samples_in_window == 0 {
            return Err(ServiceErr::Configuration(
                "sampling interval and window length must be positive".to_string(),
            ));
        }

        let collectors = blob[HEADER_SIZE..]
            .chunks_exact(ENTRY_SIZE)
            .map(CollectorSpec::parse)
            .collect::<Result<_>>()?;

        Ok(Some(Self {
            sampling_interval_ms,
            samples_in_window,
            collectors,
        }))
    }

    /// Encodes the configuration back into its blob form, with a zeroed reserved field.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + ENTRY_SIZE * self.collectors.len());
        buf.extend_from_slice(&self.sampling_interval_ms.to_le_bytes());
        buf.extend_from_slice(&self.samples_in_window.to_le_bytes());
        buf.extend_from_slice(&[0; 4]);

        for spec in &self.collectors {
            spec.encode(&mut buf);
        }

        buf
    }

    /// The amount of floats one frame of the window holds.
    pub fn frame_len(&self) -> usize {
        self.collectors.iter().map(CollectorSpec::elements).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accel() -> CollectorSpec {
        CollectorSpec {
            binding: Binding::AnyOf {
                service_class: 0x1f14_0409,
            },
            sample_size: 6,
            sample_type: SampleType::I16,
            scale: -10,
        }
    }

    #[test]
    fn parse_encoded_config() {
        let config = WindowConfig {
            sampling_interval_ms: 50,
            samples_in_window: 20,
            collectors: vec![
                accel(),
                CollectorSpec {
                    binding: Binding::Pinned {
                        device_id: 0xdead_beef,
                        service_class: 0x1421_bac7,
                        service_index: 1,
                    },
                    sample_size: 4,
                    sample_type: SampleType::U32,
                    scale: 0,
                },
            ],
        };

        let blob = config.encode();
        assert_eq!(blob.len(), HEADER_SIZE + 2 * ENTRY_SIZE);
        assert_eq!(WindowConfig::parse(&blob).unwrap(), Some(config));
    }

    #[test]
    fn frame_len_counts_elements() {
        let config = WindowConfig {
            sampling_interval_ms: 100,
            samples_in_window: 4,
            collectors: vec![accel(), accel()],
        };

        assert_eq!(config.frame_len(), 6);
    }

    #[test]
    fn empty_blob_is_unconfigured() {
        assert_eq!(WindowConfig::parse(&[]).unwrap(), None);
    }

    #[test]
    fn invalid_blobs_are_rejected() {
        let mut blob = WindowConfig {
            sampling_interval_ms: 100,
            samples_in_window: 4,
            collectors: vec![accel()],
        }
        .encode();

        assert!(WindowConfig::parse(&blob[..blob.len() - 1]).is_err());

        blob[HEADER_SIZE + 13] = 5;
        assert!(WindowConfig::parse(&blob).is_err());

        blob[HEADER_SIZE + 13] = 6;
        blob[HEADER_SIZE + 14] = 0x42;
        assert!(WindowConfig::parse(&blob).is_err());

        blob[HEADER_SIZE + 14] = SampleType::I16.code();
        blob[0] = 0;
        assert!(WindowConfig::parse(&blob).is_err());
    }

    #[test]
    fn decode_signed_elements() {
        assert_eq!(SampleType::I8.decode(&[0xff]), -1.0);
        assert_eq!(SampleType::I16.decode(&[0x00, 0x80]), -32768.0);
        assert_eq!(SampleType::U16.decode(&[0x00, 0x80]), 32768.0);
        assert_eq!(SampleType::I32.decode(&(-5i32).to_le_bytes()), -5.0);
    }
}
