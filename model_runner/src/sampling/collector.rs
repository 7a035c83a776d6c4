use std::borrow::Cow;

use comms::{Device, Packet};

use crate::config::{Binding, CollectorSpec};

/// Remote register holding the amount of samples to stream, 255 streams forever.
pub const REMOTE_STREAMING_SAMPLES: u16 = 0x03;
/// Remote register holding the streaming period in milliseconds.
pub const REMOTE_STREAMING_INTERVAL: u16 = 0x04;
/// Remote register carrying the readings.
pub const REMOTE_READING: u16 = 0x101;

/// Which side of a collector update an event is reported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the new reading overwrites the last sample.
    Pre,
    /// After the last sample holds the new reading.
    Post,
}

/// Subscriber of one remote sensor, normalizing its readings into floats.
#[derive(Debug)]
pub struct Collector {
    spec: CollectorSpec,
    factor: f32,
    device: Option<Device>,
    sample: Vec<f32>,
}

impl Collector {
    /// Creates a new unattached `Collector` with a zeroed last sample.
    ///
    /// # Arguments
    /// * `spec` - The configuration entry of this collector.
    pub fn new(spec: CollectorSpec) -> Self {
        Self {
            factor: 2f32.powi(spec.scale as i32),
            device: None,
            sample: vec![0.0; spec.elements()],
            spec,
        }
    }

    pub fn binding(&self) -> Binding {
        self.spec.binding
    }

    /// The remote instance this collector is attached to, if any.
    pub fn device(&self) -> Option<Device> {
        self.device
    }

    /// Attaches to `device` if this collector is free and the binding accepts it.
    ///
    /// # Returns
    /// Whether the collector got attached.
    pub fn try_attach(&mut self, device: Device) -> bool {
        if self.device.is_some() || !self.spec.binding.matches(&device) {
            return false;
        }

        self.device = Some(device);
        true
    }

    /// Detaches from `device`, the last sample keeps its value.
    ///
    /// # Returns
    /// Whether the collector was attached to `device`.
    pub fn detach(&mut self, device: &Device) -> bool {
        if !self.is_attached_to(device) {
            return false;
        }

        self.device = None;
        true
    }

    pub fn is_attached_to(&self, device: &Device) -> bool {
        self.device.as_ref() == Some(device)
    }

    /// The register writes that make the attached remote stream at `interval_ms`.
    ///
    /// # Returns
    /// The packets to send upstream, empty if unattached.
    pub fn setup(&self, interval_ms: u16) -> Vec<Packet<'static>> {
        let Some(device) = self.device else {
            return Vec::new();
        };

        vec![
            Packet::Remote {
                device,
                reg: REMOTE_STREAMING_INTERVAL,
                data: Cow::Owned((interval_ms as u32).to_le_bytes().to_vec()),
            },
            Packet::Remote {
                device,
                reg: REMOTE_STREAMING_SAMPLES,
                data: Cow::Owned(vec![u8::MAX]),
            },
        ]
    }

    /// Decodes a raw reading into scaled floats.
    ///
    /// # Arguments
    /// * `payload` - The reading as reported by the remote.
    ///
    /// # Returns
    /// The decoded sample, or `None` if the payload is too short.
    pub fn decode(&self, payload: &[u8]) -> Option<Vec<f32>> {
        let ty = self.spec.sample_type;
        let width = ty.width();
        let needed = self.sample.len() * width;

        if payload.len() < needed {
            return None;
        }

        let sample = payload[..needed]
            .chunks_exact(width)
            .map(|element| ty.decode(element) * self.factor)
            .collect();

        Some(sample)
    }

    /// Overwrites the last sample with a decoded reading.
    pub fn store(&mut self, sample: Vec<f32>) {
        debug_assert_eq!(sample.len(), self.sample.len());
        self.sample = sample;
    }

    /// The last sample, one float per element.
    pub fn sample(&self) -> &[f32] {
        &self.sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleType;

    const CLASS: u32 = 0x1f14_0409;

    fn device(device_id: u64, service_index: u8) -> Device {
        Device {
            device_id,
            service_class: CLASS,
            service_index,
        }
    }

    fn collector(binding: Binding, scale: i8) -> Collector {
        Collector::new(CollectorSpec {
            binding,
            sample_size: 6,
            sample_type: SampleType::I16,
            scale,
        })
    }

    #[test]
    fn decode_applies_scale() {
        let c = collector(Binding::AnyOf { service_class: CLASS }, -2);
        let payload = [4, 0, 0xfc, 0xff, 0, 1];

        assert_eq!(c.decode(&payload), Some(vec![1.0, -1.0, 64.0]));
        assert_eq!(c.decode(&payload[..5]), None);
    }

    #[test]
    fn positive_scale_multiplies() {
        let c = collector(Binding::AnyOf { service_class: CLASS }, 3);
        assert_eq!(c.decode(&[1, 0, 2, 0, 3, 0, 99]), Some(vec![8.0, 16.0, 24.0]));
    }

    #[test]
    fn wildcard_attaches_once() {
        let mut c = collector(Binding::AnyOf { service_class: CLASS }, 0);

        assert!(c.try_attach(device(7, 0)));
        assert!(!c.try_attach(device(8, 0)));
        assert!(c.is_attached_to(&device(7, 0)));

        assert!(!c.detach(&device(8, 0)));
        assert!(c.detach(&device(7, 0)));
        assert_eq!(c.device(), None);
    }

    #[test]
    fn pinned_needs_exact_instance() {
        let binding = Binding::Pinned {
            device_id: 7,
            service_class: CLASS,
            service_index: 1,
        };
        let mut c = collector(binding, 0);

        assert!(!c.try_attach(device(7, 0)));
        assert!(!c.try_attach(device(9, 1)));
        assert!(c.try_attach(device(7, 1)));
    }

    #[test]
    fn setup_enables_streaming() {
        let mut c = collector(Binding::AnyOf { service_class: CLASS }, 0);
        assert!(c.setup(100).is_empty());

        c.try_attach(device(7, 0));
        let packets = c.setup(100);

        assert_eq!(
            packets,
            vec![
                Packet::Remote {
                    device: device(7, 0),
                    reg: REMOTE_STREAMING_INTERVAL,
                    data: Cow::Owned(vec![100, 0, 0, 0]),
                },
                Packet::Remote {
                    device: device(7, 0),
                    reg: REMOTE_STREAMING_SAMPLES,
                    data: Cow::Owned(vec![255]),
                },
            ]
        );
    }
}
