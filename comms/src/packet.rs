use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();
const CODE_SIZE: usize = size_of::<u16>();
const DEVICE_SIZE: usize = size_of::<u64>() + size_of::<u32>() + size_of::<u8>();

const ERR: Header = 0;
const GET: Header = 1;
const SET: Header = 2;
const REPORT: Header = 3;
const COMMAND: Header = 4;
const REPLY: Header = 5;
const ANNOUNCE: Header = 6;
const DETACH: Header = 7;
const SENSOR: Header = 8;
const REMOTE: Header = 9;
const PIPE: Header = 10;
const PIPE_CLOSE: Header = 11;

/// Address of one service instance living on a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    pub device_id: u64,
    pub service_class: u32,
    pub service_index: u8,
}

impl Device {
    fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.device_id.to_be_bytes());
        buf.extend_from_slice(&self.service_class.to_be_bytes());
        buf.push(self.service_index);
    }

    fn read(buf: &[u8]) -> io::Result<(Self, &[u8])> {
        if buf.len() < DEVICE_SIZE {
            return Packet::too_short(buf.len(), DEVICE_SIZE);
        }

        let (device, rest) = buf.split_at(DEVICE_SIZE);
        let (id, device) = device.split_at(size_of::<u64>());
        let (class, index) = device.split_at(size_of::<u32>());

        // SAFETY: The slices were split to the exact sizes just above.
        let device = Self {
            device_id: u64::from_be_bytes(id.try_into().unwrap()),
            service_class: u32::from_be_bytes(class.try_into().unwrap()),
            service_index: index[0],
        };

        Ok((device, rest))
    }
}

/// The application layer packet exchanged between the service, the host and remote sensors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    Err(Cow<'a, str>),
    /// Host asks for the current value of a register.
    Get { reg: u16 },
    /// Host writes a register.
    Set { reg: u16, data: Cow<'a, [u8]> },
    /// A register value, either answering a `Get` or pushed unsolicited.
    Report { reg: u16, data: Cow<'a, [u8]> },
    Command { cmd: u16, data: Cow<'a, [u8]> },
    Reply { cmd: u16, data: Cow<'a, [u8]> },
    /// A remote service instance became reachable.
    Announce { device: Device },
    /// A remote service instance went away.
    Detach { device: Device },
    /// A register report coming from a remote service instance.
    Sensor {
        device: Device,
        reg: u16,
        data: Cow<'a, [u8]>,
    },
    /// A register write addressed to a remote service instance.
    Remote {
        device: Device,
        reg: u16,
        data: Cow<'a, [u8]>,
    },
    /// One chunk of a pipe transfer.
    Pipe { port: u16, data: Cow<'a, [u8]> },
    PipeClose { port: u16 },
}

impl Packet<'_> {
    /// Detaches the packet from the buffer it was received into.
    ///
    /// # Returns
    /// The same packet owning all of its payload.
    pub fn into_owned(self) -> Packet<'static> {
        fn own(data: Cow<'_, [u8]>) -> Cow<'static, [u8]> {
            Cow::Owned(data.into_owned())
        }

        match self {
            Packet::Err(e) => Packet::Err(Cow::Owned(e.into_owned())),
            Packet::Get { reg } => Packet::Get { reg },
            Packet::Set { reg, data } => Packet::Set { reg, data: own(data) },
            Packet::Report { reg, data } => Packet::Report { reg, data: own(data) },
            Packet::Command { cmd, data } => Packet::Command { cmd, data: own(data) },
            Packet::Reply { cmd, data } => Packet::Reply { cmd, data: own(data) },
            Packet::Announce { device } => Packet::Announce { device },
            Packet::Detach { device } => Packet::Detach { device },
            Packet::Sensor { device, reg, data } => Packet::Sensor {
                device,
                reg,
                data: own(data),
            },
            Packet::Remote { device, reg, data } => Packet::Remote {
                device,
                reg,
                data: own(data),
            },
            Packet::Pipe { port, data } => Packet::Pipe { port, data: own(data) },
            Packet::PipeClose { port } => Packet::PipeClose { port },
        }
    }

    /// A short name for the packet kind, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Err(_) => "err",
            Packet::Get { .. } => "get",
            Packet::Set { .. } => "set",
            Packet::Report { .. } => "report",
            Packet::Command { .. } => "command",
            Packet::Reply { .. } => "reply",
            Packet::Announce { .. } => "announce",
            Packet::Detach { .. } => "detach",
            Packet::Sensor { .. } => "sensor",
            Packet::Remote { .. } => "remote",
            Packet::Pipe { .. } => "pipe",
            Packet::PipeClose { .. } => "pipe_close",
        }
    }

    fn too_short<T>(size: usize, needed: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {needed} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid packet kind {kind}"),
        ))
    }

    fn read_code(buf: &[u8]) -> io::Result<(u16, &[u8])> {
        if buf.len() < CODE_SIZE {
            return Self::too_short(buf.len(), CODE_SIZE);
        }

        let (code, rest) = buf.split_at(CODE_SIZE);
        Ok((u16::from_be_bytes([code[0], code[1]]), rest))
    }
}

impl<'a> Serialize<'a> for Packet<'_> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        let (kind, tail): (Header, Option<&[u8]>) = match self {
            Packet::Err(e) => (ERR, Some(e.as_bytes())),
            Packet::Get { .. } => (GET, None),
            Packet::Set { data, .. } => (SET, Some(&data[..])),
            Packet::Report { data, .. } => (REPORT, Some(&data[..])),
            Packet::Command { data, .. } => (COMMAND, Some(&data[..])),
            Packet::Reply { data, .. } => (REPLY, Some(&data[..])),
            Packet::Announce { .. } => (ANNOUNCE, None),
            Packet::Detach { .. } => (DETACH, None),
            Packet::Sensor { data, .. } => (SENSOR, Some(&data[..])),
            Packet::Remote { data, .. } => (REMOTE, Some(&data[..])),
            Packet::Pipe { data, .. } => (PIPE, Some(&data[..])),
            Packet::PipeClose { .. } => (PIPE_CLOSE, None),
        };

        buf.extend_from_slice(&kind.to_be_bytes());

        match self {
            Packet::Err(_) => {}
            Packet::Get { reg }
            | Packet::Set { reg, .. }
            | Packet::Report { reg, .. }
            | Packet::Command { cmd: reg, .. }
            | Packet::Reply { cmd: reg, .. } => buf.extend_from_slice(&reg.to_be_bytes()),
            Packet::Announce { device } | Packet::Detach { device } => device.write(buf),
            Packet::Sensor { device, reg, .. } | Packet::Remote { device, reg, .. } => {
                device.write(buf);
                buf.extend_from_slice(&reg.to_be_bytes());
            }
            Packet::Pipe { port, .. } | Packet::PipeClose { port } => {
                buf.extend_from_slice(&port.to_be_bytes())
            }
        }

        tail
    }
}

impl<'a> Deserialize<'a> for Packet<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::too_short(buf.len(), HEADER_SIZE);
        }

        let (kind, rest) = buf.split_at(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind.try_into().unwrap());

        let packet = match kind {
            ERR => {
                let text = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Packet::Err(Cow::Borrowed(text))
            }
            GET..=REPLY => {
                let (code, data) = Self::read_code(rest)?;
                let data = Cow::Borrowed(data);

                match kind {
                    GET => Packet::Get { reg: code },
                    SET => Packet::Set { reg: code, data },
                    REPORT => Packet::Report { reg: code, data },
                    COMMAND => Packet::Command { cmd: code, data },
                    _ => Packet::Reply { cmd: code, data },
                }
            }
            ANNOUNCE | DETACH => {
                let (device, _) = Device::read(rest)?;

                match kind {
                    ANNOUNCE => Packet::Announce { device },
                    _ => Packet::Detach { device },
                }
            }
            SENSOR | REMOTE => {
                let (device, rest) = Device::read(rest)?;
                let (reg, data) = Self::read_code(rest)?;
                let data = Cow::Borrowed(data);

                match kind {
                    SENSOR => Packet::Sensor { device, reg, data },
                    _ => Packet::Remote { device, reg, data },
                }
            }
            PIPE | PIPE_CLOSE => {
                let (port, data) = Self::read_code(rest)?;

                match kind {
                    PIPE => Packet::Pipe {
                        port,
                        data: Cow::Borrowed(data),
                    },
                    _ => Packet::PipeClose { port },
                }
            }
            kind => return Self::invalid_kind(kind),
        };

        Ok(packet)
    }
}
