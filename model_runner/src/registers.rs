//! Register and command identifiers of the host-facing protocol.
//!
//! Register values are little-endian.

/// Collector/window configuration blob, read-write.
pub const CONFIG: u16 = 0x80;
/// Auto-invoke sample threshold `u16`, zero disables automatic runs, read-write.
pub const AUTO_INVOKE_EVERY: u16 = 0x81;
/// One-shot counter `u8` of frames to report as they are pushed, read-write.
pub const STREAM_SAMPLES: u16 = 0x82;
/// Last inference output, `f32[]`.
pub const OUTPUTS: u16 = 0x101;
/// Input tensor shape, `u16[]`.
pub const INPUT_SHAPE: u16 = 0x180;
/// Output tensor shape, `u16[]`.
pub const OUTPUT_SHAPE: u16 = 0x181;
/// Duration of the last run in microseconds, `u32`.
pub const LAST_RUN_TIME: u16 = 0x182;
/// Arena bytes allocated by the interpreter, `u32`.
pub const ALLOCATED_ARENA_SIZE: u16 = 0x183;
/// Stored model size in bytes, `u32`, zero when there's no valid model.
pub const MODEL_SIZE: u16 = 0x184;
/// Frames pushed since the last (re)configuration, `u32`.
pub const NUM_SAMPLES: u16 = 0x185;
/// Bytes per frame, `u8`.
pub const FRAME_SIZE: u16 = 0x186;
/// The most recent frame, `f32[]`.
pub const CURRENT_SAMPLE: u16 = 0x187;
/// The sticky error text, empty if none.
pub const LAST_ERROR: u16 = 0x188;

/// Opens a model upload, takes the `u32` model size and replies with a `u16` pipe port.
pub const SET_MODEL: u16 = 0x80;
/// Opens a one-shot prediction, replies with the `u16` input and output pipe ports.
pub const PREDICT: u16 = 0x81;
