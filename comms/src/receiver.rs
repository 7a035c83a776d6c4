use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, copy, sink};

use crate::{Deserialize, LEN_TYPE_SIZE, LenType, MAX_FRAME_SIZE};

/// The receiving end handle of the communication.
pub struct PacketReceiver<R: AsyncRead + Unpin> {
    rx: R,
}

impl<R: AsyncRead + Unpin> PacketReceiver<R> {
    /// Creates a new `PacketReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self { rx }
    }

    /// Waits to receive a new frame from the inner reader.
    ///
    /// # Arguments
    /// * `buf` - The buffer to use for deserialization, the returned
    ///           `T`'s lifetimes will be tied to this buffer.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure. A clean
    /// end of stream between frames surfaces as `io::ErrorKind::UnexpectedEof`, an
    /// oversized frame is skipped whole and surfaces as `io::ErrorKind::InvalidData`.
    pub async fn recv_into<'buf, T>(&mut self, buf: &'buf mut Vec<u8>) -> io::Result<T>
    where
        T: Deserialize<'buf>,
    {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        self.rx.read_exact(&mut size_buf).await?;
        let len = LenType::from_be_bytes(size_buf) as usize;

        if len > MAX_FRAME_SIZE {
            // Drain the body so the next length prefix is read in place.
            let skipped = copy(&mut (&mut self.rx).take(len as u64), &mut sink()).await?;
            if skipped < len as u64 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }

            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds the {MAX_FRAME_SIZE} bytes limit"),
            ));
        }

        buf.clear();
        buf.resize(len, 0);
        self.rx.read_exact(&mut buf[..]).await?;

        T::deserialize(buf.as_slice())
    }
}
