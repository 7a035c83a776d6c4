//! The sending half of a packet link.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, Serialize};

/// The sending end handle of the communication.
pub struct PacketSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> PacketSender<W> {
    /// Creates a new `PacketSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` through the inner writer as a single length-prefixed frame.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        buf.resize(LEN_TYPE_SIZE, 0);

        let tail = msg.serialize(buf);
        let len = buf.len() - LEN_TYPE_SIZE + tail.map(<[_]>::len).unwrap_or_default();
        let len = LenType::try_from(len).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {len} bytes does not fit the length prefix"),
            )
        })?;

        buf[..LEN_TYPE_SIZE].copy_from_slice(&len.to_be_bytes());
        tx.write_all(buf).await?;

        if let Some(data) = tail {
            tx.write_all(data).await?;
        }

        tx.flush().await
    }

    /// Shuts down the writing half, the peer will observe an end of stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
