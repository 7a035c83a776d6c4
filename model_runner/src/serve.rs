use std::{borrow::Cow, io};

use comms::{Packet, PacketReceiver, PacketSender};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    time::Instant,
};

use crate::service::Service;

/// Milliseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Serves one connection until the peer hangs up.
///
/// Every packet is dispatched, then the queued jobs run to completion and
/// everything produced is flushed before the next packet is read.
///
/// # Args
/// * `service` - The service to drive.
/// * `clock` - The clock readings are timestamped with.
/// * `rx` - The receiving end of the connection.
/// * `tx` - The sending end of the connection.
///
/// # Returns
/// `Ok(())` once the peer closes the connection, or the first io error otherwise.
pub async fn serve<R, W>(
    service: &mut Service,
    clock: &MonotonicClock,
    mut rx: PacketReceiver<R>,
    mut tx: PacketSender<W>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut rx_buf = Vec::new();

    loop {
        let packet: Packet = match rx.recv_into(&mut rx_buf).await {
            Ok(packet) => packet,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("peer disconnected");
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!("dropping malformed packet: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = service.handle(packet, clock.now_ms()) {
            warn!("request failed: {e}");
            tx.send(&Packet::Err(Cow::Owned(e.to_string()))).await?;
        }

        service.work();

        let outbox = service.take_outbox();
        if !outbox.is_empty() {
            debug!(packets = outbox.len(); "flushing outbox");
        }

        for packet in &outbox {
            tx.send(packet).await?;
        }
    }
}
