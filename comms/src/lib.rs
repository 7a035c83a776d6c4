mod deserialize;
pub mod packet;
mod pipe;
mod receiver;
mod sender;
mod serialize;

use tokio::io::{AsyncRead, AsyncWrite};

pub use deserialize::Deserialize;
pub use packet::{Device, Packet};
pub use pipe::send_pipe;
pub use receiver::PacketReceiver;
pub use sender::PacketSender;
pub use serialize::Serialize;

type LenType = u32;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Upper bound for a single frame on the wire, larger frames are rejected by the receiver.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Creates both `PacketReceiver` and `PacketSender` link halves.
///
/// Given a reader and a writer creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A packet link in the form of a receiver and a sender.
pub fn channel<R, W>(rx: R, tx: W) -> (PacketReceiver<R>, PacketSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (PacketReceiver::new(rx), PacketSender::new(tx))
}
