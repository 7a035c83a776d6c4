use std::{borrow::Cow, io};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::{Packet, PacketSender};

/// Streams everything readable from `source` over a pipe and closes it.
///
/// Every chunk but the last one is exactly `chunk` bytes long, short reads from
/// `source` are coalesced before sending.
///
/// # Arguments
/// * `source` - Where the bytes are read from.
/// * `port` - The pipe port handed out by the receiving side.
/// * `chunk` - The size of each chunk.
/// * `sender` - The link to send the chunks through.
///
/// # Returns
/// The amount of bytes sent or an io error if occurred.
pub async fn send_pipe<R, W>(
    source: &mut R,
    port: u16,
    chunk: usize,
    sender: &mut PacketSender<W>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if chunk == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "pipe chunks must hold at least one byte",
        ));
    }

    let mut buf = vec![0u8; chunk];
    let mut sent = 0;

    loop {
        let mut filled = 0;
        while filled < chunk {
            let read = source.read(&mut buf[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        if filled > 0 {
            let msg = Packet::Pipe {
                port,
                data: Cow::Borrowed(&buf[..filled]),
            };
            sender.send(&msg).await?;
            sent += filled;
        }

        if filled < chunk {
            break;
        }
    }

    sender.send(&Packet::PipeClose { port }).await?;
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use tokio::io::{self, duplex};

    use super::*;
    use crate::channel;

    #[tokio::test]
    async fn test_send_pipe_in_chunks() {
        const SIZE: usize = 4096;

        let (one, two) = duplex(SIZE);
        let (_, tx) = io::split(one);
        let (rx, _) = io::split(two);
        let (_, mut sender) = channel(io::empty(), tx);
        let (mut receiver, _) = channel(rx, io::sink());

        let size = 127 * 4;
        let blob: Vec<u8> = (0..size).map(|_| rand::rng().random()).collect();
        let mut source: &[u8] = &blob;

        let send = send_pipe(&mut source, 3, 64, &mut sender);
        let recv = async {
            let mut buf = Vec::new();
            let mut received = Vec::new();
            let mut chunks = 0;

            loop {
                match receiver.recv_into(&mut buf).await? {
                    Packet::Pipe { port: 3, data } => {
                        received.extend_from_slice(&data);
                        chunks += 1;
                    }
                    Packet::PipeClose { port: 3 } => break,
                    other => panic!("unexpected packet {other:?}"),
                }
            }

            Ok::<_, io::Error>((received, chunks))
        };

        let (sent, recv) = tokio::join!(send, recv);
        let (received, chunks) = recv.unwrap();

        assert_eq!(sent.unwrap(), size);
        assert_eq!(chunks, size.div_ceil(64));
        assert_eq!(received, blob);
    }
}
