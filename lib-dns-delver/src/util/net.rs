use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use dns_wire::protocol::types::{HEADER_MASK_QR, MESSAGE_MAX_LEN};

/// Write a serialised query to a UDP socket.  Queries are single
/// question and always small; anything over the message bound is
/// refused rather than truncated.
pub fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: SocketAddr,
    octets: &[u8],
) -> Result<(), io::Error> {
    if octets.len() > MESSAGE_MAX_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "query over 512 octets",
        ));
    }

    sock.send_to(octets, target)?;
    Ok(())
}

/// The outcome of waiting for a response datagram.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A datagram matching the transaction ID arrived.
    Matched(Vec<u8>),
    /// The window elapsed without a matching datagram.
    TimedOut,
    /// The socket failed.
    Failed,
}

/// Receive datagrams until one satisfies `response_matches_id`, the
/// deadline passes, or the socket fails.  A mismatched datagram is
/// dropped and the wait continues within the same window.
pub fn recv_udp_matching(sock: &UdpSocket, id: u16, deadline: Instant) -> RecvOutcome {
    let mut buf = [0; MESSAGE_MAX_LEN];

    loop {
        let now = Instant::now();
        if now >= deadline {
            return RecvOutcome::TimedOut;
        }
        if sock.set_read_timeout(Some(deadline - now)).is_err() {
            return RecvOutcome::Failed;
        }

        match sock.recv_from(&mut buf) {
            Ok((received, _)) => {
                if response_matches_id(&buf[..received], id) {
                    return RecvOutcome::Matched(buf[..received].to_vec());
                }
                tracing::debug!(%id, "dropping datagram with mismatched ID or QR");
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return RecvOutcome::TimedOut;
            }
            Err(error) => {
                tracing::debug!(?error, "socket error while receiving");
                return RecvOutcome::Failed;
            }
        }
    }
}

/// A datagram can satisfy an outstanding query iff its first 16 bits
/// equal the query's transaction ID and the QR bit (high bit of the
/// third octet) says it is a response.
pub fn response_matches_id(octets: &[u8], id: u16) -> bool {
    octets.len() >= 3
        && u16::from_be_bytes([octets[0], octets[1]]) == id
        && octets[2] & HEADER_MASK_QR != 0
}
