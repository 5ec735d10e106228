use rand::Rng;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::{Duration, Instant};

use dns_wire::protocol::serialise::serialise_query;
use dns_wire::protocol::trace::Tracer;
use dns_wire::protocol::types::{Question, Response};

use crate::util::net::{recv_udp_matching, send_udp_bytes_to, RecvOutcome};

/// Total transmissions of one query before giving up.
pub const MAX_QUERY_ATTEMPTS: usize = 3;

/// Ask one nameserver one question over UDP, returning the parsed
/// response.
///
/// The transaction ID is drawn once and reused across transmissions;
/// the tracer sees `query_to_send` before every transmission,
/// retransmissions included.  A receive window that elapses, and a
/// datagram the decoder rejects as malformed, both lead to a
/// retransmission.  Exhausting the attempts, or any socket error,
/// returns `None`: transport failure is silent and the caller observes
/// it as an absence of cached records.
pub fn query_nameserver_udp(
    sock: &UdpSocket,
    address: Ipv4Addr,
    port: u16,
    question: &Question,
    timeout: Duration,
    tracer: &dyn Tracer,
) -> Option<Response> {
    let id = rand::thread_rng().gen();
    let serialised_request = serialise_query(id, question);

    for _ in 0..MAX_QUERY_ATTEMPTS {
        tracer.query_to_send(question, address, id);
        if send_udp_bytes_to(sock, (address, port).into(), &serialised_request).is_err() {
            return None;
        }

        let deadline = Instant::now() + timeout;
        match recv_udp_matching(sock, id, deadline) {
            RecvOutcome::Matched(octets) => match Response::from_octets(&octets, tracer) {
                Ok(response) => return Some(response),
                Err(error) => {
                    tracing::debug!(%question, %address, ?error, "dropping malformed response");
                }
            },
            RecvOutcome::TimedOut => {
                tracing::trace!(%question, %address, "receive window elapsed");
            }
            RecvOutcome::Failed => return None,
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::thread;

    use dns_wire::protocol::deserialise::ConsumableBuffer;
    use dns_wire::protocol::serialise::test_util::serialise_response;
    use dns_wire::protocol::trace::test_util::CapturingTracer;
    use dns_wire::protocol::types::test_util::*;
    use dns_wire::protocol::types::RecordType;

    use super::*;

    fn parse_query(octets: &[u8]) -> (u16, Question) {
        let mut buffer = ConsumableBuffer::new(octets);
        let id = buffer.next_u16().unwrap();
        for _ in 0..5 {
            buffer.next_u16().unwrap();
        }
        let q = Question::deserialise(id, &mut buffer).unwrap();
        (id, q)
    }

    /// A nameserver which runs one closure per received datagram, then
    /// exits.
    fn spawn_server(
        behaviours: Vec<fn(&UdpSocket, SocketAddr, u16, &Question)>,
    ) -> (Ipv4Addr, u16) {
        let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = sock.local_addr().unwrap().port();

        thread::spawn(move || {
            let mut buf = [0; 512];
            for behaviour in behaviours {
                let (received, peer) = sock.recv_from(&mut buf).unwrap();
                let (id, q) = parse_query(&buf[..received]);
                behaviour(&sock, peer, id, &q);
            }
        });

        (Ipv4Addr::LOCALHOST, port)
    }

    fn answer(sock: &UdpSocket, peer: SocketAddr, id: u16, q: &Question) {
        let a = a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1));
        let octets = serialise_response(id, false, 0, q, &[a], &[], &[]);
        sock.send_to(&octets, peer).unwrap();
    }

    fn ignore(_sock: &UdpSocket, _peer: SocketAddr, _id: u16, _q: &Question) {}

    fn wrong_id_then_answer(sock: &UdpSocket, peer: SocketAddr, id: u16, q: &Question) {
        let a = a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1));
        let octets = serialise_response(id.wrapping_add(1), false, 0, q, &[a], &[], &[]);
        sock.send_to(&octets, peer).unwrap();
        answer(sock, peer, id, q);
    }

    fn garbage(sock: &UdpSocket, peer: SocketAddr, id: u16, _q: &Question) {
        // right ID and QR bit, but the header stops there
        let [hi, lo] = id.to_be_bytes();
        sock.send_to(&[hi, lo, 0x80], peer).unwrap();
    }

    #[test]
    fn query_nameserver_udp_returns_answer() {
        let (address, port) = spawn_server(vec![answer]);
        let tracer = CapturingTracer::new();

        let response = query_nameserver_udp(
            &UdpSocket::bind("127.0.0.1:0").unwrap(),
            address,
            port,
            &question("www.example.com.", RecordType::A),
            Duration::from_millis(500),
            &tracer,
        )
        .unwrap();

        assert_eq!(
            vec![a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1))],
            response.answers
        );
        assert_eq!(1, tracer.sends());
    }

    #[test]
    fn query_nameserver_udp_retransmits_on_loss() {
        let (address, port) = spawn_server(vec![ignore, ignore, answer]);
        let tracer = CapturingTracer::new();

        let response = query_nameserver_udp(
            &UdpSocket::bind("127.0.0.1:0").unwrap(),
            address,
            port,
            &question("www.example.com.", RecordType::A),
            Duration::from_millis(100),
            &tracer,
        );

        assert!(response.is_some());
        assert_eq!(3, tracer.sends());
    }

    #[test]
    fn query_nameserver_udp_gives_up_after_three_attempts() {
        let (address, port) = spawn_server(vec![ignore, ignore, ignore]);
        let tracer = CapturingTracer::new();

        let response = query_nameserver_udp(
            &UdpSocket::bind("127.0.0.1:0").unwrap(),
            address,
            port,
            &question("www.example.com.", RecordType::A),
            Duration::from_millis(100),
            &tracer,
        );

        assert!(response.is_none());
        assert_eq!(3, tracer.sends());
    }

    #[test]
    fn query_nameserver_udp_ignores_mismatched_id() {
        let (address, port) = spawn_server(vec![wrong_id_then_answer]);
        let tracer = CapturingTracer::new();

        let response = query_nameserver_udp(
            &UdpSocket::bind("127.0.0.1:0").unwrap(),
            address,
            port,
            &question("www.example.com.", RecordType::A),
            Duration::from_millis(500),
            &tracer,
        );

        assert!(response.is_some());
        assert_eq!(1, tracer.sends());
    }

    #[test]
    fn query_nameserver_udp_retransmits_on_malformed_response() {
        let (address, port) = spawn_server(vec![garbage, answer]);
        let tracer = CapturingTracer::new();

        let response = query_nameserver_udp(
            &UdpSocket::bind("127.0.0.1:0").unwrap(),
            address,
            port,
            &question("www.example.com.", RecordType::A),
            Duration::from_millis(500),
            &tracer,
        );

        assert!(response.is_some());
        assert_eq!(2, tracer.sends());
    }
}
