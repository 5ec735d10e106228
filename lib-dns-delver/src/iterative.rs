//! The iterative walk: ask a server, cache whatever comes back, and if
//! that did not answer the question, move to a delegated nameserver
//! whose address is already known.
//!
//! This corresponds to the non-recursive half of the standard resolver
//! algorithm (RFC 1034 section 5.3.3): every query it sends has RD
//! clear, so the remote servers never recurse on its behalf.

use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use dns_wire::protocol::trace::Tracer;
use dns_wire::protocol::types::*;

use crate::cache::SharedCache;
use crate::metrics::Metrics;
use crate::util::nameserver::query_nameserver_udp;

/// Everything one walk needs, borrowed from the owning resolver.
pub(crate) struct WalkContext<'a> {
    pub sock: &'a UdpSocket,
    pub cache: &'a SharedCache,
    pub tracer: &'a dyn Tracer,
    pub metrics: &'a mut Metrics,
    pub port: u16,
    pub timeout: Duration,
}

/// Answer from the cache if possible; walk the hierarchy from `server`
/// otherwise, then read the cache again.  An empty result means the
/// walk failed or the question has no records: callers cannot tell
/// which, by design.
pub(crate) fn resolve_direct(
    ctx: &mut WalkContext,
    question: &Question,
    server: Ipv4Addr,
) -> Vec<ResourceRecord> {
    let cached = ctx.cache.get_valid(question);
    ctx.metrics.cache_hit_or_miss(&cached);
    if !cached.is_empty() {
        tracing::trace!(%question, "answered from cache");
        return cached;
    }

    iterative_query(ctx, question, server);
    ctx.cache.get_valid(question)
}

/// One full iterative walk for a question, starting at `server`.
///
/// Each round sends an individual query and caches every record of the
/// response.  If the cache can then answer the question (possibly with
/// a CNAME standing in for it), the walk is done.  Otherwise the
/// nameserver section is scanned in arrival order for a delegation
/// whose target already has a cached address, and the walk moves
/// there.  A round with no response, or a delegation set with no
/// usable address, ends the walk with nothing to show beyond what was
/// cached along the way.
pub(crate) fn iterative_query(ctx: &mut WalkContext, question: &Question, server: Ipv4Addr) {
    let mut server = server;

    loop {
        let Some(response) = query_nameserver_udp(
            ctx.sock,
            server,
            ctx.port,
            question,
            ctx.timeout,
            ctx.tracer,
        ) else {
            ctx.metrics.nameserver_miss();
            tracing::debug!(%question, %server, "no response, giving up");
            return;
        };
        ctx.metrics.nameserver_hit();

        for rr in response.records() {
            ctx.cache.insert(rr);
        }

        if !ctx.cache.get_valid(question).is_empty() {
            tracing::trace!(%question, %server, "answered");
            return;
        }

        match next_server(ctx.cache, &response.nameservers()) {
            Some(delegate) => {
                tracing::trace!(%question, %delegate, "following delegation");
                server = delegate;
            }
            None => {
                tracing::debug!(%question, %server, "no delegated nameserver has a known address, giving up");
                return;
            }
        }
    }
}

/// Pick the address for the next round: the first NS record whose
/// target has a cached A record.  Targets whose addresses are unknown
/// are skipped, not resolved.
fn next_server(cache: &SharedCache, nameservers: &[ResourceRecord]) -> Option<Ipv4Addr> {
    for ns in nameservers {
        let Some(target) = ns.data.hostname() else {
            continue;
        };

        let a_question = Question {
            name: target.clone(),
            qtype: RecordType::A,
            qclass: ns.question.qclass,
        };
        for rr in cache.get_valid(&a_question) {
            if let RecordData::A { address } = rr.data {
                return Some(address);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use dns_wire::protocol::types::test_util::*;

    use super::*;

    #[test]
    fn next_server_picks_first_with_known_address() {
        let cache = SharedCache::with_root_hints(&[]);
        cache.insert(&a_record("ns2.example.net.", Ipv4Addr::new(2, 2, 2, 2)));
        cache.insert(&a_record("ns3.example.net.", Ipv4Addr::new(3, 3, 3, 3)));

        let nameservers = vec![
            ns_record("example.com.", "ns1.example.net."),
            ns_record("example.com.", "ns2.example.net."),
            ns_record("example.com.", "ns3.example.net."),
        ];

        assert_eq!(
            Some(Ipv4Addr::new(2, 2, 2, 2)),
            next_server(&cache, &nameservers)
        );
    }

    #[test]
    fn next_server_returns_none_without_glue() {
        let cache = SharedCache::with_root_hints(&[]);

        let nameservers = vec![ns_record("example.com.", "ns1.example.net.")];

        assert_eq!(None, next_server(&cache, &nameservers));
    }

    #[test]
    fn next_server_ignores_expired_glue() {
        let cache = SharedCache::with_root_hints(&[]);
        let mut glue = a_record("ns1.example.net.", Ipv4Addr::new(1, 1, 1, 1));
        glue.ttl = 0;
        cache.insert(&glue);
        std::thread::sleep(Duration::from_millis(5));

        let nameservers = vec![ns_record("example.com.", "ns1.example.net.")];

        assert_eq!(None, next_server(&cache, &nameservers));
    }
}
