#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

pub mod cache;
pub mod hints;
pub mod metrics;
pub mod util;

mod iterative;

use rand::Rng;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::time::Duration;

use dns_wire::protocol::trace::Tracer;
use dns_wire::protocol::types::*;

use self::cache::{Cache, SharedCache};
use self::iterative::WalkContext;
use self::metrics::Metrics;
use self::util::types::{ResolutionError, SetupError};

/// The port queries go to, unless reconfigured.
pub const DEFAULT_DNS_PORT: u16 = 53;

/// How long one receive window lasts, unless reconfigured.  Worst-case
/// wall time for one individual query is three times this.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default number of CNAME indirection levels a lookup will follow.
pub const DEFAULT_INDIRECTION_LEVELS: i32 = 10;

/// An iterative lookup service.
///
/// One resolver owns one UDP socket, bound at construction and
/// released when the resolver is dropped (or explicitly with
/// [`close`](Resolver::close)).  Resolution is blocking and
/// sequential: concurrent lookups want one resolver each, sharing a
/// [`SharedCache`].
pub struct Resolver {
    cache: SharedCache,
    tracer: Box<dyn Tracer>,
    sock: UdpSocket,
    nameserver: Ipv4Addr,
    upstream_port: u16,
    timeout: Duration,
    metrics: Metrics,
}

impl Resolver {
    /// Create a new lookup service around the given cache, which must
    /// already hold root hints (as `SharedCache::new` guarantees).
    ///
    /// `initial_server` picks where iterative walks start: `None` or
    /// `"root"` use the first root hint, `"random"` a random one, and
    /// anything else is taken as an IPv4 literal or a host name to
    /// resolve through the OS.
    pub fn new(
        initial_server: Option<&str>,
        cache: SharedCache,
        tracer: Box<dyn Tracer>,
    ) -> Result<Self, SetupError> {
        let sock = UdpSocket::bind("0.0.0.0:0").map_err(SetupError::Socket)?;

        let mut resolver = Self {
            cache,
            tracer,
            sock,
            nameserver: Ipv4Addr::UNSPECIFIED,
            upstream_port: DEFAULT_DNS_PORT,
            timeout: DEFAULT_QUERY_TIMEOUT,
            metrics: Metrics::new(),
        };
        resolver.set_initial_server(initial_server)?;
        Ok(resolver)
    }

    /// The nameserver iterative walks currently start from.
    pub fn nameserver(&self) -> Ipv4Addr {
        self.nameserver
    }

    /// Update the nameserver used by all future lookups.  The argument
    /// is interpreted as in [`new`](Resolver::new).
    pub fn set_initial_server(&mut self, initial_server: Option<&str>) -> Result<(), SetupError> {
        match initial_server {
            None => self.use_root_hint(false),
            Some(s) if s.eq_ignore_ascii_case("root") => self.use_root_hint(false),
            Some(s) if s.eq_ignore_ascii_case("random") => self.use_root_hint(true),
            Some(s) => {
                if let Ok(address) = Ipv4Addr::from_str(s) {
                    self.nameserver = address;
                    return Ok(());
                }

                let addrs = (s, DEFAULT_DNS_PORT)
                    .to_socket_addrs()
                    .map_err(|_| SetupError::UnknownHost {
                        server: s.to_string(),
                    })?;
                for addr in addrs {
                    if let SocketAddr::V4(v4) = addr {
                        self.nameserver = *v4.ip();
                        return Ok(());
                    }
                }
                Err(SetupError::UnknownHost {
                    server: s.to_string(),
                })
            }
        }
    }

    /// Point queries at a port other than 53.
    pub fn set_upstream_port(&mut self, port: u16) {
        self.upstream_port = port;
    }

    /// Change the per-receive window.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Find all the results for a question.  Valid cached results are
    /// used as they stand; otherwise the nameserver is walked for new
    /// records and the cache read again.  CNAME records associated
    /// with the question are included as they are, not followed.
    pub fn get_direct(&mut self, question: &Question) -> Vec<ResourceRecord> {
        let server = self.nameserver;
        let mut ctx = WalkContext {
            sock: &self.sock,
            cache: &self.cache,
            tracer: self.tracer.as_ref(),
            metrics: &mut self.metrics,
            port: self.upstream_port,
            timeout: self.timeout,
        };
        iterative::resolve_direct(&mut ctx, question, server)
    }

    /// Find all the results for a question, following CNAME records
    /// through at most `max_indirection_levels` further lookups of the
    /// same type and class.  The returned sequence keeps each direct
    /// record ahead of its expansion.
    ///
    /// # Errors
    ///
    /// `ResolutionError::IndirectionLimit` once the budget goes
    /// negative; a negative budget fails before any query is sent.
    pub fn get_recursive(
        &mut self,
        question: &Question,
        max_indirection_levels: i32,
    ) -> Result<Vec<ResourceRecord>, ResolutionError> {
        if max_indirection_levels < 0 {
            return Err(ResolutionError::IndirectionLimit);
        }

        let direct = self.get_direct(question);
        if direct.is_empty() || question.qtype == RecordType::CNAME {
            return Ok(direct);
        }

        let mut results = Vec::with_capacity(direct.len());
        for record in direct {
            let target = if let RecordData::Cname { cname } = &record.data {
                Some(cname.clone())
            } else {
                None
            };
            results.push(record);

            if let Some(target) = target {
                let target_question = Question {
                    name: target,
                    qtype: question.qtype,
                    qclass: question.qclass,
                };
                results.extend(self.get_recursive(&target_question, max_indirection_levels - 1)?);
            }
        }
        Ok(results)
    }

    /// One iterative walk for a question starting at an explicit
    /// server, caching whatever is learned along the way.  This is the
    /// primitive `get_direct` is built from; it is exposed for
    /// embedders that manage their own starting points.
    pub fn iterative_query(&mut self, question: &Question, server: Ipv4Addr) {
        let mut ctx = WalkContext {
            sock: &self.sock,
            cache: &self.cache,
            tracer: self.tracer.as_ref(),
            metrics: &mut self.metrics,
            port: self.upstream_port,
            timeout: self.timeout,
        };
        iterative::iterative_query(&mut ctx, question, server);
    }

    /// The cache this resolver reads and feeds.
    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Counters accumulated since construction.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Release the socket.  Dropping the resolver does the same on
    /// every exit path; this just makes the release explicit at call
    /// sites that want it.
    pub fn close(self) {}

    fn use_root_hint(&mut self, pick_random: bool) -> Result<(), SetupError> {
        let roots = self.cache.get_raw(&Cache::root_question());

        let mut addresses = Vec::with_capacity(roots.len());
        for ns in &roots {
            let Some(target) = ns.data.hostname() else {
                continue;
            };
            let a_question = Question {
                name: target.clone(),
                qtype: RecordType::A,
                qclass: ns.question.qclass,
            };
            if let Some(RecordData::A { address }) = self
                .cache
                .get_raw(&a_question)
                .into_iter()
                .map(|rr| rr.data)
                .find(|data| matches!(data, RecordData::A { .. }))
            {
                addresses.push(address);
            }
        }

        if addresses.is_empty() {
            return Err(SetupError::NoRootHint);
        }

        let index = if pick_random {
            rand::thread_rng().gen_range(0..addresses.len())
        } else {
            0
        };
        self.nameserver = addresses[index];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dns_wire::protocol::trace::test_util::CapturingTracer;
    use dns_wire::protocol::types::test_util::*;

    use super::*;

    fn offline_resolver(cache: SharedCache, tracer: &CapturingTracer) -> Resolver {
        // nothing listens on this port; any query sent by mistake
        // would hang for the timeout, so tests also assert on sends
        let mut resolver =
            Resolver::new(Some("127.0.0.1"), cache, Box::new(tracer.clone())).unwrap();
        resolver.set_upstream_port(1);
        resolver.set_timeout(Duration::from_millis(50));
        resolver
    }

    #[test]
    fn new_with_no_server_picks_first_root_hint() {
        let resolver = Resolver::new(
            None,
            SharedCache::new(),
            Box::new(dns_wire::protocol::trace::NoopTracer),
        )
        .unwrap();

        assert_eq!(hints::ROOT_HINTS[0].address, resolver.nameserver());
    }

    #[test]
    fn new_with_random_picks_some_root_hint() {
        let resolver = Resolver::new(
            Some("random"),
            SharedCache::new(),
            Box::new(dns_wire::protocol::trace::NoopTracer),
        )
        .unwrap();

        assert!(hints::ROOT_HINTS
            .iter()
            .any(|hint| hint.address == resolver.nameserver()));
    }

    #[test]
    fn new_without_root_hints_fails() {
        let result = Resolver::new(
            None,
            SharedCache::with_root_hints(&[]),
            Box::new(dns_wire::protocol::trace::NoopTracer),
        );

        assert!(matches!(result, Err(SetupError::NoRootHint)));
    }

    #[test]
    fn get_direct_serves_cached_records_without_sending() {
        let cache = SharedCache::new();
        let rr = a_record("example.com.", Ipv4Addr::new(93, 184, 216, 34));
        cache.insert(&rr);

        let tracer = CapturingTracer::new();
        let mut resolver = offline_resolver(cache, &tracer);

        let got = resolver.get_direct(&question("example.com.", RecordType::A));

        assert_eq!(vec![rr], got);
        assert_eq!(0, tracer.sends());
        assert_eq!(1, resolver.metrics().cache_hits);
    }

    #[test]
    fn get_recursive_expands_cname_chain_from_cache() {
        let cache = SharedCache::new();
        let cname = cname_record("www.example.com.", "example.com.");
        let a = a_record("example.com.", Ipv4Addr::new(93, 184, 216, 34));
        cache.insert(&cname);
        cache.insert(&a);

        let tracer = CapturingTracer::new();
        let mut resolver = offline_resolver(cache, &tracer);

        let got = resolver
            .get_recursive(&question("www.example.com.", RecordType::A), 5)
            .unwrap();

        assert_eq!(vec![cname, a], got);
        assert_eq!(0, tracer.sends());
    }

    #[test]
    fn get_recursive_with_cname_question_does_not_expand() {
        let cache = SharedCache::new();
        let cname = cname_record("www.example.com.", "example.com.");
        cache.insert(&cname);
        cache.insert(&a_record("example.com.", Ipv4Addr::new(93, 184, 216, 34)));

        let tracer = CapturingTracer::new();
        let mut resolver = offline_resolver(cache, &tracer);

        let got = resolver
            .get_recursive(&question("www.example.com.", RecordType::CNAME), 0)
            .unwrap();

        assert_eq!(vec![cname], got);
        assert_eq!(0, tracer.sends());
    }

    #[test]
    fn get_recursive_negative_budget_fails_without_queries() {
        let tracer = CapturingTracer::new();
        let mut resolver = offline_resolver(SharedCache::new(), &tracer);

        let result = resolver.get_recursive(&question("example.com.", RecordType::A), -1);

        assert_eq!(Err(ResolutionError::IndirectionLimit), result);
        assert_eq!(0, tracer.sends());
    }

    #[test]
    fn set_initial_server_accepts_ipv4_literal() {
        let mut resolver = Resolver::new(
            None,
            SharedCache::new(),
            Box::new(dns_wire::protocol::trace::NoopTracer),
        )
        .unwrap();

        resolver.set_initial_server(Some("192.0.2.1")).unwrap();

        assert_eq!(Ipv4Addr::new(192, 0, 2, 1), resolver.nameserver());
    }

    #[test]
    fn set_initial_server_rejects_unknown_host() {
        let mut resolver = Resolver::new(
            None,
            SharedCache::new(),
            Box::new(dns_wire::protocol::trace::NoopTracer),
        )
        .unwrap();

        let result = resolver.set_initial_server(Some("host.invalid"));

        assert!(matches!(result, Err(SetupError::UnknownHost { .. })));
    }
}
