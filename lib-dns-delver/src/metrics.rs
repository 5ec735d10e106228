use dns_wire::protocol::types::ResourceRecord;

/// Counters from resolution attempts.  The resolver builds this
/// structure; an embedder can export it however it likes.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Questions answered straight from the cache.
    pub cache_hits: u64,
    /// Questions which had to go to the network.
    pub cache_misses: u64,
    /// Individual queries answered by some upstream nameserver.
    pub nameserver_hits: u64,
    /// Individual queries no upstream nameserver answered.
    pub nameserver_misses: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            cache_hits: 0,
            cache_misses: 0,
            nameserver_hits: 0,
            nameserver_misses: 0,
        }
    }

    pub fn cache_hit_or_miss(&mut self, cached_rrs: &[ResourceRecord]) {
        if cached_rrs.is_empty() {
            self.cache_misses += 1;
        } else {
            self.cache_hits += 1;
        }
    }

    pub fn nameserver_hit(&mut self) {
        self.nameserver_hits += 1;
    }

    pub fn nameserver_miss(&mut self) {
        self.nameserver_misses += 1;
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
