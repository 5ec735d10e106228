use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dns_wire::protocol::types::*;

use crate::hints::{RootHint, ROOT_HINTS};

/// A convenience wrapper around a `Cache` which lets it be shared
/// between resolvers.
///
/// Invoking `clone` on a `SharedCache` gives a new instance which
/// refers to the same underlying `Cache` object.  Insertions are
/// serialised by the mutex; reads see a consistent snapshot.
#[derive(Debug, Clone)]
pub struct SharedCache {
    cache: Arc<Mutex<Cache>>,
}

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

impl SharedCache {
    /// Make a new shared cache, seeded with the IANA root hints.
    pub fn new() -> Self {
        Self::with_root_hints(ROOT_HINTS)
    }

    /// Make a new shared cache seeded with the given root hints.
    pub fn with_root_hints(hints: &[RootHint]) -> Self {
        SharedCache {
            cache: Arc::new(Mutex::new(Cache::with_root_hints(hints))),
        }
    }

    /// Get the unexpired records for a question.  See `Cache::get_valid`.
    pub fn get_valid(&self, question: &Question) -> Vec<ResourceRecord> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get_valid(question)
    }

    /// Get the records for a question whether or not they have
    /// expired.  See `Cache::get_raw`.
    pub fn get_raw(&self, question: &Question) -> Vec<ResourceRecord> {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .get_raw(question)
    }

    /// Insert an entry into the cache.  See `Cache::insert`.
    pub fn insert(&self, record: &ResourceRecord) {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .insert(record);
    }

    /// Insert an entry which never expires.  See `Cache::insert_permanent`.
    pub fn insert_permanent(&self, record: &ResourceRecord) {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .insert_permanent(record);
    }

    /// Atomically delete all expired records.  Returns the number
    /// deleted.
    pub fn remove_expired(&self) -> usize {
        self.cache
            .lock()
            .expect(MUTEX_POISON_MESSAGE)
            .remove_expired()
    }

    /// The question whose cached result is the set of root
    /// nameservers.
    pub fn root_question() -> Question {
        Cache::root_question()
    }
}

impl Default for SharedCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Caching for `ResourceRecord`s, keyed by question.
///
/// You probably want to use `SharedCache` instead.
///
/// Records under one question keep their arrival order: re-seeing a
/// record refreshes its expiry in place rather than duplicating it or
/// moving it to the back.  Seeded root hints never expire.
#[derive(Debug, Clone)]
pub struct Cache {
    entries: HashMap<Question, Vec<CachedRecord>>,

    /// Priority queue of questions ordered by the next expiry among
    /// their records.
    ///
    /// INVARIANT: the questions in here are exactly the questions in
    /// `entries` with at least one expiring record.
    expiry_priority: PriorityQueue<Question, Reverse<Instant>>,
}

/// One cached record and when it lapses.  `None` means never: only
/// seeded hints get that.
#[derive(Debug, Clone)]
struct CachedRecord {
    record: ResourceRecord,
    expires_at: Option<Instant>,
}

impl Cache {
    /// Create a cache seeded with the given root hints: an NS record
    /// under the root question per hint, plus an A record for each
    /// hinted server.  Neither ever expires.
    pub fn with_root_hints(hints: &[RootHint]) -> Self {
        let mut cache = Self {
            entries: HashMap::new(),
            expiry_priority: PriorityQueue::new(),
        };

        for hint in hints {
            let Some(name) = DomainName::from_dotted_string(hint.name) else {
                continue;
            };

            cache.insert_permanent(&ResourceRecord {
                question: Self::root_question(),
                ttl: 3_600_000,
                data: RecordData::Ns {
                    nsdname: name.clone(),
                },
            });
            cache.insert_permanent(&ResourceRecord {
                question: Question {
                    name,
                    qtype: RecordType::A,
                    qclass: RecordClass::IN,
                },
                ttl: 3_600_000,
                data: RecordData::A {
                    address: hint.address,
                },
            });
        }

        cache
    }

    /// The question whose cached result is the set of root
    /// nameservers: name ".", type NS, class IN.
    pub fn root_question() -> Question {
        Question {
            name: DomainName::root_domain(),
            qtype: RecordType::NS,
            qclass: RecordClass::IN,
        }
    }

    /// Get the unexpired records for a question, in insertion order.
    ///
    /// When the question is not itself for CNAMEs and nothing matches
    /// it exactly, any CNAME records cached for the same name and
    /// class are returned instead: an alias stands in for the answer
    /// until it is followed.
    pub fn get_valid(&self, question: &Question) -> Vec<ResourceRecord> {
        let now = Instant::now();

        let mut rrs = self.get_if_unexpired(question, now);
        if rrs.is_empty() && question.qtype != RecordType::CNAME {
            let cname_question = Question {
                name: question.name.clone(),
                qtype: RecordType::CNAME,
                qclass: question.qclass,
            };
            rrs = self.get_if_unexpired(&cname_question, now);
        }
        rrs
    }

    /// Get the records for a question, expired or not, in insertion
    /// order.  This is for bootstrap reads, so there is no CNAME
    /// fall-back.
    pub fn get_raw(&self, question: &Question) -> Vec<ResourceRecord> {
        match self.entries.get(question) {
            Some(records) => records.iter().map(|cached| cached.record.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Helper for `get_valid`: the records for one exact question
    /// whose expiry has not been reached at `now`.
    fn get_if_unexpired(&self, question: &Question, now: Instant) -> Vec<ResourceRecord> {
        match self.entries.get(question) {
            Some(records) => records
                .iter()
                .filter(|cached| match cached.expires_at {
                    None => true,
                    Some(t) => t > now,
                })
                .map(|cached| cached.record.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Insert an entry into the cache with an expiry of now plus its
    /// TTL.  Re-inserting a record (same question and payload) keeps
    /// its position and refreshes its expiry; a TTL of zero is
    /// accepted but lapses immediately.
    pub fn insert(&mut self, record: &ResourceRecord) {
        let expires_at = Instant::now() + Duration::from_secs(u64::from(record.ttl));
        self.insert_with_expiry(record, Some(expires_at));
    }

    /// Insert an entry which never expires.
    pub fn insert_permanent(&mut self, record: &ResourceRecord) {
        self.insert_with_expiry(record, None);
    }

    fn insert_with_expiry(&mut self, record: &ResourceRecord, expires_at: Option<Instant>) {
        let records = self.entries.entry(record.question.clone()).or_default();

        if let Some(cached) = records.iter_mut().find(|cached| &cached.record == record) {
            cached.record = record.clone();
            cached.expires_at = expires_at;
        } else {
            records.push(CachedRecord {
                record: record.clone(),
                expires_at,
            });
        }

        match records.iter().filter_map(|cached| cached.expires_at).min() {
            Some(next_expiry) => {
                self.expiry_priority
                    .push(record.question.clone(), Reverse(next_expiry));
            }
            None => {
                self.expiry_priority.remove(&record.question);
            }
        }
    }

    /// Delete all expired records.
    ///
    /// Returns the number of records deleted.
    pub fn remove_expired(&mut self) -> usize {
        let mut pruned = 0;

        loop {
            let before = pruned;
            pruned += self.remove_expired_step();
            if before == pruned {
                break;
            }
        }

        pruned
    }

    /// Helper for `remove_expired`: looks at the next-to-expire
    /// question and cleans up expired records from it.  This may
    /// delete more than one record, and may even delete the whole
    /// entry.
    ///
    /// Returns the number of records removed.
    fn remove_expired_step(&mut self) -> usize {
        if let Some((question, Reverse(expiry))) = self.expiry_priority.pop() {
            let now = Instant::now();

            if expiry > now {
                self.expiry_priority.push(question, Reverse(expiry));
                return 0;
            }

            if let Some(records) = self.entries.get_mut(&question) {
                let len = records.len();
                records.retain(|cached| match cached.expires_at {
                    None => true,
                    Some(t) => t > now,
                });
                let pruned = len - records.len();

                if let Some(next_expiry) =
                    records.iter().filter_map(|cached| cached.expires_at).min()
                {
                    self.expiry_priority.push(question, Reverse(next_expiry));
                } else if records.is_empty() {
                    self.entries.remove(&question);
                }

                pruned
            } else {
                0
            }
        } else {
            0
        }
    }
}
