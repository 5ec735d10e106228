//! Observation of query processing.
//!
//! A `Tracer` is told about the interesting moments of a lookup: a
//! datagram about to be sent, a response header parsed, a section
//! about to be walked, a record decoded.  It is a pure observer: the
//! resolver behaves identically whatever the tracer does, and the
//! default implementation of every event is to do nothing.

use std::net::Ipv4Addr;

use crate::protocol::types::{Question, ResourceRecord};

pub trait Tracer {
    /// A query datagram is about to be sent.  This fires before
    /// *every* transmission, retransmissions included.
    fn query_to_send(&self, _question: &Question, _server: Ipv4Addr, _id: u16) {}

    /// The response header has been parsed.  Fires before any section
    /// is walked.
    fn response_header(&self, _id: u16, _is_authoritative: bool, _rcode: u8) {}

    /// The answer section is about to be walked.
    fn answers_header(&self, _count: u16) {}

    /// The nameserver (authority) section is about to be walked.
    fn nameservers_header(&self, _count: u16) {}

    /// The additional section is about to be walked.
    fn additional_header(&self, _count: u16) {}

    /// A resource record has been decoded, in wire order.  Records
    /// dropped as malformed do not fire this.
    fn resource_record(&self, _record: &ResourceRecord, _type_code: u16, _class_code: u16) {}
}

/// A tracer which discards every event.
pub struct NoopTracer;

impl Tracer for NoopTracer {}

#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// The events a tracer can observe, as values, for asserting on.
    #[derive(Debug, Clone, Eq, PartialEq)]
    pub enum Event {
        QueryToSend {
            question: Question,
            server: Ipv4Addr,
            id: u16,
        },
        ResponseHeader {
            id: u16,
            is_authoritative: bool,
            rcode: u8,
        },
        AnswersHeader {
            count: u16,
        },
        NameserversHeader {
            count: u16,
        },
        AdditionalHeader {
            count: u16,
        },
        Record {
            record: ResourceRecord,
            type_code: u16,
            class_code: u16,
        },
    }

    /// A tracer which records every event.  Clones share the same
    /// event log, so a test can keep one half and hand the other to a
    /// resolver.
    #[derive(Debug, Clone, Default)]
    pub struct CapturingTracer {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl CapturingTracer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn sends(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, Event::QueryToSend { .. }))
                .count()
        }

        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Tracer for CapturingTracer {
        fn query_to_send(&self, question: &Question, server: Ipv4Addr, id: u16) {
            self.push(Event::QueryToSend {
                question: question.clone(),
                server,
                id,
            });
        }

        fn response_header(&self, id: u16, is_authoritative: bool, rcode: u8) {
            self.push(Event::ResponseHeader {
                id,
                is_authoritative,
                rcode,
            });
        }

        fn answers_header(&self, count: u16) {
            self.push(Event::AnswersHeader { count });
        }

        fn nameservers_header(&self, count: u16) {
            self.push(Event::NameserversHeader { count });
        }

        fn additional_header(&self, count: u16) {
            self.push(Event::AdditionalHeader { count });
        }

        fn resource_record(&self, record: &ResourceRecord, type_code: u16, class_code: u16) {
            self.push(Event::Record {
                record: record.clone(),
                type_code,
                class_code,
            });
        }
    }
}
