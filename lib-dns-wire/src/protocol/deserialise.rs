//! Deserialisation of DNS responses from the network.  See the `types`
//! module for details of the format.
//!
//! Parsing is best-effort: a record whose RDATA cannot be decoded is
//! dropped, but because the RDATA window length is known up front the
//! cursor always lands immediately after it and the records that
//! follow still parse.  Only damage outside an RDATA window (a
//! truncated header, a bad name in a NAME field) rejects the whole
//! response.

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::Bytes;

use crate::protocol::trace::Tracer;
use crate::protocol::types::*;

impl Response {
    pub fn from_octets(octets: &[u8], tracer: &dyn Tracer) -> Result<Self, Error> {
        Self::deserialise(&mut ConsumableBuffer::new(octets), tracer)
    }

    pub fn deserialise(buffer: &mut ConsumableBuffer, tracer: &dyn Tracer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        let is_authoritative = flags1 & HEADER_MASK_AA != 0;
        let rcode = flags2 & HEADER_MASK_RCODE;
        tracer.response_header(id, is_authoritative, rcode);

        // The question section is walked, not kept.  The names must be
        // parsed properly all the same: compression pointers elsewhere
        // in the message may target them.
        for _ in 0..qdcount {
            Question::deserialise(id, buffer)?;
        }

        tracer.answers_header(ancount);
        let answers = deserialise_section(id, buffer, ancount, tracer)?;
        tracer.nameservers_header(nscount);
        let authority = deserialise_section(id, buffer, nscount, tracer)?;
        tracer.additional_header(arcount);
        let additional = deserialise_section(id, buffer, arcount, tracer)?;

        Ok(Self {
            id,
            is_authoritative,
            rcode,
            answers,
            authority,
            additional,
        })
    }
}

fn deserialise_section(
    id: u16,
    buffer: &mut ConsumableBuffer,
    count: u16,
    tracer: &dyn Tracer,
) -> Result<Vec<ResourceRecord>, Error> {
    let mut rrs = Vec::with_capacity(count.into());
    for _ in 0..count {
        if let Some(rr) = ResourceRecord::deserialise(id, buffer, tracer)? {
            rrs.push(rr);
        }
    }
    Ok(rrs)
}

impl Question {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        let qclass = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;

        Ok(Self {
            name,
            qtype: RecordType::from(qtype),
            qclass: RecordClass::from(qclass),
        })
    }
}

impl ResourceRecord {
    /// Deserialise one record.  `Ok(None)` means the record was
    /// malformed and dropped, with the cursor advanced past its RDATA
    /// window.
    pub fn deserialise(
        id: u16,
        buffer: &mut ConsumableBuffer,
        tracer: &dyn Tracer,
    ) -> Result<Option<Self>, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let rtype = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let rclass = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;

        let rtype = RecordType::from(rtype);
        let rdata_end = buffer.position() + usize::from(rdlength);
        if rdata_end > buffer.len() {
            return Err(Error::ResourceRecordTooShort(id));
        }

        let data = deserialise_rdata(id, buffer, rtype, rdlength);

        // The window length is authoritative, wherever RDATA parsing
        // wandered: names in RDATA may jump through pointers, and a
        // malformed payload may stop short.
        buffer.seek(rdata_end);

        match data {
            Ok(data) => {
                let record = Self {
                    question: Question {
                        name,
                        qtype: rtype,
                        qclass: RecordClass::from(rclass),
                    },
                    ttl,
                    data,
                };
                tracer.resource_record(&record, rtype.code(), rclass);
                Ok(Some(record))
            }
            Err(_) => Ok(None),
        }
    }
}

fn deserialise_rdata(
    id: u16,
    buffer: &mut ConsumableBuffer,
    rtype: RecordType,
    rdlength: u16,
) -> Result<RecordData, Error> {
    match rtype {
        RecordType::A => {
            if rdlength != 4 {
                return Err(Error::ResourceRecordInvalid(id));
            }
            let address = Ipv4Addr::from(
                buffer
                    .next_u32()
                    .ok_or(Error::ResourceRecordTooShort(id))?,
            );
            Ok(RecordData::A { address })
        }
        RecordType::AAAA => {
            if rdlength != 16 {
                return Err(Error::ResourceRecordInvalid(id));
            }
            let mut groups = [0; 8];
            for group in &mut groups {
                *group = buffer
                    .next_u16()
                    .ok_or(Error::ResourceRecordTooShort(id))?;
            }
            let [a, b, c, d, e, f, g, h] = groups;
            Ok(RecordData::Aaaa {
                address: Ipv6Addr::new(a, b, c, d, e, f, g, h),
            })
        }
        RecordType::NS => Ok(RecordData::Ns {
            nsdname: DomainName::deserialise(id, buffer)?,
        }),
        RecordType::CNAME => Ok(RecordData::Cname {
            cname: DomainName::deserialise(id, buffer)?,
        }),
        RecordType::MX => {
            let _preference = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
            Ok(RecordData::Mx {
                exchange: DomainName::deserialise(id, buffer)?,
            })
        }
        _ => {
            let octets = buffer
                .take(usize::from(rdlength))
                .ok_or(Error::ResourceRecordTooShort(id))?;
            Ok(RecordData::Other {
                octets: Bytes::copy_from_slice(octets),
            })
        }
    }
}

impl DomainName {
    #[allow(clippy::missing_panics_doc)]
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let mut len = 0;
        let mut labels = Vec::<Label>::with_capacity(5);
        let start = buffer.position();

        'outer: loop {
            let size = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;

            if usize::from(size) <= LABEL_MAX_LEN {
                len += 1 + usize::from(size);

                if size == 0 {
                    labels.push(Label::new());
                    break 'outer;
                }

                if let Some(os) = buffer.take(usize::from(size)) {
                    // safe because of the bounds check above
                    let label = Label::try_from(os).unwrap();
                    labels.push(label);
                } else {
                    return Err(Error::DomainTooShort(id));
                }

                if len > DOMAINNAME_MAX_LEN {
                    break 'outer;
                }
            } else if size >= 192 {
                // The two high bits make this and the next octet a
                // 14-bit pointer to the rest of the name.  A pointer
                // must target an earlier position than the name it
                // occurs in (RFC 1035 section 4.1.4), which also rules
                // out pointer loops: chains of pointers are fine, but
                // every jump lands strictly further back.
                let hi = size & 0b0011_1111;
                let lo = buffer.next_u8().ok_or(Error::DomainTooShort(id))?;
                let ptr = usize::from(u16::from_be_bytes([hi, lo]));

                if ptr >= start {
                    return Err(Error::DomainPointerInvalid(id));
                }

                let mut other = DomainName::deserialise(id, &mut buffer.at_offset(ptr))?;
                len += other.len;
                labels.append(&mut other.labels);
                break 'outer;
            } else {
                return Err(Error::DomainLabelInvalid(id));
            }
        }

        if len <= DOMAINNAME_MAX_LEN {
            Ok(DomainName { labels, len })
        } else {
            Err(Error::DomainTooLong(id))
        }
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header, so
/// the failure can be correlated with the query that provoked it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain an ID.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field.
    ResourceRecordTooShort(u16),

    /// A resource record is the wrong format.
    ResourceRecordInvalid(u16),

    /// A domain is incomplete.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer does not point strictly backwards.
    DomainPointerInvalid(u16),

    /// A domain label is longer than 63 octets, but not a pointer.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::ResourceRecordTooShort(id)
            | Error::ResourceRecordInvalid(id)
            | Error::DomainTooShort(id)
            | Error::DomainTooLong(id)
            | Error::DomainPointerInvalid(id)
            | Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CompletelyBusted => write!(f, "datagram too short to hold an ID"),
            Error::HeaderTooShort(_) => write!(f, "header too short"),
            Error::QuestionTooShort(_) => write!(f, "question too short"),
            Error::ResourceRecordTooShort(_) => write!(f, "resource record too short"),
            Error::ResourceRecordInvalid(_) => write!(f, "resource record invalid"),
            Error::DomainTooShort(_) => write!(f, "domain name too short"),
            Error::DomainTooLong(_) => write!(f, "domain name too long"),
            Error::DomainPointerInvalid(_) => write!(f, "domain pointer does not point backwards"),
            Error::DomainLabelInvalid(_) => write!(f, "domain label invalid"),
        }
    }
}

impl std::error::Error for Error {}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    /// Move the cursor to an absolute position at or before the end of
    /// the buffer.
    pub fn seek(&mut self, position: usize) {
        debug_assert!(position <= self.octets.len());
        self.position = position;
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.octets.len() > self.position {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.octets.len() > self.position + 1 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.octets.len() > self.position + 3 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            let c = self.octets[self.position + 2];
            let d = self.octets[self.position + 3];
            self.position += 4;
            Some(u32::from_be_bytes([a, b, c, d]))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }

    pub fn at_offset(&self, position: usize) -> ConsumableBuffer<'a> {
        Self {
            octets: self.octets,
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::protocol::serialise::test_util::serialise_response;
    use crate::protocol::serialise::WritableBuffer;
    use crate::protocol::trace::test_util::{CapturingTracer, Event};
    use crate::protocol::trace::NoopTracer;
    use crate::protocol::types::test_util::*;

    #[test]
    fn deserialise_response_header_and_sections() {
        let q = question("example.com.", RecordType::A);
        let answer = a_record("example.com.", Ipv4Addr::new(93, 184, 216, 34));
        let octets = serialise_response(0x4d2, true, 3, &q, &[answer.clone()], &[], &[]);

        let response = Response::from_octets(&octets, &NoopTracer).unwrap();

        assert_eq!(0x4d2, response.id);
        assert!(response.is_authoritative);
        assert_eq!(3, response.rcode);
        assert_eq!(vec![answer], response.answers);
        assert!(response.authority.is_empty());
        assert!(response.additional.is_empty());
    }

    #[test]
    fn deserialise_sections_in_order() {
        let q = question("example.com.", RecordType::A);
        let ns = ns_record("com.", "a.gtld-servers.net.");
        let glue = a_record("a.gtld-servers.net.", Ipv4Addr::new(192, 5, 6, 30));
        let octets = serialise_response(1, false, 0, &q, &[], &[ns.clone()], &[glue.clone()]);

        let response = Response::from_octets(&octets, &NoopTracer).unwrap();

        assert!(response.answers.is_empty());
        assert_eq!(vec![ns], response.authority);
        assert_eq!(vec![glue], response.additional);
    }

    #[test]
    fn deserialise_mx_skips_preference() {
        let q = question("example.com.", RecordType::MX);
        let mx = mx_record("example.com.", "mail.example.com.");
        let octets = serialise_response(1, false, 0, &q, &[mx.clone()], &[], &[]);

        let response = Response::from_octets(&octets, &NoopTracer).unwrap();

        assert_eq!(vec![mx], response.answers);
    }

    #[test]
    fn deserialise_unknown_type_keeps_raw_octets() {
        let q = question("example.com.", RecordType::Other(16));
        let txt = other_record("example.com.", 16, &[0xde, 0xad, 0xbe, 0xef]);
        let octets = serialise_response(1, false, 0, &q, &[txt.clone()], &[], &[]);

        let response = Response::from_octets(&octets, &NoopTracer).unwrap();

        assert_eq!(vec![txt], response.answers);
        assert_eq!("deadbeef", response.answers[0].data.to_string());
    }

    #[test]
    fn deserialise_name_compression_pointer_into_question() {
        let mut buffer = WritableBuffer::default();
        buffer.write_u16(1);
        buffer.write_u8(HEADER_MASK_QR);
        buffer.write_u8(0);
        buffer.write_u16(1); // QDCOUNT
        buffer.write_u16(1); // ANCOUNT
        buffer.write_u16(0);
        buffer.write_u16(0);
        question("www.example.com.", RecordType::A).serialise(&mut buffer);
        // answer NAME: pointer to the question name at offset 12
        buffer.write_u8(0xc0);
        buffer.write_u8(12);
        buffer.write_u16(1); // TYPE A
        buffer.write_u16(1); // CLASS IN
        buffer.write_u32(300);
        buffer.write_u16(4);
        buffer.write_octets(&[1, 2, 3, 4]);

        let response = Response::from_octets(&buffer.octets, &NoopTracer).unwrap();

        assert_eq!(
            vec![a_record("www.example.com.", Ipv4Addr::new(1, 2, 3, 4))],
            response.answers
        );
    }

    #[test]
    fn deserialise_name_chained_pointers() {
        // Three hops: the second answer's NAME points at the first
        // answer's RDATA, which is itself a bare pointer to a
        // label-then-pointer sequence, which finishes at the question
        // name.
        let mut buffer = WritableBuffer::default();
        buffer.write_u16(1);
        buffer.write_u8(HEADER_MASK_QR);
        buffer.write_u8(0);
        buffer.write_u16(1); // QDCOUNT
        buffer.write_u16(2); // ANCOUNT
        buffer.write_u16(0);
        buffer.write_u16(0);
        question("example.com.", RecordType::A).serialise(&mut buffer);

        // first answer: NAME = "www" + pointer to offset 12
        let www_offset = buffer.index() as u8;
        buffer.write_u8(3);
        buffer.write_octets(b"www");
        buffer.write_u8(0xc0);
        buffer.write_u8(12);
        buffer.write_u16(5); // TYPE CNAME
        buffer.write_u16(1);
        buffer.write_u32(300);
        buffer.write_u16(2);
        let bare_pointer_offset = buffer.index() as u8;
        buffer.write_u8(0xc0); // RDATA: bare pointer to the NAME above
        buffer.write_u8(www_offset);

        // second answer: NAME = pointer to the bare pointer
        buffer.write_u8(0xc0);
        buffer.write_u8(bare_pointer_offset);
        buffer.write_u16(1); // TYPE A
        buffer.write_u16(1);
        buffer.write_u32(300);
        buffer.write_u16(4);
        buffer.write_octets(&[5, 6, 7, 8]);

        let response = Response::from_octets(&buffer.octets, &NoopTracer).unwrap();

        assert_eq!(
            vec![
                cname_record("www.example.com.", "www.example.com."),
                a_record("www.example.com.", Ipv4Addr::new(5, 6, 7, 8)),
            ],
            response.answers
        );
    }

    #[test]
    fn deserialise_self_referential_pointer_drops_record_only() {
        let mut buffer = WritableBuffer::default();
        buffer.write_u16(1);
        buffer.write_u8(HEADER_MASK_QR);
        buffer.write_u8(0);
        buffer.write_u16(1); // QDCOUNT
        buffer.write_u16(2); // ANCOUNT
        buffer.write_u16(0);
        buffer.write_u16(0);
        question("example.com.", RecordType::A).serialise(&mut buffer);

        // first answer: CNAME whose RDATA is a pointer to itself
        question("example.com.", RecordType::A)
            .name
            .serialise(&mut buffer);
        buffer.write_u16(5); // TYPE CNAME
        buffer.write_u16(1);
        buffer.write_u32(300);
        buffer.write_u16(2);
        let rdata_offset = buffer.index() as u8;
        buffer.write_u8(0xc0);
        buffer.write_u8(rdata_offset);

        // second answer, well-formed
        a_record("example.com.", Ipv4Addr::new(9, 9, 9, 9)).serialise(&mut buffer);

        let response = Response::from_octets(&buffer.octets, &NoopTracer).unwrap();

        // the looping record is gone, the one after it survives
        assert_eq!(
            vec![a_record("example.com.", Ipv4Addr::new(9, 9, 9, 9))],
            response.answers
        );
    }

    #[test]
    fn deserialise_restores_cursor_to_rdata_window_end() {
        // A CNAME whose RDATA window is longer than the name in it:
        // parsing must resume after the declared window, not after the
        // name.
        let mut buffer = WritableBuffer::default();
        buffer.write_u16(1);
        buffer.write_u8(HEADER_MASK_QR);
        buffer.write_u8(0);
        buffer.write_u16(1); // QDCOUNT
        buffer.write_u16(2); // ANCOUNT
        buffer.write_u16(0);
        buffer.write_u16(0);
        question("example.com.", RecordType::A).serialise(&mut buffer);

        let target = domain("a.example.com.");
        domain("example.com.").serialise(&mut buffer);
        buffer.write_u16(5); // TYPE CNAME
        buffer.write_u16(1);
        buffer.write_u32(300);
        buffer.write_u16((target.len + 2) as u16);
        target.serialise(&mut buffer);
        buffer.write_octets(&[0xff, 0xff]); // junk the window still covers

        a_record("example.com.", Ipv4Addr::new(9, 9, 9, 9)).serialise(&mut buffer);

        let response = Response::from_octets(&buffer.octets, &NoopTracer).unwrap();

        assert_eq!(
            vec![
                cname_record("example.com.", "a.example.com."),
                a_record("example.com.", Ipv4Addr::new(9, 9, 9, 9)),
            ],
            response.answers
        );
    }

    #[test]
    fn deserialise_bad_aaaa_length_drops_record_only() {
        let q = question("example.com.", RecordType::AAAA);
        let keeper = a_record("example.com.", Ipv4Addr::new(1, 1, 1, 1));

        let mut buffer = WritableBuffer::default();
        buffer.write_u16(1);
        buffer.write_u8(HEADER_MASK_QR);
        buffer.write_u8(0);
        buffer.write_u16(1); // QDCOUNT
        buffer.write_u16(2); // ANCOUNT
        buffer.write_u16(0);
        buffer.write_u16(0);
        q.serialise(&mut buffer);

        // AAAA with a 4-octet RDATA window
        q.name.serialise(&mut buffer);
        buffer.write_u16(28);
        buffer.write_u16(1);
        buffer.write_u32(300);
        buffer.write_u16(4);
        buffer.write_octets(&[1, 2, 3, 4]);

        keeper.serialise(&mut buffer);

        let response = Response::from_octets(&buffer.octets, &NoopTracer).unwrap();

        assert_eq!(vec![keeper], response.answers);
    }

    #[test]
    fn deserialise_rdlength_past_end_is_malformed() {
        let q = question("example.com.", RecordType::A);
        let mut buffer = WritableBuffer::default();
        buffer.write_u16(1);
        buffer.write_u8(HEADER_MASK_QR);
        buffer.write_u8(0);
        buffer.write_u16(1);
        buffer.write_u16(1);
        buffer.write_u16(0);
        buffer.write_u16(0);
        q.serialise(&mut buffer);
        q.name.serialise(&mut buffer);
        buffer.write_u16(1);
        buffer.write_u16(1);
        buffer.write_u32(300);
        buffer.write_u16(200); // window extends past the datagram
        buffer.write_octets(&[1, 2, 3, 4]);

        assert_eq!(
            Err(Error::ResourceRecordTooShort(1)),
            Response::from_octets(&buffer.octets, &NoopTracer)
        );
    }

    #[test]
    fn deserialise_consumes_exactly_the_message() {
        let q = question("example.com.", RecordType::A);
        let octets = serialise_response(
            1,
            false,
            0,
            &q,
            &[cname_record("example.com.", "www.example.org.")],
            &[ns_record("com.", "a.gtld-servers.net.")],
            &[a_record("a.gtld-servers.net.", Ipv4Addr::new(192, 5, 6, 30))],
        );

        let mut buffer = ConsumableBuffer::new(&octets);
        Response::deserialise(&mut buffer, &NoopTracer).unwrap();

        assert_eq!(octets.len(), buffer.position());
    }

    #[test]
    fn deserialise_emits_trace_events_in_order() {
        let q = question("example.com.", RecordType::A);
        let answer = a_record("example.com.", Ipv4Addr::new(93, 184, 216, 34));
        let ns = ns_record("example.com.", "a.iana-servers.net.");
        let octets = serialise_response(7, false, 0, &q, &[answer.clone()], &[ns.clone()], &[]);

        let tracer = CapturingTracer::new();
        Response::from_octets(&octets, &tracer).unwrap();

        assert_eq!(
            vec![
                Event::ResponseHeader {
                    id: 7,
                    is_authoritative: false,
                    rcode: 0
                },
                Event::AnswersHeader { count: 1 },
                Event::Record {
                    record: answer,
                    type_code: 1,
                    class_code: 1
                },
                Event::NameserversHeader { count: 1 },
                Event::Record {
                    record: ns,
                    type_code: 2,
                    class_code: 1
                },
                Event::AdditionalHeader { count: 0 },
            ],
            tracer.events()
        );
    }
}
