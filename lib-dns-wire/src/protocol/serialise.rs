//! Serialisation of DNS queries to the wire format.  See the `types`
//! module for details of the format.
//!
//! Only queries are serialised here: this is a client, so the only
//! messages it puts on the wire are single-question standard queries.
//! Names are always written as plain length-prefixed labels, never as
//! compression pointers.

use crate::protocol::types::*;

/// Serialise a single-question standard query with the given
/// transaction ID.
///
/// The header is fixed apart from the ID: QR=0, opcode=QUERY, RD=0,
/// every other flag zero, QDCOUNT=1, all other counts zero.
pub fn serialise_query(id: u16, question: &Question) -> Vec<u8> {
    let mut buffer = WritableBuffer::default();

    buffer.write_u16(id);
    buffer.write_u16(0); // flags
    buffer.write_u16(1); // QDCOUNT
    buffer.write_u16(0); // ANCOUNT
    buffer.write_u16(0); // NSCOUNT
    buffer.write_u16(0); // ARCOUNT
    question.serialise(&mut buffer);

    buffer.octets
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer);
        buffer.write_u16(self.qtype.code());
        buffer.write_u16(self.qclass.code());
    }
}

impl DomainName {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        for label in &self.labels {
            buffer.write_u8(label.len());
            buffer.write_octets(label.octets());
        }
    }
}

/// A buffer which can be written to, for serialisation purposes.
pub struct WritableBuffer {
    pub octets: Vec<u8>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self {
            octets: Vec::with_capacity(MESSAGE_MAX_LEN),
        }
    }
}

impl WritableBuffer {
    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.push(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        for octet in value.to_be_bytes() {
            self.octets.push(octet);
        }
    }

    pub fn write_u32(&mut self, value: u32) {
        for octet in value.to_be_bytes() {
            self.octets.push(octet);
        }
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        for octet in octets {
            self.octets.push(*octet);
        }
    }
}


#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    //! Builders for scripting full response messages, used by tests
    //! which feed wire octets to the deserialiser or to a fake
    //! nameserver.  The real client never serialises records.

    use super::*;

    impl ResourceRecord {
        pub fn serialise(&self, buffer: &mut WritableBuffer) {
            self.question.name.serialise(buffer);
            buffer.write_u16(self.question.qtype.code());
            buffer.write_u16(self.question.qclass.code());
            buffer.write_u32(self.ttl);

            // filled in below
            let rdlength_index = buffer.index();
            buffer.write_u16(0);

            match &self.data {
                RecordData::A { address } => buffer.write_octets(&address.octets()),
                RecordData::Aaaa { address } => buffer.write_octets(&address.octets()),
                RecordData::Ns { nsdname } => nsdname.serialise(buffer),
                RecordData::Cname { cname } => cname.serialise(buffer),
                RecordData::Mx { exchange } => {
                    buffer.write_u16(0); // preference
                    exchange.serialise(buffer);
                }
                RecordData::Other { octets } => buffer.write_octets(octets),
            }

            // -2 so the two rdlength octets are not counted
            let rdlength = (buffer.index() - rdlength_index - 2) as u16;
            let [hi, lo] = rdlength.to_be_bytes();
            buffer.octets[rdlength_index] = hi;
            buffer.octets[rdlength_index + 1] = lo;
        }
    }

    /// Serialise a response to `question`: a header with QR=1 and the
    /// given AA bit and rcode, the echoed question, and the three
    /// record sections.
    pub fn serialise_response(
        id: u16,
        is_authoritative: bool,
        rcode: u8,
        question: &Question,
        answers: &[ResourceRecord],
        authority: &[ResourceRecord],
        additional: &[ResourceRecord],
    ) -> Vec<u8> {
        let mut buffer = WritableBuffer::default();

        buffer.write_u16(id);
        buffer.write_u8(HEADER_MASK_QR | if is_authoritative { HEADER_MASK_AA } else { 0 });
        buffer.write_u8(rcode & HEADER_MASK_RCODE);
        buffer.write_u16(1);
        buffer.write_u16(answers.len() as u16);
        buffer.write_u16(authority.len() as u16);
        buffer.write_u16(additional.len() as u16);

        question.serialise(&mut buffer);
        for rr in answers.iter().chain(authority).chain(additional) {
            rr.serialise(&mut buffer);
        }

        buffer.octets
    }
}
