use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Maximum encoded length of a domain name: the length octets plus the
/// label octets.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Maximum length of a single label in a domain name.
pub const LABEL_MAX_LEN: usize = 63;

/// Maximum size of a message in either direction.  Larger responses
/// are silently truncated by the transport.
pub const MESSAGE_MAX_LEN: usize = 512;

/// Octet mask for the QR flag being set (response), in the first flags
/// octet.
pub const HEADER_MASK_QR: u8 = 0b1000_0000;

/// Octet mask for the AA flag being set (authoritative), in the first
/// flags octet.
pub const HEADER_MASK_AA: u8 = 0b0000_0100;

/// Octet mask for the rcode field, in the second flags octet.
pub const HEADER_MASK_RCODE: u8 = 0b0000_1111;

/// A question: the name, record type, and record class being asked
/// about.  This is both the query input and the cache key, so equality
/// is structural (names are canonicalised to lowercase on
/// construction).
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                     QNAME                     /
///     /                                               /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QTYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QCLASS                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.2 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Question {
    pub name: DomainName,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name.to_dotted_string(),
            self.qclass,
            self.qtype
        )
    }
}

/// The record types this resolver understands.  Anything else is
/// carried as `Other` with its 16-bit code, and its RDATA kept as raw
/// octets.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    MX,
    AAAA,
    Other(u16),
}

impl RecordType {
    pub fn code(self) -> u16 {
        self.into()
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            15 => RecordType::MX,
            28 => RecordType::AAAA,
            _ => RecordType::Other(value),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MX => 15,
            RecordType::AAAA => 28,
            RecordType::Other(code) => code,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::MX => write!(f, "MX"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Other(code) => write!(f, "TYPE{code}"),
        }
    }
}

impl FromStr for RecordType {
    type Err = RecordTypeFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "MX" => Ok(RecordType::MX),
            "AAAA" => Ok(RecordType::AAAA),
            _ => {
                if let Ok(code) = u16::from_str(s) {
                    Ok(RecordType::from(code))
                } else {
                    Err(RecordTypeFromStr::NoParse)
                }
            }
        }
    }
}

/// Errors that can arise when converting a `&str` into a `RecordType`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordTypeFromStr {
    NoParse,
}

impl fmt::Display for RecordTypeFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not parse string to record type")
    }
}

impl std::error::Error for RecordTypeFromStr {}

/// Record classes.  Only IN is meaningful to this resolver; everything
/// else is carried as `Other` with its 16-bit code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    Other(u16),
}

impl RecordClass {
    pub fn code(self) -> u16 {
        self.into()
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            _ => RecordClass::Other(value),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Other(code) => code,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Other(code) => write!(f, "CLASS{code}"),
        }
    }
}

impl FromStr for RecordClass {
    type Err = RecordClassFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(RecordClass::IN),
            _ => {
                if let Ok(code) = u16::from_str(s) {
                    Ok(RecordClass::from(code))
                } else {
                    Err(RecordClassFromStr::NoParse)
                }
            }
        }
    }
}

/// Errors that can arise when converting a `&str` into a `RecordClass`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClassFromStr {
    NoParse,
}

impl fmt::Display for RecordClassFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not parse string to record class")
    }
}

impl std::error::Error for RecordClassFromStr {}

/// The deserialised RDATA of a resource record.
///
/// Addresses are kept as addresses; NS, CNAME, and MX payloads as the
/// domain name they carry (the MX preference is dropped on parse);
/// anything else as the raw RDATA octets, displayed as lowercase hex.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordData {
    A { address: Ipv4Addr },
    Aaaa { address: Ipv6Addr },
    Ns { nsdname: DomainName },
    Cname { cname: DomainName },
    Mx { exchange: DomainName },
    Other { octets: Bytes },
}

impl RecordData {
    /// The domain name carried by an NS, CNAME, or MX payload.
    pub fn hostname(&self) -> Option<&DomainName> {
        match self {
            RecordData::Ns { nsdname } => Some(nsdname),
            RecordData::Cname { cname } => Some(cname),
            RecordData::Mx { exchange } => Some(exchange),
            _ => None,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordData::A { address } => write!(f, "{address}"),
            // deliberately not the canonical `::` form: every group is
            // written out, with leading zeros stripped
            RecordData::Aaaa { address } => {
                let groups = address.segments();
                for (i, group) in groups.iter().enumerate() {
                    if i > 0 {
                        write!(f, ":")?;
                    }
                    write!(f, "{group:x}")?;
                }
                Ok(())
            }
            RecordData::Ns { nsdname } => write!(f, "{nsdname}"),
            RecordData::Cname { cname } => write!(f, "{cname}"),
            RecordData::Mx { exchange } => write!(f, "{exchange}"),
            RecordData::Other { octets } => {
                for octet in octets {
                    write!(f, "{octet:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A resource record: the question it answers, how long it may be
/// cached for, and its payload.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                      NAME                     /
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     CLASS                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TTL                      |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                   RDLENGTH                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
///     /                     RDATA                     /
///     /                                               /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.3 of RFC 1035.
///
/// Equality and hashing ignore the TTL: two sightings of the same
/// record with different TTLs are the same record, which is what lets
/// the cache refresh an entry rather than duplicate it.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub question: Question,
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn rtype(&self) -> RecordType {
        self.question.qtype
    }

    pub fn rclass(&self) -> RecordClass {
        self.question.qclass
    }
}

impl PartialEq for ResourceRecord {
    fn eq(&self, other: &Self) -> bool {
        self.question == other.question && self.data == other.data
    }
}

impl Eq for ResourceRecord {}

impl std::hash::Hash for ResourceRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.question.hash(state);
        self.data.hash(state);
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.question.name, self.ttl, self.question.qclass, self.question.qtype, self.data
        )
    }
}

/// A parsed response message: the header fields the resolver cares
/// about, plus the three record sections in wire order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Response {
    pub id: u16,
    pub is_authoritative: bool,
    pub rcode: u8,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Response {
    /// All records of the response, in section order.
    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.answers
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
    }

    /// The NS records of the nameserver section, deduplicated,
    /// preserving arrival order.  This is the delegation set the
    /// iterative resolver walks.
    pub fn nameservers(&self) -> Vec<ResourceRecord> {
        let mut nss = Vec::new();
        for rr in &self.authority {
            if rr.rtype() == RecordType::NS && !nss.contains(rr) {
                nss.push(rr.clone());
            }
        }
        nss
    }
}

/// A domain name is a sequence of labels, where each label is a length
/// octet followed by that number of octets.  The final label is always
/// the empty root label.
///
/// A label must be 63 octets or shorter.  A name must be 255 octets or
/// shorter in total, including both length and label octets.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DomainName {
    pub labels: Vec<Label>,
    // INVARIANT: len == len(labels) + sum(map(len, labels))
    pub len: usize,
}

impl DomainName {
    pub fn root_domain() -> Self {
        DomainName {
            labels: vec![Label::new()],
            len: 1,
        }
    }

    pub fn is_root(&self) -> bool {
        self.len == 1 && self.labels[0].is_empty()
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::with_capacity(self.len);
        let mut first = true;
        for label in &self.labels {
            if first {
                first = false;
            } else {
                out.push('.');
            }
            for octet in label.octets() {
                out.push(*octet as char);
            }
        }

        out
    }

    /// Parse a dotted string.  A missing trailing dot is tolerated, so
    /// `"example.com"` and `"example.com."` are the same name.
    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root_domain());
        }

        let relative = s.strip_suffix('.').unwrap_or(s);
        if relative.is_empty() {
            return None;
        }

        let chunks = relative.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len() + 1);

        for label_chars in chunks {
            match label_chars.as_bytes().try_into() {
                Ok(label) => labels.push(label),
                Err(_) => return None,
            }
        }
        labels.push(Label::new());

        Self::from_labels(labels)
    }

    /// Build a name from labels.  The final label must be the only
    /// empty one, and the encoded length must fit.
    pub fn from_labels(labels: Vec<Label>) -> Option<Self> {
        if labels.is_empty() {
            return None;
        }

        let mut len = labels.len();
        let mut blank_label = false;

        for label in &labels {
            if blank_label {
                return None;
            }

            blank_label |= label.is_empty();
            len += label.len() as usize;
        }

        if blank_label && len <= DOMAINNAME_MAX_LEN {
            Some(Self { labels, len })
        } else {
            None
        }
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &self.to_dotted_string())
    }
}

impl FromStr for DomainName {
    type Err = DomainNameFromStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(domain) = DomainName::from_dotted_string(s) {
            Ok(domain)
        } else {
            Err(DomainNameFromStr::NoParse)
        }
    }
}

/// Errors that can arise when converting a `&str` into a `DomainName`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DomainNameFromStr {
    NoParse,
}

impl fmt::Display for DomainNameFromStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not parse string to domain name")
    }
}

impl std::error::Error for DomainNameFromStr {}

/// A label is just a sequence of octets, compared as case-insensitive
/// ASCII by canonicalising to lowercase on construction.  A label can
/// be no longer than 63 octets.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Label {
    /// Private to this module so constructing an invalid `Label` is
    /// impossible.
    octets: Bytes,
}

impl Label {
    /// Create a new, empty, label.
    pub fn new() -> Self {
        Self {
            octets: Bytes::new(),
        }
    }

    #[allow(clippy::missing_panics_doc)]
    pub fn len(&self) -> u8 {
        // safe as the `TryFrom` ensures a label is <= 63 octets
        self.octets.len().try_into().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn octets(&self) -> &Bytes {
        &self.octets
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = LabelTryFromOctetsError;

    fn try_from(mixed_case_octets: &[u8]) -> Result<Self, Self::Error> {
        if mixed_case_octets.len() > LABEL_MAX_LEN {
            return Err(LabelTryFromOctetsError::TooLong);
        }

        Ok(Self {
            octets: Bytes::copy_from_slice(&mixed_case_octets.to_ascii_lowercase()),
        })
    }
}

/// Errors that can arise when converting a `[u8]` into a `Label`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LabelTryFromOctetsError {
    TooLong,
}


#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use super::*;

    pub fn domain(name: &str) -> DomainName {
        DomainName::from_dotted_string(name).unwrap()
    }

    pub fn question(name: &str, qtype: RecordType) -> Question {
        Question {
            name: domain(name),
            qtype,
            qclass: RecordClass::IN,
        }
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            question: question(name, RecordType::A),
            ttl: 300,
            data: RecordData::A { address },
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            question: question(name, RecordType::AAAA),
            ttl: 300,
            data: RecordData::Aaaa { address },
        }
    }

    pub fn ns_record(superdomain_name: &str, nameserver_name: &str) -> ResourceRecord {
        ResourceRecord {
            question: question(superdomain_name, RecordType::NS),
            ttl: 300,
            data: RecordData::Ns {
                nsdname: domain(nameserver_name),
            },
        }
    }

    pub fn cname_record(name: &str, target_name: &str) -> ResourceRecord {
        ResourceRecord {
            question: question(name, RecordType::CNAME),
            ttl: 300,
            data: RecordData::Cname {
                cname: domain(target_name),
            },
        }
    }

    pub fn mx_record(name: &str, exchange_name: &str) -> ResourceRecord {
        ResourceRecord {
            question: question(name, RecordType::MX),
            ttl: 300,
            data: RecordData::Mx {
                exchange: domain(exchange_name),
            },
        }
    }

    pub fn other_record(name: &str, type_code: u16, octets: &[u8]) -> ResourceRecord {
        ResourceRecord {
            question: question(name, RecordType::from(type_code)),
            ttl: 300,
            data: RecordData::Other {
                octets: Bytes::copy_from_slice(octets),
            },
        }
    }
}
