//! Wire format types for DNS queries and responses, together with the
//! codec: query serialisation, response deserialisation (including name
//! decompression), and the observer trait notified as a response is
//! picked apart.
//!
//! Everything here follows the RFC 1035 section 4 message framing, over
//! UDP, bounded at 512 octets.

pub mod deserialise;
pub mod serialise;
pub mod trace;
pub mod types;
