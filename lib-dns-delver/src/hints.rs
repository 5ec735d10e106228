//! The root nameservers.
//!
//! Iterative resolution has to start somewhere: these are the IANA
//! root servers, as published in the root hints file.  The cache seeds
//! them at construction (see `SharedCache::with_root_hints`) so a
//! resolver always has a first server to ask.

use std::net::Ipv4Addr;

/// One root server: its name and its IPv4 address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RootHint {
    pub name: &'static str,
    pub address: Ipv4Addr,
}

/// The IANA root servers, a through m.
pub static ROOT_HINTS: &[RootHint] = &[
    RootHint {
        name: "a.root-servers.net.",
        address: Ipv4Addr::new(198, 41, 0, 4),
    },
    RootHint {
        name: "b.root-servers.net.",
        address: Ipv4Addr::new(199, 9, 14, 201),
    },
    RootHint {
        name: "c.root-servers.net.",
        address: Ipv4Addr::new(192, 33, 4, 12),
    },
    RootHint {
        name: "d.root-servers.net.",
        address: Ipv4Addr::new(199, 7, 91, 13),
    },
    RootHint {
        name: "e.root-servers.net.",
        address: Ipv4Addr::new(192, 203, 230, 10),
    },
    RootHint {
        name: "f.root-servers.net.",
        address: Ipv4Addr::new(192, 5, 5, 241),
    },
    RootHint {
        name: "g.root-servers.net.",
        address: Ipv4Addr::new(192, 112, 36, 4),
    },
    RootHint {
        name: "h.root-servers.net.",
        address: Ipv4Addr::new(198, 97, 190, 53),
    },
    RootHint {
        name: "i.root-servers.net.",
        address: Ipv4Addr::new(192, 36, 148, 17),
    },
    RootHint {
        name: "j.root-servers.net.",
        address: Ipv4Addr::new(192, 58, 128, 30),
    },
    RootHint {
        name: "k.root-servers.net.",
        address: Ipv4Addr::new(193, 0, 14, 129),
    },
    RootHint {
        name: "l.root-servers.net.",
        address: Ipv4Addr::new(199, 7, 83, 42),
    },
    RootHint {
        name: "m.root-servers.net.",
        address: Ipv4Addr::new(202, 12, 27, 33),
    },
];
