use clap::Parser;
use std::net::Ipv4Addr;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use dns_delver::cache::SharedCache;
use dns_delver::{Resolver, DEFAULT_DNS_PORT, DEFAULT_INDIRECTION_LEVELS};
use dns_wire::protocol::trace::{NoopTracer, Tracer};
use dns_wire::protocol::types::{
    DomainName, Question, RecordClass, RecordType, ResourceRecord,
};

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// DNS iterative lookup utility
///
/// Walks the DNS hierarchy itself, starting from a root nameserver,
/// instead of handing the question to a recursive resolver.  It does
/// not query upstream nameservers over IPv6, though AAAA records in
/// responses are parsed and printed.
struct Args {
    /// Domain name to resolve
    #[clap(value_parser)]
    domain: DomainName,

    /// Query type to resolve
    #[clap(default_value_t = RecordType::A, value_parser)]
    qtype: RecordType,

    /// Nameserver to start from: an IPv4 address, a host name, 'root',
    /// or 'random' (the latter two pick a root hint)
    #[clap(short, long, value_parser)]
    nameserver: Option<String>,

    /// Which port to query nameservers on
    #[clap(long, default_value_t = DEFAULT_DNS_PORT, value_parser)]
    port: u16,

    /// Per-receive timeout in milliseconds (each query is sent up to
    /// three times)
    #[clap(long, default_value_t = 5000, value_parser)]
    timeout_ms: u64,

    /// How many levels of CNAME indirection to follow
    #[clap(long, default_value_t = DEFAULT_INDIRECTION_LEVELS, value_parser)]
    max_indirection: i32,

    /// Print queries and response records as they happen
    #[clap(short, long, action(clap::ArgAction::SetTrue))]
    verbose: bool,
}

/// Prints every trace event as it happens, dig-style.
struct VerboseTracer;

impl Tracer for VerboseTracer {
    fn query_to_send(&self, question: &Question, server: Ipv4Addr, id: u16) {
        println!(";; query [{id:#06x}] {question} -> {server}");
    }

    fn response_header(&self, id: u16, is_authoritative: bool, rcode: u8) {
        println!(";; response [{id:#06x}] authoritative={is_authoritative} rcode={rcode}");
    }

    fn answers_header(&self, count: u16) {
        println!(";; {count} answers");
    }

    fn nameservers_header(&self, count: u16) {
        println!(";; {count} nameservers");
    }

    fn additional_header(&self, count: u16) {
        println!(";; {count} additional");
    }

    fn resource_record(&self, record: &ResourceRecord, _type_code: u16, _class_code: u16) {
        println!(";;   {record}");
    }
}

fn print_section(heading: &str, rrs: &[ResourceRecord]) {
    if rrs.is_empty() {
        return;
    }

    println!("\n;; {heading}");
    for rr in rrs {
        println!("{rr}");
    }
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let question = Question {
        name: args.domain,
        qtype: args.qtype,
        qclass: RecordClass::IN,
    };

    let tracer: Box<dyn Tracer> = if args.verbose {
        Box::new(VerboseTracer)
    } else {
        Box::new(NoopTracer)
    };

    let mut resolver = match Resolver::new(args.nameserver.as_deref(), SharedCache::new(), tracer)
    {
        Ok(resolver) => resolver,
        Err(error) => {
            eprintln!("could not create resolver: {error}");
            process::exit(1);
        }
    };
    resolver.set_upstream_port(args.port);
    resolver.set_timeout(Duration::from_millis(args.timeout_ms));

    println!(";; QUESTION");
    println!(
        "{}\t{}\t{}",
        question.name, question.qclass, question.qtype
    );

    match resolver.get_recursive(&question, args.max_indirection) {
        Ok(rrs) if rrs.is_empty() => {
            println!("\n;; ANSWER");
            println!("; no records found");
            resolver.close();
            process::exit(1);
        }
        Ok(rrs) => print_section("ANSWER", &rrs),
        Err(error) => {
            println!("\n;; ANSWER");
            println!("; {error}");
            resolver.close();
            process::exit(1);
        }
    }

    resolver.close();
}
