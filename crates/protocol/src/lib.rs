//! Transaction types exchanged between the capture pipeline and the C-DNS writer
//!
//! The sniffer, DNS parser and query/response matcher live upstream of this
//! workspace. What they hand the writer is a stream of [`QueryResponse`]
//! pairs, [`AddressEvent`]s, and a running [`PacketStatistics`] snapshot.
//! These types are the contract between the two halves.

use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Transport a transaction was carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportProtocol {
    /// Plain UDP (the default for DNS).
    #[default]
    Udp,
    /// Plain TCP.
    Tcp,
    /// DNS over TLS.
    Tls,
    /// DNS over DTLS.
    Dtls,
    /// DNS over HTTPS.
    Https,
}

/// Role of the capture point for a transaction, as defined by the
/// C-DNS `qr-type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Stub = 0,
    Client = 1,
    Resolver = 2,
    Auth = 3,
    Forwarder = 4,
    Tool = 5,
}

/// A question from the DNS question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionData {
    /// Domain name in uncompressed wire form.
    pub qname: Vec<u8>,
    pub qtype: u16,
    pub qclass: u16,
}

/// A resource record from an answer, authority or additional section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrData {
    /// Owner name in uncompressed wire form.
    pub name: Vec<u8>,
    pub rtype: u16,
    pub rclass: u16,
    pub ttl: u32,
    /// Record data, opaque to the writer.
    pub rdata: Vec<u8>,
}

/// EDNS(0) information extracted from an OPT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns0 {
    /// Requestor's UDP payload size.
    pub udp_payload_size: u16,
    /// High 8 bits of the extended rcode.
    pub extended_rcode: u8,
    pub version: u8,
    /// The DNSSEC OK bit from the OPT TTL field.
    pub dnssec_ok: bool,
    /// OPT record RDATA, opaque to the writer.
    pub opt_rdata: Vec<u8>,
}

/// One parsed DNS message, either the query or the response half of a
/// transaction.
///
/// Everything the parser could not determine (e.g. addresses dropped by an
/// upstream tap, hop limits on fragments) is optional; the writer elides
/// what is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsMessage {
    /// Capture timestamp, nanosecond resolution.
    pub timestamp: DateTime<Utc>,
    pub client_address: Option<IpAddr>,
    pub client_port: Option<u16>,
    pub server_address: Option<IpAddr>,
    pub server_port: Option<u16>,
    /// IP TTL (IPv4) or hop limit (IPv6) seen on the client side.
    pub hoplimit: Option<u8>,
    /// Size of the DNS message on the wire, when known.
    pub wire_size: Option<u32>,

    /// DNS header transaction ID.
    pub id: u16,
    /// DNS header OPCODE.
    pub opcode: u8,
    /// DNS header RCODE, without any EDNS(0) extension bits.
    pub rcode: u8,
    pub checking_disabled: bool,
    pub authenticated_data: bool,
    pub z: bool,
    pub recursion_available: bool,
    pub recursion_desired: bool,
    pub truncated: bool,
    pub authoritative_answer: bool,

    /// Section counts from the DNS header.
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,

    /// Parsed question section. The first entry is the question the
    /// transaction is recorded under.
    pub questions: Vec<QuestionData>,
    pub answers: Vec<RrData>,
    pub authorities: Vec<RrData>,
    pub additionals: Vec<RrData>,

    pub edns0: Option<Edns0>,

    /// The message carried bytes after the end of the DNS payload.
    pub trailing_data: bool,
}

impl Default for DnsMessage {
    fn default() -> Self {
        Self {
            timestamp: DateTime::UNIX_EPOCH,
            client_address: None,
            client_port: None,
            server_address: None,
            server_port: None,
            hoplimit: None,
            wire_size: None,
            id: 0,
            opcode: 0,
            rcode: 0,
            checking_disabled: false,
            authenticated_data: false,
            z: false,
            recursion_available: false,
            recursion_desired: false,
            truncated: false,
            authoritative_answer: false,
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            edns0: None,
            trailing_data: false,
        }
    }
}

/// A matched query/response pair.
///
/// Holds a timed-out query without response, a response without a matching
/// query, or a query with its response. At least one half is always
/// present; the constructors enforce this.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    query: Option<DnsMessage>,
    response: Option<DnsMessage>,
    /// Transport shared by both halves of the pair.
    pub transport: TransportProtocol,
    /// Capture-point role, when the matcher knows it.
    pub transaction_type: Option<TransactionType>,
}

impl QueryResponse {
    /// A query awaiting (or denied) a response.
    pub fn from_query(query: DnsMessage, transport: TransportProtocol) -> Self {
        Self {
            query: Some(query),
            response: None,
            transport,
            transaction_type: None,
        }
    }

    /// A response the matcher could not pair with a query.
    pub fn from_response(response: DnsMessage, transport: TransportProtocol) -> Self {
        Self {
            query: None,
            response: Some(response),
            transport,
            transaction_type: None,
        }
    }

    /// Attach the matching response to a query.
    pub fn set_response(&mut self, response: DnsMessage) {
        self.response = Some(response);
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn query(&self) -> Option<&DnsMessage> {
        self.query.as_ref()
    }

    pub fn response(&self) -> Option<&DnsMessage> {
        self.response.as_ref()
    }

    /// The message the pair is keyed on: the query if present, else the
    /// response.
    pub fn keyed_message(&self) -> &DnsMessage {
        match (&self.query, &self.response) {
            (Some(q), _) => q,
            (None, Some(r)) => r,
            // Constructors guarantee at least one half.
            (None, None) => unreachable!("QueryResponse with neither query nor response"),
        }
    }

    /// The pair timestamp: query timestamp if there is a query, otherwise
    /// the response timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.keyed_message().timestamp
    }

    /// Whether the transaction travelled over IPv6, judged from whichever
    /// addresses are present.
    pub fn is_ipv6(&self) -> bool {
        let m = self.keyed_message();
        match (m.client_address, m.server_address) {
            (Some(a), _) | (None, Some(a)) => a.is_ipv6(),
            (None, None) => false,
        }
    }
}

/// Kinds of per-address events counted alongside transactions, as defined
/// by the C-DNS `ae-type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddressEventType {
    TcpReset = 0,
    IcmpTimeExceeded = 1,
    IcmpDestUnreachable = 2,
    Icmp6TimeExceeded = 3,
    Icmp6DestUnreachable = 4,
    Icmp6PacketTooBig = 5,
}

/// An event seen for a client address, e.g. an ICMP destination
/// unreachable elicited by a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEvent {
    pub event_type: AddressEventType,
    /// Event-specific code (e.g. the ICMP code), when there is one.
    pub code: Option<u16>,
    pub address: IpAddr,
}

impl AddressEvent {
    pub fn new(event_type: AddressEventType, code: Option<u16>, address: IpAddr) -> Self {
        Self {
            event_type,
            code,
            address,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.address.is_ipv6()
    }
}

/// Running counters maintained by the capture pipeline.
///
/// A snapshot accompanies every record-producing call; the writer stores
/// per-block deltas between the snapshot at block start and block end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStatistics {
    /// Raw packets delivered to the capture loop.
    pub raw_packet_count: u64,
    /// Packets that were not usable DNS traffic.
    pub unhandled_packet_count: u64,
    /// DNS messages fully processed.
    pub processed_message_count: u64,
    /// Matched query/response pairs produced.
    pub qr_pair_count: u64,
    /// Queries that timed out unanswered.
    pub query_without_response_count: u64,
    /// Responses with no matching query.
    pub response_without_query_count: u64,
    /// Messages that failed to parse.
    pub malformed_message_count: u64,
    /// Messages dropped because of their OPCODE.
    pub discarded_opcode_count: u64,
    /// Packets that arrived with timestamps out of order.
    pub out_of_order_packet_count: u64,
    /// Pairs dropped on the way to the archive writer.
    pub output_cbor_drop_count: u64,
    /// Packets dropped on the way to the raw PCAP side channel.
    pub output_raw_pcap_drop_count: u64,
    /// Packets dropped on the way to the ignored-traffic side channel.
    pub output_ignored_pcap_drop_count: u64,
    /// Packets the sniffer reported dropping before capture.
    pub sniffer_drop_count: u64,
    /// Packets discarded by sampling.
    pub discarded_sampling_count: u64,
    /// Packets dropped at the matcher input.
    pub matcher_drop_count: u64,
    /// Packets received according to the capture library.
    pub pcap_recv_count: u64,
    /// Packets dropped by the OS according to the capture library.
    pub pcap_drop_count: u64,
    /// Packets dropped by the interface according to the capture library.
    pub pcap_ifdrop_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn message_at(secs: i64) -> DnsMessage {
        DnsMessage {
            timestamp: DateTime::from_timestamp(secs, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pair_timestamp_prefers_query() {
        let mut qr = QueryResponse::from_query(message_at(100), TransportProtocol::Udp);
        qr.set_response(message_at(200));
        assert_eq!(qr.timestamp().timestamp(), 100);
    }

    #[test]
    fn test_pair_timestamp_falls_back_to_response() {
        let qr = QueryResponse::from_response(message_at(200), TransportProtocol::Udp);
        assert_eq!(qr.timestamp().timestamp(), 200);
    }

    #[test]
    fn test_ipv6_detection() {
        let mut m = message_at(1);
        m.client_address = Some("2001:db8::1".parse().unwrap());
        let qr = QueryResponse::from_query(m, TransportProtocol::Udp);
        assert!(qr.is_ipv6());

        let mut m = message_at(1);
        m.client_address = Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        let qr = QueryResponse::from_query(m, TransportProtocol::Udp);
        assert!(!qr.is_ipv6());
    }
}
