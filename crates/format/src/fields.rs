//! C-DNS field registry
//!
//! Every CBOR map in a C-DNS file is keyed by small integers. This module
//! is the single place those assignments live; the writer (and any reader)
//! must take its keys from here and nowhere else.
//!
//! Standard fields carry the C-DNS 1.0 key values. Implementation-private
//! fields (extra block preamble times, the extended statistics counters,
//! the collection DNS port) use negative keys, which the format reserves
//! for private use.

use cdns_protocol::{QueryResponse, TransportProtocol};

/// File type identifier written as the first element of the outer array.
pub const FILE_FORMAT_ID: &str = "C-DNS";

/// Format version written in the file preamble.
pub const MAJOR_FORMAT_VERSION: u64 = 1;
pub const MINOR_FORMAT_VERSION: u64 = 0;
/// Identifies this writer's private fields to readers.
pub const PRIVATE_VERSION: u64 = 5;

/// File preamble map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum FilePreambleField {
    MajorFormatVersion = 0,
    MinorFormatVersion = 1,
    PrivateVersion = 2,
    BlockParameters = 3,
}

/// Block parameters map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BlockParametersField {
    StorageParameters = 0,
    CollectionParameters = 1,
}

/// Storage parameters map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum StorageParametersField {
    TicksPerSecond = 0,
    MaxBlockItems = 1,
    StorageHints = 2,
    Opcodes = 3,
    RrTypes = 4,
    StorageFlags = 5,
    ClientAddressPrefixIpv4 = 6,
    ClientAddressPrefixIpv6 = 7,
    ServerAddressPrefixIpv4 = 8,
    ServerAddressPrefixIpv6 = 9,
    SamplingMethod = 10,
    AnonymisationMethod = 11,
}

/// Storage hints map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum StorageHintsField {
    QueryResponseHints = 0,
    QueryResponseSignatureHints = 1,
    RrHints = 2,
    OtherDataHints = 3,
}

/// Collection parameters map keys. The DNS port is not part of the
/// standard format and uses a private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum CollectionParametersField {
    QueryTimeout = 0,
    SkewTimeout = 1,
    Snaplen = 2,
    Promisc = 3,
    Interfaces = 4,
    ServerAddresses = 5,
    VlanIds = 6,
    Filter = 7,
    GeneratorId = 8,
    HostId = 9,
    DnsPort = -1,
}

/// Top-level block map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BlockField {
    Preamble = 0,
    Statistics = 1,
    Tables = 2,
    QueryResponses = 3,
    AddressEventCounts = 4,
    MalformedMessages = 5,
}

/// Block preamble map keys. The collector start and end times are private
/// extensions of the standard preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BlockPreambleField {
    EarliestTime = 0,
    BlockParametersIndex = 1,
    EndTime = -1,
    StartTime = -2,
}

/// Block statistics map keys. The six standard counters are followed by
/// the private pipeline and capture-library counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BlockStatisticsField {
    ProcessedMessages = 0,
    QrDataItems = 1,
    UnmatchedQueries = 2,
    UnmatchedResponses = 3,
    DiscardedOpcode = 4,
    MalformedItems = 5,
    NonDnsPackets = -1,
    OutOfOrderPackets = -2,
    MissingPairs = -3,
    MissingPackets = -4,
    MissingNonDns = -5,
    Packets = -6,
    MissingReceived = -7,
    DiscardedPackets = -8,
    MissingMatcher = -9,
    PcapPackets = -10,
    PcapMissingIf = -11,
    PcapMissingOs = -12,
}

/// Block tables map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BlockTablesField {
    IpAddress = 0,
    Classtype = 1,
    NameRdata = 2,
    QueryResponseSignature = 3,
    QuestionList = 4,
    QuestionRr = 5,
    RrList = 6,
    Rr = 7,
    MalformedMessageData = 8,
}

/// Query/response record map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum QueryResponseField {
    TimeOffset = 0,
    ClientAddressIndex = 1,
    ClientPort = 2,
    TransactionId = 3,
    QrSignatureIndex = 4,
    ClientHoplimit = 5,
    ResponseDelay = 6,
    QueryNameIndex = 7,
    QuerySize = 8,
    ResponseSize = 9,
    ResponseProcessingData = 10,
    QueryExtended = 11,
    ResponseExtended = 12,
}

/// Class/type pair map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum ClassTypeField {
    Type = 0,
    Class = 1,
}

/// Question table entry map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum QuestionField {
    NameIndex = 0,
    ClasstypeIndex = 1,
}

/// Resource record table entry map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum RrField {
    NameIndex = 0,
    ClasstypeIndex = 1,
    Ttl = 2,
    RdataIndex = 3,
}

/// Extended query/response group map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum QueryResponseExtendedField {
    QuestionIndex = 0,
    AnswerIndex = 1,
    AuthorityIndex = 2,
    AdditionalIndex = 3,
}

/// Address event count map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum AddressEventCountField {
    AeType = 0,
    AeCode = 1,
    AeAddressIndex = 2,
    AeTransportFlags = 3,
    AeCount = 4,
}

/// Query/response signature map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum QueryResponseSignatureField {
    ServerAddressIndex = 0,
    ServerPort = 1,
    QrTransportFlags = 2,
    QrType = 3,
    QrSigFlags = 4,
    QueryOpcode = 5,
    QrDnsFlags = 6,
    QueryRcode = 7,
    QueryClasstypeIndex = 8,
    QueryQdCount = 9,
    QueryAnCount = 10,
    QueryNsCount = 11,
    QueryArCount = 12,
    QueryEdnsVersion = 13,
    QueryUdpSize = 14,
    QueryOptRdataIndex = 15,
    ResponseRcode = 16,
}

macro_rules! field_index {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $ty {
                /// The CBOR map key for this field.
                pub const fn index(self) -> i64 {
                    self as i64
                }
            }
        )*
    };
}

field_index!(
    FilePreambleField,
    BlockParametersField,
    StorageParametersField,
    StorageHintsField,
    CollectionParametersField,
    BlockField,
    BlockPreambleField,
    BlockStatisticsField,
    BlockTablesField,
    QueryResponseField,
    ClassTypeField,
    QuestionField,
    RrField,
    QueryResponseExtendedField,
    AddressEventCountField,
    QueryResponseSignatureField,
);

/// Bits of the per-record `qr-flags` value.
pub mod qr_flags {
    pub const HAS_QUERY: u32 = 1 << 0;
    pub const HAS_RESPONSE: u32 = 1 << 1;
    pub const QUERY_HAS_OPT: u32 = 1 << 2;
    pub const RESPONSE_HAS_OPT: u32 = 1 << 3;
    pub const QUERY_HAS_NO_QUESTION: u32 = 1 << 4;
    pub const RESPONSE_HAS_NO_QUESTION: u32 = 1 << 5;
}

/// Bits of the `qr-transport-flags` and `ae-transport-flags` values.
/// Bit 0 is the IP version; bits 1-4 carry the transport.
pub mod transport {
    pub const IPV6: u8 = 1 << 0;
    pub const UDP: u8 = 0 << 1;
    pub const TCP: u8 = 1 << 1;
    pub const TLS: u8 = 2 << 1;
    pub const DTLS: u8 = 3 << 1;
    pub const DOH: u8 = 4 << 1;
    pub const QUERY_TRAILINGDATA: u8 = 1 << 5;
}

/// Bits of the `qr-dns-flags` value. Bits 0-7 describe the query (with
/// bit 7 the EDNS DO bit), bits 8-14 the response.
pub mod dns_flag_bits {
    pub const QUERY_CD: u16 = 1 << 0;
    pub const QUERY_AD: u16 = 1 << 1;
    pub const QUERY_Z: u16 = 1 << 2;
    pub const QUERY_RA: u16 = 1 << 3;
    pub const QUERY_RD: u16 = 1 << 4;
    pub const QUERY_TC: u16 = 1 << 5;
    pub const QUERY_AA: u16 = 1 << 6;
    pub const QUERY_DO: u16 = 1 << 7;
    pub const RESPONSE_CD: u16 = 1 << 8;
    pub const RESPONSE_AD: u16 = 1 << 9;
    pub const RESPONSE_Z: u16 = 1 << 10;
    pub const RESPONSE_RA: u16 = 1 << 11;
    pub const RESPONSE_RD: u16 = 1 << 12;
    pub const RESPONSE_TC: u16 = 1 << 13;
    pub const RESPONSE_AA: u16 = 1 << 14;
}

/// Storage hint bits naming which record fields may appear.
pub mod query_response_hints {
    pub const TIME_OFFSET: u32 = 1 << 0;
    pub const CLIENT_ADDRESS_INDEX: u32 = 1 << 1;
    pub const CLIENT_PORT: u32 = 1 << 2;
    pub const TRANSACTION_ID: u32 = 1 << 3;
    pub const QR_SIGNATURE_INDEX: u32 = 1 << 4;
    pub const CLIENT_HOPLIMIT: u32 = 1 << 5;
    pub const RESPONSE_DELAY: u32 = 1 << 6;
    pub const QUERY_NAME_INDEX: u32 = 1 << 7;
    pub const QUERY_SIZE: u32 = 1 << 8;
    pub const RESPONSE_SIZE: u32 = 1 << 9;
    pub const RESPONSE_PROCESSING_DATA: u32 = 1 << 10;
    pub const QUERY_QUESTION_SECTIONS: u32 = 1 << 11;
    pub const QUERY_ANSWER_SECTIONS: u32 = 1 << 12;
    pub const QUERY_AUTHORITY_SECTIONS: u32 = 1 << 13;
    pub const QUERY_ADDITIONAL_SECTIONS: u32 = 1 << 14;
}

/// Storage hint bits naming which signature fields may appear.
pub mod query_response_signature_hints {
    pub const SERVER_ADDRESS: u32 = 1 << 0;
    pub const SERVER_PORT: u32 = 1 << 1;
    pub const QR_TRANSPORT_FLAGS: u32 = 1 << 2;
    pub const QR_TYPE: u32 = 1 << 3;
    pub const QR_SIG_FLAGS: u32 = 1 << 4;
    pub const QUERY_OPCODE: u32 = 1 << 5;
    pub const QR_DNS_FLAGS: u32 = 1 << 6;
    pub const QUERY_RCODE: u32 = 1 << 7;
    pub const QUERY_CLASSTYPE_INDEX: u32 = 1 << 8;
    pub const QUERY_QDCOUNT: u32 = 1 << 9;
    pub const QUERY_ANCOUNT: u32 = 1 << 10;
    pub const QUERY_NSCOUNT: u32 = 1 << 11;
    pub const QUERY_ARCOUNT: u32 = 1 << 12;
    pub const QUERY_EDNS_VERSION: u32 = 1 << 13;
    pub const QUERY_UDP_SIZE: u32 = 1 << 14;
    pub const QUERY_OPT_RDATA_INDEX: u32 = 1 << 15;
    pub const RESPONSE_RCODE: u32 = 1 << 16;
}

/// Storage hint bits for resource record table entries.
pub mod rr_hints {
    pub const TTL: u32 = 1 << 0;
    pub const RDATA_INDEX: u32 = 1 << 1;
}

/// Storage hint bits for the remaining block content.
pub mod other_data_hints {
    pub const MALFORMED_MESSAGES: u32 = 1 << 0;
    pub const SAMPLED_DATA: u32 = 1 << 1;
    pub const ADDRESS_EVENT_COUNTS: u32 = 1 << 2;
}

/// Compute the `qr-transport-flags` value for a transaction.
pub fn transport_flags(qr: &QueryResponse) -> u8 {
    let mut flags = match qr.transport {
        TransportProtocol::Udp => transport::UDP,
        TransportProtocol::Tcp => transport::TCP,
        TransportProtocol::Tls => transport::TLS,
        TransportProtocol::Dtls => transport::DTLS,
        TransportProtocol::Https => transport::DOH,
    };
    if qr.is_ipv6() {
        flags |= transport::IPV6;
    }
    if qr.query().is_some_and(|q| q.trailing_data) {
        flags |= transport::QUERY_TRAILINGDATA;
    }
    flags
}

/// Compute the combined `qr-dns-flags` value for a transaction.
pub fn dns_flags(qr: &QueryResponse) -> u16 {
    use dns_flag_bits::*;

    let mut flags = 0;
    if let Some(q) = qr.query() {
        if q.checking_disabled {
            flags |= QUERY_CD;
        }
        if q.authenticated_data {
            flags |= QUERY_AD;
        }
        if q.z {
            flags |= QUERY_Z;
        }
        if q.recursion_available {
            flags |= QUERY_RA;
        }
        if q.recursion_desired {
            flags |= QUERY_RD;
        }
        if q.truncated {
            flags |= QUERY_TC;
        }
        if q.authoritative_answer {
            flags |= QUERY_AA;
        }
        if q.edns0.as_ref().is_some_and(|e| e.dnssec_ok) {
            flags |= QUERY_DO;
        }
    }
    if let Some(r) = qr.response() {
        if r.checking_disabled {
            flags |= RESPONSE_CD;
        }
        if r.authenticated_data {
            flags |= RESPONSE_AD;
        }
        if r.z {
            flags |= RESPONSE_Z;
        }
        if r.recursion_available {
            flags |= RESPONSE_RA;
        }
        if r.recursion_desired {
            flags |= RESPONSE_RD;
        }
        if r.truncated {
            flags |= RESPONSE_TC;
        }
        if r.authoritative_answer {
            flags |= RESPONSE_AA;
        }
    }
    flags
}

#[cfg(test)]
#[path = "fields_test.rs"]
mod fields_test;
