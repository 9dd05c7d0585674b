//! Block parameters
//!
//! Every C-DNS file declares, in its preamble, the storage and collection
//! parameters the writer worked under: timing resolution, block capacity,
//! which optional fields the reader can expect, and how the traffic was
//! collected. This writer emits exactly one parameters entry per file.

use std::io::{self, Write};
use std::net::IpAddr;

use crate::cbor::CborEncoder;
use crate::fields::{
    BlockParametersField, CollectionParametersField, StorageHintsField, StorageParametersField,
    other_data_hints, query_response_hints, query_response_signature_hints, rr_hints,
};

/// Timing resolution used when none is configured: microsecond ticks.
pub const DEFAULT_TICKS_PER_SECOND: u64 = 1_000_000;

/// Default per-block record ceiling.
pub const DEFAULT_MAX_BLOCK_ITEMS: u64 = 5000;

/// Address prefix lengths below which the storage parameters record the
/// truncation explicitly.
pub const DEFAULT_IPV4_PREFIX_LENGTH: u8 = 32;
pub const DEFAULT_IPV6_PREFIX_LENGTH: u8 = 128;

/// Hint flags telling a reader which optional fields this writer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageHints {
    pub query_response_hints: u32,
    pub query_response_signature_hints: u32,
    pub rr_hints: u32,
    pub other_data_hints: u32,
}

impl Default for StorageHints {
    fn default() -> Self {
        // Everything on except response processing data and malformed
        // message or sampling content, which this writer never stores.
        let qr = query_response_hints::TIME_OFFSET
            | query_response_hints::CLIENT_ADDRESS_INDEX
            | query_response_hints::CLIENT_PORT
            | query_response_hints::TRANSACTION_ID
            | query_response_hints::QR_SIGNATURE_INDEX
            | query_response_hints::CLIENT_HOPLIMIT
            | query_response_hints::RESPONSE_DELAY
            | query_response_hints::QUERY_NAME_INDEX
            | query_response_hints::QUERY_SIZE
            | query_response_hints::RESPONSE_SIZE
            | query_response_hints::QUERY_QUESTION_SECTIONS
            | query_response_hints::QUERY_ANSWER_SECTIONS
            | query_response_hints::QUERY_AUTHORITY_SECTIONS
            | query_response_hints::QUERY_ADDITIONAL_SECTIONS;
        let sig = query_response_signature_hints::SERVER_ADDRESS
            | query_response_signature_hints::SERVER_PORT
            | query_response_signature_hints::QR_TRANSPORT_FLAGS
            | query_response_signature_hints::QR_TYPE
            | query_response_signature_hints::QR_SIG_FLAGS
            | query_response_signature_hints::QUERY_OPCODE
            | query_response_signature_hints::QR_DNS_FLAGS
            | query_response_signature_hints::QUERY_RCODE
            | query_response_signature_hints::QUERY_CLASSTYPE_INDEX
            | query_response_signature_hints::QUERY_QDCOUNT
            | query_response_signature_hints::QUERY_ANCOUNT
            | query_response_signature_hints::QUERY_NSCOUNT
            | query_response_signature_hints::QUERY_ARCOUNT
            | query_response_signature_hints::QUERY_EDNS_VERSION
            | query_response_signature_hints::QUERY_UDP_SIZE
            | query_response_signature_hints::QUERY_OPT_RDATA_INDEX
            | query_response_signature_hints::RESPONSE_RCODE;
        Self {
            query_response_hints: qr,
            query_response_signature_hints: sig,
            rr_hints: rr_hints::TTL | rr_hints::RDATA_INDEX,
            other_data_hints: other_data_hints::ADDRESS_EVENT_COUNTS,
        }
    }
}

impl StorageHints {
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_map_header(Some(4))?;
        enc.write_kv(
            StorageHintsField::QueryResponseHints.index(),
            self.query_response_hints as u64,
        )?;
        enc.write_kv(
            StorageHintsField::QueryResponseSignatureHints.index(),
            self.query_response_signature_hints as u64,
        )?;
        enc.write_kv(StorageHintsField::RrHints.index(), self.rr_hints as u64)?;
        enc.write_kv(
            StorageHintsField::OtherDataHints.index(),
            self.other_data_hints as u64,
        )
    }
}

/// How transactions are stored: timing resolution, block capacity, hints
/// and privacy truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageParameters {
    pub ticks_per_second: u64,
    pub max_block_items: u64,
    pub storage_hints: StorageHints,
    /// OPCODEs the collector records.
    pub opcodes: Vec<u8>,
    /// RR types the collector records; empty means no filtering.
    pub rr_types: Vec<u16>,
    pub storage_flags: u32,
    pub client_address_prefix_ipv4: u8,
    pub client_address_prefix_ipv6: u8,
    pub server_address_prefix_ipv4: u8,
    pub server_address_prefix_ipv6: u8,
    pub sampling_method: String,
    pub anonymisation_method: String,
}

impl Default for StorageParameters {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            max_block_items: DEFAULT_MAX_BLOCK_ITEMS,
            storage_hints: StorageHints::default(),
            opcodes: vec![0, 1, 2, 4, 5, 6],
            rr_types: Vec::new(),
            storage_flags: 0,
            client_address_prefix_ipv4: DEFAULT_IPV4_PREFIX_LENGTH,
            client_address_prefix_ipv6: DEFAULT_IPV6_PREFIX_LENGTH,
            server_address_prefix_ipv4: DEFAULT_IPV4_PREFIX_LENGTH,
            server_address_prefix_ipv6: DEFAULT_IPV6_PREFIX_LENGTH,
            sampling_method: String::new(),
            anonymisation_method: String::new(),
        }
    }
}

impl StorageParameters {
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use StorageParametersField as F;

        enc.write_map_header(None)?;
        enc.write_kv(F::TicksPerSecond.index(), self.ticks_per_second)?;
        enc.write_kv(F::MaxBlockItems.index(), self.max_block_items)?;
        enc.write_i64(F::StorageHints.index())?;
        self.storage_hints.write_cbor(enc)?;
        enc.write_i64(F::Opcodes.index())?;
        enc.write_array_header(Some(self.opcodes.len() as u64))?;
        for op in &self.opcodes {
            enc.write_u64(*op as u64)?;
        }
        enc.write_i64(F::RrTypes.index())?;
        enc.write_array_header(Some(self.rr_types.len() as u64))?;
        for rt in &self.rr_types {
            enc.write_u64(*rt as u64)?;
        }
        if self.storage_flags != 0 {
            enc.write_kv(F::StorageFlags.index(), self.storage_flags as u64)?;
        }
        if self.client_address_prefix_ipv4 != DEFAULT_IPV4_PREFIX_LENGTH {
            enc.write_kv(
                F::ClientAddressPrefixIpv4.index(),
                self.client_address_prefix_ipv4 as u64,
            )?;
        }
        if self.client_address_prefix_ipv6 != DEFAULT_IPV6_PREFIX_LENGTH {
            enc.write_kv(
                F::ClientAddressPrefixIpv6.index(),
                self.client_address_prefix_ipv6 as u64,
            )?;
        }
        if self.server_address_prefix_ipv4 != DEFAULT_IPV4_PREFIX_LENGTH {
            enc.write_kv(
                F::ServerAddressPrefixIpv4.index(),
                self.server_address_prefix_ipv4 as u64,
            )?;
        }
        if self.server_address_prefix_ipv6 != DEFAULT_IPV6_PREFIX_LENGTH {
            enc.write_kv(
                F::ServerAddressPrefixIpv6.index(),
                self.server_address_prefix_ipv6 as u64,
            )?;
        }
        if !self.sampling_method.is_empty() {
            enc.write_i64(F::SamplingMethod.index())?;
            enc.write_text(&self.sampling_method)?;
        }
        if !self.anonymisation_method.is_empty() {
            enc.write_i64(F::AnonymisationMethod.index())?;
            enc.write_text(&self.anonymisation_method)?;
        }
        enc.write_break()
    }
}

/// How the traffic was collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionParameters {
    pub query_timeout_ms: u64,
    pub skew_timeout_us: u64,
    pub snaplen: u64,
    pub dns_port: u16,
    pub promisc: bool,
    pub interfaces: Vec<String>,
    pub server_addresses: Vec<IpAddr>,
    pub vlan_ids: Vec<u16>,
    pub filter: String,
    pub generator_id: String,
    pub host_id: String,
}

impl Default for CollectionParameters {
    fn default() -> Self {
        Self {
            query_timeout_ms: 5000,
            skew_timeout_us: 10,
            snaplen: 65535,
            dns_port: 53,
            promisc: false,
            interfaces: Vec::new(),
            server_addresses: Vec::new(),
            vlan_ids: Vec::new(),
            filter: String::new(),
            generator_id: String::new(),
            host_id: String::new(),
        }
    }
}

impl CollectionParameters {
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use CollectionParametersField as F;

        enc.write_map_header(None)?;
        enc.write_kv(F::QueryTimeout.index(), self.query_timeout_ms)?;
        enc.write_kv(F::SkewTimeout.index(), self.skew_timeout_us)?;
        enc.write_kv(F::Snaplen.index(), self.snaplen)?;
        enc.write_kv(F::DnsPort.index(), self.dns_port as u64)?;
        enc.write_i64(F::Promisc.index())?;
        enc.write_bool(self.promisc)?;
        if !self.interfaces.is_empty() {
            enc.write_i64(F::Interfaces.index())?;
            enc.write_array_header(Some(self.interfaces.len() as u64))?;
            for i in &self.interfaces {
                enc.write_text(i)?;
            }
        }
        if !self.server_addresses.is_empty() {
            enc.write_i64(F::ServerAddresses.index())?;
            enc.write_array_header(Some(self.server_addresses.len() as u64))?;
            for a in &self.server_addresses {
                match a {
                    IpAddr::V4(v4) => enc.write_bytes(&v4.octets())?,
                    IpAddr::V6(v6) => enc.write_bytes(&v6.octets())?,
                }
            }
        }
        if !self.vlan_ids.is_empty() {
            enc.write_i64(F::VlanIds.index())?;
            enc.write_array_header(Some(self.vlan_ids.len() as u64))?;
            for v in &self.vlan_ids {
                enc.write_u64(*v as u64)?;
            }
        }
        if !self.filter.is_empty() {
            enc.write_i64(F::Filter.index())?;
            enc.write_text(&self.filter)?;
        }
        if !self.generator_id.is_empty() {
            enc.write_i64(F::GeneratorId.index())?;
            enc.write_text(&self.generator_id)?;
        }
        if !self.host_id.is_empty() {
            enc.write_i64(F::HostId.index())?;
            enc.write_text(&self.host_id)?;
        }
        enc.write_break()
    }
}

/// One entry of the file preamble's block-parameters array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockParameters {
    pub storage_parameters: StorageParameters,
    pub collection_parameters: CollectionParameters,
}

impl BlockParameters {
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_map_header(Some(2))?;
        enc.write_i64(BlockParametersField::StorageParameters.index())?;
        self.storage_parameters.write_cbor(enc)?;
        enc.write_i64(BlockParametersField::CollectionParameters.index())?;
        self.collection_parameters.write_cbor(enc)
    }
}

#[cfg(test)]
#[path = "params_test.rs"]
mod params_test;
