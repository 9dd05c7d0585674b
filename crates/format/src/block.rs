//! Block data accumulator
//!
//! A block gathers up to `max_block_items` transactions together with the
//! interning tables their records point into. Repeated values (addresses,
//! names, class/type pairs, whole signatures) are stored once per block
//! and referenced by 1-based index.
//!
//! All indices are block-local: they are handed out by [`HeaderList::add`]
//! and become invalid when the block is cleared after emission.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::io::{self, Write};

use chrono::{DateTime, TimeDelta, Utc};

use cdns_protocol::{AddressEventType, PacketStatistics};

use crate::cbor::CborEncoder;
use crate::fields::{
    AddressEventCountField, BlockField, BlockPreambleField, BlockStatisticsField,
    BlockTablesField, ClassTypeField, QueryResponseExtendedField, QueryResponseField,
    QueryResponseSignatureField, QuestionField, RrField, transport,
};
use crate::params::BlockParameters;

const NS_PER_SEC: i64 = 1_000_000_000;

/// A 1-based index into one of the block tables.
pub type Index = u64;

/// Convert a duration to ticks at the block's timing resolution.
fn delta_to_ticks(delta: TimeDelta, ticks_per_second: u64) -> i64 {
    let tps = ticks_per_second as i64;
    delta.num_seconds() * tps + i64::from(delta.subsec_nanos()) * tps / NS_PER_SEC
}

/// A wall-clock instant in the C-DNS wire form: `[seconds, ticks]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub secs: i64,
    pub ticks: u64,
}

impl Timestamp {
    pub fn new(t: DateTime<Utc>, ticks_per_second: u64) -> Self {
        Self {
            secs: t.timestamp(),
            ticks: t.timestamp_subsec_nanos() as u64 * ticks_per_second / NS_PER_SEC as u64,
        }
    }

    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_array_header(Some(2))?;
        enc.write_i64(self.secs)?;
        enc.write_u64(self.ticks)
    }
}

/// Items that know how to serialise themselves as one CBOR item.
pub trait CborWrite {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()>;
}

/// An opaque byte string (domain name wire form or RDATA).
impl CborWrite for Vec<u8> {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_bytes(self)
    }
}

/// An ordered list of table indices.
impl CborWrite for Vec<Index> {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_array_header(Some(self.len() as u64))?;
        for i in self {
            enc.write_u64(*i)?;
        }
        Ok(())
    }
}

/// An interning table: value-keyed lookup plus insertion-ordered storage.
///
/// `add` returns the existing index for a known value and otherwise
/// appends. Indices are 1-based and stable for the life of the block.
#[derive(Debug)]
pub struct HeaderList<T: Clone + Eq + Hash> {
    map: HashMap<T, Index>,
    items: Vec<T>,
}

impl<T: Clone + Eq + Hash> Default for HeaderList<T> {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            items: Vec::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> HeaderList<T> {
    pub fn add(&mut self, item: T) -> Index {
        if let Some(&idx) = self.map.get(&item) {
            return idx;
        }
        self.items.push(item.clone());
        let idx = self.items.len() as Index;
        self.map.insert(item, idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an entry by its 1-based index.
    pub fn get(&self, index: Index) -> Option<&T> {
        (index as usize)
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.items.clear();
    }
}

impl<T: Clone + Eq + Hash + CborWrite> HeaderList<T> {
    /// Emit the table as a definite-length array in insertion order.
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        enc.write_array_header(Some(self.items.len() as u64))?;
        for item in &self.items {
            item.write_cbor(enc)?;
        }
        Ok(())
    }
}

/// A (type, class) pair from a question or resource record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub qtype: Option<u16>,
    pub qclass: Option<u16>,
}

impl CborWrite for ClassType {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let nitems = self.qtype.is_some() as u64 + self.qclass.is_some() as u64;
        enc.write_map_header(Some(nitems))?;
        enc.write_kv_opt(ClassTypeField::Type.index(), self.qtype.map(u64::from))?;
        enc.write_kv_opt(ClassTypeField::Class.index(), self.qclass.map(u64::from))
    }
}

/// A question table entry: indices into the name and classtype tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Question {
    pub qname: Option<Index>,
    pub classtype: Option<Index>,
}

impl CborWrite for Question {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let nitems = self.qname.is_some() as u64 + self.classtype.is_some() as u64;
        enc.write_map_header(Some(nitems))?;
        enc.write_kv_opt(QuestionField::NameIndex.index(), self.qname)?;
        enc.write_kv_opt(QuestionField::ClasstypeIndex.index(), self.classtype)
    }
}

/// A resource record table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    pub name: Option<Index>,
    pub classtype: Option<Index>,
    pub ttl: Option<u32>,
    pub rdata: Option<Index>,
}

impl CborWrite for ResourceRecord {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let nitems = self.name.is_some() as u64
            + self.classtype.is_some() as u64
            + self.ttl.is_some() as u64
            + self.rdata.is_some() as u64;
        enc.write_map_header(Some(nitems))?;
        enc.write_kv_opt(RrField::NameIndex.index(), self.name)?;
        enc.write_kv_opt(RrField::ClasstypeIndex.index(), self.classtype)?;
        enc.write_kv_opt(RrField::Ttl.index(), self.ttl.map(u64::from))?;
        enc.write_kv_opt(RrField::RdataIndex.index(), self.rdata)
    }
}

/// The tuple of fields shared by many transactions against the same
/// endpoint and transport. Interned like any other table value; unset
/// fields compare equal only to unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QueryResponseSignature {
    pub server_address: Option<Index>,
    pub server_port: Option<u16>,
    pub qr_transport_flags: Option<u8>,
    pub qr_type: Option<u8>,
    pub qr_flags: Option<u32>,
    pub query_opcode: Option<u8>,
    pub dns_flags: Option<u16>,
    pub query_rcode: Option<u16>,
    pub query_classtype: Option<Index>,
    pub qdcount: Option<u16>,
    pub query_ancount: Option<u16>,
    pub query_nscount: Option<u16>,
    pub query_arcount: Option<u16>,
    pub query_edns_version: Option<u8>,
    pub query_edns_payload_size: Option<u16>,
    pub query_opt_rdata: Option<Index>,
    pub response_rcode: Option<u16>,
}

impl CborWrite for QueryResponseSignature {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use QueryResponseSignatureField as F;

        let nitems = self.server_address.is_some() as u64
            + self.server_port.is_some() as u64
            + self.qr_transport_flags.is_some() as u64
            + self.qr_type.is_some() as u64
            + self.qr_flags.is_some() as u64
            + self.query_opcode.is_some() as u64
            + self.dns_flags.is_some() as u64
            + self.query_rcode.is_some() as u64
            + self.query_classtype.is_some() as u64
            + self.qdcount.is_some() as u64
            + self.query_ancount.is_some() as u64
            + self.query_nscount.is_some() as u64
            + self.query_arcount.is_some() as u64
            + self.query_edns_version.is_some() as u64
            + self.query_edns_payload_size.is_some() as u64
            + self.query_opt_rdata.is_some() as u64
            + self.response_rcode.is_some() as u64;

        enc.write_map_header(Some(nitems))?;
        enc.write_kv_opt(F::ServerAddressIndex.index(), self.server_address)?;
        enc.write_kv_opt(F::ServerPort.index(), self.server_port.map(u64::from))?;
        enc.write_kv_opt(
            F::QrTransportFlags.index(),
            self.qr_transport_flags.map(u64::from),
        )?;
        enc.write_kv_opt(F::QrType.index(), self.qr_type.map(u64::from))?;
        enc.write_kv_opt(F::QrSigFlags.index(), self.qr_flags.map(u64::from))?;
        enc.write_kv_opt(F::QueryOpcode.index(), self.query_opcode.map(u64::from))?;
        enc.write_kv_opt(F::QrDnsFlags.index(), self.dns_flags.map(u64::from))?;
        enc.write_kv_opt(F::QueryRcode.index(), self.query_rcode.map(u64::from))?;
        enc.write_kv_opt(F::QueryClasstypeIndex.index(), self.query_classtype)?;
        enc.write_kv_opt(F::QueryQdCount.index(), self.qdcount.map(u64::from))?;
        enc.write_kv_opt(F::QueryAnCount.index(), self.query_ancount.map(u64::from))?;
        enc.write_kv_opt(F::QueryNsCount.index(), self.query_nscount.map(u64::from))?;
        enc.write_kv_opt(F::QueryArCount.index(), self.query_arcount.map(u64::from))?;
        enc.write_kv_opt(
            F::QueryEdnsVersion.index(),
            self.query_edns_version.map(u64::from),
        )?;
        enc.write_kv_opt(
            F::QueryUdpSize.index(),
            self.query_edns_payload_size.map(u64::from),
        )?;
        enc.write_kv_opt(F::QueryOptRdataIndex.index(), self.query_opt_rdata)?;
        enc.write_kv_opt(F::ResponseRcode.index(), self.response_rcode.map(u64::from))
    }
}

/// Per-side extended section data: indices into the list tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryResponseExtraInfo {
    pub questions_list: Option<Index>,
    pub answers_list: Option<Index>,
    pub authority_list: Option<Index>,
    pub additional_list: Option<Index>,
}

impl QueryResponseExtraInfo {
    pub fn is_empty(&self) -> bool {
        self.questions_list.is_none()
            && self.answers_list.is_none()
            && self.authority_list.is_none()
            && self.additional_list.is_none()
    }

    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>, key: i64) -> io::Result<()> {
        use QueryResponseExtendedField as F;

        enc.write_i64(key)?;
        enc.write_map_header(None)?;
        enc.write_kv_opt(F::QuestionIndex.index(), self.questions_list)?;
        enc.write_kv_opt(F::AnswerIndex.index(), self.answers_list)?;
        enc.write_kv_opt(F::AuthorityIndex.index(), self.authority_list)?;
        enc.write_kv_opt(F::AdditionalIndex.index(), self.additional_list)?;
        enc.write_break()
    }
}

/// One transaction record.
#[derive(Debug, Clone, Default)]
pub struct QueryResponseItem {
    pub qr_flags: u32,
    pub tstamp: Option<DateTime<Utc>>,
    pub client_address: Option<Index>,
    pub client_port: Option<u16>,
    pub id: Option<u16>,
    pub hoplimit: Option<u8>,
    pub response_delay: Option<TimeDelta>,
    pub qname: Option<Index>,
    pub signature: Option<Index>,
    pub query_size: Option<u32>,
    pub response_size: Option<u32>,
    pub query_extra_info: Option<QueryResponseExtraInfo>,
    pub response_extra_info: Option<QueryResponseExtraInfo>,
}

impl QueryResponseItem {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Emit the record. Timestamps become tick offsets from the block's
    /// earliest time.
    pub fn write_cbor<W: Write>(
        &self,
        enc: &mut CborEncoder<W>,
        earliest_time: DateTime<Utc>,
        ticks_per_second: u64,
    ) -> io::Result<()> {
        use QueryResponseField as F;

        enc.write_map_header(None)?;
        if let Some(t) = self.tstamp {
            enc.write_kv_signed(
                F::TimeOffset.index(),
                delta_to_ticks(t - earliest_time, ticks_per_second),
            )?;
        }
        enc.write_kv_opt(F::ClientAddressIndex.index(), self.client_address)?;
        enc.write_kv_opt(F::ClientPort.index(), self.client_port.map(u64::from))?;
        enc.write_kv_opt(F::TransactionId.index(), self.id.map(u64::from))?;
        enc.write_kv_opt(F::QrSignatureIndex.index(), self.signature)?;
        enc.write_kv_opt(F::ClientHoplimit.index(), self.hoplimit.map(u64::from))?;
        if let Some(delay) = self.response_delay {
            enc.write_kv_signed(
                F::ResponseDelay.index(),
                delta_to_ticks(delay, ticks_per_second),
            )?;
        }
        enc.write_kv_opt(F::QueryNameIndex.index(), self.qname)?;
        enc.write_kv_opt(F::QuerySize.index(), self.query_size.map(u64::from))?;
        enc.write_kv_opt(F::ResponseSize.index(), self.response_size.map(u64::from))?;
        if let Some(ref ei) = self.query_extra_info {
            ei.write_cbor(enc, F::QueryExtended.index())?;
        }
        if let Some(ref ei) = self.response_extra_info {
            ei.write_cbor(enc, F::ResponseExtended.index())?;
        }
        enc.write_break()
    }
}

/// Key of the per-block address event multiset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddressEventKey {
    pub event_type: AddressEventType,
    pub code: Option<u16>,
    pub address: Index,
    pub transport_flags: u8,
}

impl AddressEventKey {
    fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>, count: u64) -> io::Result<()> {
        use AddressEventCountField as F;

        enc.write_map_header(None)?;
        enc.write_kv(F::AeType.index(), self.event_type as u64)?;
        enc.write_kv_opt(F::AeCode.index(), self.code.map(u64::from))?;
        enc.write_kv(F::AeAddressIndex.index(), self.address)?;
        enc.write_kv(F::AeTransportFlags.index(), self.transport_flags as u64)?;
        enc.write_kv(F::AeCount.index(), count)?;
        enc.write_break()
    }
}

/// The in-progress block: times, statistics, interning tables, records
/// and address event counts.
#[derive(Debug)]
pub struct BlockData {
    params: BlockParameters,

    pub earliest_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub start_packet_statistics: PacketStatistics,
    pub last_packet_statistics: PacketStatistics,

    ip_addresses: HeaderList<Vec<u8>>,
    class_types: HeaderList<ClassType>,
    names_rdatas: HeaderList<Vec<u8>>,
    query_response_signatures: HeaderList<QueryResponseSignature>,
    questions_lists: HeaderList<Vec<Index>>,
    questions: HeaderList<Question>,
    rrs_lists: HeaderList<Vec<Index>>,
    resource_records: HeaderList<ResourceRecord>,

    query_response_items: Vec<QueryResponseItem>,
    address_event_counts: BTreeMap<AddressEventKey, u64>,
}

impl BlockData {
    /// Create an empty block governed by the given parameters.
    pub fn new(params: BlockParameters) -> Self {
        Self {
            params,
            earliest_time: None,
            start_time: None,
            end_time: None,
            start_packet_statistics: PacketStatistics::default(),
            last_packet_statistics: PacketStatistics::default(),
            ip_addresses: HeaderList::default(),
            class_types: HeaderList::default(),
            names_rdatas: HeaderList::default(),
            query_response_signatures: HeaderList::default(),
            questions_lists: HeaderList::default(),
            questions: HeaderList::default(),
            rrs_lists: HeaderList::default(),
            resource_records: HeaderList::default(),
            query_response_items: Vec::new(),
            address_event_counts: BTreeMap::new(),
        }
    }

    pub fn parameters(&self) -> &BlockParameters {
        &self.params
    }

    pub fn ticks_per_second(&self) -> u64 {
        self.params.storage_parameters.ticks_per_second
    }

    /// True once the block holds the configured number of records.
    pub fn is_full(&self) -> bool {
        self.query_response_items.len() as u64 >= self.params.storage_parameters.max_block_items
    }

    pub fn record_count(&self) -> usize {
        self.query_response_items.len()
    }

    /// Intern a (masked) address, returning its table index.
    pub fn add_address(&mut self, address: Vec<u8>) -> Index {
        self.ip_addresses.add(address)
    }

    /// Intern a domain name in wire form, or opaque RDATA.
    pub fn add_name_rdata(&mut self, data: Vec<u8>) -> Index {
        self.names_rdatas.add(data)
    }

    pub fn add_classtype(&mut self, classtype: ClassType) -> Index {
        self.class_types.add(classtype)
    }

    pub fn add_question(&mut self, question: Question) -> Index {
        self.questions.add(question)
    }

    pub fn add_resource_record(&mut self, rr: ResourceRecord) -> Index {
        self.resource_records.add(rr)
    }

    pub fn add_questions_list(&mut self, indices: Vec<Index>) -> Index {
        self.questions_lists.add(indices)
    }

    pub fn add_rrs_list(&mut self, indices: Vec<Index>) -> Index {
        self.rrs_lists.add(indices)
    }

    pub fn add_query_response_signature(&mut self, signature: QueryResponseSignature) -> Index {
        self.query_response_signatures.add(signature)
    }

    pub fn append_record(&mut self, item: QueryResponseItem) {
        self.query_response_items.push(item);
    }

    /// Count one address event. The address is interned like any other.
    pub fn count_address_event(
        &mut self,
        event_type: AddressEventType,
        code: Option<u16>,
        address: Vec<u8>,
        is_ipv6: bool,
    ) {
        let key = AddressEventKey {
            event_type,
            code,
            address: self.ip_addresses.add(address),
            transport_flags: if is_ipv6 { transport::IPV6 } else { 0 },
        };
        *self.address_event_counts.entry(key).or_insert(0) += 1;
    }

    /// Reset for the next block. Block parameters are retained; all
    /// indices handed out so far are invalidated.
    pub fn clear(&mut self) {
        self.earliest_time = None;
        self.start_time = None;
        self.end_time = None;
        self.start_packet_statistics = PacketStatistics::default();
        self.last_packet_statistics = PacketStatistics::default();
        self.ip_addresses.clear();
        self.class_types.clear();
        self.names_rdatas.clear();
        self.query_response_signatures.clear();
        self.questions_lists.clear();
        self.questions.clear();
        self.rrs_lists.clear();
        self.resource_records.clear();
        self.query_response_items.clear();
        self.address_event_counts.clear();
    }

    /// The reference instant record time offsets are taken from.
    fn effective_earliest(&self) -> DateTime<Utc> {
        self.earliest_time
            .or(self.start_time)
            .or(self.end_time)
            .unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Emit the whole block in canonical order: preamble, statistics,
    /// tables, records, address event counts.
    pub fn write_cbor<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        let tps = self.ticks_per_second();
        let earliest = self.effective_earliest();

        enc.write_map_header(None)?;

        // Preamble. The start time is suppressed when replayed traffic
        // put the earliest record before the collector started.
        let write_start = match self.start_time {
            Some(start) => start <= earliest,
            None => false,
        };
        let nitems = 1 + self.end_time.is_some() as u64 + write_start as u64;
        enc.write_i64(BlockField::Preamble.index())?;
        enc.write_map_header(Some(nitems))?;
        enc.write_i64(BlockPreambleField::EarliestTime.index())?;
        Timestamp::new(earliest, tps).write_cbor(enc)?;
        if let Some(end) = self.end_time {
            enc.write_i64(BlockPreambleField::EndTime.index())?;
            Timestamp::new(end, tps).write_cbor(enc)?;
        }
        if write_start {
            if let Some(start) = self.start_time {
                enc.write_i64(BlockPreambleField::StartTime.index())?;
                Timestamp::new(start, tps).write_cbor(enc)?;
            }
        }

        enc.write_i64(BlockField::Statistics.index())?;
        self.write_stats(enc)?;

        enc.write_i64(BlockField::Tables.index())?;
        self.write_tables(enc)?;

        if !self.query_response_items.is_empty() {
            enc.write_i64(BlockField::QueryResponses.index())?;
            enc.write_array_header(Some(self.query_response_items.len() as u64))?;
            for item in &self.query_response_items {
                item.write_cbor(enc, earliest, tps)?;
            }
        }

        if !self.address_event_counts.is_empty() {
            enc.write_i64(BlockField::AddressEventCounts.index())?;
            enc.write_array_header(Some(self.address_event_counts.len() as u64))?;
            for (key, count) in &self.address_event_counts {
                key.write_cbor(enc, *count)?;
            }
        }

        enc.write_break()
    }

    /// Statistics are per-block deltas between the snapshots at block
    /// start and end.
    fn write_stats<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use BlockStatisticsField as F;

        let s = &self.start_packet_statistics;
        let e = &self.last_packet_statistics;
        let delta = |a: u64, b: u64| b.wrapping_sub(a);

        enc.write_map_header(None)?;
        enc.write_kv(
            F::ProcessedMessages.index(),
            delta(s.processed_message_count, e.processed_message_count),
        )?;
        enc.write_kv(F::QrDataItems.index(), delta(s.qr_pair_count, e.qr_pair_count))?;
        enc.write_kv(
            F::UnmatchedQueries.index(),
            delta(s.query_without_response_count, e.query_without_response_count),
        )?;
        enc.write_kv(
            F::UnmatchedResponses.index(),
            delta(s.response_without_query_count, e.response_without_query_count),
        )?;
        enc.write_kv(
            F::DiscardedOpcode.index(),
            delta(s.discarded_opcode_count, e.discarded_opcode_count),
        )?;
        enc.write_kv(
            F::MalformedItems.index(),
            delta(s.malformed_message_count, e.malformed_message_count),
        )?;
        enc.write_kv(
            F::NonDnsPackets.index(),
            delta(s.unhandled_packet_count, e.unhandled_packet_count),
        )?;
        enc.write_kv(
            F::OutOfOrderPackets.index(),
            delta(s.out_of_order_packet_count, e.out_of_order_packet_count),
        )?;
        enc.write_kv(
            F::MissingPairs.index(),
            delta(s.output_cbor_drop_count, e.output_cbor_drop_count),
        )?;
        enc.write_kv(
            F::MissingPackets.index(),
            delta(s.output_raw_pcap_drop_count, e.output_raw_pcap_drop_count),
        )?;
        enc.write_kv(
            F::MissingNonDns.index(),
            delta(
                s.output_ignored_pcap_drop_count,
                e.output_ignored_pcap_drop_count,
            ),
        )?;
        enc.write_kv(F::Packets.index(), delta(s.raw_packet_count, e.raw_packet_count))?;
        enc.write_kv(
            F::MissingReceived.index(),
            delta(s.sniffer_drop_count, e.sniffer_drop_count),
        )?;
        enc.write_kv(
            F::DiscardedPackets.index(),
            delta(s.discarded_sampling_count, e.discarded_sampling_count),
        )?;
        enc.write_kv(
            F::MissingMatcher.index(),
            delta(s.matcher_drop_count, e.matcher_drop_count),
        )?;
        enc.write_kv(F::PcapPackets.index(), delta(s.pcap_recv_count, e.pcap_recv_count))?;
        enc.write_kv(
            F::PcapMissingIf.index(),
            delta(s.pcap_ifdrop_count, e.pcap_ifdrop_count),
        )?;
        enc.write_kv(
            F::PcapMissingOs.index(),
            delta(s.pcap_drop_count, e.pcap_drop_count),
        )?;
        enc.write_break()
    }

    /// The table map omits empty tables entirely.
    fn write_tables<W: Write>(&self, enc: &mut CborEncoder<W>) -> io::Result<()> {
        use BlockTablesField as F;

        enc.write_map_header(None)?;
        if !self.ip_addresses.is_empty() {
            enc.write_i64(F::IpAddress.index())?;
            self.ip_addresses.write_cbor(enc)?;
        }
        if !self.class_types.is_empty() {
            enc.write_i64(F::Classtype.index())?;
            self.class_types.write_cbor(enc)?;
        }
        if !self.names_rdatas.is_empty() {
            enc.write_i64(F::NameRdata.index())?;
            self.names_rdatas.write_cbor(enc)?;
        }
        if !self.query_response_signatures.is_empty() {
            enc.write_i64(F::QueryResponseSignature.index())?;
            self.query_response_signatures.write_cbor(enc)?;
        }
        if !self.questions_lists.is_empty() {
            enc.write_i64(F::QuestionList.index())?;
            self.questions_lists.write_cbor(enc)?;
        }
        if !self.questions.is_empty() {
            enc.write_i64(F::QuestionRr.index())?;
            self.questions.write_cbor(enc)?;
        }
        if !self.rrs_lists.is_empty() {
            enc.write_i64(F::RrList.index())?;
            self.rrs_lists.write_cbor(enc)?;
        }
        if !self.resource_records.is_empty() {
            enc.write_i64(F::Rr.index())?;
            self.resource_records.write_cbor(enc)?;
        }
        enc.write_break()
    }
}

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;
