//! Block C-DNS writer
//!
//! The orchestrator of the output side. The matcher pushes matched
//! transactions in; this type populates the block accumulator, applies
//! the configured exclusion hints, rotates blocks and files, and emits
//! the framed CBOR stream through a compressing sink.
//!
//! # Call protocol
//!
//! For each transaction the caller must invoke, in order:
//! `check_for_rotation`, `start_record`, `write_basic`, optionally one
//! extended group per side (balanced start/end with section calls in
//! between), then `end_record`. [`BlockCborWriter::write_qr`] drives the
//! whole sequence for callers that have no special needs. A file is only
//! opened when the first record arrives.

use std::mem;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use cdns_config::{Config, SectionConfig};
use cdns_format::block::{
    BlockData, ClassType, Index, QueryResponseExtraInfo, QueryResponseItem,
    QueryResponseSignature, Question, ResourceRecord,
};
use cdns_format::cbor::CborEncoder;
use cdns_format::fields::{
    self, qr_flags, FilePreambleField, FILE_FORMAT_ID, MAJOR_FORMAT_VERSION,
    MINOR_FORMAT_VERSION, PRIVATE_VERSION,
};
use cdns_protocol::{AddressEvent, DnsMessage, PacketStatistics, QueryResponse, QuestionData, RrData};

use crate::error::Result;
use crate::rotate::OutputPattern;
use crate::stream::StreamSink;

/// Which side of the transaction an open extended group belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupSide {
    Query,
    Response,
}

/// Which section the next question/RR write lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionKind {
    Questions,
    Answers,
    Authority,
    Additional,
}

/// Truncate an address to the configured prefix, in network byte order.
/// Two addresses sharing the masked prefix intern to the same entry;
/// the loss is deliberate.
fn mask_address(addr: &IpAddr, prefix_v4: u8, prefix_v6: u8) -> Vec<u8> {
    let (mut bytes, prefix_len) = match addr {
        IpAddr::V4(a) => (a.octets().to_vec(), u32::from(prefix_v4)),
        IpAddr::V6(a) => (a.octets().to_vec(), u32::from(prefix_v6)),
    };
    let nbytes = prefix_len.div_ceil(8) as usize;
    bytes.truncate(nbytes);
    if nbytes > 0 {
        let shift = nbytes as u32 * 8 - prefix_len;
        bytes[nbytes - 1] &= 0xffu8 << shift;
    }
    bytes
}

/// The block-oriented C-DNS archive writer.
pub struct BlockCborWriter {
    config: Config,
    pattern: OutputPattern,
    live: bool,

    enc: Option<CborEncoder<StreamSink>>,
    filename: Option<PathBuf>,
    open_timestamp: Option<DateTime<Utc>>,
    records_since_open: u64,
    rotate_flag: Arc<AtomicBool>,

    data: BlockData,
    pending: QueryResponseItem,

    group: Option<GroupSide>,
    section: Option<SectionKind>,
    extra_questions: Vec<Index>,
    extra_answers: Vec<Index>,
    extra_authority: Vec<Index>,
    extra_additional: Vec<Index>,

    last_end_block_statistics: PacketStatistics,
    need_start_block_stats: bool,
}

impl BlockCborWriter {
    /// Build a writer from validated configuration. With `live` set,
    /// block times default to the wall clock rather than record data.
    pub fn new(config: Config, live: bool) -> Result<Self> {
        config.validate()?;

        let pattern = OutputPattern::new(
            format!(
                "{}{}",
                config.output_pattern,
                config.compression.suggested_extension()
            ),
            config.rotation_period,
        );
        let mut data = BlockData::new(config.block_parameters());
        if live {
            data.start_time = Some(Utc::now());
        }

        Ok(Self {
            config,
            pattern,
            live,
            enc: None,
            filename: None,
            open_timestamp: None,
            records_since_open: 0,
            rotate_flag: Arc::new(AtomicBool::new(false)),
            data,
            pending: QueryResponseItem::default(),
            group: None,
            section: None,
            extra_questions: Vec::new(),
            extra_answers: Vec::new(),
            extra_authority: Vec::new(),
            extra_additional: Vec::new(),
            last_end_block_statistics: PacketStatistics::default(),
            need_start_block_stats: true,
        })
    }

    /// Path of the file currently being written, if one is open.
    pub fn current_filename(&self) -> Option<&PathBuf> {
        self.filename.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.enc.is_some()
    }

    /// Shared flag a signal handler may set to request rotation. The
    /// handler must only store `true`; the writer consumes the flag at
    /// record boundaries.
    pub fn rotate_trigger(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.rotate_flag)
    }

    /// Close the current file and open the next if any rotation trigger
    /// fired: no file open yet, on-disk size reached, the rotation
    /// window moved on, or an external rotate request. A rotate request
    /// on a file with no records yet is a no-op.
    pub fn check_for_rotation(&mut self, timestamp: DateTime<Utc>) -> Result<()> {
        let requested = self.rotate_flag.swap(false, Ordering::Relaxed);
        let forced = requested && self.records_since_open > 0;

        let size_reached = self.config.max_output_size > 0
            && self
                .enc
                .as_ref()
                .is_some_and(|e| e.get_ref().bytes_written() >= self.config.max_output_size);
        let window_passed = self
            .open_timestamp
            .is_some_and(|opened| self.pattern.need_rotate(timestamp, opened));

        if self.enc.is_some() && !size_reached && !window_passed && !forced {
            return Ok(());
        }

        if self.enc.is_some() {
            self.data.end_time = Some(timestamp);
            self.close()?;
            self.data.start_time = Some(timestamp);
        }

        let filename = self.pattern.filename(timestamp);
        tracing::info!(file = %filename.display(), "rotating C-DNS output to new file");
        let sink = StreamSink::open(
            &filename,
            self.config.compression,
            self.config.compression_level,
            self.config.log_file_handling,
        )?;
        self.enc = Some(CborEncoder::new(sink));
        self.filename = Some(filename);
        self.open_timestamp = Some(timestamp);
        self.records_since_open = 0;
        self.write_file_header()
    }

    /// Request rotation as an external agent would, then act on it.
    pub fn force_rotate(&mut self, timestamp: DateTime<Utc>) -> Result<()> {
        self.rotate_flag.store(true, Ordering::Relaxed);
        self.check_for_rotation(timestamp)
    }

    /// Count an address event into the current block and take a
    /// statistics snapshot.
    pub fn write_address_event(
        &mut self,
        ae: &AddressEvent,
        stats: &PacketStatistics,
    ) -> Result<()> {
        if !self.config.exclude.address_events {
            let masked = mask_address(
                &ae.address,
                self.config.client_address_prefix_ipv4,
                self.config.client_address_prefix_ipv6,
            );
            self.data
                .count_address_event(ae.event_type, ae.code, masked, ae.is_ipv6());
        }
        self.update_block_stats(stats);
        Ok(())
    }

    /// Begin a record. Emits the current block first if it is full.
    pub fn start_record(&mut self, qr: &QueryResponse) -> Result<()> {
        if self.data.is_full() {
            let timestamp = qr.timestamp();
            self.data.end_time = Some(timestamp);
            self.write_block()?;
            self.data.start_time = Some(timestamp);
        }
        self.pending.clear();
        self.clear_extra_state();
        Ok(())
    }

    /// Populate the pending record and its signature, honouring the
    /// exclusion hints.
    pub fn write_basic(&mut self, qr: &QueryResponse, stats: &PacketStatistics) -> Result<()> {
        let exclude = self.config.exclude;
        let mut qs = QueryResponseSignature::default();
        self.pending.qr_flags = 0;

        self.update_block_stats(stats);

        let d = qr.keyed_message();
        let timestamp = d.timestamp;
        if self.data.record_count() == 0
            || self.data.earliest_time.is_none_or(|e| timestamp < e)
        {
            self.data.earliest_time = Some(timestamp);
        }
        if self.config.start_end_times_from_data {
            if self.data.end_time.is_none_or(|t| timestamp > t) {
                self.data.end_time = Some(timestamp);
            }
            if self.data.start_time.is_none_or(|t| timestamp < t) {
                self.data.start_time = Some(timestamp);
            }
        }

        // Signature fields shared with other transactions at this
        // endpoint.
        if !exclude.server_address {
            if let Some(server) = d.server_address {
                qs.server_address = Some(self.add_server_address(&server));
            }
        }
        if !exclude.server_port {
            qs.server_port = d.server_port;
        }
        if !exclude.transport {
            qs.qr_transport_flags = Some(fields::transport_flags(qr));
        }
        if !exclude.transaction_type {
            qs.qr_type = qr.transaction_type.map(|t| t as u8);
        }
        if !exclude.dns_flags {
            qs.dns_flags = Some(fields::dns_flags(qr));
        }

        // Per-record fields.
        if !exclude.timestamp {
            self.pending.tstamp = Some(timestamp);
        }
        if !exclude.client_address {
            if let Some(client) = d.client_address {
                self.pending.client_address = Some(self.add_client_address(&client));
            }
        }
        if !exclude.client_port {
            self.pending.client_port = d.client_port;
        }
        if !exclude.transaction_id {
            self.pending.id = Some(d.id);
        }
        if !exclude.query_qdcount {
            qs.qdcount = Some(d.qdcount);
        }

        // First question.
        match d.questions.first().cloned() {
            None => self.pending.qr_flags |= qr_flags::QUERY_HAS_NO_QUESTION,
            Some(question) => {
                if !exclude.query_class_type {
                    qs.query_classtype = Some(self.data.add_classtype(ClassType {
                        qtype: Some(question.qtype),
                        qclass: Some(question.qclass),
                    }));
                }
                if !exclude.query_name {
                    self.pending.qname = Some(self.data.add_name_rdata(question.qname));
                }
            }
        }

        if let Some(q) = qr.query() {
            self.pending.qr_flags |= qr_flags::HAS_QUERY;
            if !exclude.query_size {
                self.pending.query_size = q.wire_size;
            }
            if !exclude.client_hoplimit {
                self.pending.hoplimit = q.hoplimit;
            }
            if !exclude.query_opcode {
                qs.query_opcode = Some(q.opcode);
            }
            if !exclude.query_rcode {
                qs.query_rcode = Some(u16::from(q.rcode));
            }
            if !exclude.query_ancount {
                qs.query_ancount = Some(q.ancount);
            }
            if !exclude.query_nscount {
                qs.query_nscount = Some(q.nscount);
            }
            if !exclude.query_arcount {
                qs.query_arcount = Some(q.arcount);
            }
            if let Some(edns) = q.edns0.clone() {
                if !exclude.query_rcode {
                    qs.query_rcode =
                        qs.query_rcode.map(|r| r + (u16::from(edns.extended_rcode) << 4));
                }
                self.pending.qr_flags |= qr_flags::QUERY_HAS_OPT;
                if !exclude.query_udp_size {
                    qs.query_edns_payload_size = Some(edns.udp_payload_size);
                }
                if !exclude.query_edns_version {
                    qs.query_edns_version = Some(edns.version);
                }
                if !exclude.query_opt_rdata {
                    qs.query_opt_rdata = Some(self.data.add_name_rdata(edns.opt_rdata));
                }
            }
        }

        if let Some(r) = qr.response() {
            self.pending.qr_flags |= qr_flags::HAS_RESPONSE;
            if !exclude.response_size {
                self.pending.response_size = r.wire_size;
            }
            // A response-only transaction still records the opcode.
            if !exclude.query_opcode && qs.query_opcode.is_none() {
                qs.query_opcode = Some(r.opcode);
            }
            if !exclude.response_rcode {
                qs.response_rcode = Some(u16::from(r.rcode));
            }
            if let Some(edns) = &r.edns0 {
                if !exclude.response_rcode {
                    qs.response_rcode = qs
                        .response_rcode
                        .map(|rc| rc + (u16::from(edns.extended_rcode) << 4));
                }
                self.pending.qr_flags |= qr_flags::RESPONSE_HAS_OPT;
            }
            if r.qdcount == 0 {
                self.pending.qr_flags |= qr_flags::RESPONSE_HAS_NO_QUESTION;
            }
        }

        if let (Some(q), Some(r)) = (qr.query(), qr.response()) {
            if !exclude.response_delay {
                self.pending.response_delay = Some(r.timestamp - q.timestamp);
            }
        }

        if !exclude.qr_flags {
            qs.qr_flags = Some(self.pending.qr_flags);
        }
        if !exclude.qr_signature {
            self.pending.signature = Some(self.data.add_query_response_signature(qs));
        }
        Ok(())
    }

    /// The following section calls populate the query side.
    pub fn start_extended_query_group(&mut self) {
        debug_assert!(self.group.is_none(), "extended group already open");
        if self.pending.query_extra_info.is_none() {
            self.pending.query_extra_info = Some(QueryResponseExtraInfo::default());
        }
        self.group = Some(GroupSide::Query);
    }

    /// The following section calls populate the response side.
    pub fn start_extended_response_group(&mut self) {
        debug_assert!(self.group.is_none(), "extended group already open");
        if self.pending.response_extra_info.is_none() {
            self.pending.response_extra_info = Some(QueryResponseExtraInfo::default());
        }
        self.group = Some(GroupSide::Response);
    }

    /// Intern the buffered questions and RR sections into list indices
    /// on the open group's extended-info slot.
    pub fn end_extended_group(&mut self) {
        debug_assert!(self.group.is_some(), "no extended group open");

        let mut info = QueryResponseExtraInfo::default();
        if !self.extra_questions.is_empty() {
            info.questions_list =
                Some(self.data.add_questions_list(mem::take(&mut self.extra_questions)));
        }
        if !self.extra_answers.is_empty() {
            info.answers_list = Some(self.data.add_rrs_list(mem::take(&mut self.extra_answers)));
        }
        if !self.extra_authority.is_empty() {
            info.authority_list =
                Some(self.data.add_rrs_list(mem::take(&mut self.extra_authority)));
        }
        if !self.extra_additional.is_empty() {
            info.additional_list =
                Some(self.data.add_rrs_list(mem::take(&mut self.extra_additional)));
        }

        let slot = match self.group {
            Some(GroupSide::Query) => &mut self.pending.query_extra_info,
            Some(GroupSide::Response) => &mut self.pending.response_extra_info,
            None => {
                self.clear_extra_state();
                return;
            }
        };
        let target = slot.get_or_insert_with(QueryResponseExtraInfo::default);
        if info.questions_list.is_some() {
            target.questions_list = info.questions_list;
        }
        if info.answers_list.is_some() {
            target.answers_list = info.answers_list;
        }
        if info.authority_list.is_some() {
            target.authority_list = info.authority_list;
        }
        if info.additional_list.is_some() {
            target.additional_list = info.additional_list;
        }

        self.clear_extra_state();
    }

    pub fn start_questions_section(&mut self) {
        debug_assert!(self.group.is_some(), "section outside an extended group");
        self.section = Some(SectionKind::Questions);
    }

    pub fn start_answers_section(&mut self) {
        debug_assert!(self.group.is_some(), "section outside an extended group");
        self.section = Some(SectionKind::Answers);
    }

    pub fn start_authority_section(&mut self) {
        debug_assert!(self.group.is_some(), "section outside an extended group");
        self.section = Some(SectionKind::Authority);
    }

    pub fn start_additional_section(&mut self) {
        debug_assert!(self.group.is_some(), "section outside an extended group");
        self.section = Some(SectionKind::Additional);
    }

    pub fn end_section(&mut self) {
        self.section = None;
    }

    /// Buffer one extra question for the open group.
    pub fn write_question(&mut self, question: &QuestionData) {
        debug_assert_eq!(self.section, Some(SectionKind::Questions));
        let exclude = self.config.exclude;
        let mut q = Question::default();
        if !exclude.query_name {
            q.qname = Some(self.data.add_name_rdata(question.qname.clone()));
        }
        if !exclude.query_class_type {
            q.classtype = Some(self.data.add_classtype(ClassType {
                qtype: Some(question.qtype),
                qclass: Some(question.qclass),
            }));
        }
        self.extra_questions.push(self.data.add_question(q));
    }

    /// Buffer one resource record into the section last started.
    pub fn write_resource_record(&mut self, resource: &RrData) {
        let exclude = self.config.exclude;
        let mut rr = ResourceRecord::default();
        if !exclude.query_name {
            rr.name = Some(self.data.add_name_rdata(resource.name.clone()));
        }
        if !exclude.query_class_type {
            rr.classtype = Some(self.data.add_classtype(ClassType {
                qtype: Some(resource.rtype),
                qclass: Some(resource.rclass),
            }));
        }
        if !exclude.rr_ttl {
            rr.ttl = Some(resource.ttl);
        }
        if !exclude.rr_rdata {
            rr.rdata = Some(self.data.add_name_rdata(resource.rdata.clone()));
        }
        let idx = self.data.add_resource_record(rr);
        match self.section {
            Some(SectionKind::Answers) => self.extra_answers.push(idx),
            Some(SectionKind::Authority) => self.extra_authority.push(idx),
            Some(SectionKind::Additional) => self.extra_additional.push(idx),
            Some(SectionKind::Questions) | None => {
                debug_assert!(false, "resource record outside an RR section")
            }
        }
    }

    /// Append the pending record to the block.
    pub fn end_record(&mut self, _qr: &QueryResponse) -> Result<()> {
        self.data.append_record(mem::take(&mut self.pending));
        self.records_since_open += 1;
        Ok(())
    }

    /// Drive the whole per-transaction protocol in one call.
    pub fn write_qr(&mut self, qr: &QueryResponse, stats: &PacketStatistics) -> Result<()> {
        self.check_for_rotation(qr.timestamp())?;
        self.start_record(qr)?;
        self.write_basic(qr, stats)?;
        if let Some(q) = qr.query() {
            let sections = self.config.query_sections;
            if sections.any() {
                self.start_extended_query_group();
                self.write_sections(q, sections);
                self.end_extended_group();
            }
        }
        if let Some(r) = qr.response() {
            let sections = self.config.response_sections;
            if sections.any() {
                self.start_extended_response_group();
                self.write_sections(r, sections);
                self.end_extended_group();
            }
        }
        self.end_record(qr)
    }

    fn write_sections(&mut self, message: &DnsMessage, sections: SectionConfig) {
        if sections.extra_questions && message.questions.len() > 1 {
            self.start_questions_section();
            for question in &message.questions[1..] {
                self.write_question(question);
            }
            self.end_section();
        }
        if sections.answers && !message.answers.is_empty() {
            self.start_answers_section();
            for rr in &message.answers {
                self.write_resource_record(rr);
            }
            self.end_section();
        }
        if sections.authority && !message.authorities.is_empty() {
            self.start_authority_section();
            for rr in &message.authorities {
                self.write_resource_record(rr);
            }
            self.end_section();
        }
        if sections.additional && !message.additionals.is_empty() {
            self.start_additional_section();
            for rr in &message.additionals {
                self.write_resource_record(rr);
            }
            self.end_section();
        }
    }

    /// Finish the current file: emit the in-progress block, the file
    /// footer, and move the output into place. A writer that never
    /// opened a file closes silently.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut enc) = self.enc.take() else {
            return Ok(());
        };
        self.open_timestamp = None;
        self.filename = None;

        let finish = (|| -> Result<()> {
            if self.live && self.data.end_time.is_none() {
                self.data.end_time = Some(Utc::now());
            }
            self.data.last_packet_statistics = self.last_end_block_statistics;
            self.data.write_cbor(&mut enc)?;
            self.data.clear();
            self.need_start_block_stats = true;
            enc.write_break()?;
            enc.flush()?;
            Ok(())
        })();

        match finish {
            Ok(()) => {
                let sink = enc.into_inner()?;
                sink.finish()
            }
            Err(e) => {
                // Dropping the sink discards the temporary file; the
                // final name is never created.
                drop(enc);
                Err(e)
            }
        }
    }

    fn write_file_header(&mut self) -> Result<()> {
        let block_parameters = self.data.parameters().clone();
        let Some(enc) = self.enc.as_mut() else {
            return Ok(());
        };
        enc.write_array_header(Some(3))?;
        enc.write_text(FILE_FORMAT_ID)?;

        enc.write_map_header(Some(4))?;
        enc.write_kv(
            FilePreambleField::MajorFormatVersion.index(),
            MAJOR_FORMAT_VERSION,
        )?;
        enc.write_kv(
            FilePreambleField::MinorFormatVersion.index(),
            MINOR_FORMAT_VERSION,
        )?;
        enc.write_kv(FilePreambleField::PrivateVersion.index(), PRIVATE_VERSION)?;
        enc.write_i64(FilePreambleField::BlockParameters.index())?;
        // One parameters entry per file; every block refers to it.
        enc.write_array_header(Some(1))?;
        block_parameters.write_cbor(enc)?;

        // Start of the file's block sequence.
        enc.write_array_header(None)?;
        Ok(())
    }

    fn write_block(&mut self) -> Result<()> {
        let Some(enc) = self.enc.as_mut() else {
            return Ok(());
        };
        self.data.last_packet_statistics = self.last_end_block_statistics;
        self.data.write_cbor(enc)?;
        self.data.clear();
        self.need_start_block_stats = true;
        Ok(())
    }

    fn update_block_stats(&mut self, stats: &PacketStatistics) {
        if self.need_start_block_stats {
            self.data.start_packet_statistics = self.last_end_block_statistics;
            self.need_start_block_stats = false;
        }
        self.last_end_block_statistics = *stats;
    }

    fn add_client_address(&mut self, addr: &IpAddr) -> Index {
        let masked = mask_address(
            addr,
            self.config.client_address_prefix_ipv4,
            self.config.client_address_prefix_ipv6,
        );
        self.data.add_address(masked)
    }

    fn add_server_address(&mut self, addr: &IpAddr) -> Index {
        let masked = mask_address(
            addr,
            self.config.server_address_prefix_ipv4,
            self.config.server_address_prefix_ipv6,
        );
        self.data.add_address(masked)
    }

    fn clear_extra_state(&mut self) {
        self.group = None;
        self.section = None;
        self.extra_questions.clear();
        self.extra_answers.clear();
        self.extra_authority.clear();
        self.extra_additional.clear();
    }
}

impl Drop for BlockCborWriter {
    fn drop(&mut self) {
        if self.enc.is_some() {
            if let Err(e) = self.close() {
                tracing::error!(error = %e, "failed to close C-DNS writer");
            }
        }
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
