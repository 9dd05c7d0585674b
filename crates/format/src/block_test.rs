//! Tests for the block data accumulator

use chrono::{DateTime, TimeDelta, Utc};

use crate::block::*;
use crate::cbor::CborEncoder;
use crate::params::{BlockParameters, StorageParameters};
use cdns_protocol::AddressEventType;

fn encode(f: impl FnOnce(&mut CborEncoder<Vec<u8>>)) -> Vec<u8> {
    let mut enc = CborEncoder::new(Vec::new());
    f(&mut enc);
    enc.into_inner().unwrap()
}

fn at(secs: i64, micros: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, micros * 1000).unwrap()
}

// ============================================================================
// Interning tables
// ============================================================================

#[test]
fn test_header_list_indices_are_one_based_and_stable() {
    let mut hl: HeaderList<Vec<u8>> = HeaderList::default();
    assert_eq!(hl.add(b"a".to_vec()), 1);
    assert_eq!(hl.add(b"b".to_vec()), 2);
    assert_eq!(hl.add(b"c".to_vec()), 3);
    // Repeated insertions return the original index.
    assert_eq!(hl.add(b"b".to_vec()), 2);
    assert_eq!(hl.add(b"a".to_vec()), 1);
    assert_eq!(hl.len(), 3);
    assert_eq!(hl.get(1), Some(&b"a".to_vec()));
    assert_eq!(hl.get(3), Some(&b"c".to_vec()));
}

#[test]
fn test_header_list_writes_insertion_order() {
    let mut hl: HeaderList<Vec<u8>> = HeaderList::default();
    hl.add(vec![1]);
    hl.add(vec![2]);
    hl.add(vec![3]);
    hl.add(vec![2]);
    let bytes = encode(|e| hl.write_cbor(e).unwrap());
    assert_eq!(bytes, [0x83, 0x41, 1, 0x41, 2, 0x41, 3]);
}

#[test]
fn test_signature_interning_structural_equality() {
    let mut block = BlockData::new(BlockParameters::default());
    let sig = QueryResponseSignature {
        server_port: Some(53),
        qdcount: Some(1),
        ..Default::default()
    };
    let a = block.add_query_response_signature(sig.clone());
    let b = block.add_query_response_signature(sig.clone());
    assert_eq!(a, b);

    // An unset field only compares equal to unset.
    let mut other = sig;
    other.query_opcode = Some(0);
    let c = block.add_query_response_signature(other);
    assert_ne!(a, c);
}

#[test]
fn test_index_lists_interned_by_content() {
    let mut block = BlockData::new(BlockParameters::default());
    let a = block.add_questions_list(vec![1, 2]);
    let b = block.add_questions_list(vec![1, 2]);
    let c = block.add_questions_list(vec![2, 1]);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

// ============================================================================
// Table entry serialisation
// ============================================================================

#[test]
fn test_classtype_encoding() {
    let ct = ClassType {
        qtype: Some(1),
        qclass: Some(1),
    };
    assert_eq!(
        encode(|e| ct.write_cbor(e).unwrap()),
        [0xa2, 0x00, 0x01, 0x01, 0x01]
    );
}

#[test]
fn test_question_omits_absent_members() {
    let q = Question {
        qname: Some(3),
        classtype: None,
    };
    assert_eq!(encode(|e| q.write_cbor(e).unwrap()), [0xa1, 0x00, 0x03]);
}

#[test]
fn test_resource_record_encoding() {
    let rr = ResourceRecord {
        name: Some(1),
        classtype: Some(2),
        ttl: Some(300),
        rdata: Some(4),
    };
    assert_eq!(
        encode(|e| rr.write_cbor(e).unwrap()),
        [0xa4, 0x00, 0x01, 0x01, 0x02, 0x02, 0x19, 0x01, 0x2c, 0x03, 0x04]
    );
}

#[test]
fn test_signature_encoding_field_keys() {
    let sig = QueryResponseSignature {
        server_address: Some(1),
        server_port: Some(53),
        qr_flags: Some(0x1f),
        qdcount: Some(1),
        response_rcode: Some(0),
        ..Default::default()
    };
    assert_eq!(
        encode(|e| sig.write_cbor(e).unwrap()),
        [
            0xa5, // definite map of the five set fields
            0x00, 0x01, // server address index
            0x01, 0x18, 53, // server port
            0x04, 0x18, 0x1f, // sig flags
            0x09, 0x01, // qdcount
            0x10, 0x00, // response rcode, key 16
        ]
    );
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_record_time_offset_in_ticks() {
    let earliest = at(10, 0);
    let item = QueryResponseItem {
        tstamp: Some(at(10, 5)),
        ..Default::default()
    };
    let bytes = encode(|e| item.write_cbor(e, earliest, 1_000_000).unwrap());
    assert_eq!(bytes, [0xbf, 0x00, 0x05, 0xff]);
}

#[test]
fn test_record_with_extended_info() {
    let item = QueryResponseItem {
        query_extra_info: Some(QueryResponseExtraInfo {
            questions_list: Some(1),
            answers_list: None,
            authority_list: None,
            additional_list: Some(2),
        }),
        ..Default::default()
    };
    let bytes = encode(|e| item.write_cbor(e, at(0, 0), 1_000_000).unwrap());
    assert_eq!(
        bytes,
        [0xbf, 0x0b, 0xbf, 0x00, 0x01, 0x03, 0x02, 0xff, 0xff]
    );
}

#[test]
fn test_record_response_delay_may_be_negative() {
    let item = QueryResponseItem {
        response_delay: Some(TimeDelta::microseconds(-7)),
        ..Default::default()
    };
    let bytes = encode(|e| item.write_cbor(e, at(0, 0), 1_000_000).unwrap());
    assert_eq!(bytes, [0xbf, 0x06, 0x26, 0xff]);
}

// ============================================================================
// Whole blocks
// ============================================================================

#[test]
fn test_empty_block_encoding() {
    let mut block = BlockData::new(BlockParameters::default());
    block.earliest_time = Some(at(1, 1));
    block.end_time = Some(at(1, 10));

    let bytes = encode(|e| block.write_cbor(e).unwrap());
    #[rustfmt::skip]
    let expected: Vec<u8> = vec![
        0xbf, // block map
        0x00, 0xa2, // preamble, two entries
            0x00, 0x82, 0x01, 0x01, // earliest time [1s, 1 tick]
            0x20, 0x82, 0x01, 0x0a, // end time [1s, 10 ticks], private key -1
        0x01, 0xbf, // statistics
            0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05, 0x00,
            0x20, 0x00, 0x21, 0x00, 0x22, 0x00, 0x23, 0x00, 0x24, 0x00, 0x25, 0x00,
            0x26, 0x00, 0x27, 0x00, 0x28, 0x00, 0x29, 0x00, 0x2a, 0x00, 0x2b, 0x00,
            0xff,
        0x02, 0xbf, 0xff, // tables, all empty and omitted
        0xff, // block terminator
    ];
    assert_eq!(bytes, expected);
}

#[test]
fn test_block_with_one_record_encoding() {
    let mut block = BlockData::new(BlockParameters::default());
    block.earliest_time = Some(at(10, 0));
    block.end_time = Some(at(11, 0));

    let addr = block.add_address(vec![1, 2, 3, 4]);
    let ct = block.add_classtype(ClassType {
        qtype: Some(1),
        qclass: Some(1),
    });
    let name = block.add_name_rdata(b"example".to_vec());
    let sig = block.add_query_response_signature(QueryResponseSignature {
        server_address: Some(addr),
        query_classtype: Some(ct),
        qdcount: Some(1),
        ..Default::default()
    });
    block.append_record(QueryResponseItem {
        tstamp: Some(at(10, 5)),
        client_address: Some(addr),
        client_port: Some(12345),
        id: Some(0x1234),
        signature: Some(sig),
        qname: Some(name),
        ..Default::default()
    });

    let bytes = encode(|e| block.write_cbor(e).unwrap());
    #[rustfmt::skip]
    let expected: Vec<u8> = vec![
        0xbf,
        0x00, 0xa2,
            0x00, 0x82, 0x0a, 0x00,
            0x20, 0x82, 0x0b, 0x00,
        0x01, 0xbf,
            0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05, 0x00,
            0x20, 0x00, 0x21, 0x00, 0x22, 0x00, 0x23, 0x00, 0x24, 0x00, 0x25, 0x00,
            0x26, 0x00, 0x27, 0x00, 0x28, 0x00, 0x29, 0x00, 0x2a, 0x00, 0x2b, 0x00,
            0xff,
        0x02, 0xbf,
            0x00, 0x81, 0x44, 0x01, 0x02, 0x03, 0x04, // address table
            0x01, 0x81, 0xa2, 0x00, 0x01, 0x01, 0x01, // classtype table
            0x02, 0x81, 0x47, b'e', b'x', b'a', b'm', b'p', b'l', b'e', // names
            0x03, 0x81, 0xa3, 0x00, 0x01, 0x08, 0x01, 0x09, 0x01, // signatures
            0xff,
        0x03, 0x81, // one record
            0xbf,
            0x00, 0x05, // 5 ticks after earliest
            0x01, 0x01, // client address index
            0x02, 0x19, 0x30, 0x39, // client port 12345
            0x03, 0x19, 0x12, 0x34, // transaction id
            0x04, 0x01, // signature index
            0x07, 0x01, // qname index
            0xff,
        0xff,
    ];
    assert_eq!(bytes, expected);
}

#[test]
fn test_block_start_time_after_earliest_suppressed() {
    // Replayed traffic can carry timestamps older than the collector
    // start; the start time is then left out of the preamble.
    let mut block = BlockData::new(BlockParameters::default());
    block.earliest_time = Some(at(100, 0));
    block.start_time = Some(at(200, 0));
    block.end_time = Some(at(300, 0));

    let bytes = encode(|e| block.write_cbor(e).unwrap());
    // Preamble map has two entries only: earliest and end.
    assert_eq!(&bytes[1..3], &[0x00, 0xa2]);

    let mut block = BlockData::new(BlockParameters::default());
    block.earliest_time = Some(at(100, 0));
    block.start_time = Some(at(50, 0));
    block.end_time = Some(at(300, 0));
    let bytes = encode(|e| block.write_cbor(e).unwrap());
    assert_eq!(&bytes[1..3], &[0x00, 0xa3]);
}

#[test]
fn test_is_full_and_clear() {
    let params = BlockParameters {
        storage_parameters: StorageParameters {
            max_block_items: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut block = BlockData::new(params);
    assert!(!block.is_full());
    block.append_record(QueryResponseItem::default());
    assert!(!block.is_full());
    block.append_record(QueryResponseItem::default());
    assert!(block.is_full());

    let idx = block.add_address(vec![9]);
    assert_eq!(idx, 1);

    block.clear();
    assert!(!block.is_full());
    assert_eq!(block.record_count(), 0);
    // Parameters survive a clear, indices restart.
    assert_eq!(block.parameters().storage_parameters.max_block_items, 2);
    assert_eq!(block.add_address(vec![8]), 1);
}

#[test]
fn test_address_events_counted_as_multiset() {
    let mut block = BlockData::new(BlockParameters::default());
    block.count_address_event(AddressEventType::TcpReset, None, vec![1, 2, 3, 4], false);
    block.count_address_event(AddressEventType::TcpReset, None, vec![1, 2, 3, 4], false);
    block.count_address_event(
        AddressEventType::IcmpDestUnreachable,
        Some(3),
        vec![1, 2, 3, 4],
        false,
    );
    block.earliest_time = Some(at(0, 0));

    let bytes = encode(|e| block.write_cbor(e).unwrap());
    // Address events key (4) followed by an array of two entries.
    assert!(bytes.windows(2).any(|w| w == [0x04, 0x82]));
    // The reset count reached 2: transport flags 0, ae-count 2, break.
    assert!(bytes.windows(5).any(|w| w == [0x03, 0x00, 0x04, 0x02, 0xff]));
    // The unreachable event was counted once.
    assert!(bytes.windows(5).any(|w| w == [0x03, 0x00, 0x04, 0x01, 0xff]));
}

#[test]
fn test_prefix_zero_addresses_collapse() {
    let mut block = BlockData::new(BlockParameters::default());
    // Masking to a zero-length prefix yields empty byte strings; they
    // must all intern to the same index.
    let a = block.add_address(Vec::new());
    let b = block.add_address(Vec::new());
    assert_eq!(a, 1);
    assert_eq!(b, 1);
}

#[test]
fn test_timestamp_tick_scaling() {
    let ts = Timestamp::new(at(1, 1), 1_000_000);
    assert_eq!(ts.secs, 1);
    assert_eq!(ts.ticks, 1);

    let ts = Timestamp::new(at(1, 1), 10_000_000);
    assert_eq!(ts.ticks, 10);
}
