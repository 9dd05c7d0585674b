//! Per-field exclusion hints
//!
//! The privacy/policy mask selecting which record fields are written.
//! Every flag defaults to `false` (include the field); setting one drops
//! the field from all records for the life of the writer, and clears the
//! matching presence bit in the file's storage hints so readers know not
//! to expect it.

use serde::Deserialize;

use cdns_format::fields::{
    other_data_hints, query_response_hints, query_response_signature_hints, rr_hints,
};
use cdns_format::params::StorageHints;

/// Which optional fields to leave out of the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HintsExcluded {
    pub client_address: bool,
    pub client_port: bool,
    pub client_hoplimit: bool,
    pub server_address: bool,
    pub server_port: bool,
    pub transport: bool,
    pub transaction_type: bool,
    pub timestamp: bool,
    pub transaction_id: bool,
    pub query_name: bool,
    pub query_class_type: bool,
    pub query_size: bool,
    pub response_size: bool,
    pub query_opcode: bool,
    pub query_rcode: bool,
    pub response_rcode: bool,
    pub dns_flags: bool,
    pub query_qdcount: bool,
    pub query_ancount: bool,
    pub query_nscount: bool,
    pub query_arcount: bool,
    pub query_udp_size: bool,
    pub query_edns_version: bool,
    pub query_opt_rdata: bool,
    pub response_delay: bool,
    pub qr_flags: bool,
    pub qr_signature: bool,
    pub rr_ttl: bool,
    pub rr_rdata: bool,
    pub address_events: bool,
}

impl HintsExcluded {
    /// Build the storage hints declared in the file preamble: the default
    /// hint set minus the presence bits of every excluded field.
    pub fn storage_hints(&self) -> StorageHints {
        let mut hints = StorageHints::default();

        let mut clear_qr = |excluded: bool, bit: u32| {
            if excluded {
                hints.query_response_hints &= !bit;
            }
        };
        clear_qr(self.timestamp, query_response_hints::TIME_OFFSET);
        clear_qr(self.client_address, query_response_hints::CLIENT_ADDRESS_INDEX);
        clear_qr(self.client_port, query_response_hints::CLIENT_PORT);
        clear_qr(self.transaction_id, query_response_hints::TRANSACTION_ID);
        clear_qr(self.qr_signature, query_response_hints::QR_SIGNATURE_INDEX);
        clear_qr(self.client_hoplimit, query_response_hints::CLIENT_HOPLIMIT);
        clear_qr(self.response_delay, query_response_hints::RESPONSE_DELAY);
        clear_qr(self.query_name, query_response_hints::QUERY_NAME_INDEX);
        clear_qr(self.query_size, query_response_hints::QUERY_SIZE);
        clear_qr(self.response_size, query_response_hints::RESPONSE_SIZE);

        let mut clear_sig = |excluded: bool, bit: u32| {
            if excluded {
                hints.query_response_signature_hints &= !bit;
            }
        };
        clear_sig(self.server_address, query_response_signature_hints::SERVER_ADDRESS);
        clear_sig(self.server_port, query_response_signature_hints::SERVER_PORT);
        clear_sig(self.transport, query_response_signature_hints::QR_TRANSPORT_FLAGS);
        clear_sig(self.transaction_type, query_response_signature_hints::QR_TYPE);
        clear_sig(self.qr_flags, query_response_signature_hints::QR_SIG_FLAGS);
        clear_sig(self.query_opcode, query_response_signature_hints::QUERY_OPCODE);
        clear_sig(self.dns_flags, query_response_signature_hints::QR_DNS_FLAGS);
        clear_sig(self.query_rcode, query_response_signature_hints::QUERY_RCODE);
        clear_sig(
            self.query_class_type,
            query_response_signature_hints::QUERY_CLASSTYPE_INDEX,
        );
        clear_sig(self.query_qdcount, query_response_signature_hints::QUERY_QDCOUNT);
        clear_sig(self.query_ancount, query_response_signature_hints::QUERY_ANCOUNT);
        clear_sig(self.query_nscount, query_response_signature_hints::QUERY_NSCOUNT);
        clear_sig(self.query_arcount, query_response_signature_hints::QUERY_ARCOUNT);
        clear_sig(
            self.query_edns_version,
            query_response_signature_hints::QUERY_EDNS_VERSION,
        );
        clear_sig(self.query_udp_size, query_response_signature_hints::QUERY_UDP_SIZE);
        clear_sig(
            self.query_opt_rdata,
            query_response_signature_hints::QUERY_OPT_RDATA_INDEX,
        );
        clear_sig(self.response_rcode, query_response_signature_hints::RESPONSE_RCODE);

        if self.rr_ttl {
            hints.rr_hints &= !rr_hints::TTL;
        }
        if self.rr_rdata {
            hints.rr_hints &= !rr_hints::RDATA_INDEX;
        }
        if self.address_events {
            hints.other_data_hints &= !other_data_hints::ADDRESS_EVENT_COUNTS;
        }

        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_excludes_nothing() {
        let excluded = HintsExcluded::default();
        assert_eq!(excluded.storage_hints(), StorageHints::default());
    }

    #[test]
    fn test_excluded_fields_clear_hint_bits() {
        let excluded = HintsExcluded {
            client_address: true,
            server_port: true,
            rr_ttl: true,
            address_events: true,
            ..Default::default()
        };
        let hints = excluded.storage_hints();
        assert_eq!(
            hints.query_response_hints & query_response_hints::CLIENT_ADDRESS_INDEX,
            0
        );
        assert_eq!(
            hints.query_response_signature_hints & query_response_signature_hints::SERVER_PORT,
            0
        );
        assert_eq!(hints.rr_hints & rr_hints::TTL, 0);
        assert_ne!(hints.rr_hints & rr_hints::RDATA_INDEX, 0);
        assert_eq!(
            hints.other_data_hints & other_data_hints::ADDRESS_EVENT_COUNTS,
            0
        );
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let excluded: HintsExcluded =
            toml::from_str("client-address = true\nrr-ttl = true").unwrap();
        assert!(excluded.client_address);
        assert!(excluded.rr_ttl);
        assert!(!excluded.server_address);
    }
}
