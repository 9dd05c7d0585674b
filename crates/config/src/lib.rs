//! C-DNS writer configuration
//!
//! TOML-based configuration with sensible defaults: where output goes and
//! how it rotates, how it is compressed, how large blocks grow, which
//! fields the privacy policy drops, and the collection metadata recorded
//! in every file's preamble.
//!
//! # Example
//!
//! ```toml
//! output-pattern = "/var/lib/dns/cdns-%Y%m%d-%H%M%S"
//! rotation-period = 300
//! compression = "xz"
//! max-block-items = 5000
//!
//! [exclude]
//! client-address = true
//! rr-rdata = true
//! ```

mod error;
mod hints;

pub use error::{ConfigError, Result};
pub use hints::HintsExcluded;

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use cdns_format::params::{
    BlockParameters, CollectionParameters, StorageParameters, DEFAULT_IPV4_PREFIX_LENGTH,
    DEFAULT_IPV6_PREFIX_LENGTH, DEFAULT_MAX_BLOCK_ITEMS, DEFAULT_TICKS_PER_SECOND,
};

/// Output compression selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression (default).
    #[default]
    None,
    Gzip,
    Xz,
}

impl Compression {
    /// Extension appended to the pattern-resolved output filename.
    pub fn suggested_extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Xz => ".xz",
        }
    }

    /// Highest level the underlying codec accepts.
    fn max_level(&self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Gzip | Compression::Xz => 9,
        }
    }
}

/// Writer configuration.
///
/// All fields are optional in the TOML form; defaults match an
/// uncompressed, non-rotating writer that records every field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Output filename pattern. strftime-style conversions are expanded
    /// from the rotation timestamp; `-` writes to standard output.
    pub output_pattern: String,

    /// Rotation window in seconds, aligned on the period boundary from
    /// the epoch. Zero disables time-based rotation.
    pub rotation_period: u64,

    /// Rotate once the on-disk file size reaches this many bytes.
    /// Zero disables size-based rotation.
    pub max_output_size: u64,

    /// Records accumulated before a block is emitted.
    pub max_block_items: u64,

    pub compression: Compression,
    pub compression_level: u32,

    /// Client and server address prefix lengths kept at interning time.
    /// Truncation below the full length is deliberately lossy.
    pub client_address_prefix_ipv4: u8,
    pub client_address_prefix_ipv6: u8,
    pub server_address_prefix_ipv4: u8,
    pub server_address_prefix_ipv6: u8,

    /// Derive block start/end times from record timestamps rather than
    /// the wall clock.
    pub start_end_times_from_data: bool,

    /// Log file open/rename/remove events.
    pub log_file_handling: bool,

    /// Fields the privacy policy drops.
    pub exclude: HintsExcluded,

    /// Extra sections recorded for the query message.
    pub query_sections: SectionConfig,
    /// Extra sections recorded for the response message.
    pub response_sections: SectionConfig,

    // Collection metadata recorded in the file preamble.
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

/// Which extra message sections to carry into extended record groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SectionConfig {
    /// Questions beyond the first.
    pub extra_questions: bool,
    pub answers: bool,
    pub authority: bool,
    pub additional: bool,
}

impl SectionConfig {
    pub fn any(&self) -> bool {
        self.extra_questions || self.answers || self.authority || self.additional
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_pattern: String::new(),
            rotation_period: 0,
            max_output_size: 0,
            max_block_items: DEFAULT_MAX_BLOCK_ITEMS,
            compression: Compression::None,
            compression_level: 6,
            client_address_prefix_ipv4: DEFAULT_IPV4_PREFIX_LENGTH,
            client_address_prefix_ipv6: DEFAULT_IPV6_PREFIX_LENGTH,
            server_address_prefix_ipv4: DEFAULT_IPV4_PREFIX_LENGTH,
            server_address_prefix_ipv6: DEFAULT_IPV6_PREFIX_LENGTH,
            start_end_times_from_data: false,
            log_file_handling: false,
            exclude: HintsExcluded::default(),
            query_sections: SectionConfig::default(),
            response_sections: SectionConfig::default(),
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

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        contents.parse()
    }

    /// Check value ranges. Called by [`Config::load`] and by the writer
    /// on construction.
    pub fn validate(&self) -> Result<()> {
        if self.output_pattern.is_empty() {
            return Err(ConfigError::invalid_value(
                "output-pattern",
                "an output pattern must be given",
            ));
        }
        let max = self.compression.max_level();
        if self.compression != Compression::None && self.compression_level > max {
            return Err(ConfigError::invalid_value(
                "compression-level",
                format!("level {} outside 0..={max}", self.compression_level),
            ));
        }
        if self.max_block_items == 0 {
            return Err(ConfigError::invalid_value(
                "max-block-items",
                "at least one record per block is required",
            ));
        }
        if self.client_address_prefix_ipv4 > 32 || self.server_address_prefix_ipv4 > 32 {
            return Err(ConfigError::invalid_value(
                "address-prefix-ipv4",
                "IPv4 prefix lengths cannot exceed 32",
            ));
        }
        if self.client_address_prefix_ipv6 > 128 || self.server_address_prefix_ipv6 > 128 {
            return Err(ConfigError::invalid_value(
                "address-prefix-ipv6",
                "IPv6 prefix lengths cannot exceed 128",
            ));
        }
        Ok(())
    }

    /// The single block-parameters entry written in each file preamble.
    pub fn block_parameters(&self) -> BlockParameters {
        BlockParameters {
            storage_parameters: StorageParameters {
                ticks_per_second: DEFAULT_TICKS_PER_SECOND,
                max_block_items: self.max_block_items,
                storage_hints: self.exclude.storage_hints(),
                client_address_prefix_ipv4: self.client_address_prefix_ipv4,
                client_address_prefix_ipv6: self.client_address_prefix_ipv6,
                server_address_prefix_ipv4: self.server_address_prefix_ipv4,
                server_address_prefix_ipv6: self.server_address_prefix_ipv6,
                ..Default::default()
            },
            collection_parameters: CollectionParameters {
                query_timeout_ms: self.query_timeout_ms,
                skew_timeout_us: self.skew_timeout_us,
                snaplen: self.snaplen,
                dns_port: self.dns_port,
                promisc: self.promisc,
                interfaces: self.interfaces.clone(),
                server_addresses: self.server_addresses.clone(),
                vlan_ids: self.vlan_ids.clone(),
                filter: self.filter.clone(),
                generator_id: self.generator_id.clone(),
                host_id: self.host_id.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            output_pattern: "out-%Y%m%d".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_fails_without_pattern() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_compression_level_range() {
        let mut config = valid();
        config.compression = Compression::Gzip;
        config.compression_level = 9;
        assert!(config.validate().is_ok());
        config.compression_level = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefix_ranges() {
        let mut config = valid();
        config.client_address_prefix_ipv4 = 33;
        assert!(config.validate().is_err());
        config.client_address_prefix_ipv4 = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = "output-pattern = \"dns-%Y%m%d\"".parse().unwrap();
        assert_eq!(config.output_pattern, "dns-%Y%m%d");
        assert_eq!(config.max_block_items, 5000);
        assert_eq!(config.compression, Compression::None);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            output-pattern = "dns-%Y%m%d-%H%M%S"
            rotation-period = 300
            max-output-size = 1000000
            compression = "xz"
            compression-level = 3
            client-address-prefix-ipv4 = 24
            generator-id = "unit-test"

            [exclude]
            client-port = true

            [query-sections]
            extra-questions = true
        "#;
        let config: Config = toml.parse().unwrap();
        assert_eq!(config.rotation_period, 300);
        assert_eq!(config.compression, Compression::Xz);
        assert_eq!(config.compression_level, 3);
        assert!(config.exclude.client_port);
        assert!(config.query_sections.extra_questions);
        assert!(!config.response_sections.any());
    }

    #[test]
    fn test_block_parameters_reflect_config() {
        let mut config = valid();
        config.max_block_items = 17;
        config.client_address_prefix_ipv4 = 24;
        config.generator_id = "gen".into();
        let bp = config.block_parameters();
        assert_eq!(bp.storage_parameters.max_block_items, 17);
        assert_eq!(bp.storage_parameters.client_address_prefix_ipv4, 24);
        assert_eq!(bp.collection_parameters.generator_id, "gen");
        assert_eq!(bp.collection_parameters.dns_port, 53);
    }

    #[test]
    fn test_suggested_extensions() {
        assert_eq!(Compression::None.suggested_extension(), "");
        assert_eq!(Compression::Gzip.suggested_extension(), ".gz");
        assert_eq!(Compression::Xz.suggested_extension(), ".xz");
    }
}
