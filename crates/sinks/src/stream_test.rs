//! Tests for compressing stream sinks

use std::io::Read;
use std::path::PathBuf;

use cdns_config::Compression;
use tempfile::TempDir;

use crate::stream::StreamSink;

fn out_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn temp_of(path: &PathBuf) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

// ============================================================================
// Temporary-name lifecycle
// ============================================================================

#[test]
fn test_plain_sink_renames_on_finish() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns");

    let mut sink = StreamSink::open(&path, Compression::None, 0, false).unwrap();
    std::io::Write::write_all(&mut sink, b"payload").unwrap();

    // While open, only the temporary exists.
    assert!(temp_of(&path).exists());
    assert!(!path.exists());

    sink.finish().unwrap();
    assert!(!temp_of(&path).exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"payload");
}

#[test]
fn test_abort_removes_temporary() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns");

    let mut sink = StreamSink::open(&path, Compression::None, 0, false).unwrap();
    std::io::Write::write_all(&mut sink, b"partial").unwrap();
    sink.abort();

    assert!(!temp_of(&path).exists());
    assert!(!path.exists());
}

#[test]
fn test_drop_without_finish_removes_temporary() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns");

    {
        let mut sink = StreamSink::open(&path, Compression::None, 0, false).unwrap();
        std::io::Write::write_all(&mut sink, b"partial").unwrap();
    }

    assert!(!temp_of(&path).exists());
    assert!(!path.exists());
}

#[test]
fn test_abandoned_file_leaves_previous_output_intact() {
    let dir = TempDir::new().unwrap();
    let first = out_path(&dir, "first.cdns");
    let second = out_path(&dir, "second.cdns");

    let mut sink = StreamSink::open(&first, Compression::None, 0, false).unwrap();
    std::io::Write::write_all(&mut sink, b"complete").unwrap();
    sink.finish().unwrap();

    let mut sink = StreamSink::open(&second, Compression::None, 0, false).unwrap();
    std::io::Write::write_all(&mut sink, b"partial").unwrap();
    sink.abort();

    assert_eq!(std::fs::read(&first).unwrap(), b"complete");
    assert!(!second.exists());
}

// ============================================================================
// Byte accounting
// ============================================================================

#[test]
fn test_bytes_written_monotonic_plain() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns");

    let mut sink = StreamSink::open(&path, Compression::None, 0, false).unwrap();
    let mut last = 0;
    for _ in 0..10 {
        std::io::Write::write_all(&mut sink, &[0u8; 100]).unwrap();
        let now = sink.bytes_written();
        assert!(now >= last);
        last = now;
    }
    assert_eq!(last, 1000);
    sink.finish().unwrap();
}

#[test]
fn test_bytes_written_is_post_compression() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns.gz");

    let mut sink = StreamSink::open(&path, Compression::Gzip, 6, false).unwrap();
    // Highly compressible input: the on-disk count must stay far below
    // the input size once flushed.
    std::io::Write::write_all(&mut sink, &vec![0u8; 1 << 20]).unwrap();
    std::io::Write::flush(&mut sink).unwrap();
    assert!(sink.bytes_written() < 1 << 18);
    sink.finish().unwrap();

    let on_disk = std::fs::metadata(&path).unwrap().len();
    assert!(on_disk < 1 << 18);
}

// ============================================================================
// Compressed output is valid
// ============================================================================

#[test]
fn test_gzip_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns.gz");

    let mut sink = StreamSink::open(&path, Compression::Gzip, 6, false).unwrap();
    std::io::Write::write_all(&mut sink, b"gzip me please").unwrap();
    sink.finish().unwrap();

    let compressed = std::fs::read(&path).unwrap();
    assert_eq!(&compressed[..2], &[0x1f, 0x8b]); // gzip magic

    let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, b"gzip me please");
}

#[test]
fn test_xz_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "out.cdns.xz");

    let mut sink = StreamSink::open(&path, Compression::Xz, 6, false).unwrap();
    std::io::Write::write_all(&mut sink, b"xz me please").unwrap();
    sink.finish().unwrap();

    let compressed = std::fs::read(&path).unwrap();
    assert_eq!(&compressed[..6], &[0xfd, b'7', b'z', b'X', b'Z', 0x00]); // xz magic

    let mut decoder = xz2::read::XzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, b"xz me please");
}

#[test]
fn test_xz_large_input_crosses_coder_buffer() {
    let dir = TempDir::new().unwrap();
    let path = out_path(&dir, "big.cdns.xz");

    // Incompressible data larger than the coder's 8 KiB output window
    // forces multiple process() calls per write.
    let payload: Vec<u8> = (0..100_000u32)
        .map(|i| i.wrapping_mul(2654435761) as u8)
        .collect();

    let mut sink = StreamSink::open(&path, Compression::Xz, 0, false).unwrap();
    std::io::Write::write_all(&mut sink, &payload).unwrap();
    sink.finish().unwrap();

    let compressed = std::fs::read(&path).unwrap();
    let mut decoder = xz2::read::XzDecoder::new(&compressed[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();
    assert_eq!(decompressed, payload);
}

#[test]
fn test_open_failure_is_io_error() {
    let missing = PathBuf::from("/nonexistent-dir/sub/out.cdns");
    let err = StreamSink::open(&missing, Compression::None, 0, false).unwrap_err();
    assert!(matches!(err, crate::error::WriterError::Io(_)));
}
