//! Streaming CBOR encoder
//!
//! Emits RFC 8949 items onto any [`io::Write`] sink. Output accumulates in
//! a small internal buffer and is pushed to the sink when the buffer fills
//! or [`CborEncoder::flush`] is called.
//!
//! The encoder keeps no item stack: callers are responsible for balancing
//! container headers and break markers.

use std::io::{self, Write};

/// Size of the internal accumulation buffer.
const BUF_SIZE: usize = 2048;

/// CBOR major types.
const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_SIMPLE: u8 = 7;

/// Additional-information value selecting indefinite length.
const INDEFINITE: u8 = 31;

/// Buffered CBOR item writer over an inner byte sink.
#[derive(Debug)]
pub struct CborEncoder<W: Write> {
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> CborEncoder<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(BUF_SIZE),
        }
    }

    /// Access the inner sink, e.g. to query its byte count.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Flush buffered output and return the inner sink.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    /// Push any accumulated output to the inner sink.
    ///
    /// Zero-length writes are suppressed; some compressing sinks treat
    /// them as end-of-stream markers.
    pub fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    fn push(&mut self, byte: u8) -> io::Result<()> {
        self.buf.push(byte);
        if self.buf.len() == BUF_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Write a major type with its argument in the shortest head encoding.
    fn write_type_value(&mut self, major: u8, value: u64) -> io::Result<()> {
        let m = major << 5;
        if value < 24 {
            self.push(m | value as u8)
        } else if value <= u8::MAX as u64 {
            self.push(m | 24)?;
            self.push(value as u8)
        } else if value <= u16::MAX as u64 {
            self.push(m | 25)?;
            for b in (value as u16).to_be_bytes() {
                self.push(b)?;
            }
            Ok(())
        } else if value <= u32::MAX as u64 {
            self.push(m | 26)?;
            for b in (value as u32).to_be_bytes() {
                self.push(b)?;
            }
            Ok(())
        } else {
            self.push(m | 27)?;
            for b in value.to_be_bytes() {
                self.push(b)?;
            }
            Ok(())
        }
    }

    pub fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_type_value(MAJOR_UNSIGNED, value)
    }

    pub fn write_i64(&mut self, value: i64) -> io::Result<()> {
        if value < 0 {
            self.write_type_value(MAJOR_NEGATIVE, !(value as u64))
        } else {
            self.write_type_value(MAJOR_UNSIGNED, value as u64)
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_type_value(MAJOR_BYTES, bytes.len() as u64)?;
        for &b in bytes {
            self.push(b)?;
        }
        Ok(())
    }

    /// Write a text string. UTF-8 validity is guaranteed by `&str`.
    pub fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.write_type_value(MAJOR_TEXT, text.len() as u64)?;
        for &b in text.as_bytes() {
            self.push(b)?;
        }
        Ok(())
    }

    /// Write an array header. `None` starts an indefinite-length array
    /// that must be terminated with [`CborEncoder::write_break`].
    pub fn write_array_header(&mut self, len: Option<u64>) -> io::Result<()> {
        match len {
            Some(n) => self.write_type_value(MAJOR_ARRAY, n),
            None => self.push((MAJOR_ARRAY << 5) | INDEFINITE),
        }
    }

    /// Write a map header. `None` starts an indefinite-length map that
    /// must be terminated with [`CborEncoder::write_break`].
    pub fn write_map_header(&mut self, len: Option<u64>) -> io::Result<()> {
        match len {
            Some(n) => self.write_type_value(MAJOR_MAP, n),
            None => self.push((MAJOR_MAP << 5) | INDEFINITE),
        }
    }

    /// Terminate an indefinite-length container.
    pub fn write_break(&mut self) -> io::Result<()> {
        self.push((MAJOR_SIMPLE << 5) | INDEFINITE)
    }

    pub fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.push((MAJOR_SIMPLE << 5) | if value { 21 } else { 20 })
    }

    pub fn write_float(&mut self, value: f64) -> io::Result<()> {
        self.push((MAJOR_SIMPLE << 5) | 27)?;
        for b in value.to_be_bytes() {
            self.push(b)?;
        }
        Ok(())
    }

    /// Write a map key followed by an unsigned value.
    pub fn write_kv(&mut self, key: i64, value: u64) -> io::Result<()> {
        self.write_i64(key)?;
        self.write_u64(value)
    }

    /// Write a map key and unsigned value, or nothing when the value is
    /// absent. Record maps elide absent members.
    pub fn write_kv_opt(&mut self, key: i64, value: Option<u64>) -> io::Result<()> {
        if let Some(v) = value {
            self.write_kv(key, v)?;
        }
        Ok(())
    }

    /// Write a map key followed by a signed value.
    pub fn write_kv_signed(&mut self, key: i64, value: i64) -> io::Result<()> {
        self.write_i64(key)?;
        self.write_i64(value)
    }
}

#[cfg(test)]
#[path = "cbor_test.rs"]
mod cbor_test;
