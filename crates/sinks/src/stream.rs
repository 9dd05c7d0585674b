//! Compressing stream sinks
//!
//! Durable byte output to a filesystem path or standard output, with
//! optional gzip or xz compression. File output lands under a temporary
//! name and is renamed into place only on a clean [`StreamSink::finish`];
//! an aborted or abandoned sink removes its temporary file, so a partial
//! archive never appears under the final name.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use xz2::stream::{Action, Check, Status, Stream};

use cdns_config::Compression;

use crate::error::{Result, WriterError};

/// Output path meaning write to standard output.
pub const STDOUT_NAME: &str = "-";

/// Suffix distinguishing an in-progress file from a finished one.
const TEMP_SUFFIX: &str = ".tmp";

/// Output buffer handed to the lzma coder on each call.
const XZ_BUF_SIZE: usize = 8192;

enum Target {
    File(File),
    Stdout(io::Stdout),
}

impl Write for Target {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Target::File(f) => f.write(buf),
            Target::Stdout(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Target::File(f) => f.flush(),
            Target::Stdout(s) => s.flush(),
        }
    }
}

/// Counts post-compression bytes on their way to the target, so that
/// size-based rotation operates on the on-disk size.
struct CountingWriter {
    target: Target,
    count: u64,
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.target.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.target.flush()
    }
}

enum SinkKind {
    Plain(CountingWriter),
    Gzip(GzEncoder<CountingWriter>),
    Xz {
        stream: Stream,
        out: CountingWriter,
    },
}

/// A byte-stream writer with pluggable compression.
pub struct StreamSink {
    kind: Option<SinkKind>,
    final_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    logging: bool,
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("final_path", &self.final_path)
            .field("temp_path", &self.temp_path)
            .field("logging", &self.logging)
            .finish()
    }
}

impl StreamSink {
    /// Open the named path for output. `-` selects standard output and
    /// bypasses the temporary-name dance.
    pub fn open(
        path: &Path,
        compression: Compression,
        level: u32,
        logging: bool,
    ) -> Result<StreamSink> {
        let (target, final_path, temp_path) = if path == Path::new(STDOUT_NAME) {
            (Target::Stdout(io::stdout()), None, None)
        } else {
            let mut temp = path.as_os_str().to_owned();
            temp.push(TEMP_SUFFIX);
            let temp = PathBuf::from(temp);
            if logging {
                tracing::info!(file = %temp.display(), "opening temporary output file");
            }
            let file = File::create(&temp).map_err(WriterError::Io)?;
            (Target::File(file), Some(path.to_path_buf()), Some(temp))
        };

        let out = CountingWriter { target, count: 0 };
        let kind = match compression {
            Compression::None => SinkKind::Plain(out),
            Compression::Gzip => {
                SinkKind::Gzip(GzEncoder::new(out, flate2::Compression::new(level)))
            }
            Compression::Xz => {
                let stream = Stream::new_easy_encoder(level, Check::Crc64)
                    .map_err(|e| WriterError::Compression(e.to_string()))?;
                SinkKind::Xz { stream, out }
            }
        };

        Ok(StreamSink {
            kind: Some(kind),
            final_path,
            temp_path,
            logging,
        })
    }

    /// Post-compression bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        match &self.kind {
            Some(SinkKind::Plain(out)) => out.count,
            Some(SinkKind::Gzip(enc)) => enc.get_ref().count,
            Some(SinkKind::Xz { out, .. }) => out.count,
            None => 0,
        }
    }

    fn write_inner(&mut self, buf: &[u8]) -> Result<()> {
        match self.kind.as_mut() {
            Some(SinkKind::Plain(out)) => out.write_all(buf).map_err(WriterError::Io),
            Some(SinkKind::Gzip(enc)) => enc.write_all(buf).map_err(WriterError::Io),
            Some(SinkKind::Xz { stream, out }) => xz_run(stream, out, buf),
            None => Err(WriterError::Io(io::Error::other("sink already closed"))),
        }
    }

    /// Finish compression, flush, and move the temporary file to its
    /// final name. Consumes the sink; on error the temporary file is
    /// removed by the drop guard.
    pub fn finish(mut self) -> Result<()> {
        match self.kind.take() {
            Some(SinkKind::Plain(mut out)) => out.flush().map_err(WriterError::Io)?,
            Some(SinkKind::Gzip(enc)) => {
                let mut out = enc.finish().map_err(WriterError::Io)?;
                out.flush().map_err(WriterError::Io)?;
            }
            Some(SinkKind::Xz { mut stream, mut out }) => {
                xz_finish(&mut stream, &mut out)?;
                out.flush().map_err(WriterError::Io)?;
            }
            None => {}
        }

        if let (Some(temp), Some(final_path)) = (self.temp_path.take(), self.final_path.take()) {
            if self.logging {
                tracing::info!(
                    from = %temp.display(),
                    to = %final_path.display(),
                    "renaming temporary output file"
                );
            }
            if let Err(e) = fs::rename(&temp, &final_path) {
                let _ = fs::remove_file(&temp);
                return Err(WriterError::Io(e));
            }
        }
        Ok(())
    }

    /// Discard the output: close and remove the temporary file without
    /// ever exposing the final name.
    pub fn abort(mut self) {
        self.kind = None;
        if let Some(temp) = self.temp_path.take() {
            if self.logging {
                tracing::info!(file = %temp.display(), "removing temporary output file");
            }
            if let Err(e) = fs::remove_file(&temp) {
                tracing::warn!(file = %temp.display(), error = %e, "failed to remove temporary file");
            }
        }
    }
}

impl Write for StreamSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf).map_err(io::Error::from)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.kind.as_mut() {
            Some(SinkKind::Plain(out)) => out.flush(),
            Some(SinkKind::Gzip(enc)) => enc.flush(),
            Some(SinkKind::Xz { out, .. }) => out.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        // Dropped without finish(): abandon the output. The completed
        // previous file is untouched; only the temporary goes.
        self.kind = None;
        if let Some(temp) = self.temp_path.take() {
            if let Err(e) = fs::remove_file(&temp) {
                tracing::warn!(file = %temp.display(), error = %e, "failed to remove temporary file");
            }
        }
    }
}

/// Feed input through the lzma coder, writing whatever output it yields.
fn xz_run(stream: &mut Stream, out: &mut CountingWriter, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        let consumed_before = stream.total_in();
        let status = xz_code(stream, out, data, Action::Run)?;
        if !matches!(status, Status::Ok | Status::StreamEnd) {
            return Err(WriterError::compression(format!(
                "unexpected lzma status {status:?}"
            )));
        }
        let consumed = (stream.total_in() - consumed_before) as usize;
        data = &data[consumed..];
    }
    Ok(())
}

/// Drive the coder to the end of the stream.
fn xz_finish(stream: &mut Stream, out: &mut CountingWriter) -> Result<()> {
    loop {
        match xz_code(stream, out, &[], Action::Finish)? {
            Status::StreamEnd => return Ok(()),
            Status::Ok => {}
            other => {
                return Err(WriterError::compression(format!(
                    "unexpected lzma status {other:?}"
                )))
            }
        }
    }
}

/// One coder step: run the stream with an 8 KiB output window and write
/// what it produced.
fn xz_code(
    stream: &mut Stream,
    out: &mut CountingWriter,
    data: &[u8],
    action: Action,
) -> Result<Status> {
    let mut buf = [0u8; XZ_BUF_SIZE];
    let produced_before = stream.total_out();
    let status = stream
        .process(data, &mut buf, action)
        .map_err(|e| WriterError::Compression(e.to_string()))?;
    let produced = (stream.total_out() - produced_before) as usize;
    out.write_all(&buf[..produced]).map_err(WriterError::Io)?;
    Ok(status)
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
