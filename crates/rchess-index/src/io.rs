//! ファイルI/Oユーティリティ（gzip対応）
//!
//! 読み込みは拡張子ではなく先頭2バイト（gzip マジック）で判定する。
//! 書き込みは `.gz` 拡張子か `compress` 指定で gzip にする。

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a file for buffered reading, transparently inflating gzip content.
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let f = File::open(path.as_ref())?;
    let mut reader = BufReader::with_capacity(READER_BUF_CAP, f);
    let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        let dec = MultiGzDecoder::new(reader);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(reader))
}

fn has_gz_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"))
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and sync the file to disk.
    pub fn close(self) -> io::Result<()> {
        let buffered = match self {
            Writer::Plain(f) => f,
            Writer::Gz(e) => e.finish()?,
        };
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Writer::Gz(_))
    }
}

/// Create (truncate) `path` for writing. gzip when `compress` is set or the
/// path ends in `.gz`.
pub fn open_writer<P: AsRef<Path>>(path: P, compress: bool) -> io::Result<Writer> {
    let p = path.as_ref();
    let f = BufWriter::new(File::create(p)?);
    if compress || has_gz_extension(p) {
        return Ok(Writer::Gz(GzEncoder::new(f, Compression::default())));
    }
    Ok(Writer::Plain(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_gz_extension_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lines.jsonl.gz");
        let mut w = open_writer(&path, false).unwrap();
        assert!(w.is_compressed());
        w.write_all(b"hello\nworld\n").unwrap();
        w.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));

        let mut text = String::new();
        open_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\nworld\n");
    }

    #[test]
    fn test_content_sniffing_ignores_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.bin");
        let mut w = open_writer(&path, true).unwrap();
        w.write_all(b"compressed anyway").unwrap();
        w.close().unwrap();

        let mut text = String::new();
        open_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "compressed anyway");
    }

    #[test]
    fn test_plain_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        let w = open_writer(&path, false).unwrap();
        assert!(!w.is_compressed());
        w.close().unwrap();
        assert_eq!(open_reader(&path).unwrap().lines().count(), 0);
    }
}
