use std::io::{ErrorKind, Read, Write};

use tracing::debug;

use crate::errors::TreeResult;

pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Blocking copy through a fixed-size buffer. Takes both streams by value so
/// they are closed on every return path; the writer is flushed first on
/// success.
pub fn copy_stream<R: Read, W: Write>(mut reader: R, mut writer: W, buffer_size: usize) -> TreeResult<u64> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
    }
    writer.flush()?;
    debug!(bytes = total, "stream copied");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "transport gone"))
        }
    }

    #[test]
    fn copies_across_many_buffers() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        let n = copy_stream(Cursor::new(data.clone()), &mut out, 7).unwrap();
        assert_eq!(n, 5000);
        assert_eq!(out, data);
    }

    #[test]
    fn zero_buffer_size_still_progresses() {
        let mut out = Vec::new();
        copy_stream(Cursor::new(b"abc".to_vec()), &mut out, 0).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn read_failure_surfaces_as_io() {
        let mut out = Vec::new();
        let err = copy_stream(FailingReader, &mut out, 16).unwrap_err();
        assert_eq!(err.code(), "Io");
    }
}
