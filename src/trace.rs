/*!
The propensity trace: a flat, append-only sequence of fixed-size records, one
per agent per iteration, each the iteration index as a 32-bit signed integer
followed by the propensity as a 64-bit float, both little-endian, without any
framing. `bincode`'s default configuration encodes exactly that.
 */
use crate::error::{Error, Result};
use serde_derive::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub iteration: i32,
    pub p: f64,
}

pub const RECORD_SIZE: usize = 12;

pub struct TraceWriter<W: Write> {
    out: W,
}

impl TraceWriter<BufWriter<File>> {
    /// Start a new trace, discarding anything already stored at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| Error::unavailable(path.as_ref(), e))?;
        Ok(TraceWriter::new(BufWriter::new(file)))
    }

    /// Continue an existing trace (or start one if there is none yet).
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| Error::unavailable(path.as_ref(), e))?;
        Ok(TraceWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(out: W) -> Self {
        TraceWriter { out }
    }

    /// Write one record per value, all stamped with the same iteration, in
    /// the order the values come in.
    pub fn write_iteration<I>(&mut self, iteration: i32, propensities: I) -> Result<()>
    where
        I: IntoIterator<Item = f64>,
    {
        for p in propensities {
            bincode::serialize_into(&mut self.out, &TraceRecord { iteration, p })?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// A lazy pass over a trace. Iteration ends at the end of the input; a
/// trailing partial record is dropped.
pub struct TraceReader<R: Read> {
    input: R,
    exhausted: bool,
}

impl TraceReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| Error::unavailable(path.as_ref(), e))?;
        Ok(TraceReader::new(BufReader::new(file)))
    }
}

impl<R: Read> TraceReader<R> {
    pub fn new(input: R) -> Self {
        TraceReader {
            input,
            exhausted: false,
        }
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = TraceRecord;

    fn next(&mut self) -> Option<TraceRecord> {
        if self.exhausted {
            return None;
        }
        match bincode::deserialize_from(&mut self.input) {
            Ok(record) => Some(record),
            Err(e) => {
                self.exhausted = true;
                match *e {
                    bincode::ErrorKind::Io(ref io)
                        if io.kind() == std::io::ErrorKind::UnexpectedEof => {}
                    _ => warn!("Stopped reading trace: {}", e),
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_twelve_bytes_little_endian() {
        let mut w = TraceWriter::new(Vec::new());
        w.write_iteration(3, vec![0.5]).unwrap();
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..4], &3_i32.to_le_bytes());
        assert_eq!(&bytes[4..12], &0.5_f64.to_le_bytes());
    }

    #[test]
    fn truncated_final_record_is_dropped() {
        let mut w = TraceWriter::new(Vec::new());
        w.write_iteration(0, vec![0.1, 0.2]).unwrap();
        w.write_iteration(1, vec![0.3]).unwrap();
        let mut bytes = w.into_inner();
        bytes.truncate(bytes.len() - 5);

        let records: Vec<TraceRecord> = TraceReader::new(&bytes[..]).collect();
        assert_eq!(
            records,
            vec![
                TraceRecord { iteration: 0, p: 0.1 },
                TraceRecord { iteration: 0, p: 0.2 },
            ]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        let empty: &[u8] = &[];
        assert_eq!(TraceReader::new(empty).count(), 0);
    }
}
