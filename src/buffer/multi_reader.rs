use crate::error::SpiderError;
use bytes::Bytes;
use std::io::{Cursor, Read};

/// Reads a stream once and hands out any number of independent readers over it.
#[derive(Debug, Clone, Default)]
pub struct MultipleReader {
    data: Bytes,
}

impl MultipleReader {
    pub fn new<R: Read>(mut reader: R) -> Result<Self, SpiderError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self { data: data.into() })
    }

    /// A reader positioned at the start of the buffered data.
    pub fn reader(&self) -> Cursor<Bytes> {
        Cursor::new(self.data.clone())
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reader_sees_everything() {
        let multiple = MultipleReader::new(&b"payload"[..]).unwrap();
        for _ in 0..3 {
            let mut out = String::new();
            multiple.reader().read_to_string(&mut out).unwrap();
            assert_eq!(out, "payload");
        }
    }
}
