use async_trait::async_trait;
use bytes::Bytes;

use super::FrameSource;
use crate::error::Result;

/// Source over bytes already in memory.
pub struct MemorySource {
    data: Bytes,
    position: u64,
}

impl MemorySource {
    pub fn new(data: Bytes) -> Self {
        Self { data, position: 0 }
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn length(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.data.len() as u64))
    }

    fn describe(&self) -> String {
        format!("memory ({} bytes)", self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seek_past_end_reads_nothing() {
        let mut source = MemorySource::new(Bytes::from_static(b"abcdef"));
        source.seek(4).await.unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");

        source.seek(100).await.unwrap();
        assert_eq!(source.read(&mut buf).await.unwrap(), 0);
        assert_eq!(source.position(), 100);
    }
}
