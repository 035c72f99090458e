use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use core_runtime::logging::strip_path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::debug;

use super::FrameSource;
use crate::error::Result;

/// Buffered local file reader.
pub struct FileSource {
    reader: BufReader<File>,
    path: PathBuf,
    position: u64,
    length: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let length = file.metadata().await?.len();

        debug!(
            file = %strip_path(&path.to_string_lossy()),
            length,
            "Opened local file source"
        );

        Ok(Self {
            reader: BufReader::new(file),
            path,
            position: 0,
            length,
        })
    }
}

#[async_trait]
impl FrameSource for FileSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.reader.read(buf).await?;
        self.position += n as u64;
        Ok(n)
    }

    async fn seek(&mut self, position: u64) -> Result<()> {
        if position != self.position {
            self.reader.seek(SeekFrom::Start(position)).await?;
            self.position = position;
        }
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    async fn length(&mut self) -> Result<Option<u64>> {
        Ok(Some(self.length))
    }

    fn describe(&self) -> String {
        format!("file {}", strip_path(&self.path.to_string_lossy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_file_source_read_and_seek() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"0123456789abcdef").unwrap();

        let mut source = FileSource::open(file.path()).await.unwrap();
        assert_eq!(source.length().await.unwrap(), Some(16));

        let mut buf = [0u8; 4];
        assert_eq!(source.read_full(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"0123");

        source.seek(10).await.unwrap();
        assert_eq!(source.read_full(&mut buf).await.unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(source.position(), 14);

        let mut tail = [0u8; 8];
        assert_eq!(source.read_full(&mut tail).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let result = FileSource::open("/definitely/not/here.mp3").await;
        assert!(matches!(
            result,
            Err(crate::error::PlaybackError::IoError(_))
        ));
    }
}
