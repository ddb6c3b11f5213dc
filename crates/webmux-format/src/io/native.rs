//! 基于 `std::io` 的读写实现.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use webmux_core::{WebmError, WebmResult};

use super::{MkvReader, MkvWriter, ReaderLength};

/// 包装 `Read + Seek` 对象的字节源
#[derive(Debug)]
pub struct IoReader<R> {
    inner: R,
}

impl<R: Read + Seek> IoReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// 消耗自身, 返回内部对象
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl IoReader<File> {
    /// 从文件路径打开
    pub fn open(path: impl AsRef<Path>) -> WebmResult<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read + Seek> MkvReader for IoReader<R> {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> WebmResult<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                WebmError::ReadFailed {
                    position,
                    len: buf.len(),
                }
            } else {
                WebmError::Io(e)
            }
        })
    }

    fn length(&mut self) -> WebmResult<ReaderLength> {
        // 每次重新测量, 允许文件在解析期间增长
        let current = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(current))?;
        Ok(ReaderLength::complete(end))
    }
}

/// 包装 `Write + Seek` 对象的可定位字节汇
#[derive(Debug)]
pub struct IoWriter<W: Write> {
    inner: W,
}

impl<W: Write + Seek> IoWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// 刷新内部缓冲
    pub fn flush(&mut self) -> WebmResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// 消耗自身, 返回内部对象
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl IoWriter<BufWriter<File>> {
    /// 创建 (截断) 文件并以缓冲方式写入
    pub fn create(path: impl AsRef<Path>) -> WebmResult<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Seek> MkvWriter for IoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> WebmResult<()> {
        self.inner.write_all(buf)?;
        Ok(())
    }

    fn position(&mut self) -> WebmResult<u64> {
        Ok(self.inner.stream_position()?)
    }

    fn set_position(&mut self, position: u64) -> WebmResult<()> {
        self.inner
            .seek(SeekFrom::Start(position))
            .map_err(|_| WebmError::SeekFailed(position))?;
        Ok(())
    }

    fn seekable(&self) -> bool {
        true
    }
}

/// 只能顺序写入的字节汇 (管道、套接字等)
///
/// 位置由已写入字节数推算.
#[derive(Debug)]
pub struct StreamWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// 消耗自身, 返回内部对象
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> MkvWriter for StreamWriter<W> {
    fn write(&mut self, buf: &[u8]) -> WebmResult<()> {
        self.inner.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn position(&mut self) -> WebmResult<u64> {
        Ok(self.written)
    }

    fn set_position(&mut self, _position: u64) -> WebmResult<()> {
        Err(WebmError::NotSeekable)
    }

    fn seekable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_io_reader_定位读取() {
        let mut r = IoReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        let mut buf = [0u8; 2];
        r.read(3, &mut buf).unwrap();
        assert_eq!(buf, [4, 5]);
        assert_eq!(r.length().unwrap(), ReaderLength::complete(5));
        assert!(matches!(
            r.read(4, &mut buf),
            Err(WebmError::ReadFailed { position: 4, .. })
        ));
    }

    #[test]
    fn test_io_writer_回填() {
        let mut w = IoWriter::new(Cursor::new(Vec::new()));
        w.write(&[0, 0, 0]).unwrap();
        w.set_position(1).unwrap();
        w.write(&[5]).unwrap();
        assert_eq!(w.position().unwrap(), 2);
        assert_eq!(w.into_inner().into_inner(), vec![0, 5, 0]);
    }

    #[test]
    fn test_stream_writer_不可定位() {
        let mut w = StreamWriter::new(Vec::new());
        w.write(b"abc").unwrap();
        assert_eq!(w.position().unwrap(), 3);
        assert!(!w.seekable());
        assert!(matches!(w.set_position(0), Err(WebmError::NotSeekable)));
    }

    #[test]
    fn test_文件读写() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bytes.bin");
        {
            let mut w = IoWriter::create(&path).unwrap();
            w.write(&[9u8; 32]).unwrap();
            w.flush().unwrap();
        }
        let mut r = IoReader::open(&path).unwrap();
        assert_eq!(r.length().unwrap().total, Some(32));
    }
}
