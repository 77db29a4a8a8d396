//! Storage layer shared by all codecs: plain, compressed and memory-backed
//! files, with a line-oriented text reader/writer and an endian-aware binary
//! counterpart on top.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use molfile_core::{MolError, MolResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

impl FileMode {
    pub fn from_char(mode: char) -> MolResult<Self> {
        match mode {
            'r' => Ok(FileMode::Read),
            'w' => Ok(FileMode::Write),
            'a' => Ok(FileMode::Append),
            other => Err(MolError::Config(format!(
                "unsupported file mode '{other}', expected 'r', 'w' or 'a'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Lzma,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Compression format for a path, from its suffix.
pub fn compression_for(path: &Path) -> Compression {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Compression::Gzip,
        Some("bz2") => Compression::Bzip2,
        Some("xz") => Compression::Lzma,
        _ => Compression::None,
    }
}

/// Extension used for format lookup, with any compression suffix removed:
/// "traj.xyz.gz" gives "xyz".
pub fn format_extension(path: &Path) -> Option<String> {
    let path: &Path = if compression_for(path) == Compression::None {
        path
    } else {
        Path::new(path.file_stem()?)
    };
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn sniff_compression(file: &mut File) -> MolResult<Compression> {
    let mut magic = [0u8; 6];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(if read >= 2 && magic[..2] == [0x1f, 0x8b] {
        Compression::Gzip
    } else if read >= 3 && &magic[..3] == b"BZh" {
        Compression::Bzip2
    } else if read >= 6 && magic == [0xfd, b'7', b'z', b'X', b'Z', 0x00] {
        Compression::Lzma
    } else {
        Compression::None
    })
}

/// Growable buffer shared between a memory trajectory and its caller.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    position: u64,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the bytes written so far.
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().expect("shared buffer lock").clone()
    }
}

impl Read for SharedBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock().expect("shared buffer lock");
        let start = (self.position as usize).min(data.len());
        let count = buf.len().min(data.len() - start);
        buf[..count].copy_from_slice(&data[start..start + count]);
        drop(data);
        self.position += count as u64;
        Ok(count)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock().expect("shared buffer lock");
        let start = self.position as usize;
        if start > data.len() {
            data.resize(start, 0);
        }
        let overlap = (data.len() - start).min(buf.len());
        data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        drop(data);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedBuffer {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let len = self.data.lock().expect("shared buffer lock").len() as i64;
        let position = match target {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.position as i64 + n,
        };
        if position < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the buffer",
            ));
        }
        self.position = position as u64;
        Ok(self.position)
    }
}

pub(crate) enum Storage {
    File(File),
    Memory(Cursor<Vec<u8>>),
    Shared(SharedBuffer),
    GzWrite(GzEncoder<File>),
    BzWrite(BzEncoder<File>),
    XzWrite(XzEncoder<File>),
}

fn seek_unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "can not seek in a compressed file",
    )
}

impl Storage {
    pub(crate) fn open(path: &Path, mode: FileMode) -> MolResult<Self> {
        match mode {
            FileMode::Read => {
                let mut file = File::open(path)?;
                let compression = match compression_for(path) {
                    Compression::None => sniff_compression(&mut file)?,
                    suffixed => suffixed,
                };
                match compression {
                    Compression::None => Ok(Storage::File(file)),
                    Compression::Gzip => decompress(GzDecoder::new(file)),
                    Compression::Bzip2 => decompress(BzDecoder::new(file)),
                    Compression::Lzma => decompress(XzDecoder::new(file)),
                }
            }
            FileMode::Write => {
                let file = File::create(path)?;
                Ok(match compression_for(path) {
                    Compression::None => Storage::File(file),
                    Compression::Gzip => {
                        Storage::GzWrite(GzEncoder::new(file, flate2::Compression::default()))
                    }
                    Compression::Bzip2 => {
                        Storage::BzWrite(BzEncoder::new(file, bzip2::Compression::default()))
                    }
                    Compression::Lzma => Storage::XzWrite(XzEncoder::new(file, 6)),
                })
            }
            FileMode::Append => {
                if compression_for(path) != Compression::None {
                    return Err(MolError::Config(format!(
                        "can not open the compressed file at '{}' in append mode",
                        path.display()
                    )));
                }
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(path)?;
                Ok(Storage::File(file))
            }
        }
    }

    pub(crate) fn memory_reader(data: Vec<u8>) -> Self {
        Storage::Memory(Cursor::new(data))
    }

    pub(crate) fn memory_writer(buffer: SharedBuffer) -> Self {
        Storage::Shared(buffer)
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Storage::File(file) => file.read(buf),
            Storage::Memory(cursor) => cursor.read(buf),
            Storage::Shared(buffer) => buffer.read(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "this file is write only",
            )),
        }
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Storage::File(file) => file.write(buf),
            Storage::Memory(cursor) => cursor.write(buf),
            Storage::Shared(buffer) => buffer.write(buf),
            Storage::GzWrite(encoder) => encoder.write(buf),
            Storage::BzWrite(encoder) => encoder.write(buf),
            Storage::XzWrite(encoder) => encoder.write(buf),
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        match self {
            Storage::File(file) => file.flush(),
            Storage::Memory(cursor) => cursor.flush(),
            Storage::Shared(buffer) => buffer.flush(),
            Storage::GzWrite(encoder) => encoder.flush(),
            Storage::BzWrite(encoder) => encoder.flush(),
            Storage::XzWrite(encoder) => encoder.flush(),
        }
    }

    pub(crate) fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        match self {
            Storage::File(file) => file.seek(target),
            Storage::Memory(cursor) => cursor.seek(target),
            Storage::Shared(buffer) => buffer.seek(target),
            _ => Err(seek_unsupported()),
        }
    }

    /// Flush and, for compressed writers, emit the stream trailer.
    pub(crate) fn finish(&mut self) -> io::Result<()> {
        match self {
            Storage::GzWrite(encoder) => encoder.try_finish(),
            Storage::BzWrite(encoder) => encoder.try_finish(),
            Storage::XzWrite(encoder) => encoder.try_finish(),
            other => other.flush(),
        }
    }
}

fn decompress(mut decoder: impl Read) -> MolResult<Storage> {
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    Ok(Storage::memory_reader(data))
}

const READ_BUFFER_SIZE: usize = 8192;

/// Line-oriented reader and writer with logical byte positions.
///
/// Reads are buffered internally so `tellpos` always reports the offset of
/// the next unread byte, which is what codec `forward` implementations
/// record into the frame index.
pub struct TextFile {
    storage: Storage,
    buffer: Vec<u8>,
    buffer_start: usize,
    offset: u64,
    eof: bool,
}

impl TextFile {
    pub fn open(path: &Path, mode: FileMode) -> MolResult<Self> {
        Ok(Self::from_storage(Storage::open(path, mode)?))
    }

    pub fn memory_reader(data: Vec<u8>) -> Self {
        Self::from_storage(Storage::memory_reader(data))
    }

    pub fn memory_writer(buffer: SharedBuffer) -> Self {
        Self::from_storage(Storage::memory_writer(buffer))
    }

    fn from_storage(storage: Storage) -> Self {
        Self {
            storage,
            buffer: Vec::new(),
            buffer_start: 0,
            offset: 0,
            eof: false,
        }
    }

    /// True after a `readline` call found no more data.
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Logical offset of the next unread byte.
    pub fn tellpos(&self) -> u64 {
        self.offset
    }

    pub fn seekpos(&mut self, position: u64) -> MolResult<()> {
        self.storage.seek(SeekFrom::Start(position))?;
        self.buffer.clear();
        self.buffer_start = 0;
        self.offset = position;
        self.eof = false;
        Ok(())
    }

    /// Move to the end of the file, for append mode.
    pub fn seek_end(&mut self) -> MolResult<u64> {
        let position = self.storage.seek(SeekFrom::End(0))?;
        self.buffer.clear();
        self.buffer_start = 0;
        self.offset = position;
        Ok(position)
    }

    /// Next line without its terminator. At end of file this returns an
    /// empty string and raises the `eof` flag.
    pub fn readline(&mut self) -> MolResult<String> {
        let mut line: Vec<u8> = Vec::new();
        loop {
            let pending = &self.buffer[self.buffer_start..];
            if let Some(found) = pending.iter().position(|&byte| byte == b'\n') {
                line.extend_from_slice(&pending[..found]);
                self.buffer_start += found + 1;
                self.offset += found as u64 + 1;
                break;
            }

            line.extend_from_slice(pending);
            self.offset += pending.len() as u64;
            self.buffer.clear();
            self.buffer_start = 0;

            self.buffer.resize(READ_BUFFER_SIZE, 0);
            let read = self.storage.read(&mut self.buffer)?;
            self.buffer.truncate(read);
            if read == 0 {
                if line.is_empty() {
                    self.eof = true;
                }
                break;
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn finish(&mut self) -> MolResult<()> {
        self.storage.finish()?;
        Ok(())
    }
}

impl Write for TextFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.storage.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.storage.flush()
    }
}

/// Binary records over the same storage backends as `TextFile`.
pub struct BinaryFile {
    storage: Storage,
}

impl BinaryFile {
    pub fn open(path: &Path, mode: FileMode) -> MolResult<Self> {
        Ok(Self {
            storage: Storage::open(path, mode)?,
        })
    }

    pub fn memory_reader(data: Vec<u8>) -> Self {
        Self {
            storage: Storage::memory_reader(data),
        }
    }

    pub fn memory_writer(buffer: SharedBuffer) -> Self {
        Self {
            storage: Storage::memory_writer(buffer),
        }
    }

    pub fn tell(&mut self) -> MolResult<u64> {
        Ok(self.storage.seek(SeekFrom::Current(0))?)
    }

    pub fn seek(&mut self, position: u64) -> MolResult<()> {
        self.storage.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn seek_end(&mut self) -> MolResult<u64> {
        Ok(self.storage.seek(SeekFrom::End(0))?)
    }

    /// Total length, restoring the current position afterwards.
    pub fn len(&mut self) -> MolResult<u64> {
        let current = self.storage.seek(SeekFrom::Current(0))?;
        let end = self.storage.seek(SeekFrom::End(0))?;
        self.storage.seek(SeekFrom::Start(current))?;
        Ok(end)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> MolResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.storage.read(&mut buf[filled..])?;
            if read == 0 {
                return Err(MolError::File(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected end of file",
                )));
            }
            filled += read;
        }
        Ok(())
    }

    pub fn read_u32(&mut self, endian: Endian) -> MolResult<u32> {
        let mut bytes = [0u8; 4];
        self.read_exact(&mut bytes)?;
        Ok(match endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_i32(&mut self, endian: Endian) -> MolResult<i32> {
        Ok(self.read_u32(endian)? as i32)
    }

    pub fn read_f32(&mut self, endian: Endian) -> MolResult<f32> {
        Ok(f32::from_bits(self.read_u32(endian)?))
    }

    pub fn read_f64(&mut self, endian: Endian) -> MolResult<f64> {
        let mut bytes = [0u8; 8];
        self.read_exact(&mut bytes)?;
        Ok(match endian {
            Endian::Little => f64::from_le_bytes(bytes),
            Endian::Big => f64::from_be_bytes(bytes),
        })
    }

    pub fn write_all(&mut self, buf: &[u8]) -> MolResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let count = self.storage.write(&buf[written..])?;
            if count == 0 {
                return Err(MolError::File(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write the whole buffer",
                )));
            }
            written += count;
        }
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32, endian: Endian) -> MolResult<()> {
        let bytes = match endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        self.write_all(&bytes)
    }

    pub fn write_i32(&mut self, value: i32, endian: Endian) -> MolResult<()> {
        self.write_u32(value as u32, endian)
    }

    pub fn write_f32(&mut self, value: f32, endian: Endian) -> MolResult<()> {
        self.write_u32(value.to_bits(), endian)
    }

    pub fn write_f64(&mut self, value: f64, endian: Endian) -> MolResult<()> {
        let bytes = match endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        self.write_all(&bytes)
    }

    pub fn finish(&mut self) -> MolResult<()> {
        self.storage.finish()?;
        Ok(())
    }
}
