#![forbid(unsafe_code)]

//! Trajectory reading and writing on top of the `molfile-core` data model:
//! a file layer with transparent compression, per-format codecs behind a
//! common `Format` trait, and the `Trajectory` engine with random access.

pub mod file;
pub mod formats;
pub mod hybrid36;
pub mod registry;
pub mod trajectory;
pub mod warnings;

use molfile_core::{Frame, MolResult};

pub use file::{BinaryFile, Compression, Endian, FileMode, SharedBuffer, TextFile};
pub use registry::{FormatRegistry, FormatSpec};
pub use trajectory::Trajectory;
pub use warnings::Warnings;

/// One format codec attached to an open file.
///
/// `forward` must be lossless: repeatedly calling it and then seeking back
/// to a recorded offset before `read_next` gives the same frames as a
/// purely sequential read.
pub trait Format {
    /// Decode the next frame into `frame`. Calling this at end of file is
    /// an error; callers check the step count first.
    fn read_next(&mut self, frame: &mut Frame) -> MolResult<()>;

    /// Append one frame.
    fn write_next(&mut self, frame: &Frame) -> MolResult<()>;

    /// Skip exactly one frame, returning the byte offset of its start, or
    /// `None` at end of file. Used to build the frame index.
    fn forward(&mut self) -> MolResult<Option<u64>>;

    /// Position the underlying file at an offset previously returned by
    /// `forward`.
    fn seek(&mut self, position: u64) -> MolResult<()>;

    /// Go back to the first frame. Formats with a file-level header skip
    /// past it here.
    fn rewind(&mut self) -> MolResult<()> {
        self.seek(0)
    }

    /// Emit any trailer and flush; called when the trajectory is closed.
    fn finalize(&mut self) -> MolResult<()> {
        Ok(())
    }
}

/// How a codec gets at its bytes: an on-disk path or a memory buffer.
pub enum FileSource {
    Path(std::path::PathBuf),
    MemoryRead(Vec<u8>),
    MemoryWrite(SharedBuffer),
}

impl FileSource {
    pub(crate) fn text(self, mode: FileMode) -> MolResult<TextFile> {
        match self {
            FileSource::Path(path) => TextFile::open(&path, mode),
            FileSource::MemoryRead(data) => Ok(TextFile::memory_reader(data)),
            FileSource::MemoryWrite(buffer) => Ok(TextFile::memory_writer(buffer)),
        }
    }

    pub(crate) fn binary(self, mode: FileMode) -> MolResult<BinaryFile> {
        match self {
            FileSource::Path(path) => BinaryFile::open(&path, mode),
            FileSource::MemoryRead(data) => Ok(BinaryFile::memory_reader(data)),
            FileSource::MemoryWrite(buffer) => Ok(BinaryFile::memory_writer(buffer)),
        }
    }
}
