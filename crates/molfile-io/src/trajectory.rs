//! The trajectory engine: format selection, the lazy frame index backing
//! random access and step counting, and the read/write/append state machine.

use std::path::Path;

use molfile_core::{Frame, MolError, MolResult, Topology, UnitCell};

use crate::file::{FileMode, SharedBuffer};
use crate::registry::FormatRegistry;
use crate::warnings::Warnings;
use crate::{FileSource, Format};

pub struct Trajectory {
    format: Box<dyn Format>,
    mode: FileMode,
    /// Next frame for sequential reads.
    step: usize,
    /// Byte offsets of frame starts, built lazily from `forward` and
    /// dropped by any write.
    frame_positions: Option<Vec<u64>>,
    frames_written: usize,
    /// Frames already in the file when it was opened for appending.
    initial_steps: usize,
    topology: Option<Topology>,
    cell: Option<UnitCell>,
    path: String,
    memory: Option<SharedBuffer>,
    closed: bool,
}

impl std::fmt::Debug for Trajectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trajectory")
            .field("mode", &self.mode)
            .field("step", &self.step)
            .field("frames_written", &self.frames_written)
            .field("initial_steps", &self.initial_steps)
            .field("path", &self.path)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Trajectory {
    /// Open a trajectory, picking the format from the path extension.
    /// `mode` is 'r' to read, 'w' to write, 'a' to append.
    pub fn open(path: impl AsRef<Path>, mode: char) -> MolResult<Self> {
        Self::open_with(
            path.as_ref(),
            FileMode::from_char(mode)?,
            None,
            &FormatRegistry::default(),
            Warnings::default(),
        )
    }

    /// Open a trajectory with an explicit format name.
    pub fn open_with_format(
        path: impl AsRef<Path>,
        mode: char,
        format: &str,
    ) -> MolResult<Self> {
        Self::open_with(
            path.as_ref(),
            FileMode::from_char(mode)?,
            Some(format),
            &FormatRegistry::default(),
            Warnings::default(),
        )
    }

    /// Full-control constructor: explicit mode, optional format name, a
    /// caller-provided registry and warning sink.
    pub fn open_with(
        path: &Path,
        mode: FileMode,
        format: Option<&str>,
        registry: &FormatRegistry,
        warnings: Warnings,
    ) -> MolResult<Self> {
        let spec = match format {
            Some(name) => registry.by_name(name)?,
            None => registry.by_path(path)?,
        };
        let format = registry.build(
            spec,
            FileSource::Path(path.to_path_buf()),
            mode,
            warnings,
        )?;
        let mut trajectory = Self::from_format(format, mode, path.display().to_string(), None);
        if mode == FileMode::Append {
            trajectory.prepare_append(Some(path))?;
        }
        Ok(trajectory)
    }

    /// Read a trajectory from an in-memory buffer.
    pub fn memory_reader(data: &[u8], format: &str) -> MolResult<Self> {
        let registry = FormatRegistry::default();
        let spec = registry.by_name(format)?;
        let format = registry.build(
            spec,
            FileSource::MemoryRead(data.to_vec()),
            FileMode::Read,
            Warnings::default(),
        )?;
        Ok(Self::from_format(
            format,
            FileMode::Read,
            "<memory>".to_string(),
            None,
        ))
    }

    /// Write a trajectory to memory; get the bytes with `memory_buffer`.
    pub fn memory_writer(format: &str) -> MolResult<Self> {
        let registry = FormatRegistry::default();
        let spec = registry.by_name(format)?;
        let buffer = SharedBuffer::new();
        let format = registry.build(
            spec,
            FileSource::MemoryWrite(buffer.clone()),
            FileMode::Write,
            Warnings::default(),
        )?;
        Ok(Self::from_format(
            format,
            FileMode::Write,
            "<memory>".to_string(),
            Some(buffer),
        ))
    }

    fn from_format(
        format: Box<dyn Format>,
        mode: FileMode,
        path: String,
        memory: Option<SharedBuffer>,
    ) -> Self {
        Self {
            format,
            mode,
            step: 0,
            frame_positions: None,
            frames_written: 0,
            initial_steps: 0,
            topology: None,
            cell: None,
            path,
            memory,
            closed: false,
        }
    }

    fn prepare_append(&mut self, path: Option<&Path>) -> MolResult<()> {
        let empty = path
            .and_then(|path| std::fs::metadata(path).ok())
            .map_or(true, |metadata| metadata.len() == 0);
        if empty {
            self.frame_positions = Some(Vec::new());
        } else {
            // Index the existing frames; the scan leaves the file at its
            // end, which is where appended frames go.
            self.build_index(false)?;
        }
        self.initial_steps = self.frame_positions.as_ref().map_or(0, Vec::len);
        self.step = self.initial_steps;
        Ok(())
    }

    /// Read the next frame sequentially.
    pub fn read(&mut self, frame: &mut Frame) -> MolResult<()> {
        self.check_readable()?;
        if let Some(positions) = &self.frame_positions {
            if self.step >= positions.len() {
                return Err(MolError::Format(format!(
                    "can not read file '{}' past its end, it only contains {} steps",
                    self.path,
                    positions.len()
                )));
            }
        }
        self.format.read_next(frame)?;
        self.apply_overrides(frame)?;
        frame.set_step(self.step as u64);
        self.step += 1;
        Ok(())
    }

    /// Read the frame at a given step, building the index if needed.
    pub fn read_step(&mut self, step: usize, frame: &mut Frame) -> MolResult<()> {
        self.check_readable()?;
        self.build_index(true)?;
        let positions = self.frame_positions.as_ref().expect("index was just built");
        let position = *positions.get(step).ok_or_else(|| {
            MolError::Config(format!(
                "can not read step {step} in '{}', it only contains {} steps",
                self.path,
                positions.len()
            ))
        })?;
        self.format.seek(position)?;
        self.format.read_next(frame)?;
        self.apply_overrides(frame)?;
        frame.set_step(step as u64);
        self.step = step + 1;
        Ok(())
    }

    /// Append a frame. Any cached frame index is invalidated.
    pub fn write(&mut self, frame: &Frame) -> MolResult<()> {
        self.check_open()?;
        if self.mode == FileMode::Read {
            return Err(MolError::Config(format!(
                "the file at '{}' was opened in read mode, can not write to it",
                self.path
            )));
        }
        self.format.write_next(frame)?;
        self.frames_written += 1;
        self.frame_positions = None;
        Ok(())
    }

    /// Number of frames in this trajectory.
    pub fn nsteps(&mut self) -> MolResult<usize> {
        match self.mode {
            FileMode::Read => {
                self.build_index(true)?;
                Ok(self.frame_positions.as_ref().map_or(0, Vec::len))
            }
            FileMode::Write => Ok(self.frames_written),
            FileMode::Append => Ok(self.initial_steps + self.frames_written),
        }
    }

    /// Use this topology for all frames read from now on, replacing
    /// whatever the format decodes.
    pub fn set_topology(&mut self, topology: Topology) {
        self.topology = Some(topology);
    }

    /// Use this cell for all frames read from now on.
    pub fn set_cell(&mut self, cell: UnitCell) {
        self.cell = Some(cell);
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bytes written so far by a memory writer.
    pub fn memory_buffer(&self) -> Option<Vec<u8>> {
        self.memory.as_ref().map(SharedBuffer::data)
    }

    /// Flush the format (writers emit their trailer here). Further reads
    /// and writes are configuration errors; dropping a trajectory closes it
    /// if this was never called.
    pub fn close(&mut self) -> MolResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.format.finalize()
    }

    fn check_open(&self) -> MolResult<()> {
        if self.closed {
            return Err(MolError::Config(format!(
                "the trajectory at '{}' was already closed",
                self.path
            )));
        }
        Ok(())
    }

    fn check_readable(&self) -> MolResult<()> {
        self.check_open()?;
        if self.mode != FileMode::Read {
            return Err(MolError::Config(format!(
                "the file at '{}' was not opened in read mode",
                self.path
            )));
        }
        Ok(())
    }

    fn build_index(&mut self, restore: bool) -> MolResult<()> {
        if self.frame_positions.is_some() {
            return Ok(());
        }
        self.format.rewind()?;
        let mut positions = Vec::new();
        while let Some(position) = self.format.forward()? {
            positions.push(position);
        }
        if restore {
            // Put the file back where sequential reads expect it; after the
            // last frame the scan already left it at the end.
            if let Some(&position) = positions.get(self.step) {
                self.format.seek(position)?;
            }
        }
        self.frame_positions = Some(positions);
        Ok(())
    }

    fn apply_overrides(&self, frame: &mut Frame) -> MolResult<()> {
        if let Some(topology) = &self.topology {
            frame.set_topology(topology.clone())?;
        }
        if let Some(cell) = &self.cell {
            frame.set_cell(*cell);
        }
        Ok(())
    }
}

impl Drop for Trajectory {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.format.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molfile_core::Atom;
    use molfile_core::Vector3D;

    const THREE_FRAMES: &str = "\
1
step 0
He 0.0 0.0 0.0
1
step 1
He 1.0 0.0 0.0
1
step 2
He 2.0 0.0 0.0
";

    #[test]
    fn sequential_reads_bump_the_cursor() {
        let mut trajectory = Trajectory::memory_reader(THREE_FRAMES.as_bytes(), "XYZ").unwrap();
        let mut frame = Frame::new();
        for expected in 0..3 {
            trajectory.read(&mut frame).unwrap();
            assert_eq!(frame.step(), expected);
            assert_eq!(frame.positions()[0].x, expected as f64);
        }
        assert!(trajectory.read(&mut frame).is_err());
    }

    #[test]
    fn random_access_matches_sequential() {
        let mut trajectory = Trajectory::memory_reader(THREE_FRAMES.as_bytes(), "XYZ").unwrap();
        assert_eq!(trajectory.nsteps().unwrap(), 3);

        let mut frame = Frame::new();
        trajectory.read_step(2, &mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 2.0);
        trajectory.read_step(0, &mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 0.0);
        // The cursor follows random accesses.
        trajectory.read(&mut frame).unwrap();
        assert_eq!(frame.step(), 1);
        assert_eq!(frame.positions()[0].x, 1.0);

        assert!(trajectory.read_step(3, &mut frame).is_err());
    }

    #[test]
    fn nsteps_does_not_disturb_sequential_reads() {
        let mut trajectory = Trajectory::memory_reader(THREE_FRAMES.as_bytes(), "XYZ").unwrap();
        let mut frame = Frame::new();
        trajectory.read(&mut frame).unwrap();
        assert_eq!(trajectory.nsteps().unwrap(), 3);
        trajectory.read(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 1.0);
    }

    #[test]
    fn memory_writer_roundtrip() {
        let mut writer = Trajectory::memory_writer("XYZ").unwrap();
        let mut frame = Frame::new();
        frame.add_atom(Atom::new("Ar"), Vector3D::new(1.0, 2.0, 3.0));
        writer.write(&frame).unwrap();
        assert_eq!(writer.nsteps().unwrap(), 1);
        let buffer = writer.memory_buffer().unwrap();
        writer.close().unwrap();

        let mut reader = Trajectory::memory_reader(&buffer, "XYZ").unwrap();
        let mut back = Frame::new();
        reader.read(&mut back).unwrap();
        assert_eq!(back.size(), 1);
        assert_eq!(back[0].name(), "Ar");
    }

    #[test]
    fn overrides_apply_after_decoding() {
        let mut trajectory = Trajectory::memory_reader(THREE_FRAMES.as_bytes(), "XYZ").unwrap();
        let mut topology = Topology::new();
        topology.add_atom(Atom::new("Kr"));
        trajectory.set_topology(topology);
        trajectory.set_cell(UnitCell::orthorhombic(5.0, 5.0, 5.0).unwrap());

        let mut frame = Frame::new();
        trajectory.read(&mut frame).unwrap();
        assert_eq!(frame[0].name(), "Kr");
        assert_eq!(frame.cell().a(), 5.0);

        // Mismatched override sizes are an error.
        let mut trajectory = Trajectory::memory_reader(THREE_FRAMES.as_bytes(), "XYZ").unwrap();
        let mut too_big = Topology::new();
        too_big.add_atom(Atom::new("Kr"));
        too_big.add_atom(Atom::new("Kr"));
        trajectory.set_topology(too_big);
        assert!(trajectory.read(&mut frame).is_err());
    }

    #[test]
    fn mode_guards() {
        let mut writer = Trajectory::memory_writer("XYZ").unwrap();
        let mut frame = Frame::new();
        assert!(writer.read(&mut frame).is_err());

        let mut reader = Trajectory::memory_reader(THREE_FRAMES.as_bytes(), "XYZ").unwrap();
        assert!(reader.write(&frame).is_err());
    }

    #[test]
    fn unknown_formats_are_configuration_errors() {
        let error = Trajectory::memory_reader(b"", "NOPE").unwrap_err();
        assert!(matches!(error, MolError::Config(_)));
    }
}
