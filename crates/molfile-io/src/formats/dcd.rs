//! CHARMM/NAMD DCD trajectories: Fortran-style records with 4-byte length
//! markers, an optional unit cell block per frame and one f32 record per
//! coordinate axis. Reading handles both endiannesses; writing emits
//! little-endian and patches the frame count into the header on close.

use molfile_core::{Frame, MolError, MolResult, UnitCell};

use crate::file::{BinaryFile, Endian, FileMode};
use crate::warnings::Warnings;
use crate::{FileSource, Format};

const HEADER_SIZE: u32 = 84;
const CELL_RECORD_SIZE: u32 = 48;
const CHARMM_VERSION: i32 = 24;

pub struct DcdFormat {
    file: BinaryFile,
    warnings: Warnings,
    endian: Endian,
    natoms: usize,
    has_crystal: bool,
    data_start: u64,
    file_length: u64,
    initial_frames: u32,
    frames_written: u32,
    header_written: bool,
    buffer: Vec<u8>,
}

impl DcdFormat {
    pub fn new(source: FileSource, mode: FileMode, warnings: Warnings) -> MolResult<Self> {
        let file = source.binary(mode)?;
        let mut format = Self {
            file,
            warnings,
            endian: Endian::Little,
            natoms: 0,
            has_crystal: false,
            data_start: 0,
            file_length: 0,
            initial_frames: 0,
            frames_written: 0,
            header_written: false,
            buffer: Vec::new(),
        };

        match mode {
            FileMode::Read => format.read_header()?,
            FileMode::Write => {}
            FileMode::Append => {
                if format.file.len()? > 0 {
                    format.read_header()?;
                    format.header_written = true;
                    format.initial_frames = format.frame_count();
                }
            }
        }
        Ok(format)
    }

    fn read_header(&mut self) -> MolResult<()> {
        self.file_length = self.file.len()?;

        let mut marker = [0u8; 4];
        self.file.read_exact(&mut marker)?;
        self.endian = if u32::from_le_bytes(marker) == HEADER_SIZE {
            Endian::Little
        } else if u32::from_be_bytes(marker) == HEADER_SIZE {
            Endian::Big
        } else {
            return Err(MolError::Format(
                "this file does not look like a DCD file".into(),
            ));
        };

        let mut magic = [0u8; 4];
        self.file.read_exact(&mut magic)?;
        if &magic != b"CORD" {
            return Err(MolError::Format(
                "invalid signature in DCD header, expected 'CORD'".into(),
            ));
        }

        let mut icntrl = [0i32; 20];
        for value in &mut icntrl {
            *value = self.file.read_i32(self.endian)?;
        }
        if icntrl[8] > 0 {
            return Err(MolError::Format(
                "DCD files with fixed atoms are not supported".into(),
            ));
        }
        self.has_crystal = icntrl[10] != 0;
        self.expect_marker(HEADER_SIZE)?;

        // Title record, skipped whatever its content.
        let title_size = self.file.read_u32(self.endian)?;
        self.buffer.resize(title_size as usize, 0);
        let mut title = std::mem::take(&mut self.buffer);
        self.file.read_exact(&mut title)?;
        self.buffer = title;
        self.expect_marker(title_size)?;

        self.expect_marker(4)?;
        let natoms = self.file.read_i32(self.endian)?;
        if natoms <= 0 {
            return Err(MolError::Format(format!(
                "invalid atom count in DCD header: {natoms}"
            )));
        }
        self.natoms = natoms as usize;
        self.expect_marker(4)?;

        self.data_start = self.file.tell()?;
        Ok(())
    }

    fn expect_marker(&mut self, expected: u32) -> MolResult<()> {
        let marker = self.file.read_u32(self.endian)?;
        if marker != expected {
            return Err(MolError::Format(format!(
                "invalid record marker in DCD file: expected {expected}, got {marker}"
            )));
        }
        Ok(())
    }

    fn frame_size(&self) -> u64 {
        let cell = if self.has_crystal {
            (CELL_RECORD_SIZE + 8) as u64
        } else {
            0
        };
        cell + 3 * (8 + 4 * self.natoms as u64)
    }

    fn frame_count(&self) -> u32 {
        if self.frame_size() == 0 {
            return 0;
        }
        ((self.file_length - self.data_start) / self.frame_size()) as u32
    }

    fn read_cell(&mut self) -> MolResult<UnitCell> {
        self.expect_marker(CELL_RECORD_SIZE)?;
        let mut values = [0.0; 6];
        for value in &mut values {
            *value = self.file.read_f64(self.endian)?;
        }
        self.expect_marker(CELL_RECORD_SIZE)?;

        // CHARMM order: a, gamma, b, beta, alpha, c. Angles are stored
        // either in degrees or as cosines depending on the writer.
        let (a, b, c) = (values[0], values[2], values[5]);
        let gamma = cell_angle(values[1]);
        let beta = cell_angle(values[3]);
        let alpha = cell_angle(values[4]);

        if a <= 0.0 || b <= 0.0 || c <= 0.0 {
            return Ok(UnitCell::infinite());
        }
        UnitCell::triclinic(a, b, c, alpha, beta, gamma)
            .map_err(|_| MolError::Format("invalid unit cell in DCD frame".into()))
    }

    fn read_axis(&mut self, frame: &mut Frame, axis: usize) -> MolResult<()> {
        let expected = 4 * self.natoms as u32;
        self.expect_marker(expected)?;
        self.buffer.resize(4 * self.natoms, 0);
        let mut buffer = std::mem::take(&mut self.buffer);
        self.file.read_exact(&mut buffer)?;
        for (i, bytes) in buffer.chunks_exact(4).enumerate() {
            let bytes = [bytes[0], bytes[1], bytes[2], bytes[3]];
            let value = match self.endian {
                Endian::Little => f32::from_le_bytes(bytes),
                Endian::Big => f32::from_be_bytes(bytes),
            };
            let position = &mut frame.positions_mut()[i];
            match axis {
                0 => position.x = value as f64,
                1 => position.y = value as f64,
                _ => position.z = value as f64,
            }
        }
        self.buffer = buffer;
        self.expect_marker(expected)?;
        Ok(())
    }

    fn write_header(&mut self, frame: &Frame) -> MolResult<()> {
        self.endian = Endian::Little;
        self.natoms = frame.size();
        self.has_crystal = !frame.cell().is_infinite();

        self.file.write_u32(HEADER_SIZE, self.endian)?;
        self.file.write_all(b"CORD")?;
        // Slots 0 (frame count) and 3 (step count) stay zero until close.
        for slot in 0..20 {
            match slot {
                2 => self.file.write_i32(1, self.endian)?,
                9 => self.file.write_f32(1.0, self.endian)?,
                10 => self.file.write_i32(self.has_crystal as i32, self.endian)?,
                19 => self.file.write_i32(CHARMM_VERSION, self.endian)?,
                _ => self.file.write_i32(0, self.endian)?,
            }
        }
        self.file.write_u32(HEADER_SIZE, self.endian)?;

        let mut title = [b' '; 80];
        let text = b"Written by the molfile library";
        title[..text.len()].copy_from_slice(text);
        self.file.write_u32(4 + 80, self.endian)?;
        self.file.write_i32(1, self.endian)?;
        self.file.write_all(&title)?;
        self.file.write_u32(4 + 80, self.endian)?;

        self.file.write_u32(4, self.endian)?;
        self.file.write_i32(self.natoms as i32, self.endian)?;
        self.file.write_u32(4, self.endian)?;

        self.data_start = self.file.tell()?;
        self.header_written = true;
        Ok(())
    }
}

fn cell_angle(value: f64) -> f64 {
    // Cosine form when the stored value fits in [-1, 1].
    if (-1.0..=1.0).contains(&value) {
        value.acos().to_degrees()
    } else {
        value
    }
}

impl Format for DcdFormat {
    fn read_next(&mut self, frame: &mut Frame) -> MolResult<()> {
        let position = self.file.tell()?;
        if position >= self.file_length {
            return Err(MolError::Format("end of file reached in DCD reader".into()));
        }

        *frame = Frame::new();
        frame.resize(self.natoms);
        if self.has_crystal {
            let cell = self.read_cell()?;
            frame.set_cell(cell);
        }
        for axis in 0..3 {
            self.read_axis(frame, axis)?;
        }
        Ok(())
    }

    fn write_next(&mut self, frame: &Frame) -> MolResult<()> {
        if !self.header_written {
            self.write_header(frame)?;
        } else if frame.size() != self.natoms {
            return Err(MolError::Format(format!(
                "this DCD file contains {} atoms, can not write a frame with {} atoms",
                self.natoms,
                frame.size()
            )));
        }

        if self.has_crystal {
            let cell = frame.cell();
            self.file.write_u32(CELL_RECORD_SIZE, self.endian)?;
            for value in [
                cell.a(),
                cell.gamma(),
                cell.b(),
                cell.beta(),
                cell.alpha(),
                cell.c(),
            ] {
                self.file.write_f64(value, self.endian)?;
            }
            self.file.write_u32(CELL_RECORD_SIZE, self.endian)?;
        } else if !frame.cell().is_infinite() {
            self.warnings.warn(
                "DCD writer",
                "the first frame had no unit cell, dropping this frame's cell",
            );
        }

        let marker = 4 * self.natoms as u32;
        for axis in 0..3 {
            self.buffer.clear();
            for position in frame.positions() {
                let value = match axis {
                    0 => position.x,
                    1 => position.y,
                    _ => position.z,
                } as f32;
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
            let buffer = std::mem::take(&mut self.buffer);
            self.file.write_u32(marker, self.endian)?;
            self.file.write_all(&buffer)?;
            self.file.write_u32(marker, self.endian)?;
            self.buffer = buffer;
        }

        self.frames_written += 1;
        Ok(())
    }

    fn forward(&mut self) -> MolResult<Option<u64>> {
        let position = self.file.tell()?;
        if position >= self.file_length {
            return Ok(None);
        }
        if self.file_length - position < self.frame_size() {
            return Err(MolError::Format(
                "DCD file ends in the middle of a frame".into(),
            ));
        }
        self.file.seek(position + self.frame_size())?;
        Ok(Some(position))
    }

    fn seek(&mut self, position: u64) -> MolResult<()> {
        self.file.seek(position)
    }

    fn rewind(&mut self) -> MolResult<()> {
        self.file.seek(self.data_start)
    }

    fn finalize(&mut self) -> MolResult<()> {
        if self.header_written && self.frames_written > 0 {
            let total = self.initial_frames + self.frames_written;
            // nframes and nsteps live at fixed offsets inside the first
            // header record.
            self.file.seek(8)?;
            self.file.write_u32(total, self.endian)?;
            self.file.seek(20)?;
            self.file.write_u32(total, self.endian)?;
            self.file.seek_end()?;
            self.frames_written = 0;
            self.initial_frames = total;
        }
        self.file.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SharedBuffer;
    use molfile_core::{Atom, Vector3D};

    fn sample_frame(offset: f64) -> Frame {
        let mut frame = Frame::new();
        for i in 0..3 {
            frame.add_atom(
                Atom::new("C"),
                Vector3D::new(offset + i as f64, -1.5, 2.0 * i as f64),
            );
        }
        frame
            .set_cell(UnitCell::orthorhombic(10.0, 12.0, 14.0).unwrap());
        frame
    }

    #[test]
    fn memory_roundtrip() {
        let buffer = SharedBuffer::new();
        let mut writer = DcdFormat::new(
            FileSource::MemoryWrite(buffer.clone()),
            FileMode::Write,
            Warnings::default(),
        )
        .unwrap();
        writer.write_next(&sample_frame(0.0)).unwrap();
        writer.write_next(&sample_frame(5.0)).unwrap();
        writer.finalize().unwrap();

        let mut reader = DcdFormat::new(
            FileSource::MemoryRead(buffer.data()),
            FileMode::Read,
            Warnings::default(),
        )
        .unwrap();
        assert_eq!(reader.natoms, 3);
        assert!(reader.has_crystal);

        let mut frame = Frame::new();
        reader.read_next(&mut frame).unwrap();
        assert_eq!(frame.size(), 3);
        assert_eq!(frame.positions()[1].x, 1.0);
        assert_eq!(frame.positions()[2].z, 4.0);
        assert_eq!(frame.cell().a(), 10.0);
        assert_eq!(frame.cell().alpha(), 90.0);

        reader.read_next(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 5.0);
        assert!(reader.read_next(&mut frame).is_err());
    }

    #[test]
    fn forward_skips_whole_frames() {
        let buffer = SharedBuffer::new();
        let mut writer = DcdFormat::new(
            FileSource::MemoryWrite(buffer.clone()),
            FileMode::Write,
            Warnings::default(),
        )
        .unwrap();
        for i in 0..3 {
            writer.write_next(&sample_frame(i as f64)).unwrap();
        }
        writer.finalize().unwrap();

        let mut reader = DcdFormat::new(
            FileSource::MemoryRead(buffer.data()),
            FileMode::Read,
            Warnings::default(),
        )
        .unwrap();
        let first = reader.forward().unwrap().unwrap();
        let second = reader.forward().unwrap().unwrap();
        let third = reader.forward().unwrap().unwrap();
        assert_eq!(reader.forward().unwrap(), None);
        assert_eq!(second - first, reader.frame_size());
        assert_eq!(third - second, reader.frame_size());

        let mut frame = Frame::new();
        reader.seek(second).unwrap();
        reader.read_next(&mut frame).unwrap();
        assert_eq!(frame.positions()[0].x, 1.0);
    }

    #[test]
    fn mismatched_atom_count_is_rejected() {
        let buffer = SharedBuffer::new();
        let mut writer = DcdFormat::new(
            FileSource::MemoryWrite(buffer),
            FileMode::Write,
            Warnings::default(),
        )
        .unwrap();
        writer.write_next(&sample_frame(0.0)).unwrap();
        let mut small = Frame::new();
        small.add_atom(Atom::new("H"), Vector3D::default());
        assert!(writer.write_next(&small).is_err());
    }

    #[test]
    fn garbage_is_not_a_dcd_file() {
        let result = DcdFormat::new(
            FileSource::MemoryRead(b"not a dcd file at all".to_vec()),
            FileMode::Read,
            Warnings::default(),
        );
        assert!(result.is_err());
    }
}
