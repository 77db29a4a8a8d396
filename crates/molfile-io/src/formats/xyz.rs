use std::io::Write;

use molfile_core::{Atom, Frame, MolError, MolResult, Vector3D};

use crate::file::{FileMode, TextFile};
use crate::warnings::Warnings;
use crate::{FileSource, Format};

/// XYZ: an atom count, a comment line, then `name x y z` records. The
/// comment round-trips through the frame `name` property.
pub struct XyzFormat {
    file: TextFile,
    warnings: Warnings,
}

impl XyzFormat {
    pub fn new(source: FileSource, mode: FileMode, warnings: Warnings) -> MolResult<Self> {
        Ok(Self {
            file: source.text(mode)?,
            warnings,
        })
    }

    fn read_count(&mut self) -> MolResult<Option<usize>> {
        let line = self.file.readline()?;
        if self.file.eof() {
            return Ok(None);
        }
        if line.trim().is_empty() {
            // Trailing blank lines are tolerated at the end of the file.
            loop {
                let line = self.file.readline()?;
                if self.file.eof() {
                    return Ok(None);
                }
                if !line.trim().is_empty() {
                    return Err(MolError::Format(format!(
                        "unexpected content after a blank line in XYZ file: '{line}'"
                    )));
                }
            }
        }
        let count = line.trim().parse::<usize>().map_err(|_| {
            MolError::Format(format!("invalid atom count in XYZ file: '{}'", line.trim()))
        })?;
        Ok(Some(count))
    }
}

impl Format for XyzFormat {
    fn read_next(&mut self, frame: &mut Frame) -> MolResult<()> {
        let natoms = self
            .read_count()?
            .ok_or_else(|| MolError::Format("end of file reached in XYZ reader".into()))?;

        *frame = Frame::new();
        let comment = self.file.readline()?;
        if !comment.trim().is_empty() {
            frame.properties.set("name", comment.trim());
        }

        for _ in 0..natoms {
            let line = self.file.readline()?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(MolError::Format(format!(
                    "not enough data in XYZ record: '{line}'"
                )));
            }
            let x = parse_coordinate(fields[1], &line)?;
            let y = parse_coordinate(fields[2], &line)?;
            let z = parse_coordinate(fields[3], &line)?;
            frame.add_atom(Atom::new(fields[0]), Vector3D::new(x, y, z));
        }
        Ok(())
    }

    fn write_next(&mut self, frame: &Frame) -> MolResult<()> {
        writeln!(self.file, "{}", frame.size())?;
        let comment = frame
            .properties
            .get("name")
            .and_then(|p| p.as_string())
            .unwrap_or("");
        writeln!(self.file, "{comment}")?;
        for (atom, position) in frame.topology().atoms().iter().zip(frame.positions()) {
            let name = if !atom.name().is_empty() {
                atom.name()
            } else if !atom.atomic_type().is_empty() {
                atom.atomic_type()
            } else {
                self.warnings
                    .warn("XYZ writer", "atom with no name or type, writing it as 'X'");
                "X"
            };
            writeln!(
                self.file,
                "{name} {:.6} {:.6} {:.6}",
                position.x, position.y, position.z
            )?;
        }
        Ok(())
    }

    fn forward(&mut self) -> MolResult<Option<u64>> {
        let position = self.file.tellpos();
        let natoms = match self.read_count()? {
            Some(natoms) => natoms,
            None => return Ok(None),
        };
        for _ in 0..natoms + 1 {
            self.file.readline()?;
            if self.file.eof() {
                return Err(MolError::Format(
                    "XYZ file ended in the middle of a frame".into(),
                ));
            }
        }
        Ok(Some(position))
    }

    fn seek(&mut self, position: u64) -> MolResult<()> {
        self.file.seekpos(position)
    }

    fn finalize(&mut self) -> MolResult<()> {
        self.file.finish()
    }
}

fn parse_coordinate(field: &str, line: &str) -> MolResult<f64> {
    field
        .parse::<f64>()
        .map_err(|_| MolError::Format(format!("invalid coordinate in XYZ record: '{line}'")))
}
