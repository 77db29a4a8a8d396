//! VASP POSCAR: comment, scaling factor, lattice vectors, species and
//! counts, then one position per atom in direct or cartesian coordinates.
//! The format holds exactly one frame.

use std::io::Write;

use molfile_core::{Atom, Frame, Matrix3D, MolError, MolResult, UnitCell, Vector3D};

use crate::file::{FileMode, TextFile};
use crate::warnings::Warnings;
use crate::{FileSource, Format};

pub struct PoscarFormat {
    file: TextFile,
    warnings: Warnings,
    written: bool,
}

impl PoscarFormat {
    pub fn new(source: FileSource, mode: FileMode, warnings: Warnings) -> MolResult<Self> {
        Ok(Self {
            file: source.text(mode)?,
            warnings,
            written: false,
        })
    }

    fn read_lattice_vector(&mut self) -> MolResult<[f64; 3]> {
        let line = self.file.readline()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(MolError::Format(format!(
                "invalid lattice vector in POSCAR: '{line}'"
            )));
        }
        let mut vector = [0.0; 3];
        for (slot, field) in vector.iter_mut().zip(&fields) {
            *slot = field.parse::<f64>().map_err(|_| {
                MolError::Format(format!("invalid lattice vector in POSCAR: '{line}'"))
            })?;
        }
        Ok(vector)
    }
}

fn determinant(m: &Matrix3D) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn fractional_to_cartesian(m: &Matrix3D, v: [f64; 3]) -> Vector3D {
    Vector3D::new(
        v[0] * m[0][0] + v[1] * m[1][0] + v[2] * m[2][0],
        v[0] * m[0][1] + v[1] * m[1][1] + v[2] * m[2][1],
        v[0] * m[0][2] + v[1] * m[1][2] + v[2] * m[2][2],
    )
}

impl Format for PoscarFormat {
    fn read_next(&mut self, frame: &mut Frame) -> MolResult<()> {
        if self.file.tellpos() != 0 {
            return Err(MolError::Format(
                "POSCAR format only supports reading one frame".into(),
            ));
        }

        let comment = self.file.readline()?;
        if self.file.eof() {
            return Err(MolError::Format("end of file reached in POSCAR reader".into()));
        }
        *frame = Frame::new();
        if !comment.trim().is_empty() {
            frame.properties.set("name", comment.trim());
        }

        let scale_line = self.file.readline()?;
        let scale = scale_line.trim().parse::<f64>().map_err(|_| {
            MolError::Format(format!(
                "invalid scaling factor in POSCAR: '{}'",
                scale_line.trim()
            ))
        })?;

        let mut matrix: Matrix3D = [
            self.read_lattice_vector()?,
            self.read_lattice_vector()?,
            self.read_lattice_vector()?,
        ];
        // A negative scaling factor is a target cell volume.
        let factor = if scale < 0.0 {
            (-scale / determinant(&matrix).abs()).cbrt()
        } else {
            scale
        };
        for row in &mut matrix {
            for value in row {
                *value *= factor;
            }
        }
        let cell = UnitCell::from_matrix(matrix)
            .map_err(|_| MolError::Format("invalid lattice in POSCAR".into()))?;
        frame.set_cell(cell);

        let species_line = self.file.readline()?;
        let species: Vec<String> = species_line
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if species.is_empty() {
            return Err(MolError::Format("missing species names in POSCAR".into()));
        }
        if species[0].parse::<usize>().is_ok() {
            return Err(MolError::Format(
                "missing species names in POSCAR, VASP 4 files are not supported".into(),
            ));
        }

        let counts_line = self.file.readline()?;
        let counts: Vec<usize> = counts_line
            .split_whitespace()
            .map(|field| {
                field.parse::<usize>().map_err(|_| {
                    MolError::Format(format!("invalid species count in POSCAR: '{field}'"))
                })
            })
            .collect::<MolResult<_>>()?;
        if counts.len() != species.len() {
            return Err(MolError::Format(format!(
                "POSCAR has {} species names but {} counts",
                species.len(),
                counts.len()
            )));
        }

        let mut mode_line = self.file.readline()?;
        let selective = matches!(mode_line.trim_start().chars().next(), Some('S') | Some('s'));
        if selective {
            mode_line = self.file.readline()?;
        }
        let cartesian = match mode_line.trim_start().chars().next() {
            Some('C') | Some('c') | Some('K') | Some('k') => true,
            Some('D') | Some('d') => false,
            _ => {
                return Err(MolError::Format(format!(
                    "invalid coordinate mode in POSCAR: '{mode_line}'"
                )))
            }
        };

        for (symbol, &count) in species.iter().zip(&counts) {
            for _ in 0..count {
                let line = self.file.readline()?;
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 3 {
                    return Err(MolError::Format(format!(
                        "invalid position in POSCAR: '{line}'"
                    )));
                }
                let mut raw = [0.0; 3];
                for (slot, field) in raw.iter_mut().zip(&fields) {
                    *slot = field.parse::<f64>().map_err(|_| {
                        MolError::Format(format!("invalid position in POSCAR: '{line}'"))
                    })?;
                }
                let position = if cartesian {
                    Vector3D::new(raw[0] * factor, raw[1] * factor, raw[2] * factor)
                } else {
                    fractional_to_cartesian(&matrix, raw)
                };

                let mut atom = Atom::new(symbol.as_str());
                if selective && fields.len() >= 6 {
                    atom.properties
                        .set("selective_dynamics", fields[3..6].join(" "));
                }
                frame.add_atom(atom, position);
            }
        }
        Ok(())
    }

    fn write_next(&mut self, frame: &Frame) -> MolResult<()> {
        if self.written {
            return Err(MolError::Format(
                "POSCAR format only supports writing one frame".into(),
            ));
        }
        self.written = true;

        let comment = frame
            .properties
            .get("name")
            .and_then(|p| p.as_string())
            .unwrap_or("POSCAR");
        writeln!(self.file, "{comment}")?;
        writeln!(self.file, "   1.0")?;
        let matrix = frame.cell().matrix();
        for row in matrix {
            writeln!(self.file, "{:>22.16}{:>22.16}{:>22.16}", row[0], row[1], row[2])?;
        }

        // VASP wants one contiguous block per species: group atoms by type
        // in order of first appearance.
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        for (i, atom) in frame.topology().atoms().iter().enumerate() {
            match groups
                .iter_mut()
                .find(|(symbol, _)| symbol.as_str() == atom.atomic_type())
            {
                Some((_, members)) => members.push(i),
                None => groups.push((atom.atomic_type().to_string(), vec![i])),
            }
        }

        let names: Vec<&str> = groups.iter().map(|(symbol, _)| symbol.as_str()).collect();
        writeln!(self.file, "  {}", names.join("  "))?;
        let counts: Vec<String> = groups
            .iter()
            .map(|(_, members)| members.len().to_string())
            .collect();
        writeln!(self.file, "  {}", counts.join("  "))?;

        let selective = frame
            .topology()
            .atoms()
            .iter()
            .any(|atom| atom.properties.get("selective_dynamics").is_some());
        if selective {
            writeln!(self.file, "Selective dynamics")?;
        }
        writeln!(self.file, "Cartesian")?;

        for (_, members) in &groups {
            for &i in members {
                let position = frame.positions()[i];
                write!(
                    self.file,
                    "{:>22.16}{:>22.16}{:>22.16}",
                    position.x, position.y, position.z
                )?;
                if selective {
                    let flags = frame[i]
                        .properties
                        .get("selective_dynamics")
                        .and_then(|p| p.as_string())
                        .unwrap_or("T T T")
                        .to_string();
                    write!(self.file, "  {flags}")?;
                }
                writeln!(self.file)?;
            }
        }
        if frame.cell().is_infinite() {
            self.warnings.warn(
                "POSCAR writer",
                "the frame has no unit cell, written lattice vectors are all zero",
            );
        }
        Ok(())
    }

    fn forward(&mut self) -> MolResult<Option<u64>> {
        // Only one frame per file; consume a line so the next call sees a
        // non-zero position and reports the end.
        let position = self.file.tellpos();
        if position == 0 {
            self.file.readline()?;
            if self.file.eof() {
                return Ok(None);
            }
            Ok(Some(0))
        } else {
            Ok(None)
        }
    }

    fn seek(&mut self, position: u64) -> MolResult<()> {
        self.file.seekpos(position)
    }

    fn finalize(&mut self) -> MolResult<()> {
        self.file.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reader(content: &str) -> PoscarFormat {
        PoscarFormat::new(
            FileSource::MemoryRead(content.as_bytes().to_vec()),
            FileMode::Read,
            Warnings::default(),
        )
        .unwrap()
    }

    const DIRECT: &str = "\
cubic BN
   3.57
 0.0 0.5 0.5
 0.5 0.0 0.5
 0.5 0.5 0.0
   B  N
   1  1
Direct
 0.00 0.00 0.00
 0.25 0.25 0.25
";

    #[test]
    fn reads_direct_coordinates() {
        let mut format = reader(DIRECT);
        let mut frame = Frame::new();
        format.read_next(&mut frame).unwrap();
        assert_eq!(frame.size(), 2);
        assert_eq!(frame[0].atomic_type(), "B");
        assert_eq!(frame[1].atomic_type(), "N");
        assert_eq!(
            frame.properties.get("name").unwrap().as_string().unwrap(),
            "cubic BN"
        );
        assert!(!frame.cell().is_infinite());

        // (0.25, 0.25, 0.25) through the scaled lattice.
        let expected = 0.25 * 3.57;
        assert_abs_diff_eq!(frame.positions()[1].x, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(frame.positions()[1].y, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(frame.positions()[1].z, expected, epsilon = 1e-12);

        assert!(format.read_next(&mut frame).is_err());
    }

    #[test]
    fn cartesian_matches_direct() {
        let cartesian = "\
cubic BN
   1.0
 0.0 1.785 1.785
 1.785 0.0 1.785
 1.785 1.785 0.0
   B  N
   1  1
Cartesian
 0.0 0.0 0.0
 0.8925 0.8925 0.8925
";
        let mut direct_frame = Frame::new();
        reader(DIRECT).read_next(&mut direct_frame).unwrap();
        let mut cartesian_frame = Frame::new();
        reader(cartesian).read_next(&mut cartesian_frame).unwrap();
        for (a, b) in direct_frame
            .positions()
            .iter()
            .zip(cartesian_frame.positions())
        {
            assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
            assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
            assert_abs_diff_eq!(a.z, b.z, epsilon = 1e-9);
        }
    }

    #[test]
    fn selective_dynamics_flags() {
        let content = "\
slab
   1.0
 10.0 0.0 0.0
 0.0 10.0 0.0
 0.0 0.0 10.0
   O
   2
Selective dynamics
Direct
 0.0 0.0 0.0 T T F
 0.5 0.5 0.5 F F F
";
        let mut frame = Frame::new();
        reader(content).read_next(&mut frame).unwrap();
        assert_eq!(
            frame[0]
                .properties
                .get("selective_dynamics")
                .unwrap()
                .as_string()
                .unwrap(),
            "T T F"
        );
    }

    #[test]
    fn vasp4_is_rejected() {
        let content = "\
no species
   1.0
 1.0 0.0 0.0
 0.0 1.0 0.0
 0.0 0.0 1.0
   1  1
Direct
 0.0 0.0 0.0
 0.5 0.5 0.5
";
        let mut frame = Frame::new();
        assert!(reader(content).read_next(&mut frame).is_err());
    }

    #[test]
    fn forward_reports_a_single_frame() {
        let mut format = reader(DIRECT);
        assert_eq!(format.forward().unwrap(), Some(0));
        assert_eq!(format.forward().unwrap(), None);
    }
}
