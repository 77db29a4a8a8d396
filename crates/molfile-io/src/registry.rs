use std::path::Path;

use molfile_core::{MolError, MolResult};

use crate::file::{self, FileMode};
use crate::formats::{dcd::DcdFormat, pdb::PdbFormat, poscar::PoscarFormat, xyz::XyzFormat};
use crate::warnings::Warnings;
use crate::{FileSource, Format};

type Builder = fn(FileSource, FileMode, Warnings) -> MolResult<Box<dyn Format>>;

/// One registered codec: a name, an optional extension and a constructor.
#[derive(Clone)]
pub struct FormatSpec {
    pub name: &'static str,
    pub extension: Option<&'static str>,
    pub description: &'static str,
    builder: Builder,
}

impl FormatSpec {
    pub fn new(
        name: &'static str,
        extension: Option<&'static str>,
        description: &'static str,
        builder: Builder,
    ) -> Self {
        Self {
            name,
            extension,
            description,
            builder,
        }
    }
}

/// The set of known codecs. This is a plain value: libraries embedding
/// unusual formats build their own registry instead of mutating a global.
#[derive(Clone)]
pub struct FormatRegistry {
    specs: Vec<FormatSpec>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self {
            specs: vec![
                FormatSpec::new(
                    "PDB",
                    Some("pdb"),
                    "PDB (RCSB Protein Data Bank) text format",
                    |source, mode, warnings| Ok(Box::new(PdbFormat::new(source, mode, warnings)?)),
                ),
                FormatSpec::new(
                    "XYZ",
                    Some("xyz"),
                    "XYZ text format",
                    |source, mode, warnings| Ok(Box::new(XyzFormat::new(source, mode, warnings)?)),
                ),
                FormatSpec::new(
                    "POSCAR",
                    Some("poscar"),
                    "VASP POSCAR text format",
                    |source, mode, warnings| {
                        Ok(Box::new(PoscarFormat::new(source, mode, warnings)?))
                    },
                ),
                FormatSpec::new(
                    "DCD",
                    Some("dcd"),
                    "CHARMM/NAMD DCD binary format",
                    |source, mode, warnings| Ok(Box::new(DcdFormat::new(source, mode, warnings)?)),
                ),
            ],
        }
    }
}

impl FormatRegistry {
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    pub fn register(&mut self, spec: FormatSpec) {
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[FormatSpec] {
        &self.specs
    }

    /// Case-insensitive lookup by format name.
    pub fn by_name(&self, name: &str) -> MolResult<&FormatSpec> {
        self.specs
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MolError::Config(format!("can not find a format named '{name}'")))
    }

    /// Lookup from a path extension, after stripping compression suffixes.
    pub fn by_path(&self, path: &Path) -> MolResult<&FormatSpec> {
        let extension = file::format_extension(path).ok_or_else(|| {
            MolError::Config(format!(
                "file at '{}' does not have an extension, provide a format name",
                path.display()
            ))
        })?;
        self.specs
            .iter()
            .find(|spec| spec.extension == Some(extension.as_str()))
            .ok_or_else(|| {
                MolError::Config(format!(
                    "can not find a format associated with the '{extension}' extension"
                ))
            })
    }

    pub fn build(
        &self,
        spec: &FormatSpec,
        source: FileSource,
        mode: FileMode,
        warnings: Warnings,
    ) -> MolResult<Box<dyn Format>> {
        (spec.builder)(source, mode, warnings)
    }
}
