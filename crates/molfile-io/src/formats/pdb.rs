//! PDB reader and writer. Fixed-column records, hybrid-36 serial numbers,
//! CONECT bonds reindexed through TER offsets, HELIX/SHEET/TURN secondary
//! structure and standard residue connectivity tables.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use molfile_core::{Atom, Frame, MolError, MolResult, Residue, UnitCell, Vector3D};

use crate::file::{FileMode, TextFile};
use crate::formats::pdb_connectivity;
use crate::hybrid36;
use crate::warnings::Warnings;
use crate::{FileSource, Format};

/// Key identifying a residue inside one model: chain, resid, insertion code.
type ResidueId = (char, i64, char);

pub struct PdbFormat {
    file: TextFile,
    warnings: Warnings,
    /// Residues of the model being read, flushed at TER and end of model.
    residues: BTreeMap<ResidueId, Residue>,
    /// First atom serial, then every TER serial; sorted, drives CONECT
    /// reindexing.
    atom_offsets: Vec<i64>,
    /// Start of a secondary structure sequence -> (end, label).
    secinfo: HashMap<ResidueId, (ResidueId, String)>,
    current_secinfo: Option<(ResidueId, String)>,
    models: u64,
    written: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Record {
    Header,
    Title,
    Cryst1,
    Atom,
    Hetatm,
    Conect,
    Model,
    Endmdl,
    Ter,
    End,
    Helix,
    Sheet,
    Turn,
    Ignored,
    Unknown,
}

fn substr(line: &str, start: usize, end: usize) -> &str {
    let end = end.min(line.len());
    if start >= end {
        return "";
    }
    line.get(start..end).unwrap_or("")
}

fn char_at(line: &str, index: usize) -> char {
    line.as_bytes().get(index).map(|&b| b as char).unwrap_or(' ')
}

fn parse_f64(field: &str) -> Result<f64, ()> {
    field.trim().parse::<f64>().map_err(|_| ())
}

fn record(line: &str) -> Record {
    let rec = substr(line, 0, 6);
    if rec == "ENDMDL" {
        Record::Endmdl
    } else if rec.starts_with("END") {
        // Handle missing whitespace in END records
        Record::End
    } else if rec == "CRYST1" {
        Record::Cryst1
    } else if rec == "ATOM  " {
        Record::Atom
    } else if rec == "HETATM" {
        Record::Hetatm
    } else if rec == "CONECT" {
        Record::Conect
    } else if rec.starts_with("MODEL") {
        Record::Model
    } else if rec.starts_with("TER") {
        Record::Ter
    } else if rec == "HELIX " {
        Record::Helix
    } else if rec == "SHEET " {
        Record::Sheet
    } else if rec == "TURN  " {
        Record::Turn
    } else if rec == "HEADER" {
        Record::Header
    } else if rec == "TITLE " {
        Record::Title
    } else if matches!(
        rec,
        "REMARK" | "MASTER" | "AUTHOR" | "CAVEAT" | "COMPND" | "EXPDTA" | "KEYWDS" | "OBSLTE"
            | "SOURCE" | "SPLIT " | "SPRSDE" | "JRNL  " | "SEQRES" | "HET   " | "REVDAT"
            | "SCALE1" | "SCALE2" | "SCALE3" | "ORIGX1" | "ORIGX2" | "ORIGX3" | "ANISOU"
            | "SITE  " | "FORMUL" | "DBREF " | "HETNAM" | "HETSYN" | "SSBOND" | "LINK  "
            | "SEQADV" | "MODRES" | "CISPEP"
    ) {
        Record::Ignored
    } else if line.trim().is_empty() {
        Record::Ignored
    } else {
        Record::Unknown
    }
}

impl PdbFormat {
    pub fn new(source: FileSource, mode: FileMode, warnings: Warnings) -> MolResult<Self> {
        Ok(Self {
            file: source.text(mode)?,
            warnings,
            residues: BTreeMap::new(),
            atom_offsets: Vec::new(),
            secinfo: HashMap::new(),
            current_secinfo: None,
            models: 0,
            written: false,
        })
    }

    fn read_cryst1(&mut self, frame: &mut Frame, line: &str) -> MolResult<()> {
        if line.len() < 54 {
            return Err(MolError::Format(format!(
                "CRYST1 record '{line}' is too small"
            )));
        }
        let cell = (|| {
            let a = parse_f64(substr(line, 6, 15))?;
            let b = parse_f64(substr(line, 15, 24))?;
            let c = parse_f64(substr(line, 24, 33))?;
            let alpha = parse_f64(substr(line, 33, 40))?;
            let beta = parse_f64(substr(line, 40, 47))?;
            let gamma = parse_f64(substr(line, 47, 54))?;
            if a == 0.0 && b == 0.0 && c == 0.0 {
                // The writer emits an all-zero CRYST1 for infinite cells.
                Ok(UnitCell::infinite())
            } else {
                UnitCell::triclinic(a, b, c, alpha, beta, gamma).map_err(|_| ())
            }
        })()
        .map_err(|()| MolError::Format(format!("could not read CRYST1 record '{line}'")))?;
        frame.set_cell(cell);

        if line.len() >= 55 {
            let space_group = substr(line, 55, 65).trim();
            if space_group != "P 1" && space_group != "P1" {
                self.warnings.warn(
                    "PDB reader",
                    format_args!("ignoring custom space group ({space_group}), using P1 instead"),
                );
            }
        }
        Ok(())
    }

    fn read_helix(&mut self, line: &str) {
        if line.len() < 38 {
            self.warnings
                .warn("PDB reader", format_args!("HELIX record too short: '{line}'"));
            return;
        }

        let chain1 = char_at(line, 19);
        let chain2 = char_at(line, 31);
        let inscode1 = char_at(line, 25);
        let inscode2 = char_at(line, 37);

        let (start, end) = match (
            hybrid36::decode(4, substr(line, 21, 25)),
            hybrid36::decode(4, substr(line, 33, 37)),
        ) {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                self.warnings.warn(
                    "PDB reader",
                    format_args!("HELIX record contains invalid numbers: '{line}'"),
                );
                return;
            }
        };

        if chain1 != chain2 {
            self.warnings.warn(
                "PDB reader",
                format_args!("HELIX chain {chain1} and {chain2} are not the same"),
            );
            return;
        }

        let helix_type = match substr(line, 38, 40).trim().parse::<usize>() {
            Ok(value) => value,
            Err(_) => {
                self.warnings
                    .warn("PDB reader", "could not parse helix type");
                return;
            }
        };

        // Right and left handed helices of the same kind get the same label;
        // unknown types are dropped.
        let label = match helix_type {
            1 | 6 => "alpha helix",
            2 | 7 => "omega helix",
            3 => "pi helix",
            4 | 8 => "gamma helix",
            5 => "3-10 helix",
            _ => return,
        };
        self.secinfo.insert(
            (chain1, start, inscode1),
            ((chain2, end, inscode2), label.to_string()),
        );
    }

    fn read_secondary(&mut self, line: &str, i1: usize, i2: usize, name: &str) {
        if line.len() < i2 + 6 {
            self.warnings.warn(
                "PDB reader",
                format_args!("secondary structure record too short: '{line}'"),
            );
            return;
        }

        let chain1 = char_at(line, i1);
        let chain2 = char_at(line, i2);
        if chain1 != chain2 {
            self.warnings.warn(
                "PDB reader",
                format_args!("{name} chain {chain1} and {chain2} are not the same"),
            );
            return;
        }

        let (resid1, resid2) = match (
            hybrid36::decode(4, substr(line, i1 + 1, i1 + 5)),
            hybrid36::decode(4, substr(line, i2 + 1, i2 + 5)),
        ) {
            (Ok(resid1), Ok(resid2)) => (resid1, resid2),
            _ => {
                self.warnings.warn(
                    "PDB reader",
                    format_args!(
                        "error parsing line: '{line}', check {} and {}",
                        substr(line, i1 + 1, i1 + 5),
                        substr(line, i2 + 1, i2 + 5)
                    ),
                );
                return;
            }
        };

        let inscode1 = char_at(line, i1 + 5);
        let inscode2 = char_at(line, i2 + 5);
        self.secinfo.insert(
            (chain1, resid1, inscode1),
            ((chain2, resid2, inscode2), "extended".to_string()),
        );
    }

    fn read_atom(&mut self, frame: &mut Frame, line: &str, is_hetatm: bool) -> MolResult<()> {
        if line.len() < 54 {
            return Err(MolError::Format(format!(
                "{} record is too small: '{line}'",
                substr(line, 0, 6)
            )));
        }

        if self.atom_offsets.is_empty() {
            match hybrid36::decode(5, substr(line, 6, 11)) {
                Ok(initial) if initial > 0 => self.atom_offsets.push(initial - 1),
                Ok(initial) => {
                    self.warnings.warn(
                        "PDB reader",
                        format_args!("{initial} is too small, assuming id is '1'"),
                    );
                    self.atom_offsets.push(0);
                }
                Err(_) => {
                    self.warnings.warn(
                        "PDB reader",
                        format_args!(
                            "{} is not a valid atom id, assuming '1'",
                            substr(line, 6, 11)
                        ),
                    );
                    self.atom_offsets.push(0);
                }
            }
        }

        let name = substr(line, 12, 16).trim();
        let mut atom = if line.len() >= 78 {
            Atom::with_type(name, substr(line, 76, 78).trim())
        } else {
            // No element column, hope the name is close enough.
            Atom::new(name)
        };

        let altloc = substr(line, 16, 17);
        if altloc != " " && !altloc.is_empty() {
            atom.properties.set("altloc", altloc);
        }

        let position = (|| {
            let x = parse_f64(substr(line, 30, 38))?;
            let y = parse_f64(substr(line, 38, 46))?;
            let z = parse_f64(substr(line, 46, 54))?;
            Ok(Vector3D::new(x, y, z))
        })()
        .map_err(|()| MolError::Format(format!("could not read positions in '{line}'")))?;
        frame.add_atom(atom, position);

        let atom_id = frame.size() - 1;
        let insertion_code = char_at(line, 26);
        let resid = match hybrid36::decode(4, substr(line, 22, 26)) {
            Ok(resid) => resid,
            // No residue information on this record.
            Err(_) => return Ok(()),
        };
        let chain = char_at(line, 21);
        let full_residue_id = (chain, resid, insertion_code);

        if let Some(residue) = self.residues.get_mut(&full_residue_id) {
            residue.add_atom(atom_id);
            return Ok(());
        }

        let resname = substr(line, 17, 20).trim();
        let mut residue = Residue::with_id(resname, resid);
        residue.add_atom(atom_id);
        if insertion_code != ' ' {
            residue.properties.set("insertion_code", substr(line, 26, 27));
        }
        residue.properties.set("is_standard_pdb", !is_hetatm);
        // Saved as strings on purpose; the PDB format makes no distinction
        // between chain ids and chain names.
        residue.properties.set("chainid", chain.to_string());
        residue.properties.set("chainname", chain.to_string());

        // Inside a secondary structure sequence?
        if let Some((end, label)) = &self.current_secinfo {
            residue.properties.set("secondary_structure", label.as_str());
            if *end == full_residue_id {
                self.current_secinfo = None;
            }
        }
        // Starting one?
        if let Some(info) = self.secinfo.get(&full_residue_id) {
            residue
                .properties
                .set("secondary_structure", info.1.as_str());
            self.current_secinfo = Some(info.clone());
        }

        self.residues.insert(full_residue_id, residue);
        Ok(())
    }

    fn read_conect(&mut self, frame: &mut Frame, line: &str) -> MolResult<()> {
        let line_length = line.trim_end().len();

        let read_index = |start: usize| -> MolResult<i64> {
            let serial = hybrid36::decode(5, substr(line, start, start + 5)).map_err(|_| {
                MolError::Format(format!("could not read atomic number in '{line}'"))
            })?;
            let preceding = self.atom_offsets.partition_point(|&offset| offset < serial);
            let head = self.atom_offsets.first().copied().unwrap_or(0);
            Ok(serial - preceding as i64 - head)
        };

        let add_bond = |frame: &mut Frame, i: i64, j: i64| {
            if i < 0 || j < 0 || i as usize >= frame.size() || j as usize >= frame.size() {
                self.warnings.warn(
                    "PDB reader",
                    format_args!(
                        "ignoring CONECT ('{}') with atomic indexes bigger than frame size ({})",
                        line.trim(),
                        frame.size()
                    ),
                );
                return;
            }
            let _ = frame.add_bond(i as usize, j as usize);
        };

        let i = read_index(6)?;
        for start in [11, 16, 21, 26] {
            if line_length <= start {
                return Ok(());
            }
            let j = read_index(start)?;
            add_bond(frame, i, j);
        }
        Ok(())
    }

    /// Move every pending residue into the frame. Also called on TER so
    /// that badly formatted files restarting residue ids mid-file keep
    /// their residues apart.
    fn chain_ended(&mut self, frame: &mut Frame) -> MolResult<()> {
        for (_, residue) in std::mem::take(&mut self.residues) {
            frame.add_residue(residue)?;
        }
        Ok(())
    }

    fn link_standard_residue_bonds(&mut self, frame: &mut Frame) -> MolResult<()> {
        let mut bonds = Vec::new();

        let mut link_previous_peptide = false;
        let mut link_previous_nucleic = false;
        let mut previous_residue_id = 0;
        let mut previous_link_id = 0;

        for residue in frame.topology().residues() {
            let residue_table = match pdb_connectivity::find(residue.name()) {
                Some(table) => table,
                None => continue,
            };

            let mut atom_name_to_index = HashMap::new();
            for &atom in residue.atoms() {
                atom_name_to_index.insert(frame[atom].name().to_string(), atom);
            }

            let resid = match residue.id() {
                Some(resid) => resid,
                None => {
                    self.warnings.warn(
                        "PDB reader",
                        "got a residue without id, this should not happen",
                    );
                    continue;
                }
            };

            let amide_nitrogen = atom_name_to_index.get("N");
            let amide_carbon = atom_name_to_index.get("C");
            if link_previous_peptide && resid == previous_residue_id + 1 {
                if let Some(&nitrogen) = amide_nitrogen {
                    link_previous_peptide = false;
                    bonds.push((previous_link_id, nitrogen));
                }
            }
            if let Some(&carbon) = amide_carbon {
                link_previous_peptide = true;
                previous_link_id = carbon;
                previous_residue_id = resid;
            }

            let three_prime_oxygen = atom_name_to_index.get("O3'");
            let five_prime_phosphorus = atom_name_to_index.get("P");
            if link_previous_nucleic && resid == previous_residue_id + 1 {
                if let Some(&phosphorus) = five_prime_phosphorus {
                    link_previous_nucleic = false;
                    bonds.push((previous_link_id, phosphorus));
                }
            }
            if let Some(&oxygen) = three_prime_oxygen {
                link_previous_nucleic = true;
                previous_link_id = oxygen;
                previous_residue_id = resid;
            }

            // A special case missed by the standards committee
            if let (Some(&ho5), Some(&o5)) = (
                atom_name_to_index.get("HO5'"),
                atom_name_to_index.get("O5'"),
            ) {
                bonds.push((ho5, o5));
            }

            for &(first, second) in residue_table {
                let mut missing = None;
                match (
                    atom_name_to_index.get(first),
                    atom_name_to_index.get(second),
                ) {
                    (Some(&i), Some(&j)) => bonds.push((i, j)),
                    (None, _) => missing = Some(first),
                    (_, None) => missing = Some(second),
                }
                if let Some(name) = missing {
                    if !name.starts_with('H')
                        && !name.starts_with('P')
                        && !name.starts_with("OP")
                        && name != "OXT"
                    {
                        self.warnings.warn(
                            "PDB reader",
                            format_args!(
                                "found unexpected, non-standard atom '{name}' in residue '{}' (resid {resid})",
                                residue.name()
                            ),
                        );
                    }
                }
            }
        }

        for (i, j) in bonds {
            frame.add_bond(i, j)?;
        }
        Ok(())
    }

    /// Encode a 0-based index for a PDB column, warning on overflow instead
    /// of failing the write.
    fn to_pdb_index(&self, value: i64, width: usize) -> String {
        let encoded = hybrid36::encode(width, value + 1);
        if encoded.starts_with('*') {
            let kind = if width == 5 { "atom" } else { "residue" };
            self.warnings.warn(
                "PDB writer",
                format_args!(
                    "the value for a {kind} serial/id is too large, using '{encoded}' instead"
                ),
            );
        }
        encoded
    }

    fn residue_information(
        &self,
        residue: Option<&Residue>,
        max_resid: &mut i64,
    ) -> ResidueInformation {
        let mut info = ResidueInformation::default();

        let residue = match residue {
            Some(residue) => residue,
            None => {
                let value = *max_resid;
                *max_resid += 1;
                info.resid = self.to_pdb_index(value, 4);
                return info;
            }
        };

        info.resname = residue.name().to_string();
        if residue
            .properties
            .get("is_standard_pdb")
            .and_then(|p| p.as_bool())
            .unwrap_or(false)
        {
            // Only use ATOM if the residue is standardized
            info.record = "ATOM  ";
        }
        if info.resname.len() > 3 {
            self.warnings.warn(
                "PDB writer",
                format_args!(
                    "residue '{}' name is too long, it will be truncated",
                    info.resname
                ),
            );
            info.resname.truncate(3);
        }
        if let Some(resid) = residue.id() {
            info.resid = self.to_pdb_index(resid - 1, 4);
        }
        if let Some(chainid) = residue.properties.get("chainid").and_then(|p| p.as_string()) {
            info.chainid = chainid.to_string();
            if info.chainid.len() > 1 {
                self.warnings.warn(
                    "PDB writer",
                    format_args!(
                        "residue '{}' chain id is too long, it will be truncated",
                        info.resname
                    ),
                );
                info.chainid.truncate(1);
            }
        }
        if let Some(inscode) = residue
            .properties
            .get("insertion_code")
            .and_then(|p| p.as_string())
        {
            info.inscode = inscode.to_string();
            if info.inscode.len() > 1 {
                self.warnings.warn(
                    "PDB writer",
                    format_args!(
                        "residue '{}' insertion code is too long, it will be truncated",
                        info.resname
                    ),
                );
                info.inscode.truncate(1);
            }
        }
        info.comp_type = residue
            .properties
            .get("composition_type")
            .and_then(|p| p.as_string())
            .unwrap_or("")
            .to_string();
        info.present = true;
        info
    }
}

#[derive(Clone, Debug)]
struct ResidueInformation {
    record: &'static str,
    resname: String,
    resid: String,
    chainid: String,
    inscode: String,
    comp_type: String,
    /// Whether this came from an actual residue.
    present: bool,
}

impl Default for ResidueInformation {
    fn default() -> Self {
        Self {
            record: "HETATM",
            resname: "XXX".to_string(),
            resid: "  -1".to_string(),
            chainid: "X".to_string(),
            inscode: " ".to_string(),
            comp_type: String::new(),
            present: false,
        }
    }
}

impl ResidueInformation {
    fn needs_ter_record(&self) -> bool {
        !matches!(
            self.comp_type.as_str(),
            "" | "other" | "OTHER" | "non-polymer" | "NON-POLYMER"
        )
    }
}

fn check_values_size(values: [f64; 3], width: u32, context: &str) -> MolResult<()> {
    let max_positive = 10_f64.powi(width as i32) - 1.0;
    let max_negative = -(10_f64.powi(width as i32 - 1)) + 1.0;
    if values
        .iter()
        .any(|&value| value > max_positive || value < max_negative)
    {
        return Err(MolError::Format(format!(
            "value in {context} is too big for representation in PDB format"
        )));
    }
    Ok(())
}

/// Shift a 0-based index upward past the TER records preceding it. `ters`
/// holds the serials already used by TER records, sorted.
fn adjust_for_ter_residues(value: usize, ters: &[usize]) -> i64 {
    let preceding = ters.partition_point(|&ter| ter < value + 1);
    value as i64 + preceding as i64
}

impl Format for PdbFormat {
    fn read_next(&mut self, frame: &mut Frame) -> MolResult<()> {
        if self.file.eof() {
            return Err(MolError::Format("end of file reached in PDB reader".into()));
        }
        self.residues.clear();
        self.atom_offsets.clear();
        *frame = Frame::new();

        let mut got_end = false;
        while !got_end && !self.file.eof() {
            let line = self.file.readline()?;
            match record(&line) {
                Record::Header => {
                    if line.len() >= 50 {
                        frame
                            .properties
                            .set("classification", substr(&line, 10, 50).trim());
                    }
                    if line.len() >= 59 {
                        frame
                            .properties
                            .set("deposition_date", substr(&line, 50, 59).trim());
                    }
                    if line.len() >= 66 {
                        frame
                            .properties
                            .set("pdb_idcode", substr(&line, 62, 66).trim());
                    }
                }
                Record::Title => {
                    if line.len() < 11 {
                        continue;
                    }
                    // Accumulate continuation TITLE records into one name.
                    let previous = frame
                        .properties
                        .get("name")
                        .and_then(|p| p.as_string())
                        .unwrap_or("")
                        .to_string();
                    let title = substr(&line, 10, 80).trim();
                    if previous.is_empty() {
                        frame.properties.set("name", title);
                    } else {
                        frame.properties.set("name", format!("{previous} {title}"));
                    }
                }
                Record::Cryst1 => self.read_cryst1(frame, &line)?,
                Record::Atom => self.read_atom(frame, &line, false)?,
                Record::Hetatm => self.read_atom(frame, &line, true)?,
                Record::Conect => self.read_conect(frame, &line)?,
                Record::Model => self.models += 1,
                Record::Endmdl => {
                    // An END record directly after ENDMDL belongs to the
                    // same frame: wait for it.
                    if !self.file.eof() {
                        let position = self.file.tellpos();
                        let next = self.file.readline()?;
                        self.file.seekpos(position)?;
                        if record(&next) == Record::End {
                            continue;
                        }
                    }
                    got_end = true;
                }
                Record::Helix => self.read_helix(&line),
                Record::Sheet => self.read_secondary(&line, 21, 32, "SHEET"),
                Record::Turn => self.read_secondary(&line, 19, 30, "TURN"),
                Record::Ter => {
                    if line.len() >= 12 {
                        match hybrid36::decode(5, substr(&line, 6, 11)) {
                            // A zero here means the TER serial was blank.
                            Ok(serial) if serial != 0 => self.atom_offsets.push(serial),
                            Ok(_) => {}
                            Err(_) => self.warnings.warn(
                                "PDB reader",
                                format_args!("TER record not numeric: {line}"),
                            ),
                        }
                    }
                    self.chain_ended(frame)?;
                }
                Record::End => got_end = true,
                Record::Ignored => {}
                Record::Unknown => {
                    if !self.file.eof() {
                        self.warnings
                            .warn("PDB reader", format_args!("ignoring unknown record: {line}"));
                    }
                }
            }
        }

        if !got_end {
            self.warnings.warn("PDB reader", "missing END record in file");
        }

        self.chain_ended(frame)?;
        self.link_standard_residue_bonds(frame)?;
        Ok(())
    }

    fn write_next(&mut self, frame: &Frame) -> MolResult<()> {
        self.written = true;
        writeln!(self.file, "MODEL {:>4}", self.models + 1)?;

        let cell = frame.cell();
        check_values_size([cell.a(), cell.b(), cell.c()], 9, "cell lengths")?;
        writeln!(
            self.file,
            "CRYST1{:9.3}{:9.3}{:9.3}{:7.2}{:7.2}{:7.2} P 1           1",
            cell.a(),
            cell.b(),
            cell.c(),
            cell.alpha(),
            cell.beta(),
            cell.gamma()
        )?;

        // Only numbers bigger than the biggest residue id are used as
        // resSeq for atoms without an associated residue.
        let mut max_resid = frame
            .topology()
            .residues()
            .iter()
            .filter_map(|residue| residue.id())
            .max()
            .unwrap_or(0);

        // CONECT records are only written for bonds involving HETATM rows.
        let mut is_atom_record = vec![false; frame.size()];

        let mut ter_count = 0usize;
        let mut ter_serial_numbers = Vec::new();
        let mut last_residue: Option<ResidueInformation> = None;

        let positions = frame.positions();
        for i in 0..frame.size() {
            let mut altloc = frame[i]
                .properties
                .get("altloc")
                .and_then(|p| p.as_string())
                .unwrap_or(" ")
                .to_string();
            if altloc.len() > 1 {
                self.warnings.warn(
                    "PDB writer",
                    format_args!("altloc '{altloc}' is too long, it will be truncated"),
                );
                altloc.truncate(1);
            }

            let residue = frame.topology().residue_for_atom(i);
            let info = self.residue_information(residue, &mut max_resid);
            if info.record == "ATOM  " {
                is_atom_record[i] = true;
            }

            if let Some(last) = &last_residue {
                if last.chainid != info.chainid && last.needs_ter_record() {
                    let ter_serial = self.to_pdb_index((i + ter_count) as i64, 5);
                    writeln!(
                        self.file,
                        "TER   {ter_serial:>5}      {:<3} {:1}{:>4}{:1}",
                        last.resname, last.chainid, last.resid, last.inscode
                    )?;
                    ter_serial_numbers.push(i + ter_count);
                    ter_count += 1;
                }
            }

            let position = positions[i];
            check_values_size([position.x, position.y, position.z], 8, "atomic position")?;
            let serial = self.to_pdb_index((i + ter_count) as i64, 5);
            writeln!(
                self.file,
                "{:<6}{serial:>5} {:<4}{:1}{:<3} {:1}{:>4}{:1}   {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}          {:>2}",
                info.record,
                frame[i].name(),
                altloc,
                info.resname,
                info.chainid,
                info.resid,
                info.inscode,
                position.x,
                position.y,
                position.z,
                1.0,
                0.0,
                frame[i].atomic_type()
            )?;

            last_residue = info.present.then_some(info);
        }

        let mut connect = vec![Vec::new(); frame.size()];
        for bond in frame.topology().bonds() {
            if is_atom_record[bond.i] && is_atom_record[bond.j] {
                // Both are standard residue atoms, the bond is implicit.
                continue;
            }
            if bond.i as i64 > hybrid36::max_encodable(5)
                || bond.j as i64 > hybrid36::max_encodable(5)
            {
                self.warnings.warn(
                    "PDB writer",
                    format_args!(
                        "atomic index is too big for CONECT, removing the bond between {} and {}",
                        bond.i, bond.j
                    ),
                );
                continue;
            }
            connect[bond.i].push(adjust_for_ter_residues(bond.j, &ter_serial_numbers));
            connect[bond.j].push(adjust_for_ter_residues(bond.i, &ter_serial_numbers));
        }

        for i in 0..frame.size() {
            let connections = connect[i].len();
            if connections == 0 {
                continue;
            }
            let correction = self.to_pdb_index(adjust_for_ter_residues(i, &ter_serial_numbers), 5);
            let lines = connections / 4 + 1;
            for conect_line in 0..lines {
                write!(self.file, "CONECT{correction:>5}")?;
                let last = connections.min(4 * (conect_line + 1));
                for &partner in &connect[i][4 * conect_line..last] {
                    let partner = self.to_pdb_index(partner, 5);
                    write!(self.file, "{partner:>5}")?;
                }
                writeln!(self.file)?;
            }
        }

        writeln!(self.file, "ENDMDL")?;
        self.models += 1;
        Ok(())
    }

    fn forward(&mut self) -> MolResult<Option<u64>> {
        if self.file.eof() {
            return Ok(None);
        }
        let position = self.file.tellpos();

        while !self.file.eof() {
            let line = self.file.readline()?;

            if line.starts_with("ENDMDL") {
                let save = self.file.tellpos();
                let next = self.file.readline()?;
                self.file.seekpos(save)?;
                if next.starts_with("END") {
                    // The END in the next line closes this frame, wait for it.
                    continue;
                }
            }

            if line.starts_with("END") {
                return Ok(Some(position));
            }
        }

        // Handle files without any END/ENDMDL record
        if position == 0 {
            Ok(Some(position))
        } else {
            Ok(None)
        }
    }

    fn seek(&mut self, position: u64) -> MolResult<()> {
        self.file.seekpos(position)
    }

    fn finalize(&mut self) -> MolResult<()> {
        if self.written {
            writeln!(self.file, "END")?;
            self.written = false;
        }
        self.file.finish()
    }
}
