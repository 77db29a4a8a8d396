//! Connectivity tables for standard PDB residues. Bonds between two ATOM
//! records are not stored in CONECT, so they are rebuilt from these tables
//! after each model.

use std::collections::HashMap;

use once_cell::sync::Lazy;

type BondTable = Vec<(&'static str, &'static str)>;

const AMINO_BACKBONE: &[(&str, &str)] = &[
    ("N", "CA"),
    ("CA", "C"),
    ("C", "O"),
    ("C", "OXT"),
    ("N", "H"),
    ("CA", "HA"),
    ("OXT", "HXT"),
];

const NUCLEIC_BACKBONE: &[(&str, &str)] = &[
    ("P", "OP1"),
    ("P", "OP2"),
    ("P", "OP3"),
    ("P", "O5'"),
    ("O5'", "C5'"),
    ("C5'", "C4'"),
    ("C4'", "O4'"),
    ("C4'", "C3'"),
    ("C3'", "O3'"),
    ("C3'", "C2'"),
    ("C2'", "C1'"),
    ("C1'", "O4'"),
    ("O3'", "HO3'"),
];

const RIBOSE: &[(&str, &str)] = &[("C2'", "O2'"), ("O2'", "HO2'")];

const PURINE_LINK: &[(&str, &str)] = &[("C1'", "N9")];
const PYRIMIDINE_LINK: &[(&str, &str)] = &[("C1'", "N1")];

const ADENINE: &[(&str, &str)] = &[
    ("N9", "C8"),
    ("C8", "N7"),
    ("N7", "C5"),
    ("C5", "C6"),
    ("C6", "N6"),
    ("C6", "N1"),
    ("N1", "C2"),
    ("C2", "N3"),
    ("N3", "C4"),
    ("C4", "N9"),
    ("C4", "C5"),
];

const GUANINE: &[(&str, &str)] = &[
    ("N9", "C8"),
    ("C8", "N7"),
    ("N7", "C5"),
    ("C5", "C6"),
    ("C6", "O6"),
    ("C6", "N1"),
    ("N1", "C2"),
    ("C2", "N2"),
    ("C2", "N3"),
    ("N3", "C4"),
    ("C4", "N9"),
    ("C4", "C5"),
];

const CYTOSINE: &[(&str, &str)] = &[
    ("N1", "C2"),
    ("C2", "O2"),
    ("C2", "N3"),
    ("N3", "C4"),
    ("C4", "N4"),
    ("C4", "C5"),
    ("C5", "C6"),
    ("C6", "N1"),
];

const URACIL: &[(&str, &str)] = &[
    ("N1", "C2"),
    ("C2", "O2"),
    ("C2", "N3"),
    ("N3", "C4"),
    ("C4", "O4"),
    ("C4", "C5"),
    ("C5", "C6"),
    ("C6", "N1"),
];

fn amino(side_chain: &[(&'static str, &'static str)]) -> BondTable {
    AMINO_BACKBONE
        .iter()
        .chain(side_chain)
        .copied()
        .collect()
}

fn nucleotide(extra: &[&[(&'static str, &'static str)]]) -> BondTable {
    let mut table: BondTable = NUCLEIC_BACKBONE.to_vec();
    for block in extra {
        table.extend_from_slice(block);
    }
    table
}

static CONNECTIVITY: Lazy<HashMap<&'static str, BondTable>> = Lazy::new(|| {
    let mut map = HashMap::new();

    map.insert("ALA", amino(&[("CA", "CB")]));
    map.insert(
        "ARG",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD"),
            ("CD", "NE"),
            ("NE", "CZ"),
            ("CZ", "NH1"),
            ("CZ", "NH2"),
        ]),
    );
    map.insert(
        "ASN",
        amino(&[("CA", "CB"), ("CB", "CG"), ("CG", "OD1"), ("CG", "ND2")]),
    );
    map.insert(
        "ASP",
        amino(&[("CA", "CB"), ("CB", "CG"), ("CG", "OD1"), ("CG", "OD2")]),
    );
    map.insert("CYS", amino(&[("CA", "CB"), ("CB", "SG")]));
    map.insert(
        "GLN",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD"),
            ("CD", "OE1"),
            ("CD", "NE2"),
        ]),
    );
    map.insert(
        "GLU",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD"),
            ("CD", "OE1"),
            ("CD", "OE2"),
        ]),
    );
    map.insert("GLY", amino(&[]));
    map.insert(
        "HIS",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "ND1"),
            ("ND1", "CE1"),
            ("CE1", "NE2"),
            ("NE2", "CD2"),
            ("CD2", "CG"),
        ]),
    );
    map.insert(
        "ILE",
        amino(&[("CA", "CB"), ("CB", "CG1"), ("CB", "CG2"), ("CG1", "CD1")]),
    );
    map.insert(
        "LEU",
        amino(&[("CA", "CB"), ("CB", "CG"), ("CG", "CD1"), ("CG", "CD2")]),
    );
    map.insert(
        "LYS",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD"),
            ("CD", "CE"),
            ("CE", "NZ"),
        ]),
    );
    map.insert(
        "MET",
        amino(&[("CA", "CB"), ("CB", "CG"), ("CG", "SD"), ("SD", "CE")]),
    );
    map.insert(
        "PHE",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD1"),
            ("CD1", "CE1"),
            ("CE1", "CZ"),
            ("CZ", "CE2"),
            ("CE2", "CD2"),
            ("CD2", "CG"),
        ]),
    );
    map.insert(
        "PRO",
        amino(&[("CA", "CB"), ("CB", "CG"), ("CG", "CD"), ("CD", "N")]),
    );
    map.insert("SER", amino(&[("CA", "CB"), ("CB", "OG")]));
    map.insert("THR", amino(&[("CA", "CB"), ("CB", "OG1"), ("CB", "CG2")]));
    map.insert(
        "TRP",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD1"),
            ("CD1", "NE1"),
            ("NE1", "CE2"),
            ("CE2", "CD2"),
            ("CD2", "CG"),
            ("CE2", "CZ2"),
            ("CZ2", "CH2"),
            ("CH2", "CZ3"),
            ("CZ3", "CE3"),
            ("CE3", "CD2"),
        ]),
    );
    map.insert(
        "TYR",
        amino(&[
            ("CA", "CB"),
            ("CB", "CG"),
            ("CG", "CD1"),
            ("CD1", "CE1"),
            ("CE1", "CZ"),
            ("CZ", "CE2"),
            ("CE2", "CD2"),
            ("CD2", "CG"),
            ("CZ", "OH"),
        ]),
    );
    map.insert("VAL", amino(&[("CA", "CB"), ("CB", "CG1"), ("CB", "CG2")]));

    map.insert("A", nucleotide(&[RIBOSE, PURINE_LINK, ADENINE]));
    map.insert("G", nucleotide(&[RIBOSE, PURINE_LINK, GUANINE]));
    map.insert("C", nucleotide(&[RIBOSE, PYRIMIDINE_LINK, CYTOSINE]));
    map.insert("U", nucleotide(&[RIBOSE, PYRIMIDINE_LINK, URACIL]));
    map.insert("DA", nucleotide(&[PURINE_LINK, ADENINE]));
    map.insert("DG", nucleotide(&[PURINE_LINK, GUANINE]));
    map.insert("DC", nucleotide(&[PYRIMIDINE_LINK, CYTOSINE]));
    map.insert(
        "DT",
        nucleotide(&[PYRIMIDINE_LINK, URACIL, &[("C5", "C7")]]),
    );

    map.insert("HOH", vec![("O", "H1"), ("O", "H2")]);

    map
});

/// Bond table for a standard residue name, if there is one.
pub(crate) fn find(residue: &str) -> Option<&'static [(&'static str, &'static str)]> {
    CONNECTIVITY.get(residue).map(|table| table.as_slice())
}
