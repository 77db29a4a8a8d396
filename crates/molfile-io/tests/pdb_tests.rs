use approx::assert_abs_diff_eq;

use molfile_core::{Atom, Bond, BondOrder, Frame, Residue, Selection, UnitCell, Vector3D};
use molfile_io::Trajectory;

fn atom_line(
    record: &str,
    serial: &str,
    name: &str,
    resname: &str,
    chain: char,
    resid: &str,
    x: f64,
    y: f64,
    z: f64,
    element: &str,
) -> String {
    format!(
        "{record:<6}{serial:>5} {name:<4} {resname:<3} {chain}{resid:>4}    \
         {x:8.3}{y:8.3}{z:8.3}  1.00  0.00          {element:>2}\n"
    )
}

fn two_models() -> String {
    let mut pdb = String::new();
    pdb.push_str("MODEL        1\n");
    pdb.push_str("CRYST1   15.000   15.000   15.000  90.00  90.00  90.00 P 1           1\n");
    pdb.push_str(&atom_line("ATOM", "1", "N", "ALA", 'A', "1", 11.104, 6.134, -6.504, "N"));
    pdb.push_str(&atom_line("ATOM", "2", "CA", "ALA", 'A', "1", 11.639, 6.071, -5.147, "C"));
    pdb.push_str("ENDMDL\n");
    pdb.push_str("MODEL        2\n");
    pdb.push_str("CRYST1   15.000   15.000   15.000  90.00  90.00  90.00 P 1           1\n");
    pdb.push_str(&atom_line("ATOM", "1", "N", "ALA", 'A', "1", 12.104, 6.134, -6.504, "N"));
    pdb.push_str(&atom_line("ATOM", "2", "CA", "ALA", 'A', "1", 12.639, 6.071, -5.147, "C"));
    pdb.push_str("ENDMDL\n");
    pdb.push_str("END\n");
    pdb
}

#[test]
fn multi_model_files_are_multiple_steps() {
    let pdb = two_models();
    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    assert_eq!(trajectory.nsteps().unwrap(), 2);

    let mut first = Frame::new();
    trajectory.read(&mut first).unwrap();
    let mut second = Frame::new();
    trajectory.read(&mut second).unwrap();

    assert_eq!(first.size(), 2);
    assert_eq!(second.size(), 2);
    assert_ne!(first.positions()[0].x, second.positions()[0].x);
    assert_eq!(first[0].name(), "N");
    assert_eq!(first[1].atomic_type(), "C");
    assert_abs_diff_eq!(first.cell().a(), 15.0, epsilon = 1e-9);
    assert_eq!(first.topology().residues().len(), 1);
    assert_eq!(first.topology().residues()[0].id(), Some(1));
}

#[test]
fn hybrid36_serials_in_atom_and_conect() {
    let mut pdb = String::new();
    pdb.push_str(&atom_line("HETATM", "A0000", "C1", "LIG", 'A', "1", 0.0, 0.0, 0.0, "C"));
    pdb.push_str(&atom_line("HETATM", "A0001", "C2", "LIG", 'A', "1", 1.5, 0.0, 0.0, "C"));
    pdb.push_str("CONECTA0000A0001\n");
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();
    assert_eq!(frame.size(), 2);
    assert_eq!(
        frame.topology().bonds(),
        &[Bond::new(0, 1, BondOrder::Unknown)]
    );
}

#[test]
fn ter_records_shift_conect_serials() {
    let mut pdb = String::new();
    pdb.push_str(&atom_line("ATOM", "1", "N", "ALA", 'A', "1", 0.0, 0.0, 0.0, "N"));
    pdb.push_str(&atom_line("ATOM", "2", "CA", "ALA", 'A', "1", 1.0, 0.0, 0.0, "C"));
    pdb.push_str("TER       3      ALA A   1\n");
    pdb.push_str(&atom_line("HETATM", "4", "C1", "LIG", 'B', "2", 4.0, 0.0, 0.0, "C"));
    pdb.push_str(&atom_line("HETATM", "5", "C2", "LIG", 'B', "2", 5.0, 0.0, 0.0, "C"));
    pdb.push_str("CONECT    4    5\n");
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();
    assert_eq!(frame.size(), 4);
    // Serials 4 and 5 come after a TER which consumed serial 3, so they map
    // to atoms 2 and 3.
    assert!(frame
        .topology()
        .bonds()
        .contains(&Bond::new(2, 3, BondOrder::Unknown)));
}

#[test]
fn residue_properties_from_atom_records() {
    let mut pdb = String::new();
    pdb.push_str(&atom_line("ATOM", "1", "N", "ALA", 'A', "1", 0.0, 0.0, 0.0, "N"));
    pdb.push_str(&atom_line("HETATM", "2", "O", "HOH", 'B', "2", 5.0, 0.0, 0.0, "O"));
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();

    let topology = frame.topology();
    let ala = topology.residue_for_atom(0).unwrap();
    assert!(ala.properties.get("is_standard_pdb").unwrap().as_bool().unwrap());
    assert_eq!(
        ala.properties.get("chainid").unwrap().as_string().unwrap(),
        "A"
    );
    let water = topology.residue_for_atom(1).unwrap();
    assert!(!water.properties.get("is_standard_pdb").unwrap().as_bool().unwrap());
}

#[test]
fn helix_records_label_residues() {
    let mut pdb = String::new();
    pdb.push_str("HELIX    1  H1 ALA A    1  ALA A    2  1\n");
    pdb.push_str(&atom_line("ATOM", "1", "N", "ALA", 'A', "1", 0.0, 0.0, 0.0, "N"));
    pdb.push_str(&atom_line("ATOM", "2", "N", "ALA", 'A', "2", 3.0, 0.0, 0.0, "N"));
    pdb.push_str(&atom_line("ATOM", "3", "N", "ALA", 'A', "3", 6.0, 0.0, 0.0, "N"));
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();

    let topology = frame.topology();
    for atom in [0, 1] {
        let residue = topology.residue_for_atom(atom).unwrap();
        assert_eq!(
            residue
                .properties
                .get("secondary_structure")
                .unwrap()
                .as_string()
                .unwrap(),
            "alpha helix"
        );
    }
    let outside = topology.residue_for_atom(2).unwrap();
    assert!(outside.properties.get("secondary_structure").is_none());
}

fn dipeptide() -> String {
    let mut pdb = String::new();
    let ala = [
        ("N", "N", 0.0),
        ("CA", "C", 1.4),
        ("C", "C", 2.8),
        ("O", "O", 3.5),
        ("CB", "C", 1.5),
    ];
    let mut serial = 1;
    for (name, element, x) in ala {
        pdb.push_str(&atom_line(
            "ATOM",
            &serial.to_string(),
            name,
            "ALA",
            'A',
            "1",
            x,
            0.0,
            0.0,
            element,
        ));
        serial += 1;
    }
    let gly = [("N", "N", 4.2), ("CA", "C", 5.6), ("C", "C", 7.0), ("O", "O", 7.7)];
    for (name, element, x) in gly {
        pdb.push_str(&atom_line(
            "ATOM",
            &serial.to_string(),
            name,
            "GLY",
            'A',
            "2",
            x,
            1.0,
            0.0,
            element,
        ));
        serial += 1;
    }
    pdb.push_str("END\n");
    pdb
}

#[test]
fn standard_residues_are_bonded_from_tables() {
    let mut trajectory = Trajectory::memory_reader(dipeptide().as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();

    let expected = [
        (0, 1), // N-CA
        (1, 2), // CA-C
        (2, 3), // C-O
        (1, 4), // CA-CB
        (2, 5), // peptide C-N
        (5, 6),
        (6, 7),
        (7, 8),
    ];
    let bonds = frame.topology().bonds();
    assert_eq!(bonds.len(), expected.len());
    for (i, j) in expected {
        assert!(
            bonds.contains(&Bond::new(i, j, BondOrder::Unknown)),
            "missing bond {i}-{j}"
        );
    }
}

#[test]
fn selections_reconstruct_peptide_bonds() {
    let mut trajectory = Trajectory::memory_reader(dipeptide().as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();

    let selection =
        Selection::new("pairs: name(1) == C and name(2) == N and resid(2) == resid(1) + 1")
            .unwrap();
    let matches = selection.evaluate(&frame);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].as_slice(), &[2, 5]);
}

#[test]
fn ca_selection_on_a_protein_frame() {
    let mut pdb = String::new();
    for i in 0..40 {
        let name = if i == 4 || i == 19 || i == 33 { "CA" } else { "C" };
        pdb.push_str(&atom_line(
            "ATOM",
            &(i + 1).to_string(),
            name,
            "GLY",
            'A',
            &(i + 1).to_string(),
            i as f64,
            0.0,
            0.0,
            "C",
        ));
    }
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();

    let selection = Selection::new("name == CA").unwrap();
    assert_eq!(selection.list(&frame).unwrap(), vec![4, 19, 33]);
}

#[test]
fn writer_emits_fixed_columns() {
    let mut writer = Trajectory::memory_writer("PDB").unwrap();
    let mut frame = Frame::new();
    frame.add_atom(Atom::with_type("C1", "C"), Vector3D::new(1.0, 2.0, 3.0));
    writer.write(&frame).unwrap();
    let text = String::from_utf8(writer.memory_buffer().unwrap()).unwrap();
    writer.close().unwrap();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "MODEL    1");
    assert_eq!(
        lines[1],
        "CRYST1    0.000    0.000    0.000  90.00  90.00  90.00 P 1           1"
    );
    assert_eq!(
        lines[2],
        "HETATM    1 C1   XXX X   1       1.000   2.000   3.000  1.00  0.00           C"
    );
    assert_eq!(lines[3], "ENDMDL");
}

#[test]
fn writer_closes_with_end_record() {
    let mut writer = Trajectory::memory_writer("PDB").unwrap();
    let mut frame = Frame::new();
    frame.add_atom(Atom::new("C"), Vector3D::default());
    writer.write(&frame).unwrap();

    let before = String::from_utf8(writer.memory_buffer().unwrap()).unwrap();
    assert!(before.ends_with("ENDMDL\n"));

    writer.close().unwrap();
    let after = String::from_utf8(writer.memory_buffer().unwrap()).unwrap();
    assert!(after.ends_with("ENDMDL\nEND\n"));

    // Closing is idempotent, further writes are rejected.
    writer.close().unwrap();
    assert!(writer.write(&frame).is_err());
    let unchanged = String::from_utf8(writer.memory_buffer().unwrap()).unwrap();
    assert_eq!(unchanged, after);
}

#[test]
fn atom_conect_roundtrip() {
    let mut frame = Frame::new();
    frame.set_cell(UnitCell::orthorhombic(20.0, 20.0, 20.0).unwrap());
    frame.add_atom(Atom::with_type("C1", "C"), Vector3D::new(0.123, 4.567, -8.901));
    frame.add_atom(Atom::with_type("O1", "O"), Vector3D::new(1.35, 4.567, -8.901));
    frame.add_atom(Atom::with_type("N1", "N"), Vector3D::new(-0.75, 3.21, -8.0));
    let mut residue = Residue::with_id("LIG", 1);
    for i in 0..3 {
        residue.add_atom(i);
    }
    residue.properties.set("chainid", "A");
    frame.add_residue(residue).unwrap();
    frame.add_bond(0, 1).unwrap();
    frame.add_bond(0, 2).unwrap();

    let mut writer = Trajectory::memory_writer("PDB").unwrap();
    writer.write(&frame).unwrap();
    writer.close().unwrap();
    let buffer = writer.memory_buffer().unwrap();

    let mut reader = Trajectory::memory_reader(&buffer, "PDB").unwrap();
    let mut back = Frame::new();
    reader.read(&mut back).unwrap();

    assert_eq!(back.size(), frame.size());
    for i in 0..frame.size() {
        assert_eq!(back[i].name(), frame[i].name());
        assert_eq!(back[i].atomic_type(), frame[i].atomic_type());
        assert_abs_diff_eq!(
            back.positions()[i].x,
            frame.positions()[i].x,
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            back.positions()[i].y,
            frame.positions()[i].y,
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            back.positions()[i].z,
            frame.positions()[i].z,
            epsilon = 1e-3
        );
    }
    assert_abs_diff_eq!(back.cell().a(), 20.0, epsilon = 1e-3);
    assert_eq!(back.topology().bonds().len(), 2);
    assert!(back
        .topology()
        .bonds()
        .contains(&Bond::new(0, 1, BondOrder::Unknown)));
    assert!(back
        .topology()
        .bonds()
        .contains(&Bond::new(0, 2, BondOrder::Unknown)));
    assert_eq!(back.topology().residues()[0].name(), "LIG");
}

#[test]
fn unknown_records_are_skipped() {
    let mut pdb = String::new();
    pdb.push_str("REMARK this is ignored silently\n");
    pdb.push_str("WEIRD0 this one warns\n");
    pdb.push_str(&atom_line("ATOM", "1", "N", "ALA", 'A', "1", 0.0, 0.0, 0.0, "N"));
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();
    assert_eq!(frame.size(), 1);
}

#[test]
fn malformed_numeric_fields_are_fatal() {
    let mut line = atom_line("ATOM", "1", "N", "ALA", 'A', "1", 0.0, 0.0, 0.0, "N");
    line = line.replace("   0.000", "   x.000");
    let mut pdb = line;
    pdb.push_str("END\n");

    let mut trajectory = Trajectory::memory_reader(pdb.as_bytes(), "PDB").unwrap();
    let mut frame = Frame::new();
    assert!(trajectory.read(&mut frame).is_err());
}
