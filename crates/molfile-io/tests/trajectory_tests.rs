use std::fs;

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use molfile_core::{Atom, Frame, UnitCell, Vector3D};
use molfile_io::Trajectory;

const HELIUM_XYZ: &str = "\
10
helium box
He 0.49 8.51 11.12
He 3.40 2.22 1.65
He 6.03 10.02 9.18
He 7.71 5.56 0.43
He 1.97 1.83 7.20
He 4.59 9.14 2.58
He 8.62 3.47 5.00
He 2.26 6.10 10.30
He 5.81 0.95 4.47
He 9.33 7.68 8.81
";

#[test]
fn helium_box_reads_back() {
    let mut trajectory = Trajectory::memory_reader(HELIUM_XYZ.as_bytes(), "XYZ").unwrap();
    let mut frame = Frame::new();
    trajectory.read(&mut frame).unwrap();

    assert_eq!(frame.size(), 10);
    assert_eq!(frame.positions()[0], Vector3D::new(0.49, 8.51, 11.12));
    assert!(frame
        .topology()
        .atoms()
        .iter()
        .all(|atom| atom.atomic_type() == "He"));
    assert!(frame.cell().is_infinite());
    assert_abs_diff_eq!(frame[0].mass(), 4.002602, epsilon = 1e-9);
}

fn write_frames(path: &std::path::Path, count: usize) {
    let mut trajectory = Trajectory::open(path, 'w').unwrap();
    for i in 0..count {
        let mut frame = Frame::new();
        for j in 0..3 {
            frame.add_atom(
                Atom::new("Ar"),
                Vector3D::new(i as f64, j as f64, i as f64 + j as f64),
            );
        }
        trajectory.write(&frame).unwrap();
    }
    trajectory.close().unwrap();
}

#[test]
fn random_access_agrees_with_sequential_reads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frames.xyz");
    write_frames(&path, 4);

    let mut sequential = Vec::new();
    let mut trajectory = Trajectory::open(&path, 'r').unwrap();
    let mut frame = Frame::new();
    let nsteps = trajectory.nsteps().unwrap();
    assert_eq!(nsteps, 4);
    for _ in 0..nsteps {
        trajectory.read(&mut frame).unwrap();
        sequential.push(frame.positions().to_vec());
    }

    let mut random = Trajectory::open(&path, 'r').unwrap();
    assert_eq!(random.nsteps().unwrap(), 4);
    for step in (0..4).rev() {
        random.read_step(step, &mut frame).unwrap();
        assert_eq!(frame.positions(), sequential[step].as_slice());
        assert_eq!(frame.step(), step as u64);
    }
}

#[test]
fn gzip_files_roundtrip_transparently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frames.xyz.gz");
    write_frames(&path, 2);

    // The file on disk is really gzip compressed.
    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[..2], &[0x1f, 0x8b]);

    let mut trajectory = Trajectory::open(&path, 'r').unwrap();
    assert_eq!(trajectory.nsteps().unwrap(), 2);
    let mut frame = Frame::new();
    trajectory.read_step(1, &mut frame).unwrap();
    assert_eq!(frame.size(), 3);
    assert_eq!(frame.positions()[0].x, 1.0);
}

#[test]
fn append_extends_an_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frames.xyz");
    write_frames(&path, 2);

    let mut trajectory = Trajectory::open(&path, 'a').unwrap();
    assert_eq!(trajectory.nsteps().unwrap(), 2);
    let mut frame = Frame::new();
    for j in 0..3 {
        frame.add_atom(Atom::new("Kr"), Vector3D::new(9.0, j as f64, 0.0));
    }
    trajectory.write(&frame).unwrap();
    assert_eq!(trajectory.nsteps().unwrap(), 3);
    trajectory.close().unwrap();

    let mut reader = Trajectory::open(&path, 'r').unwrap();
    assert_eq!(reader.nsteps().unwrap(), 3);
    let mut back = Frame::new();
    reader.read_step(2, &mut back).unwrap();
    assert_eq!(back[0].name(), "Kr");
    assert_eq!(back.positions()[0].x, 9.0);
}

#[test]
fn append_to_a_missing_file_starts_fresh() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("new.xyz");

    let mut trajectory = Trajectory::open(&path, 'a').unwrap();
    assert_eq!(trajectory.nsteps().unwrap(), 0);
    let mut frame = Frame::new();
    frame.add_atom(Atom::new("H"), Vector3D::default());
    trajectory.write(&frame).unwrap();
    trajectory.close().unwrap();

    let mut reader = Trajectory::open(&path, 'r').unwrap();
    assert_eq!(reader.nsteps().unwrap(), 1);
}

#[test]
fn dcd_files_roundtrip_with_random_access() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("frames.dcd");

    let mut writer = Trajectory::open(&path, 'w').unwrap();
    for i in 0..3 {
        let mut frame = Frame::new();
        frame.set_cell(UnitCell::orthorhombic(21.0, 22.0, 23.0).unwrap());
        for j in 0..4 {
            frame.add_atom(
                Atom::new("O"),
                Vector3D::new(i as f64 + 0.25, j as f64, -(i as f64)),
            );
        }
        writer.write(&frame).unwrap();
    }
    writer.close().unwrap();

    let mut reader = Trajectory::open(&path, 'r').unwrap();
    assert_eq!(reader.nsteps().unwrap(), 3);
    let mut frame = Frame::new();
    reader.read_step(2, &mut frame).unwrap();
    assert_eq!(frame.size(), 4);
    assert_abs_diff_eq!(frame.positions()[0].x, 2.25, epsilon = 1e-6);
    assert_abs_diff_eq!(frame.cell().b(), 22.0, epsilon = 1e-6);

    // DCD frames have no atom names.
    assert_eq!(frame[0].name(), "");
}

#[test]
fn dcd_trajectories_accept_topology_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("override.dcd");

    let mut writer = Trajectory::open(&path, 'w').unwrap();
    let mut frame = Frame::new();
    frame.add_atom(Atom::new("O"), Vector3D::new(0.0, 0.0, 0.0));
    frame.add_atom(Atom::new("H"), Vector3D::new(0.95, 0.0, 0.0));
    writer.write(&frame).unwrap();
    writer.close().unwrap();

    let mut reader = Trajectory::open(&path, 'r').unwrap();
    let mut topology = molfile_core::Topology::new();
    topology.add_atom(Atom::new("O"));
    topology.add_atom(Atom::new("H"));
    topology.add_bond(0, 1).unwrap();
    reader.set_topology(topology);

    let mut back = Frame::new();
    reader.read(&mut back).unwrap();
    assert_eq!(back[0].name(), "O");
    assert_eq!(back.topology().bonds().len(), 1);
}

#[test]
fn poscar_is_selected_by_name() {
    let poscar = "\
bulk Si
   5.43
 1.0 0.0 0.0
 0.0 1.0 0.0
 0.0 0.0 1.0
   Si
   2
Direct
 0.0 0.0 0.0
 0.25 0.25 0.25
";
    let mut trajectory = Trajectory::memory_reader(poscar.as_bytes(), "POSCAR").unwrap();
    assert_eq!(trajectory.nsteps().unwrap(), 1);
    let mut frame = Frame::new();
    trajectory.read_step(0, &mut frame).unwrap();
    assert_eq!(frame.size(), 2);
    assert_eq!(frame[0].atomic_type(), "Si");
    assert_abs_diff_eq!(frame.cell().a(), 5.43, epsilon = 1e-9);
    assert_abs_diff_eq!(frame.positions()[1].x, 5.43 * 0.25, epsilon = 1e-9);
}

#[test]
fn poscar_roundtrips_through_memory() {
    let mut frame = Frame::new();
    frame.set_cell(UnitCell::orthorhombic(4.0, 5.0, 6.0).unwrap());
    frame.add_atom(Atom::new("Ga"), Vector3D::new(0.0, 0.0, 0.0));
    frame.add_atom(Atom::new("As"), Vector3D::new(1.0, 1.25, 1.5));
    frame.add_atom(Atom::new("Ga"), Vector3D::new(2.0, 2.5, 3.0));

    let mut writer = Trajectory::memory_writer("POSCAR").unwrap();
    writer.write(&frame).unwrap();
    writer.close().unwrap();
    let buffer = writer.memory_buffer().unwrap();

    let mut reader = Trajectory::memory_reader(&buffer, "POSCAR").unwrap();
    let mut back = Frame::new();
    reader.read(&mut back).unwrap();

    // Atoms are regrouped by species on write: Ga, Ga, As.
    assert_eq!(back.size(), 3);
    assert_eq!(back[0].atomic_type(), "Ga");
    assert_eq!(back[1].atomic_type(), "Ga");
    assert_eq!(back[2].atomic_type(), "As");
    assert_abs_diff_eq!(back.positions()[1].x, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(back.positions()[2].y, 1.25, epsilon = 1e-9);
    assert_abs_diff_eq!(back.cell().volume(), 120.0, epsilon = 1e-6);
}

#[test]
fn extension_dispatch_failures_are_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "not a trajectory").unwrap();
    assert!(Trajectory::open(&path, 'r').is_err());
    assert!(Trajectory::open_with_format(&path, 'r', "XYZ").is_ok());
    assert!(Trajectory::open(&path, 'x').is_err());
}
