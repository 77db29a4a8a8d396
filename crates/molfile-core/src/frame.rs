use std::ops::{Index, IndexMut};

use crate::atom::Atom;
use crate::cell::UnitCell;
use crate::error::{MolError, MolResult};
use crate::property::Properties;
use crate::residue::Residue;
use crate::topology::{BondOrder, Topology};
use crate::types::Vector3D;

/// A snapshot of a molecular system: cell, topology, positions and optional
/// velocities, all kept the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    step: u64,
    cell: UnitCell,
    topology: Topology,
    positions: Vec<Vector3D>,
    velocities: Option<Vec<Vector3D>>,
    pub properties: Properties,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.topology.size()
    }

    pub fn is_empty(&self) -> bool {
        self.topology.is_empty()
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    pub fn cell(&self) -> &UnitCell {
        &self.cell
    }

    pub fn set_cell(&mut self, cell: UnitCell) {
        self.cell = cell;
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Replace the topology; the atom count must match the stored positions.
    pub fn set_topology(&mut self, topology: Topology) -> MolResult<()> {
        if topology.size() != self.positions.len() {
            return Err(MolError::Invalid(format!(
                "the topology contains {} atoms, but the frame contains {} atoms",
                topology.size(),
                self.positions.len()
            )));
        }
        self.topology = topology;
        Ok(())
    }

    pub fn positions(&self) -> &[Vector3D] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Vector3D] {
        &mut self.positions
    }

    pub fn velocities(&self) -> Option<&[Vector3D]> {
        self.velocities.as_deref()
    }

    pub fn velocities_mut(&mut self) -> Option<&mut [Vector3D]> {
        self.velocities.as_deref_mut()
    }

    pub fn has_velocities(&self) -> bool {
        self.velocities.is_some()
    }

    /// Enable velocity storage, zero-filled for existing atoms.
    pub fn add_velocities(&mut self) {
        if self.velocities.is_none() {
            self.velocities = Some(vec![Vector3D::default(); self.positions.len()]);
        }
    }

    pub fn add_atom(&mut self, atom: Atom, position: Vector3D) {
        self.topology.add_atom(atom);
        self.positions.push(position);
        if let Some(velocities) = &mut self.velocities {
            velocities.push(Vector3D::default());
        }
    }

    pub fn add_atom_with_velocity(&mut self, atom: Atom, position: Vector3D, velocity: Vector3D) {
        self.add_velocities();
        self.topology.add_atom(atom);
        self.positions.push(position);
        if let Some(velocities) = &mut self.velocities {
            velocities.push(velocity);
        }
    }

    /// Truncate or zero-extend atoms, positions and velocities together.
    pub fn resize(&mut self, size: usize) {
        self.topology.resize(size);
        self.positions.resize(size, Vector3D::default());
        if let Some(velocities) = &mut self.velocities {
            velocities.resize(size, Vector3D::default());
        }
    }

    pub fn remove_atom(&mut self, index: usize) -> MolResult<()> {
        self.topology.remove_atom(index)?;
        self.positions.remove(index);
        if let Some(velocities) = &mut self.velocities {
            velocities.remove(index);
        }
        Ok(())
    }

    pub fn add_bond(&mut self, i: usize, j: usize) -> MolResult<()> {
        self.topology.add_bond(i, j)
    }

    pub fn add_bond_with_order(&mut self, i: usize, j: usize, order: BondOrder) -> MolResult<()> {
        self.topology.add_bond_with_order(i, j, order)
    }

    pub fn remove_bond(&mut self, i: usize, j: usize) -> MolResult<()> {
        self.topology.remove_bond(i, j)
    }

    pub fn add_residue(&mut self, residue: Residue) -> MolResult<()> {
        self.topology.add_residue(residue)
    }
}

impl Index<usize> for Frame {
    type Output = Atom;

    fn index(&self, index: usize) -> &Atom {
        self.topology.atom(index)
    }
}

impl IndexMut<usize> for Frame {
    fn index_mut(&mut self, index: usize) -> &mut Atom {
        self.topology.atom_mut(index)
    }
}
