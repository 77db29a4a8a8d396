use std::cell::OnceCell;
use std::collections::HashMap;

use crate::atom::Atom;
use crate::error::{MolError, MolResult};
use crate::residue::Residue;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BondOrder {
    #[default]
    Unknown,
    Single,
    Double,
    Triple,
    Quadruple,
    Quintuple,
    Amide,
    Aromatic,
}

/// A bond between two atoms, stored with the smaller index first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bond {
    pub i: usize,
    pub j: usize,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(i: usize, j: usize, order: BondOrder) -> Self {
        if i <= j {
            Self { i, j, order }
        } else {
            Self { i: j, j: i, order }
        }
    }
}

/// An i-j-k angle, canonicalised so the outer indices are sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Angle(pub [usize; 3]);

impl Angle {
    pub fn new(i: usize, j: usize, k: usize) -> Self {
        Self([i.min(k), j, i.max(k)])
    }
}

/// An i-j-k-l dihedral, canonicalised so the central pair is ascending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dihedral(pub [usize; 4]);

impl Dihedral {
    pub fn new(i: usize, j: usize, k: usize, l: usize) -> Self {
        if j <= k {
            Self([i, j, k, l])
        } else {
            Self([l, k, j, i])
        }
    }
}

/// An improper dihedral: the central atom first, its neighbours sorted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Improper(pub [usize; 4]);

impl Improper {
    pub fn new(center: usize, i: usize, j: usize, k: usize) -> Self {
        let mut outer = [i, j, k];
        outer.sort_unstable();
        Self([center, outer[0], outer[1], outer[2]])
    }
}

#[derive(Clone, Debug, Default)]
struct Connectivity {
    angles: Vec<Angle>,
    dihedrals: Vec<Dihedral>,
    impropers: Vec<Improper>,
}

/// Atoms, bonds and residues; angles, dihedrals and impropers are a pure
/// function of the bond graph, computed lazily and dropped on any bond
/// mutation.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    residues: Vec<Residue>,
    residue_for_atom: HashMap<usize, usize>,
    cache: OnceCell<Connectivity>,
}

impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        self.atoms == other.atoms && self.bonds == other.bonds && self.residues == other.residues
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }

    pub fn atom_mut(&mut self, index: usize) -> &mut Atom {
        &mut self.atoms[index]
    }

    pub fn add_atom(&mut self, atom: Atom) {
        self.atoms.push(atom);
    }

    /// Truncate or extend with default atoms. Truncation drops bonds and
    /// residue entries referencing removed atoms.
    pub fn resize(&mut self, size: usize) {
        if size < self.atoms.len() {
            self.bonds.retain(|bond| bond.i < size && bond.j < size);
            for residue in &mut self.residues {
                while let Some(&last) = residue.atoms().last() {
                    if last < size {
                        break;
                    }
                    residue.remove_atom(last);
                }
            }
            self.rebuild_residue_mapping();
            self.invalidate();
        }
        self.atoms.resize_with(size, Atom::default);
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn add_bond(&mut self, i: usize, j: usize) -> MolResult<()> {
        self.add_bond_with_order(i, j, BondOrder::Unknown)
    }

    pub fn add_bond_with_order(&mut self, i: usize, j: usize, order: BondOrder) -> MolResult<()> {
        self.check_bond_indexes(i, j)?;
        let bond = Bond::new(i, j, order);
        match self.bond_position(bond.i, bond.j) {
            Ok(position) => {
                // Re-adding an existing bond only upgrades an unknown order.
                if order != BondOrder::Unknown {
                    self.bonds[position].order = order;
                }
            }
            Err(position) => {
                self.bonds.insert(position, bond);
                self.invalidate();
            }
        }
        Ok(())
    }

    pub fn remove_bond(&mut self, i: usize, j: usize) -> MolResult<()> {
        self.check_bond_indexes(i, j)?;
        let bond = Bond::new(i, j, BondOrder::Unknown);
        if let Ok(position) = self.bond_position(bond.i, bond.j) {
            self.bonds.remove(position);
            self.invalidate();
        }
        Ok(())
    }

    pub fn bond_order(&self, i: usize, j: usize) -> MolResult<BondOrder> {
        self.check_bond_indexes(i, j)?;
        let bond = Bond::new(i, j, BondOrder::Unknown);
        match self.bond_position(bond.i, bond.j) {
            Ok(position) => Ok(self.bonds[position].order),
            Err(_) => Err(MolError::Invalid(format!(
                "there is no bond between atoms {i} and {j}"
            ))),
        }
    }

    pub fn angles(&self) -> &[Angle] {
        &self.connectivity().angles
    }

    pub fn dihedrals(&self) -> &[Dihedral] {
        &self.connectivity().dihedrals
    }

    pub fn impropers(&self) -> &[Improper] {
        &self.connectivity().impropers
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub fn add_residue(&mut self, residue: Residue) -> MolResult<()> {
        for &atom in residue.atoms() {
            if atom >= self.atoms.len() {
                return Err(MolError::Invalid(format!(
                    "out of bounds atomic index {atom} in residue '{}': the topology has {} atoms",
                    residue.name(),
                    self.atoms.len()
                )));
            }
            if self.residue_for_atom.contains_key(&atom) {
                return Err(MolError::Invalid(format!(
                    "atom {atom} is already in a residue, it can not be added to '{}'",
                    residue.name()
                )));
            }
        }
        let position = self.residues.len();
        for &atom in residue.atoms() {
            self.residue_for_atom.insert(atom, position);
        }
        self.residues.push(residue);
        Ok(())
    }

    pub fn residue_for_atom(&self, index: usize) -> Option<&Residue> {
        self.residue_for_atom
            .get(&index)
            .map(|&position| &self.residues[position])
    }

    /// Remove atom `index`, shifting every later index through the bond set
    /// and the residue table.
    pub fn remove_atom(&mut self, index: usize) -> MolResult<()> {
        if index >= self.atoms.len() {
            return Err(MolError::Invalid(format!(
                "out of bounds atomic index {index}: the topology has {} atoms",
                self.atoms.len()
            )));
        }
        self.atoms.remove(index);
        self.bonds.retain(|bond| bond.i != index && bond.j != index);
        for bond in &mut self.bonds {
            if bond.i > index {
                bond.i -= 1;
            }
            if bond.j > index {
                bond.j -= 1;
            }
        }
        for residue in &mut self.residues {
            residue.remove_atom(index);
        }
        self.rebuild_residue_mapping();
        self.invalidate();
        Ok(())
    }

    fn check_bond_indexes(&self, i: usize, j: usize) -> MolResult<()> {
        if i == j {
            return Err(MolError::Invalid(format!(
                "can not have a bond from atom {i} to itself"
            )));
        }
        let size = self.atoms.len();
        if i >= size || j >= size {
            return Err(MolError::Invalid(format!(
                "out of bounds atomic index in bond {i}-{j}: the topology has {size} atoms"
            )));
        }
        Ok(())
    }

    fn bond_position(&self, i: usize, j: usize) -> Result<usize, usize> {
        self.bonds.binary_search_by_key(&(i, j), |bond| (bond.i, bond.j))
    }

    fn invalidate(&mut self) {
        self.cache.take();
    }

    fn rebuild_residue_mapping(&mut self) {
        self.residue_for_atom.clear();
        for (position, residue) in self.residues.iter().enumerate() {
            for &atom in residue.atoms() {
                self.residue_for_atom.insert(atom, position);
            }
        }
    }

    fn connectivity(&self) -> &Connectivity {
        self.cache.get_or_init(|| self.derive_connectivity())
    }

    fn derive_connectivity(&self) -> Connectivity {
        let mut neighbors = vec![Vec::new(); self.atoms.len()];
        for bond in &self.bonds {
            neighbors[bond.i].push(bond.j);
            neighbors[bond.j].push(bond.i);
        }
        for list in &mut neighbors {
            list.sort_unstable();
        }

        let mut angles = Vec::new();
        for (j, list) in neighbors.iter().enumerate() {
            for (position, &i) in list.iter().enumerate() {
                for &k in &list[position + 1..] {
                    angles.push(Angle::new(i, j, k));
                }
            }
        }
        angles.sort_unstable();
        angles.dedup();

        let mut dihedrals = Vec::new();
        for bond in &self.bonds {
            let (j, k) = (bond.i, bond.j);
            for &i in &neighbors[j] {
                if i == k {
                    continue;
                }
                for &l in &neighbors[k] {
                    if l == j || l == i {
                        continue;
                    }
                    dihedrals.push(Dihedral::new(i, j, k, l));
                }
            }
        }
        dihedrals.sort_unstable();
        dihedrals.dedup();

        let mut impropers = Vec::new();
        for (center, list) in neighbors.iter().enumerate() {
            if list.len() < 3 {
                continue;
            }
            for a in 0..list.len() {
                for b in a + 1..list.len() {
                    for c in b + 1..list.len() {
                        impropers.push(Improper::new(center, list[a], list[b], list[c]));
                    }
                }
            }
        }
        impropers.sort_unstable();
        impropers.dedup();

        Connectivity {
            angles,
            dihedrals,
            impropers,
        }
    }
}
