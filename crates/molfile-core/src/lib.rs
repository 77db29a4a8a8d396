#![forbid(unsafe_code)]

pub mod atom;
pub mod cell;
pub mod elements;
pub mod error;
pub mod frame;
pub mod property;
pub mod residue;
pub mod selection;
pub mod topology;
pub mod types;

pub use atom::Atom;
pub use cell::{CellShape, UnitCell};
pub use error::{MolError, MolResult};
pub use frame::Frame;
pub use property::{Properties, Property};
pub use residue::Residue;
pub use selection::{Match, Selection};
pub use topology::{Angle, Bond, BondOrder, Dihedral, Improper, Topology};
pub use types::{Matrix3D, Vector3D};
