use crate::elements;
use crate::property::Properties;

/// A single atom: a name, an atomic type and optional physical data.
///
/// The type defaults to the name; the mass defaults to a periodic-table
/// lookup on the type when it was never set explicitly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Atom {
    name: String,
    atomic_type: String,
    mass: Option<f64>,
    charge: Option<f64>,
    pub properties: Properties,
}

impl Atom {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            atomic_type: name.clone(),
            name,
            mass: None,
            charge: None,
            properties: Properties::new(),
        }
    }

    pub fn with_type(name: impl Into<String>, atomic_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            atomic_type: atomic_type.into(),
            mass: None,
            charge: None,
            properties: Properties::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn atomic_type(&self) -> &str {
        &self.atomic_type
    }

    pub fn set_atomic_type(&mut self, atomic_type: impl Into<String>) {
        self.atomic_type = atomic_type.into();
    }

    /// Mass in daltons; explicit value first, then the periodic table, then 0.
    pub fn mass(&self) -> f64 {
        self.mass
            .or_else(|| elements::mass_for(&self.atomic_type))
            .unwrap_or(0.0)
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.mass = Some(mass);
    }

    /// Charge in units of the elementary charge, 0 when never set.
    pub fn charge(&self) -> f64 {
        self.charge.unwrap_or(0.0)
    }

    pub fn set_charge(&mut self, charge: f64) {
        self.charge = Some(charge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_defaults_to_name() {
        let atom = Atom::new("He");
        assert_eq!(atom.name(), "He");
        assert_eq!(atom.atomic_type(), "He");

        let atom = Atom::with_type("CA", "C");
        assert_eq!(atom.name(), "CA");
        assert_eq!(atom.atomic_type(), "C");
    }

    #[test]
    fn mass_fallback() {
        let mut atom = Atom::new("O");
        assert_eq!(atom.mass(), 15.999);
        atom.set_mass(16.5);
        assert_eq!(atom.mass(), 16.5);

        let unknown = Atom::new("DUM");
        assert_eq!(unknown.mass(), 0.0);
    }

    #[test]
    fn empty_names_are_allowed() {
        let atom = Atom::new("");
        assert_eq!(atom.name(), "");
        assert_eq!(atom.atomic_type(), "");
        assert_eq!(atom.mass(), 0.0);
    }
}
