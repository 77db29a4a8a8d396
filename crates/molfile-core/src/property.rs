use std::collections::BTreeMap;

use crate::error::{MolError, MolResult};
use crate::types::Vector3D;

/// A typed, named value attachable to atoms, residues and frames.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Bool(bool),
    Double(f64),
    String(String),
    Vector3D(Vector3D),
}

impl Property {
    pub fn kind(&self) -> &'static str {
        match self {
            Property::Bool(_) => "bool",
            Property::Double(_) => "double",
            Property::String(_) => "string",
            Property::Vector3D(_) => "vector3d",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Property::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Property::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Property::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_vector3d(&self) -> Option<Vector3D> {
        match self {
            Property::Vector3D(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Property::Bool(value)
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Property::Double(value)
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Property::String(value.to_string())
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        Property::String(value)
    }
}

impl From<Vector3D> for Property {
    fn from(value: Vector3D) -> Self {
        Property::Vector3D(value)
    }
}

/// Name to property mapping with deterministic iteration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    map: BTreeMap<String, Property>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.map.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        self.map.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.map.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn get_bool(&self, name: &str) -> MolResult<bool> {
        self.expect(name, "bool", Property::as_bool)
    }

    pub fn get_double(&self, name: &str) -> MolResult<f64> {
        self.expect(name, "double", Property::as_double)
    }

    pub fn get_string(&self, name: &str) -> MolResult<&str> {
        match self.map.get(name) {
            Some(Property::String(value)) => Ok(value),
            Some(other) => Err(MolError::Property(format!(
                "property '{name}' is a {}, expected a string",
                other.kind()
            ))),
            None => Err(MolError::Property(format!("no property named '{name}'"))),
        }
    }

    pub fn get_vector3d(&self, name: &str) -> MolResult<Vector3D> {
        self.expect(name, "vector3d", Property::as_vector3d)
    }

    fn expect<T>(
        &self,
        name: &str,
        kind: &str,
        convert: impl Fn(&Property) -> Option<T>,
    ) -> MolResult<T> {
        match self.map.get(name) {
            Some(value) => convert(value).ok_or_else(|| {
                MolError::Property(format!(
                    "property '{name}' is a {}, expected a {kind}",
                    value.kind()
                ))
            }),
            None => Err(MolError::Property(format!("no property named '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        assert_eq!(Property::from(1.5), Property::Double(1.5));
        assert_eq!(Property::from("He"), Property::String("He".into()));
        assert_ne!(Property::from(true), Property::Bool(false));
        assert_ne!(Property::from(1.0), Property::Bool(true));
    }

    #[test]
    fn typed_getters() {
        let mut properties = Properties::new();
        properties.set("name", "water");
        properties.set("mass", 18.015);
        properties.set("polar", true);
        properties.set("dipole", Vector3D::new(0.0, 0.0, 1.85));

        assert_eq!(properties.get_string("name").unwrap(), "water");
        assert_eq!(properties.get_double("mass").unwrap(), 18.015);
        assert!(properties.get_bool("polar").unwrap());
        assert_eq!(properties.get_vector3d("dipole").unwrap().z, 1.85);

        assert!(properties.get_double("name").is_err());
        assert!(properties.get_string("missing").is_err());
    }

    #[test]
    fn set_replaces() {
        let mut properties = Properties::new();
        properties.set("kind", "first");
        properties.set("kind", "second");
        assert_eq!(properties.len(), 1);
        assert_eq!(properties.get_string("kind").unwrap(), "second");
    }
}
