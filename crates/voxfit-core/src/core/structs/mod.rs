//! Discrete structure containers: ordered atom sets under evaluation.
//!
//! An [`AtomStructData`] is a value: search hypotheses derive new structs
//! (`with_atom`, `without_atom`, `with_coords`) instead of mutating accepted
//! ones. The metadata side table carries free-form provenance; the core itself
//! only mandates the [`INFO_LOSS`] and [`INFO_SOURCE`] keys.

use crate::core::typing::AtomTyper;
use nalgebra::Point3;
use std::collections::HashMap;

/// Metadata key holding the reconstruction loss of a scored struct.
pub const INFO_LOSS: &str = "loss";
/// Metadata key referencing the structure or grid this struct was fit from.
pub const INFO_SOURCE: &str = "source";

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetaValue::Float(v) => Some(*v),
            MetaValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Float(_) => None,
            MetaValue::Text(s) => Some(s),
        }
    }
}

/// An ordered collection of atoms: coordinates, full-width type vectors, and
/// per-atom radii derived from the typing scheme.
#[derive(Debug, Clone)]
pub struct AtomStructData {
    coords: Vec<Point3<f64>>,
    types: Vec<Vec<f64>>,
    radii: Vec<f64>,
    info: HashMap<String, MetaValue>,
}

impl AtomStructData {
    /// Builds a struct, deriving each atom's radius from its dominant element
    /// channel. Length and width mismatches, and type vectors without a
    /// positive element channel, are programming errors.
    pub fn new(coords: Vec<Point3<f64>>, types: Vec<Vec<f64>>, typer: &dyn AtomTyper) -> Self {
        assert_eq!(coords.len(), types.len(), "coords/types length mismatch");
        let radii = types
            .iter()
            .map(|t| {
                let elem = typer
                    .elem_of_type_vector(t)
                    .expect("type vector has no positive element channel");
                typer.elem_radius(elem)
            })
            .collect();
        Self {
            coords,
            types,
            radii,
            info: HashMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            coords: Vec::new(),
            types: Vec::new(),
            radii: Vec::new(),
            info: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coords(&self) -> &[Point3<f64>] {
        &self.coords
    }

    pub fn types(&self) -> &[Vec<f64>] {
        &self.types
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    /// A new struct with the same atoms at different coordinates.
    pub fn with_coords(&self, coords: Vec<Point3<f64>>) -> Self {
        assert_eq!(coords.len(), self.len(), "coordinate count changed");
        Self {
            coords,
            types: self.types.clone(),
            radii: self.radii.clone(),
            info: HashMap::new(),
        }
    }

    /// A new struct with one atom appended.
    pub fn with_atom(&self, coord: Point3<f64>, type_vec: Vec<f64>, typer: &dyn AtomTyper) -> Self {
        let elem = typer
            .elem_of_type_vector(&type_vec)
            .expect("type vector has no positive element channel");
        let mut next = Self {
            coords: self.coords.clone(),
            types: self.types.clone(),
            radii: self.radii.clone(),
            info: HashMap::new(),
        };
        next.coords.push(coord);
        next.types.push(type_vec);
        next.radii.push(typer.elem_radius(elem));
        next
    }

    /// A new struct with the atom at `idx` removed.
    pub fn without_atom(&self, idx: usize) -> Self {
        assert!(idx < self.len(), "atom index out of range");
        let keep = |i: &usize| *i != idx;
        Self {
            coords: (0..self.len()).filter(keep).map(|i| self.coords[i]).collect(),
            types: (0..self.len()).filter(keep).map(|i| self.types[i].clone()).collect(),
            radii: (0..self.len()).filter(keep).map(|i| self.radii[i]).collect(),
            info: HashMap::new(),
        }
    }

    pub fn set_info(&mut self, key: &str, value: MetaValue) {
        self.info.insert(key.to_string(), value);
    }

    pub fn info(&self, key: &str) -> Option<&MetaValue> {
        self.info.get(key)
    }

    /// The recorded reconstruction loss, if this struct has been scored.
    pub fn loss(&self) -> Option<f64> {
        self.info(INFO_LOSS).and_then(MetaValue::as_float)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::typing::ElementTyper;

    fn typer() -> ElementTyper {
        ElementTyper::from_symbols(&["C", "N", "O"]).unwrap()
    }

    fn carbon(typer: &ElementTyper) -> Vec<f64> {
        typer.type_vector(0)
    }

    #[test]
    fn new_derives_radii_from_dominant_element_channels() {
        let typer = typer();
        let s = AtomStructData::new(
            vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            vec![typer.type_vector(0), typer.type_vector(2)],
            &typer,
        );
        assert_eq!(s.len(), 2);
        assert_eq!(s.radii(), &[0.77, 0.73]);
    }

    #[test]
    #[should_panic(expected = "no positive element channel")]
    fn new_rejects_type_vectors_without_an_element() {
        let typer = typer();
        let _ = AtomStructData::new(vec![Point3::origin()], vec![vec![0.0, 0.0, 0.0]], &typer);
    }

    #[test]
    fn with_atom_appends_and_leaves_the_source_untouched() {
        let typer = typer();
        let base = AtomStructData::new(vec![Point3::origin()], vec![carbon(&typer)], &typer);
        let grown = base.with_atom(Point3::new(1.5, 0.0, 0.0), typer.type_vector(1), &typer);
        assert_eq!(base.len(), 1);
        assert_eq!(grown.len(), 2);
        assert_eq!(grown.radii()[1], 0.75);
    }

    #[test]
    fn without_atom_drops_exactly_the_indexed_atom() {
        let typer = typer();
        let s = AtomStructData::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
            ],
            vec![carbon(&typer), typer.type_vector(1), typer.type_vector(2)],
            &typer,
        );
        let pruned = s.without_atom(1);
        assert_eq!(pruned.len(), 2);
        assert_eq!(pruned.coords()[1], Point3::new(2.0, 0.0, 0.0));
        assert_eq!(pruned.radii(), &[0.77, 0.73]);
    }

    #[test]
    fn derived_structs_start_with_fresh_metadata() {
        let typer = typer();
        let mut s = AtomStructData::new(vec![Point3::origin()], vec![carbon(&typer)], &typer);
        s.set_info(INFO_LOSS, MetaValue::Float(1.25));
        s.set_info(INFO_SOURCE, MetaValue::Text("mol".into()));
        assert_eq!(s.loss(), Some(1.25));
        assert_eq!(s.info(INFO_SOURCE).unwrap().as_text(), Some("mol"));

        let derived = s.with_coords(vec![Point3::new(0.1, 0.0, 0.0)]);
        assert!(derived.loss().is_none());
        assert!(derived.info(INFO_SOURCE).is_none());
    }
}
