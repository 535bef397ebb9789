//! Chemical typing schemes: the mapping between grid channels and atom types.
//!
//! The fitting engine treats the typing scheme as an opaque capability: it asks
//! for channel counts, per-channel radii, and property vectors, and never
//! inspects how those answers are produced. [`ElementTyper`] is the concrete
//! scheme shipped with the library; alternative schemes implement [`AtomTyper`].

use phf::{Map, phf_map};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Single-bond covalent radii, in the same length units as grid resolution.
static COVALENT_RADII: Map<&'static str, f64> = phf_map! {
    "H" => 0.37,
    "B" => 0.90,
    "C" => 0.77,
    "N" => 0.75,
    "O" => 0.73,
    "F" => 0.71,
    "P" => 1.06,
    "S" => 1.02,
    "Cl" => 0.99,
    "Br" => 1.14,
    "I" => 1.33,
};

#[derive(Debug, Error)]
pub enum TyperError {
    #[error("Unknown element symbol '{symbol}' (no built-in radius; provide one explicitly)")]
    UnknownElement { symbol: String },

    #[error("Typing scheme must define at least one element channel")]
    NoElements,

    #[error(
        "Element '{symbol}' has {found} property values but the scheme defines {expected} property channels"
    )]
    PropertyWidthMismatch {
        symbol: String,
        found: usize,
        expected: usize,
    },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

/// Capability interface the fitting core consumes.
///
/// Element channels come first in every grid and type vector, followed by
/// property channels. A type vector is the element one-hot concatenated with
/// that element's property values.
pub trait AtomTyper: Send + Sync + std::fmt::Debug {
    fn n_elem_types(&self) -> usize;

    fn n_prop_channels(&self) -> usize;

    fn elem_symbol(&self, elem_idx: usize) -> &str;

    /// Atomic radius backing both rendering and kernel construction.
    fn elem_radius(&self, elem_idx: usize) -> f64;

    /// Property-channel values for an element, length `n_prop_channels`.
    fn prop_values(&self, elem_idx: usize) -> &[f64];

    fn n_channels(&self) -> usize {
        self.n_elem_types() + self.n_prop_channels()
    }

    /// Full type vector for an element: one-hot over element channels plus
    /// the element's property values.
    fn type_vector(&self, elem_idx: usize) -> Vec<f64> {
        let mut vec = vec![0.0; self.n_channels()];
        vec[elem_idx] = 1.0;
        vec[self.n_elem_types()..].copy_from_slice(self.prop_values(elem_idx));
        vec
    }

    /// Dominant element channel of a type vector, if any is positive.
    fn elem_of_type_vector(&self, type_vec: &[f64]) -> Option<usize> {
        assert_eq!(
            type_vec.len(),
            self.n_channels(),
            "type vector width does not match channel count",
        );
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in type_vec[..self.n_elem_types()].iter().enumerate() {
            if v > 0.0 && best.map_or(true, |(_, bv)| v > bv) {
                best = Some((i, v));
            }
        }
        best.map(|(i, _)| i)
    }

    fn elem_index(&self, symbol: &str) -> Option<usize> {
        (0..self.n_elem_types()).find(|&i| self.elem_symbol(i) == symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ElementChannel {
    symbol: String,
    radius: f64,
    props: Vec<f64>,
}

/// Table-driven typing scheme: an ordered list of element channels with radii
/// from the built-in covalent table (or explicit overrides), plus optional
/// shared property channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTyper {
    elements: Vec<ElementChannel>,
    prop_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct TyperFile {
    #[serde(default)]
    prop_channels: Vec<String>,
    elements: Vec<ElementEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ElementEntry {
    symbol: String,
    radius: Option<f64>,
    #[serde(default)]
    props: Vec<f64>,
}

impl ElementTyper {
    /// Scheme over the given element symbols with built-in radii and no
    /// property channels.
    pub fn from_symbols<S: AsRef<str>>(symbols: &[S]) -> Result<Self, TyperError> {
        let entries = symbols
            .iter()
            .map(|s| ElementEntry {
                symbol: s.as_ref().to_string(),
                radius: None,
                props: Vec::new(),
            })
            .collect();
        Self::from_entries(Vec::new(), entries)
    }

    /// Scheme with explicit per-element radii; property channels empty.
    /// Radii are taken as given here and validated at kernel-build time.
    pub fn with_radii(elements: &[(&str, f64)]) -> Result<Self, TyperError> {
        let entries = elements
            .iter()
            .map(|(symbol, radius)| ElementEntry {
                symbol: symbol.to_string(),
                radius: Some(*radius),
                props: Vec::new(),
            })
            .collect();
        Self::from_entries(Vec::new(), entries)
    }

    /// Loads a scheme from a TOML table file.
    pub fn load(path: &Path) -> Result<Self, TyperError> {
        let content = std::fs::read_to_string(path).map_err(|e| TyperError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let file: TyperFile = toml::from_str(&content).map_err(|e| TyperError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_entries(file.prop_channels, file.elements)
    }

    fn from_entries(
        prop_names: Vec<String>,
        entries: Vec<ElementEntry>,
    ) -> Result<Self, TyperError> {
        if entries.is_empty() {
            return Err(TyperError::NoElements);
        }
        let n_props = prop_names.len();
        let mut elements = Vec::with_capacity(entries.len());
        for entry in entries {
            let radius = match entry.radius {
                Some(r) => r,
                None => *COVALENT_RADII.get(entry.symbol.as_str()).ok_or_else(|| {
                    TyperError::UnknownElement {
                        symbol: entry.symbol.clone(),
                    }
                })?,
            };
            let props = if entry.props.is_empty() && n_props > 0 {
                vec![0.0; n_props]
            } else if entry.props.len() != n_props {
                return Err(TyperError::PropertyWidthMismatch {
                    symbol: entry.symbol,
                    found: entry.props.len(),
                    expected: n_props,
                });
            } else {
                entry.props
            };
            elements.push(ElementChannel {
                symbol: entry.symbol,
                radius,
                props,
            });
        }
        Ok(Self {
            elements,
            prop_names,
        })
    }

    pub fn prop_name(&self, prop_idx: usize) -> &str {
        &self.prop_names[prop_idx]
    }
}

impl Default for ElementTyper {
    /// Heavy-atom organic scheme: C, N, O, F, P, S, Cl.
    fn default() -> Self {
        Self::from_symbols(&["C", "N", "O", "F", "P", "S", "Cl"])
            .expect("built-in element table covers the default scheme")
    }
}

impl AtomTyper for ElementTyper {
    fn n_elem_types(&self) -> usize {
        self.elements.len()
    }

    fn n_prop_channels(&self) -> usize {
        self.prop_names.len()
    }

    fn elem_symbol(&self, elem_idx: usize) -> &str {
        &self.elements[elem_idx].symbol
    }

    fn elem_radius(&self, elem_idx: usize) -> f64 {
        self.elements[elem_idx].radius
    }

    fn prop_values(&self, elem_idx: usize) -> &[f64] {
        &self.elements[elem_idx].props
    }
}
