//! Molecular geometry: atomic symbols, Cartesian coordinates and optional cell.
//!
//! [`Geometry`] is the raw coordinate record that every EQ, TS and PT entity
//! carries. Coordinates are stored flat, `[x1, y1, z1, x2, y2, z2, ...]`, in
//! Angstrom, exactly as they appear in GRRM list logs.
//!
//! A geometry with zero atoms is a valid value ("empty structure") and is
//! distinct from an absent structure, which collections model as `None`.

use crate::error::{Error, Result};
use nalgebra::{DVector, Matrix3, Vector3};
use std::collections::BTreeMap;

/// Represents a molecular geometry with atomic elements and Cartesian coordinates.
///
/// # Storage Format
///
/// Coordinates live in a `DVector<f64>` of length `3 × num_atoms`. The
/// optional `cell` holds the lattice vectors as rows; `pbc` flags which of
/// them are periodic.
///
/// # Examples
///
/// ```
/// use grrmkit::geometry::Geometry;
///
/// let geometry = Geometry::new(
///     vec!["O".to_string(), "H".to_string(), "H".to_string()],
///     vec![0.0, 0.0, 0.0, 0.757, 0.586, 0.0, -0.757, 0.586, 0.0],
/// );
/// assert_eq!(geometry.num_atoms, 3);
/// assert_eq!(geometry.get_atom_coords(1), [0.757, 0.586, 0.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Chemical element symbols for each atom in order
    pub elements: Vec<String>,
    /// Flattened Cartesian coordinates in Angstrom
    pub coords: DVector<f64>,
    /// Number of atoms
    pub num_atoms: usize,
    /// Lattice vectors as matrix rows, when the structure is periodic
    pub cell: Option<Matrix3<f64>>,
    /// Periodicity along each lattice vector
    pub pbc: [bool; 3],
}

impl Geometry {
    /// Creates a new `Geometry` from element list and flat coordinate vector.
    ///
    /// # Panics
    ///
    /// Panics if `coords.len() != elements.len() * 3`. Use [`Geometry::try_new`]
    /// for input that has not been validated yet.
    pub fn new(elements: Vec<String>, coords: Vec<f64>) -> Self {
        let num_atoms = elements.len();
        assert_eq!(coords.len(), num_atoms * 3);
        Self {
            elements,
            coords: DVector::from_vec(coords),
            num_atoms,
            cell: None,
            pbc: [false; 3],
        }
    }

    /// Fallible variant of [`Geometry::new`].
    pub fn try_new(elements: Vec<String>, coords: Vec<f64>) -> Result<Self> {
        if coords.len() != elements.len() * 3 {
            return Err(Error::LengthMismatch {
                expected: elements.len() * 3,
                found: coords.len(),
            });
        }
        Ok(Self::new(elements, coords))
    }

    /// Builds a geometry from symbols and per-atom positions.
    pub fn from_positions(elements: Vec<String>, positions: &[[f64; 3]]) -> Result<Self> {
        let coords = positions.iter().flat_map(|p| p.iter().copied()).collect();
        Self::try_new(elements, coords)
    }

    /// The zero-atom geometry.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Returns `true` when the geometry holds no atoms.
    pub fn is_empty(&self) -> bool {
        self.num_atoms == 0
    }

    /// Get the Cartesian coordinates of a specific atom.
    pub fn get_atom_coords(&self, atom_idx: usize) -> [f64; 3] {
        let i = atom_idx * 3;
        [self.coords[i], self.coords[i + 1], self.coords[i + 2]]
    }

    /// Per-atom positions.
    pub fn positions(&self) -> Vec<[f64; 3]> {
        (0..self.num_atoms).map(|i| self.get_atom_coords(i)).collect()
    }

    /// Replaces all coordinates, keeping symbols, cell and pbc.
    pub fn set_coords(&mut self, coords: Vec<f64>) -> Result<()> {
        if coords.len() != self.num_atoms * 3 {
            return Err(Error::LengthMismatch {
                expected: self.num_atoms * 3,
                found: coords.len(),
            });
        }
        self.coords = DVector::from_vec(coords);
        Ok(())
    }

    /// Returns this geometry followed by `other`.
    ///
    /// Atom order is fixed: every atom of `self`, then every atom of `other`.
    /// Cell and pbc are taken from `self`.
    pub fn concat(&self, other: &Geometry) -> Geometry {
        let mut elements = self.elements.clone();
        elements.extend(other.elements.iter().cloned());
        let mut coords: Vec<f64> = self.coords.iter().copied().collect();
        coords.extend(other.coords.iter().copied());
        let mut joined = Geometry::new(elements, coords);
        joined.cell = self.cell;
        joined.pbc = self.pbc;
        joined
    }

    /// Distance between two atoms, using the minimum image along periodic axes.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        let a = Vector3::from(self.get_atom_coords(i));
        let b = Vector3::from(self.get_atom_coords(j));
        let mut d = b - a;
        if let Some(cell) = self.cell {
            if self.pbc.iter().any(|&p| p) {
                if let Some(inv) = cell.try_inverse() {
                    // fractional row vector: f = d^T * cell^-1
                    let mut frac = (d.transpose() * inv).transpose();
                    for axis in 0..3 {
                        if self.pbc[axis] {
                            frac[axis] -= frac[axis].round();
                        }
                    }
                    d = (frac.transpose() * cell).transpose();
                }
            }
        }
        d.norm()
    }

    /// Chemical formula in Hill order (C, H, then alphabetical).
    pub fn chemical_formula(&self) -> String {
        formula_of(self.elements.iter().map(|s| s.as_str()))
    }
}

/// Hill formula of an arbitrary sequence of symbols.
pub(crate) fn formula_of<'a>(symbols: impl Iterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for s in symbols {
        *counts.entry(s).or_insert(0) += 1;
    }
    let mut formula = String::new();
    let mut push = |sym: &str, n: usize| {
        formula.push_str(sym);
        if n > 1 {
            formula.push_str(&n.to_string());
        }
    };
    let has_carbon = counts.contains_key("C");
    if has_carbon {
        for sym in ["C", "H"] {
            if let Some(n) = counts.remove(sym) {
                push(sym, n);
            }
        }
    }
    for (sym, n) in counts {
        push(sym, n);
    }
    formula
}

impl Default for Geometry {
    fn default() -> Self {
        Self::empty()
    }
}
