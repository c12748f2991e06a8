//! Derived-geometry analysis: bonds, molecules and structural equivalence.
//!
//! The reaction-network core only needs three things from a geometry
//! analysis: the bond graph, its decomposition into molecules, and a way to
//! decide whether two structures share the same connectivity. The
//! [`GeometryAnalyzer`] trait is the seam for that collaborator;
//! [`CovalentAnalyzer`] is the built-in implementation based on covalent radii.
//!
//! # Bond criterion
//!
//! Atoms `i` and `j` are bonded when
//!
//! ```text
//! d(i, j) < mult * (r_i + r_j) + skin
//! ```
//!
//! where `r` are covalent radii (Cordero et al. 2008) unless overridden per
//! element and `skin` defaults to 0.3 Angstrom. Distances use the minimum
//! image along periodic axes.
//!
//! # Equivalence
//!
//! Two analyses are equivalent when their bond graphs, with atoms labelled by
//! element, are isomorphic.

use crate::error::{Error, Result};
use crate::geometry::{formula_of, Geometry};
use petgraph::algo::is_isomorphic_matching;
use petgraph::graph::UnGraph;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of analysing one geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryAnalysis {
    /// Element symbol of every analysed atom
    pub elements: Vec<String>,
    /// Unique bonds `(i, j)` with `i < j`, sorted
    pub bonds: Vec<(usize, usize)>,
    /// Atom indices of each molecule, ordered by their smallest index
    pub molecules: Vec<Vec<usize>>,
    /// Hill formula of each molecule, parallel to `molecules`
    pub formulas: Vec<String>,
}

impl GeometryAnalysis {
    /// Builds the element-labelled bond graph.
    pub fn to_graph(&self) -> UnGraph<String, ()> {
        let mut graph = UnGraph::<String, ()>::with_capacity(self.elements.len(), self.bonds.len());
        let nodes: Vec<_> = self
            .elements
            .iter()
            .map(|e| graph.add_node(e.clone()))
            .collect();
        for &(i, j) in &self.bonds {
            graph.add_edge(nodes[i], nodes[j], ());
        }
        graph
    }

    /// Structural equivalence: same element-labelled connectivity.
    pub fn is_equivalent(&self, other: &GeometryAnalysis) -> bool {
        if self.elements.len() != other.elements.len() || self.bonds.len() != other.bonds.len() {
            return false;
        }
        let mut f1 = self.formulas.clone();
        let mut f2 = other.formulas.clone();
        f1.sort();
        f2.sort();
        if f1 != f2 {
            return false;
        }
        if self.bonds == other.bonds && self.elements == other.elements {
            return true;
        }
        is_isomorphic_matching(
            &self.to_graph(),
            &other.to_graph(),
            |a: &String, b: &String| a == b,
            |_: &(), _: &()| true,
        )
    }
}

/// Collaborator that turns a geometry into a [`GeometryAnalysis`].
pub trait GeometryAnalyzer {
    /// Analyses one geometry.
    fn analyze(&self, geometry: &Geometry) -> Result<GeometryAnalysis>;

    /// Decides whether two analyses describe the same structure.
    fn equivalent(&self, a: &GeometryAnalysis, b: &GeometryAnalysis) -> bool {
        a.is_equivalent(b)
    }
}

/// Covalent-radius bond perception.
#[derive(Debug, Clone)]
pub struct CovalentAnalyzer {
    /// Scale factor on the sum of radii; larger values bond more distant atoms
    pub mult: f64,
    /// Constant added to every cutoff, in Angstrom
    pub skin: f64,
    /// Per-element radius overrides in Angstrom
    pub radii: HashMap<String, f64>,
}

impl Default for CovalentAnalyzer {
    fn default() -> Self {
        Self {
            mult: 1.0,
            skin: 0.3,
            radii: HashMap::new(),
        }
    }
}

impl CovalentAnalyzer {
    /// Analyzer with the given multiplier and default radii.
    pub fn new(mult: f64) -> Self {
        Self {
            mult,
            ..Self::default()
        }
    }

    /// Overrides the radius of one element.
    pub fn with_radius(mut self, element: &str, radius: f64) -> Self {
        self.radii.insert(element.to_string(), radius);
        self
    }

    fn radius(&self, element: &str) -> Result<f64> {
        self.radii
            .get(element)
            .copied()
            .or_else(|| covalent_radius(element))
            .ok_or_else(|| Error::precondition(format!("no covalent radius for element '{}'", element)))
    }
}

impl GeometryAnalyzer for CovalentAnalyzer {
    fn analyze(&self, geometry: &Geometry) -> Result<GeometryAnalysis> {
        let n = geometry.num_atoms;
        let radii = geometry
            .elements
            .iter()
            .map(|e| self.radius(e))
            .collect::<Result<Vec<_>>>()?;

        let mut bonds = Vec::new();
        let mut components = UnionFind::<usize>::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let cutoff = self.mult * (radii[i] + radii[j]) + self.skin;
                if geometry.distance(i, j) < cutoff {
                    bonds.push((i, j));
                    components.union(i, j);
                }
            }
        }

        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut molecules: Vec<Vec<usize>> = Vec::new();
        for atom in 0..n {
            let root = components.find(atom);
            let slot = *by_root.entry(root).or_insert_with(|| {
                molecules.push(Vec::new());
                molecules.len() - 1
            });
            molecules[slot].push(atom);
        }
        let formulas = molecules
            .iter()
            .map(|m| formula_of(m.iter().map(|&i| geometry.elements[i].as_str())))
            .collect();

        Ok(GeometryAnalysis {
            elements: geometry.elements.clone(),
            bonds,
            molecules,
            formulas,
        })
    }
}

/// Assigns group ids to a sequence of analyses.
///
/// Ids are handed out in order of first appearance, so `[A, A', B, C, C']`
/// becomes `[0, 0, 1, 2, 2]`. Missing analyses get no group.
pub fn assign_groups(
    analyses: &[Option<&GeometryAnalysis>],
    analyzer: &dyn GeometryAnalyzer,
) -> Vec<Option<usize>> {
    let mut representatives: Vec<&GeometryAnalysis> = Vec::new();
    analyses
        .iter()
        .map(|analysis| {
            let analysis = (*analysis)?;
            let found = representatives
                .iter()
                .position(|rep| analyzer.equivalent(rep, analysis));
            Some(found.unwrap_or_else(|| {
                representatives.push(analysis);
                representatives.len() - 1
            }))
        })
        .collect()
}

/// Groups expressed as lists of member indices, e.g. `[[0, 1], [2], [3, 4]]`.
pub fn clusters(groups: &[Option<usize>]) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (i, group) in groups.iter().enumerate() {
        if let Some(g) = *group {
            if clusters.len() <= g {
                clusters.resize(g + 1, Vec::new());
            }
            clusters[g].push(i);
        }
    }
    clusters
}

/// Covalent radius in Angstrom (Cordero et al., Dalton Trans. 2008).
pub fn covalent_radius(symbol: &str) -> Option<f64> {
    let r = match symbol {
        "H" => 0.31,
        "He" => 0.28,
        "Li" => 1.28,
        "Be" => 0.96,
        "B" => 0.84,
        "C" => 0.76,
        "N" => 0.71,
        "O" => 0.66,
        "F" => 0.57,
        "Ne" => 0.58,
        "Na" => 1.66,
        "Mg" => 1.41,
        "Al" => 1.21,
        "Si" => 1.11,
        "P" => 1.07,
        "S" => 1.05,
        "Cl" => 1.02,
        "Ar" => 1.06,
        "K" => 2.03,
        "Ca" => 1.76,
        "Sc" => 1.70,
        "Ti" => 1.60,
        "V" => 1.53,
        "Cr" => 1.39,
        "Mn" => 1.39,
        "Fe" => 1.32,
        "Co" => 1.26,
        "Ni" => 1.24,
        "Cu" => 1.32,
        "Zn" => 1.22,
        "Ga" => 1.22,
        "Ge" => 1.20,
        "As" => 1.19,
        "Se" => 1.20,
        "Br" => 1.20,
        "Kr" => 1.16,
        "Rb" => 2.20,
        "Sr" => 1.95,
        "Y" => 1.90,
        "Zr" => 1.75,
        "Nb" => 1.64,
        "Mo" => 1.54,
        "Tc" => 1.47,
        "Ru" => 1.46,
        "Rh" => 1.42,
        "Pd" => 1.39,
        "Ag" => 1.45,
        "Cd" => 1.44,
        "In" => 1.42,
        "Sn" => 1.39,
        "Sb" => 1.39,
        "Te" => 1.38,
        "I" => 1.39,
        "Xe" => 1.40,
        "Cs" => 2.44,
        "Ba" => 2.15,
        "La" => 2.07,
        "Ce" => 2.04,
        "Pr" => 2.03,
        "Nd" => 2.01,
        "Pm" => 1.99,
        "Sm" => 1.98,
        "Eu" => 1.98,
        "Gd" => 1.96,
        "Tb" => 1.94,
        "Dy" => 1.92,
        "Ho" => 1.92,
        "Er" => 1.89,
        "Tm" => 1.90,
        "Yb" => 1.87,
        "Lu" => 1.87,
        "Hf" => 1.75,
        "Ta" => 1.70,
        "W" => 1.62,
        "Re" => 1.51,
        "Os" => 1.44,
        "Ir" => 1.41,
        "Pt" => 1.36,
        "Au" => 1.36,
        "Hg" => 1.32,
        "Tl" => 1.45,
        "Pb" => 1.46,
        "Bi" => 1.48,
        "Po" => 1.40,
        "At" => 1.50,
        "Rn" => 1.50,
        _ => return None,
    };
    Some(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(symbols: &[&str], positions: &[[f64; 3]]) -> Geometry {
        Geometry::from_positions(symbols.iter().map(|s| s.to_string()).collect(), positions)
            .unwrap()
    }

    fn h2_plus_h() -> Geometry {
        geom(
            &["H", "H", "H"],
            &[[0.0, 0.0, 0.0], [0.74, 0.0, 0.0], [5.0, 0.0, 0.0]],
        )
    }

    #[test]
    fn test_bonds_and_molecules() {
        let analysis = CovalentAnalyzer::default().analyze(&h2_plus_h()).unwrap();
        assert_eq!(analysis.bonds, vec![(0, 1)]);
        assert_eq!(analysis.molecules, vec![vec![0, 1], vec![2]]);
        assert_eq!(analysis.formulas, vec!["H2".to_string(), "H".to_string()]);
    }

    #[test]
    fn test_mult_widens_cutoff() {
        let analysis = CovalentAnalyzer::new(10.0).analyze(&h2_plus_h()).unwrap();
        assert_eq!(analysis.molecules.len(), 1);
    }

    #[test]
    fn test_unknown_element_needs_override() {
        let g = geom(&["Xx"], &[[0.0; 3]]);
        assert!(CovalentAnalyzer::default().analyze(&g).is_err());
        let analyzer = CovalentAnalyzer::default().with_radius("Xx", 1.0);
        assert!(analyzer.analyze(&g).is_ok());
    }

    #[test]
    fn test_equivalence_is_permutation_invariant() {
        let analyzer = CovalentAnalyzer::default();
        let a = analyzer.analyze(&h2_plus_h()).unwrap();
        // same connectivity, the lone atom now comes first
        let b = analyzer
            .analyze(&geom(
                &["H", "H", "H"],
                &[[-5.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.74, 0.0]],
            ))
            .unwrap();
        let c = analyzer
            .analyze(&geom(
                &["H", "H", "H"],
                &[[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [6.0, 0.0, 0.0]],
            ))
            .unwrap();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_assign_groups_first_appearance_order() {
        let analyzer = CovalentAnalyzer::default();
        let bonded = analyzer.analyze(&h2_plus_h()).unwrap();
        let apart = analyzer
            .analyze(&geom(
                &["H", "H", "H"],
                &[[0.0, 0.0, 0.0], [3.0, 0.0, 0.0], [6.0, 0.0, 0.0]],
            ))
            .unwrap();
        let groups = assign_groups(
            &[Some(&apart), Some(&bonded), None, Some(&bonded), Some(&apart)],
            &analyzer,
        );
        assert_eq!(groups, vec![Some(0), Some(1), None, Some(1), Some(0)]);
        assert_eq!(clusters(&groups), vec![vec![0, 4], vec![1, 3]]);
    }
}
