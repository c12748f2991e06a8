//! The reaction network of one (or several merged) GRRM jobs.
//!
//! [`GrrmData`] owns one EQ list, one TS list and one PT list and keeps them
//! consistent: every resolved TS/PT endpoint must be a valid index into the EQ
//! list, and every TS/PT carries `ini_eq`/`fin_eq` back-references derived
//! from its connection. The back-references are recomputed by [`rewire`]
//! whenever the EQ list changes length or order; they are never patched in
//! place.
//!
//! # Merging
//!
//! Merging two networks appends the EQs of the right operand after those of
//! the left one, so every endpoint contributed by the right operand is moved
//! up by the length of the left EQ list:
//!
//! ```text
//! A: 5 EQ, TS [0-1, 2-3]      B: 3 EQ, TS [0-1]
//! A + B: 8 EQ, TS [0-1, 2-3, 5-6]
//! ```
//!
//! The frozen-atom template of the left operand wins.
//!
//! [`rewire`]: GrrmData::rewire

use crate::analysis::GeometryAnalyzer;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::io::read_poscar_cell;
use crate::path_search::{PathSearch, SearchOptions, SearchOutcome};
use crate::structure::{Entity, Kind};
use crate::structures::Structures;
use crate::units::EnergyUnit;
use log::{debug, info};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One row of [`GrrmData::eq_summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqSummaryRow {
    /// Position in the EQ list
    pub node: usize,
    /// Display name, `EQn`
    pub name: String,
    /// Group id, when an analysis is attached
    pub group: Option<usize>,
    /// Energy in Hartree
    pub energy_hartree: Option<f64>,
    /// Energy in kJ/mol
    pub energy_kj_mol: Option<f64>,
}

/// One row of [`GrrmData::edge_summary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSummaryRow {
    /// Position in the TS or PT list
    pub edge: usize,
    /// Display name, `TSn` or `PTn`
    pub name: String,
    /// Origin endpoint as written in the connection
    pub source: Option<String>,
    /// Destination endpoint as written in the connection
    pub target: Option<String>,
    /// Energy in Hartree
    pub energy_hartree: Option<f64>,
    /// Energy in kJ/mol
    pub energy_kj_mol: Option<f64>,
    /// `E - E(fin_eq)` in kJ/mol
    pub forward_kj_mol: Option<f64>,
    /// `E - E(ini_eq)` in kJ/mol
    pub reverse_kj_mol: Option<f64>,
}

/// EQ, TS and PT lists wired into one network.
#[derive(Debug, Clone, PartialEq)]
pub struct GrrmData {
    eq: Structures,
    ts: Structures,
    pt: Structures,
    frozen_atoms: Option<Arc<Geometry>>,
}

impl Default for GrrmData {
    fn default() -> Self {
        Self {
            eq: Structures::new(Kind::Eq),
            ts: Structures::new(Kind::Ts),
            pt: Structures::new(Kind::Pt),
            frozen_atoms: None,
        }
    }
}

fn expect_kind(list: &Structures, kind: Kind) -> Result<()> {
    if list.kind() != kind {
        return Err(Error::TypeKind {
            expected: kind,
            found: list.kind(),
        });
    }
    Ok(())
}

impl GrrmData {
    /// Assembles a network from three lists and wires it.
    pub fn new(eq: Structures, ts: Structures, pt: Structures) -> Result<Self> {
        expect_kind(&eq, Kind::Eq)?;
        expect_kind(&ts, Kind::Ts)?;
        expect_kind(&pt, Kind::Pt)?;
        let frozen_atoms = [&eq, &ts, &pt]
            .iter()
            .find_map(|list| list.frozen_template().cloned());
        let mut data = Self {
            eq,
            ts,
            pt,
            frozen_atoms,
        };
        data.rewire()?;
        Ok(data)
    }

    /// Reads the list logs of one job. TS and PT files are optional.
    pub fn read(eq: &Path, ts: Option<&Path>, pt: Option<&Path>) -> Result<Self> {
        let eq = Structures::read_eq(eq)?;
        let ts = match ts {
            Some(path) => Structures::read_ts(path)?,
            None => Structures::new(Kind::Ts),
        };
        let pt = match pt {
            Some(path) => Structures::read_pt(path)?,
            None => Structures::new(Kind::Pt),
        };
        let data = Self::new(eq, ts, pt)?;
        info!(
            "Reaction network: {} EQ, {} TS, {} PT",
            data.eq.len(),
            data.ts.len(),
            data.pt.len()
        );
        Ok(data)
    }

    /// Reads `<prefix>_EQ_list.log` and, when present, `<prefix>_TS_list.log`
    /// and `<prefix>_PT_list.log`, then applies the frozen atoms of `com` and
    /// the cell of `poscar`.
    pub fn read_job(prefix: &Path, com: Option<&Path>, poscar: Option<&Path>) -> Result<Self> {
        let file = |suffix: &str| -> PathBuf {
            let mut name = prefix.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        let eq_path = file("_EQ_list.log");
        let ts_path = file("_TS_list.log");
        let pt_path = file("_PT_list.log");
        let mut data = Self::read(
            &eq_path,
            ts_path.exists().then_some(ts_path.as_path()),
            pt_path.exists().then_some(pt_path.as_path()),
        )?;
        if let Some(com) = com {
            data.set_frozen_atoms_from_com(com)?;
        }
        if let Some(poscar) = poscar {
            data.set_cell_from_poscar(poscar)?;
        }
        Ok(data)
    }

    /// EQ list.
    pub fn eq(&self) -> &Structures {
        &self.eq
    }

    /// TS list.
    pub fn ts(&self) -> &Structures {
        &self.ts
    }

    /// PT list.
    pub fn pt(&self) -> &Structures {
        &self.pt
    }

    /// List of `kind`.
    pub fn get(&self, kind: Kind) -> &Structures {
        match kind {
            Kind::Eq => &self.eq,
            Kind::Ts => &self.ts,
            Kind::Pt => &self.pt,
        }
    }

    /// Replaces the EQ list and rewires.
    ///
    /// On failure the network is left unchanged.
    pub fn set_eq(&mut self, eq: Structures) -> Result<()> {
        expect_kind(&eq, Kind::Eq)?;
        let old = std::mem::replace(&mut self.eq, eq);
        if let Err(err) = self.rewire() {
            self.eq = old;
            self.rewire()?;
            return Err(err);
        }
        Ok(())
    }

    /// Replaces the TS list and rewires.
    pub fn set_ts(&mut self, ts: Structures) -> Result<()> {
        expect_kind(&ts, Kind::Ts)?;
        Self::validate(&ts, self.eq.len())?;
        self.ts = ts;
        Self::wire(&mut self.ts);
        Ok(())
    }

    /// Replaces the PT list and rewires.
    pub fn set_pt(&mut self, pt: Structures) -> Result<()> {
        expect_kind(&pt, Kind::Pt)?;
        Self::validate(&pt, self.eq.len())?;
        self.pt = pt;
        Self::wire(&mut self.pt);
        Ok(())
    }

    fn validate(list: &Structures, len: usize) -> Result<()> {
        for (i, entity) in list.iter_present() {
            let Some(connection) = entity.connection() else {
                continue;
            };
            for end in [&connection.ini, &connection.fin] {
                if let Some(endpoint) = end.index() {
                    if endpoint >= len {
                        return Err(Error::ReferentialIntegrity {
                            kind: list.kind(),
                            entity: i,
                            endpoint,
                            len,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn wire(list: &mut Structures) {
        for entity in list.slots_mut() {
            let (ini, fin) = match entity.connection() {
                Some(c) => (c.ini.index(), c.fin.index()),
                None => (None, None),
            };
            entity.wire(ini, fin);
        }
    }

    /// Validates every TS/PT endpoint and re-derives the back-references.
    ///
    /// Unresolved endpoints leave the matching back-reference empty. Nothing
    /// is changed when validation fails.
    pub fn rewire(&mut self) -> Result<()> {
        Self::validate(&self.ts, self.eq.len())?;
        Self::validate(&self.pt, self.eq.len())?;
        Self::wire(&mut self.ts);
        Self::wire(&mut self.pt);
        debug!(
            "Wired {} TS and {} PT onto {} EQ",
            self.ts.len(),
            self.pt.len(),
            self.eq.len()
        );
        Ok(())
    }

    /// Resolved `(ini, fin)` EQ indices of a TS or PT.
    pub fn endpoints(&self, kind: Kind, index: usize) -> Result<(usize, usize)> {
        let list = self.get(kind);
        let entity = list.at(index)?.ok_or_else(|| {
            Error::precondition(format!("{}{} is missing", kind, index))
        })?;
        let connection = entity.connection().ok_or_else(|| {
            Error::precondition(format!("{} has no connection", entity.label(index)))
        })?;
        for end in [&connection.ini, &connection.fin] {
            if end.index().is_none() {
                return Err(Error::Unresolved {
                    kind,
                    entity: index,
                    token: end.to_string(),
                });
            }
        }
        match (entity.ini_eq(), entity.fin_eq()) {
            (Some(ini), Some(fin)) => Ok((ini, fin)),
            _ => Err(Error::precondition(format!("{} is not wired", entity.label(index)))),
        }
    }

    /// Network made of `self` followed by `other`.
    pub fn merge(&self, other: &GrrmData) -> Result<GrrmData> {
        let offset = self.eq.len();
        let mut other_ts = other.ts.clone();
        let mut other_pt = other.pt.clone();
        other_ts.shift_connections(0, offset);
        other_pt.shift_connections(0, offset);

        let mut merged = GrrmData {
            eq: self.eq.merge(&other.eq)?,
            ts: self.ts.merge(&other_ts)?,
            pt: self.pt.merge(&other_pt)?,
            frozen_atoms: self.frozen_atoms.clone(),
        };
        merged.rewire()?;
        info!(
            "Merged networks: {} + {} EQ (right endpoints shifted by {})",
            offset,
            other.eq.len(),
            offset
        );
        Ok(merged)
    }

    /// Inserts an EQ at `index` and moves every TS/PT endpoint `>= index` up
    /// by one, so connections keep naming the same structures.
    pub fn insert_eq(&mut self, index: usize, entity: Entity) -> Result<()> {
        self.eq.insert(index, entity)?;
        self.ts.shift_connections(index, 1);
        self.pt.shift_connections(index, 1);
        self.rewire()
    }

    /// Appends an EQ.
    pub fn push_eq(&mut self, entity: Entity) -> Result<()> {
        self.eq.push(entity)
    }

    /// Appends a TS or PT after checking its endpoints.
    pub fn push_edge(&mut self, mut entity: Entity) -> Result<()> {
        let kind = entity.kind();
        if !kind.is_edge() {
            return Err(Error::TypeKind {
                expected: Kind::Ts,
                found: kind,
            });
        }
        let len = self.eq.len();
        let list = match kind {
            Kind::Pt => &mut self.pt,
            _ => &mut self.ts,
        };
        if let Some(connection) = entity.connection() {
            for endpoint in [connection.ini.index(), connection.fin.index()].into_iter().flatten() {
                if endpoint >= len {
                    return Err(Error::ReferentialIntegrity {
                        kind,
                        entity: list.len(),
                        endpoint,
                        len,
                    });
                }
            }
            let (ini, fin) = (connection.ini.index(), connection.fin.index());
            entity.wire(ini, fin);
        }
        list.push(entity)
    }

    /// Shared frozen-atom template.
    pub fn frozen_atoms(&self) -> Option<&Geometry> {
        self.frozen_atoms.as_deref()
    }

    /// Applies one frozen-atom template to all three lists.
    pub fn set_frozen_atoms(&mut self, frozen: Option<Geometry>) {
        let template = frozen.filter(|g| !g.is_empty()).map(Arc::new);
        for list in [&mut self.eq, &mut self.ts, &mut self.pt] {
            list.set_frozen_template(template.clone());
        }
        self.frozen_atoms = template;
    }

    /// Reads the `Frozen Atoms` block of a GRRM input and applies it.
    pub fn set_frozen_atoms_from_com(&mut self, com: &Path) -> Result<()> {
        let frozen = crate::io::read_frozen_atoms(com)?;
        info!("Applied {} frozen atoms from {}", frozen.num_atoms, com.display());
        self.set_frozen_atoms(Some(frozen));
        Ok(())
    }

    /// Cell of the EQ list.
    pub fn cell(&self) -> Option<Matrix3<f64>> {
        self.eq.cell()
    }

    /// Sets the cell of every structure.
    pub fn set_cell(&mut self, cell: Option<Matrix3<f64>>) {
        for list in [&mut self.eq, &mut self.ts, &mut self.pt] {
            list.set_cell(cell);
        }
    }

    /// Sets the periodicity of every structure.
    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        for list in [&mut self.eq, &mut self.ts, &mut self.pt] {
            list.set_pbc(pbc);
        }
    }

    /// Reads cell and periodicity from a POSCAR.
    pub fn set_cell_from_poscar(&mut self, poscar: &Path) -> Result<()> {
        let (cell, pbc) = read_poscar_cell(poscar)?;
        self.set_cell(Some(cell));
        self.set_pbc(pbc);
        Ok(())
    }

    /// Analyses the EQ list and groups equivalent EQs.
    pub fn attach_analysis(&mut self, analyzer: &dyn GeometryAnalyzer) -> Result<()> {
        self.eq.attach_analysis(analyzer)
    }

    /// One row per EQ.
    pub fn eq_summary(&self) -> Vec<EqSummaryRow> {
        let groups = self.eq.group().ok();
        self.eq
            .iter()
            .enumerate()
            .map(|(i, entity)| EqSummaryRow {
                node: i,
                name: format!("EQ{}", i),
                group: groups.and_then(|g| g[i]),
                energy_hartree: entity.and_then(|e| e.energy()),
                energy_kj_mol: entity.and_then(|e| e.energy_in(EnergyUnit::KiloJoulePerMol)),
            })
            .collect()
    }

    /// One row per TS or PT.
    pub fn edge_summary(&self, kind: Kind) -> Result<Vec<EdgeSummaryRow>> {
        if !kind.is_edge() {
            return Err(Error::TypeKind {
                expected: Kind::Ts,
                found: kind,
            });
        }
        let kj = EnergyUnit::KiloJoulePerMol;
        Ok(self
            .get(kind)
            .iter()
            .enumerate()
            .map(|(i, entity)| {
                let connection = entity.and_then(|e| e.connection());
                EdgeSummaryRow {
                    edge: i,
                    name: format!("{}{}", kind, i),
                    source: connection.map(|c| c.ini.to_string()),
                    target: connection.map(|c| c.fin.to_string()),
                    energy_hartree: entity.and_then(|e| e.energy()),
                    energy_kj_mol: entity.and_then(|e| e.energy_in(kj)),
                    forward_kj_mol: entity.and_then(|e| e.forward_energy(&self.eq, kj)),
                    reverse_kj_mol: entity.and_then(|e| e.reverse_energy(&self.eq, kj)),
                }
            })
            .collect())
    }

    /// Searches cheapest routes from `ini`.
    ///
    /// `ini` and `fin` are group ids when `options.group` is set and EQ
    /// indices otherwise. With `fin` the result holds that single target;
    /// without it, every other node. Unreachable targets are reported as
    /// [`SearchOutcome::Unreachable`].
    pub fn search_path(
        &self,
        ini: usize,
        fin: Option<usize>,
        options: &SearchOptions,
    ) -> Result<BTreeMap<usize, SearchOutcome>> {
        let search = PathSearch::new(self, options.clone())?;
        match fin {
            Some(fin) => Ok(BTreeMap::from([(fin, search.find(ini, fin)?)])),
            None => search.find_all(ini),
        }
    }

    pub(crate) fn from_parts(
        eq: Structures,
        ts: Structures,
        pt: Structures,
        frozen_atoms: Option<Arc<Geometry>>,
    ) -> Result<Self> {
        let mut data = Self::new(eq, ts, pt)?;
        data.frozen_atoms = frozen_atoms;
        Ok(data)
    }

    pub(crate) fn frozen_template(&self) -> Option<&Arc<Geometry>> {
        self.frozen_atoms.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Connection;
    use approx::assert_relative_eq;

    fn eqs(energies: &[f64]) -> Structures {
        let entities = energies
            .iter()
            .map(|&e| Entity::eq(Geometry::empty(), Some(e)))
            .collect();
        Structures::from_entities(Kind::Eq, entities).unwrap()
    }

    fn ts(list: &[(usize, usize)], energy: f64) -> Structures {
        let entities = list
            .iter()
            .map(|&(a, b)| Entity::ts(Geometry::empty(), Some(energy), Connection::new(a, b)))
            .collect();
        Structures::from_entities(Kind::Ts, entities).unwrap()
    }

    #[test]
    fn test_wiring_and_barriers() {
        let data = GrrmData::new(
            eqs(&[-1.0, -1.2]),
            ts(&[(0, 1)], -0.9),
            Structures::new(Kind::Pt),
        )
        .unwrap();
        let t = data.ts().entity(0).unwrap();
        assert_eq!((t.ini_eq(), t.fin_eq()), (Some(0), Some(1)));
        assert_relative_eq!(t.reverse_energy(data.eq(), EnergyUnit::Hartree).unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(t.forward_energy(data.eq(), EnergyUnit::Hartree).unwrap(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_range_connection_is_rejected() {
        let err = GrrmData::new(eqs(&[0.0, 0.0]), ts(&[(0, 2)], 0.1), Structures::new(Kind::Pt))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ReferentialIntegrity {
                kind: Kind::Ts,
                entity: 0,
                endpoint: 2,
                len: 2
            }
        ));
    }

    #[test]
    fn test_lists_must_match_their_slot() {
        let err = GrrmData::new(eqs(&[0.0]), Structures::new(Kind::Pt), Structures::new(Kind::Pt))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TypeKind {
                expected: Kind::Ts,
                found: Kind::Pt
            }
        ));
    }

    #[test]
    fn test_unresolved_endpoint_is_kept_and_reported() {
        let mut list = ts(&[(0, 1)], 0.1);
        let mut connection = Connection::new(0, 0);
        connection.fin = crate::structure::Endpoint::Unresolved("??".to_string());
        list.set_connections(vec![connection]).unwrap();
        let data = GrrmData::new(eqs(&[0.0, 0.0]), list, Structures::new(Kind::Pt)).unwrap();
        let t = data.ts().entity(0).unwrap();
        assert_eq!(t.ini_eq(), Some(0));
        assert_eq!(t.fin_eq(), None);
        assert!(t.forward_energy(data.eq(), EnergyUnit::Hartree).is_none());
        assert!(matches!(
            data.endpoints(Kind::Ts, 0),
            Err(Error::Unresolved { ref token, .. }) if token == "??"
        ));
    }

    #[test]
    fn test_set_eq_rolls_back_on_failure() {
        let mut data = GrrmData::new(eqs(&[0.0, 0.0]), ts(&[(0, 1)], 0.1), Structures::new(Kind::Pt))
            .unwrap();
        assert!(data.set_eq(eqs(&[0.0])).is_err());
        assert_eq!(data.eq().len(), 2);
        assert_eq!(data.endpoints(Kind::Ts, 0).unwrap(), (0, 1));
    }

    #[test]
    fn test_push_edge_checks_endpoints() {
        let mut data = GrrmData::new(eqs(&[0.0, 0.0]), Structures::new(Kind::Ts), Structures::new(Kind::Pt))
            .unwrap();
        let pt = Entity::pt(Geometry::empty(), Some(0.2), Connection::new(1, 0));
        data.push_edge(pt).unwrap();
        assert_eq!(data.endpoints(Kind::Pt, 0).unwrap(), (1, 0));
        let bad = Entity::ts(Geometry::empty(), Some(0.2), Connection::new(1, 5));
        assert!(matches!(
            data.push_edge(bad),
            Err(Error::ReferentialIntegrity { endpoint: 5, .. })
        ));
    }

    #[test]
    fn test_summaries() {
        let data = GrrmData::new(eqs(&[-1.0, -1.2]), ts(&[(0, 1)], -0.9), Structures::new(Kind::Pt))
            .unwrap();
        let rows = data.eq_summary();
        assert_eq!(rows[1].name, "EQ1");
        assert_eq!(rows[1].group, None);
        let edges = data.edge_summary(Kind::Ts).unwrap();
        assert_eq!(edges[0].source.as_deref(), Some("0"));
        assert_relative_eq!(
            edges[0].reverse_kj_mol.unwrap(),
            0.1 * crate::units::HARTREE_TO_KJ_PER_MOL,
            max_relative = 1e-9
        );
        assert!(data.edge_summary(Kind::Eq).is_err());
    }
}
