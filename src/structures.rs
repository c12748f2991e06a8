//! Ordered collections of EQ, TS or PT entities.
//!
//! [`Structures`] holds entities of exactly one [`Kind`]. Slots may be empty
//! (`None`) for optima that are known to exist but were not recovered. The
//! collection also carries its provenance (`log`), the shared frozen-atom
//! template and the group cache computed from the entity analyses.
//!
//! Energies and connections are always derived from the stored entities.
//!
//! # Addressing
//!
//! ```
//! use grrmkit::geometry::Geometry;
//! use grrmkit::structure::{Entity, Kind};
//! use grrmkit::structures::Structures;
//!
//! let mut eqs = Structures::new(Kind::Eq);
//! for e in [-1.0, -2.0, -3.0, -4.0] {
//!     eqs.push(Entity::eq(Geometry::empty(), Some(e)))?;
//! }
//! let fancy = eqs.select(vec![1usize, 3])?;
//! let mask = eqs.select(vec![false, true, false, true])?;
//! assert_eq!(fancy, mask);
//! assert!(eqs.select(vec![true, false]).is_err());
//! # Ok::<(), grrmkit::error::Error>(())
//! ```

use crate::analysis::{assign_groups, clusters, GeometryAnalyzer};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::io::read_frozen_atoms;
use crate::parser::ListLog;
use crate::structure::{Connection, Entity, Kind};
use crate::units::EnergyUnit;
use log::{debug, info};
use nalgebra::Matrix3;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Index specification accepted by [`Structures::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    /// A single position
    At(usize),
    /// Positions in the given order, repeats allowed
    Fancy(Vec<usize>),
    /// One flag per slot
    Mask(Vec<bool>),
}

impl From<usize> for IndexSpec {
    fn from(i: usize) -> Self {
        IndexSpec::At(i)
    }
}

impl From<Vec<usize>> for IndexSpec {
    fn from(v: Vec<usize>) -> Self {
        IndexSpec::Fancy(v)
    }
}

impl From<&[usize]> for IndexSpec {
    fn from(v: &[usize]) -> Self {
        IndexSpec::Fancy(v.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for IndexSpec {
    fn from(v: [usize; N]) -> Self {
        IndexSpec::Fancy(v.to_vec())
    }
}

impl From<Vec<bool>> for IndexSpec {
    fn from(v: Vec<bool>) -> Self {
        IndexSpec::Mask(v)
    }
}

impl From<&[bool]> for IndexSpec {
    fn from(v: &[bool]) -> Self {
        IndexSpec::Mask(v.to_vec())
    }
}

impl<const N: usize> From<[bool; N]> for IndexSpec {
    fn from(v: [bool; N]) -> Self {
        IndexSpec::Mask(v.to_vec())
    }
}

/// Collection of entities of one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Structures {
    kind: Kind,
    entities: Vec<Option<Entity>>,
    log: Vec<PathBuf>,
    frozen_atoms: Option<Arc<Geometry>>,
    groups: Option<Vec<Option<usize>>>,
}

impl Structures {
    /// Empty collection of `kind`.
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            entities: Vec::new(),
            log: Vec::new(),
            frozen_atoms: None,
            groups: None,
        }
    }

    /// Builds a collection from entities, checking their kind.
    pub fn from_entities(kind: Kind, entities: Vec<Entity>) -> Result<Self> {
        Self::from_slots(kind, entities.into_iter().map(Some).collect())
    }

    /// Builds a collection from slots, checking the kind of every entity.
    pub fn from_slots(kind: Kind, slots: Vec<Option<Entity>>) -> Result<Self> {
        let mut collection = Self::new(kind);
        for slot in &slots {
            if let Some(entity) = slot {
                collection.check_kind(entity)?;
            }
        }
        collection.entities = slots;
        Ok(collection)
    }

    /// Reads a `*_{EQ,TS,PT}_list.log` file.
    pub fn read(path: &Path, kind: Kind) -> Result<Self> {
        let log = ListLog::read(path, kind)?;
        let mut collection = Self::from_entities(kind, log.entities()?)?;
        collection.log.push(path.to_path_buf());
        info!(
            "Read {} {} structures from {}",
            collection.len(),
            kind,
            path.display()
        );
        Ok(collection)
    }

    /// Reads an EQ list log.
    pub fn read_eq(path: &Path) -> Result<Self> {
        Self::read(path, Kind::Eq)
    }

    /// Reads a TS list log.
    pub fn read_ts(path: &Path) -> Result<Self> {
        Self::read(path, Kind::Ts)
    }

    /// Reads a PT list log.
    pub fn read_pt(path: &Path) -> Result<Self> {
        Self::read(path, Kind::Pt)
    }

    fn check_kind(&self, entity: &Entity) -> Result<()> {
        if entity.kind() != self.kind {
            return Err(Error::TypeKind {
                expected: self.kind,
                found: entity.kind(),
            });
        }
        Ok(())
    }

    /// Element kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Number of slots, including empty ones.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// `true` when there are no slots.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates over all slots in order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Entity>> + '_ {
        self.entities.iter().map(Option::as_ref)
    }

    /// Iterates over occupied slots with their positions.
    pub fn iter_present(&self) -> impl Iterator<Item = (usize, &Entity)> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    /// Entity at `index`; `None` for empty or out-of-range slots.
    pub fn entity(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index).and_then(Option::as_ref)
    }

    /// Mutable entity at `index`. Drops the group cache.
    pub fn entity_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.groups = None;
        self.entities.get_mut(index).and_then(Option::as_mut)
    }

    /// Slot at `index`, failing when out of range.
    pub fn at(&self, index: usize) -> Result<Option<&Entity>> {
        self.entities
            .get(index)
            .map(Option::as_ref)
            .ok_or(Error::Index {
                index,
                len: self.len(),
            })
    }

    /// Resolves an index specification to slot positions.
    pub fn indices(&self, spec: impl Into<IndexSpec>) -> Result<Vec<usize>> {
        let len = self.len();
        let check = |index: usize| {
            if index < len {
                Ok(index)
            } else {
                Err(Error::Index { index, len })
            }
        };
        match spec.into() {
            IndexSpec::At(i) => Ok(vec![check(i)?]),
            IndexSpec::Fancy(v) => v.into_iter().map(check).collect(),
            IndexSpec::Mask(mask) => {
                if mask.len() != len {
                    return Err(Error::LengthMismatch {
                        expected: len,
                        found: mask.len(),
                    });
                }
                Ok(mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &keep)| keep.then_some(i))
                    .collect())
            }
        }
    }

    /// New collection holding copies of the addressed slots, in order.
    ///
    /// Provenance and frozen template are carried over; the group cache is
    /// not.
    pub fn select(&self, spec: impl Into<IndexSpec>) -> Result<Structures> {
        let indices = self.indices(spec)?;
        Ok(Structures {
            kind: self.kind,
            entities: indices.iter().map(|&i| self.entities[i].clone()).collect(),
            log: self.log.clone(),
            frozen_atoms: self.frozen_atoms.clone(),
            groups: None,
        })
    }

    /// Appends an entity of the collection's kind.
    ///
    /// The collection's frozen template, when set, replaces the entity's own.
    pub fn push(&mut self, mut entity: Entity) -> Result<()> {
        self.check_kind(&entity)?;
        self.adopt_template(&mut entity);
        self.entities.push(Some(entity));
        self.groups = None;
        Ok(())
    }

    fn adopt_template(&self, entity: &mut Entity) {
        if self.frozen_atoms.is_some() {
            entity.set_frozen_atoms(self.frozen_atoms.clone());
        }
    }

    /// Appends an empty slot.
    pub fn push_missing(&mut self) {
        self.entities.push(None);
        self.groups = None;
    }

    /// Inserts an entity at `index`.
    ///
    /// For TS and PT collections every stored endpoint `>= index` is moved up
    /// by one first. Inserting into an EQ collection does not touch the
    /// connections of any TS or PT list that refers to it; use
    /// [`GrrmData::insert_eq`](crate::grrmdata::GrrmData::insert_eq) for that.
    /// The frozen template is applied as in [`push`](Self::push).
    pub fn insert(&mut self, index: usize, mut entity: Entity) -> Result<()> {
        self.check_kind(&entity)?;
        if index > self.len() {
            return Err(Error::Index {
                index,
                len: self.len(),
            });
        }
        if self.kind.is_edge() {
            self.shift_connections(index, 1);
        }
        self.adopt_template(&mut entity);
        self.entities.insert(index, Some(entity));
        self.groups = None;
        Ok(())
    }

    /// Adds `by` to every stored resolved endpoint `>= from`.
    ///
    /// Back-references are dropped; they are stale until rewired.
    pub fn shift_connections(&mut self, from: usize, by: usize) {
        for entity in self.entities.iter_mut().flatten() {
            if let Some(connection) = entity.connection_mut() {
                connection.shift(from, by);
            }
            entity.unwire();
        }
    }

    /// Concatenation of `self` and `other`.
    ///
    /// Both must hold the same kind. Entities are copied as they are, logs
    /// are concatenated, and the frozen template of `self` is kept.
    pub fn merge(&self, other: &Structures) -> Result<Structures> {
        if other.kind != self.kind {
            return Err(Error::TypeKind {
                expected: self.kind,
                found: other.kind,
            });
        }
        let mut entities = self.entities.clone();
        entities.extend(other.entities.iter().cloned());
        let mut log = self.log.clone();
        log.extend(other.log.iter().cloned());
        debug!(
            "Merged {} lists: {} + {} structures",
            self.kind,
            self.len(),
            other.len()
        );
        Ok(Structures {
            kind: self.kind,
            entities,
            log,
            frozen_atoms: self.frozen_atoms.clone(),
            groups: None,
        })
    }

    /// Source files the entities were read from.
    pub fn log(&self) -> &[PathBuf] {
        &self.log
    }

    /// Replaces the provenance list.
    pub fn set_log(&mut self, log: Vec<PathBuf>) {
        self.log = log;
    }

    /// Energies in `unit`; `None` for empty slots or unknown energies.
    pub fn energies(&self, unit: EnergyUnit) -> Vec<Option<f64>> {
        self.iter().map(|e| e.and_then(|e| e.energy_in(unit))).collect()
    }

    /// Connection of every slot.
    pub fn connections(&self) -> Vec<Option<Connection>> {
        self.iter()
            .map(|e| e.and_then(|e| e.connection().cloned()))
            .collect()
    }

    /// Resolved `(ini, fin)` index pairs of every slot.
    pub fn connection_pairs(&self) -> Vec<Option<(usize, usize)>> {
        self.iter()
            .map(|e| e.and_then(|e| e.connection()).and_then(Connection::indices))
            .collect()
    }

    /// Replaces the connections of a TS or PT collection.
    ///
    /// One connection per slot is required; those for empty slots are
    /// ignored.
    pub fn set_connections(&mut self, connections: Vec<Connection>) -> Result<()> {
        if !self.kind.is_edge() {
            return Err(Error::precondition("EQ lists have no connections"));
        }
        if connections.len() != self.len() {
            return Err(Error::LengthMismatch {
                expected: self.len(),
                found: connections.len(),
            });
        }
        for (slot, connection) in self.entities.iter_mut().zip(connections) {
            if let Some(entity) = slot {
                entity.set_connection(Some(connection))?;
            }
        }
        Ok(())
    }

    /// Shared frozen-atom template.
    pub fn frozen_atoms(&self) -> Option<&Geometry> {
        self.frozen_atoms.as_deref()
    }

    /// Shared handle to the frozen-atom template.
    pub fn frozen_template(&self) -> Option<&Arc<Geometry>> {
        self.frozen_atoms.as_ref()
    }

    /// Applies a frozen-atom template to every entity.
    ///
    /// Drops the group cache. Analyses already attached to entities are
    /// kept, as they only describe the mobile atoms.
    pub fn set_frozen_atoms(&mut self, frozen: Option<Geometry>) {
        let template = frozen.filter(|g| !g.is_empty()).map(Arc::new);
        self.set_frozen_template(template);
    }

    /// Applies an already shared template to every entity.
    pub fn set_frozen_template(&mut self, template: Option<Arc<Geometry>>) {
        for entity in self.entities.iter_mut().flatten() {
            entity.set_frozen_atoms(template.clone());
        }
        self.frozen_atoms = template;
        self.groups = None;
    }

    /// Reads the `Frozen Atoms` block of a GRRM input file and applies it.
    pub fn set_frozen_atoms_from_com(&mut self, com: &Path) -> Result<()> {
        let frozen = read_frozen_atoms(com)?;
        debug!("{} frozen atoms read from {}", frozen.num_atoms, com.display());
        self.set_frozen_atoms(Some(frozen));
        Ok(())
    }

    /// Cell of the first entity.
    pub fn cell(&self) -> Option<Matrix3<f64>> {
        self.iter_present().next().and_then(|(_, e)| e.geometry().cell)
    }

    /// Periodicity of the first entity.
    pub fn pbc(&self) -> [bool; 3] {
        self.iter_present()
            .next()
            .map(|(_, e)| e.geometry().pbc)
            .unwrap_or_default()
    }

    /// Sets the cell of every entity.
    pub fn set_cell(&mut self, cell: Option<Matrix3<f64>>) {
        for entity in self.entities.iter_mut().flatten() {
            entity.structure_mut().set_cell(cell);
        }
        self.groups = None;
    }

    /// Sets the periodicity of every entity.
    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        for entity in self.entities.iter_mut().flatten() {
            entity.structure_mut().set_pbc(pbc);
        }
        self.groups = None;
    }

    /// Analyses every entity that has no analysis yet, then regroups.
    ///
    /// Nothing is stored when any entity fails to analyse.
    pub fn attach_analysis(&mut self, analyzer: &dyn GeometryAnalyzer) -> Result<()> {
        let fresh = self
            .entities
            .iter()
            .map(|slot| match slot {
                Some(entity) if entity.structure().analysis().is_none() => {
                    analyzer.analyze(entity.structure().geometry()).map(Some)
                }
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        for (slot, analysis) in self.entities.iter_mut().zip(fresh) {
            if let (Some(entity), Some(analysis)) = (slot, analysis) {
                entity.structure_mut().set_analysis(Some(analysis));
            }
        }
        let analyses: Vec<_> = self
            .iter()
            .map(|e| e.and_then(|e| e.structure().analysis()))
            .collect();
        let groups = assign_groups(&analyses, analyzer);
        debug!(
            "{} list analysed: {} structures in {} groups",
            self.kind,
            self.len(),
            clusters(&groups).len()
        );
        self.groups = Some(groups);
        Ok(())
    }

    /// Drops every analysis and the group cache.
    pub fn clear_analysis(&mut self) {
        for entity in self.entities.iter_mut().flatten() {
            entity.structure_mut().set_analysis(None);
        }
        self.groups = None;
    }

    /// `true` once [`attach_analysis`](Self::attach_analysis) has run and
    /// nothing has changed since.
    pub fn has_analysis(&self) -> bool {
        self.groups.is_some()
    }

    fn require_analysis(&self) -> Result<()> {
        if self.groups.is_none() {
            return Err(Error::precondition(format!(
                "geometry analysis has not been attached to the {} list",
                self.kind
            )));
        }
        Ok(())
    }

    /// Molecules of every slot.
    pub fn molecules(&self) -> Result<Vec<Option<&[Vec<usize>]>>> {
        self.require_analysis()?;
        self.iter()
            .map(|e| e.map(|e| e.structure().molecules()).transpose())
            .collect()
    }

    /// Molecule formulas of every slot.
    pub fn formulas(&self) -> Result<Vec<Option<&[String]>>> {
        self.require_analysis()?;
        self.iter()
            .map(|e| e.map(|e| e.structure().formulas()).transpose())
            .collect()
    }

    /// Group id of every slot, e.g. `[0, 0, 1, 2, 2]`.
    pub fn group(&self) -> Result<&[Option<usize>]> {
        self.groups.as_deref().ok_or_else(|| {
            Error::precondition(format!(
                "geometry analysis has not been attached to the {} list",
                self.kind
            ))
        })
    }

    /// Slot positions of every group, e.g. `[[0, 1], [2], [3, 4]]`.
    pub fn cluster(&self) -> Result<Vec<Vec<usize>>> {
        Ok(clusters(self.group()?))
    }

    pub(crate) fn restore_groups(&mut self, groups: Option<Vec<Option<usize>>>) -> Result<()> {
        if let Some(g) = &groups {
            if g.len() != self.len() {
                return Err(Error::LengthMismatch {
                    expected: self.len(),
                    found: g.len(),
                });
            }
        }
        self.groups = groups;
        Ok(())
    }

    pub(crate) fn restore_frozen_template(&mut self, template: Option<Arc<Geometry>>) {
        self.frozen_atoms = template;
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut Entity> + '_ {
        self.entities.iter_mut().flatten()
    }
}
