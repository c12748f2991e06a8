//! EQ, TS and PT entities.
//!
//! The three GRRM structure kinds share one representation, [`Entity`], tagged
//! by [`Kind`]. An EQ is a [`Structure`] with an energy and an optional frozen
//! overlay; TS and PT add a [`Connection`] to two EQs and the back-references
//! `ini_eq`/`fin_eq`. Back-references are plain indices into the owning
//! aggregate's EQ list and are only ever written by
//! [`GrrmData`](crate::grrmdata::GrrmData).

use crate::analysis::{GeometryAnalysis, GeometryAnalyzer};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::structures::Structures;
use crate::units::EnergyUnit;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Structure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// Equilibrium structure
    #[serde(rename = "EQ")]
    Eq,
    /// Transition state
    #[serde(rename = "TS")]
    Ts,
    /// Path top (approximate transition state)
    #[serde(rename = "PT")]
    Pt,
}

impl Kind {
    /// Header line of the matching list log.
    pub fn header(self) -> &'static str {
        match self {
            Kind::Eq => "List of Equilibrium Structures",
            Kind::Ts => "List of Transition Structures",
            Kind::Pt => "List of Path Top (Approximate TS) Structures",
        }
    }

    /// Identifies a list kind from a header line.
    pub fn from_header(line: &str) -> Option<Kind> {
        let line = line.trim_end();
        [Kind::Eq, Kind::Ts, Kind::Pt]
            .into_iter()
            .find(|k| k.header() == line)
    }

    /// TS and PT entities are edges of the reaction graph.
    pub fn is_edge(self) -> bool {
        !matches!(self, Kind::Eq)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Eq => write!(f, "EQ"),
            Kind::Ts => write!(f, "TS"),
            Kind::Pt => write!(f, "PT"),
        }
    }
}

/// One end of a connection: an EQ index or an unresolved token such as `??`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    /// Index into the EQ list
    Eq(usize),
    /// Unresolved endpoint, kept verbatim
    Unresolved(String),
}

impl Endpoint {
    /// Integers become indices, anything else stays an unresolved token.
    pub fn parse(token: &str) -> Self {
        match token.trim().parse::<usize>() {
            Ok(i) => Endpoint::Eq(i),
            Err(_) => Endpoint::Unresolved(token.trim().to_string()),
        }
    }

    /// The EQ index, if resolved.
    pub fn index(&self) -> Option<usize> {
        match self {
            Endpoint::Eq(i) => Some(*i),
            Endpoint::Unresolved(_) => None,
        }
    }
}

impl From<usize> for Endpoint {
    fn from(i: usize) -> Self {
        Endpoint::Eq(i)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Eq(i) => write!(f, "{}", i),
            Endpoint::Unresolved(token) => write!(f, "{}", token),
        }
    }
}

/// Ordered pair of EQ endpoints linked by a TS or PT.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Origin
    pub ini: Endpoint,
    /// Destination
    pub fin: Endpoint,
}

impl Connection {
    /// Connection between two resolved EQ indices.
    pub fn new(ini: usize, fin: usize) -> Self {
        Self {
            ini: Endpoint::Eq(ini),
            fin: Endpoint::Eq(fin),
        }
    }

    /// Both indices, when both endpoints are resolved.
    pub fn indices(&self) -> Option<(usize, usize)> {
        Some((self.ini.index()?, self.fin.index()?))
    }

    /// `true` when both endpoints are EQ indices.
    pub fn is_resolved(&self) -> bool {
        self.indices().is_some()
    }

    /// Adds `by` to every resolved endpoint `>= from`.
    pub fn shift(&mut self, from: usize, by: usize) {
        for end in [&mut self.ini, &mut self.fin] {
            if let Endpoint::Eq(i) = end {
                if *i >= from {
                    *i += by;
                }
            }
        }
    }
}

impl From<(usize, usize)> for Connection {
    fn from((ini, fin): (usize, usize)) -> Self {
        Connection::new(ini, fin)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.ini, self.fin)
    }
}

/// A geometry together with its lazily attached analysis.
///
/// Every mutation of symbols, positions, cell or pbc drops the analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Structure {
    geometry: Geometry,
    analysis: Option<GeometryAnalysis>,
}

impl Structure {
    /// Wraps a geometry without analysis.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            analysis: None,
        }
    }

    /// The mobile geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Replaces the geometry.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.analysis = None;
    }

    /// Replaces the flat coordinates.
    pub fn set_coords(&mut self, coords: Vec<f64>) -> Result<()> {
        self.geometry.set_coords(coords)?;
        self.analysis = None;
        Ok(())
    }

    /// Sets or clears the periodic cell.
    pub fn set_cell(&mut self, cell: Option<Matrix3<f64>>) {
        self.geometry.cell = cell;
        self.analysis = None;
    }

    /// Sets the periodicity flags.
    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        self.geometry.pbc = pbc;
        self.analysis = None;
    }

    /// Number of mobile atoms.
    pub fn len(&self) -> usize {
        self.geometry.num_atoms
    }

    /// `true` for the zero-atom structure.
    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    /// Runs `analyzer` and caches the result.
    pub fn attach_analysis(&mut self, analyzer: &dyn GeometryAnalyzer) -> Result<&GeometryAnalysis> {
        let analysis = analyzer.analyze(&self.geometry)?;
        let cached = self.analysis.insert(analysis);
        Ok(&*cached)
    }

    /// Stores an externally computed analysis, or clears it.
    pub fn set_analysis(&mut self, analysis: Option<GeometryAnalysis>) {
        self.analysis = analysis;
    }

    /// The cached analysis, if any.
    pub fn analysis(&self) -> Option<&GeometryAnalysis> {
        self.analysis.as_ref()
    }

    fn require_analysis(&self) -> Result<&GeometryAnalysis> {
        self.analysis
            .as_ref()
            .ok_or_else(|| Error::precondition("geometry analysis has not been attached"))
    }

    /// Atom indices of each molecule.
    pub fn molecules(&self) -> Result<&[Vec<usize>]> {
        Ok(&self.require_analysis()?.molecules)
    }

    /// Formula of each molecule.
    pub fn formulas(&self) -> Result<&[String]> {
        Ok(&self.require_analysis()?.formulas)
    }
}

/// EQ, TS or PT record.
///
/// # Examples
///
/// ```
/// use grrmkit::geometry::Geometry;
/// use grrmkit::structure::{Connection, Entity, Kind};
/// use grrmkit::units::EnergyUnit;
///
/// let h = Geometry::new(vec!["H".into()], vec![0.0, 0.0, 0.0]);
/// let ts = Entity::ts(h, Some(-0.45), Connection::new(0, 1));
/// assert_eq!(ts.kind(), Kind::Ts);
/// assert_eq!(ts.energy_in(EnergyUnit::Hartree), Some(-0.45));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: Kind,
    structure: Structure,
    energy: Option<f64>,
    frozen_atoms: Option<Arc<Geometry>>,
    connection: Option<Connection>,
    ini_eq: Option<usize>,
    fin_eq: Option<usize>,
}

impl Entity {
    /// Generic constructor. `connection` is ignored for EQ.
    pub fn new(kind: Kind, geometry: Geometry, energy: Option<f64>, connection: Option<Connection>) -> Self {
        Self {
            kind,
            structure: Structure::new(geometry),
            energy,
            frozen_atoms: None,
            connection: if kind.is_edge() { connection } else { None },
            ini_eq: None,
            fin_eq: None,
        }
    }

    /// Equilibrium structure.
    pub fn eq(geometry: Geometry, energy: Option<f64>) -> Self {
        Self::new(Kind::Eq, geometry, energy, None)
    }

    /// Transition state between two EQs.
    pub fn ts(geometry: Geometry, energy: Option<f64>, connection: Connection) -> Self {
        Self::new(Kind::Ts, geometry, energy, Some(connection))
    }

    /// Path top between two EQs.
    pub fn pt(geometry: Geometry, energy: Option<f64>, connection: Connection) -> Self {
        Self::new(Kind::Pt, geometry, energy, Some(connection))
    }

    /// Entity kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Geometry and analysis cache.
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Mutable access to the structure. Mutations drop its analysis.
    pub fn structure_mut(&mut self) -> &mut Structure {
        &mut self.structure
    }

    /// Mobile geometry.
    pub fn geometry(&self) -> &Geometry {
        self.structure.geometry()
    }

    /// Energy in Hartree.
    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    /// Energy in `unit`.
    pub fn energy_in(&self, unit: EnergyUnit) -> Option<f64> {
        self.energy.map(|e| unit.from_hartree(e))
    }

    /// Sets the energy, given in Hartree.
    pub fn set_energy(&mut self, energy: Option<f64>) {
        self.energy = energy;
    }

    /// Frozen overlay, if any.
    pub fn frozen_atoms(&self) -> Option<&Geometry> {
        self.frozen_atoms.as_deref()
    }

    /// Shared handle to the frozen overlay.
    pub fn frozen_template(&self) -> Option<&Arc<Geometry>> {
        self.frozen_atoms.as_ref()
    }

    /// Sets the frozen overlay. An empty geometry clears it.
    pub fn set_frozen_atoms(&mut self, frozen: Option<Arc<Geometry>>) {
        self.frozen_atoms = frozen.filter(|g| !g.is_empty());
    }

    /// Full geometry: mobile atoms, then frozen atoms when requested.
    pub fn get_atoms(&self, include_frozen: bool) -> Geometry {
        match (&self.frozen_atoms, include_frozen) {
            (Some(frozen), true) => self.geometry().concat(frozen),
            _ => self.geometry().clone(),
        }
    }

    /// Connection of a TS or PT.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Replaces the connection and drops the back-references.
    pub fn set_connection(&mut self, connection: Option<Connection>) -> Result<()> {
        if !self.kind.is_edge() && connection.is_some() {
            return Err(Error::precondition("EQ structures carry no connection"));
        }
        self.connection = connection;
        self.unwire();
        Ok(())
    }

    pub(crate) fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }

    /// Index of the origin EQ, once wired.
    pub fn ini_eq(&self) -> Option<usize> {
        self.ini_eq
    }

    /// Index of the destination EQ, once wired.
    pub fn fin_eq(&self) -> Option<usize> {
        self.fin_eq
    }

    pub(crate) fn wire(&mut self, ini: Option<usize>, fin: Option<usize>) {
        self.ini_eq = ini;
        self.fin_eq = fin;
    }

    pub(crate) fn unwire(&mut self) {
        self.wire(None, None);
    }

    /// `energy - fin_eq.energy` in `unit`; `None` until wired.
    pub fn forward_energy(&self, eqs: &Structures, unit: EnergyUnit) -> Option<f64> {
        self.barrier_to(eqs, self.fin_eq?, unit)
    }

    /// `energy - ini_eq.energy` in `unit`; `None` until wired.
    pub fn reverse_energy(&self, eqs: &Structures, unit: EnergyUnit) -> Option<f64> {
        self.barrier_to(eqs, self.ini_eq?, unit)
    }

    fn barrier_to(&self, eqs: &Structures, eq: usize, unit: EnergyUnit) -> Option<f64> {
        let end = eqs.entity(eq)?.energy()?;
        Some(unit.from_hartree(self.energy? - end))
    }

    /// Display name such as `TS3`.
    pub fn label(&self, index: usize) -> String {
        format!("{}{}", self.kind, index)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(symbols='{}'", self.kind, self.geometry().chemical_formula())?;
        match self.energy {
            Some(e) => write!(f, ", energy={}", e)?,
            None => write!(f, ", energy=None")?,
        }
        if let Some(connection) = &self.connection {
            write!(f, ", CONNECTION : {}", connection)?;
        }
        write!(f, ")")
    }
}
