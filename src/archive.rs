//! JSON archives of entities, collections and whole networks.
//!
//! Parsing a large GRRM job and analysing every EQ takes a while, so the
//! results can be stored and reloaded. Archives are JSON documents tagged
//! with a `type` field:
//!
//! ```text
//! {"type": "GrrmData", "eq": {...}, "ts": {...}, "pt": {...}, "frozen_atoms": null}
//! ```
//!
//! # Serialization Strategy
//!
//! `Geometry` keeps its coordinates in a `DVector` and its cell in a
//! `Matrix3`, so wrapper types convert them to plain vectors:
//!
//! - [`SerializableGeometry`]: symbols, flat coordinates, cell rows, pbc
//! - [`SerializableEntity`]: `kind`, `atoms`, `geometry` (the analysis),
//!   `energy`, `frozen_atoms`, `connection`, `ini_eq`, `fin_eq`
//! - [`SerializableStructures`]: `kind`, `log`, `frozen_atoms`,
//!   `structures`, `geometries` (the group cache)
//! - [`SerializableGrrmData`]: `eq`, `ts`, `pt`, `frozen_atoms`
//!
//! Loading a network validates and rewires it. Entities whose frozen overlay
//! equals the collection template share the template again after loading.
//!
//! # Usage
//!
//! ```no_run
//! use grrmkit::archive::{self, Archive};
//! use grrmkit::grrmdata::GrrmData;
//! use std::path::Path;
//!
//! let data = GrrmData::read_job(Path::new("job/CH4"), None, None)?;
//! archive::save(&Archive::from(&data), Path::new("ch4.json"))?;
//! let restored = archive::load(Path::new("ch4.json"))?.into_grrmdata()?;
//! assert_eq!(restored, data);
//! # Ok::<(), grrmkit::error::Error>(())
//! ```

use crate::analysis::GeometryAnalysis;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::grrmdata::GrrmData;
use crate::structure::{Connection, Entity, Kind};
use crate::structures::Structures;
use log::info;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serializable wrapper for Geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableGeometry {
    /// Chemical element symbols
    elements: Vec<String>,
    /// Flattened coordinates as `Vec<f64>`
    coords: Vec<f64>,
    /// Lattice vectors as rows
    cell: Option<[[f64; 3]; 3]>,
    /// Periodicity flags
    pbc: [bool; 3],
}

impl From<&Geometry> for SerializableGeometry {
    fn from(geom: &Geometry) -> Self {
        Self {
            elements: geom.elements.clone(),
            coords: geom.coords.iter().copied().collect(),
            cell: geom.cell.map(|c| {
                [
                    [c[(0, 0)], c[(0, 1)], c[(0, 2)]],
                    [c[(1, 0)], c[(1, 1)], c[(1, 2)]],
                    [c[(2, 0)], c[(2, 1)], c[(2, 2)]],
                ]
            }),
            pbc: geom.pbc,
        }
    }
}

impl TryFrom<SerializableGeometry> for Geometry {
    type Error = Error;

    fn try_from(ser_geom: SerializableGeometry) -> Result<Self> {
        let mut geom = Geometry::try_new(ser_geom.elements, ser_geom.coords)?;
        geom.cell = ser_geom
            .cell
            .map(|rows| Matrix3::from_fn(|r, c| rows[r][c]));
        geom.pbc = ser_geom.pbc;
        Ok(geom)
    }
}

/// Serializable wrapper for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableEntity {
    kind: Kind,
    atoms: SerializableGeometry,
    geometry: Option<GeometryAnalysis>,
    energy: Option<f64>,
    frozen_atoms: Option<SerializableGeometry>,
    connection: Option<Connection>,
    ini_eq: Option<usize>,
    fin_eq: Option<usize>,
}

impl From<&Entity> for SerializableEntity {
    fn from(entity: &Entity) -> Self {
        Self {
            kind: entity.kind(),
            atoms: entity.geometry().into(),
            geometry: entity.structure().analysis().cloned(),
            energy: entity.energy(),
            frozen_atoms: entity.frozen_atoms().map(SerializableGeometry::from),
            connection: entity.connection().cloned(),
            ini_eq: entity.ini_eq(),
            fin_eq: entity.fin_eq(),
        }
    }
}

impl SerializableEntity {
    fn restore(self, template: Option<&Arc<Geometry>>) -> Result<Entity> {
        let mut entity = Entity::new(
            self.kind,
            Geometry::try_from(self.atoms)?,
            self.energy,
            self.connection,
        );
        entity.structure_mut().set_analysis(self.geometry);
        let frozen = match self.frozen_atoms {
            Some(ser) => {
                let geom = Geometry::try_from(ser)?;
                match template {
                    Some(shared) if **shared == geom => Some(Arc::clone(shared)),
                    _ => Some(Arc::new(geom)),
                }
            }
            None => None,
        };
        entity.set_frozen_atoms(frozen);
        entity.wire(self.ini_eq, self.fin_eq);
        Ok(entity)
    }
}

impl TryFrom<SerializableEntity> for Entity {
    type Error = Error;

    fn try_from(ser: SerializableEntity) -> Result<Self> {
        ser.restore(None)
    }
}

/// Serializable wrapper for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableStructures {
    kind: Kind,
    log: Vec<PathBuf>,
    frozen_atoms: Option<SerializableGeometry>,
    structures: Vec<Option<SerializableEntity>>,
    geometries: Option<Vec<Option<usize>>>,
}

impl From<&Structures> for SerializableStructures {
    fn from(list: &Structures) -> Self {
        Self {
            kind: list.kind(),
            log: list.log().to_vec(),
            frozen_atoms: list.frozen_atoms().map(SerializableGeometry::from),
            structures: list
                .iter()
                .map(|slot| slot.map(SerializableEntity::from))
                .collect(),
            geometries: list.group().ok().map(<[Option<usize>]>::to_vec),
        }
    }
}

impl TryFrom<SerializableStructures> for Structures {
    type Error = Error;

    fn try_from(ser: SerializableStructures) -> Result<Self> {
        let template = ser
            .frozen_atoms
            .map(Geometry::try_from)
            .transpose()?
            .map(Arc::new);
        let slots = ser
            .structures
            .into_iter()
            .map(|slot| slot.map(|e| e.restore(template.as_ref())).transpose())
            .collect::<Result<Vec<_>>>()?;
        let mut list = Structures::from_slots(ser.kind, slots)?;
        list.set_log(ser.log);
        list.restore_frozen_template(template);
        list.restore_groups(ser.geometries)?;
        Ok(list)
    }
}

/// Serializable wrapper for a whole network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableGrrmData {
    eq: SerializableStructures,
    ts: SerializableStructures,
    pt: SerializableStructures,
    frozen_atoms: Option<SerializableGeometry>,
}

impl From<&GrrmData> for SerializableGrrmData {
    fn from(data: &GrrmData) -> Self {
        Self {
            eq: data.eq().into(),
            ts: data.ts().into(),
            pt: data.pt().into(),
            frozen_atoms: data.frozen_atoms().map(SerializableGeometry::from),
        }
    }
}

impl TryFrom<SerializableGrrmData> for GrrmData {
    type Error = Error;

    fn try_from(ser: SerializableGrrmData) -> Result<Self> {
        let eq = Structures::try_from(ser.eq)?;
        let ts = Structures::try_from(ser.ts)?;
        let pt = Structures::try_from(ser.pt)?;
        let frozen = ser.frozen_atoms.map(Geometry::try_from).transpose()?;
        // Reuse the list template when it is the same geometry.
        let template = match (frozen, eq.frozen_template()) {
            (Some(geom), Some(shared)) if **shared == geom => Some(Arc::clone(shared)),
            (geom, _) => geom.map(Arc::new),
        };
        GrrmData::from_parts(eq, ts, pt, template)
    }
}

/// A stored object of any supported type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Archive {
    /// A whole network
    GrrmData(SerializableGrrmData),
    /// One EQ, TS or PT list
    Structures(SerializableStructures),
    /// A single entity
    Entity(SerializableEntity),
}

impl From<&GrrmData> for Archive {
    fn from(data: &GrrmData) -> Self {
        Archive::GrrmData(data.into())
    }
}

impl From<&Structures> for Archive {
    fn from(list: &Structures) -> Self {
        Archive::Structures(list.into())
    }
}

impl From<&Entity> for Archive {
    fn from(entity: &Entity) -> Self {
        Archive::Entity(entity.into())
    }
}

impl Archive {
    /// Name of the stored type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Archive::GrrmData(_) => "GrrmData",
            Archive::Structures(_) => "Structures",
            Archive::Entity(_) => "Entity",
        }
    }

    fn wrong_type(&self, wanted: &str) -> Error {
        Error::precondition(format!(
            "archive holds a {}, not a {}",
            self.type_name(),
            wanted
        ))
    }

    /// Restores a network.
    pub fn into_grrmdata(self) -> Result<GrrmData> {
        match self {
            Archive::GrrmData(ser) => ser.try_into(),
            other => Err(other.wrong_type("GrrmData")),
        }
    }

    /// Restores a collection.
    pub fn into_structures(self) -> Result<Structures> {
        match self {
            Archive::Structures(ser) => ser.try_into(),
            other => Err(other.wrong_type("Structures")),
        }
    }

    /// Restores an entity.
    pub fn into_entity(self) -> Result<Entity> {
        match self {
            Archive::Entity(ser) => ser.try_into(),
            other => Err(other.wrong_type("Entity")),
        }
    }

    /// Pretty-printed JSON text.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Writes an archive to `path`.
pub fn save(archive: &Archive, path: &Path) -> Result<()> {
    fs::write(path, archive.to_json()?)?;
    info!("Saved {} archive to {}", archive.type_name(), path.display());
    Ok(())
}

/// Reads an archive from `path`.
pub fn load(path: &Path) -> Result<Archive> {
    let content = fs::read_to_string(path)?;
    let archive = Archive::from_json(&content)?;
    info!("Loaded {} archive from {}", archive.type_name(), path.display());
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CovalentAnalyzer;
    use crate::structure::Endpoint;

    fn h2(d: f64) -> Geometry {
        Geometry::new(
            vec!["H".to_string(), "H".to_string()],
            vec![0.0, 0.0, 0.0, 0.1234567890123, 0.0, d],
        )
    }

    fn network() -> GrrmData {
        let mut eq = Structures::new(Kind::Eq);
        eq.push(Entity::eq(h2(0.74), Some(-1.1745682394381))).unwrap();
        eq.push(Entity::eq(h2(3.0), Some(-0.9999999999999))).unwrap();
        eq.push_missing();
        let mut ts = Structures::new(Kind::Ts);
        ts.push(Entity::ts(h2(1.3), Some(-0.95), Connection::new(0, 1)))
            .unwrap();
        ts.push(Entity::ts(
            h2(1.5),
            None,
            Connection {
                ini: Endpoint::Eq(1),
                fin: Endpoint::Unresolved("DC".to_string()),
            },
        ))
        .unwrap();
        let mut data = GrrmData::new(eq, ts, Structures::new(Kind::Pt)).unwrap();
        data.set_frozen_atoms(Some(Geometry::new(vec!["Pt".to_string()], vec![0.0, 0.0, -2.5])));
        data.set_cell(Some(Matrix3::from_diagonal_element(12.0)));
        data.set_pbc([true, true, false]);
        data.attach_analysis(&CovalentAnalyzer::default()).unwrap();
        data
    }

    #[test]
    fn test_grrmdata_json_round_trip() {
        let data = network();
        let json = Archive::from(&data).to_json().unwrap();
        assert!(json.contains("\"type\": \"GrrmData\""));
        let restored = Archive::from_json(&json).unwrap().into_grrmdata().unwrap();
        assert_eq!(restored, data);
        assert_eq!(restored.eq().group().unwrap(), data.eq().group().unwrap());
        let t = restored.ts().entity(0).unwrap();
        assert_eq!((t.ini_eq(), t.fin_eq()), (Some(0), Some(1)));
    }

    #[test]
    fn test_restored_template_is_shared() {
        let restored = Archive::from(&network())
            .to_json()
            .and_then(|j| Archive::from_json(&j))
            .and_then(Archive::into_grrmdata)
            .unwrap();
        let a = restored.eq().entity(0).unwrap().frozen_template().unwrap();
        let b = restored.eq().entity(1).unwrap().frozen_template().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_wrong_archive_type() {
        let entity = Entity::eq(h2(0.74), Some(-1.0));
        let archive = Archive::from(&entity);
        assert!(matches!(
            archive.clone().into_grrmdata(),
            Err(Error::Precondition(_))
        ));
        assert_eq!(archive.into_entity().unwrap(), entity);
    }

    #[test]
    fn test_corrupt_geometry_is_rejected() {
        let json = r#"{"type":"Entity","kind":"EQ","atoms":{"elements":["H"],"coords":[0.0],"cell":null,"pbc":[false,false,false]},
            "geometry":null,"energy":null,"frozen_atoms":null,"connection":null,"ini_eq":null,"fin_eq":null}"#;
        let archive = Archive::from_json(json).unwrap();
        assert!(matches!(
            archive.into_entity(),
            Err(Error::LengthMismatch { expected: 3, found: 1 })
        ));
    }
}
