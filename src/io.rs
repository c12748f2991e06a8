//! Companion-file readers and list writers.
//!
//! A GRRM job produces more than the three list logs. The input file
//! (`*.com`) carries the `Frozen Atoms` block whose atoms are shared by every
//! structure, and periodic jobs come with a POSCAR holding the lattice. This
//! module reads those two files and writes collections back out, either as
//! multi-frame XYZ for viewers or in GRRM list format, which
//! [`ListLog`](crate::parser::ListLog) reads back.

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::structure::Entity;
use crate::structures::Structures;
use log::info;
use nalgebra::Matrix3;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Reads the `Frozen Atoms` block of a GRRM input file.
///
/// The block starts after a line reading `Frozen Atoms` and runs until a
/// blank line or the next keyword line (`Options`, `END`, ...). A file
/// without the block yields the empty geometry.
///
/// ```text
/// 0 1
/// C   0.000   0.000   0.000
/// Frozen Atoms
/// Pt  0.000   0.000  -2.000
/// Pt  2.770   0.000  -2.000
/// Options
/// ```
pub fn read_frozen_atoms(path: &Path) -> Result<Geometry> {
    let text = fs::read_to_string(path)?;
    parse_frozen_atoms(&text)
}

fn parse_frozen_atoms(text: &str) -> Result<Geometry> {
    let mut lines = text.lines().enumerate();
    if !lines
        .by_ref()
        .any(|(_, line)| line.trim().eq_ignore_ascii_case("frozen atoms"))
    {
        return Ok(Geometry::empty());
    }

    let mut elements = Vec::new();
    let mut coords = Vec::new();
    for (i, line) in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            break;
        }
        elements.push(parts[0].to_string());
        for token in &parts[1..4] {
            let value: f64 = token
                .parse()
                .map_err(|_| Error::parse(i + 1, format!("invalid frozen-atom coordinate '{}'", token)))?;
            coords.push(value);
        }
    }
    Geometry::try_new(elements, coords)
}

/// Reads the lattice of a POSCAR file.
///
/// Returns the cell with lattice vectors as rows, scaled by the universal
/// factor on line 2 (a negative factor is a target volume), and full
/// periodicity.
pub fn read_poscar_cell(path: &Path) -> Result<(Matrix3<f64>, [bool; 3])> {
    let text = fs::read_to_string(path)?;
    parse_poscar_cell(&text)
}

fn parse_poscar_cell(text: &str) -> Result<(Matrix3<f64>, [bool; 3])> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() < 5 {
        return Err(Error::parse(lines.len(), "POSCAR needs a scale line and three lattice vectors"));
    }
    let scale: f64 = lines[1]
        .split_whitespace()
        .next()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::parse(2, "invalid scale factor"))?;

    let mut cell = Matrix3::zeros();
    for row in 0..3 {
        let values = lines[2 + row]
            .split_whitespace()
            .take(3)
            .map(|t| t.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::parse(3 + row, "invalid lattice vector"))?;
        if values.len() != 3 {
            return Err(Error::parse(3 + row, "lattice vector needs three components"));
        }
        for col in 0..3 {
            cell[(row, col)] = values[col];
        }
    }

    let factor = if scale < 0.0 {
        (scale.abs() / cell.determinant().abs()).cbrt()
    } else {
        scale
    };
    Ok((cell * factor, [true; 3]))
}

fn xyz_frame(out: &mut String, geometry: &Geometry, comment: &str) {
    let _ = writeln!(out, "{}", geometry.num_atoms);
    let _ = writeln!(out, "{}", comment);
    for i in 0..geometry.num_atoms {
        let [x, y, z] = geometry.get_atom_coords(i);
        let _ = writeln!(out, "{}  {:.8}  {:.8}  {:.8}", geometry.elements[i], x, y, z);
    }
}

/// Writes every entity of a collection as one frame of a multi-frame XYZ.
///
/// The comment line names the entity and its energy in Hartree. Empty slots
/// are skipped.
pub fn write_xyz(structures: &Structures, path: &Path, include_frozen: bool) -> Result<()> {
    let mut content = String::new();
    for (i, entity) in structures.iter_present() {
        let comment = match entity.energy() {
            Some(e) => format!("{} E={:.12} Hartree", entity.label(i), e),
            None => entity.label(i),
        };
        xyz_frame(&mut content, &entity.get_atoms(include_frozen), &comment);
    }
    fs::write(path, content)?;
    info!(
        "Wrote {} frames to {}",
        structures.iter_present().count(),
        path.display()
    );
    Ok(())
}

fn list_block(out: &mut String, index: usize, entity: &Entity) -> Result<()> {
    let energy = entity.energy().ok_or_else(|| {
        Error::precondition(format!("{} has no energy to write", entity.label(index)))
    })?;
    let geometry = entity.geometry();
    let _ = writeln!(out, "# Geometry of {} {}, SYMMETRY = C1", entity.kind(), index);
    for i in 0..geometry.num_atoms {
        let [x, y, z] = geometry.get_atom_coords(i);
        let _ = writeln!(
            out,
            "{:<2}  {:>18.12}  {:>18.12}  {:>18.12}",
            geometry.elements[i], x, y, z
        );
    }
    let _ = writeln!(out, "Energy    = {:.12} ({:.12} : {:>15.12})", energy, energy, 0.0);
    if let Some(connection) = entity.connection() {
        let _ = writeln!(out, "CONNECTION : {}", connection);
    }
    out.push('\n');
    Ok(())
}

/// Writes a collection in GRRM list-log format.
///
/// Only the mobile atoms are written. Every slot must be occupied and carry
/// an energy, and all entities must share one atom ordering.
pub fn write_list_log(structures: &Structures, path: &Path) -> Result<()> {
    let mut content = format!("{}\n\n", structures.kind().header());
    let mut symbols: Option<&[String]> = None;
    for (i, slot) in structures.iter().enumerate() {
        let entity = slot.ok_or_else(|| {
            Error::precondition(format!("{}{} is missing", structures.kind(), i))
        })?;
        let elements = entity.geometry().elements.as_slice();
        match symbols {
            Some(first) if first != elements => {
                return Err(Error::precondition(format!(
                    "{} has a different atom ordering than the first structure",
                    entity.label(i)
                )))
            }
            Some(_) => {}
            None => symbols = Some(elements),
        }
        list_block(&mut content, i, entity)?;
    }
    fs::write(path, content)?;
    info!(
        "Wrote {} {} structures to {}",
        structures.len(),
        structures.kind(),
        path.display()
    );
    Ok(())
}
