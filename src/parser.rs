//! GRRM list-log parsing.
//!
//! GRRM writes its equilibrium, transition and path-top structures to three
//! fixed-format text files (`*_EQ_list.log`, `*_TS_list.log`, `*_PT_list.log`).
//! All three share the same layout:
//!
//! ```text
//! List of Transition Structures
//!
//! # Geometry of TS 0, SYMMETRY = C1
//! C          -0.000000000000     -0.000000000000      0.000000000000
//! H           0.629118000000      0.629118000000      0.629118000000
//! ...
//! Energy    = -40.462612345678 (-40.462612345678 :  0.000000000000)
//! Spin(**2) =   0.000000000000
//! ZPVE      =   0.042000000000
//! Normal mode eigenvalues : nmode = 9
//!  -0.012345678   0.208010200   0.208010200 ...
//! CONNECTION : 0 - 1
//! ```
//!
//! The first line must be the header of the expected kind. Each block opens
//! with a `#` line followed by one `symbol x y z` line per atom, and the
//! `Energy =` line follows immediately. The atom count is taken from the first
//! block and must hold for every block of the file. TS and PT blocks carry a
//! `CONNECTION : i - j` line; a non-integer endpoint (`??`, `DC`) is kept as
//! an unresolved [`Endpoint`].
//!
//! Every malformed token is a fatal [`Error::Parse`] pointing at its line.
//!
//! # Examples
//!
//! ```
//! use grrmkit::parser::ListLog;
//! use grrmkit::structure::Kind;
//!
//! let text = "List of Equilibrium Structures\n\n\
//!             ## Geometry of EQ 0, SYMMETRY = D*h\n\
//!             H 0.0 0.0 0.0\n\
//!             H 0.0 0.0 0.74\n\
//!             Energy    = -1.17 (-1.17 : 0.0)\n";
//! let log = ListLog::parse(text, Kind::Eq)?;
//! assert_eq!(log.len(), 1);
//! assert_eq!(log.energies()?, vec![-1.17]);
//! # Ok::<(), grrmkit::error::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::structure::{Connection, Endpoint, Entity, Kind};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::fs;
use std::path::Path;

lazy_static! {
    // Accepts 1.23, -0.032, 1.2e-4, .123 and bare integers
    static ref FLOAT_RE: String = r"[-+]?(?:\d+\.\d*|\.\d+|\d+)(?:[eE][-+]?\d+)?".to_string();

    // "Energy    = -40.518383526049 (-40.518383526049 :  0.000000000000)"
    static ref ENERGY_RE: Regex = Regex::new(&format!(r"^\s*Energy\s*=\s*({0})", *FLOAT_RE)).unwrap();

    // "CONNECTION : 0 - 1" or "CONNECTION : 3 - ??"
    static ref CONNECTION_RE: Regex = Regex::new(r"^\s*CONNECTION\s*:\s*(\S+)\s*-\s*(\S+)").unwrap();
}

/// A scanned list log.
///
/// Holds the text and the marker indices. Coordinates, energies and
/// connections are decoded on request, so every accessor can be called
/// repeatedly with the same result.
#[derive(Debug, Clone)]
pub struct ListLog {
    kind: Kind,
    lines: Vec<String>,
    hash_idx: Vec<usize>,
    energy_idx: Vec<usize>,
    symbols: Vec<String>,
}

impl ListLog {
    /// Reads and scans a list log file.
    pub fn read(path: &Path, expected: Kind) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let log = Self::parse(&text, expected)?;
        debug!(
            "Scanned {} list {} ({} structures, {} atoms)",
            expected,
            path.display(),
            log.len(),
            log.symbols.len()
        );
        Ok(log)
    }

    /// Scans list-log text of the `expected` kind.
    pub fn parse(text: &str, expected: Kind) -> Result<Self> {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        check_header(lines.first().map(String::as_str), expected)?;

        let mut hash_idx = Vec::new();
        let mut energy_idx = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if line.starts_with('#') {
                hash_idx.push(i);
            } else if ENERGY_RE.is_match(line) {
                energy_idx.push(i);
            }
        }
        if hash_idx.len() != energy_idx.len() {
            return Err(Error::parse(
                0,
                format!(
                    "{} geometry markers but {} energy lines",
                    hash_idx.len(),
                    energy_idx.len()
                ),
            ));
        }

        let symbols = match (hash_idx.first(), energy_idx.first()) {
            (Some(&h), Some(&e)) if e > h => lines[h + 1..e]
                .iter()
                .enumerate()
                .map(|(k, line)| atom_symbol(line, h + 2 + k))
                .collect::<Result<Vec<_>>>()?,
            (Some(&h), Some(_)) => {
                return Err(Error::parse(h + 1, "energy line precedes the first geometry"))
            }
            _ => Vec::new(),
        };

        let log = Self {
            kind: expected,
            lines,
            hash_idx,
            energy_idx,
            symbols,
        };
        log.check_blocks()?;
        Ok(log)
    }

    /// Identifies the kind of a list log from its first line.
    pub fn detect(text: &str) -> Option<Kind> {
        text.lines().next().and_then(Kind::from_header)
    }

    // Every block must have the same atom count and symbol order.
    fn check_blocks(&self) -> Result<()> {
        let natoms = self.symbols.len();
        for (&h, &e) in self.hash_idx.iter().zip(&self.energy_idx) {
            if e != h + natoms + 1 {
                return Err(Error::parse(
                    h + 1,
                    format!(
                        "block has {} atom lines, the first block has {}",
                        e.saturating_sub(h + 1),
                        natoms
                    ),
                ));
            }
            for (k, expected) in self.symbols.iter().enumerate() {
                let line_no = h + 2 + k;
                let symbol = atom_symbol(&self.lines[h + 1 + k], line_no)?;
                if &symbol != expected {
                    return Err(Error::parse(
                        line_no,
                        format!("atom {} is {} here but {} in the first block", k, symbol, expected),
                    ));
                }
            }
        }
        Ok(())
    }

    /// List kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Number of structure blocks.
    pub fn len(&self) -> usize {
        self.hash_idx.len()
    }

    /// `true` when the file holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.hash_idx.is_empty()
    }

    /// Chemical symbols shared by every block.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Zero-based line indices of the `#` markers.
    pub fn hash_indices(&self) -> &[usize] {
        &self.hash_idx
    }

    /// Zero-based line indices of the `Energy =` lines.
    pub fn energy_indices(&self) -> &[usize] {
        &self.energy_idx
    }

    /// Flat coordinates of each block, decoded lazily.
    pub fn positions(&self) -> impl Iterator<Item = Result<Vec<f64>>> + '_ {
        let natoms = self.symbols.len();
        self.hash_idx.iter().map(move |&h| {
            let mut coords = Vec::with_capacity(natoms * 3);
            for (k, line) in self.lines[h + 1..h + 1 + natoms].iter().enumerate() {
                coords.extend_from_slice(&atom_position(line, h + 2 + k)?);
            }
            Ok(coords)
        })
    }

    /// Geometry of each block, decoded lazily.
    pub fn geometries(&self) -> impl Iterator<Item = Result<Geometry>> + '_ {
        self.positions()
            .map(move |coords| Geometry::try_new(self.symbols.clone(), coords?))
    }

    /// Energy of each block in Hartree.
    pub fn energies(&self) -> Result<Vec<f64>> {
        self.energy_idx
            .iter()
            .map(|&i| {
                let line = &self.lines[i];
                ENERGY_RE
                    .captures(line)
                    .and_then(|c| c[1].parse::<f64>().ok())
                    .ok_or_else(|| Error::parse(i + 1, format!("invalid energy: {}", line.trim())))
            })
            .collect()
    }

    /// Connection of each block. Empty for EQ lists.
    pub fn connections(&self) -> Result<Vec<Connection>> {
        if !self.kind.is_edge() {
            return Ok(Vec::new());
        }
        (0..self.len())
            .map(|k| {
                let start = self.energy_idx[k] + 1;
                let end = self
                    .hash_idx
                    .get(k + 1)
                    .copied()
                    .unwrap_or(self.lines.len());
                self.lines[start..end]
                    .iter()
                    .find_map(|line| CONNECTION_RE.captures(line))
                    .map(|c| Connection {
                        ini: Endpoint::parse(&c[1]),
                        fin: Endpoint::parse(&c[2]),
                    })
                    .ok_or_else(|| {
                        Error::parse(
                            self.hash_idx[k] + 1,
                            format!("{}{} has no CONNECTION line", self.kind, k),
                        )
                    })
            })
            .collect()
    }

    /// Builds the entities of the file.
    pub fn entities(&self) -> Result<Vec<Entity>> {
        let energies = self.energies()?;
        let connections = self.connections()?;
        self.geometries()
            .enumerate()
            .map(|(k, geometry)| {
                let connection = connections.get(k).cloned();
                Ok(Entity::new(self.kind, geometry?, Some(energies[k]), connection))
            })
            .collect()
    }
}

fn check_header(first: Option<&str>, expected: Kind) -> Result<()> {
    let first = first.unwrap_or("").trim_end();
    if first == expected.header() {
        return Ok(());
    }
    let likely = Kind::from_header(first)
        .or_else(|| guess_kind(first))
        .filter(|&k| k != expected);
    Err(Error::Format { expected, likely })
}

// Loose match for headers with stray text around them.
fn guess_kind(line: &str) -> Option<Kind> {
    if line.contains("Path Top") {
        Some(Kind::Pt)
    } else if line.contains("Transition") {
        Some(Kind::Ts)
    } else if line.contains("Equilibrium") {
        Some(Kind::Eq)
    } else {
        None
    }
}

fn atom_symbol(line: &str, line_no: usize) -> Result<String> {
    line.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::parse(line_no, "missing atom line"))
}

fn atom_position(line: &str, line_no: usize) -> Result<[f64; 3]> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(Error::parse(
            line_no,
            format!("expected 'symbol x y z', got '{}'", line.trim()),
        ));
    }
    let mut xyz = [0.0; 3];
    for (slot, token) in xyz.iter_mut().zip(&parts[1..4]) {
        *slot = token
            .parse()
            .map_err(|_| Error::parse(line_no, format!("invalid coordinate '{}'", token)))?;
    }
    Ok(xyz)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS_TEXT: &str = "List of Transition Structures

# Geometry of TS 0, SYMMETRY = C1
H   0.000000000000   0.000000000000   0.000000000000
H   0.000000000000   0.000000000000   0.900000000000
Energy    = -1.050000000000 (-1.050000000000 :  0.000000000000)
Spin(**2) =   0.000000000000
ZPVE      =   0.005000000000
Normal mode eigenvalues : nmode = 1
 -0.123456789
CONNECTION : 0 - 1

# Geometry of TS 1, SYMMETRY = C1
H   0.000000000000   0.000000000000   0.000000000000
H   0.000000000000   0.000000000000   1.100000000000
Energy    = -0.980000000000 (-0.980000000000 :  0.000000000000)
Spin(**2) =   0.000000000000
ZPVE      =   0.004000000000
Normal mode eigenvalues : nmode = 1
 -0.234567890
CONNECTION : 1 - ??
";

    #[test]
    fn test_ts_blocks() {
        let log = ListLog::parse(TS_TEXT, Kind::Ts).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.symbols(), &["H".to_string(), "H".to_string()]);
        assert_eq!(log.energies().unwrap(), vec![-1.05, -0.98]);
        let connections = log.connections().unwrap();
        assert_eq!(connections[0], Connection::new(0, 1));
        assert_eq!(connections[1].fin, Endpoint::Unresolved("??".to_string()));
    }

    #[test]
    fn test_positions_are_restartable() {
        let log = ListLog::parse(TS_TEXT, Kind::Ts).unwrap();
        let first: Vec<_> = log.positions().map(|p| p.unwrap()).collect();
        let second: Vec<_> = log.positions().map(|p| p.unwrap()).collect();
        assert_eq!(first, second);
        assert_eq!(first[1][5], 1.1);
    }

    #[test]
    fn test_wrong_header_names_likely_kind() {
        let err = ListLog::parse(TS_TEXT, Kind::Eq).unwrap_err();
        match err {
            Error::Format { expected, likely } => {
                assert_eq!(expected, Kind::Eq);
                assert_eq!(likely, Some(Kind::Ts));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_malformed_coordinate_is_fatal() {
        let text = TS_TEXT.replace("0.900000000000", "0.9x");
        let log = ListLog::parse(&text, Kind::Ts).unwrap();
        let err = log.positions().next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Parse { line: 5, .. }));
    }

    #[test]
    fn test_mixed_atom_counts_rejected() {
        let text = TS_TEXT.replacen(
            "H   0.000000000000   0.000000000000   1.100000000000\n",
            "H   0.000000000000   0.000000000000   1.100000000000\nH 0.0 0.0 2.0\n",
            1,
        );
        let err = ListLog::parse(&text, Kind::Ts).unwrap_err();
        assert!(matches!(err, Error::Parse { line: 13, .. }));
    }

    #[test]
    fn test_missing_connection_is_error() {
        let text = TS_TEXT.replace("CONNECTION : 0 - 1\n", "");
        let log = ListLog::parse(&text, Kind::Ts).unwrap();
        assert!(log.connections().is_err());
    }

    #[test]
    fn test_header_only_file() {
        let log = ListLog::parse("List of Equilibrium Structures\n", Kind::Eq).unwrap();
        assert!(log.is_empty());
        assert!(log.entities().unwrap().is_empty());
    }

    #[test]
    fn test_detect() {
        assert_eq!(ListLog::detect(TS_TEXT), Some(Kind::Ts));
        assert_eq!(ListLog::detect("garbage"), None);
    }
}
