#![warn(missing_docs)]

//! grrmkit - Reaction networks from GRRM list logs
//!
//! GRRM explores potential energy surfaces and reports what it finds in three
//! list logs per job:
//!
//! - `<job>_EQ_list.log`: equilibrium structures (local minima)
//! - `<job>_TS_list.log`: transition states, each connecting two EQs
//! - `<job>_PT_list.log`: path tops, approximate saddles connecting two EQs
//!
//! grrmkit parses these logs into typed collections, wires every TS/PT to
//! the EQs it connects, and searches the resulting network for the cheapest
//! reaction route between two structures.
//!
//! # Overview
//!
//! ```text
//!  *_list.log ──► ListLog ──► Structures (EQ / TS / PT) ──► GrrmData ──► PathSearch
//!                  parser        structures                  grrmdata     path_search
//! ```
//!
//! EQs are the nodes of the network and TS/PT entities are its edges. Each
//! edge stores its `CONNECTION` endpoints as written in the log, and the
//! aggregate derives `ini_eq`/`fin_eq` back-references from them. Endpoints
//! GRRM could not assign (dissociation channels, `??`) stay unresolved and
//! never become edges.
//!
//! # Grouping
//!
//! Conformers and symmetry copies show up as separate EQs with the same
//! bonding. With an analysis attached, equivalent EQs share a group id and
//! path search can treat each group as a single node:
//!
//! ```no_run
//! use grrmkit::analysis::CovalentAnalyzer;
//! use grrmkit::grrmdata::GrrmData;
//! use grrmkit::path_search::SearchOptions;
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut data = GrrmData::read_job(Path::new("job/CH4"), None, None)?;
//!     data.attach_analysis(&CovalentAnalyzer::default())?;
//!
//!     let routes = data.search_path(0, Some(5), &SearchOptions::default())?;
//!     for (_, outcome) in routes {
//!         if let Some(route) = outcome.route() {
//!             println!("{}", route.path);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Energies
//!
//! Energies are kept in Hartree, as GRRM writes them. Every reporting method
//! takes an [`EnergyUnit`](units::EnergyUnit) for conversion.
//!
//! # Modules
//!
//! - [`parser`] - List-log reader
//! - [`structure`] - EQ/TS/PT entities and connections
//! - [`structures`] - Typed collections with fancy indexing and merging
//! - [`grrmdata`] - The wired network
//! - [`path_search`] - Cheapest-route search
//! - [`reaction_path`] - Energy profiles and rate-limiting steps
//! - [`analysis`] - Bond perception and structural equivalence
//! - [`geometry`] - Atom symbols, coordinates and cells
//! - [`io`] - Frozen atoms, POSCAR cells, XYZ and list-log writers
//! - [`archive`] - JSON archives
//! - [`settings`] - Configuration files
//! - [`units`] - Energy units
//! - [`error`] - Error type

pub mod analysis;
pub mod archive;
pub mod error;
pub mod geometry;
pub mod grrmdata;
pub mod io;
pub mod parser;
pub mod path_search;
pub mod reaction_path;
pub mod settings;
pub mod structure;
pub mod structures;
pub mod units;

pub use error::{Error, Result};
pub use geometry::Geometry;
pub use grrmdata::GrrmData;
pub use structure::{Connection, Endpoint, Entity, Kind};
pub use structures::Structures;
