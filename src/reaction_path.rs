//! Energy profiles along a reaction path.
//!
//! A [`ReactionPath`] is the ordered sequence of states visited between a
//! reactant and a product, for example
//!
//! ```text
//! EQ0 -> TS1 -> EQ3 -> PT2 -> EQ5
//! ```
//!
//! together with the energy of every state. Path search produces these
//! profiles, but they can also be assembled by hand from any list of named
//! energies.
//!
//! # Energies
//!
//! Energies are stored in Hartree. [`ReactionPath::relative_energies`] shifts
//! them so that the first state sits at zero, which is how energy diagrams
//! are usually drawn.
//!
//! # Rate-limiting step
//!
//! For every TS or PT on the path the barrier is its energy minus the energy
//! of the state just before it. The rate-limiting step is the one with the
//! largest such barrier:
//!
//! ```text
//! Ea = max_k ( E[k] - E[k-1] ),   k over TS/PT positions
//! ```

use crate::error::{Error, Result};
use crate::units::EnergyUnit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered states with energies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionPath {
    /// Optional title used to tell paths apart
    pub title: Option<String>,
    names: Vec<String>,
    energies: Vec<f64>,
}

/// The largest single barrier along a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingStep {
    /// Barrier height in Hartree
    pub barrier: f64,
    /// State before, the TS/PT, and the state after (if the path continues)
    pub names: Vec<String>,
}

impl RateLimitingStep {
    /// Barrier height in `unit`.
    pub fn barrier_in(&self, unit: EnergyUnit) -> f64 {
        unit.from_hartree(self.barrier)
    }
}

impl ReactionPath {
    /// Builds a path from state names and energies in `unit`.
    pub fn new(names: Vec<String>, energies: Vec<f64>, unit: EnergyUnit) -> Result<Self> {
        if names.len() != energies.len() {
            return Err(Error::LengthMismatch {
                expected: names.len(),
                found: energies.len(),
            });
        }
        Ok(Self {
            title: None,
            names,
            energies: energies.into_iter().map(|e| unit.to_hartree(e)).collect(),
        })
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Number of states.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// `true` for a path without states.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// State names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Energies in `unit`.
    pub fn energies(&self, unit: EnergyUnit) -> Vec<f64> {
        self.energies.iter().map(|&e| unit.from_hartree(e)).collect()
    }

    /// Energies in `unit` relative to the first state.
    pub fn relative_energies(&self, unit: EnergyUnit) -> Vec<f64> {
        let Some(&base) = self.energies.first() else {
            return Vec::new();
        };
        self.energies
            .iter()
            .map(|&e| unit.from_hartree(e - base))
            .collect()
    }

    /// Largest barrier over the TS and PT states of the path.
    ///
    /// `None` when the path holds no TS or PT after its first state.
    pub fn rate_limiting_step(&self) -> Option<RateLimitingStep> {
        let mut best: Option<(usize, f64)> = None;
        for k in 1..self.names.len() {
            if !is_saddle(&self.names[k]) {
                continue;
            }
            let barrier = self.energies[k] - self.energies[k - 1];
            if best.map_or(true, |(_, b)| barrier > b) {
                best = Some((k, barrier));
            }
        }
        best.map(|(k, barrier)| RateLimitingStep {
            barrier,
            names: self.names[k - 1..(k + 2).min(self.names.len())].to_vec(),
        })
    }
}

fn is_saddle(name: &str) -> bool {
    name.contains("TS") || name.contains("PT")
}

impl fmt::Display for ReactionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(title) = &self.title {
            writeln!(f, "{}", title)?;
        }
        let rel = self.relative_energies(EnergyUnit::KiloJoulePerMol);
        let states: Vec<String> = self
            .names
            .iter()
            .zip(&rel)
            .map(|(n, e)| format!("{}({:.1})", n, e))
            .collect();
        write!(f, "{}", states.join(" -> "))?;
        if let Some(step) = self.rate_limiting_step() {
            write!(
                f,
                "\nEa = {:.1} kJ/mol at {}",
                step.barrier_in(EnergyUnit::KiloJoulePerMol),
                step.names.join("-")
            )?;
        }
        Ok(())
    }
}
