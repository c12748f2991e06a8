//! Energy units and conversions.
//!
//! GRRM list logs report energies in Hartree, which is the canonical unit of
//! every entity in this crate. All public energy accessors take an
//! [`EnergyUnit`] so that the unit is always explicit at the call site.
//!
//! Conversions are plain scalar multiplications by CODATA 2018 factors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hartree to electronvolt
pub const HARTREE_TO_EV: f64 = 27.211386245988;
/// Hartree to kJ/mol
pub const HARTREE_TO_KJ_PER_MOL: f64 = 2625.4996394799;
/// Hartree to kcal/mol
pub const HARTREE_TO_KCAL_PER_MOL: f64 = 627.5094740631;

/// Energy unit tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnergyUnit {
    /// Hartree (Eh), the native unit of GRRM output
    #[default]
    Hartree,
    /// Electronvolt
    #[serde(rename = "eV")]
    ElectronVolt,
    /// Kilojoule per mole
    #[serde(rename = "kJ/mol")]
    KiloJoulePerMol,
    /// Kilocalorie per mole
    #[serde(rename = "kcal/mol")]
    KiloCaloriePerMol,
}

impl EnergyUnit {
    /// Multiplicative factor taking a Hartree value into this unit.
    pub fn per_hartree(self) -> f64 {
        match self {
            EnergyUnit::Hartree => 1.0,
            EnergyUnit::ElectronVolt => HARTREE_TO_EV,
            EnergyUnit::KiloJoulePerMol => HARTREE_TO_KJ_PER_MOL,
            EnergyUnit::KiloCaloriePerMol => HARTREE_TO_KCAL_PER_MOL,
        }
    }

    /// Converts `value` given in Hartree into this unit.
    pub fn from_hartree(self, value: f64) -> f64 {
        value * self.per_hartree()
    }

    /// Converts `value` given in this unit back to Hartree.
    pub fn to_hartree(self, value: f64) -> f64 {
        value / self.per_hartree()
    }
}

/// Converts `value` from unit `from` into unit `to`.
///
/// # Examples
///
/// ```
/// use grrmkit::units::{convert, EnergyUnit};
///
/// let kj = convert(1.0, EnergyUnit::Hartree, EnergyUnit::KiloJoulePerMol);
/// assert!((kj - 2625.4996394799).abs() < 1e-9);
/// ```
pub fn convert(value: f64, from: EnergyUnit, to: EnergyUnit) -> f64 {
    to.from_hartree(from.to_hartree(value))
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyUnit::Hartree => write!(f, "Hartree"),
            EnergyUnit::ElectronVolt => write!(f, "eV"),
            EnergyUnit::KiloJoulePerMol => write!(f, "kJ/mol"),
            EnergyUnit::KiloCaloriePerMol => write!(f, "kcal/mol"),
        }
    }
}

impl FromStr for EnergyUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hartree" | "eh" | "au" => Ok(EnergyUnit::Hartree),
            "ev" => Ok(EnergyUnit::ElectronVolt),
            "kj/mol" | "kjmol" | "kj" => Ok(EnergyUnit::KiloJoulePerMol),
            "kcal/mol" | "kcalmol" | "kcal" => Ok(EnergyUnit::KiloCaloriePerMol),
            other => Err(format!("unknown energy unit '{}'", other)),
        }
    }
}
