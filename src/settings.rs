//! Configuration management for grrmkit.
//!
//! Defaults for path search, bond perception, output units and logging can be
//! set in INI-format configuration files. Files are looked up in this order,
//! each later (more local) file overriding the keys it sets:
//!
//! 1. System configuration (`/etc/grrmkit/grrmkit.cfg`)
//! 2. User configuration (`~/.config/grrmkit/grrmkit.cfg`)
//! 3. Local configuration (`./grrmkit.cfg`)
//!
//! Keys set nowhere keep their built-in defaults.
//!
//! # Configuration File Format
//!
//! ```ini
//! [search]
//! group = true
//! pt_policy = prefer_ts
//! pseudo_energy = true
//! priority = 0
//!
//! [analysis]
//! bond_mult = 1.0
//! skin = 0.3
//!
//! [output]
//! energy_unit = kj/mol
//!
//! [logging]
//! level = info
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use grrmkit::settings::SettingsManager;
//!
//! let settings = SettingsManager::load()?;
//! let options = settings.to_search_options();
//! println!("searching with {} PT handling", options.pt_policy);
//! # Ok::<(), grrmkit::settings::ConfigError>(())
//! ```

use crate::analysis::CovalentAnalyzer;
use crate::path_search::{PtPolicy, SearchOptions};
use crate::units::EnergyUnit;
use configparser::ini::Ini;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file in every lookup location.
pub const CONFIG_FILE: &str = "grrmkit.cfg";

type Section = HashMap<String, Option<String>>;

/// Errors that can occur during configuration loading and processing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing configuration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// INI parsing error
    #[error("INI parsing error: {0}")]
    IniParse(String),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// All program settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Path search defaults
    pub search: SearchSettings,
    /// Bond perception
    pub analysis: AnalysisSettings,
    /// Report formatting
    pub output: OutputSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// `[search]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Treat equivalent EQs as one node (default: true)
    pub group: bool,
    /// PT handling (default: prefer_ts)
    pub pt_policy: PtPolicy,
    /// Barrier-based edge costs (default: true)
    pub pseudo_energy: bool,
    /// Secondary queue key (default: 0)
    pub priority: i32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let options = SearchOptions::default();
        Self {
            group: options.group,
            pt_policy: options.pt_policy,
            pseudo_energy: options.pseudo_energy,
            priority: options.priority,
        }
    }
}

/// `[analysis]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Multiplier on summed covalent radii (default: 1.0)
    pub bond_mult: f64,
    /// Added to every bond cutoff, Angstrom (default: 0.3)
    pub skin: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let analyzer = CovalentAnalyzer::default();
        Self {
            bond_mult: analyzer.mult,
            skin: analyzer.skin,
        }
    }
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Unit for reported energies (default: kJ/mol)
    pub energy_unit: EnergyUnit,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            energy_unit: EnergyUnit::KiloJoulePerMol,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (default: "info")
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    /// Level filter for `env_logger`; unknown names fall back to `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Loaded settings together with where they came from.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings: Settings,
    config_source: String,
}

impl SettingsManager {
    /// Loads configuration from the standard locations.
    ///
    /// A file that exists but cannot be parsed is skipped with a warning; the
    /// remaining sources still apply.
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        let mut config_source = "built-in defaults".to_string();

        let candidates = [
            ("system", Self::get_system_config_path()),
            ("user", Self::get_user_config_path()),
            ("local", Some(PathBuf::from(CONFIG_FILE))),
        ];
        for (scope, path) in candidates {
            let Some(path) = path.filter(|p| p.exists()) else {
                continue;
            };
            // Parse into a copy so a bad file leaves no partial overrides.
            let mut layered = settings.clone();
            match Self::apply_file(&path, &mut layered) {
                Ok(()) => {
                    settings = layered;
                    config_source = format!("{} config ({})", scope, path.display());
                    debug!("Loaded {} configuration from: {}", scope, path.display());
                }
                Err(e) => {
                    warn!("Failed to load {} config from {}: {}", scope, path.display(), e);
                }
            }
        }

        info!("Configuration loaded from: {}", config_source);
        Ok(Self {
            settings,
            config_source,
        })
    }

    /// Loads one configuration file over the built-in defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        Self::apply_file(path, &mut settings)?;
        Ok(Self {
            settings,
            config_source: format!("file ({})", path.display()),
        })
    }

    /// Parses INI text over the built-in defaults.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        Self::apply_ini(content, &mut settings)?;
        Ok(Self {
            settings,
            config_source: "inline".to_string(),
        })
    }

    /// Returns the source of the loaded configuration.
    pub fn config_source(&self) -> &str {
        &self.config_source
    }

    /// Gets a reference to the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Gets the logging settings.
    pub fn logging(&self) -> &LoggingSettings {
        &self.settings.logging
    }

    /// Unit for reported energies.
    pub fn energy_unit(&self) -> EnergyUnit {
        self.settings.output.energy_unit
    }

    /// Search options built from `[search]`.
    pub fn to_search_options(&self) -> SearchOptions {
        let search = &self.settings.search;
        SearchOptions {
            group: search.group,
            pt_policy: search.pt_policy,
            priority: search.priority,
            pseudo_energy: search.pseudo_energy,
        }
    }

    /// Bond analyzer built from `[analysis]`.
    pub fn to_analyzer(&self) -> CovalentAnalyzer {
        CovalentAnalyzer {
            mult: self.settings.analysis.bond_mult,
            skin: self.settings.analysis.skin,
            ..CovalentAnalyzer::default()
        }
    }

    fn apply_file(path: &Path, settings: &mut Settings) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::apply_ini(&content, settings)
    }

    fn apply_ini(content: &str, settings: &mut Settings) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        let map = ini
            .read(content.to_string())
            .map_err(|e| ConfigError::IniParse(format!("Failed to parse INI: {}", e)))?;

        if let Some(section) = map.get("search") {
            Self::parse_search(section, &mut settings.search)?;
        }
        if let Some(section) = map.get("analysis") {
            Self::parse_analysis(section, &mut settings.analysis)?;
        }
        if let Some(section) = map.get("output") {
            Self::parse_output(section, &mut settings.output)?;
        }
        if let Some(section) = map.get("logging") {
            if let Some(Some(level)) = section.get("level") {
                settings.logging.level = level.clone();
            }
        }
        Ok(())
    }

    fn parse_search(section: &Section, search: &mut SearchSettings) -> Result<(), ConfigError> {
        if let Some(Some(group)) = section.get("group") {
            search.group = parse_bool("group", group)?;
        }
        if let Some(Some(policy)) = section.get("pt_policy") {
            search.pt_policy = policy.parse().map_err(ConfigError::InvalidValue)?;
        }
        if let Some(Some(pseudo)) = section.get("pseudo_energy") {
            search.pseudo_energy = parse_bool("pseudo_energy", pseudo)?;
        }
        if let Some(Some(priority)) = section.get("priority") {
            search.priority = priority.trim().parse().map_err(|_| {
                ConfigError::InvalidValue(format!("Invalid priority: {}", priority))
            })?;
        }
        Ok(())
    }

    fn parse_analysis(section: &Section, analysis: &mut AnalysisSettings) -> Result<(), ConfigError> {
        if let Some(Some(mult)) = section.get("bond_mult") {
            analysis.bond_mult = parse_positive("bond_mult", mult)?;
        }
        if let Some(Some(skin)) = section.get("skin") {
            let value: f64 = skin
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("Invalid skin: {}", skin)))?;
            if value < 0.0 {
                return Err(ConfigError::InvalidValue(format!("Negative skin: {}", skin)));
            }
            analysis.skin = value;
        }
        Ok(())
    }

    fn parse_output(section: &Section, output: &mut OutputSettings) -> Result<(), ConfigError> {
        if let Some(Some(unit)) = section.get("energy_unit") {
            output.energy_unit = unit.parse().map_err(ConfigError::InvalidValue)?;
        }
        Ok(())
    }

    fn get_system_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            Some(PathBuf::from("/etc/grrmkit").join(CONFIG_FILE))
        }
        #[cfg(windows)]
        {
            std::env::var("PROGRAMDATA")
                .ok()
                .map(|pd| PathBuf::from(pd).join("grrmkit").join(CONFIG_FILE))
        }
    }

    fn get_user_config_path() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config").join("grrmkit").join(CONFIG_FILE))
        }
        #[cfg(windows)]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|appdata| PathBuf::from(appdata).join("grrmkit").join(CONFIG_FILE))
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("Invalid {} value: {}", key, value))),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<f64, ConfigError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v > 0.0 => Ok(v),
        _ => Err(ConfigError::InvalidValue(format!("Invalid {}: {}", key, value))),
    }
}

impl SettingsManager {
    /// Writes a commented configuration file holding every option at its
    /// default value.
    pub fn create_template(path: &Path) -> Result<(), ConfigError> {
        fs::write(path, Self::generate_template_content())?;
        info!("Created settings template at: {}", path.display());
        Ok(())
    }

    fn generate_template_content() -> String {
        let defaults = Settings::default();
        format!(
            r#"# grrmkit configuration file
#
# Looked up in /etc/grrmkit/, ~/.config/grrmkit/ and the working directory.
# Later files override earlier ones key by key.

[search]
# Merge EQs with the same bonding graph into one node
group = {}
# How PT edges compete with TS edges: ts_only, prefer_ts, prefer_lower_energy
pt_policy = {}
# true: cost is the barrier from the departing EQ; false: energy above the lowest state
pseudo_energy = {}
# Secondary key of the search queue
priority = {}

[analysis]
# Atoms i and j are bonded when d < bond_mult * (r_i + r_j) + skin
bond_mult = {}
# Angstrom
skin = {}

[output]
# hartree, ev, kj/mol or kcal/mol
energy_unit = {}

[logging]
# error, warn, info, debug or trace
level = {}
"#,
            defaults.search.group,
            defaults.search.pt_policy,
            defaults.search.pseudo_energy,
            defaults.search.priority,
            defaults.analysis.bond_mult,
            defaults.analysis.skin,
            defaults.output.energy_unit,
            defaults.logging.level,
        )
    }
}
