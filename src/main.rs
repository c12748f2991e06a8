//! grrmkit command-line interface.
//!
//! # Usage
//!
//! ```bash
//! # Tabulate the EQ, TS and PT lists of a job (CH4_EQ_list.log, ...)
//! grrmkit summary job/CH4 --com job/CH4.com
//!
//! # Cheapest route from EQ0 to EQ5, and from EQ0 to everything
//! grrmkit path job/CH4 0 5 --pt-policy prefer_lower_energy
//! grrmkit path job/CH4 0 --no-group
//!
//! # Store the parsed and analysed network, then search it directly
//! grrmkit archive job/CH4 ch4.json
//! grrmkit path ch4.json 0 5
//!
//! # Write a settings template
//! grrmkit ci grrmkit.cfg
//! ```
//!
//! Defaults for every option come from `grrmkit.cfg` (see
//! [`grrmkit::settings`]); flags override them.

use grrmkit::archive::{self, Archive};
use grrmkit::grrmdata::GrrmData;
use grrmkit::path_search::{SearchOptions, SearchOutcome};
use grrmkit::settings::{SettingsManager, CONFIG_FILE};
use grrmkit::structure::Kind;
use grrmkit::units::{convert, EnergyUnit};
use log::{debug, warn};
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Flags shared by the data commands.
#[derive(Debug, Default)]
struct CliArgs {
    positional: Vec<String>,
    com: Option<PathBuf>,
    poscar: Option<PathBuf>,
    unit: Option<EnergyUnit>,
    no_group: bool,
    absolute: bool,
    pt_policy: Option<String>,
    priority: Option<i32>,
}

impl CliArgs {
    fn parse(args: &[String]) -> CliResult<Self> {
        let mut parsed = CliArgs::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("{} needs a value", flag))
            };
            match arg.as_str() {
                "--com" => parsed.com = Some(PathBuf::from(value(arg)?)),
                "--poscar" => parsed.poscar = Some(PathBuf::from(value(arg)?)),
                "--unit" => parsed.unit = Some(value(arg)?.parse()?),
                "--pt-policy" => parsed.pt_policy = Some(value(arg)?),
                "--priority" => parsed.priority = Some(value(arg)?.parse()?),
                "--no-group" => parsed.no_group = true,
                "--absolute" => parsed.absolute = true,
                flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag).into()),
                _ => parsed.positional.push(arg.clone()),
            }
        }
        Ok(parsed)
    }

    fn search_options(&self, settings: &SettingsManager) -> CliResult<SearchOptions> {
        let mut options = settings.to_search_options();
        if self.no_group {
            options.group = false;
        }
        if self.absolute {
            options.pseudo_energy = false;
        }
        if let Some(policy) = &self.pt_policy {
            options.pt_policy = policy.parse()?;
        }
        if let Some(priority) = self.priority {
            options.priority = priority;
        }
        Ok(options)
    }
}

fn main() {
    let settings = match SettingsManager::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(settings.logging().level_filter())
        .target(env_logger::Target::Stdout)
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("grrmkit");
    if args.len() < 2 || matches!(args[1].as_str(), "-h" | "--help") {
        print_usage(program);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let result = CliArgs::parse(&args[2..]).and_then(|cli| match args[1].as_str() {
        "summary" => run_summary(&cli, &settings),
        "path" => run_path(&cli, &settings),
        "archive" => run_archive(&cli, &settings),
        "ci" => run_create_settings_template(&cli),
        other => Err(format!("unknown command: {}", other).into()),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_usage(program_name: &str) {
    eprintln!("grrmkit - GRRM reaction network toolkit");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} summary <prefix|archive.json> [--com FILE] [--poscar FILE] [--unit U]", program_name);
    eprintln!("                    Tabulate EQ, TS and PT with energies and groups");
    eprintln!();
    eprintln!("  {} path <prefix|archive.json> <ini> [fin]", program_name);
    eprintln!("        [--no-group] [--absolute] [--pt-policy P] [--priority N] [--unit U]");
    eprintln!("                    Cheapest route between EQs (all EQs when fin is omitted)");
    eprintln!();
    eprintln!("  {} archive <prefix> <out.json> [--com FILE] [--poscar FILE]", program_name);
    eprintln!("                    Parse, analyse and store a job as JSON");
    eprintln!();
    eprintln!("  {} ci {}", program_name, CONFIG_FILE);
    eprintln!("                    Create a settings template");
    eprintln!();
    eprintln!("<prefix> names the list logs: <prefix>_EQ_list.log, <prefix>_TS_list.log, <prefix>_PT_list.log");
    eprintln!("Units: hartree, ev, kj/mol, kcal/mol.  Policies: ts_only, prefer_ts, prefer_lower_energy");
}

/// How `load_network` treats the EQ analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Analysis {
    /// Group ids are needed; a failed analysis is an error
    Required,
    /// Group ids are shown when available
    BestEffort,
    /// No group ids are used
    Skip,
}

/// Reads a job from its list logs, or an archive when given a `.json` file,
/// and attaches the EQ analysis as `analysis` asks.
fn load_network(cli: &CliArgs, settings: &SettingsManager, analysis: Analysis) -> CliResult<GrrmData> {
    let source = cli
        .positional
        .first()
        .ok_or("missing job prefix or archive file")?;
    let source = Path::new(source);
    let mut data = if source.extension().is_some_and(|ext| ext == "json") {
        archive::load(source)?.into_grrmdata()?
    } else {
        GrrmData::read_job(source, cli.com.as_deref(), cli.poscar.as_deref())?
    };
    if analysis != Analysis::Skip && !data.eq().has_analysis() {
        match data.attach_analysis(&settings.to_analyzer()) {
            Ok(()) => {}
            Err(e) if analysis == Analysis::BestEffort => {
                warn!("EQ analysis failed, continuing without groups: {}", e);
            }
            Err(e) => return Err(e.into()),
        }
    }
    debug!(
        "Network with {} EQ, {} TS, {} PT",
        data.eq().len(),
        data.ts().len(),
        data.pt().len()
    );
    Ok(data)
}

fn fmt_energy(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |e| format!("{:.6}", e))
}

fn run_summary(cli: &CliArgs, settings: &SettingsManager) -> CliResult<()> {
    let data = load_network(cli, settings, Analysis::BestEffort)?;
    let unit = cli.unit.unwrap_or_else(|| settings.energy_unit());

    println!("{:>6}  {:<8} {:>6}  {:>20}", "node", "name", "group", format!("E ({})", unit));
    for row in data.eq_summary() {
        let group = row.group.map_or_else(|| "-".to_string(), |g| g.to_string());
        let energy = row.energy_hartree.map(|e| unit.from_hartree(e));
        println!("{:>6}  {:<8} {:>6}  {:>20}", row.node, row.name, group, fmt_energy(energy));
    }

    for kind in [Kind::Ts, Kind::Pt] {
        let rows = data.edge_summary(kind)?;
        if rows.is_empty() {
            continue;
        }
        println!();
        println!(
            "{:>6}  {:<8} {:>6} {:>6}  {:>20} {:>14} {:>14}",
            "edge",
            "name",
            "from",
            "to",
            format!("E ({})", unit),
            "forward",
            "reverse"
        );
        for row in rows {
            let to_unit = |kj: Option<f64>| kj.map(|e| convert(e, EnergyUnit::KiloJoulePerMol, unit));
            println!(
                "{:>6}  {:<8} {:>6} {:>6}  {:>20} {:>14} {:>14}",
                row.edge,
                row.name,
                row.source.as_deref().unwrap_or("-"),
                row.target.as_deref().unwrap_or("-"),
                fmt_energy(row.energy_hartree.map(|e| unit.from_hartree(e))),
                fmt_energy(to_unit(row.forward_kj_mol)),
                fmt_energy(to_unit(row.reverse_kj_mol)),
            );
        }
    }
    Ok(())
}

fn run_path(cli: &CliArgs, settings: &SettingsManager) -> CliResult<()> {
    let options = cli.search_options(settings)?;
    let analysis = if options.group { Analysis::Required } else { Analysis::Skip };
    let data = load_network(cli, settings, analysis)?;
    let unit = cli.unit.unwrap_or_else(|| settings.energy_unit());

    let ini: usize = cli.positional.get(1).ok_or("missing initial node")?.parse()?;
    let fin = cli.positional.get(2).map(|s| s.parse::<usize>()).transpose()?;

    let outcomes = data.search_path(ini, fin, &options)?;
    for (target, outcome) in outcomes {
        match outcome {
            SearchOutcome::Found(route) => {
                println!("{}", route.path);
                println!("cost = {:.6} {}", route.cost_in(unit), unit);
                println!();
            }
            SearchOutcome::Unreachable => println!("{} -> {}: unreachable\n", ini, target),
        }
    }
    Ok(())
}

fn run_archive(cli: &CliArgs, settings: &SettingsManager) -> CliResult<()> {
    let out = cli.positional.get(1).ok_or("missing output file")?;
    let data = load_network(cli, settings, Analysis::BestEffort)?;
    archive::save(&Archive::from(&data), Path::new(out))?;
    println!("Archived {} EQ, {} TS, {} PT to {}", data.eq().len(), data.ts().len(), data.pt().len(), out);
    Ok(())
}

fn run_create_settings_template(cli: &CliArgs) -> CliResult<()> {
    let name = cli.positional.first().map(String::as_str).unwrap_or(CONFIG_FILE);
    let settings_path = Path::new(name);

    if settings_path.exists() {
        return Err(format!(
            "{} already exists. Please remove it first or choose a different location.",
            settings_path.display()
        )
        .into());
    }

    SettingsManager::create_template(settings_path)?;
    println!("Settings template created: {}", settings_path.display());
    Ok(())
}
