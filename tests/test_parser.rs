use grrmkit::io::write_list_log;
use grrmkit::parser::ListLog;
use grrmkit::{Connection, Endpoint, Error, GrrmData, Kind, Structures};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Renders one list-log block in GRRM layout.
fn block(kind: Kind, index: usize, atoms: &[(&str, [f64; 3])], energy: f64, connection: Option<&str>) -> String {
    let mut text = format!("# Geometry of {} {}, SYMMETRY = C1\n", kind, index);
    for (symbol, [x, y, z]) in atoms {
        text.push_str(&format!("{:<2}  {:>18.12}  {:>18.12}  {:>18.12}\n", symbol, x, y, z));
    }
    text.push_str(&format!("Energy    = {:.12} ({:.12} :  0.000000000000)\n", energy, energy));
    text.push_str("Spin(**2) =   0.000000000000\n");
    text.push_str("ZPVE      =   0.010517258419\n");
    text.push_str("Normal mode eigenvalues : nmode = 3\n");
    text.push_str("  0.012345678   0.023456789   0.034567890\n");
    if let Some(c) = connection {
        text.push_str(&format!("CONNECTION : {}\n", c));
    }
    text.push('\n');
    text
}

fn water(d: f64) -> Vec<(&'static str, [f64; 3])> {
    vec![
        ("O", [0.0, 0.0, 0.0]),
        ("H", [0.0, 0.757, d]),
        ("H", [0.0, -0.757, 0.587]),
    ]
}

fn write_job(dir: &Path) {
    let mut eq = format!("{}\n\n", Kind::Eq.header());
    for (i, e) in [-76.41, -76.35, -76.30].iter().enumerate() {
        eq.push_str(&block(Kind::Eq, i, &water(0.587 + 0.1 * i as f64), *e, None));
    }
    fs::write(dir.join("H2O_EQ_list.log"), eq).unwrap();

    let mut ts = format!("{}\n\n", Kind::Ts.header());
    ts.push_str(&block(Kind::Ts, 0, &water(0.9), -76.20, Some("0 - 1")));
    ts.push_str(&block(Kind::Ts, 1, &water(1.2), -76.10, Some("2 - DC")));
    fs::write(dir.join("H2O_TS_list.log"), ts).unwrap();
}

#[test]
fn test_read_eq_list_from_file() {
    let dir = tempdir().unwrap();
    write_job(dir.path());
    let path = dir.path().join("H2O_EQ_list.log");

    let eqs = Structures::read_eq(&path).unwrap();
    assert_eq!(eqs.len(), 3);
    assert_eq!(eqs.log(), &[path.clone()]);
    assert_eq!(eqs.kind(), Kind::Eq);
    let energies = eqs.energies(grrmkit::units::EnergyUnit::Hartree);
    assert_eq!(energies, vec![Some(-76.41), Some(-76.35), Some(-76.30)]);

    let geometry = eqs.entity(2).unwrap().geometry();
    assert_eq!(geometry.elements, vec!["O", "H", "H"]);
    assert!((geometry.get_atom_coords(1)[2] - 0.787).abs() < 1e-12);
}

#[test]
fn test_wrong_list_kind_names_the_likely_one() {
    let dir = tempdir().unwrap();
    write_job(dir.path());
    let err = Structures::read_eq(&dir.path().join("H2O_TS_list.log")).unwrap_err();
    match err {
        Error::Format { expected, likely } => {
            assert_eq!(expected, Kind::Eq);
            assert_eq!(likely, Some(Kind::Ts));
        }
        other => panic!("expected a format error, got {:?}", other),
    }
}

#[test]
fn test_mixed_atom_counts_are_rejected() {
    let mut text = format!("{}\n\n", Kind::Eq.header());
    text.push_str(&block(Kind::Eq, 0, &water(0.587), -76.41, None));
    text.push_str(&block(Kind::Eq, 1, &water(0.587)[..2], -75.90, None));
    assert!(matches!(
        ListLog::parse(&text, Kind::Eq),
        Err(Error::Parse { .. })
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Structures::read_eq(&dir.path().join("nothing_EQ_list.log")),
        Err(Error::Io { .. })
    ));
}

#[test]
fn test_read_job_without_pt_list() {
    let dir = tempdir().unwrap();
    write_job(dir.path());
    let com = dir.path().join("H2O.com");
    fs::write(
        &com,
        "#MIN/B3LYP/6-31G\n\n0 1\nO 0 0 0\nFrozen Atoms\nAr  5.0  0.0  0.0\nAr -5.0  0.0  0.0\nOptions\n",
    )
    .unwrap();

    let data = GrrmData::read_job(&dir.path().join("H2O"), Some(&com), None).unwrap();
    assert_eq!((data.eq().len(), data.ts().len(), data.pt().len()), (3, 2, 0));

    let ts0 = data.ts().entity(0).unwrap();
    assert_eq!((ts0.ini_eq(), ts0.fin_eq()), (Some(0), Some(1)));
    let ts1 = data.ts().entity(1).unwrap();
    assert_eq!(ts1.connection().unwrap().fin, Endpoint::Unresolved("DC".to_string()));
    assert_eq!(ts1.fin_eq(), None);

    assert_eq!(data.frozen_atoms().unwrap().num_atoms, 2);
    assert_eq!(data.eq().entity(0).unwrap().get_atoms(true).num_atoms, 5);
    assert_eq!(data.ts().entity(1).unwrap().get_atoms(false).num_atoms, 3);
}

#[test]
fn test_written_list_reads_back() {
    let dir = tempdir().unwrap();
    write_job(dir.path());
    let ts = Structures::read_ts(&dir.path().join("H2O_TS_list.log")).unwrap();

    let copy = dir.path().join("copy_TS_list.log");
    write_list_log(&ts, &copy).unwrap();
    let again = Structures::read_ts(&copy).unwrap();

    assert_eq!(again.connections(), ts.connections());
    assert_eq!(
        again.connections()[0],
        Some(Connection::new(0, 1))
    );
    for (a, b) in again.iter_present().zip(ts.iter_present()) {
        assert_eq!(a.1.energy(), b.1.energy());
        assert_eq!(a.1.geometry(), b.1.geometry());
    }
}
