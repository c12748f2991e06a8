use approx::assert_relative_eq;
use grrmkit::analysis::CovalentAnalyzer;
use grrmkit::path_search::{PathSearch, PtPolicy, SearchOptions, SearchOutcome};
use grrmkit::units::EnergyUnit;
use grrmkit::{Connection, Entity, Error, Geometry, GrrmData, Kind, Structures};

fn h2(d: f64) -> Geometry {
    Geometry::new(
        vec!["H".to_string(), "H".to_string()],
        vec![0.0, 0.0, 0.0, 0.0, 0.0, d],
    )
}

fn edges(kind: Kind, list: &[(usize, usize, f64)]) -> Structures {
    let entities = list
        .iter()
        .map(|&(a, b, e)| Entity::new(kind, h2(1.0), Some(e), Some(Connection::new(a, b))))
        .collect();
    Structures::from_entities(kind, entities).unwrap()
}

/// EQ4 is isolated. Pair (0, 2) has both a TS and a lower PT, pair (2, 3)
/// only a PT.
fn network() -> GrrmData {
    let eqs = [0.0, -0.01, -0.02, -0.005, -0.03]
        .iter()
        .map(|&e| Entity::eq(h2(0.74), Some(e)))
        .collect();
    GrrmData::new(
        Structures::from_entities(Kind::Eq, eqs).unwrap(),
        edges(Kind::Ts, &[(0, 1, 0.10), (1, 2, 0.08), (0, 2, 0.12)]),
        edges(Kind::Pt, &[(0, 2, 0.05), (2, 3, 0.03)]),
    )
    .unwrap()
}

fn options(pt_policy: PtPolicy) -> SearchOptions {
    SearchOptions {
        group: false,
        pt_policy,
        ..SearchOptions::default()
    }
}

fn step_names(outcome: &SearchOutcome) -> Vec<String> {
    outcome
        .route()
        .unwrap()
        .steps
        .iter()
        .map(|s| format!("{}{}", s.kind, s.index))
        .collect()
}

#[test]
fn test_isolated_eq_is_unreachable() {
    let data = network();
    let found = data.search_path(0, Some(4), &options(PtPolicy::PreferLowerEnergy)).unwrap();
    assert_eq!(found.len(), 1);
    assert!(matches!(found[&4], SearchOutcome::Unreachable));
}

#[test]
fn test_ts_only_ignores_path_tops() {
    let data = network();
    let search = PathSearch::new(&data, options(PtPolicy::TsOnly)).unwrap();
    assert_eq!(search.edge_count(), 3);

    let to_2 = search.find(0, 2).unwrap();
    assert_eq!(step_names(&to_2), vec!["TS2"]);
    assert_relative_eq!(to_2.route().unwrap().cost, 0.12, epsilon = 1e-12);
    assert!(!search.find(0, 3).unwrap().is_found());
}

#[test]
fn test_prefer_ts_uses_pt_only_where_no_ts() {
    let data = network();
    let search = PathSearch::new(&data, options(PtPolicy::PreferTs)).unwrap();

    assert_eq!(step_names(&search.find(0, 2).unwrap()), vec!["TS2"]);
    let to_3 = search.find(0, 3).unwrap();
    assert_eq!(step_names(&to_3), vec!["TS2", "PT1"]);
    let route = to_3.route().unwrap();
    assert_eq!(route.nodes, vec![0, 2, 3]);
    assert_relative_eq!(route.cost, 0.12 + 0.05, epsilon = 1e-12);
    assert_eq!(route.path.names(), &["EQ0", "TS2", "EQ2", "PT1", "EQ3"]);
}

#[test]
fn test_prefer_lower_energy_picks_the_pt() {
    let data = network();
    let search = PathSearch::new(&data, options(PtPolicy::PreferLowerEnergy)).unwrap();
    let to_3 = search.find(0, 3).unwrap();
    assert_eq!(step_names(&to_3), vec!["PT0", "PT1"]);
    assert_relative_eq!(to_3.route().unwrap().cost, 0.10, epsilon = 1e-12);
}

#[test]
fn test_absolute_costs() {
    let data = network();
    let search = PathSearch::new(
        &data,
        SearchOptions {
            pseudo_energy: false,
            ..options(PtPolicy::TsOnly)
        },
    )
    .unwrap();
    // Lowest state in the graph is EQ2 at -0.02.
    let to_2 = search.find(0, 2).unwrap();
    assert_relative_eq!(to_2.route().unwrap().cost, 0.14, epsilon = 1e-12);
    let back = search.find(2, 0).unwrap();
    assert_relative_eq!(back.route().unwrap().cost, 0.14, epsilon = 1e-12);
}

#[test]
fn test_barriers_depend_on_direction() {
    let data = network();
    let search = PathSearch::new(&data, options(PtPolicy::TsOnly)).unwrap();
    let forward = search.find(0, 1).unwrap();
    let reverse = search.find(1, 0).unwrap();
    assert_relative_eq!(forward.route().unwrap().cost, 0.10, epsilon = 1e-12);
    assert_relative_eq!(reverse.route().unwrap().cost, 0.11, epsilon = 1e-12);
}

#[test]
fn test_find_all_covers_every_other_node() {
    let data = network();
    let all = data.search_path(0, None, &options(PtPolicy::PreferTs)).unwrap();
    assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert!(all[&3].is_found());
    assert!(!all[&4].is_found());
    let route = all[&1].route().unwrap();
    assert_relative_eq!(route.cost_in(EnergyUnit::Hartree), 0.10, epsilon = 1e-12);
}

#[test]
fn test_bad_node_is_an_index_error() {
    let data = network();
    assert!(matches!(
        data.search_path(0, Some(9), &options(PtPolicy::PreferTs)),
        Err(Error::Index { index: 9, len: 5 })
    ));
}

#[test]
fn test_missing_edge_energy_is_a_precondition_error() {
    let mut data = network();
    data.push_edge(Entity::ts(h2(1.0), None, Connection::new(3, 4))).unwrap();
    assert!(matches!(
        PathSearch::new(&data, options(PtPolicy::TsOnly)),
        Err(Error::Precondition(_))
    ));
}

/// EQ0 and EQ1 are both bonded H2, EQ2 is two separate atoms.
fn grouped_network() -> GrrmData {
    let eqs = vec![
        Entity::eq(h2(0.74), Some(0.0)),
        Entity::eq(h2(0.76), Some(-0.01)),
        Entity::eq(h2(3.0), Some(0.02)),
    ];
    GrrmData::new(
        Structures::from_entities(Kind::Eq, eqs).unwrap(),
        edges(Kind::Ts, &[(0, 1, 0.05), (1, 2, 0.10)]),
        Structures::new(Kind::Pt),
    )
    .unwrap()
}

#[test]
fn test_group_mode_needs_analysis() {
    let data = grouped_network();
    assert!(matches!(
        data.search_path(0, Some(1), &SearchOptions::default()),
        Err(Error::Precondition(_))
    ));
}

#[test]
fn test_group_mode_moves_freely_inside_a_group() {
    let mut data = grouped_network();
    data.attach_analysis(&CovalentAnalyzer::default()).unwrap();
    assert_eq!(data.eq().group().unwrap(), &[Some(0), Some(0), Some(1)]);

    let search = PathSearch::new(&data, SearchOptions::default()).unwrap();
    assert_eq!(search.node_count(), 2);
    assert_eq!(search.edge_count(), 1);
    assert_eq!(search.members(0), Some(&[0, 1][..]));

    let outcome = search.find(0, 1).unwrap();
    let route = outcome.route().unwrap();
    assert_eq!(step_names(&outcome), vec!["TS1"]);
    assert_relative_eq!(route.cost, 0.11, epsilon = 1e-12);
    assert_eq!(route.path.title.as_deref(), Some("group 0 -> group 1"));
    assert_eq!(route.path.names(), &["EQ1", "TS1", "EQ2"]);
}

/// Two bonded H2 (group 0) and two dissociated pairs (group 1).
fn two_group_network(ts: &[(usize, usize, f64)], pt: &[(usize, usize, f64)]) -> GrrmData {
    let eqs = vec![
        Entity::eq(h2(0.74), Some(0.0)),
        Entity::eq(h2(0.76), Some(0.45)),
        Entity::eq(h2(3.0), Some(0.30)),
        Entity::eq(h2(3.1), Some(0.35)),
    ];
    let mut data = GrrmData::new(
        Structures::from_entities(Kind::Eq, eqs).unwrap(),
        edges(Kind::Ts, ts),
        edges(Kind::Pt, pt),
    )
    .unwrap();
    data.attach_analysis(&CovalentAnalyzer::default()).unwrap();
    data
}

#[test]
fn test_group_mode_relaxes_every_edge_between_two_groups() {
    let data = two_group_network(&[(0, 2, 0.50), (1, 3, 0.60)], &[]);
    assert_eq!(data.eq().group().unwrap(), &[Some(0), Some(0), Some(1), Some(1)]);

    let search = PathSearch::new(&data, SearchOptions::default()).unwrap();
    assert_eq!(search.node_count(), 2);
    assert_eq!(search.edge_count(), 2);

    // TS0 is lower in energy, but leaving EQ1 through TS1 costs less.
    let outcome = search.find(0, 1).unwrap();
    assert_eq!(step_names(&outcome), vec!["TS1"]);
    let route = outcome.route().unwrap();
    assert_relative_eq!(route.cost, 0.15, epsilon = 1e-12);
    assert_eq!((route.steps[0].from_eq, route.steps[0].to_eq), (1, 3));
    assert_eq!(route.path.names(), &["EQ1", "TS1", "EQ3"]);
}

#[test]
fn test_group_mode_applies_pt_policy_per_eq_pair() {
    // No TS joins EQ1 and EQ3, so their PT survives PreferTs even though
    // TS0 joins the same two groups.
    let data = two_group_network(&[(0, 2, 0.50)], &[(1, 3, 0.46)]);

    let search = PathSearch::new(&data, SearchOptions::default()).unwrap();
    assert_eq!(search.edge_count(), 2);
    let outcome = search.find(0, 1).unwrap();
    assert_eq!(step_names(&outcome), vec!["PT0"]);
    assert_relative_eq!(outcome.route().unwrap().cost, 0.01, epsilon = 1e-12);

    let ts_only = PathSearch::new(
        &data,
        SearchOptions {
            pt_policy: PtPolicy::TsOnly,
            ..SearchOptions::default()
        },
    )
    .unwrap();
    assert_eq!(ts_only.edge_count(), 1);
    assert_eq!(step_names(&ts_only.find(0, 1).unwrap()), vec!["TS0"]);
}

#[test]
fn test_ungrouped_search_needs_no_analysis() {
    // Dummy atoms have no covalent radius, so grouping is impossible.
    let dummy = || Geometry::new(vec!["X".to_string()], vec![0.0; 3]);
    let eqs = vec![Entity::eq(dummy(), Some(0.0)), Entity::eq(dummy(), Some(-0.02))];
    let ts = vec![Entity::ts(dummy(), Some(0.04), Connection::new(0, 1))];
    let mut data = GrrmData::new(
        Structures::from_entities(Kind::Eq, eqs).unwrap(),
        Structures::from_entities(Kind::Ts, ts).unwrap(),
        Structures::new(Kind::Pt),
    )
    .unwrap();
    assert!(data.attach_analysis(&CovalentAnalyzer::default()).is_err());
    assert!(!data.eq().has_analysis());

    let found = data.search_path(1, Some(0), &options(PtPolicy::PreferTs)).unwrap();
    assert_relative_eq!(found[&0].route().unwrap().cost, 0.06, epsilon = 1e-12);
}
