//! Shortest reaction paths through a GRRM network.
//!
//! Nodes are EQ indices or, in group mode, group ids of structurally
//! equivalent EQs. Every TS (and, depending on [`PtPolicy`], PT) whose two
//! endpoints are resolved and distinct becomes an edge that can be crossed in
//! both directions.
//!
//! # Edge selection
//!
//! When several TS connect the same pair of EQs, the lowest-energy one
//! represents the pair; the same holds for PT. The policy then decides
//! between the TS and the PT candidate of each EQ pair:
//!
//! | Policy | Both exist | Only PT |
//! |---|---|---|
//! | `TsOnly` | TS | no edge |
//! | `PreferTs` | TS | PT |
//! | `PreferLowerEnergy` | lower energy, TS on ties | PT |
//!
//! In group mode the surviving edges are mapped onto group nodes as they
//! are. Two groups may then be joined by several edges leaving from
//! different member EQs; the search relaxes all of them.
//!
//! # Cost
//!
//! With `pseudo_energy` the cost of crossing an edge from EQ `a` is the
//! barrier `E_edge - E_a`, clamped at zero. Without it the cost is
//! `E_edge - E_min`, with `E_min` the lowest energy of any entity in the
//! graph. Path cost is the sum of step costs, so both variants stay
//! non-negative and Dijkstra applies.
//!
//! # Ties
//!
//! Costs within `1e-12` Hartree are equal. Among equal-cost paths the one
//! with fewer steps wins, then the one whose predecessor was settled first.
//! Heap entries are ordered by `(cost, priority, steps, node)`.

use crate::analysis::clusters;
use crate::error::{Error, Result};
use crate::grrmdata::GrrmData;
use crate::reaction_path::ReactionPath;
use crate::structure::Kind;
use crate::units::EnergyUnit;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::str::FromStr;

const COST_TOLERANCE: f64 = 1e-12;

/// How PT edges are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtPolicy {
    /// Ignore PT entirely
    TsOnly,
    /// Use a PT only where no TS connects the pair
    #[default]
    PreferTs,
    /// Use whichever of TS and PT is lower in energy
    PreferLowerEnergy,
}

impl fmt::Display for PtPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PtPolicy::TsOnly => write!(f, "ts_only"),
            PtPolicy::PreferTs => write!(f, "prefer_ts"),
            PtPolicy::PreferLowerEnergy => write!(f, "prefer_lower_energy"),
        }
    }
}

impl FromStr for PtPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ts_only" | "0" => Ok(PtPolicy::TsOnly),
            "prefer_ts" | "1" => Ok(PtPolicy::PreferTs),
            "prefer_lower_energy" | "2" => Ok(PtPolicy::PreferLowerEnergy),
            other => Err(format!("unknown pt policy '{}'", other)),
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Coalesce equivalent EQs into one node
    pub group: bool,
    /// PT edge selection
    pub pt_policy: PtPolicy,
    /// Secondary ordering key, lower first
    pub priority: i32,
    /// Cost edges by barrier instead of absolute energy
    pub pseudo_energy: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            group: true,
            pt_policy: PtPolicy::PreferTs,
            priority: 0,
            pseudo_energy: true,
        }
    }
}

/// One crossing of a TS or PT.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// TS or PT
    pub kind: Kind,
    /// Position in its list
    pub index: usize,
    /// EQ the step leaves
    pub from_eq: usize,
    /// EQ the step arrives at
    pub to_eq: usize,
    /// Cost of the step in Hartree
    pub cost: f64,
}

/// A path found by the search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    /// Nodes visited, `ini` first
    pub nodes: Vec<usize>,
    /// Edges crossed
    pub steps: Vec<Step>,
    /// Total cost in Hartree
    pub cost: f64,
    /// Energy profile of the route
    pub path: ReactionPath,
}

impl Route {
    /// Total cost in `unit`.
    pub fn cost_in(&self, unit: EnergyUnit) -> f64 {
        unit.from_hartree(self.cost)
    }
}

/// Result of a search between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SearchOutcome {
    /// A cheapest route
    Found(Route),
    /// No route connects the nodes
    Unreachable,
}

impl SearchOutcome {
    /// `true` when a route exists.
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found(_))
    }

    /// The route, if any.
    pub fn route(&self) -> Option<&Route> {
        match self {
            SearchOutcome::Found(route) => Some(route),
            SearchOutcome::Unreachable => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    kind: Kind,
    index: usize,
    energy: f64,
    eq: [usize; 2],
    eq_energy: [f64; 2],
    node: [usize; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    priority: i32,
    steps: usize,
    node: usize,
}

impl Eq for State {}

// Reversed so that BinaryHeap pops the smallest key.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.steps.cmp(&self.steps))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reaction graph built from a [`GrrmData`] under fixed options.
#[derive(Debug, Clone)]
pub struct PathSearch<'a> {
    data: &'a GrrmData,
    options: SearchOptions,
    members: Vec<Vec<usize>>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<(usize, usize)>>,
    e_min: f64,
}

impl<'a> PathSearch<'a> {
    /// Builds the graph.
    ///
    /// Fails when group mode is requested without an attached EQ analysis,
    /// or when an entity taking part in an edge has no energy.
    pub fn new(data: &'a GrrmData, options: SearchOptions) -> Result<Self> {
        let eqs = data.eq();
        let (node_of, members): (Vec<Option<usize>>, Vec<Vec<usize>>) = if options.group {
            let groups = eqs.group()?.to_vec();
            let members = clusters(&groups);
            (groups, members)
        } else {
            let node_of = (0..eqs.len()).map(Some).collect();
            let members = (0..eqs.len()).map(|i| vec![i]).collect();
            (node_of, members)
        };

        // Cheapest TS and PT per unordered EQ pair.
        let mut candidates: BTreeMap<(usize, usize), [Option<Edge>; 2]> = BTreeMap::new();
        let mut lists = vec![(data.ts(), 0)];
        if options.pt_policy != PtPolicy::TsOnly {
            lists.push((data.pt(), 1));
        }
        for (list, slot) in lists {
            for (index, entity) in list.iter_present() {
                let Some((a, b)) = entity.connection().and_then(|c| c.indices()) else {
                    debug!("{} has an unresolved endpoint, no edge", entity.label(index));
                    continue;
                };
                if a == b {
                    continue;
                }
                let energy = entity.energy().ok_or_else(|| {
                    Error::precondition(format!("{} has no energy", entity.label(index)))
                })?;
                let eq_energy = [eq_energy(data, a)?, eq_energy(data, b)?];
                let node = [endpoint_node(&node_of, a)?, endpoint_node(&node_of, b)?];
                if node[0] == node[1] {
                    continue;
                }
                let edge = Edge {
                    kind: list.kind(),
                    index,
                    energy,
                    eq: [a, b],
                    eq_energy,
                    node,
                };
                let key = (a.min(b), a.max(b));
                let entry = &mut candidates.entry(key).or_insert([None, None])[slot];
                if entry.as_ref().map_or(true, |e| energy < e.energy) {
                    *entry = Some(edge);
                }
            }
        }

        let edges: Vec<Edge> = candidates
            .into_values()
            .filter_map(|[ts, pt]| match (ts, pt, options.pt_policy) {
                (Some(ts), _, PtPolicy::TsOnly | PtPolicy::PreferTs) => Some(ts),
                (Some(ts), Some(pt), PtPolicy::PreferLowerEnergy) => {
                    Some(if pt.energy < ts.energy { pt } else { ts })
                }
                (Some(ts), None, PtPolicy::PreferLowerEnergy) => Some(ts),
                (None, pt, _) => pt,
            })
            .collect();

        let e_min = edges
            .iter()
            .flat_map(|e| [e.energy, e.eq_energy[0], e.eq_energy[1]])
            .fold(f64::INFINITY, f64::min);

        let mut adjacency = vec![Vec::new(); members.len()];
        for (id, edge) in edges.iter().enumerate() {
            adjacency[edge.node[0]].push((id, 0));
            adjacency[edge.node[1]].push((id, 1));
        }

        debug!(
            "Reaction graph: {} nodes, {} edges (group={}, pt_policy={}, pseudo_energy={})",
            members.len(),
            edges.len(),
            options.group,
            options.pt_policy,
            options.pseudo_energy
        );

        Ok(Self {
            data,
            options,
            members,
            edges,
            adjacency,
            e_min,
        })
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.members.len()
    }

    /// Number of edges after policy selection.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// EQ indices behind each node.
    pub fn members(&self, node: usize) -> Option<&[usize]> {
        self.members.get(node).map(Vec::as_slice)
    }

    // Cost of crossing `edge` leaving from endpoint `side`.
    fn step_cost(&self, edge: &Edge, side: usize) -> f64 {
        if self.options.pseudo_energy {
            (edge.energy - edge.eq_energy[side]).max(0.0)
        } else {
            edge.energy - self.e_min
        }
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if node >= self.node_count() {
            return Err(Error::Index {
                index: node,
                len: self.node_count(),
            });
        }
        Ok(())
    }

    // Single-source Dijkstra. prev[v] = (edge id, side the edge was entered from).
    fn dijkstra(&self, ini: usize) -> (Vec<f64>, Vec<Option<(usize, usize)>>) {
        let n = self.node_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut steps = vec![usize::MAX; n];
        let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
        let mut settled = vec![false; n];
        let mut heap = BinaryHeap::new();

        dist[ini] = 0.0;
        steps[ini] = 0;
        heap.push(State {
            cost: 0.0,
            priority: self.options.priority,
            steps: 0,
            node: ini,
        });

        while let Some(State { node, .. }) = heap.pop() {
            if settled[node] {
                continue;
            }
            settled[node] = true;
            for &(id, side) in &self.adjacency[node] {
                let edge = &self.edges[id];
                let next = edge.node[1 - side];
                if settled[next] {
                    continue;
                }
                let cost = dist[node] + self.step_cost(edge, side);
                let n_steps = steps[node] + 1;
                let better = cost < dist[next] - COST_TOLERANCE
                    || ((cost - dist[next]).abs() <= COST_TOLERANCE && n_steps < steps[next]);
                if better {
                    dist[next] = cost;
                    steps[next] = n_steps;
                    prev[next] = Some((id, side));
                    heap.push(State {
                        cost,
                        priority: self.options.priority,
                        steps: n_steps,
                        node: next,
                    });
                }
            }
        }
        (dist, prev)
    }

    /// Cheapest route from `ini` to `fin`.
    pub fn find(&self, ini: usize, fin: usize) -> Result<SearchOutcome> {
        self.check_node(ini)?;
        self.check_node(fin)?;
        let (dist, prev) = self.dijkstra(ini);
        self.outcome(ini, fin, &dist, &prev)
    }

    /// Cheapest route from `ini` to every other node.
    pub fn find_all(&self, ini: usize) -> Result<BTreeMap<usize, SearchOutcome>> {
        self.check_node(ini)?;
        let (dist, prev) = self.dijkstra(ini);
        (0..self.node_count())
            .filter(|&fin| fin != ini)
            .map(|fin| Ok((fin, self.outcome(ini, fin, &dist, &prev)?)))
            .collect()
    }

    fn outcome(
        &self,
        ini: usize,
        fin: usize,
        dist: &[f64],
        prev: &[Option<(usize, usize)>],
    ) -> Result<SearchOutcome> {
        if !dist[fin].is_finite() {
            return Ok(SearchOutcome::Unreachable);
        }
        let mut hops = Vec::new();
        let mut node = fin;
        while node != ini {
            let (id, side) = prev[node].ok_or_else(|| {
                Error::precondition(format!("broken predecessor chain at node {}", node))
            })?;
            hops.push((id, side));
            node = self.edges[id].node[side];
        }
        hops.reverse();

        let mut nodes = vec![ini];
        let mut steps = Vec::with_capacity(hops.len());
        for &(id, side) in &hops {
            let edge = &self.edges[id];
            nodes.push(edge.node[1 - side]);
            steps.push(Step {
                kind: edge.kind,
                index: edge.index,
                from_eq: edge.eq[side],
                to_eq: edge.eq[1 - side],
                cost: self.step_cost(edge, side),
            });
        }
        let path = self.profile(ini, fin, &steps)?;
        Ok(SearchOutcome::Found(Route {
            nodes,
            steps,
            cost: dist[fin],
            path,
        }))
    }

    fn profile(&self, ini: usize, fin: usize, steps: &[Step]) -> Result<ReactionPath> {
        let mut names: Vec<String> = Vec::new();
        let mut energies: Vec<f64> = Vec::new();
        let mut last_eq: Option<usize> = None;
        let mut push_eq = |eq: usize, names: &mut Vec<String>, energies: &mut Vec<f64>| -> Result<()> {
            if last_eq != Some(eq) {
                names.push(format!("EQ{}", eq));
                energies.push(eq_energy(self.data, eq)?);
                last_eq = Some(eq);
            }
            Ok(())
        };

        if steps.is_empty() {
            let eq = self.members[ini].first().copied().ok_or_else(|| {
                Error::precondition(format!("node {} holds no EQ", ini))
            })?;
            push_eq(eq, &mut names, &mut energies)?;
        }
        for step in steps {
            push_eq(step.from_eq, &mut names, &mut energies)?;
            let list = self.data.get(step.kind);
            let energy = list
                .entity(step.index)
                .and_then(|e| e.energy())
                .ok_or_else(|| Error::precondition(format!("{}{} has no energy", step.kind, step.index)))?;
            names.push(format!("{}{}", step.kind, step.index));
            energies.push(energy);
            push_eq(step.to_eq, &mut names, &mut energies)?;
        }

        let title = if self.options.group {
            format!("group {} -> group {}", ini, fin)
        } else {
            format!("EQ{} -> EQ{}", ini, fin)
        };
        Ok(ReactionPath::new(names, energies, EnergyUnit::Hartree)?.with_title(title))
    }
}

fn eq_energy(data: &GrrmData, eq: usize) -> Result<f64> {
    data.eq()
        .entity(eq)
        .ok_or_else(|| Error::precondition(format!("EQ{} is missing", eq)))?
        .energy()
        .ok_or_else(|| Error::precondition(format!("EQ{} has no energy", eq)))
}

fn endpoint_node(node_of: &[Option<usize>], eq: usize) -> Result<usize> {
    node_of
        .get(eq)
        .copied()
        .flatten()
        .ok_or_else(|| Error::precondition(format!("EQ{} has no node in the reaction graph", eq)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::structure::{Connection, Entity};
    use crate::structures::Structures;
    use approx::assert_relative_eq;

    fn eqs(energies: &[f64]) -> Structures {
        let entities = energies
            .iter()
            .map(|&e| Entity::eq(Geometry::empty(), Some(e)))
            .collect();
        Structures::from_entities(Kind::Eq, entities).unwrap()
    }

    fn edges(kind: Kind, list: &[(usize, usize, f64)]) -> Structures {
        let entities = list
            .iter()
            .map(|&(a, b, e)| Entity::new(kind, Geometry::empty(), Some(e), Some(Connection::new(a, b))))
            .collect();
        Structures::from_entities(kind, entities).unwrap()
    }

    fn ungrouped(policy: PtPolicy) -> SearchOptions {
        SearchOptions {
            group: false,
            pt_policy: policy,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn test_cheapest_ts_represents_pair() {
        let data = GrrmData::new(
            eqs(&[0.0, 0.0]),
            edges(Kind::Ts, &[(0, 1, 0.30), (1, 0, 0.10)]),
            Structures::new(Kind::Pt),
        )
        .unwrap();
        let search = PathSearch::new(&data, ungrouped(PtPolicy::TsOnly)).unwrap();
        assert_eq!(search.edge_count(), 1);
        let route = search.find(0, 1).unwrap();
        let route = route.route().unwrap();
        assert_eq!(route.steps[0].index, 1);
        assert_eq!(route.steps[0].from_eq, 0);
        assert_eq!(route.steps[0].to_eq, 1);
        assert_relative_eq!(route.cost, 0.10);
    }

    #[test]
    fn test_pseudo_energy_clamps_at_zero() {
        // TS below its departing EQ (a barrierless step)
        let data = GrrmData::new(
            eqs(&[0.5, 0.0]),
            edges(Kind::Ts, &[(0, 1, 0.4)]),
            Structures::new(Kind::Pt),
        )
        .unwrap();
        let search = PathSearch::new(&data, ungrouped(PtPolicy::PreferTs)).unwrap();
        assert_relative_eq!(search.find(0, 1).unwrap().route().unwrap().cost, 0.0);
        assert_relative_eq!(search.find(1, 0).unwrap().route().unwrap().cost, 0.4);
    }

    #[test]
    fn test_state_ordering_pops_smallest_cost() {
        let mut heap = BinaryHeap::new();
        for (cost, node) in [(0.3, 0), (0.1, 1), (0.1, 2), (0.2, 3)] {
            heap.push(State {
                cost,
                priority: 0,
                steps: 1,
                node,
            });
        }
        let order: Vec<usize> = std::iter::from_fn(|| heap.pop().map(|s| s.node)).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("prefer_lower_energy".parse::<PtPolicy>(), Ok(PtPolicy::PreferLowerEnergy));
        assert_eq!("0".parse::<PtPolicy>(), Ok(PtPolicy::TsOnly));
        assert!("ts_first".parse::<PtPolicy>().is_err());
    }

    #[test]
    fn test_missing_edge_energy_is_precondition() {
        let mut ts = edges(Kind::Ts, &[(0, 1, 0.2)]);
        ts.entity_mut(0).unwrap().set_energy(None);
        let data = GrrmData::new(eqs(&[0.0, 0.0]), ts, Structures::new(Kind::Pt)).unwrap();
        assert!(matches!(
            PathSearch::new(&data, ungrouped(PtPolicy::PreferTs)),
            Err(Error::Precondition(_))
        ));
    }
}
