//! Selection ranges over the dependency graph.
//!
//! A range between two nodes is a shortest undirected path through loaded
//! nodes. Among several shortest paths the lexicographically smallest walk
//! from the smaller endpoint is chosen, which makes the result independent of
//! click order.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::graph::GraphModel;
use crate::layout::{Layout, Point};

type Distances<'a> = HashMap<&'a str, usize>;

/// Shortest path between `from` and `to`, endpoints included.
///
/// Returns `[from]` when both are the same node and an empty vector when
/// either endpoint is not loaded or no path exists.
pub fn path_between(model: &GraphModel, from: &str, to: &str) -> Vec<String> {
    if !model.contains(from) || !model.contains(to) {
        return Vec::new();
    }
    if from == to {
        return vec![from.to_string()];
    }

    let (start, end, reversed) = if from <= to {
        (from, to, false)
    } else {
        (to, from, true)
    };
    let Some((from_start, from_end, length)) = meet(model, start, end) else {
        return Vec::new();
    };
    let positions = shortest_path_positions(model, &from_start, &from_end, length);
    let mut path = walk(model, start, &positions, length);
    if reversed {
        path.reverse();
    }
    path
}

/// Level-synchronous bidirectional BFS. Expands the smaller frontier one full
/// level at a time and stops at the first level where the searches meet.
fn meet<'a>(model: &'a GraphModel, start: &'a str, end: &'a str) -> Option<(Distances<'a>, Distances<'a>, usize)> {
    let mut from_start: Distances<'a> = HashMap::from([(start, 0)]);
    let mut from_end: Distances<'a> = HashMap::from([(end, 0)]);
    let mut start_frontier = vec![start];
    let mut end_frontier = vec![end];

    loop {
        if start_frontier.is_empty() || end_frontier.is_empty() {
            return None;
        }
        let (frontier, dist, other) = if start_frontier.len() <= end_frontier.len() {
            (&mut start_frontier, &mut from_start, &from_end)
        } else {
            (&mut end_frontier, &mut from_end, &from_start)
        };

        let mut next = Vec::new();
        let mut met = false;
        for &node in frontier.iter() {
            let depth = dist[node];
            for neighbor in model.neighbors(node) {
                if dist.contains_key(neighbor) {
                    continue;
                }
                dist.insert(neighbor, depth + 1);
                next.push(neighbor);
                met |= other.contains_key(neighbor);
            }
        }
        *frontier = next;

        if met {
            let length = from_start
                .iter()
                .filter_map(|(node, ds)| from_end.get(node).map(|dt| ds + dt))
                .min()?;
            return Some((from_start, from_end, length));
        }
    }
}

/// Position along the path of every node lying on some shortest path.
fn shortest_path_positions<'a>(
    model: &'a GraphModel,
    from_start: &Distances<'a>,
    from_end: &Distances<'a>,
    length: usize,
) -> HashMap<&'a str, usize> {
    let meeting: Vec<&'a str> = from_start
        .iter()
        .filter(|(node, ds)| from_end.get(*node).is_some_and(|dt| *ds + dt == length))
        .map(|(node, _)| *node)
        .collect();

    let mut positions: HashMap<&'a str, usize> = HashMap::new();

    // Back toward the start: each step lowers the start distance by one.
    let mut stack = meeting.clone();
    while let Some(node) = stack.pop() {
        let depth = from_start[node];
        if positions.insert(node, depth).is_some() {
            continue;
        }
        for neighbor in model.neighbors(node) {
            if depth > 0 && from_start.get(neighbor) == Some(&(depth - 1)) {
                stack.push(neighbor);
            }
        }
    }

    // On toward the end: each step lowers the end distance by one.
    let mut stack: Vec<&'a str> = meeting;
    let mut visited: BTreeSet<&'a str> = BTreeSet::new();
    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        let remaining = from_end[node];
        positions.insert(node, length - remaining);
        for neighbor in model.neighbors(node) {
            if remaining > 0 && from_end.get(neighbor) == Some(&(remaining - 1)) {
                stack.push(neighbor);
            }
        }
    }
    positions
}

fn walk(model: &GraphModel, start: &str, positions: &HashMap<&str, usize>, length: usize) -> Vec<String> {
    let mut path = Vec::with_capacity(length + 1);
    let mut current = start;
    path.push(current.to_string());
    for step in 1..=length {
        // Neighbors are sorted, so the first hit is the smallest token.
        let Some(next) = model
            .neighbors(current)
            .into_iter()
            .find(|neighbor| positions.get(neighbor) == Some(&step))
        else {
            return Vec::new();
        };
        path.push(next.to_string());
        current = next;
    }
    path
}

/// Range added by a shift-click on `clicked`: the path from the most recently
/// selected node that can reach it, or just `clicked`.
pub fn extend_selection(model: &GraphModel, selected: &[String], clicked: &str) -> Vec<String> {
    for from in selected.iter().rev() {
        let range = path_between(model, from, clicked);
        if !range.is_empty() {
            return range;
        }
    }
    vec![clicked.to_string()]
}

/// Applies a modifier click: clicking a selected node removes it, anything
/// else appends `additions` without duplicates.
pub fn apply_click(existing: &[String], clicked: &str, additions: &[String]) -> Vec<String> {
    if existing.iter().any(|token| token == clicked) {
        return existing
            .iter()
            .filter(|token| *token != clicked)
            .cloned()
            .collect();
    }
    let mut out = existing.to_vec();
    for token in additions {
        if !out.contains(token) {
            out.push(token.clone());
        }
    }
    out
}

/// Selects every member of a group, or deselects them all when they already
/// are all selected.
pub fn toggle_group_selection(existing: &[String], group_tokens: &[String]) -> Vec<String> {
    let all_selected = !group_tokens.is_empty()
        && group_tokens
            .iter()
            .all(|token| existing.contains(token));
    if all_selected {
        existing
            .iter()
            .filter(|token| !group_tokens.contains(token))
            .cloned()
            .collect()
    } else {
        let mut out = existing.to_vec();
        for token in group_tokens {
            if !out.contains(token) {
                out.push(token.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavDirection {
    Left,
    Right,
    Up,
    Down,
}

impl NavDirection {
    /// Splits an offset into (distance along the direction, sideways drift).
    fn project(self, delta: Point) -> (f64, f64) {
        match self {
            Self::Left => (-delta.x, delta.y.abs()),
            Self::Right => (delta.x, delta.y.abs()),
            Self::Up => (-delta.y, delta.x.abs()),
            Self::Down => (delta.y, delta.x.abs()),
        }
    }
}

/// Nearest laid-out node from `from` in `direction`, for keyboard navigation.
/// Nodes within a 45 degree cone win over nodes merely on the right side.
pub fn closest_node_in_direction(layout: &Layout, from: &str, direction: NavDirection) -> Option<String> {
    let origin = layout.nodes.get(from)?.bounds.center();
    let mut best: Option<(bool, f64, &str)> = None;
    for (token, node) in &layout.nodes {
        if token == from {
            continue;
        }
        let center = node.bounds.center();
        let delta = Point::new(center.x - origin.x, center.y - origin.y);
        let (along, drift) = direction.project(delta);
        if along <= 0.0 {
            continue;
        }
        let outside_cone = drift > along;
        let distance = along.hypot(drift);
        let candidate = (outside_cone, distance, token.as_str());
        let better = match &best {
            None => true,
            Some(current) => {
                (candidate.0, candidate.1).partial_cmp(&(current.0, current.1))
                    == Some(std::cmp::Ordering::Less)
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best.map(|(_, _, token)| token.to_string())
}
