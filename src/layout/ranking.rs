use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Visit {
    Unseen,
    Active,
    Done,
}

/// Marks a feedback edge set: the edges a depth-first walk in vertex order
/// finds pointing back at a vertex still on its stack. Reversing the marked
/// edges leaves the graph acyclic. Collapsing groups can close cycles that
/// the underlying model does not have.
pub(super) fn feedback_edges(count: usize, edges: &[(usize, usize)]) -> Vec<bool> {
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (idx, &(from, _)) in edges.iter().enumerate() {
        outgoing[from].push(idx);
    }

    let mut visit = vec![Visit::Unseen; count];
    let mut reversed = vec![false; edges.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for root in 0..count {
        if visit[root] != Visit::Unseen {
            continue;
        }
        visit[root] = Visit::Active;
        stack.push((root, 0));
        while let Some(frame) = stack.last_mut() {
            let vertex = frame.0;
            let Some(&edge) = outgoing[vertex].get(frame.1) else {
                visit[vertex] = Visit::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            let target = edges[edge].1;
            match visit[target] {
                Visit::Active => reversed[edge] = true,
                Visit::Unseen => {
                    visit[target] = Visit::Active;
                    stack.push((target, 0));
                }
                Visit::Done => {}
            }
        }
    }
    reversed
}

/// Longest-path layering: every vertex sits one layer below its deepest
/// predecessor. Vertices left unprocessed by a cycle keep whatever rank they
/// had reached.
pub(super) fn longest_path_ranks(count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut indegree = vec![0usize; count];
    for &(from, to) in edges {
        outgoing[from].push(to);
        indegree[to] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|&vertex| indegree[vertex] == 0)
        .map(Reverse)
        .collect();
    let mut ranks = vec![0usize; count];
    let mut processed = 0usize;
    while let Some(Reverse(vertex)) = ready.pop() {
        processed += 1;
        for &next in &outgoing[vertex] {
            ranks[next] = ranks[next].max(ranks[vertex] + 1);
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if processed < count {
        tracing::warn!(
            unranked = count - processed,
            "layout input contains a cycle; ranks are unspecified"
        );
    }
    ranks
}

/// Orders each layer to reduce crossings with alternating barycenter sweeps.
///
/// `down[v]` lists the neighbours of `v` in the next layer and `up[v]` those in
/// the previous one. Vertices sharing a cluster id are kept contiguous. The
/// ordering with the fewest crossings seen is kept; sweeping stops after
/// `passes` rounds or as soon as a round changes nothing.
pub(super) fn order_layers(
    layers: &mut [Vec<usize>],
    down: &[Vec<usize>],
    up: &[Vec<usize>],
    cluster: &[Option<usize>],
    passes: usize,
) {
    let mut positions = vec![0usize; down.len()];
    for layer in layers.iter_mut() {
        let initial: Vec<f64> = (0..layer.len()).map(|idx| idx as f64).collect();
        keep_clusters_contiguous(layer, &initial, cluster);
        update_positions(layer, &mut positions);
    }
    if layers.len() <= 1 {
        return;
    }

    let mut best = layers.to_vec();
    let mut best_crossings = total_crossings(layers, down, &positions);
    for _ in 0..passes.max(1) {
        if best_crossings == 0 {
            break;
        }
        let before = layers.to_vec();
        for rank in 1..layers.len() {
            sort_layer(&mut layers[rank], up, &mut positions, cluster);
        }
        for rank in (0..layers.len() - 1).rev() {
            sort_layer(&mut layers[rank], down, &mut positions, cluster);
        }
        let crossings = total_crossings(layers, down, &positions);
        if crossings < best_crossings {
            best_crossings = crossings;
            best = layers.to_vec();
        }
        if before.as_slice() == &*layers {
            break;
        }
    }

    for (layer, ordered) in layers.iter_mut().zip(best) {
        *layer = ordered;
    }
}

fn update_positions(layer: &[usize], positions: &mut [usize]) {
    for (idx, &vertex) in layer.iter().enumerate() {
        positions[vertex] = idx;
    }
}

fn sort_layer(
    layer: &mut Vec<usize>,
    neighbors: &[Vec<usize>],
    positions: &mut [usize],
    cluster: &[Option<usize>],
) {
    if layer.len() <= 1 {
        return;
    }
    let mut scored: Vec<(f64, usize, usize)> = layer
        .iter()
        .enumerate()
        .map(|(idx, &vertex)| {
            let score = barycenter(&neighbors[vertex], positions).unwrap_or(idx as f64);
            (score, idx, vertex)
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    *layer = scored.iter().map(|(_, _, vertex)| *vertex).collect();
    let scores: Vec<f64> = scored.iter().map(|(score, _, _)| *score).collect();
    keep_clusters_contiguous(layer, &scores, cluster);
    update_positions(layer, positions);
}

pub(super) fn barycenter(neighbors: &[usize], positions: &[usize]) -> Option<f64> {
    if neighbors.is_empty() {
        return None;
    }
    let sum: usize = neighbors.iter().map(|&n| positions[n]).sum();
    Some(sum as f64 / neighbors.len() as f64)
}

/// Reorders `layer` so that vertices of one cluster are adjacent. Clusters are
/// placed by the mean score of their members; unclustered vertices act as
/// singleton clusters.
fn keep_clusters_contiguous(layer: &mut Vec<usize>, scores: &[f64], cluster: &[Option<usize>]) {
    if !layer.iter().any(|&vertex| cluster[vertex].is_some()) {
        return;
    }
    let singleton_base = cluster.len();
    let tag = |vertex: usize| cluster[vertex].unwrap_or(singleton_base + vertex);

    let mut totals: BTreeMap<usize, (f64, usize)> = BTreeMap::new();
    for (idx, &vertex) in layer.iter().enumerate() {
        let entry = totals.entry(tag(vertex)).or_insert((0.0, 0));
        entry.0 += scores[idx];
        entry.1 += 1;
    }
    let mut keyed: Vec<(f64, usize, usize, usize)> = layer
        .iter()
        .enumerate()
        .map(|(idx, &vertex)| {
            let (sum, count) = totals[&tag(vertex)];
            (sum / count as f64, tag(vertex), idx, vertex)
        })
        .collect();
    keyed.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    *layer = keyed.into_iter().map(|(_, _, _, vertex)| vertex).collect();
}

/// Gives every cluster one lane used in all layers and sorts each layer into
/// segments: segment `2 * lane + 1` holds that lane's cluster, even segments
/// hold unclustered vertices lying between lanes. Lanes are ordered by the
/// mean relative position of their members after crossing reduction, and an
/// unclustered vertex goes to the gap matching its own relative position.
/// Returns the segment of every vertex.
pub(super) fn arrange_lanes(
    layers: &mut [Vec<usize>],
    cluster: &[Option<usize>],
    cluster_count: usize,
) -> Vec<usize> {
    let relative = |idx: usize, len: usize| (idx as f64 + 0.5) / len as f64;

    let mut totals = vec![(0.0f64, 0usize); cluster_count];
    for layer in layers.iter() {
        for (idx, &vertex) in layer.iter().enumerate() {
            if let Some(id) = cluster[vertex] {
                totals[id].0 += relative(idx, layer.len());
                totals[id].1 += 1;
            }
        }
    }
    let mut lanes: Vec<(f64, usize)> = totals
        .iter()
        .enumerate()
        .map(|(id, &(sum, count))| {
            let key = if count == 0 { 0.5 } else { sum / count as f64 };
            (key, id)
        })
        .collect();
    lanes.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut lane_of = vec![0usize; cluster_count];
    for (lane, &(_, id)) in lanes.iter().enumerate() {
        lane_of[id] = lane;
    }
    let keys: Vec<f64> = lanes.iter().map(|&(key, _)| key).collect();

    let mut segment = vec![0usize; cluster.len()];
    for layer in layers.iter_mut() {
        let len = layer.len();
        for (idx, &vertex) in layer.iter().enumerate() {
            segment[vertex] = match cluster[vertex] {
                Some(id) => 2 * lane_of[id] + 1,
                None => {
                    let position = relative(idx, len);
                    2 * keys.partition_point(|&key| key < position)
                }
            };
        }
        let mut keyed: Vec<(usize, usize, usize)> = layer
            .iter()
            .enumerate()
            .map(|(idx, &vertex)| (segment[vertex], idx, vertex))
            .collect();
        keyed.sort_unstable();
        *layer = keyed.into_iter().map(|(_, _, vertex)| vertex).collect();
    }
    segment
}

pub(super) fn total_crossings(layers: &[Vec<usize>], down: &[Vec<usize>], positions: &[usize]) -> usize {
    layers
        .windows(2)
        .map(|pair| two_layer_crossings(&pair[0], pair[1].len(), down, positions))
        .sum()
}

/// Counts crossings between two adjacent layers with an accumulator tree.
fn two_layer_crossings(north: &[usize], south_len: usize, down: &[Vec<usize>], positions: &[usize]) -> usize {
    if south_len == 0 {
        return 0;
    }
    let mut south_entries: Vec<usize> = Vec::new();
    for &vertex in north {
        let mut targets: Vec<usize> = down[vertex].iter().map(|&n| positions[n]).collect();
        targets.sort_unstable();
        south_entries.extend(targets);
    }

    let mut first_index = 1usize;
    while first_index < south_len {
        first_index <<= 1;
    }
    let tree_size = 2 * first_index - 1;
    first_index -= 1;
    let mut tree = vec![0usize; tree_size];

    let mut crossings = 0usize;
    for pos in south_entries {
        let mut index = pos + first_index;
        tree[index] += 1;
        let mut weight_sum = 0usize;
        while index > 0 {
            if index % 2 == 1 {
                weight_sum += tree[index + 1];
            }
            index = (index - 1) >> 1;
            tree[index] += 1;
        }
        crossings += weight_sum;
    }
    crossings
}
