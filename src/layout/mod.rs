mod cache;
mod ranking;
mod routing;
mod sizing;
pub(crate) mod types;

pub use cache::{LayoutCache, LayoutKey};
pub use routing::path_bend_count;
pub use sizing::{DefaultSizer, NodeSizer};
pub use types::*;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use crate::config::LayoutConfig;
use crate::graph::{GraphModel, UNGROUPED_GROUP_ID};
use crate::ir::{Direction, Size};

#[derive(Debug, Clone, PartialEq)]
enum VertexKind {
    Node(String),
    Group(String),
    Dummy,
}

#[derive(Debug, Clone)]
struct Vertex {
    kind: VertexKind,
    /// Expanded group the vertex is drawn inside.
    cluster: Option<usize>,
    size: Size,
}

impl Vertex {
    fn id(&self) -> Option<&str> {
        match &self.kind {
            VertexKind::Node(token) => Some(token),
            VertexKind::Group(group_id) => Some(group_id),
            VertexKind::Dummy => None,
        }
    }

    fn is_dummy(&self) -> bool {
        self.kind == VertexKind::Dummy
    }
}

/// What the layered solver sees: visible nodes plus one vertex per collapsed
/// group, with edges redirected accordingly.
struct CollapsedGraph {
    vertices: Vec<Vertex>,
    edges: Vec<(usize, usize)>,
    /// Expanded group ids, indexed by cluster id.
    clusters: Vec<String>,
    /// Collapsed group id to its vertex.
    collapsed: BTreeMap<String, usize>,
    /// Loaded member count per group.
    member_counts: BTreeMap<String, usize>,
}

/// Lays out `model` flowing in `direction` with the groups in `expanded` open.
///
/// The result depends only on the arguments: the same model, direction and
/// expanded set always give bit-identical coordinates. The model must be
/// acyclic (see [`GraphModel::has_cycles`]); cyclic input terminates but the
/// result is unspecified.
pub fn compute_layout<S>(
    model: &GraphModel,
    direction: Direction,
    expanded: &BTreeSet<String>,
    sizer: &S,
    config: &LayoutConfig,
) -> Layout
where
    S: NodeSizer + ?Sized,
{
    let started = Instant::now();
    let collapsed = collapse_groups(model, expanded, sizer, config);
    if collapsed.vertices.is_empty() {
        return Layout::default();
    }

    let reversed = ranking::feedback_edges(collapsed.vertices.len(), &collapsed.edges);
    let ranked_edges: Vec<(usize, usize)> = collapsed
        .edges
        .iter()
        .zip(&reversed)
        .map(|(&(from, to), &flip)| if flip { (to, from) } else { (from, to) })
        .collect();
    let mut ranks = ranking::longest_path_ranks(collapsed.vertices.len(), &ranked_edges);
    let mut vertices = collapsed.vertices.clone();
    let chains = insert_dummies(&mut vertices, &mut ranks, &ranked_edges, config);

    let count = vertices.len();
    let mut down: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut up: Vec<Vec<usize>> = vec![Vec::new(); count];
    for chain in &chains {
        for pair in chain.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if ranks[to] == ranks[from] + 1 {
                down[from].push(to);
                up[to].push(from);
            }
        }
    }

    let layer_count = ranks.iter().copied().max().unwrap_or(0) + 1;
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); layer_count];
    for (vertex, &rank) in ranks.iter().enumerate() {
        layers[rank].push(vertex);
    }
    let cluster: Vec<Option<usize>> = vertices.iter().map(|vertex| vertex.cluster).collect();
    ranking::order_layers(&mut layers, &down, &up, &cluster, config.order_passes);
    let segment = ranking::arrange_lanes(&mut layers, &cluster, collapsed.clusters.len());

    let rects = assign_positions(&layers, &vertices, &segment, &down, &up, config);
    let ports = routing::assign_ports(&chains, &rects);

    let mut scene = Scene::default();
    for (idx, vertex) in vertices.iter().enumerate() {
        if let VertexKind::Node(token) = &vertex.kind {
            scene.nodes.push((token.clone(), rects[idx], ranks[idx]));
        }
    }
    scene.groups = build_group_layouts(&collapsed, &vertices, &rects, config);
    for ((chain, ports), &flip) in chains.iter().zip(&ports).zip(&reversed) {
        let first = vertices[chain[0]].id();
        let last = vertices[chain[chain.len() - 1]].id();
        let (Some(first), Some(last)) = (first, last) else {
            continue;
        };
        let mut points = routing::route_chain(chain, &rects, *ports);
        let (from, to) = if flip {
            points.reverse();
            (last, first)
        } else {
            (first, last)
        };
        scene.edges.push(EdgeLayout {
            from: from.to_string(),
            to: to.to_string(),
            points,
        });
    }

    apply_direction_mirror(direction, &mut scene);
    let layout = normalize_layout(scene, config.margin);

    tracing::debug!(
        nodes = layout.nodes.len(),
        groups = layout.groups.len(),
        edges = layout.edges.len(),
        layers = layer_count,
        dummies = count - collapsed.vertices.len(),
        reversed = reversed.iter().filter(|&&flip| flip).count(),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "computed layout"
    );
    layout
}

fn collapse_groups<S>(
    model: &GraphModel,
    expanded: &BTreeSet<String>,
    sizer: &S,
    config: &LayoutConfig,
) -> CollapsedGraph
where
    S: NodeSizer + ?Sized,
{
    let groups = model.groups();
    let lone_group = config.expand_lone_group
        && groups.len() == 1
        && !groups.contains_key(UNGROUPED_GROUP_ID);
    let is_collapsed = |group_id: &str| {
        group_id != UNGROUPED_GROUP_ID && !lone_group && !expanded.contains(group_id)
    };

    let clusters: Vec<String> = groups
        .keys()
        .filter(|group_id| group_id.as_str() != UNGROUPED_GROUP_ID && !is_collapsed(group_id.as_str()))
        .cloned()
        .collect();
    let cluster_ids: HashMap<&str, usize> = clusters
        .iter()
        .enumerate()
        .map(|(idx, group_id)| (group_id.as_str(), idx))
        .collect();

    let mut vertices: Vec<Vertex> = Vec::with_capacity(model.nodes.len());
    let mut vertex_of: HashMap<&str, usize> = HashMap::with_capacity(model.nodes.len());
    let mut collapsed: BTreeMap<String, usize> = BTreeMap::new();
    for node in model.nodes.values() {
        let group_id = node.group_id.as_str();
        let vertex = if is_collapsed(group_id) {
            *collapsed.entry(group_id.to_string()).or_insert_with(|| {
                vertices.push(Vertex {
                    kind: VertexKind::Group(group_id.to_string()),
                    cluster: None,
                    size: sizing::sanitize(config.collapsed_group_size),
                });
                vertices.len() - 1
            })
        } else {
            vertices.push(Vertex {
                kind: VertexKind::Node(node.id.clone()),
                cluster: cluster_ids.get(group_id).copied(),
                size: sizing::sanitize(sizer.size(&node.definition)),
            });
            vertices.len() - 1
        };
        vertex_of.insert(node.id.as_str(), vertex);
    }

    let mut edges: BTreeSet<(usize, usize)> = BTreeSet::new();
    for node in model.nodes.values() {
        let from = vertex_of[node.id.as_str()];
        for target in model.downstream_of(&node.id) {
            // Unloaded targets are drawn by the caller as stubs, not laid out.
            let Some(&to) = vertex_of.get(target.as_str()) else {
                continue;
            };
            if from != to {
                edges.insert((from, to));
            }
        }
    }

    CollapsedGraph {
        vertices,
        edges: edges.into_iter().collect(),
        clusters,
        collapsed,
        member_counts: groups
            .iter()
            .map(|(group_id, members)| (group_id.clone(), members.len()))
            .collect(),
    }
}

/// Splits every edge spanning more than one layer with dummy vertices and
/// returns each edge as a vertex chain.
fn insert_dummies(
    vertices: &mut Vec<Vertex>,
    ranks: &mut Vec<usize>,
    edges: &[(usize, usize)],
    config: &LayoutConfig,
) -> Vec<Vec<usize>> {
    let mut chains = Vec::with_capacity(edges.len());
    for &(from, to) in edges {
        let mut chain = vec![from];
        if ranks[to] > ranks[from] + 1 {
            let cluster = if vertices[from].cluster == vertices[to].cluster {
                vertices[from].cluster
            } else {
                None
            };
            for rank in ranks[from] + 1..ranks[to] {
                vertices.push(Vertex {
                    kind: VertexKind::Dummy,
                    cluster,
                    size: Size::new(config.edge_gap, 0.0),
                });
                ranks.push(rank);
                chain.push(vertices.len() - 1);
            }
        }
        chain.push(to);
        chains.push(chain);
    }
    chains
}

fn separation(left: &Vertex, right: &Vertex, config: &LayoutConfig) -> f64 {
    let base = if left.is_dummy() || right.is_dummy() {
        config.edge_gap
    } else {
        config.node_spacing
    };
    let crosses_group = left.cluster != right.cluster
        && (left.cluster.is_some() || right.cluster.is_some());
    if crosses_group {
        base + 2.0 * config.group_padding
    } else {
        base
    }
}

/// Assigns boxes top to bottom. Every segment gets one horizontal span shared
/// by all layers, wide enough for its widest run, so an expanded group's lane
/// never holds a foreign vertex. Runs start centered in their span and are
/// pulled toward their neighbours for a bounded number of sweeps, keeping
/// order, separation and the span.
fn assign_positions(
    layers: &[Vec<usize>],
    vertices: &[Vertex],
    segment: &[usize],
    down: &[Vec<usize>],
    up: &[Vec<usize>],
    config: &LayoutConfig,
) -> Vec<Rect> {
    let rank_spacing = config.effective_rank_spacing();
    let segment_count = segment.iter().copied().max().map_or(1, |max| max + 1);
    let layer_runs: Vec<Vec<Vec<usize>>> = layers
        .iter()
        .map(|layer| segment_runs(layer, segment))
        .collect();

    let mut widths: Vec<Option<f64>> = vec![None; segment_count];
    for run in layer_runs.iter().flatten() {
        let width = packed_width(run, vertices, config);
        let slot = &mut widths[segment[run[0]]];
        *slot = Some(slot.map_or(width, |current| current.max(width)));
    }
    let boundary = config.node_spacing + 2.0 * config.group_padding;
    let mut spans: Vec<(f64, f64)> = vec![(0.0, 0.0); segment_count];
    let mut cursor: Option<f64> = None;
    for (seg, &width) in widths.iter().enumerate() {
        let Some(width) = width else {
            continue;
        };
        let start = cursor.map_or(0.0, |end| end + boundary);
        spans[seg] = (start, start + width);
        cursor = Some(start + width);
    }

    let mut lefts = vec![0.0f64; vertices.len()];
    let mut tops = vec![0.0f64; vertices.len()];
    let mut main_cursor = 0.0;
    for (layer, runs) in layers.iter().zip(&layer_runs) {
        let band = layer
            .iter()
            .map(|&vertex| vertices[vertex].size.height)
            .fold(0.0f64, f64::max);
        for run in runs {
            let (start, end) = spans[segment[run[0]]];
            let mut cross_cursor = start + (end - start - packed_width(run, vertices, config)) / 2.0;
            for (idx, &vertex) in run.iter().enumerate() {
                if idx > 0 {
                    cross_cursor += separation(&vertices[run[idx - 1]], &vertices[vertex], config);
                }
                lefts[vertex] = cross_cursor;
                tops[vertex] = main_cursor + (band - vertices[vertex].size.height) / 2.0;
                cross_cursor += vertices[vertex].size.width;
            }
        }
        main_cursor += band + rank_spacing;
    }

    for _ in 0..config.align_passes {
        for layer in layer_runs.iter().skip(1) {
            for run in layer {
                align_run(run, up, vertices, &mut lefts, spans[segment[run[0]]], config);
            }
        }
        for layer in layer_runs.iter().rev().skip(1) {
            for run in layer {
                align_run(run, down, vertices, &mut lefts, spans[segment[run[0]]], config);
            }
        }
    }

    vertices
        .iter()
        .enumerate()
        .map(|(idx, vertex)| Rect::new(lefts[idx], tops[idx], vertex.size.width, vertex.size.height))
        .collect()
}

/// Splits a segment-sorted layer into its per-segment runs.
fn segment_runs(layer: &[usize], segment: &[usize]) -> Vec<Vec<usize>> {
    layer
        .chunk_by(|a, b| segment[*a] == segment[*b])
        .map(<[usize]>::to_vec)
        .collect()
}

fn packed_width(run: &[usize], vertices: &[Vertex], config: &LayoutConfig) -> f64 {
    let widths: f64 = run.iter().map(|&vertex| vertices[vertex].size.width).sum();
    let gaps: f64 = run
        .windows(2)
        .map(|pair| separation(&vertices[pair[0]], &vertices[pair[1]], config))
        .sum();
    widths + gaps
}

fn align_run(
    run: &[usize],
    neighbors: &[Vec<usize>],
    vertices: &[Vertex],
    lefts: &mut [f64],
    (start, end): (f64, f64),
    config: &LayoutConfig,
) {
    if run.is_empty() {
        return;
    }
    let width = |vertex: usize| vertices[vertex].size.width;
    let gaps: Vec<f64> = (0..run.len())
        .map(|idx| {
            if idx == 0 {
                0.0
            } else {
                separation(&vertices[run[idx - 1]], &vertices[run[idx]], config)
            }
        })
        .collect();

    // Tightest packings against either end of the span.
    let last = run.len() - 1;
    let mut lowest = vec![start; run.len()];
    for idx in 1..run.len() {
        lowest[idx] = lowest[idx - 1] + width(run[idx - 1]) + gaps[idx];
    }
    let mut highest = vec![end - width(run[last]); run.len()];
    for idx in (0..last).rev() {
        highest[idx] = highest[idx + 1] - gaps[idx + 1] - width(run[idx]);
    }

    let desired: Vec<f64> = run
        .iter()
        .enumerate()
        .map(|(idx, &vertex)| {
            let list = &neighbors[vertex];
            let wanted = if list.is_empty() {
                lefts[vertex]
            } else {
                let mean_center = list
                    .iter()
                    .map(|&n| lefts[n] + width(n) / 2.0)
                    .sum::<f64>()
                    / list.len() as f64;
                mean_center - width(vertex) / 2.0
            };
            wanted.max(lowest[idx]).min(highest[idx])
        })
        .collect();

    // Pushing right and pushing left each keep the separation constraints, and
    // so does their average.
    let mut from_left = desired.clone();
    for idx in 1..run.len() {
        let min = from_left[idx - 1] + width(run[idx - 1]) + gaps[idx];
        from_left[idx] = from_left[idx].max(min);
    }
    let mut from_right = desired;
    for idx in (0..last).rev() {
        let max = from_right[idx + 1] - gaps[idx + 1] - width(run[idx]);
        from_right[idx] = from_right[idx].min(max);
    }
    for (idx, &vertex) in run.iter().enumerate() {
        lefts[vertex] = (from_left[idx] + from_right[idx]) / 2.0;
    }
}

fn build_group_layouts(
    collapsed: &CollapsedGraph,
    vertices: &[Vertex],
    rects: &[Rect],
    config: &LayoutConfig,
) -> Vec<GroupLayout> {
    let pad = config.group_padding;
    let mut member_bounds: Vec<Option<Rect>> = vec![None; collapsed.clusters.len()];
    for (idx, vertex) in vertices.iter().enumerate() {
        if !matches!(vertex.kind, VertexKind::Node(_)) {
            continue;
        }
        if let Some(cluster) = vertex.cluster {
            let slot = &mut member_bounds[cluster];
            *slot = Some(match slot {
                Some(bounds) => bounds.union(&rects[idx]),
                None => rects[idx],
            });
        }
    }

    let mut groups = Vec::new();
    for (cluster, bounds) in member_bounds.into_iter().enumerate() {
        let Some(bounds) = bounds else {
            continue;
        };
        let group_id = &collapsed.clusters[cluster];
        groups.push(GroupLayout {
            id: group_id.clone(),
            bounds: bounds.inflate(pad, pad + config.group_label_height, pad, pad),
            expanded: true,
            node_count: collapsed.member_counts.get(group_id).copied().unwrap_or(0),
        });
    }
    for (group_id, &vertex) in &collapsed.collapsed {
        groups.push(GroupLayout {
            id: group_id.clone(),
            bounds: rects[vertex],
            expanded: false,
            node_count: collapsed.member_counts.get(group_id).copied().unwrap_or(0),
        });
    }
    groups
}

#[derive(Default)]
struct Scene {
    nodes: Vec<(String, Rect, usize)>,
    groups: Vec<GroupLayout>,
    edges: Vec<EdgeLayout>,
}

impl Scene {
    fn bounds(&self) -> Option<Rect> {
        let rects = self
            .nodes
            .iter()
            .map(|(_, rect, _)| *rect)
            .chain(self.groups.iter().map(|group| group.bounds))
            .chain(
                self.edges
                    .iter()
                    .flat_map(|edge| edge.points.iter())
                    .map(|point| Rect::new(point.x, point.y, 0.0, 0.0)),
            );
        rects.reduce(|acc, rect| acc.union(&rect))
    }
}

fn apply_direction_mirror(direction: Direction, scene: &mut Scene) {
    if direction != Direction::Up {
        return;
    }
    let Some(bounds) = scene.bounds() else {
        return;
    };
    let (min_y, max_y) = (bounds.y, bounds.bottom());
    let flip = |rect: &mut Rect| rect.y = min_y + max_y - rect.y - rect.height;
    for (_, rect, _) in scene.nodes.iter_mut() {
        flip(rect);
    }
    for group in scene.groups.iter_mut() {
        flip(&mut group.bounds);
    }
    for edge in scene.edges.iter_mut() {
        for point in edge.points.iter_mut() {
            point.y = min_y + max_y - point.y;
        }
    }
}

/// Moves the scene so its top-left corner sits at `margin` and sizes the
/// layout to leave the same margin on the far sides.
fn normalize_layout(scene: Scene, margin: f64) -> Layout {
    let Some(bounds) = scene.bounds() else {
        return Layout::default();
    };
    let shift_x = margin - bounds.x;
    let shift_y = margin - bounds.y;
    let shift = |rect: Rect| Rect::new(rect.x + shift_x, rect.y + shift_y, rect.width, rect.height);

    let nodes = scene
        .nodes
        .into_iter()
        .map(|(token, rect, layer)| {
            (
                token,
                NodeLayout {
                    bounds: shift(rect),
                    layer,
                },
            )
        })
        .collect();
    let groups = scene
        .groups
        .into_iter()
        .map(|group| {
            (
                group.id.clone(),
                GroupLayout {
                    bounds: shift(group.bounds),
                    ..group
                },
            )
        })
        .collect();
    let edges = scene
        .edges
        .into_iter()
        .map(|edge| EdgeLayout {
            points: edge
                .points
                .into_iter()
                .map(|point| Point::new(point.x + shift_x, point.y + shift_y))
                .collect(),
            ..edge
        })
        .collect();

    Layout {
        nodes,
        groups,
        edges,
        width: bounds.width + margin * 2.0,
        height: bounds.height + margin * 2.0,
    }
}
