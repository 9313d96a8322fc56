use std::collections::BTreeMap;

use super::{Point, Rect};

/// Share of a side's width used to spread several edge ports apart.
const PORT_SPREAD_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(super) struct EdgePorts {
    /// Horizontal offset from the source box center.
    pub(super) start_offset: f64,
    /// Horizontal offset from the target box center.
    pub(super) end_offset: f64,
}

/// Spreads the ports of vertices with several edges along the side they use,
/// ordered by where the edge heads so neighbouring edges do not cross at the
/// box. `chains[i]` is edge `i` as a vertex path, source first.
pub(super) fn assign_ports(chains: &[Vec<usize>], rects: &[Rect]) -> Vec<EdgePorts> {
    let mut outgoing: BTreeMap<usize, Vec<(f64, usize)>> = BTreeMap::new();
    let mut incoming: BTreeMap<usize, Vec<(f64, usize)>> = BTreeMap::new();
    for (idx, chain) in chains.iter().enumerate() {
        let (Some(&first), Some(&last)) = (chain.first(), chain.last()) else {
            continue;
        };
        let next = chain.get(1).copied().unwrap_or(last);
        let prev = chain.len().checked_sub(2).map(|i| chain[i]).unwrap_or(first);
        outgoing
            .entry(first)
            .or_default()
            .push((rects[next].center().x, idx));
        incoming
            .entry(last)
            .or_default()
            .push((rects[prev].center().x, idx));
    }

    let mut ports = vec![EdgePorts::default(); chains.len()];
    for (vertex, mut edges) in outgoing {
        for (edge, offset) in spread(&mut edges, rects[vertex].width) {
            ports[edge].start_offset = offset;
        }
    }
    for (vertex, mut edges) in incoming {
        for (edge, offset) in spread(&mut edges, rects[vertex].width) {
            ports[edge].end_offset = offset;
        }
    }
    ports
}

fn spread(edges: &mut [(f64, usize)], width: f64) -> Vec<(usize, f64)> {
    edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let count = edges.len();
    if count == 1 {
        return vec![(edges[0].1, 0.0)];
    }
    let span = width * PORT_SPREAD_RATIO;
    edges
        .iter()
        .enumerate()
        .map(|(slot, (_, edge))| {
            let t = (slot + 1) as f64 / (count + 1) as f64;
            (*edge, (t - 0.5) * span)
        })
        .collect()
}

/// Polyline for one edge laid out top to bottom: leaves the bottom side of the
/// source, passes through each dummy center and enters the top of the target.
/// A collapsed group is an ordinary vertex here, so its edges end on the
/// group boundary.
pub(super) fn route_chain(chain: &[usize], rects: &[Rect], ports: EdgePorts) -> Vec<Point> {
    if chain.len() < 2 {
        return Vec::new();
    }
    let (first, last) = (chain[0], chain[chain.len() - 1]);
    let source = rects[first];
    let target = rects[last];
    let mut points = Vec::with_capacity(chain.len());
    points.push(Point::new(
        source.center().x + ports.start_offset,
        source.bottom(),
    ));
    for &dummy in &chain[1..chain.len() - 1] {
        points.push(rects[dummy].center());
    }
    points.push(Point::new(target.center().x + ports.end_offset, target.y));
    points
}

/// Number of direction changes along a polyline.
pub fn path_bend_count(points: &[Point]) -> usize {
    points
        .windows(3)
        .filter(|w| {
            let (ax, ay) = (w[1].x - w[0].x, w[1].y - w[0].y);
            let (bx, by) = (w[2].x - w[1].x, w[2].y - w[1].y);
            (ax * by - ay * bx).abs() > 1e-6
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_edge_uses_box_centers() {
        let rects = vec![
            Rect::new(0.0, 0.0, 100.0, 40.0),
            Rect::new(0.0, 100.0, 100.0, 40.0),
        ];
        let chain = vec![0, 1];
        let ports = assign_ports(std::slice::from_ref(&chain), &rects);
        let points = route_chain(&chain, &rects, ports[0]);
        assert_eq!(points, vec![Point::new(50.0, 40.0), Point::new(50.0, 100.0)]);
    }

    #[test]
    fn fan_out_ports_are_ordered_by_target() {
        let rects = vec![
            Rect::new(100.0, 0.0, 100.0, 40.0),
            Rect::new(300.0, 100.0, 100.0, 40.0),
            Rect::new(0.0, 100.0, 100.0, 40.0),
        ];
        let chains = vec![vec![0, 1], vec![0, 2]];
        let ports = assign_ports(&chains, &rects);
        assert!(ports[1].start_offset < ports[0].start_offset);
    }

    #[test]
    fn bend_count_tracks_turns() {
        let straight = vec![Point::new(0.0, 0.0), Point::new(0.0, 10.0), Point::new(0.0, 20.0)];
        let bent = vec![Point::new(0.0, 0.0), Point::new(0.0, 10.0), Point::new(10.0, 20.0)];
        assert_eq!(path_bend_count(&straight), 0);
        assert_eq!(path_bend_count(&bent), 1);
    }
}
