use asset_graph_layout::config::LayoutConfig;
use asset_graph_layout::graph::GraphModel;
use asset_graph_layout::hit_test::HitIndex;
use asset_graph_layout::ir::{Direction, RawNode};
use asset_graph_layout::layout::{DefaultSizer, Point, compute_layout};
use asset_graph_layout::selection::path_between;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::BTreeSet;
use std::hint::black_box;

/// A chain of `nodes` assets plus up to `extra_edges` forward skip edges,
/// split into `groups` consecutive runs (0 leaves everything ungrouped) so the
/// collapsed graph stays acyclic.
fn dense_graph(nodes: usize, extra_edges: usize, groups: usize) -> Vec<RawNode> {
    let name = |i: usize| format!("asset_{i}");
    let mut raw: Vec<RawNode> = (0..nodes)
        .map(|i| {
            let node = RawNode::asset(&["bench", name(i).as_str()]);
            if groups == 0 {
                node
            } else {
                node.in_group(&format!("group_{:03}", i * groups / nodes), "bench_repo", "bench_location")
            }
        })
        .collect();
    for i in 0..nodes.saturating_sub(1) {
        raw[i] = raw[i].clone().with_downstream(&["bench", name(i + 1).as_str()]);
    }
    let mut count = 0usize;
    'outer: for i in 0..nodes {
        for j in (i + 2)..nodes {
            if count >= extra_edges {
                break 'outer;
            }
            if (i + j) % 7 == 0 {
                raw[i] = raw[i].clone().with_downstream(&["bench", name(j).as_str()]);
                count += 1;
            }
        }
    }
    raw
}

fn all_groups(model: &GraphModel) -> BTreeSet<String> {
    model.groups().into_keys().collect()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for nodes in [100usize, 1_000, 10_000] {
        let raw = dense_graph(nodes, nodes, 0);
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &raw, |b, raw| {
            b.iter(|| {
                let model = GraphModel::build(black_box(raw)).expect("build failed");
                black_box(model.has_cycles());
            });
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    group.sample_size(20);
    let config = LayoutConfig::default();
    let sizer = DefaultSizer::new(config.sizer.clone());
    for (label, nodes, extra, groups) in [
        ("chain_100", 100usize, 0usize, 0usize),
        ("dense_200", 200, 400, 0),
        ("grouped_500", 500, 500, 12),
        ("grouped_2000", 2_000, 1_000, 40),
    ] {
        let model = GraphModel::build(&dense_graph(nodes, extra, groups)).expect("build failed");
        let expanded = all_groups(&model);
        group.bench_with_input(BenchmarkId::new("expanded", label), &model, |b, model| {
            b.iter(|| {
                let layout = compute_layout(black_box(model), Direction::Down, &expanded, &sizer, &config);
                black_box(layout.edges.len());
            });
        });
        let collapsed = BTreeSet::new();
        group.bench_with_input(BenchmarkId::new("collapsed", label), &model, |b, model| {
            b.iter(|| {
                let layout = compute_layout(black_box(model), Direction::Down, &collapsed, &sizer, &config);
                black_box(layout.groups.len());
            });
        });
    }
    group.finish();
}

fn bench_interaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("interaction");
    let config = LayoutConfig::default();
    let model = GraphModel::build(&dense_graph(2_000, 2_000, 0)).expect("build failed");
    let layout = compute_layout(
        &model,
        Direction::Down,
        &BTreeSet::new(),
        &DefaultSizer::new(config.sizer.clone()),
        &config,
    );

    group.bench_function("path_between", |b| {
        b.iter(|| black_box(path_between(&model, black_box("bench/asset_3"), black_box("bench/asset_1997"))));
    });

    let index = HitIndex::new(&layout);
    let probe = Point::new(layout.width / 2.0, layout.height / 2.0);
    group.bench_function("hit_test", |b| {
        b.iter(|| black_box(index.hit(black_box(probe))));
    });
    group.finish();
}

criterion_group!(benches, bench_build, bench_layout, bench_interaction);
criterion_main!(benches);
