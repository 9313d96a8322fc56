use crate::config::load_config;
use crate::graph::GraphModel;
use crate::ir::{Direction, RawNode};
use crate::layout::{DefaultSizer, compute_layout};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::selection::path_between;
use crate::viewport::ViewportController;
use crate::worker::CYCLE_MESSAGE;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aglayout", version, about = "Lay out asset dependency graphs")]
pub struct Args {
    /// Graph JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the layout JSON. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Flow direction
    #[arg(short = 'd', long = "direction", value_enum, default_value = "down")]
    pub direction: DirectionArg,

    /// Group id to expand (group@repository@location). Repeatable.
    #[arg(short = 'x', long = "expand")]
    pub expand: Vec<String>,

    /// Config JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Report the selection path between two node tokens
    #[arg(long = "path", num_args = 2, value_names = ["FROM", "TO"])]
    pub path: Option<Vec<String>>,

    /// Report the zoom-to-fit transform for a WIDTHxHEIGHT viewport
    #[arg(long = "fit", value_parser = parse_viewport_size)]
    pub fit: Option<(f64, f64)>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum DirectionArg {
    Down,
    Up,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Down => Direction::Down,
            DirectionArg::Up => Direction::Up,
        }
    }
}

/// Graph input: either a bare array of node records or `{"nodes": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum GraphInput {
    Nodes(Vec<RawNode>),
    Wrapped { nodes: Vec<RawNode> },
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref())
        .with_context(|| format!("failed to load config {:?}", args.config))?;
    let input = read_input(args.input.as_deref())?;
    let raw = parse_graph_input(&input)?;
    let model = GraphModel::build(&raw)?;
    if model.has_cycles() {
        return Err(anyhow::anyhow!(CYCLE_MESSAGE));
    }

    let direction = Direction::from(args.direction);
    let expanded: BTreeSet<String> = args.expand.into_iter().collect();
    let sizer = DefaultSizer::new(config.layout.sizer.clone());
    let layout = compute_layout(&model, direction, &expanded, &sizer, &config.layout);

    let mut dump = LayoutDump::from_layout(&layout, &model, direction);
    if let Some([from, to]) = args.path.as_deref() {
        dump.path = Some(path_between(&model, from, to));
    }
    if let Some((width, height)) = args.fit {
        let mut viewport = ViewportController::new(config.viewport.clone(), width, height);
        dump.viewport = Some(viewport.zoom_to_fit(layout.width, layout.height, width, height));
    }
    write_layout_dump(args.output.as_deref(), &dump)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn parse_graph_input(input: &str) -> Result<Vec<RawNode>> {
    let parsed: GraphInput = serde_json::from_str(input).context("invalid graph JSON")?;
    Ok(match parsed {
        GraphInput::Nodes(nodes) | GraphInput::Wrapped { nodes } => nodes,
    })
}

fn parse_viewport_size(value: &str) -> Result<(f64, f64), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let parse = |part: &str| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| format!("invalid viewport dimension `{part}`"))
    };
    Ok((parse(width)?, parse(height)?))
}
