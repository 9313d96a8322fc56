use asset_graph_layout::config::LayoutConfig;
use asset_graph_layout::visibility;
use asset_graph_layout::worker::handle_message_with;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutOptions {
    node_spacing: Option<f64>,
    rank_spacing: Option<f64>,
    margin: Option<f64>,
    expand_lone_group: Option<bool>,
}

fn build_layout_config(options: LayoutOptions) -> LayoutConfig {
    let mut config = LayoutConfig::default();
    if let Some(node_spacing) = options.node_spacing {
        config.node_spacing = node_spacing;
    }
    if let Some(rank_spacing) = options.rank_spacing {
        config.rank_spacing = rank_spacing;
    }
    if let Some(margin) = options.margin {
        config.margin = margin;
    }
    if let Some(expand_lone_group) = options.expand_lone_group {
        config.expand_lone_group = expand_lone_group;
    }
    config
}

/// Worker entry point: takes a layout request JSON and returns the response
/// JSON (`{seq, layout}` or `{seq, error}`).
#[wasm_bindgen]
pub fn handle_layout_message(message: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let options = if let Some(raw_options) = options_json {
        serde_json::from_str::<LayoutOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?
    } else {
        LayoutOptions::default()
    };
    Ok(handle_message_with(message, &build_layout_config(options)))
}

/// Forwarded from the page's single `visibilitychange` listener.
#[wasm_bindgen]
pub fn notify_visibility_change(visible: bool) {
    visibility::notify(visible);
}

#[cfg(test)]
mod tests {
    use asset_graph_layout::worker::{LayoutOutcome, LayoutResponse};

    use crate::{LayoutOptions, build_layout_config};
    use asset_graph_layout::worker::handle_message_with;

    #[test]
    fn lays_out_a_request_with_custom_margin() {
        let request = r#"{
            "seq": 1,
            "direction": "up",
            "nodes": [
                {"kind": "asset", "assetKey": {"path": ["a"]}},
                {"kind": "op", "handle": ["b"]}
            ],
            "edges": [{"from": "a", "to": "b"}]
        }"#;
        let options = LayoutOptions {
            margin: Some(10.0),
            ..LayoutOptions::default()
        };
        let reply = handle_message_with(request, &build_layout_config(options));
        let response: LayoutResponse = serde_json::from_str(&reply).expect("reply should decode");
        let LayoutOutcome::Layout(layout) = response.outcome else {
            panic!("expected a layout");
        };
        assert!(layout.nodes["b"].bounds.bottom() < layout.nodes["a"].bounds.y);
        let min_x = layout.nodes.values().map(|n| n.bounds.x).fold(f64::MAX, f64::min);
        assert!((min_x - 10.0).abs() < 1e-9);
    }
}
