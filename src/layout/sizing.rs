use crate::config::SizerConfig;
use crate::ir::{GraphDefinition, NodeDefinition, Size};

/// Caller-supplied box size for a node. The layout engine knows nothing about
/// fonts; this is where text measurement plugs in.
pub trait NodeSizer {
    fn size(&self, definition: &NodeDefinition) -> Size;
}

impl<F> NodeSizer for F
where
    F: Fn(&NodeDefinition) -> Size,
{
    fn size(&self, definition: &NodeDefinition) -> Size {
        self(definition)
    }
}

/// Estimates width from label length and picks a per-kind height. An explicit
/// `sizeHint` on the definition wins.
#[derive(Debug, Clone, Default)]
pub struct DefaultSizer {
    pub config: SizerConfig,
}

impl DefaultSizer {
    pub fn new(config: SizerConfig) -> Self {
        Self { config }
    }
}

impl NodeSizer for DefaultSizer {
    fn size(&self, definition: &NodeDefinition) -> Size {
        if let Some(hint) = definition.size_hint() {
            return hint;
        }
        let chars = definition.label().chars().count() as f64;
        let width = (chars * self.config.char_width + self.config.padding_x)
            .clamp(self.config.min_width, self.config.max_width.max(self.config.min_width));
        let height = match definition {
            NodeDefinition::Asset(_) => self.config.asset_height,
            NodeDefinition::Op(_) => self.config.op_height,
        };
        Size::new(width, height)
    }
}

/// Replaces non-finite or negative dimensions so one bad size cannot poison
/// the coordinates of a whole layer.
pub(super) fn sanitize(size: Size) -> Size {
    let fix = |value: f64| if value.is_finite() && value > 0.0 { value } else { 1.0 };
    Size::new(fix(size.width), fix(size.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::RawNode;

    #[test]
    fn long_labels_are_clamped() {
        let sizer = DefaultSizer::default();
        let long = "x".repeat(500);
        let node = RawNode::asset(&[long.as_str()]);
        let size = sizer.size(&node.definition);
        assert_eq!(size.width, sizer.config.max_width);
        assert_eq!(size.height, sizer.config.asset_height);
    }

    #[test]
    fn closures_are_sizers() {
        let sizer = |_: &NodeDefinition| Size::new(10.0, 20.0);
        let node = RawNode::asset(&["a"]);
        assert_eq!(sizer.size(&node.definition), Size::new(10.0, 20.0));
    }

    #[test]
    fn sanitize_replaces_nan() {
        let size = sanitize(Size::new(f64::NAN, -3.0));
        assert_eq!(size, Size::new(1.0, 1.0));
    }
}
