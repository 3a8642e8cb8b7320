//! Scene files: a TOML description of an image's layers, built into an [`Image`].
//!
//! ```toml
//! width = 64
//! height = 64
//! output = "out.png"
//!
//! [[layers]]
//! name = "background"
//! fills = [{ rect = [0, 0, 64, 64], color = [255, 255, 255, 255] }]
//!
//! [[layers]]
//! name = "ink"
//! mode = "multiply"
//! opacity = 200
//! paints = [{ rect = [8, 8, 16, 16], color = [0, 0, 255, 255] }]
//! masks = [{ name = "soften", kind = "transparency", coverage = 128 }]
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use strata_core::blend::{Blend, BlendMode};
use strata_core::colorspace::{self, builtin, ColorSpace};
use strata_core::device::PixelBuffer;
use strata_core::filter::EffectFilter;
use strata_core::graph::{Node, NodeProperties};
use strata_core::settings::CompositeSettings;
use strata_core::{Image, NodeID, Rect};

fn opaque() -> u8 {
    u8::MAX
}
fn yes() -> bool {
    true
}
fn rgba() -> String {
    builtin::RGBA8.to_owned()
}

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    #[serde(default = "rgba")]
    pub color_space: String,
    /// Relative to the scene file. The extension picks the export filter.
    pub output: PathBuf,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    /// Each frame lists which of the animated layers are shown. Animated layers are those
    /// named by any frame. No frames means a single still image.
    #[serde(default)]
    pub frames: Vec<FrameSpec>,
}

#[derive(serde::Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    #[default]
    Paint,
    Group,
}

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default)]
    pub kind: LayerKind,
    #[serde(default = "opaque")]
    pub opacity: u8,
    #[serde(default)]
    pub mode: BlendMode,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub alpha_locked: bool,
    #[serde(default)]
    pub locked: bool,
    /// Defaults to the scene's color space.
    pub color_space: Option<String>,
    /// Pixels set directly, in order.
    #[serde(default)]
    pub fills: Vec<Fill>,
    /// Pixels painted with blending, after the fills.
    #[serde(default)]
    pub paints: Vec<Paint>,
    #[serde(default)]
    pub masks: Vec<MaskSpec>,
    /// Only for groups, bottom first.
    #[serde(default)]
    pub children: Vec<LayerSpec>,
}

#[derive(serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    Transparency,
    Selection,
    Protection,
    Effect,
}

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct MaskSpec {
    pub name: String,
    pub kind: MaskKind,
    /// Coverage everywhere outside of the fills.
    #[serde(default = "opaque")]
    pub coverage: u8,
    /// Required for effect masks.
    pub filter: Option<EffectFilter>,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Fill {
    /// x, y, width, height
    pub rect: (i32, i32, u32, u32),
    pub color: Vec<u8>,
}
impl Fill {
    fn rect(&self) -> Rect {
        let (x, y, w, h) = self.rect;
        Rect::new(x, y, w, h)
    }
}

#[derive(serde::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Paint {
    pub rect: (i32, i32, u32, u32),
    pub color: Vec<u8>,
    #[serde(default)]
    pub mode: BlendMode,
    #[serde(default = "opaque")]
    pub opacity: u8,
}

#[derive(serde::Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FrameSpec {
    #[serde(default)]
    pub show: Vec<String>,
}

impl Scene {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scene {}", path.display()))?;
        let scene = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(scene)
    }
    /// Build the image. Returns it with the ids of every named layer, in tree order.
    pub fn build(&self, settings: &CompositeSettings) -> anyhow::Result<(Image, Vec<(String, NodeID)>)> {
        let space = space(&self.color_space)?;
        let image = Image::with_settings(self.width, self.height, space, settings.clone());
        let mut named = Vec::new();
        let root = image.root_node();
        for (index, layer) in self.layers.iter().enumerate() {
            build_layer(&image, root, index, layer, &mut named)?;
        }
        Ok((image, named))
    }
    /// Names of every layer whose visibility changes between frames.
    #[must_use]
    pub fn animated_layers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .frames
            .iter()
            .flat_map(|frame| frame.show.iter().map(String::as_str))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

fn space(id: &str) -> anyhow::Result<Arc<ColorSpace>> {
    colorspace::global()
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("unknown color space {id:?}"))
}

fn build_layer(
    image: &Image,
    parent: NodeID,
    index: usize,
    spec: &LayerSpec,
    named: &mut Vec<(String, NodeID)>,
) -> anyhow::Result<NodeID> {
    let space = match &spec.color_space {
        Some(id) => space(id)?,
        None => image.color_space().clone(),
    };
    let node = match spec.kind {
        LayerKind::Paint => Node::paint_layer(&spec.name, space.clone()),
        LayerKind::Group => Node::group_layer(&spec.name, space.clone()),
    };
    // Locked last, so content can still be put in.
    let properties = NodeProperties {
        opacity: spec.opacity,
        visible: spec.visible,
        alpha_locked: spec.alpha_locked,
        mode: spec.mode,
        ..NodeProperties::named(&spec.name)
    };
    let id = image
        .add_node(parent, node.with_properties(properties.clone()), index)
        .with_context(|| format!("adding layer {:?}", spec.name))?;
    named.push((spec.name.clone(), id));

    for fill in &spec.fills {
        image
            .fill(id, fill.rect(), &fill.color)
            .with_context(|| format!("filling {:?}", spec.name))?;
    }
    for paint in &spec.paints {
        let (x, y, w, h) = paint.rect;
        let source = PixelBuffer::filled(Rect::new(x, y, w, h), space.clone(), &paint.color)
            .with_context(|| format!("painting {:?}", spec.name))?;
        image
            .paint(id, &source, Blend::new(paint.mode, paint.opacity))
            .with_context(|| format!("painting {:?}", spec.name))?;
    }
    for (index, child) in spec.children.iter().enumerate() {
        if spec.kind != LayerKind::Group {
            anyhow::bail!("{:?} is not a group and can't have children", spec.name);
        }
        build_layer(image, id, index, child, named)?;
    }
    for mask in &spec.masks {
        build_mask(image, id, mask)?;
    }
    if spec.locked {
        image.set_properties(
            id,
            NodeProperties {
                locked: true,
                ..properties
            },
        )?;
    }
    Ok(id)
}

fn build_mask(image: &Image, layer: NodeID, spec: &MaskSpec) -> anyhow::Result<NodeID> {
    let node = match spec.kind {
        MaskKind::Transparency => Node::transparency_mask(&spec.name, spec.coverage),
        MaskKind::Selection => Node::selection_mask(&spec.name, spec.coverage),
        MaskKind::Protection => Node::protection_mask(&spec.name, spec.coverage),
        MaskKind::Effect => {
            let filter = spec
                .filter
                .with_context(|| format!("effect mask {:?} needs a filter", spec.name))?;
            Node::effect_mask(&spec.name, filter)
        }
    };
    let properties = NodeProperties {
        visible: spec.visible,
        ..NodeProperties::named(&spec.name)
    };
    // Masks apply in order, so each goes on top of the previous ones.
    let id = image
        .add_node(layer, node.with_properties(properties), usize::MAX)
        .with_context(|| format!("adding mask {:?}", spec.name))?;
    for fill in &spec.fills {
        image
            .fill(id, fill.rect(), &fill.color)
            .with_context(|| format!("filling mask {:?}", spec.name))?;
    }
    Ok(id)
}

#[cfg(test)]
mod test {
    use super::{LayerKind, Scene};
    use strata_core::settings::CompositeSettings;
    use strata_core::Rect;

    const SCENE: &str = r#"
        width = 4
        height = 4
        output = "out.png"

        [[layers]]
        name = "red"
        fills = [{ rect = [0, 0, 4, 4], color = [255, 0, 0, 255] }]

        [[layers]]
        name = "blue"
        opacity = 128
        fills = [{ rect = [0, 0, 4, 4], color = [0, 0, 255, 255] }]

        [[layers]]
        name = "group"
        kind = "group"
        visible = false
        children = [{ name = "inner", fills = [{ rect = [0, 0, 1, 1], color = [0, 255, 0, 255] }] }]

        [[frames]]
        show = ["group"]
        [[frames]]
    "#;

    #[test]
    fn parses_and_builds() {
        let scene: Scene = toml::from_str(SCENE).unwrap();
        assert_eq!(scene.layers[2].kind, LayerKind::Group);
        assert_eq!(scene.animated_layers(), ["group"]);
        let (image, named) = scene.build(&CompositeSettings::default()).unwrap();
        let names: Vec<_> = named.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["red", "blue", "group", "inner"]);
        let pixels = image.request_projection(Rect::new(0, 0, 1, 1)).unwrap();
        assert_eq!(pixels.data(), [127, 0, 128, 255]);
    }
    #[test]
    fn effect_masks_need_filters() {
        let text = r#"
            width = 1
            height = 1
            output = "x.png"
            [[layers]]
            name = "a"
            masks = [{ name = "m", kind = "effect" }]
        "#;
        let scene: Scene = toml::from_str(text).unwrap();
        assert!(scene.build(&CompositeSettings::default()).is_err());
    }
    #[test]
    fn unknown_keys_rejected() {
        let text = "width = 1\nheight = 1\noutput = \"x.png\"\nwdith = 3";
        assert!(toml::from_str::<Scene>(text).is_err());
    }
}
