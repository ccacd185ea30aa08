//! Selection of the scene objects that receive an outline.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::pass::ShaderPass;
use crate::types::LayerMask;

/// Light-mode tag a renderable's shader declares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShaderTag(Cow<'static, str>);

impl ShaderTag {
    pub const DEFAULT_UNLIT: ShaderTag = ShaderTag(Cow::Borrowed("DefaultUnlit"));
    pub const FORWARD: ShaderTag = ShaderTag(Cow::Borrowed("Forward"));
    pub const FORWARD_ONLY: ShaderTag = ShaderTag(Cow::Borrowed("ForwardOnly"));
    pub const LIGHTWEIGHT_FORWARD: ShaderTag = ShaderTag(Cow::Borrowed("LightweightForward"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShaderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tags the filter recognizes. An empty set recognizes nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderTagSet(Vec<ShaderTag>);

impl ShaderTagSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Forward-opaque and unlit-forward families.
    pub fn outline_default() -> Self {
        Self(vec![
            ShaderTag::DEFAULT_UNLIT,
            ShaderTag::FORWARD,
            ShaderTag::FORWARD_ONLY,
            ShaderTag::LIGHTWEIGHT_FORWARD,
        ])
    }

    pub fn with(mut self, tag: ShaderTag) -> Self {
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
        self
    }

    pub fn contains(&self, tag: &ShaderTag) -> bool {
        self.0.contains(tag)
    }

    pub fn matches_any(&self, tags: &[ShaderTag]) -> bool {
        tags.iter().any(|tag| self.contains(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShaderTag> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RenderableId(pub u32);

impl fmt::Display for RenderableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "renderable#{}", self.0)
    }
}

/// Host scene object as seen by the filter.
pub trait Renderable {
    fn id(&self) -> RenderableId;
    fn layer(&self) -> u8;
    fn shader_tags(&self) -> &[ShaderTag];

    fn render_queue(&self) -> i32 {
        RenderQueueRange::GEOMETRY_QUEUE
    }

    /// Distance from the camera along its view axis.
    fn view_depth(&self) -> f32 {
        0.0
    }
}

/// Inclusive render-queue bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderQueueRange {
    pub min: i32,
    pub max: i32,
}

impl RenderQueueRange {
    pub const GEOMETRY_QUEUE: i32 = 2000;
    pub const ALL: Self = Self {
        min: i32::MIN,
        max: i32::MAX,
    };
    pub const OPAQUE: Self = Self { min: 0, max: 2500 };
    pub const TRANSPARENT: Self = Self {
        min: 2501,
        max: 5000,
    };

    pub fn contains(&self, queue: i32) -> bool {
        (self.min..=self.max).contains(&queue)
    }
}

impl Default for RenderQueueRange {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FilteringSettings {
    pub queue_range: RenderQueueRange,
    pub layer_mask: LayerMask,
}

impl FilteringSettings {
    pub fn new(layer_mask: LayerMask) -> Self {
        Self {
            queue_range: RenderQueueRange::ALL,
            layer_mask,
        }
    }

    pub fn accepts<R: Renderable + ?Sized>(&self, renderable: &R) -> bool {
        self.layer_mask.contains(renderable.layer())
            && self.queue_range.contains(renderable.render_queue())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortingCriteria {
    /// Scene order.
    None,
    /// Render queue ascending, then front to back.
    #[default]
    CommonOpaque,
}

impl SortingCriteria {
    pub fn compare<R: Renderable + ?Sized>(self, a: &R, b: &R) -> Ordering {
        match self {
            Self::None => Ordering::Equal,
            Self::CommonOpaque => a
                .render_queue()
                .cmp(&b.render_queue())
                .then_with(|| a.view_depth().total_cmp(&b.view_depth())),
        }
    }
}

/// Which parts of a renderable's own render state the draw replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct RenderStateMask(u8);

impl RenderStateMask {
    pub const NOTHING: Self = Self(0);
    pub const BLEND: Self = Self(1);
    pub const DEPTH: Self = Self(1 << 1);
    pub const STENCIL: Self = Self(1 << 2);

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn overrides(self, part: Self) -> bool {
        self.0 & part.0 == part.0 && part.0 != 0
    }

    pub fn is_nothing(self) -> bool {
        self.0 == 0
    }
}

/// How a stage draws the selected geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrawingSettings {
    /// Pass index of the override program.
    pub pass: ShaderPass,
    pub sorting: SortingCriteria,
    pub state_override: RenderStateMask,
}

impl DrawingSettings {
    pub fn override_pass(pass: ShaderPass) -> Self {
        Self {
            pass,
            sorting: SortingCriteria::CommonOpaque,
            state_override: RenderStateMask::NOTHING,
        }
    }
}

/// Lazily filtered, read-only view over a scene.
pub struct RenderableSet<'a, R> {
    scene: &'a [R],
    filtering: FilteringSettings,
    tags: &'a ShaderTagSet,
}

impl<R> Clone for RenderableSet<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for RenderableSet<'_, R> {}

impl<R> fmt::Debug for RenderableSet<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableSet")
            .field("scene_len", &self.scene.len())
            .field("filtering", &self.filtering)
            .field("tags", &self.tags)
            .finish()
    }
}

impl<'a, R: Renderable> RenderableSet<'a, R> {
    pub fn iter(&self) -> impl Iterator<Item = &'a R> + 'a {
        let filtering = self.filtering;
        let tags = self.tags;
        self.scene.iter().filter(move |renderable| {
            !tags.is_empty()
                && filtering.accepts(*renderable)
                && tags.matches_any(renderable.shader_tags())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// Materializes the set in draw order.
    pub fn sorted(&self, criteria: SortingCriteria) -> Vec<&'a R> {
        let mut selected: Vec<&'a R> = self.iter().collect();
        selected.sort_by(|a, b| criteria.compare(*a, *b));
        selected
    }

    pub fn ids(&self) -> Vec<RenderableId> {
        self.iter().map(Renderable::id).collect()
    }
}

/// Layer-mask and shader-tag filter shared by the geometry stages.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryFilter {
    filtering: FilteringSettings,
    tags: ShaderTagSet,
}

impl GeometryFilter {
    pub fn new(layer_mask: LayerMask, tags: ShaderTagSet) -> Self {
        Self {
            filtering: FilteringSettings::new(layer_mask),
            tags,
        }
    }

    pub fn with_queue_range(mut self, range: RenderQueueRange) -> Self {
        self.filtering.queue_range = range;
        self
    }

    pub fn filtering(&self) -> FilteringSettings {
        self.filtering
    }

    pub fn tags(&self) -> &ShaderTagSet {
        &self.tags
    }

    pub fn select<'a, R: Renderable>(&'a self, scene: &'a [R]) -> RenderableSet<'a, R> {
        RenderableSet {
            scene,
            filtering: self.filtering,
            tags: &self.tags,
        }
    }
}

/// Selects renderables on `layer_mask` carrying at least one tag from `tags`.
pub fn select<'a, R: Renderable>(
    scene: &'a [R],
    layer_mask: LayerMask,
    tags: &'a ShaderTagSet,
) -> RenderableSet<'a, R> {
    RenderableSet {
        scene,
        filtering: FilteringSettings::new(layer_mask),
        tags,
    }
}
