//! Process-wide table of shader property identifiers.
//!
//! Buffers and uniforms are bound by name in the shader program. The names are
//! interned once into small integer ids so commands can carry a `Copy` key; the
//! table is built on first use and never changes afterwards.

use std::fmt;
use std::sync::OnceLock;

use serde::{Serialize, Serializer};

/// Interned shader property name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u32);

impl PropertyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn name(self) -> &'static str {
        properties().name(self)
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({}:{})", self.0, self.name())
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for PropertyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Binding names used by the outline shader program.
///
/// Keep in sync with `shaders/fullscreen.wgsl` and any host-provided program.
const PROPERTY_NAMES: [&str; 8] = [
    "_OutlineMask",
    "_SilhouetteBuffer",
    "_NearestPoint",
    "_NearestPointPingPong",
    "_OutlineColor",
    "_OutlineWidth",
    "_JumpFloodStepWidth",
    "_JumpFloodAxisWidth",
];

/// Read-only registry of every property the pipeline touches.
#[derive(Debug)]
pub struct ShaderProperties {
    names: &'static [&'static str],
    pub mask_buffer: PropertyId,
    pub silhouette_buffer: PropertyId,
    pub nearest_point: PropertyId,
    pub nearest_point_ping_pong: PropertyId,
    pub outline_color: PropertyId,
    pub outline_width: PropertyId,
    pub step_width: PropertyId,
    pub axis_width: PropertyId,
}

impl ShaderProperties {
    fn builtin() -> Self {
        let id = |name: &str| {
            let index = PROPERTY_NAMES
                .iter()
                .position(|candidate| *candidate == name)
                .unwrap_or_default();
            PropertyId(index as u32)
        };
        Self {
            names: &PROPERTY_NAMES,
            mask_buffer: id("_OutlineMask"),
            silhouette_buffer: id("_SilhouetteBuffer"),
            nearest_point: id("_NearestPoint"),
            nearest_point_ping_pong: id("_NearestPointPingPong"),
            outline_color: id("_OutlineColor"),
            outline_width: id("_OutlineWidth"),
            step_width: id("_JumpFloodStepWidth"),
            axis_width: id("_JumpFloodAxisWidth"),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<PropertyId> {
        self.names
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| PropertyId(index as u32))
    }

    pub fn name(&self, id: PropertyId) -> &'static str {
        self.names.get(id.index()).copied().unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Returns the process-wide property registry, building it on first use.
pub fn properties() -> &'static ShaderProperties {
    static REGISTRY: OnceLock<ShaderProperties> = OnceLock::new();
    REGISTRY.get_or_init(ShaderProperties::builtin)
}
