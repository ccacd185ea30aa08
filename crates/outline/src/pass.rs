use std::fmt;

use serde::Serialize;

/// Entry points the bound shader program must expose, in this exact order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShaderPass {
    InteriorStencil = 0,
    SilhouetteFill = 1,
    JfaInit = 2,
    JfaFlood = 3,
    JfaFloodSingleAxis = 4,
    JfaOutline = 5,
    BlitToTarget = 6,
}

impl ShaderPass {
    pub const COUNT: usize = 7;

    pub const ALL: [ShaderPass; Self::COUNT] = [
        Self::InteriorStencil,
        Self::SilhouetteFill,
        Self::JfaInit,
        Self::JfaFlood,
        Self::JfaFloodSingleAxis,
        Self::JfaOutline,
        Self::BlitToTarget,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Geometry passes rasterize renderables; the rest are full-screen blits.
    pub fn is_geometry(self) -> bool {
        matches!(self, Self::InteriorStencil | Self::SilhouetteFill)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InteriorStencil => "interior-stencil",
            Self::SilhouetteFill => "silhouette-fill",
            Self::JfaInit => "jfa-init",
            Self::JfaFlood => "jfa-flood",
            Self::JfaFloodSingleAxis => "jfa-flood-single-axis",
            Self::JfaOutline => "jfa-outline",
            Self::BlitToTarget => "blit-to-target",
        }
    }
}

impl fmt::Display for ShaderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.index())
    }
}
