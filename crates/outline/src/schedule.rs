//! Flood step schedule and ping-pong planning.
//!
//! The schedule is derived once per frame from the configured pixel width. It
//! decides how many flood iterations run, which step width each iteration uses
//! and which of the two nearest-point buffers every pass reads and writes.

use std::ops::{Index, IndexMut};

use serde::Serialize;

use crate::pass::ShaderPass;

/// Widest outline the pipeline will draw, in pixels.
pub const MAX_PIXEL_WIDTH: f32 = 100.0;

/// Added to every power-of-two step so shader-side truncation lands exactly on it.
pub const STEP_MARGIN: f32 = 0.5;

/// One of the two nearest-point buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    fn from_parity(parity: u32) -> Self {
        if parity % 2 == 0 {
            Self::A
        } else {
            Self::B
        }
    }

    fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Two-slot array indexed by [`Slot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingPong<T>(pub [T; 2]);

impl<T> PingPong<T> {
    pub fn new(a: T, b: T) -> Self {
        Self([a, b])
    }
}

impl<T> Index<Slot> for PingPong<T> {
    type Output = T;

    fn index(&self, slot: Slot) -> &T {
        &self.0[slot.index()]
    }
}

impl<T> IndexMut<Slot> for PingPong<T> {
    fn index_mut(&mut self, slot: Slot) -> &mut T {
        &mut self.0[slot.index()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloodMethod {
    /// One 8-neighbour pass per iteration.
    Traditional,
    /// A horizontal then a vertical 3-tap pass per iteration.
    SeparableAxis,
}

impl FloodMethod {
    pub fn from_separable_flag(separable: bool) -> Self {
        if separable {
            Self::SeparableAxis
        } else {
            Self::Traditional
        }
    }
}

/// One iteration of the flood loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloodStep {
    pub exponent: u32,
    /// `2^exponent + STEP_MARGIN`.
    pub width: f32,
}

/// Uniform consumed by a flood pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "value")]
pub enum StepParam {
    /// `_JumpFloodStepWidth` scalar for the 8-neighbour pass.
    Uniform(f32),
    /// `_JumpFloodAxisWidth` vector for the single-axis pass.
    Axis([f32; 2]),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FloodPass {
    pub pass: ShaderPass,
    pub read: Slot,
    pub write: Slot,
    pub step: StepParam,
}

/// Full buffer routing for one frame's flood.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloodPlan {
    pub method: FloodMethod,
    /// Slot the init pass writes.
    pub init_target: Slot,
    pub passes: Vec<FloodPass>,
    /// Slot holding the final nearest-point field, read by the decode pass.
    pub terminal: Slot,
}

/// Step widths and iteration count derived from a pixel width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSchedule {
    pixel_width: f32,
    iterations: u32,
}

impl StepSchedule {
    pub fn new(pixel_width: f32) -> Self {
        let pixel_width = sanitize_width(pixel_width);
        let width = pixel_width.max(1.0);
        let iterations = (width + 1.0).log2().ceil().max(1.0) as u32;
        Self {
            pixel_width,
            iterations,
        }
    }

    /// Width after clamping, before the `max(1, _)` floor.
    pub fn pixel_width(&self) -> f32 {
        self.pixel_width
    }

    /// Width handed to the decode pass as `_OutlineWidth`.
    pub fn effective_width(&self) -> f32 {
        self.pixel_width.max(1.0)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Alpha factor applied to the outline colour; fades sub-pixel widths out.
    pub fn alpha_multiplier(&self) -> f32 {
        self.pixel_width.clamp(0.0, 1.0)
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha_multiplier() <= 0.0
    }

    /// Iterations in execution order, widest step first.
    pub fn steps(&self) -> impl Iterator<Item = FloodStep> {
        (0..self.iterations).rev().map(|exponent| FloodStep {
            exponent,
            width: (1u32 << exponent) as f32 + STEP_MARGIN,
        })
    }

    pub fn plan(&self, method: FloodMethod) -> FloodPlan {
        match method {
            FloodMethod::Traditional => {
                let init_target = Slot::from_parity(self.iterations);
                let passes = self
                    .steps()
                    .map(|step| {
                        let write = Slot::from_parity(step.exponent);
                        FloodPass {
                            pass: ShaderPass::JfaFlood,
                            read: write.other(),
                            write,
                            step: StepParam::Uniform(step.width),
                        }
                    })
                    .collect();
                FloodPlan {
                    method,
                    init_target,
                    passes,
                    terminal: Slot::A,
                }
            }
            FloodMethod::SeparableAxis => {
                let passes = self
                    .steps()
                    .flat_map(|step| {
                        [
                            FloodPass {
                                pass: ShaderPass::JfaFloodSingleAxis,
                                read: Slot::A,
                                write: Slot::B,
                                step: StepParam::Axis([step.width, 0.0]),
                            },
                            FloodPass {
                                pass: ShaderPass::JfaFloodSingleAxis,
                                read: Slot::B,
                                write: Slot::A,
                                step: StepParam::Axis([0.0, step.width]),
                            },
                        ]
                    })
                    .collect();
                FloodPlan {
                    method,
                    init_target: Slot::A,
                    passes,
                    terminal: Slot::A,
                }
            }
        }
    }
}

fn sanitize_width(pixel_width: f32) -> f32 {
    if !pixel_width.is_finite() {
        return 0.0;
    }
    pixel_width.clamp(0.0, MAX_PIXEL_WIDTH)
}
