//! Per-camera sequencing of the outline stages.

use std::fmt;

use serde::Serialize;

use crate::buffers::{BufferAllocator, FrameResources};
use crate::command::CommandSink;
use crate::error::OutlineError;
use crate::filter::{GeometryFilter, ShaderTagSet};
use crate::schedule::FloodMethod;
use crate::stages::{JumpFloodStage, MaskFillStage, SilhouetteStage, Stage, StageKind};
use crate::types::{CameraFrame, CameraId, OutlineConfig, RenderPassEvent, ShaderProgramRef};

/// Why a frame produced no outline work at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Unconfigured,
    Disabled,
    MissingProgram,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unconfigured => "pipeline not configured",
            Self::Disabled => "outline disabled",
            Self::MissingProgram => "no outline shader program",
        };
        f.write_str(text)
    }
}

/// Result of one camera's frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No buffers were acquired and no commands emitted.
    Skipped(SkipReason),
    Rendered { iterations: u32, objects: usize },
    /// The outline was abandoned mid-frame; every acquired buffer was released.
    Dropped(OutlineError),
}

impl FrameOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

/// A stage as the host should enqueue it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduledStage {
    pub event: RenderPassEvent,
    pub stage: StageKind,
}

#[derive(Debug, Clone, PartialEq)]
struct ActivePipeline {
    program: ShaderProgramRef,
    event: RenderPassEvent,
    filter: GeometryFilter,
    stages: [Stage; 3],
}

#[derive(Debug, Clone, PartialEq)]
enum PipelineState {
    Uninitialized,
    Inactive(SkipReason),
    Configured(Box<ActivePipeline>),
}

/// Owns the stage sequence and drives it for each camera.
///
/// Configuration happens between frames through `&mut self`; rendering only
/// borrows the pipeline, so one instance can serve several cameras.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlinePipeline {
    state: PipelineState,
}

impl Default for OutlinePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl OutlinePipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Uninitialized,
        }
    }

    /// Builds a pipeline and configures it in one step.
    pub fn with_config(config: &OutlineConfig, program: Option<ShaderProgramRef>) -> Self {
        let mut pipeline = Self::new();
        pipeline.configure(config, program);
        pipeline
    }

    /// Rebuilds the stages from `config`. Disabled or program-less configs
    /// leave the pipeline inactive; every later frame is a no-op.
    pub fn configure(&mut self, config: &OutlineConfig, program: Option<ShaderProgramRef>) {
        self.state = match (config.enabled, program) {
            (false, _) => PipelineState::Inactive(SkipReason::Disabled),
            (true, None) => PipelineState::Inactive(SkipReason::MissingProgram),
            (true, Some(program)) => {
                let method = FloodMethod::from_separable_flag(config.use_separable_axis_method);
                let stages = [
                    Stage::MaskFill(MaskFillStage::new()),
                    Stage::Silhouette(SilhouetteStage::new()),
                    Stage::JumpFlood(JumpFloodStage::new(
                        config.outline_color,
                        config.pixel_width,
                        method,
                    )),
                ];
                PipelineState::Configured(Box::new(ActivePipeline {
                    program,
                    event: config.schedule,
                    filter: GeometryFilter::new(config.layer_mask, ShaderTagSet::outline_default()),
                    stages,
                }))
            }
        };
        match &self.state {
            PipelineState::Configured(active) => tracing::debug!(
                program = active.program.name(),
                event = ?active.event,
                "outline pipeline configured"
            ),
            PipelineState::Inactive(reason) => {
                tracing::debug!(%reason, "outline pipeline inactive")
            }
            PipelineState::Uninitialized => {}
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PipelineState::Configured(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match &self.state {
            PipelineState::Uninitialized => Some(SkipReason::Unconfigured),
            PipelineState::Inactive(reason) => Some(*reason),
            PipelineState::Configured(_) => None,
        }
    }

    pub fn program(&self) -> Option<&ShaderProgramRef> {
        match &self.state {
            PipelineState::Configured(active) => Some(&active.program),
            _ => None,
        }
    }

    pub fn filter(&self) -> Option<&GeometryFilter> {
        match &self.state {
            PipelineState::Configured(active) => Some(&active.filter),
            _ => None,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        match &self.state {
            PipelineState::Configured(active) => &active.stages,
            _ => &[],
        }
    }

    /// Stages to enqueue with the host renderer, empty when inactive.
    pub fn scheduled_passes(&self) -> Vec<ScheduledStage> {
        match &self.state {
            PipelineState::Configured(active) => active
                .stages
                .iter()
                .map(|stage| ScheduledStage {
                    event: active.event,
                    stage: stage.kind(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Runs setup, execute and cleanup for one camera.
    ///
    /// Cleanup always runs, so the device ends the call holding no buffer this
    /// frame acquired, whatever the outcome.
    pub fn render_camera<D>(
        &self,
        device: &mut D,
        camera: &CameraFrame,
        scene: &[D::Renderable],
    ) -> FrameOutcome
    where
        D: BufferAllocator + CommandSink,
    {
        let active = match &self.state {
            PipelineState::Configured(active) => active,
            PipelineState::Uninitialized => return FrameOutcome::Skipped(SkipReason::Unconfigured),
            PipelineState::Inactive(reason) => return FrameOutcome::Skipped(*reason),
        };

        let _span = tracing::debug_span!("outline", camera = %camera.id).entered();
        let mut resources = FrameResources::new(camera.id);
        let result = active.run(device, camera, scene, &mut resources);
        active.cleanup(device, &mut resources);

        match result {
            Ok(objects) => FrameOutcome::Rendered {
                iterations: active.iterations(),
                objects,
            },
            Err(err) => {
                tracing::warn!(camera = %camera.id, error = %err, "outline dropped for this frame");
                FrameOutcome::Dropped(err)
            }
        }
    }

    /// Renders every camera in order; each gets its own frame resources.
    pub fn render_cameras<D>(
        &self,
        device: &mut D,
        cameras: &[CameraFrame],
        scene: &[D::Renderable],
    ) -> Vec<(CameraId, FrameOutcome)>
    where
        D: BufferAllocator + CommandSink,
    {
        cameras
            .iter()
            .map(|camera| (camera.id, self.render_camera(device, camera, scene)))
            .collect()
    }
}

impl ActivePipeline {
    fn run<D>(
        &self,
        device: &mut D,
        camera: &CameraFrame,
        scene: &[D::Renderable],
        resources: &mut FrameResources,
    ) -> Result<usize, OutlineError>
    where
        D: BufferAllocator + CommandSink,
    {
        for stage in &self.stages {
            stage.setup(device, camera, resources)?;
        }
        let renderables = self.filter.select(scene);
        let objects = renderables.count();
        tracing::debug!(camera = %camera.id, objects, "executing outline stages");
        for stage in &self.stages {
            stage.execute(device, camera, resources, renderables)?;
        }
        Ok(objects)
    }

    fn cleanup<A>(&self, allocator: &mut A, resources: &mut FrameResources)
    where
        A: BufferAllocator + ?Sized,
    {
        for stage in self.stages.iter().rev() {
            stage.cleanup(allocator, resources);
        }
        let stray = resources.release_all(allocator);
        if stray > 0 {
            tracing::warn!(camera = %resources.camera(), stray, "released buffers no stage claimed");
        }
    }

    fn iterations(&self) -> u32 {
        self.stages
            .iter()
            .find_map(|stage| match stage {
                Stage::JumpFlood(flood) => Some(flood.schedule().iterations()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{AllocError, BufferFormat, BufferHandle, BufferSemantic};
    use crate::command::{Command, CommandRecorder, RenderTarget};
    use crate::filter::{Renderable, RenderableId, ShaderTag};
    use crate::pass::ShaderPass;
    use crate::types::{CameraTarget, LayerMask, LinearColor};
    use std::collections::BTreeMap;

    struct Probe {
        id: u32,
        layer: u8,
        tags: Vec<ShaderTag>,
    }

    impl Renderable for Probe {
        fn id(&self) -> RenderableId {
            RenderableId(self.id)
        }
        fn layer(&self) -> u8 {
            self.layer
        }
        fn shader_tags(&self) -> &[ShaderTag] {
            &self.tags
        }
    }

    fn scene() -> Vec<Probe> {
        vec![
            Probe {
                id: 0,
                layer: 3,
                tags: vec![ShaderTag::FORWARD],
            },
            Probe {
                id: 1,
                layer: 0,
                tags: vec![ShaderTag::FORWARD],
            },
        ]
    }

    fn config(width: f32, separable: bool) -> OutlineConfig {
        OutlineConfig {
            outline_color: LinearColor::new(1.0, 0.5, 0.0, 1.0),
            pixel_width: width,
            layer_mask: LayerMask::from_layers([3]),
            use_separable_axis_method: separable,
            ..OutlineConfig::default()
        }
    }

    fn camera(id: u32) -> CameraFrame {
        CameraFrame::new(
            CameraId(id),
            CameraTarget::new(64, 48, BufferFormat::Rgba8UnormSrgb, 4),
        )
    }

    fn program() -> Option<ShaderProgramRef> {
        Some(ShaderProgramRef::new("builtin"))
    }

    fn acquired_semantics(commands: &[Command]) -> BTreeMap<BufferHandle, BufferSemantic> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Acquire { handle, descriptor } => Some((*handle, descriptor.semantic)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_acquired_buffer_is_released_once() {
        for separable in [false, true] {
            let pipeline = OutlinePipeline::with_config(&config(4.0, separable), program());
            let mut recorder = CommandRecorder::<Probe>::new();
            let outcome = pipeline.render_camera(&mut recorder, &camera(0), &scene());
            assert_eq!(
                outcome,
                FrameOutcome::Rendered {
                    iterations: 3,
                    objects: 1
                }
            );
            assert_eq!(recorder.acquisitions(), 4);
            assert_eq!(recorder.releases(), 4);
            assert!(recorder.is_idle());

            let semantics = acquired_semantics(recorder.commands());
            let mut released: Vec<_> = recorder
                .commands()
                .iter()
                .filter_map(|c| match c {
                    Command::Release { handle } => semantics.get(handle).copied(),
                    _ => None,
                })
                .collect();
            released.sort();
            assert_eq!(released, BufferSemantic::ALL);
        }
    }

    #[test]
    fn disabled_or_programless_frames_do_nothing() {
        let disabled = OutlineConfig {
            enabled: false,
            ..config(4.0, true)
        };
        let cases = [
            (OutlinePipeline::new(), SkipReason::Unconfigured),
            (
                OutlinePipeline::with_config(&disabled, program()),
                SkipReason::Disabled,
            ),
            (
                OutlinePipeline::with_config(&config(4.0, true), None),
                SkipReason::MissingProgram,
            ),
        ];
        for (pipeline, reason) in cases {
            let mut recorder = CommandRecorder::<Probe>::new();
            let outcome = pipeline.render_camera(&mut recorder, &camera(0), &scene());
            assert_eq!(outcome, FrameOutcome::Skipped(reason));
            assert!(recorder.commands().is_empty());
            assert!(pipeline.scheduled_passes().is_empty());
        }
    }

    #[test]
    fn failed_acquisition_releases_siblings() {
        let pipeline = OutlinePipeline::with_config(&config(4.0, false), program());
        let mut recorder = CommandRecorder::<Probe>::new().reject_format(BufferFormat::Rg16Snorm);
        let outcome = pipeline.render_camera(&mut recorder, &camera(0), &scene());
        assert_eq!(
            outcome,
            FrameOutcome::Dropped(OutlineError::Allocation {
                semantic: BufferSemantic::NearestPoint,
                source: AllocError::UnsupportedFormat {
                    format: BufferFormat::Rg16Snorm,
                    reason: "rejected by recorder".into(),
                },
            })
        );
        assert_eq!(recorder.acquisitions(), 2);
        assert_eq!(recorder.releases(), 2);
        assert_eq!(recorder.render_commands().count(), 0);
        assert!(recorder.is_idle());
    }

    #[test]
    fn zero_extent_camera_drops_the_frame() {
        let pipeline = OutlinePipeline::with_config(&config(4.0, true), program());
        let mut recorder = CommandRecorder::<Probe>::new();
        let empty = CameraFrame::new(
            CameraId(7),
            CameraTarget::new(0, 10, BufferFormat::Rgba8Unorm, 1),
        );
        let outcome = pipeline.render_camera(&mut recorder, &empty, &scene());
        assert!(matches!(
            outcome,
            FrameOutcome::Dropped(OutlineError::Allocation {
                source: AllocError::ZeroExtent { .. },
                ..
            })
        ));
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let pipeline = OutlinePipeline::with_config(&config(2.0, true), program());
        let mut recorder = CommandRecorder::<Probe>::new();
        pipeline.render_camera(&mut recorder, &camera(0), &scene());
        let samples: Vec<_> = recorder
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BeginSample { name } => Some(*name),
                _ => None,
            })
            .collect();
        assert_eq!(samples, ["mask_fill", "silhouette", "jump_flood"]);
        let kinds: Vec<_> = pipeline
            .scheduled_passes()
            .into_iter()
            .map(|scheduled| scheduled.stage)
            .collect();
        assert_eq!(
            kinds,
            [StageKind::MaskFill, StageKind::Silhouette, StageKind::JumpFlood]
        );
    }

    #[test]
    fn cameras_never_share_buffers() {
        let pipeline = OutlinePipeline::with_config(&config(4.0, true), program());
        let mut recorder = CommandRecorder::<Probe>::new();
        let outcomes =
            pipeline.render_cameras(&mut recorder, &[camera(0), camera(1)], &scene());
        assert!(outcomes.iter().all(|(_, outcome)| outcome.is_rendered()));

        // Each camera's buffers must all be released before the next camera acquires.
        let mut live = 0usize;
        let mut max_live = 0usize;
        for command in recorder.commands() {
            match command {
                Command::Acquire { .. } => live += 1,
                Command::Release { .. } => live -= 1,
                _ => {}
            }
            max_live = max_live.max(live);
        }
        assert_eq!(max_live, 4);
        assert_eq!(recorder.acquisitions(), 8);
        assert!(recorder.is_idle());
    }

    #[test]
    fn zero_width_still_runs_full_sequence_transparently() {
        let pipeline = OutlinePipeline::with_config(&config(0.0, false), program());
        let mut recorder = CommandRecorder::<Probe>::new();
        let outcome = pipeline.render_camera(&mut recorder, &camera(0), &scene());
        assert_eq!(
            outcome,
            FrameOutcome::Rendered {
                iterations: 1,
                objects: 1
            }
        );
        let passes: Vec<_> = recorder.blits().map(|(_, _, pass)| pass).collect();
        assert_eq!(
            passes,
            [
                ShaderPass::JfaInit,
                ShaderPass::JfaFlood,
                ShaderPass::JfaOutline,
                ShaderPass::BlitToTarget
            ]
        );
        let color = recorder.commands().iter().find_map(|c| match c {
            Command::SetGlobal {
                value: crate::command::UniformValue::Color(color),
                ..
            } => Some(*color),
            _ => None,
        });
        assert_eq!(color.map(|c| c.a), Some(0.0));
    }

    #[test]
    fn traditional_flood_ends_in_nearest_point_buffer() {
        for width in [1.0, 3.0, 4.0, 20.0] {
            let pipeline = OutlinePipeline::with_config(&config(width, false), program());
            let mut recorder = CommandRecorder::<Probe>::new();
            pipeline.render_camera(&mut recorder, &camera(0), &scene());
            let semantics = acquired_semantics(recorder.commands());
            let decode_source = recorder
                .blits()
                .find(|(_, _, pass)| *pass == ShaderPass::JfaOutline)
                .map(|(source, _, _)| source);
            let Some(RenderTarget::Buffer(handle)) = decode_source else {
                panic!("decode pass missing for width {width}");
            };
            assert_eq!(semantics[&handle], BufferSemantic::NearestPoint);
        }
    }

    #[test]
    fn silhouette_skips_depth_when_camera_has_none() {
        let pipeline = OutlinePipeline::with_config(&config(4.0, true), program());
        let mut recorder = CommandRecorder::<Probe>::new();
        pipeline.render_camera(&mut recorder, &camera(0).without_depth(), &scene());
        let depths: Vec<_> = recorder
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawRenderers { target, .. } => Some(target.depth),
                _ => None,
            })
            .collect();
        assert_eq!(depths, [None, None]);
    }

    #[test]
    fn pipeline_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OutlinePipeline>();
    }
}
