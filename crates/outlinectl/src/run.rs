use std::path::Path;

use anyhow::{Context, Result};
use outline::gpu::{
    read_rgba8, CameraTargets, GpuAllocator, GpuContext, GpuFrame, GpuMesh, GpuOptions,
    GpuPowerPreference, OutlineProgram,
};
use outline::soft::{SoftDevice, SoftRenderable};
use outline::{
    Command, CommandRecorder, FrameOutcome, OutlinePipeline, ScheduledStage,
};
use outlineconfig::OutlineFile;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::bindings;
use crate::cli::{GpuArgs, ImageArgs, PlanArgs, SceneArgs};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load(args: &SceneArgs) -> Result<(OutlineFile, OutlinePipeline)> {
    let file = OutlineFile::from_path(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let config = bindings::outline_config(&file, args);
    let pipeline = OutlinePipeline::with_config(&config, bindings::program(&file));
    tracing::debug!(
        config = %args.config.display(),
        cameras = file.cameras.len(),
        objects = file.objects.len(),
        active = pipeline.is_active(),
        "loaded outline scene"
    );
    Ok((file, pipeline))
}

#[derive(Debug, Serialize)]
struct FrameReport {
    camera: String,
    id: u32,
    frame: u32,
    outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
    commands: Vec<Command>,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    schedule: Vec<ScheduledStage>,
    frames: Vec<FrameReport>,
}

fn describe(outcome: &FrameOutcome) -> String {
    match outcome {
        FrameOutcome::Skipped(reason) => format!("skipped ({reason})"),
        FrameOutcome::Rendered {
            iterations,
            objects,
        } => format!("rendered iterations={iterations} objects={objects}"),
        FrameOutcome::Dropped(err) => format!("dropped ({err})"),
    }
}

pub fn plan(args: PlanArgs) -> Result<()> {
    let (file, pipeline) = load(&args.scene)?;
    let scene = bindings::scene(&file);
    let mut recorder = CommandRecorder::<SoftRenderable>::new();
    let mut frames = Vec::new();

    for frame in 0..args.frames {
        for (index, section) in file.cameras.iter().enumerate() {
            let id = outline::CameraId(index as u32);
            let camera = bindings::camera_frame(id, bindings::camera_target(section), section);
            let outcome = pipeline.render_camera(&mut recorder, &camera, &scene);
            frames.push(FrameReport {
                camera: section.name.clone(),
                id: id.0,
                frame,
                iterations: match outcome {
                    FrameOutcome::Rendered { iterations, .. } => Some(iterations),
                    _ => None,
                },
                outcome: describe(&outcome),
                commands: recorder.take_commands(),
            });
        }
    }

    let report = PlanReport {
        schedule: pipeline.scheduled_passes(),
        frames,
    };
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to encode plan")?;
        println!("{json}");
        return Ok(());
    }

    if report.schedule.is_empty() {
        println!("schedule: none");
    }
    for scheduled in &report.schedule {
        println!(
            "schedule: {} at {:?} ({})",
            scheduled.stage,
            scheduled.event,
            scheduled.event.order()
        );
    }
    for frame in &report.frames {
        println!(
            "frame {} {} ({}): {}",
            frame.frame,
            frame.camera,
            outline::CameraId(frame.id),
            frame.outcome
        );
        for command in &frame.commands {
            println!("{command}");
        }
    }
    Ok(())
}

fn write_png(image: &image::RgbaImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), width = image.width(), height = image.height(), "wrote image");
    Ok(())
}

fn log_outcome(camera: &str, outcome: &FrameOutcome) {
    match outcome {
        FrameOutcome::Rendered { .. } => tracing::info!(camera, outcome = %describe(outcome), "outline frame"),
        _ => tracing::warn!(camera, outcome = %describe(outcome), "outline frame"),
    }
}

pub fn simulate(args: ImageArgs) -> Result<()> {
    let (file, pipeline) = load(&args.scene)?;
    bindings::require_builtin(pipeline.program())?;
    let (id, section) = bindings::select_camera(&file, args.camera.as_deref())?;
    let target = bindings::camera_target(section);
    let camera = bindings::camera_frame(id, target, section);
    let scene = bindings::scene(&file);

    let mut device = SoftDevice::new(target);
    device.clear_camera(bindings::color(file.background));
    device.draw_scene(&scene);
    let outcome = pipeline.render_camera(&mut device, &camera, &scene);
    log_outcome(&section.name, &outcome);

    write_png(&device.to_rgba8(), &args.out)
}

pub fn render(args: GpuArgs) -> Result<()> {
    let image_args = &args.image;
    let (file, pipeline) = load(&image_args.scene)?;
    bindings::require_builtin(pipeline.program())?;
    let (id, section) = bindings::select_camera(&file, image_args.camera.as_deref())?;

    let context = GpuContext::new(GpuOptions {
        power: if args.high_performance {
            GpuPowerPreference::High
        } else {
            GpuPowerPreference::Low
        },
        force_fallback_adapter: args.software,
    })?;
    tracing::info!(adapter = %context.adapter_name, software = context.is_software, "using GPU adapter");

    let mut target = bindings::camera_target(section);
    target.sample_count = context.negotiate_samples(target.format, target.sample_count);
    let camera = bindings::camera_frame(id, target, section);
    let targets = CameraTargets::new(&context, target);
    let mut program = OutlineProgram::new(&context.device);
    let meshes: Vec<GpuMesh> = bindings::scene(&file)
        .iter()
        .map(|object| GpuMesh::upload(&context.device, object))
        .collect();

    targets.draw_scene(
        &context,
        &mut program,
        &meshes,
        bindings::color(file.background),
    );

    let mut allocator = GpuAllocator::new(&context);
    let outcome = {
        let mut frame = GpuFrame::new(&context, &mut allocator, &mut program, &targets);
        let outcome = pipeline.render_camera(&mut frame, &camera, &meshes);
        frame.submit();
        outcome
    };
    log_outcome(&section.name, &outcome);
    tracing::debug!(
        live = allocator.live(),
        pooled = allocator.pooled(),
        pipelines = program.cached_pipelines(),
        "gpu frame finished"
    );

    let image = read_rgba8(&context, &targets.color)?;
    write_png(&image, &image_args.out)
}
