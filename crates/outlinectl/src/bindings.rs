use anyhow::{anyhow, bail, Result};
use outline::gpu::OutlineProgram;
use outline::soft::SoftRenderable;
use outline::{
    BufferFormat, CameraFrame, CameraId, CameraTarget, FloodMethod, LayerMask, LinearColor,
    OutlineConfig, RenderPassEvent, ShaderProgramRef, ShaderTag,
};
use outlineconfig::{CameraSection, FormatSetting, OutlineFile, ScheduleSetting};

use crate::cli::SceneArgs;

pub fn color(rgba: [f32; 4]) -> LinearColor {
    let [r, g, b, a] = rgba;
    LinearColor::new(r, g, b, a)
}

pub fn buffer_format(format: FormatSetting) -> BufferFormat {
    match format {
        FormatSetting::Rgba8Unorm => BufferFormat::Rgba8Unorm,
        FormatSetting::Rgba8UnormSrgb => BufferFormat::Rgba8UnormSrgb,
        FormatSetting::Bgra8Unorm => BufferFormat::Bgra8Unorm,
        FormatSetting::Bgra8UnormSrgb => BufferFormat::Bgra8UnormSrgb,
        FormatSetting::Rgba16Float => BufferFormat::Rgba16Float,
    }
}

pub fn render_event(schedule: ScheduleSetting) -> RenderPassEvent {
    match schedule {
        ScheduleSetting::BeforeOpaques => RenderPassEvent::BeforeRenderingOpaques,
        ScheduleSetting::AfterOpaques => RenderPassEvent::AfterRenderingOpaques,
        ScheduleSetting::AfterSkybox => RenderPassEvent::AfterRenderingSkybox,
        ScheduleSetting::BeforeTransparents => RenderPassEvent::BeforeRenderingTransparents,
        ScheduleSetting::AfterTransparents => RenderPassEvent::AfterRenderingTransparents,
        ScheduleSetting::BeforePostProcessing => RenderPassEvent::BeforeRenderingPostProcessing,
        ScheduleSetting::AfterPostProcessing => RenderPassEvent::AfterRenderingPostProcessing,
        ScheduleSetting::AfterRendering => RenderPassEvent::AfterRendering,
    }
}

/// Outline settings from the file with command-line overrides applied.
pub fn outline_config(file: &OutlineFile, args: &SceneArgs) -> OutlineConfig {
    let section = &file.outline;
    let method = args
        .method
        .unwrap_or(FloodMethod::from_separable_flag(section.separable_axis));
    OutlineConfig {
        enabled: section.enabled,
        outline_color: color(section.color),
        pixel_width: args.pixel_width.unwrap_or(section.pixel_width),
        layer_mask: LayerMask::from_bits(section.layers.mask()),
        use_separable_axis_method: method == FloodMethod::SeparableAxis,
        schedule: render_event(section.schedule),
    }
}

pub fn program(file: &OutlineFile) -> Option<ShaderProgramRef> {
    file.outline.program.as_deref().map(ShaderProgramRef::new)
}

/// Backends here only execute the built-in program.
pub fn require_builtin(program: Option<&ShaderProgramRef>) -> Result<()> {
    match program {
        Some(program) if program.name() != OutlineProgram::NAME => bail!(
            "shader program '{}' is not available; only '{}' is built in",
            program.name(),
            OutlineProgram::NAME
        ),
        _ => Ok(()),
    }
}

pub fn camera_target(section: &CameraSection) -> CameraTarget {
    CameraTarget::new(
        section.width,
        section.height,
        buffer_format(section.format),
        section.msaa,
    )
}

pub fn camera_frame(id: CameraId, target: CameraTarget, section: &CameraSection) -> CameraFrame {
    let frame = CameraFrame::new(id, target);
    if section.depth {
        frame
    } else {
        frame.without_depth()
    }
}

/// Picks the named camera, or the first one.
pub fn select_camera<'f>(
    file: &'f OutlineFile,
    name: Option<&str>,
) -> Result<(CameraId, &'f CameraSection)> {
    let found = match name {
        Some(name) => file
            .cameras
            .iter()
            .enumerate()
            .find(|(_, camera)| camera.name == name),
        None => file.cameras.iter().enumerate().next(),
    };
    found
        .map(|(index, camera)| (CameraId(index as u32), camera))
        .ok_or_else(|| match name {
            Some(name) => anyhow!("config has no camera named '{name}'"),
            None => anyhow!("config defines no cameras"),
        })
}

pub fn scene(file: &OutlineFile) -> Vec<SoftRenderable> {
    file.objects
        .iter()
        .enumerate()
        .map(|(index, object)| {
            SoftRenderable::new(index as u32, object.layer as u8, object.rect)
                .with_tags(
                    object
                        .tags
                        .iter()
                        .map(|tag| ShaderTag::new(tag.clone()))
                        .collect(),
                )
                .with_queue(object.queue)
                .with_depth(object.depth)
                .with_albedo(color(object.albedo))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const CONFIG: &str = r#"
version = 1

[outline]
program = "builtin"
pixel_width = 3.0
layers = [1]
separable_axis = false

[[cameras]]
name = "main"
width = 32
height = 16

[[cameras]]
name = "flat"
width = 8
height = 8
depth = false

[[objects]]
name = "box"
layer = 1
tags = ["ForwardOnly"]
rect = [0.1, 0.1, 0.2, 0.2]
"#;

    fn args() -> SceneArgs {
        SceneArgs {
            config: PathBuf::from("unused.toml"),
            pixel_width: None,
            method: None,
        }
    }

    #[test]
    fn maps_outline_section() {
        let file = OutlineFile::from_toml_str(CONFIG).unwrap();
        let config = outline_config(&file, &args());
        assert_eq!(config.pixel_width, 3.0);
        assert!(config.layer_mask.contains(1));
        assert!(!config.use_separable_axis_method);
        assert_eq!(config.schedule, RenderPassEvent::AfterRenderingOpaques);
    }

    #[test]
    fn overrides_take_precedence() {
        let file = OutlineFile::from_toml_str(CONFIG).unwrap();
        let overrides = SceneArgs {
            pixel_width: Some(9.0),
            method: Some(FloodMethod::SeparableAxis),
            ..args()
        };
        let config = outline_config(&file, &overrides);
        assert_eq!(config.pixel_width, 9.0);
        assert!(config.use_separable_axis_method);
    }

    #[test]
    fn selects_cameras_by_name() {
        let file = OutlineFile::from_toml_str(CONFIG).unwrap();
        let (id, camera) = select_camera(&file, Some("flat")).unwrap();
        assert_eq!(id, CameraId(1));
        assert!(!camera_frame(id, camera_target(camera), camera).has_depth);
        assert_eq!(select_camera(&file, None).unwrap().0, CameraId(0));
        assert!(select_camera(&file, Some("missing")).is_err());
    }

    #[test]
    fn scene_objects_keep_their_tags() {
        let file = OutlineFile::from_toml_str(CONFIG).unwrap();
        let objects = scene(&file);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].tags, vec![ShaderTag::FORWARD_ONLY]);
        assert_eq!(objects[0].layer, 1);
    }

    #[test]
    fn only_the_builtin_program_runs() {
        assert!(require_builtin(Some(&ShaderProgramRef::new("builtin"))).is_ok());
        assert!(require_builtin(None).is_ok());
        assert!(require_builtin(Some(&ShaderProgramRef::new("custom"))).is_err());
    }
}
