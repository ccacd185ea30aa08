use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use outline::FloodMethod;

#[derive(Parser, Debug)]
#[command(
    name = "outlinectl",
    author,
    version,
    about = "Plan, simulate and render jump-flood outlines"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the command stream every configured camera would execute.
    Plan(PlanArgs),
    /// Render the scene on the CPU reference backend and write a PNG.
    Simulate(ImageArgs),
    /// Render the scene headlessly with wgpu and write a PNG.
    Render(GpuArgs),
}

#[derive(Args, Debug)]
pub struct SceneArgs {
    /// Scene and outline settings (TOML).
    #[arg(long, short, value_name = "FILE", env = "OUTLINECTL_CONFIG")]
    pub config: PathBuf,

    /// Override `outline.pixel_width` from the config.
    #[arg(long, value_name = "PIXELS")]
    pub pixel_width: Option<f32>,

    /// Override the flood method: `separable` or `traditional`.
    #[arg(long, value_name = "METHOD", value_parser = parse_method)]
    pub method: Option<FloodMethod>,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub scene: SceneArgs,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Number of frames to run per camera.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub frames: u32,
}

#[derive(Args, Debug)]
pub struct ImageArgs {
    #[command(flatten)]
    pub scene: SceneArgs,

    /// PNG file to write.
    #[arg(long, short, value_name = "PATH", value_parser = parse_png_path)]
    pub out: PathBuf,

    /// Camera to render; defaults to the first configured camera.
    #[arg(long, value_name = "NAME")]
    pub camera: Option<String>,
}

#[derive(Args, Debug)]
pub struct GpuArgs {
    #[command(flatten)]
    pub image: ImageArgs,

    /// Prefer a discrete GPU over an integrated one.
    #[arg(long)]
    pub high_performance: bool,

    /// Use a software adapter when one is available.
    #[arg(long)]
    pub software: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_method(value: &str) -> Result<FloodMethod, String> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "separable" | "separable-axis" | "axis" => Ok(FloodMethod::SeparableAxis),
        "traditional" | "full" => Ok(FloodMethod::Traditional),
        "" => Err("flood method must not be empty".to_string()),
        other => Err(format!(
            "unknown flood method '{other}'; expected separable or traditional"
        )),
    }
}

pub fn parse_png_path(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    match extension(&path).as_deref() {
        Some("png") => Ok(path),
        None => Err("output path has no extension; expected .png".to_string()),
        Some(other) => Err(format!(
            "unsupported output format '.{other}'; expected .png"
        )),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flood_methods() {
        assert_eq!(parse_method("Separable"), Ok(FloodMethod::SeparableAxis));
        assert_eq!(parse_method("traditional"), Ok(FloodMethod::Traditional));
        assert!(parse_method("diagonal").is_err());
    }

    #[test]
    fn output_must_be_png() {
        assert!(parse_png_path("out.PNG").is_ok());
        assert!(parse_png_path("out.exr").is_err());
        assert!(parse_png_path("out").is_err());
    }
}
