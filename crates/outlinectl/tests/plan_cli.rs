use std::fs;
use std::process::Command;

use tempfile::TempDir;

const SCENE: &str = r##"
version = 1
background = [0.0, 0.0, 0.0, 1.0]

[outline]
program = "builtin"
color = "#ff0000"
pixel_width = 4.0
layers = [2]
separable_axis = true

[[cameras]]
name = "main"
width = 32
height = 24
msaa = 4

[[objects]]
name = "box"
layer = 2
rect = [0.25, 0.25, 0.5, 0.5]
albedo = [0.0, 1.0, 0.0]

[[objects]]
name = "floor"
layer = 0
rect = [0.0, 0.8, 1.0, 0.2]
depth = 2.0
"##;

fn write_scene(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("scene.toml");
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn plan_prints_the_full_pass_sequence() {
    let dir = TempDir::new().unwrap();
    let config = write_scene(&dir, SCENE);

    let output = Command::new(env!("CARGO_BIN_EXE_outlinectl"))
        .args(["plan", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run outlinectl plan");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("rendered iterations=3 objects=1"), "{stdout}");
    let interior = stdout.find("draw interior-stencil(0)").expect("interior draw");
    let silhouette = stdout.find("draw silhouette-fill(1)").expect("silhouette draw");
    let init = stdout.find("blit jfa-init(2)").expect("init blit");
    let decode = stdout.find("blit jfa-outline(5)").expect("decode blit");
    let composite = stdout.find("blit blit-to-target(6)").expect("composite blit");
    assert!(interior < silhouette && silhouette < init && init < decode && decode < composite);
    assert_eq!(stdout.matches("blit jfa-flood-single-axis(4)").count(), 6);
    assert_eq!(stdout.matches("acquire ").count(), stdout.matches("release ").count());
}

#[test]
fn plan_json_reports_every_frame() {
    let dir = TempDir::new().unwrap();
    let config = write_scene(&dir, SCENE);

    let output = Command::new(env!("CARGO_BIN_EXE_outlinectl"))
        .args(["plan", "--json", "--frames", "2", "--method", "traditional", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run outlinectl plan --json");
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let frames = report["frames"].as_array().unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(report["schedule"].as_array().unwrap().len(), 3);
    for frame in frames {
        assert_eq!(frame["iterations"], 3);
        let commands = frame["commands"].as_array().unwrap();
        let floods = commands
            .iter()
            .filter(|c| c["op"] == "blit" && c["pass"] == "jfa-flood")
            .count();
        assert_eq!(floods, 3);
    }
}

#[test]
fn plan_without_program_emits_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_scene(&dir, &SCENE.replace("program = \"builtin\"\n", ""));

    let output = Command::new(env!("CARGO_BIN_EXE_outlinectl"))
        .args(["plan", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run outlinectl plan");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("schedule: none"), "{stdout}");
    assert!(stdout.contains("skipped"), "{stdout}");
    assert!(!stdout.contains("acquire "), "{stdout}");
}

#[test]
fn simulate_writes_a_png() {
    let dir = TempDir::new().unwrap();
    let config = write_scene(&dir, SCENE);
    let out = dir.path().join("frame.png");

    let status = Command::new(env!("CARGO_BIN_EXE_outlinectl"))
        .args(["simulate", "--config"])
        .arg(&config)
        .arg("--out")
        .arg(&out)
        .status()
        .expect("failed to run outlinectl simulate");
    assert!(status.success());

    let image = image::open(&out).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (32, 24));
    // Left of the box, inside the outline band.
    assert_eq!(image.get_pixel(6, 12).0, [255, 0, 0, 255]);
    assert_eq!(image.get_pixel(16, 12).0, [0, 255, 0, 255]);
}

#[test]
fn invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_scene(&dir, "version = 1\n[outline]\npixel_width = -3.0\n");

    let output = Command::new(env!("CARGO_BIN_EXE_outlinectl"))
        .args(["plan", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run outlinectl plan");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("pixel_width"), "{stderr}");
}
