use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const MAX_PIXEL_WIDTH: f32 = 100.0;
pub const LAYER_COUNT: u32 = 32;
pub const SAMPLE_COUNTS: [u32; 5] = [1, 2, 4, 8, 16];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Host render-pass event the outline is scheduled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleSetting {
    BeforeOpaques,
    #[default]
    AfterOpaques,
    AfterSkybox,
    BeforeTransparents,
    AfterTransparents,
    BeforePostProcessing,
    AfterPostProcessing,
    AfterRendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatSetting {
    Rgba8Unorm,
    #[default]
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
}

/// Either a raw bit mask or a list of layer indices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LayerSelection {
    Mask(u32),
    Layers(Vec<u32>),
}

impl Default for LayerSelection {
    fn default() -> Self {
        Self::Mask(0)
    }
}

impl LayerSelection {
    /// Bit mask of the selection; out-of-range layers are dropped.
    pub fn mask(&self) -> u32 {
        match self {
            Self::Mask(mask) => *mask,
            Self::Layers(layers) => layers
                .iter()
                .filter(|layer| **layer < LAYER_COUNT)
                .fold(0, |mask, layer| mask | 1u32 << *layer),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutlineFile {
    pub version: u32,
    #[serde(
        default = "default_background",
        deserialize_with = "deserialize_color"
    )]
    pub background: [f32; 4],
    #[serde(default)]
    pub outline: OutlineSection,
    #[serde(default)]
    pub cameras: Vec<CameraSection>,
    #[serde(default)]
    pub objects: Vec<ObjectSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutlineSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default = "default_color", deserialize_with = "deserialize_color")]
    pub color: [f32; 4],
    #[serde(default = "default_pixel_width")]
    pub pixel_width: f32,
    #[serde(default)]
    pub layers: LayerSelection,
    #[serde(default = "default_true")]
    pub separable_axis: bool,
    #[serde(default)]
    pub schedule: ScheduleSetting,
}

impl Default for OutlineSection {
    fn default() -> Self {
        Self {
            enabled: true,
            program: None,
            color: default_color(),
            pixel_width: default_pixel_width(),
            layers: LayerSelection::default(),
            separable_axis: true,
            schedule: ScheduleSetting::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraSection {
    pub name: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_msaa", deserialize_with = "deserialize_msaa")]
    pub msaa: u32,
    #[serde(default)]
    pub format: FormatSetting,
    /// Whether the camera has a depth buffer the silhouette can test against.
    #[serde(default = "default_true")]
    pub depth: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectSection {
    pub name: String,
    #[serde(default)]
    pub layer: u32,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    pub rect: [f32; 4],
    #[serde(default = "default_queue")]
    pub queue: i32,
    #[serde(default = "default_depth")]
    pub depth: f32,
    #[serde(default = "default_albedo", deserialize_with = "deserialize_color")]
    pub albedo: [f32; 4],
}

fn default_true() -> bool {
    true
}

fn default_color() -> [f32; 4] {
    [1.0; 4]
}

fn default_background() -> [f32; 4] {
    [0.02, 0.02, 0.05, 1.0]
}

fn default_albedo() -> [f32; 4] {
    [0.5, 0.5, 0.5, 1.0]
}

fn default_pixel_width() -> f32 {
    4.0
}

fn default_msaa() -> u32 {
    1
}

fn default_tags() -> Vec<String> {
    vec!["Forward".to_string()]
}

fn default_queue() -> i32 {
    2000
}

fn default_depth() -> f32 {
    1.0
}

fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Parses `#rrggbb` or `#rrggbbaa`; colour channels are sRGB, alpha is linear.
fn parse_hex_color(raw: &str) -> Result<[f32; 4], String> {
    let digits = raw.trim().trim_start_matches('#');
    if !matches!(digits.len(), 6 | 8) || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!("invalid hex colour '{raw}'; expected #rrggbb or #rrggbbaa"));
    }
    let channel = |index: usize| {
        u8::from_str_radix(&digits[index * 2..index * 2 + 2], 16)
            .map(|value| value as f32 / 255.0)
            .map_err(|err| format!("invalid hex colour '{raw}': {err}"))
    };
    let alpha = if digits.len() == 8 { channel(3)? } else { 1.0 };
    Ok([
        srgb_to_linear(channel(0)?),
        srgb_to_linear(channel(1)?),
        srgb_to_linear(channel(2)?),
        alpha,
    ])
}

fn deserialize_color<'de, D>(deserializer: D) -> Result<[f32; 4], D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = [f32; 4];

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a hex colour string or a list of 3 or 4 linear floats")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            parse_hex_color(v).map_err(E::custom)
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut channels = Vec::with_capacity(4);
            while let Some(value) = seq.next_element::<f64>()? {
                channels.push(value as f32);
            }
            match channels.as_slice() {
                [r, g, b] => Ok([*r, *g, *b, 1.0]),
                [r, g, b, a] => Ok([*r, *g, *b, *a]),
                other => Err(de::Error::invalid_length(other.len(), &self)),
            }
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn deserialize_msaa<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Num(value) => {
            if value < 0 {
                return Err(de::Error::custom("msaa sample count must be non-negative"));
            }
            Ok((value as u32).max(1))
        }
        Helper::Str(raw) => parse_msaa(&raw).map_err(de::Error::custom),
    }
}

fn parse_msaa(raw: &str) -> Result<u32, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "off" | "none" | "disabled" | "0" | "1" => Ok(1),
        other => other
            .parse::<u32>()
            .map_err(|_| format!("invalid msaa setting '{other}'")),
    }
}

impl OutlineFile {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: OutlineFile = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn camera(&self, name: &str) -> Option<&CameraSection> {
        self.cameras.iter().find(|camera| camera.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let outline = &self.outline;
        if !outline.pixel_width.is_finite()
            || !(0.0..=MAX_PIXEL_WIDTH).contains(&outline.pixel_width)
        {
            return Err(ConfigError::Invalid(format!(
                "outline.pixel_width must be within 0..={MAX_PIXEL_WIDTH}, got {}",
                outline.pixel_width
            )));
        }
        validate_color("outline.color", outline.color)?;
        validate_color("background", self.background)?;
        if let LayerSelection::Layers(layers) = &outline.layers {
            if let Some(layer) = layers.iter().find(|layer| **layer >= LAYER_COUNT) {
                return Err(ConfigError::Invalid(format!(
                    "outline.layers contains layer {layer}; layers are 0..{LAYER_COUNT}"
                )));
            }
        }
        if let Some(program) = &outline.program {
            if program.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "outline.program may not be empty; omit it instead".into(),
                ));
            }
        }

        let mut names = BTreeSet::new();
        for camera in &self.cameras {
            if camera.name.trim().is_empty() {
                return Err(ConfigError::Invalid("camera name may not be empty".into()));
            }
            if !names.insert(camera.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate camera '{}'",
                    camera.name
                )));
            }
            if camera.width == 0 || camera.height == 0 {
                return Err(ConfigError::Invalid(format!(
                    "camera '{}' must have a non-zero size, got {}x{}",
                    camera.name, camera.width, camera.height
                )));
            }
            if !SAMPLE_COUNTS.contains(&camera.msaa) {
                return Err(ConfigError::Invalid(format!(
                    "camera '{}' msaa must be one of {SAMPLE_COUNTS:?}, got {}",
                    camera.name, camera.msaa
                )));
            }
        }

        for object in &self.objects {
            if object.layer >= LAYER_COUNT {
                return Err(ConfigError::Invalid(format!(
                    "object '{}' layer {} is out of range 0..{LAYER_COUNT}",
                    object.name, object.layer
                )));
            }
            let [x, y, w, h] = object.rect;
            if ![x, y, w, h].iter().all(|v| v.is_finite()) || w <= 0.0 || h <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "object '{}' has a degenerate rect {:?}",
                    object.name, object.rect
                )));
            }
            if !object.depth.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "object '{}' depth must be finite",
                    object.name
                )));
            }
            validate_color(&format!("object '{}' albedo", object.name), object.albedo)?;
        }

        Ok(())
    }
}

fn validate_color(field: &str, color: [f32; 4]) -> Result<(), ConfigError> {
    if color.iter().any(|c| !c.is_finite() || *c < 0.0) {
        return Err(ConfigError::Invalid(format!(
            "{field} channels must be finite and non-negative, got {color:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[outline]
program = "builtin"
color = "#ff8000"
pixel_width = 6.5
layers = [3, 5]
separable_axis = false
schedule = "after-transparents"

[[cameras]]
name = "main"
width = 320
height = 180
msaa = 4

[[cameras]]
name = "inset"
width = 64
height = 64
msaa = "off"
depth = false
format = "rgba16-float"

[[objects]]
name = "crate"
layer = 3
rect = [0.25, 0.25, 0.5, 0.6]
depth = 5.0
albedo = [0.2, 0.4, 0.8]
"##;

    #[test]
    fn parses_sample_config() {
        let config = OutlineFile::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.outline.program.as_deref(), Some("builtin"));
        assert_eq!(config.outline.layers.mask(), (1 << 3) | (1 << 5));
        assert_eq!(config.outline.schedule, ScheduleSetting::AfterTransparents);
        assert!(!config.outline.separable_axis);

        let [r, g, b, a] = config.outline.color;
        assert_eq!(r, 1.0);
        assert!(g > 0.2 && g < 0.23, "sRGB 0x80 decodes to ~0.216, got {g}");
        assert_eq!(b, 0.0);
        assert_eq!(a, 1.0);

        let inset = config.camera("inset").expect("inset camera");
        assert_eq!(inset.msaa, 1);
        assert!(!inset.depth);
        assert_eq!(inset.format, FormatSetting::Rgba16Float);
        assert_eq!(config.camera("main").map(|c| c.msaa), Some(4));

        let object = &config.objects[0];
        assert_eq!(object.tags, vec!["Forward".to_string()]);
        assert_eq!(object.queue, 2000);
        assert_eq!(object.albedo, [0.2, 0.4, 0.8, 1.0]);
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = OutlineFile::from_toml_str("version = 1").unwrap();
        assert!(config.outline.enabled);
        assert!(config.outline.program.is_none());
        assert_eq!(config.outline.pixel_width, 4.0);
        assert_eq!(config.outline.layers.mask(), 0);
        assert!(config.cameras.is_empty());
    }

    #[test]
    fn integer_layer_masks_pass_through() {
        let config = OutlineFile::from_toml_str(
            r#"
version = 1
[outline]
layers = 12
"#,
        )
        .unwrap();
        assert_eq!(config.outline.layers, LayerSelection::Mask(12));
    }

    #[test]
    fn rejects_out_of_range_width() {
        let err = OutlineFile::from_toml_str(
            r#"
version = 1
[outline]
pixel_width = 250.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_colour_channels() {
        let err = OutlineFile::from_toml_str(
            r#"
version = 1
[outline]
color = [1.0, -0.5, 0.0, 1.0]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn hdr_colours_are_allowed() {
        let config = OutlineFile::from_toml_str(
            r#"
version = 1
[outline]
color = [4.0, 2.0, 0.0, 1.0]
"#,
        )
        .unwrap();
        assert_eq!(config.outline.color, [4.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn rejects_layer_out_of_range() {
        let err = OutlineFile::from_toml_str(
            r#"
version = 1
[outline]
layers = [40]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_duplicate_and_degenerate_cameras() {
        let duplicate = r#"
version = 1
[[cameras]]
name = "main"
width = 8
height = 8
[[cameras]]
name = "main"
width = 8
height = 8
"#;
        assert!(matches!(
            OutlineFile::from_toml_str(duplicate).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let zero = r#"
version = 1
[[cameras]]
name = "main"
width = 0
height = 8
"#;
        assert!(matches!(
            OutlineFile::from_toml_str(zero).unwrap_err(),
            ConfigError::Invalid(_)
        ));

        let msaa = r#"
version = 1
[[cameras]]
name = "main"
width = 8
height = 8
msaa = 3
"#;
        assert!(matches!(
            OutlineFile::from_toml_str(msaa).unwrap_err(),
            ConfigError::Invalid(_)
        ));
    }

    #[test]
    fn rejects_degenerate_rect() {
        let err = OutlineFile::from_toml_str(
            r#"
version = 1
[[objects]]
name = "flat"
rect = [0.1, 0.1, 0.0, 0.5]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_hex_is_a_parse_error() {
        let err = OutlineFile::from_toml_str(
            r##"
version = 1
[outline]
color = "#12345"
"##,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = OutlineFile::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outline.toml");
        fs::write(&path, SAMPLE).unwrap();
        let config = OutlineFile::from_path(&path).unwrap();
        assert_eq!(config.cameras.len(), 2);

        let missing = OutlineFile::from_path(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
