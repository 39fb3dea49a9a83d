pub mod compose;
pub mod serialization;

pub use compose::{
    compose, gradient_rows, AssetId, Backdrop, Lighting, MountSet, Primary, SkySphere, Slot,
};

use std::fmt;

/// 8-bit sRGB color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex color {0:?}, expected #rrggbb")]
pub struct ParseRgbError(String);

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(value: &str) -> Result<Self, ParseRgbError> {
        let digits = value.strip_prefix('#').unwrap_or(value);
        let invalid = || ParseRgbError(value.to_string());
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_array(value: [u8; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }

    /// Linear-light components for shader uniforms and clear colors.
    pub fn to_linear(self) -> [f32; 3] {
        [
            srgb_to_linear(self.r),
            srgb_to_linear(self.g),
            srgb_to_linear(self.b),
        ]
    }

    /// Componentwise blend in sRGB space, `t` clamped to `[0, 1]`.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }
}

fn srgb_to_linear(value: u8) -> f32 {
    let c = value as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Rgb {
    type Error = ParseRgbError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::from_hex(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    None,
    #[serde(rename = "color")]
    SolidColor,
    Gradient,
    #[serde(rename = "room")]
    Environment,
}

impl BackgroundMode {
    pub const ALL: [BackgroundMode; 4] = [
        BackgroundMode::None,
        BackgroundMode::SolidColor,
        BackgroundMode::Gradient,
        BackgroundMode::Environment,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BackgroundMode::None => "No Background",
            BackgroundMode::SolidColor => "Solid Color",
            BackgroundMode::Gradient => "Gradient",
            BackgroundMode::Environment => "Room",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Gradient {
    pub top: Rgb,
    pub bottom: Rgb,
}

impl Default for Gradient {
    fn default() -> Self {
        Self {
            top: Rgb::BLACK,
            bottom: Rgb::WHITE,
        }
    }
}

/// User-adjustable look of the stage. Only changed through [`SceneSettings::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub background: BackgroundMode,
    pub color: Rgb,
    pub gradient: Gradient,
    pub floor: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            background: BackgroundMode::Environment,
            color: Rgb::BLACK,
            gradient: Gradient::default(),
            floor: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    Background(BackgroundMode),
    Color(Rgb),
    GradientTop(Rgb),
    GradientBottom(Rgb),
    Floor(bool),
    Replace(SceneSettings),
}

impl SceneSettings {
    #[must_use]
    pub fn apply(self, change: SettingsChange) -> SceneSettings {
        match change {
            SettingsChange::Background(background) => SceneSettings { background, ..self },
            SettingsChange::Color(color) => SceneSettings { color, ..self },
            SettingsChange::GradientTop(top) => SceneSettings {
                gradient: Gradient { top, ..self.gradient },
                ..self
            },
            SettingsChange::GradientBottom(bottom) => SceneSettings {
                gradient: Gradient {
                    bottom,
                    ..self.gradient
                },
                ..self
            },
            SettingsChange::Floor(floor) => SceneSettings { floor, ..self },
            SettingsChange::Replace(settings) => settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing_accepts_with_and_without_hash() {
        assert_eq!(Rgb::from_hex("#ff8000").unwrap(), Rgb::new(255, 128, 0));
        assert_eq!(Rgb::from_hex("00FF7f").unwrap(), Rgb::new(0, 255, 127));
        assert!(Rgb::from_hex("#fff").is_err());
        assert!(Rgb::from_hex("#gg0000").is_err());
        assert!(Rgb::from_hex("#ä0000").is_err());
    }

    #[test]
    fn rgb_serializes_as_hex_string() {
        let json = serde_json::to_string(&Rgb::new(1, 2, 255)).unwrap();
        assert_eq!(json, "\"#0102ff\"");
        let back: Rgb = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rgb::new(1, 2, 255));
        assert!(serde_json::from_str::<Rgb>("\"red\"").is_err());
    }

    #[test]
    fn linear_conversion_hits_endpoints() {
        assert_eq!(Rgb::BLACK.to_linear(), [0.0, 0.0, 0.0]);
        let white = Rgb::WHITE.to_linear();
        assert!(white.iter().all(|c| (c - 1.0).abs() < 1e-6));
    }

    #[test]
    fn apply_changes_only_the_named_field() {
        let base = SceneSettings::default();
        let changed = base.apply(SettingsChange::GradientBottom(Rgb::new(10, 20, 30)));
        assert_eq!(changed.gradient.top, base.gradient.top);
        assert_eq!(changed.gradient.bottom, Rgb::new(10, 20, 30));
        assert_eq!(changed.background, base.background);
        assert_eq!(changed.floor, base.floor);

        let floored = changed.apply(SettingsChange::Floor(true));
        assert!(floored.floor);
        assert_eq!(floored.gradient, changed.gradient);
    }

    #[test]
    fn background_modes_use_short_names_on_disk() {
        let json = serde_json::to_string(&BackgroundMode::Environment).unwrap();
        assert_eq!(json, "\"room\"");
        let mode: BackgroundMode = serde_json::from_str("\"color\"").unwrap();
        assert_eq!(mode, BackgroundMode::SolidColor);
    }
}
