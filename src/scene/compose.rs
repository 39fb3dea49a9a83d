//! Mount decisions for the stage.
//!
//! [`compose`] maps the current settings and the primary asset to the set of
//! renderables that should be on stage. It owns no data and keeps no state, so
//! calling it twice with the same inputs yields the same [`MountSet`]. The
//! render stage diffs consecutive mount sets by [`Slot`] and only touches GPU
//! resources for slots that changed.

use super::{BackgroundMode, Gradient, Rgb, SceneSettings};
use crate::config::StageLayout;

/// Identity of a loaded asset; changes whenever a new load is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u64);

/// The single primary renderable currently loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Primary {
    #[default]
    Empty,
    ArchiveScene(AssetId),
    Model(AssetId),
    Image(AssetId),
    Video(AssetId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentPreset {
    Sunset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backdrop {
    Color(Rgb),
    Preset(EnvironmentPreset),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub color: Rgb,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lighting {
    /// Ambient fill plus one point light.
    Default,
    Preset(EnvironmentPreset),
}

/// Content of the inverted sphere enclosing the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkySphere {
    Gradient(Gradient),
    Image(AssetId),
    Video(AssetId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Floor {
    pub radius: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Backdrop,
    Fog,
    Lighting,
    Sky,
    Foreground,
    Floor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountSet {
    pub backdrop: Backdrop,
    pub fog: Option<Fog>,
    pub lighting: Lighting,
    pub sky: Option<SkySphere>,
    pub foreground: Option<AssetId>,
    pub floor: Option<Floor>,
}

/// Background mode decides the sky slot. A direct image or video upload only
/// occupies it under the environment preset; an archive scene suppresses it.
pub fn compose(settings: &SceneSettings, primary: Primary, layout: &StageLayout) -> MountSet {
    let fog = |color| Fog {
        color,
        near: layout.fog_near,
        far: layout.fog_far,
    };

    let (backdrop, fog, lighting, sky) = match settings.background {
        BackgroundMode::Environment => {
            let sky = match primary {
                Primary::Image(id) => Some(SkySphere::Image(id)),
                Primary::Video(id) => Some(SkySphere::Video(id)),
                Primary::Empty | Primary::ArchiveScene(_) | Primary::Model(_) => None,
            };
            (
                Backdrop::Preset(EnvironmentPreset::Sunset),
                None,
                Lighting::Preset(EnvironmentPreset::Sunset),
                sky,
            )
        }
        BackgroundMode::SolidColor => (
            Backdrop::Color(settings.color),
            Some(fog(settings.color)),
            Lighting::Default,
            None,
        ),
        BackgroundMode::Gradient => (
            Backdrop::Color(Rgb::BLACK),
            None,
            Lighting::Default,
            Some(SkySphere::Gradient(settings.gradient)),
        ),
        BackgroundMode::None => (
            Backdrop::Color(Rgb::BLACK),
            Some(fog(Rgb::BLACK)),
            Lighting::Default,
            None,
        ),
    };

    let foreground = match primary {
        Primary::ArchiveScene(id) | Primary::Model(id) => Some(id),
        Primary::Empty | Primary::Image(_) | Primary::Video(_) => None,
    };

    let floor = settings.floor.then_some(Floor {
        radius: layout.floor_radius,
        height: layout.floor_height,
    });

    MountSet {
        backdrop,
        fog,
        lighting,
        sky,
        foreground,
        floor,
    }
}

impl MountSet {
    /// Slots whose content differs between `self` and `next`, in mount order.
    pub fn changed_slots(&self, next: &MountSet) -> Vec<Slot> {
        let mut slots = Vec::new();
        if self.backdrop != next.backdrop {
            slots.push(Slot::Backdrop);
        }
        if self.fog != next.fog {
            slots.push(Slot::Fog);
        }
        if self.lighting != next.lighting {
            slots.push(Slot::Lighting);
        }
        if self.sky != next.sky {
            slots.push(Slot::Sky);
        }
        if self.foreground != next.foreground {
            slots.push(Slot::Foreground);
        }
        if self.floor != next.floor {
            slots.push(Slot::Floor);
        }
        slots
    }
}

/// Pixel rows of the 1×2 gradient texture. A two-pixel linear gradient is
/// sampled at the pixel centers, so the rows sit at t = 0.25 and t = 0.75.
pub fn gradient_rows(gradient: Gradient) -> [Rgb; 2] {
    [
        gradient.top.lerp(gradient.bottom, 0.25),
        gradient.top.lerp(gradient.bottom, 0.75),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SettingsChange;
    use proptest::prelude::*;

    fn layout() -> StageLayout {
        StageLayout::default()
    }

    fn settings(background: BackgroundMode) -> SceneSettings {
        SceneSettings::default().apply(SettingsChange::Background(background))
    }

    #[test]
    fn environment_preset_ignores_colors() {
        let custom = settings(BackgroundMode::Environment)
            .apply(SettingsChange::Color(Rgb::new(200, 10, 10)))
            .apply(SettingsChange::GradientTop(Rgb::new(1, 2, 3)));
        let mounts = compose(&custom, Primary::Empty, &layout());
        assert_eq!(mounts.backdrop, Backdrop::Preset(EnvironmentPreset::Sunset));
        assert_eq!(mounts.lighting, Lighting::Preset(EnvironmentPreset::Sunset));
        assert_eq!(mounts.fog, None);
        assert_eq!(mounts.sky, None);
    }

    #[test]
    fn solid_color_tints_fog_with_the_same_color() {
        let color = Rgb::new(12, 34, 56);
        let s = settings(BackgroundMode::SolidColor).apply(SettingsChange::Color(color));
        let mounts = compose(&s, Primary::Empty, &layout());
        assert_eq!(mounts.backdrop, Backdrop::Color(color));
        assert_eq!(
            mounts.fog,
            Some(Fog {
                color,
                near: 10.0,
                far: 100.0
            })
        );
    }

    #[test]
    fn none_mode_is_black_with_black_fog() {
        let s = settings(BackgroundMode::None).apply(SettingsChange::Color(Rgb::WHITE));
        let mounts = compose(&s, Primary::Empty, &layout());
        assert_eq!(mounts.backdrop, Backdrop::Color(Rgb::BLACK));
        assert_eq!(mounts.fog.map(|fog| fog.color), Some(Rgb::BLACK));
        assert_eq!(mounts.sky, None);
    }

    #[test]
    fn gradient_mode_wins_over_direct_image() {
        let gradient = Gradient {
            top: Rgb::BLACK,
            bottom: Rgb::WHITE,
        };
        let s = settings(BackgroundMode::Gradient);
        let mounts = compose(&s, Primary::Image(AssetId(7)), &layout());
        assert_eq!(mounts.sky, Some(SkySphere::Gradient(gradient)));
        assert_eq!(mounts.foreground, None);
    }

    #[test]
    fn image_and_video_take_the_sky_under_the_preset() {
        let s = settings(BackgroundMode::Environment);
        let image = compose(&s, Primary::Image(AssetId(1)), &layout());
        assert_eq!(image.sky, Some(SkySphere::Image(AssetId(1))));
        let video = compose(&s, Primary::Video(AssetId(2)), &layout());
        assert_eq!(video.sky, Some(SkySphere::Video(AssetId(2))));
        assert_eq!(video.foreground, None);
    }

    #[test]
    fn archive_scene_mounts_exclusively() {
        let s = settings(BackgroundMode::Environment);
        let mounts = compose(&s, Primary::ArchiveScene(AssetId(3)), &layout());
        assert_eq!(mounts.foreground, Some(AssetId(3)));
        assert_eq!(mounts.sky, None);
    }

    #[test]
    fn direct_model_mounts_in_foreground_without_sky_swap() {
        let s = SceneSettings::default();
        let empty = compose(&s, Primary::Empty, &layout());
        let model = compose(&s, Primary::Model(AssetId(9)), &layout());
        assert_eq!(model.foreground, Some(AssetId(9)));
        assert_eq!(empty.changed_slots(&model), vec![Slot::Foreground]);
    }

    #[test]
    fn floor_toggle_touches_only_the_floor_slot() {
        let off = settings(BackgroundMode::Gradient);
        let on = off.apply(SettingsChange::Floor(true));
        let primary = Primary::Model(AssetId(4));
        let before = compose(&off, primary, &layout());
        let after = compose(&on, primary, &layout());
        assert_eq!(before.changed_slots(&after), vec![Slot::Floor]);
        assert_eq!(
            after.floor,
            Some(Floor {
                radius: 50.0,
                height: -5.0
            })
        );
        assert_eq!(after.changed_slots(&before), vec![Slot::Floor]);
    }

    #[test]
    fn gradient_rows_sample_pixel_centers() {
        let rows = gradient_rows(Gradient {
            top: Rgb::BLACK,
            bottom: Rgb::WHITE,
        });
        assert_eq!(rows[0], Rgb::new(64, 64, 64));
        assert_eq!(rows[1], Rgb::new(191, 191, 191));
    }

    fn any_settings() -> impl Strategy<Value = SceneSettings> {
        (0usize..4, any::<[u8; 3]>(), any::<[u8; 3]>(), any::<[u8; 3]>(), any::<bool>()).prop_map(
            |(mode, color, top, bottom, floor)| SceneSettings {
                background: BackgroundMode::ALL[mode],
                color: Rgb::from_array(color),
                gradient: Gradient {
                    top: Rgb::from_array(top),
                    bottom: Rgb::from_array(bottom),
                },
                floor,
            },
        )
    }

    fn any_primary() -> impl Strategy<Value = Primary> {
        (0usize..5, 0u64..8).prop_map(|(kind, id)| match kind {
            0 => Primary::Empty,
            1 => Primary::ArchiveScene(AssetId(id)),
            2 => Primary::Model(AssetId(id)),
            3 => Primary::Image(AssetId(id)),
            _ => Primary::Video(AssetId(id)),
        })
    }

    proptest! {
        #[test]
        fn compose_is_pure(settings in any_settings(), primary in any_primary()) {
            let first = compose(&settings, primary, &layout());
            let second = compose(&settings, primary, &layout());
            prop_assert_eq!(first, second);
            prop_assert!(first.changed_slots(&second).is_empty());
        }

        #[test]
        fn floor_flag_never_leaks_into_other_slots(settings in any_settings(), primary in any_primary()) {
            let on = compose(&settings.apply(SettingsChange::Floor(true)), primary, &layout());
            let off = compose(&settings.apply(SettingsChange::Floor(false)), primary, &layout());
            prop_assert_eq!(on.changed_slots(&off), vec![Slot::Floor]);
        }
    }
}
