//! Control panel. Draws from a read-only [`PanelView`] and reports what the
//! user asked for as [`PanelActions`]; it never mutates viewer state itself.

use crate::app::viewer::CurrentAsset;
use crate::assets::LoadedAsset;
use crate::scene::{BackgroundMode, Rgb, SceneSettings, SettingsChange};
use egui::{Color32, RichText};

pub struct PanelView<'a> {
    pub settings: SceneSettings,
    pub loading: Option<&'a str>,
    pub current: Option<AssetSummary>,
    pub notice: Option<&'a str>,
    pub hovering_file: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetSummary {
    pub name: String,
    pub kind: &'static str,
    pub details: Vec<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct PanelActions {
    pub open_file: bool,
    pub changes: Vec<SettingsChange>,
    pub save_look: bool,
    pub load_look: bool,
    pub dismiss_notice: bool,
}

impl PanelActions {
    pub fn is_empty(&self) -> bool {
        *self == PanelActions::default()
    }
}

pub fn summarize(current: &CurrentAsset) -> AssetSummary {
    let mut details = Vec::new();
    match &current.asset {
        LoadedAsset::Archive(archive) => {
            details.push(format!("model entry: {}", archive.model_path));
            details.push(format!(
                "{} archive entries, {} resolved",
                archive.rewriter().entries().count(),
                archive.rewriter().minted_count()
            ));
        }
        LoadedAsset::Image { texture, .. } => {
            details.push(format!("{} x {}", texture.width, texture.height));
        }
        LoadedAsset::Video { surface, .. } => {
            details.push(format!("{} x {}", surface.width, surface.height));
            if !surface.is_running() {
                details.push("decoder stopped".to_string());
            }
        }
        LoadedAsset::Model { .. } => {}
    }
    if let Some(scene) = current.asset.scene() {
        details.push(format!(
            "{} meshes, {} triangles, {} textures",
            scene.meshes.len(),
            scene.triangle_count(),
            scene.textures.iter().flatten().count()
        ));
        if let Some(background) = scene.ambient.background {
            details.push(format!("embedded background {}", background));
        }
        if let Some(environment) = &scene.ambient.environment {
            details.push(format!("embedded environment {}", environment));
        }
    }
    AssetSummary {
        name: current.name.clone(),
        kind: current.asset.kind(),
        details,
    }
}

/// Changes turning `before` into `edited`, one per edited field.
pub fn settings_changes(before: SceneSettings, edited: SceneSettings) -> Vec<SettingsChange> {
    let mut changes = Vec::new();
    if edited.background != before.background {
        changes.push(SettingsChange::Background(edited.background));
    }
    if edited.color != before.color {
        changes.push(SettingsChange::Color(edited.color));
    }
    if edited.gradient.top != before.gradient.top {
        changes.push(SettingsChange::GradientTop(edited.gradient.top));
    }
    if edited.gradient.bottom != before.gradient.bottom {
        changes.push(SettingsChange::GradientBottom(edited.gradient.bottom));
    }
    if edited.floor != before.floor {
        changes.push(SettingsChange::Floor(edited.floor));
    }
    changes
}

fn color_row(ui: &mut egui::Ui, label: &str, color: &mut Rgb) {
    ui.horizontal(|ui| {
        let mut rgb = color.to_array();
        if ui.color_edit_button_srgb(&mut rgb).changed() {
            *color = Rgb::from_array(rgb);
        }
        ui.label(label);
    });
}

pub fn draw_panel(ctx: &egui::Context, view: &PanelView<'_>) -> PanelActions {
    let mut actions = PanelActions::default();
    let mut edited = view.settings;

    egui::SidePanel::left("controls")
        .resizable(false)
        .default_width(240.0)
        .show(ctx, |ui| {
            ui.heading("dropview");
            ui.label("Drop an image, model, video or zip archive onto the window.");
            ui.add_space(4.0);
            actions.open_file = ui
                .add_enabled(view.loading.is_none(), egui::Button::new("Open file..."))
                .clicked();

            ui.separator();
            egui::ComboBox::from_label("Background")
                .selected_text(edited.background.label())
                .show_ui(ui, |ui| {
                    for mode in BackgroundMode::ALL {
                        ui.selectable_value(&mut edited.background, mode, mode.label());
                    }
                });
            match edited.background {
                BackgroundMode::SolidColor => color_row(ui, "Color", &mut edited.color),
                BackgroundMode::Gradient => {
                    color_row(ui, "Top", &mut edited.gradient.top);
                    color_row(ui, "Bottom", &mut edited.gradient.bottom);
                }
                BackgroundMode::None | BackgroundMode::Environment => {}
            }
            ui.checkbox(&mut edited.floor, "Reflective floor");

            ui.horizontal(|ui| {
                actions.save_look = ui.button("Save look").clicked();
                actions.load_look = ui.button("Load look").clicked();
            });

            ui.separator();
            if let Some(name) = view.loading {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading {}", name));
                });
            }
            match &view.current {
                Some(summary) => {
                    ui.label(RichText::new(&summary.name).strong());
                    ui.label(summary.kind);
                    for line in &summary.details {
                        ui.small(line);
                    }
                }
                None => {
                    ui.weak("Nothing loaded");
                }
            }

            if let Some(notice) = view.notice {
                ui.separator();
                ui.colored_label(Color32::from_rgb(0xff, 0x9a, 0x5c), notice);
                actions.dismiss_notice = ui.small_button("Dismiss").clicked();
            }
        });

    if view.hovering_file {
        egui::Area::new(egui::Id::new("drop hint"))
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(RichText::new("Drop to load").heading().color(Color32::WHITE));
            });
    }

    actions.changes = settings_changes(view.settings, edited);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::texture::Texture;
    use crate::assets::{BlobRegistry, LoadedAsset};
    use crate::scene::AssetId;
    use std::sync::Arc;

    #[test]
    fn unchanged_settings_produce_no_changes() {
        let settings = SceneSettings::default();
        assert!(settings_changes(settings, settings).is_empty());
        assert!(PanelActions::default().is_empty());
    }

    #[test]
    fn each_edited_field_maps_to_one_change() {
        let before = SceneSettings::default();
        let mut edited = before;
        edited.background = BackgroundMode::Gradient;
        edited.gradient.bottom = Rgb::new(1, 2, 3);
        edited.floor = true;
        let changes = settings_changes(before, edited);
        assert_eq!(
            changes,
            vec![
                SettingsChange::Background(BackgroundMode::Gradient),
                SettingsChange::GradientBottom(Rgb::new(1, 2, 3)),
                SettingsChange::Floor(true),
            ]
        );
        let replayed = changes.into_iter().fold(before, SceneSettings::apply);
        assert_eq!(replayed, edited);
    }

    #[test]
    fn image_summary_reports_size() {
        let registry = BlobRegistry::new();
        let current = CurrentAsset {
            id: AssetId(1),
            name: "photo.jpg".to_string(),
            asset: LoadedAsset::Image {
                texture: Texture::from_rgba(2, 1, vec![0; 8]).unwrap(),
                handle: registry.create_owned(Arc::from(&b"x"[..])),
            },
        };
        let summary = summarize(&current);
        assert_eq!(summary.kind, "image");
        assert_eq!(summary.details, vec!["2 x 1".to_string()]);
    }
}
