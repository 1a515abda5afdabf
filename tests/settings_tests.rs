//! View Settings Tests
//!
//! Tests for:
//! - JSON decoding with defaults and validation
//! - Applying settings to a live view
//! - Loading settings from disk

use anyhow::Context;
use glam::{UVec2, Vec4};
use kuesa::KuesaError;
use kuesa::fx::ToneMapping;
use kuesa::scene::Camera;
use kuesa::view::{RenderingFeatures, View, ViewChange, ViewSettings};
use kuesa::NormalizedRect;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Decoding
// ============================================================================

#[test]
fn partial_json_keeps_defaults() {
    let settings = ViewSettings::from_json_str(
        r#"{
            "z_filling": true,
            "surface_size": [1920, 1080],
            "rendering_features": { "msaa_samples": 4 }
        }"#,
    )
    .unwrap();

    assert!(settings.z_filling);
    assert!(settings.frustum_culling);
    assert_eq!(settings.surface_size, UVec2::new(1920, 1080));
    assert_eq!(
        settings.rendering_features,
        RenderingFeatures {
            half_float_render_targets: false,
            msaa_samples: 4,
            tone_mapping: false,
        }
    );
    assert_eq!(settings.reflection_texture_size, UVec2::splat(512));
}

#[test]
fn json_round_trip_preserves_settings() {
    let settings = ViewSettings {
        viewport_rect: NormalizedRect::new(0.25, 0.0, 0.5, 1.0),
        particles_enabled: true,
        clear_color: Vec4::new(0.1, 0.2, 0.3, 1.0),
        reflection_planes: vec![Vec4::new(0.0, 1.0, 0.0, 0.0)],
        exposure: 0.75,
        tone_mapping_algorithm: ToneMapping::Filmic,
        ..ViewSettings::default()
    };

    let json = settings.to_json_string().unwrap();
    assert_eq!(ViewSettings::from_json_str(&json).unwrap(), settings);
}

#[test]
fn malformed_json_is_a_settings_error() {
    let err = ViewSettings::from_json_str("{ \"z_filling\": ").unwrap_err();
    assert!(matches!(err, KuesaError::Settings(_)));
}

#[test]
fn invalid_values_are_rejected() {
    let cases = [
        (
            r#"{ "viewport_rect": { "x": 0.0, "y": 0.0, "width": 0.0, "height": 1.0 } }"#,
            "viewport_rect",
        ),
        (r#"{ "surface_size": [0, 720] }"#, "surface_size"),
        (r#"{ "reflection_texture_size": [512, 0] }"#, "reflection_texture_size"),
        (
            r#"{ "rendering_features": { "msaa_samples": 3 } }"#,
            "rendering_features.msaa_samples",
        ),
        (r#"{ "gamma": 0.0 }"#, "gamma"),
    ];

    for (json, expected) in cases {
        match ViewSettings::from_json_str(json) {
            Err(KuesaError::InvalidSettings { field, .. }) => assert_eq!(field, expected),
            other => panic!("{json}: expected InvalidSettings, got {other:?}"),
        }
    }
}

#[test]
fn missing_file_is_an_io_error() {
    let err = ViewSettings::from_json_file("/nonexistent/kuesa/view.json").unwrap_err();
    assert!(matches!(err, KuesaError::Io(_)));
}

#[test]
fn settings_load_from_file() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("kuesa-view-settings-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "back_to_front_sorting": true, "skinning": false }"#)
        .context("writing settings fixture")?;

    let settings = ViewSettings::from_json_file(&path);
    let _ = std::fs::remove_file(&path);
    let settings = settings.context("loading settings fixture")?;

    assert!(settings.back_to_front_sorting);
    assert!(!settings.skinning);
    Ok(())
}

// ============================================================================
// Applying
// ============================================================================

#[test]
fn default_settings_change_nothing() {
    init_logger();
    let mut view = View::new().unwrap();
    let rx = view.subscribe();

    ViewSettings::default().apply(&mut view).unwrap();

    assert!(rx.try_iter().next().is_none());
    assert!(!view.is_fg_tree_rebuild_scheduled());
}

#[test]
fn settings_reach_the_view() {
    init_logger();
    let settings = ViewSettings {
        frustum_culling: false,
        z_filling: true,
        surface_size: UVec2::new(800, 600),
        uses_stencil_mask: true,
        reflection_texture_size: UVec2::splat(256),
        reflection_planes: vec![Vec4::new(0.0, 1.0, 0.0, 0.0)],
        ..ViewSettings::default()
    };

    let mut view = View::with_settings(&settings).unwrap();
    view.set_camera(Some(&Camera::new_perspective(45.0, 4.0 / 3.0, 0.1, 10.0)));

    assert!(!view.frustum_culling());
    assert!(view.z_filling());
    assert!(view.uses_stencil_mask());
    assert_eq!(view.surface_size(), UVec2::new(800, 600));
    assert_eq!(view.reflection_planes().len(), 1);

    let texture = view.reflection_texture().unwrap();
    assert_eq!(view.frame_graph().texture(texture).unwrap().size, UVec2::splat(256));
}

#[test]
fn reapplying_same_planes_is_a_no_op() {
    init_logger();
    let settings = ViewSettings {
        reflection_planes: vec![Vec4::new(0.0, 0.0, 1.0, -1.0)],
        ..ViewSettings::default()
    };
    let mut view = View::with_settings(&settings).unwrap();
    let rx = view.subscribe();

    settings.apply(&mut view).unwrap();

    assert!(!rx.try_iter().any(|change| change == ViewChange::ReflectionPlanesChanged));
}

#[test]
fn invalid_settings_leave_view_untouched() {
    init_logger();
    let mut view = View::new().unwrap();
    let settings = ViewSettings {
        z_filling: true,
        surface_size: UVec2::ZERO,
        ..ViewSettings::default()
    };

    assert!(settings.apply(&mut view).is_err());
    assert!(!view.z_filling());
    assert!(View::with_settings(&settings).is_err());
}

#[test]
fn tone_mapping_settings_reach_the_view() {
    init_logger();
    let settings = ViewSettings::from_json_str(
        r#"{
            "rendering_features": { "tone_mapping": true },
            "exposure": 1.5,
            "gamma": 2.0,
            "tone_mapping_algorithm": "Reinhard"
        }"#,
    )
    .unwrap();

    let mut view = View::with_settings(&settings).unwrap();
    view.set_camera(Some(&Camera::new_perspective(45.0, 16.0 / 9.0, 0.1, 10.0)));
    view.process_events();

    assert!(view.rendering_features().tone_mapping);
    assert_eq!(view.exposure(), 1.5);
    assert_eq!(view.gamma(), 2.0);
    assert_eq!(view.tone_mapping_algorithm(), ToneMapping::Reinhard);
    let graph = view.frame_graph();
    assert_eq!(graph.parent(view.tone_mapping_stages().root()), Some(view.root()));
}
