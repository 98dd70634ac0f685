//! Scene state that lives outside the simulation: lights, loaded ground,
//! the fitted character and the loading overlay.

use glam::Vec3;

use crate::assets::{fit_character, AssetKind, CharacterFit, EnvironmentLight, LoadedAsset};
use crate::config::{AssetConfig, LightingConfig};
use crate::controller::input::DebugAction;
use crate::model::{GroundQuery, PlayerPose};
use crate::utils::Mesh;

/// Width, height and depth of the box standing in for the character.
pub const PLACEHOLDER_SIZE: [f32; 3] = [1.0, 1.8, 1.0];
/// 0x7f3cff in linear RGB.
pub const PLACEHOLDER_COLOR: [f32; 4] = [0.212, 0.045, 1.0, 1.0];

const SUN_STEP: f32 = 0.05;
const SUN_MAX: f32 = 2.0;
const AMBIENT_STEP: f32 = 0.02;
const AMBIENT_MAX: f32 = 1.0;

/// Delay between the last load settling and the overlay starting to fade.
pub const OVERLAY_HIDE_DELAY_MS: f64 = 200.0;
pub const OVERLAY_FADE_MS: f64 = 400.0;
const DOTS_INTERVAL_MS: f64 = 500.0;

/// Adjustable light rig.
#[derive(Debug, Clone)]
pub struct Lighting {
    pub sky_color: Vec3,
    pub ground_color: Vec3,
    pub hemisphere_intensity: f32,
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub sun_color: Vec3,
    pub sun_intensity: f32,
    pub sun_position: Vec3,
    pub sun_follow_offset: Vec3,
    pub exposure: f32,
    pub environment: Option<EnvironmentLight>,
    pub environment_enabled: bool,
}

impl Lighting {
    pub fn new(config: &LightingConfig) -> Self {
        Self {
            sky_color: Vec3::from(config.sky_color),
            ground_color: Vec3::from(config.ground_color),
            hemisphere_intensity: config.hemisphere_intensity,
            ambient_color: Vec3::from(config.ambient_color),
            ambient_intensity: config.ambient_intensity,
            sun_color: Vec3::from(config.sun_color),
            sun_intensity: config.sun_intensity,
            sun_position: Vec3::from(config.sun_position),
            sun_follow_offset: Vec3::from(config.sun_follow_offset),
            exposure: config.exposure,
            environment: None,
            environment_enabled: false,
        }
    }

    /// Unit vector from `target` toward the sun.
    pub fn sun_direction(&self, target: Vec3) -> Vec3 {
        let d = self.sun_position - target;
        if d.length_squared() > 0.0 { d.normalize() } else { Vec3::Y }
    }

    /// Environment terms currently contributing light.
    pub fn active_environment(&self) -> Option<EnvironmentLight> {
        self.environment.filter(|_| self.environment_enabled)
    }

    pub fn anchor_sun_to(&mut self, player: Vec3) {
        self.sun_position = player + self.sun_follow_offset;
    }
}

/// Tracks outstanding loads and drives the loading overlay.
#[derive(Debug, Clone)]
pub struct LoadProgress {
    pending: Vec<AssetKind>,
    started_ms: f64,
    settled_ms: Option<f64>,
}

impl LoadProgress {
    pub fn new(pending: Vec<AssetKind>, now_ms: f64) -> Self {
        let settled_ms = pending.is_empty().then_some(now_ms);
        Self { pending, started_ms: now_ms, settled_ms }
    }

    pub fn settle(&mut self, kind: AssetKind, now_ms: f64) {
        if let Some(i) = self.pending.iter().position(|k| *k == kind) {
            self.pending.swap_remove(i);
        }
        if self.pending.is_empty() && self.settled_ms.is_none() {
            tracing::info!("All loads settled after {:.0} ms", now_ms - self.started_ms);
            self.settled_ms = Some(now_ms);
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled_ms.is_some()
    }

    /// Overlay opacity: opaque while loading, fading out once everything settled.
    pub fn overlay_opacity(&self, now_ms: f64) -> f32 {
        match self.settled_ms {
            None => 1.0,
            Some(t) => {
                let fading = now_ms - t - OVERLAY_HIDE_DELAY_MS;
                (1.0 - fading / OVERLAY_FADE_MS).clamp(0.0, 1.0) as f32
            }
        }
    }

    pub fn overlay_visible(&self, now_ms: f64) -> bool {
        self.overlay_opacity(now_ms) > 0.0
    }

    /// One to three dots, advancing every half second.
    pub fn dots(&self, now_ms: f64) -> &'static str {
        let ticks = ((now_ms - self.started_ms).max(0.0) / DOTS_INTERVAL_MS) as u64;
        match ticks % 4 {
            2 => "..",
            3 => "...",
            _ => ".",
        }
    }
}

/// Geometry the renderer has to upload after a load.
#[derive(Debug, Clone)]
pub enum SceneUpload {
    Map(Mesh),
    Character { mesh: Mesh, fit: CharacterFit },
}

pub struct Scene {
    pub lighting: Lighting,
    pub ground: GroundQuery,
    pub map_loaded: bool,
    pub character: Option<CharacterFit>,
    pub blob_visible: bool,
    pub progress: LoadProgress,
    character_height: f32,
    character_max_footprint: f32,
}

impl Scene {
    pub fn new(lighting: &LightingConfig, assets: &AssetConfig, pending: Vec<AssetKind>, now_ms: f64) -> Self {
        Self {
            lighting: Lighting::new(lighting),
            ground: GroundQuery::flat(0.0),
            map_loaded: false,
            character: None,
            blob_visible: true,
            progress: LoadProgress::new(pending, now_ms),
            character_height: assets.character_height,
            character_max_footprint: assets.character_max_footprint,
        }
    }

    /// Diameter of the blob shadow; sized for the placeholder box until a character loads.
    pub fn blob_scale(&self) -> f32 {
        self.character.map_or(PLACEHOLDER_SIZE[0].max(PLACEHOLDER_SIZE[2]) * 0.9, |fit| fit.blob_scale())
    }

    /// Wire a finished load into the scene.
    pub fn receive(&mut self, asset: LoadedAsset, player: &mut PlayerPose, now_ms: f64) -> Option<SceneUpload> {
        self.progress.settle(asset.kind(), now_ms);
        match asset {
            LoadedAsset::Environment(Some(env)) => {
                tracing::info!("Environment lighting applied: sky {:?} ground {:?}", env.sky, env.ground);
                self.lighting.environment = Some(env);
                self.lighting.environment_enabled = true;
                None
            }
            LoadedAsset::Map(Some(geometry)) => {
                self.ground = GroundQuery::from_surfaces(geometry.surfaces);
                self.map_loaded = true;
                let p = player.position;
                player.position.y = p.y.max(self.ground.height_at(p.x, p.z));
                self.lighting.anchor_sun_to(player.position);
                tracing::info!(
                    "Map ready: {} surfaces, fallback height {:.2}",
                    self.ground.surface_count(),
                    self.ground.fallback_height()
                );
                Some(SceneUpload::Map(geometry.mesh))
            }
            LoadedAsset::Character(Some(geometry)) => {
                let bounds = geometry.bounds?;
                let fit = fit_character(&bounds, self.character_height, self.character_max_footprint);
                tracing::info!("Character fitted: scale {:.3}, footprint {:?}", fit.scale, fit.footprint);
                self.character = Some(fit);
                self.lighting.anchor_sun_to(player.position);
                Some(SceneUpload::Character { mesh: geometry.mesh, fit })
            }
            LoadedAsset::Map(None) => {
                tracing::info!("No map loaded, keeping the fallback ground");
                None
            }
            LoadedAsset::Environment(None) | LoadedAsset::Character(None) => None,
        }
    }

    /// Apply a debug key. Returns false for actions the scene does not own.
    pub fn apply_action(&mut self, action: DebugAction) -> bool {
        let l = &mut self.lighting;
        match action {
            DebugAction::SunDimmer | DebugAction::SunBrighter => {
                let step = if action == DebugAction::SunDimmer { -SUN_STEP } else { SUN_STEP };
                l.sun_intensity = (l.sun_intensity + step).clamp(0.0, SUN_MAX);
                tracing::info!("Sun intensity -> {:.2}", l.sun_intensity);
            }
            DebugAction::AmbientDimmer | DebugAction::AmbientBrighter => {
                let step = if action == DebugAction::AmbientDimmer { -AMBIENT_STEP } else { AMBIENT_STEP };
                l.ambient_intensity = (l.ambient_intensity + step).clamp(0.0, AMBIENT_MAX);
                tracing::info!("Ambient intensity -> {:.3}", l.ambient_intensity);
            }
            DebugAction::ToggleEnvironment => {
                if l.environment_enabled {
                    l.environment_enabled = false;
                    tracing::info!("Environment disabled");
                } else if l.environment.is_some() {
                    l.environment_enabled = true;
                    tracing::info!("Environment enabled");
                }
            }
            DebugAction::ToggleBlobShadow => {
                self.blob_visible = !self.blob_visible;
                tracing::info!("Blob shadow visible -> {}", self.blob_visible);
            }
            DebugAction::ToggleTouchControls => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SceneGeometry;
    use crate::model::Surface;
    use crate::utils::create_box;

    fn scene() -> Scene {
        let pending = vec![AssetKind::Environment, AssetKind::Map, AssetKind::Character];
        Scene::new(&LightingConfig::default(), &AssetConfig::default(), pending, 0.0)
    }

    fn platform(y: f32) -> SceneGeometry {
        let p = |x, z| Vec3::new(x, y, z);
        let surfaces = vec![
            Surface::new(p(-5.0, -5.0), p(5.0, 5.0), p(5.0, -5.0), false),
            Surface::new(p(-5.0, -5.0), p(-5.0, 5.0), p(5.0, 5.0), false),
        ];
        SceneGeometry { mesh: create_box(10.0, 1.0, 10.0, [1.0; 4]), surfaces, bounds: None }
    }

    #[test]
    fn sun_intensity_is_clamped() {
        let mut s = scene();
        for _ in 0..100 {
            s.apply_action(DebugAction::SunBrighter);
        }
        assert_eq!(s.lighting.sun_intensity, 2.0);
        for _ in 0..100 {
            s.apply_action(DebugAction::SunDimmer);
        }
        assert_eq!(s.lighting.sun_intensity, 0.0);
    }

    #[test]
    fn ambient_steps_and_clamps() {
        let mut s = scene();
        s.apply_action(DebugAction::AmbientBrighter);
        assert!((s.lighting.ambient_intensity - 0.10).abs() < 1e-6);
        for _ in 0..10 {
            s.apply_action(DebugAction::AmbientDimmer);
        }
        assert_eq!(s.lighting.ambient_intensity, 0.0);
    }

    #[test]
    fn environment_toggle_needs_a_loaded_environment() {
        let mut s = scene();
        s.apply_action(DebugAction::ToggleEnvironment);
        assert!(s.lighting.active_environment().is_none());

        let env = EnvironmentLight { sky: [1.0; 3], ground: [0.2; 3] };
        s.receive(LoadedAsset::Environment(Some(env)), &mut PlayerPose::default(), 10.0);
        assert!(s.lighting.active_environment().is_some());
        s.apply_action(DebugAction::ToggleEnvironment);
        assert!(s.lighting.active_environment().is_none());
        s.apply_action(DebugAction::ToggleEnvironment);
        assert!(s.lighting.active_environment().is_some());
    }

    #[test]
    fn touch_toggle_is_not_a_scene_action() {
        let mut s = scene();
        assert!(!s.apply_action(DebugAction::ToggleTouchControls));
        assert!(s.apply_action(DebugAction::ToggleBlobShadow));
        assert!(!s.blob_visible);
    }

    #[test]
    fn map_replaces_ground_and_lifts_player() {
        let mut s = scene();
        let mut player = PlayerPose::default();
        let upload = s.receive(LoadedAsset::Map(Some(platform(2.0))), &mut player, 5.0);
        assert!(matches!(upload, Some(SceneUpload::Map(_))));
        assert!(s.map_loaded);
        assert_eq!(player.position.y, 2.0);
        assert_eq!(s.lighting.sun_position, Vec3::new(5.0, 12.0, 7.0));
    }

    #[test]
    fn failed_map_keeps_flat_ground() {
        let mut s = scene();
        let mut player = PlayerPose::default();
        assert!(s.receive(LoadedAsset::Map(None), &mut player, 5.0).is_none());
        assert!(!s.map_loaded);
        assert_eq!(s.ground.height_at(3.0, 3.0), 0.0);
    }

    #[test]
    fn character_is_fitted_on_arrival() {
        let mut s = scene();
        let mesh = create_box(2.0, 4.0, 0.5, [1.0; 4]);
        let bounds = mesh.bounds();
        let geometry = SceneGeometry { mesh, surfaces: Vec::new(), bounds };
        let upload = s.receive(LoadedAsset::Character(Some(geometry)), &mut PlayerPose::default(), 1.0);
        let fit = s.character.unwrap();
        assert!(matches!(upload, Some(SceneUpload::Character { .. })));
        assert!(fit.footprint.x <= 1.0 + 1e-5);
        assert!((s.blob_scale() - fit.blob_scale()).abs() < 1e-6);
    }

    #[test]
    fn overlay_hides_after_all_loads_settle() {
        let mut s = scene();
        let mut player = PlayerPose::default();
        s.receive(LoadedAsset::Environment(None), &mut player, 100.0);
        s.receive(LoadedAsset::Map(None), &mut player, 200.0);
        assert!(s.progress.overlay_visible(10_000.0));
        s.receive(LoadedAsset::Character(None), &mut player, 300.0);
        assert!(s.progress.is_settled());
        assert_eq!(s.progress.overlay_opacity(450.0), 1.0);
        assert!(s.progress.overlay_opacity(700.0) < 1.0);
        assert!(!s.progress.overlay_visible(300.0 + 200.0 + 400.0));
    }

    #[test]
    fn nothing_to_load_is_settled_immediately() {
        let progress = LoadProgress::new(Vec::new(), 50.0);
        assert!(progress.is_settled());
    }

    #[test]
    fn dots_cycle() {
        let progress = LoadProgress::new(vec![AssetKind::Map], 0.0);
        let seq: Vec<&str> = (0..5).map(|i| progress.dots(i as f64 * 500.0 + 1.0)).collect();
        assert_eq!(seq, vec![".", ".", "..", "...", "."]);
    }
}
