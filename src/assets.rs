//! Asset loading: the map and character glTF files and the HDR environment.
//!
//! Loads never fail the demo. Each request settles into a [`LoadedAsset`]
//! whose payload is `None` when anything went wrong; the reason is logged.

use std::cell::RefCell;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use glam::{Mat4, Vec2, Vec3};
use gltf::mesh::util::ReadIndices;
use thiserror::Error;

use crate::config::AssetConfig;
use crate::model::Surface;
use crate::utils::{Bounds, Mesh, Vertex};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("unsupported buffer uri {0}")]
    UnsupportedUri(String),
    #[error("glTF buffer {0} has no data")]
    MissingBuffer(usize),
    #[error("{0} contains no triangles")]
    EmptyGeometry(String),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("{path}: {source}")]
    Io { path: String, source: std::io::Error },
}

/// Something that can hand out the bytes behind a URL.
#[allow(async_fn_in_trait)]
pub trait AssetSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Environment,
    Map,
    Character,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequest {
    pub kind: AssetKind,
    pub url: String,
}

/// Image-based ambient terms: average radiance above and below the horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentLight {
    pub sky: [f32; 3],
    pub ground: [f32; 3],
}

/// Flattened glTF scene in world space.
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    pub mesh: Mesh,
    pub surfaces: Vec<Surface>,
    pub bounds: Option<Bounds>,
}

#[derive(Debug, Clone)]
pub enum LoadedAsset {
    Environment(Option<EnvironmentLight>),
    Map(Option<SceneGeometry>),
    Character(Option<SceneGeometry>),
}

impl LoadedAsset {
    pub fn kind(&self) -> AssetKind {
        match self {
            LoadedAsset::Environment(_) => AssetKind::Environment,
            LoadedAsset::Map(_) => AssetKind::Map,
            LoadedAsset::Character(_) => AssetKind::Character,
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            LoadedAsset::Environment(e) => e.is_some(),
            LoadedAsset::Map(m) => m.is_some(),
            LoadedAsset::Character(c) => c.is_some(),
        }
    }
}

/// Finished loads waiting for the frame loop.
#[derive(Clone, Default)]
pub struct AssetInbox {
    items: Rc<RefCell<Vec<LoadedAsset>>>,
}

impl AssetInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, asset: LoadedAsset) {
        self.items.borrow_mut().push(asset);
    }

    pub fn drain(&self) -> Vec<LoadedAsset> {
        std::mem::take(&mut *self.items.borrow_mut())
    }
}

///////////////////////////////////////////////////////////////////////////////
// URLs

/// Absolute, protocol-relative, `data:` and `blob:` URLs.
pub fn is_external_url(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("//")
        || path.starts_with("data:")
        || path.starts_with("blob:")
}

pub fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else if base.ends_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Directory part of a URL, including the trailing slash.
pub fn base_of(url: &str) -> &str {
    match url.rfind('/') {
        Some(i) => &url[..=i],
        None => "",
    }
}

/// Pick the character model: stored preference, then query parameter, then the default skin.
pub fn resolve_model_url(stored: Option<&str>, query: Option<&str>, config: &AssetConfig) -> String {
    let chosen = stored
        .filter(|s| !s.is_empty())
        .or(query.filter(|s| !s.is_empty()))
        .map(str::trim);
    match chosen {
        Some(path) if !path.is_empty() => {
            if is_external_url(path) || path.starts_with('/') {
                path.to_string()
            } else {
                join_url(&config.model_root, path)
            }
        }
        _ => config.default_model.clone(),
    }
}

/// The requests to issue at startup, in no particular order.
pub fn startup_requests(config: &AssetConfig, model_url: String, skip_environment: bool) -> Vec<AssetRequest> {
    let mut requests = Vec::with_capacity(3);
    if !(skip_environment || config.skip_environment) {
        requests.push(AssetRequest { kind: AssetKind::Environment, url: config.environment.clone() });
    }
    requests.push(AssetRequest { kind: AssetKind::Map, url: config.map.clone() });
    requests.push(AssetRequest { kind: AssetKind::Character, url: model_url });
    requests
}

pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, AssetError> {
    let unsupported = || AssetError::UnsupportedUri(uri.chars().take(48).collect());
    let rest = uri.strip_prefix("data:").ok_or_else(unsupported)?;
    let (header, payload) = rest.split_once(',').ok_or_else(unsupported)?;
    if !header.ends_with(";base64") {
        return Err(unsupported());
    }
    BASE64.decode(payload.trim()).map_err(|_| unsupported())
}

async fn fetch_bytes<S: AssetSource>(source: &S, url: &str) -> Result<Vec<u8>, AssetError> {
    if url.starts_with("data:") {
        decode_data_uri(url)
    } else {
        source.fetch(url).await
    }
}

///////////////////////////////////////////////////////////////////////////////
// Loaders

/// Run one request to completion, logging instead of failing.
pub async fn load_asset<S: AssetSource>(source: &S, request: &AssetRequest) -> LoadedAsset {
    tracing::info!("Loading {:?} from {}", request.kind, request.url);
    let url = request.url.as_str();
    let loaded = match request.kind {
        AssetKind::Environment => LoadedAsset::Environment(settle(url, load_environment(source, url).await)),
        AssetKind::Map => LoadedAsset::Map(settle(url, load_scene(source, url).await)),
        AssetKind::Character => LoadedAsset::Character(settle(url, load_scene(source, url).await)),
    };
    if loaded.succeeded() {
        tracing::info!("{:?} ready", request.kind);
    }
    loaded
}

fn settle<T>(url: &str, result: Result<T, AssetError>) -> Option<T> {
    result.map_err(|e| tracing::warn!("Failed to load {}: {}", url, e)).ok()
}

pub async fn load_environment<S: AssetSource>(source: &S, url: &str) -> Result<EnvironmentLight, AssetError> {
    let bytes = fetch_bytes(source, url).await?;
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Hdr)?.to_rgb32f();
    let (w, h) = img.dimensions();
    Ok(environment_from_pixels(w as usize, h as usize, img.as_raw()))
}

/// Average an equirectangular RGB image into sky and ground radiance.
pub fn environment_from_pixels(width: usize, height: usize, rgb: &[f32]) -> EnvironmentLight {
    let row_len = width * 3;
    let average = |rows: std::ops::Range<usize>| {
        let mut sum = [0.0f64; 3];
        let mut count = 0usize;
        for row in rows {
            for px in rgb[row * row_len..(row + 1) * row_len].chunks_exact(3) {
                for (s, c) in sum.iter_mut().zip(px) {
                    // HDR files occasionally carry NaN or inf texels
                    if c.is_finite() {
                        *s += *c as f64;
                    }
                }
                count += 1;
            }
        }
        let n = count.max(1) as f64;
        [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
    };
    if width == 0 || height == 0 || rgb.len() < width * height * 3 {
        return EnvironmentLight { sky: [0.0; 3], ground: [0.0; 3] };
    }
    let half = height / 2;
    EnvironmentLight {
        sky: average(0..half.max(1)),
        ground: average(half..height),
    }
}

pub async fn load_scene<S: AssetSource>(source: &S, url: &str) -> Result<SceneGeometry, AssetError> {
    let bytes = fetch_bytes(source, url).await?;
    let gltf = gltf::Gltf::from_slice(&bytes)?;

    let mut buffers = Vec::new();
    for buffer in gltf.document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or(AssetError::MissingBuffer(buffer.index()))?,
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => decode_data_uri(uri)?,
            gltf::buffer::Source::Uri(uri) => {
                let resolved = if is_external_url(uri) { uri.to_string() } else { join_url(base_of(url), uri) };
                fetch_bytes(source, &resolved).await?
            }
        };
        buffers.push(data);
    }

    let geometry = collect_geometry(&gltf.document, &buffers);
    if geometry.mesh.is_empty() {
        return Err(AssetError::EmptyGeometry(url.to_string()));
    }
    tracing::debug!(
        "{}: {} vertices, {} triangles",
        url,
        geometry.mesh.vertices.len(),
        geometry.surfaces.len()
    );
    Ok(geometry)
}

/// Walk the default scene, baking node transforms into world-space geometry.
pub fn collect_geometry(doc: &gltf::Document, buffers: &[Vec<u8>]) -> SceneGeometry {
    let mut out = SceneGeometry::default();
    let scene = doc.default_scene().or_else(|| doc.scenes().next());
    if let Some(scene) = scene {
        for node in scene.nodes() {
            visit_node(&node, Mat4::IDENTITY, buffers, &mut out);
        }
    }
    out.bounds = out.mesh.bounds();
    out
}

fn visit_node(node: &gltf::Node, parent: Mat4, buffers: &[Vec<u8>], out: &mut SceneGeometry) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for prim in mesh.primitives() {
            if prim.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }
            append_primitive(&prim, world, buffers, out);
        }
    }
    for child in node.children() {
        visit_node(&child, world, buffers, out);
    }
}

fn append_primitive(prim: &gltf::Primitive, world: Mat4, buffers: &[Vec<u8>], out: &mut SceneGeometry) {
    let reader = prim.reader(|b| buffers.get(b.index()).map(|d| d.as_slice()));
    let positions: Vec<[f32; 3]> = match reader.read_positions() {
        Some(it) => it.collect(),
        None => return,
    };
    let indices: Vec<u32> = match reader.read_indices() {
        Some(ReadIndices::U8(it)) => it.map(u32::from).collect(),
        Some(ReadIndices::U16(it)) => it.map(u32::from).collect(),
        Some(ReadIndices::U32(it)) => it.collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let normals: Vec<[f32; 3]> = match reader.read_normals().map(|it| it.collect::<Vec<_>>()) {
        Some(normals) if normals.len() == positions.len() => normals,
        Some(normals) => {
            tracing::warn!(
                "NORMAL has {} entries for {} positions, deriving face normals",
                normals.len(),
                positions.len()
            );
            face_normals(&positions, &indices)
        }
        None => face_normals(&positions, &indices),
    };
    let colors: Option<Vec<[f32; 4]>> = reader.read_colors(0).map(|c| c.into_rgba_f32().collect());

    let material = prim.material();
    let base = material.pbr_metallic_roughness().base_color_factor();
    let double_sided = material.double_sided();

    let mut local = Mesh::empty();
    for (i, (pos, normal)) in positions.iter().zip(normals.iter()).enumerate() {
        let tint = colors.as_ref().and_then(|c| c.get(i)).copied().unwrap_or([1.0; 4]);
        let color = [base[0] * tint[0], base[1] * tint[1], base[2] * tint[2], base[3] * tint[3]];
        local.vertices.push(Vertex { pos: *pos, normal: *normal, color });
    }
    local.indices = indices
        .chunks_exact(3)
        .filter(|t| t.iter().all(|&i| (i as usize) < local.vertices.len()))
        .flatten()
        .copied()
        .collect();
    local.transform(world);

    // a mirroring transform flips the winding that decides the front face
    let mirrored = world.determinant() < 0.0;
    for tri in local.indices.chunks_exact(3) {
        let p = |i: u32| Vec3::from(local.vertices[i as usize].pos);
        let (a, b, c) = (p(tri[0]), p(tri[1]), p(tri[2]));
        let (b, c) = if mirrored { (c, b) } else { (b, c) };
        out.surfaces.push(Surface::new(a, b, c, double_sided));
    }
    out.mesh.extend(&local);
}

fn face_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut acc = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let (pa, pb, pc) = (Vec3::from(positions[a]), Vec3::from(positions[b]), Vec3::from(positions[c]));
        let n = (pb - pa).cross(pc - pa);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }
    acc.into_iter()
        .map(|n| if n == Vec3::ZERO { [0.0, 1.0, 0.0] } else { n.normalize().to_array() })
        .collect()
}

///////////////////////////////////////////////////////////////////////////////
// Character fitting

/// Uniform scale and lift placing a character model on the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterFit {
    pub scale: f32,
    pub offset: Vec3,
    /// Width and depth after scaling.
    pub footprint: Vec2,
    pub height: f32,
}

impl CharacterFit {
    pub fn transform(&self) -> Mat4 {
        Mat4::from_translation(self.offset) * Mat4::from_scale(Vec3::splat(self.scale))
    }

    /// Diameter of the blob shadow under this character.
    pub fn blob_scale(&self) -> f32 {
        self.footprint.x.max(self.footprint.y).max(0.6) * 0.9
    }
}

/// Scale to `target_height`, shrink further if the footprint exceeds
/// `max_footprint`, then lift so the lowest point sits at y = 0.
pub fn fit_character(bounds: &Bounds, target_height: f32, max_footprint: f32) -> CharacterFit {
    let size = bounds.size();
    let raw_height = if size.y > 0.0 { size.y } else { 1.0 };
    let mut scale = target_height / raw_height;

    let (width, depth) = (size.x * scale, size.z * scale);
    if width > max_footprint || depth > max_footprint {
        let cap = (max_footprint / width.max(1e-6)).min(max_footprint / depth.max(1e-6));
        tracing::debug!("Capping character scale by {:.3} to fit the footprint", cap);
        scale *= cap;
    }

    CharacterFit {
        scale,
        offset: Vec3::new(0.0, -bounds.min.y * scale, 0.0),
        footprint: Vec2::new(size.x * scale, size.z * scale),
        height: size.y * scale,
    }
}

///////////////////////////////////////////////////////////////////////////////
// Sources

#[cfg(target_arch = "wasm32")]
pub use web::WebSource;

#[cfg(target_arch = "wasm32")]
mod web {
    use super::{AssetError, AssetSource};
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    /// Fetch API backed source.
    pub struct WebSource;

    fn fetch_error(url: &str, e: wasm_bindgen::JsValue) -> AssetError {
        AssetError::Fetch { url: url.to_string(), reason: format!("{e:?}") }
    }

    impl AssetSource for WebSource {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            let window = web_sys::window().ok_or_else(|| AssetError::Fetch {
                url: url.to_string(),
                reason: "no window".to_string(),
            })?;
            let response = JsFuture::from(window.fetch_with_str(url))
                .await
                .map_err(|e| fetch_error(url, e))?
                .dyn_into::<web_sys::Response>()
                .map_err(|e| fetch_error(url, e))?;
            if !response.ok() {
                return Err(AssetError::Status { url: url.to_string(), status: response.status() });
            }
            let buffer = JsFuture::from(response.array_buffer().map_err(|e| fetch_error(url, e))?)
                .await
                .map_err(|e| fetch_error(url, e))?;
            Ok(js_sys::Uint8Array::new(&buffer).to_vec())
        }
    }
}

/// Reads assets from a directory on disk.
#[cfg(not(target_arch = "wasm32"))]
pub struct FsSource {
    pub root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetSource for FsSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        if is_external_url(url) {
            return Err(AssetError::Fetch { url: url.to_string(), reason: "remote URLs need the web build".to_string() });
        }
        let path = self.root.join(url.trim_start_matches('/'));
        std::fs::read(&path).map_err(|source| AssetError::Io { path: path.display().to_string(), source })
    }
}
