use glam::{Mat3, Mat4, Vec3};
use wgpu::util::DeviceExt;
use bytemuck::NoUninit;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Append another mesh, rebasing its indices.
    pub fn extend(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.vertices.iter().map(|v| Vec3::from(v.pos)))
    }

    /// Bake a transform into positions and normals.
    pub fn transform(&mut self, m: Mat4) {
        let normal_m = Mat3::from_mat4(m).inverse().transpose();
        for v in self.vertices.iter_mut() {
            v.pos = m.transform_point3(Vec3::from(v.pos)).to_array();
            v.normal = (normal_m * Vec3::from(v.normal)).normalize_or_zero().to_array();
        }
    }

    pub fn upload(&self, device: &wgpu::Device) -> MeshBuffer {

        let vertices = bytemuck::cast_slice(&self.vertices);
        let indices = bytemuck::cast_slice(&self.indices);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: indices,
            usage: wgpu::BufferUsages::INDEX,
        });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: self.indices.len() as u32,
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self { min: first, max: first }, |b, p| Self {
            min: b.min.min(p),
            max: b.max.max(p),
        }))
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Flat square centered on the origin, facing +Y.
pub fn create_ground_plane(size: f32, color: [f32; 4]) -> Mesh {
    let h = size * 0.5;
    let normal = [0.0, 1.0, 0.0];
    let vertices = vec![
        Vertex { pos: [-h, 0.0, -h], normal, color },
        Vertex { pos: [h, 0.0, -h], normal, color },
        Vertex { pos: [h, 0.0, h], normal, color },
        Vertex { pos: [-h, 0.0, h], normal, color },
    ];
    // counter-clockwise seen from above
    Mesh { vertices, indices: vec![0, 2, 1, 0, 3, 2] }
}

/// Box resting on y = 0, centered in x and z.
pub fn create_box(width: f32, height: f32, depth: f32, color: [f32; 4]) -> Mesh {
    let (hx, hz) = (width * 0.5, depth * 0.5);
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        ([0.0, 0.0, 1.0], [[-hx, 0.0, hz], [hx, 0.0, hz], [hx, height, hz], [-hx, height, hz]]),
        ([0.0, 0.0, -1.0], [[hx, 0.0, -hz], [-hx, 0.0, -hz], [-hx, height, -hz], [hx, height, -hz]]),
        ([1.0, 0.0, 0.0], [[hx, 0.0, hz], [hx, 0.0, -hz], [hx, height, -hz], [hx, height, hz]]),
        ([-1.0, 0.0, 0.0], [[-hx, 0.0, -hz], [-hx, 0.0, hz], [-hx, height, hz], [-hx, height, -hz]]),
        ([0.0, 1.0, 0.0], [[-hx, height, hz], [hx, height, hz], [hx, height, -hz], [-hx, height, -hz]]),
        ([0.0, -1.0, 0.0], [[-hx, 0.0, -hz], [hx, 0.0, -hz], [hx, 0.0, hz], [-hx, 0.0, hz]]),
    ];

    let mut mesh = Mesh::empty();
    for (normal, corners) in faces {
        let base = mesh.vertices.len() as u32;
        mesh.vertices.extend(corners.iter().map(|&pos| Vertex { pos, normal, color }));
        mesh.indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    mesh
}

/// Unit-diameter disc whose alpha fades from `center_alpha` to zero at the rim.
pub fn create_blob_disc(segments: u32, center_alpha: f32) -> Mesh {
    let normal = [0.0, 1.0, 0.0];
    let mut vertices = vec![Vertex { pos: [0.0, 0.0, 0.0], normal, color: [0.0, 0.0, 0.0, center_alpha] }];
    // mid ring carries a quarter of the center density
    for (radius, alpha) in [(0.25, center_alpha * 0.25), (0.5, 0.0)] {
        for i in 0..segments {
            let a = i as f32 / segments as f32 * std::f32::consts::TAU;
            vertices.push(Vertex {
                pos: [a.cos() * radius, 0.0, a.sin() * radius],
                normal,
                color: [0.0, 0.0, 0.0, alpha],
            });
        }
    }

    let mut indices = Vec::new();
    for i in 0..segments {
        let next = (i + 1) % segments;
        let (inner, inner_next) = (1 + i, 1 + next);
        let (outer, outer_next) = (1 + segments + i, 1 + segments + next);
        indices.extend([0, inner_next, inner]);
        indices.extend([inner, inner_next, outer_next, inner, outer_next, outer]);
    }
    Mesh { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_rests_on_ground() {
        let mesh = create_box(1.0, 1.8, 1.0, [1.0; 4]);
        let b = mesh.bounds().unwrap();
        assert_eq!(b.min.y, 0.0);
        assert!((b.size() - Vec3::new(1.0, 1.8, 1.0)).length() < 1e-6);
        assert_eq!(mesh.indices.len(), 36);
    }

    #[test]
    fn extend_rebases_indices() {
        let mut a = create_ground_plane(2.0, [1.0; 4]);
        let b = create_ground_plane(2.0, [1.0; 4]);
        a.extend(&b);
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(*a.indices.iter().max().unwrap(), 7);
    }

    #[test]
    fn transform_moves_bounds() {
        let mut mesh = create_box(1.0, 1.0, 1.0, [1.0; 4]);
        mesh.transform(Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0)));
        let b = mesh.bounds().unwrap();
        assert!((b.min.y - 2.0).abs() < 1e-6);
        assert!((b.max.y - 4.0).abs() < 1e-6);
    }

    #[test]
    fn blob_disc_is_unit_diameter() {
        let mesh = create_blob_disc(16, 0.12);
        let b = mesh.bounds().unwrap();
        assert!((b.size().x - 1.0).abs() < 1e-3);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }
}
