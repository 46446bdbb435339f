//! Mesh data structures and primitive generation.

use crate::vertex::{PointVertex, Vertex};
use glam::Vec3;
use wgpu::util::DeviceExt;

/// Triangle mesh data before GPU upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new() -> Self {
        Self::default()
    }

    /// UV sphere with `width_segments` around and `height_segments` pole to pole.
    /// u runs west to east, v runs north (0) to south (1), matching equirectangular maps.
    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);
        let mut vertices = Vec::with_capacity(((width_segments + 1) * (height_segments + 1)) as usize);
        let mut indices = Vec::new();

        for ring in 0..=height_segments {
            let v = ring as f32 / height_segments as f32;
            let theta = v * std::f32::consts::PI;
            for segment in 0..=width_segments {
                let u = segment as f32 / width_segments as f32;
                let phi = u * std::f32::consts::TAU;
                let position = Vec3::new(
                    -radius * phi.cos() * theta.sin(),
                    radius * theta.cos(),
                    radius * phi.sin() * theta.sin(),
                );
                let normal = position.normalize_or_zero();
                vertices.push(Vertex::new(position.into(), normal.into(), [u, v]));
            }
        }

        let row = width_segments + 1;
        for ring in 0..height_segments {
            for segment in 0..width_segments {
                let a = ring * row + segment + 1;
                let b = ring * row + segment;
                let c = (ring + 1) * row + segment;
                let d = (ring + 1) * row + segment + 1;
                // Pole rows collapse to a point; skip their degenerate halves.
                if ring != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if ring != height_segments - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }

        Self { vertices, indices }
    }

    /// Axis-aligned box centered at origin.
    pub fn cuboid(width: f32, height: f32, depth: f32) -> Self {
        let (x, y, z) = (width / 2.0, height / 2.0, depth / 2.0);
        let vertices = vec![
            // Front face
            Vertex::new([-x, -y, z], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([x, -y, z], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([x, y, z], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([-x, y, z], [0.0, 0.0, 1.0], [0.0, 0.0]),
            // Back face
            Vertex::new([x, -y, -z], [0.0, 0.0, -1.0], [0.0, 1.0]),
            Vertex::new([-x, -y, -z], [0.0, 0.0, -1.0], [1.0, 1.0]),
            Vertex::new([-x, y, -z], [0.0, 0.0, -1.0], [1.0, 0.0]),
            Vertex::new([x, y, -z], [0.0, 0.0, -1.0], [0.0, 0.0]),
            // Top face
            Vertex::new([-x, y, z], [0.0, 1.0, 0.0], [0.0, 1.0]),
            Vertex::new([x, y, z], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex::new([x, y, -z], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([-x, y, -z], [0.0, 1.0, 0.0], [0.0, 0.0]),
            // Bottom face
            Vertex::new([-x, -y, -z], [0.0, -1.0, 0.0], [0.0, 1.0]),
            Vertex::new([x, -y, -z], [0.0, -1.0, 0.0], [1.0, 1.0]),
            Vertex::new([x, -y, z], [0.0, -1.0, 0.0], [1.0, 0.0]),
            Vertex::new([-x, -y, z], [0.0, -1.0, 0.0], [0.0, 0.0]),
            // Right face
            Vertex::new([x, -y, z], [1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([x, -y, -z], [1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([x, y, -z], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([x, y, z], [1.0, 0.0, 0.0], [0.0, 0.0]),
            // Left face
            Vertex::new([-x, -y, -z], [-1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([-x, -y, z], [-1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([-x, y, z], [-1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([-x, y, -z], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        ];

        #[rustfmt::skip]
        let indices = vec![
            0, 1, 2, 2, 3, 0,       // Front
            4, 5, 6, 6, 7, 4,       // Back
            8, 9, 10, 10, 11, 8,    // Top
            12, 13, 14, 14, 15, 12, // Bottom
            16, 17, 18, 18, 19, 16, // Right
            20, 21, 22, 22, 23, 20, // Left
        ];

        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Center and radius of a sphere enclosing every vertex.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, 0.0);
        }
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in &self.vertices {
            let p = Vec3::from(v.position);
            min = min.min(p);
            max = max.max(p);
        }
        let center = (min + max) * 0.5;
        let radius = self
            .vertices
            .iter()
            .map(|v| (Vec3::from(v.position) - center).length())
            .fold(0.0, f32::max);
        (center, radius)
    }

    pub fn upload(&self, device: &wgpu::Device) -> Mesh {
        Mesh::new(device, &self.vertices, &self.indices)
    }
}

/// Point cloud data before GPU upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<PointVertex>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// CPU-side geometry handed to a render backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Mesh(MeshData),
    Points(PointCloud),
}

impl Geometry {
    pub fn triangle_count(&self) -> u32 {
        match self {
            Geometry::Mesh(mesh) => mesh.triangle_count(),
            Geometry::Points(_) => 0,
        }
    }

    pub fn point_count(&self) -> u32 {
        match self {
            Geometry::Mesh(_) => 0,
            Geometry::Points(cloud) => cloud.len() as u32,
        }
    }
}

/// A GPU mesh with vertex and index buffers.
pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

impl Mesh {
    /// Create a mesh from vertex and index data.
    pub fn new(device: &wgpu::Device, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: indices.len() as u32,
        }
    }
}

/// A GPU point cloud: one instance per point.
pub struct PointBuffer {
    pub instance_buffer: wgpu::Buffer,
    pub num_points: u32,
}

impl PointBuffer {
    pub fn new(device: &wgpu::Device, cloud: &PointCloud) -> Self {
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Point Instance Buffer"),
            contents: bytemuck::cast_slice(&cloud.points),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            instance_buffer,
            num_points: cloud.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward(mesh: &MeshData) {
        for tri in mesh.indices.chunks(3) {
            let a = Vec3::from(mesh.vertices[tri[0] as usize].position);
            let b = Vec3::from(mesh.vertices[tri[1] as usize].position);
            let c = Vec3::from(mesh.vertices[tri[2] as usize].position);
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward-facing triangle {:?}", tri);
        }
    }

    #[test]
    fn sphere_vertex_count_and_radius() {
        let mesh = MeshData::sphere(1.5, 24, 24);
        assert_eq!(mesh.vertices.len(), 25 * 25);
        for v in &mesh.vertices {
            assert!((Vec3::from(v.position).length() - 1.5).abs() < 1e-4);
        }
        // 24 * 24 quads minus the degenerate pole halves.
        assert_eq!(mesh.triangle_count(), 24 * 24 * 2 - 2 * 24);
    }

    #[test]
    fn sphere_winding_faces_outward() {
        assert_outward(&MeshData::sphere(1.0, 12, 8));
    }

    #[test]
    fn cuboid_winding_faces_outward() {
        assert_outward(&MeshData::cuboid(1.5, 0.8, 3.0));
    }

    #[test]
    fn cuboid_bounding_sphere_encloses_corners() {
        let (center, radius) = MeshData::cuboid(2.0, 2.0, 2.0).bounding_sphere();
        assert!(center.length() < 1e-6);
        assert!((radius - 3.0_f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn geometry_counts() {
        let cloud = PointCloud {
            points: vec![PointVertex::new([0.0; 3], [1.0; 3], 1.0, 0.0); 10],
        };
        assert_eq!(Geometry::Points(cloud).point_count(), 10);
        assert_eq!(Geometry::Mesh(MeshData::cuboid(1.0, 1.0, 1.0)).triangle_count(), 12);
    }
}
