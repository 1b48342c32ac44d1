//! Mesh-to-voxel conversion: parse `.obj` geometry and rasterize triangle
//! surfaces into a cubic occupancy grid.

use std::path::Path;

use structure_model::{ModelResult, OccupancyGrid, VolumeSource};

use crate::LoaderError;

/// Triangle mesh parsed from an `.obj` file.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[usize; 3]>,
}

/// Parse the vertex and face statements of an `.obj` document. Faces with
/// more than three vertices are fan-triangulated; texture/normal indices
/// after `/` are ignored.
pub fn parse_obj(content: &str) -> Result<Mesh, LoaderError> {
    let mut mesh = Mesh::default();

    for (line_no, line) in content.lines().enumerate() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let mut coords = [0.0f32; 3];
                for coord in coords.iter_mut() {
                    *coord = fields
                        .next()
                        .and_then(|f| f.parse().ok())
                        .ok_or_else(|| {
                            LoaderError::InvalidMesh(format!(
                                "malformed vertex on line {}",
                                line_no + 1
                            ))
                        })?;
                }
                mesh.vertices.push(coords);
            }
            Some("f") => {
                let indices: Vec<usize> = fields
                    .map(|field| {
                        let raw = field.split('/').next().unwrap_or(field);
                        raw.parse::<usize>()
                            .ok()
                            .and_then(|i| i.checked_sub(1))
                            .filter(|&i| i < mesh.vertices.len())
                            .ok_or_else(|| {
                                LoaderError::InvalidMesh(format!(
                                    "bad face index `{field}` on line {}",
                                    line_no + 1
                                ))
                            })
                    })
                    .collect::<Result<_, _>>()?;
                if indices.len() < 3 {
                    return Err(LoaderError::InvalidMesh(format!(
                        "face with {} vertices on line {}",
                        indices.len(),
                        line_no + 1
                    )));
                }
                for i in 1..indices.len() - 1 {
                    mesh.triangles.push([indices[0], indices[i], indices[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if mesh.vertices.is_empty() {
        return Err(LoaderError::InvalidMesh("no vertices".to_string()));
    }
    Ok(mesh)
}

/// Rasterize a mesh's triangle surfaces into an occupancy grid.
///
/// The mesh is scaled uniformly so its bounding box fits the grid, then
/// each triangle is sampled on a barycentric lattice fine enough to touch
/// every cell the triangle crosses. Cells hit by any sample read 1.0.
pub fn voxelize(mesh: &Mesh, resolution: usize) -> Result<OccupancyGrid, LoaderError> {
    if resolution == 0 {
        return Err(LoaderError::InvalidMesh("zero voxel resolution".to_string()));
    }

    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for vertex in &mesh.vertices {
        for axis in 0..3 {
            min[axis] = min[axis].min(vertex[axis]);
            max[axis] = max[axis].max(vertex[axis]);
        }
    }
    let extent = (0..3)
        .map(|axis| max[axis] - min[axis])
        .fold(0.0f32, f32::max)
        .max(f32::EPSILON);
    let scale = (resolution as f32 - 1.0) / extent;

    let to_cell = |vertex: &[f32; 3]| -> [f32; 3] {
        [
            (vertex[0] - min[0]) * scale,
            (vertex[1] - min[1]) * scale,
            (vertex[2] - min[2]) * scale,
        ]
    };

    let mut grid = OccupancyGrid::zeros(resolution);
    let mut mark = |point: [f32; 3]| {
        let clamp = |value: f32| {
            (value.round() as usize).min(resolution - 1)
        };
        grid.set(clamp(point[0]), clamp(point[1]), clamp(point[2]), 1.0);
    };

    for triangle in &mesh.triangles {
        let a = to_cell(&mesh.vertices[triangle[0]]);
        let b = to_cell(&mesh.vertices[triangle[1]]);
        let c = to_cell(&mesh.vertices[triangle[2]]);

        let edge = |p: [f32; 3], q: [f32; 3]| {
            ((p[0] - q[0]).powi(2) + (p[1] - q[1]).powi(2) + (p[2] - q[2]).powi(2)).sqrt()
        };
        let longest = edge(a, b).max(edge(b, c)).max(edge(c, a));
        // Two samples per cell along the longest edge covers the interior.
        let steps = ((longest * 2.0).ceil() as usize).clamp(1, 4 * resolution);

        for i in 0..=steps {
            for j in 0..=(steps - i) {
                let u = i as f32 / steps as f32;
                let v = j as f32 / steps as f32;
                let w = 1.0 - u - v;
                mark([
                    a[0] * u + b[0] * v + c[0] * w,
                    a[1] * u + b[1] * v + c[1] * w,
                    a[2] * u + b[2] * v + c[2] * w,
                ]);
            }
        }
    }

    Ok(grid)
}

/// Convenience: parse and voxelize an `.obj` file in one step.
pub fn voxelize_obj_file(path: &Path, resolution: usize) -> Result<OccupancyGrid, LoaderError> {
    let content = std::fs::read_to_string(path)?;
    let mesh = parse_obj(&content)?;
    voxelize(&mesh, resolution)
}

/// Volume source backed by a voxelized asset, for wiring real geometry
/// into the generation pipeline in place of the synthetic placeholder.
pub struct MeshVolumeSource {
    grid: OccupancyGrid,
}

impl MeshVolumeSource {
    pub fn load(path: &Path, resolution: usize) -> Result<Self, LoaderError> {
        Ok(Self {
            grid: voxelize_obj_file(path, resolution)?,
        })
    }

    pub fn from_grid(grid: OccupancyGrid) -> Self {
        Self { grid }
    }
}

impl VolumeSource for MeshVolumeSource {
    fn sample(&self) -> ModelResult<OccupancyGrid> {
        Ok(self.grid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_TRIANGLE: &str = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

    #[test]
    fn parses_vertices_and_faces() {
        let mesh = parse_obj(UNIT_TRIANGLE).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn fan_triangulates_quads() {
        let quad = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1/1 2/2 3/3 4/4\n";
        let mesh = parse_obj(quad).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn rejects_out_of_range_face_index() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(matches!(err, LoaderError::InvalidMesh(_)));
    }

    #[test]
    fn voxelized_triangle_covers_its_corners() {
        let mesh = parse_obj(UNIT_TRIANGLE).unwrap();
        let grid = voxelize(&mesh, 8).unwrap();
        assert_eq!(grid.get(0, 0, 0), 1.0);
        assert_eq!(grid.get(7, 0, 0), 1.0);
        assert_eq!(grid.get(0, 7, 0), 1.0);
        // The far side of the grid stays empty for a z=0 triangle.
        assert_eq!(grid.get(0, 0, 7), 0.0);
    }

    #[test]
    fn voxelization_is_deterministic() {
        let mesh = parse_obj(UNIT_TRIANGLE).unwrap();
        assert_eq!(voxelize(&mesh, 8).unwrap(), voxelize(&mesh, 8).unwrap());
    }
}
