use std::collections::HashMap;

use nalgebra::{Point2, Vector2};
use tracing::debug;

use crate::error::{FiberMeshError, Result};

/// Topology shared by every cell of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Four-noded quadrilateral, counter-clockwise
    Quad,
    /// Two-noded line segment
    Line,
}

impl CellType {
    pub fn nodes_per_cell(&self) -> usize {
        match self {
            CellType::Quad => 4,
            CellType::Line => 2,
        }
    }
}

/// Axis a mesh is reflected across
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirror {
    /// Reflect across the vertical axis, `x -> -x`
    Vertical,
    /// Reflect across the horizontal axis, `y -> -y`
    Horizontal,
}

/// A 2d mesh: ordered points plus a flat connectivity array.
///
/// Point order is insertion order. Cells are stored back to back, each with
/// `cell_type.nodes_per_cell()` indices into `points`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    points: Vec<Point2<f64>>,
    cells: Vec<usize>,
    cell_type: CellType,
}

impl Mesh {
    /// Creates a mesh, checking that the connectivity references valid points
    ///
    /// # Arguments
    /// * `points` - The point coordinates
    /// * `cells` - Flat connectivity, `nodes_per_cell` indices per cell
    /// * `cell_type` - The topology of every cell
    pub fn new(points: Vec<Point2<f64>>, cells: Vec<usize>, cell_type: CellType) -> Result<Mesh> {
        let npc = cell_type.nodes_per_cell();
        if cells.len() % npc != 0 {
            return Err(FiberMeshError::Geometry(format!(
                "connectivity length {} is not a multiple of {npc}",
                cells.len()
            )));
        }
        if let Some(bad) = cells.iter().find(|&&i| i >= points.len()) {
            return Err(FiberMeshError::Geometry(format!(
                "cell references point {bad} but mesh has {} points",
                points.len()
            )));
        }

        Ok(Mesh {
            points,
            cells,
            cell_type,
        })
    }

    pub fn npoints(&self) -> usize {
        self.points.len()
    }

    pub fn ncells(&self) -> usize {
        self.cells.len() / self.cell_type.nodes_per_cell()
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// Mutable access to the coordinates. Topology stays fixed.
    pub fn points_mut(&mut self) -> &mut [Point2<f64>] {
        &mut self.points
    }

    /// Flat connectivity array
    pub fn connectivity(&self) -> &[usize] {
        &self.cells
    }

    pub fn cells(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.cells.chunks_exact(self.cell_type.nodes_per_cell())
    }

    pub fn cell(&self, index: usize) -> &[usize] {
        let npc = self.cell_type.nodes_per_cell();
        &self.cells[index * npc..(index + 1) * npc]
    }

    /// Stacks the points of all meshes and offsets each mesh's cell indices by
    /// the number of points that came before it
    ///
    /// # Arguments
    /// * `meshes` - The meshes to join, all of the same cell type
    pub fn concatenate(meshes: &[&Mesh]) -> Result<Mesh> {
        let cell_type = match meshes.first() {
            Some(m) => m.cell_type,
            None => {
                return Err(FiberMeshError::Geometry(
                    "cannot concatenate an empty list of meshes".to_owned(),
                ))
            }
        };

        let npoints = meshes.iter().map(|m| m.npoints()).sum();
        let ncells = meshes.iter().map(|m| m.cells.len()).sum();
        let mut points: Vec<Point2<f64>> = Vec::with_capacity(npoints);
        let mut cells: Vec<usize> = Vec::with_capacity(ncells);

        for mesh in meshes {
            if mesh.cell_type != cell_type {
                return Err(FiberMeshError::Geometry(format!(
                    "cannot concatenate {:?} and {:?} meshes",
                    cell_type, mesh.cell_type
                )));
            }
            let offset = points.len();
            points.extend_from_slice(&mesh.points);
            cells.extend(mesh.cells.iter().map(|i| i + offset));
        }

        Ok(Mesh {
            points,
            cells,
            cell_type,
        })
    }

    /// Returns a reflected copy. Node order of each cell is reversed so that
    /// quads keep a counter-clockwise orientation.
    pub fn mirror(&self, mirror: Mirror) -> Mesh {
        let points = self
            .points
            .iter()
            .map(|p| match mirror {
                Mirror::Vertical => Point2::new(-p.x, p.y),
                Mirror::Horizontal => Point2::new(p.x, -p.y),
            })
            .collect();

        let mut cells = self.cells.clone();
        for cell in cells.chunks_exact_mut(self.cell_type.nodes_per_cell()) {
            cell.reverse();
        }

        Mesh {
            points,
            cells,
            cell_type: self.cell_type,
        }
    }

    /// Merges points whose coordinates agree after rounding to `decimals`
    /// decimals, remaps the cells and drops points no cell references.
    ///
    /// The first occurrence of a merged point survives with its original
    /// coordinates, so the relative order of the remaining points is kept.
    pub fn sweep(&self, decimals: i32) -> Mesh {
        let scale = 10f64.powi(decimals);
        let key = |p: &Point2<f64>| ((p.x * scale).round() as i64, (p.y * scale).round() as i64);

        let mut first_seen: HashMap<(i64, i64), usize> = HashMap::with_capacity(self.points.len());
        let mut merged_into: Vec<usize> = Vec::with_capacity(self.points.len());
        for (i, point) in self.points.iter().enumerate() {
            let target = *first_seen.entry(key(point)).or_insert(i);
            merged_into.push(target);
        }

        let cells: Vec<usize> = self.cells.iter().map(|&i| merged_into[i]).collect();

        // compact the point array down to referenced points
        let mut used = vec![false; self.points.len()];
        for &i in &cells {
            used[i] = true;
        }
        let mut new_index = vec![usize::MAX; self.points.len()];
        let mut points: Vec<Point2<f64>> = Vec::with_capacity(first_seen.len());
        for (i, point) in self.points.iter().enumerate() {
            if used[i] {
                new_index[i] = points.len();
                points.push(*point);
            }
        }

        debug!(
            "swept mesh from {} to {} points",
            self.points.len(),
            points.len()
        );

        Mesh {
            points,
            cells: cells.iter().map(|&i| new_index[i]).collect(),
            cell_type: self.cell_type,
        }
    }

    /// Per point flag, true where at least one cell references the point
    pub fn point_usage(&self) -> Vec<bool> {
        let mut used = vec![false; self.points.len()];
        for &i in &self.cells {
            used[i] = true;
        }
        used
    }

    pub fn points_without_cells(&self) -> Vec<usize> {
        self.point_usage()
            .iter()
            .enumerate()
            .filter(|&(_, &used)| !used)
            .map(|(i, _)| i)
            .collect()
    }

    /// Moves every point that no cell references to the origin. Returns the
    /// number of points moved.
    pub fn zero_points_without_cells(&mut self) -> usize {
        let unused = self.points_without_cells();
        for &i in &unused {
            self.points[i] = Point2::origin();
        }
        unused.len()
    }

    /// Adds a point-aligned displacement field to the coordinates
    pub fn apply_displacement(&mut self, displacement: &[Vector2<f64>]) -> Result<()> {
        if displacement.len() != self.points.len() {
            return Err(FiberMeshError::Geometry(format!(
                "displacement has {} values but mesh has {} points",
                displacement.len(),
                self.points.len()
            )));
        }
        for (point, u) in self.points.iter_mut().zip(displacement) {
            *point += *u;
        }
        Ok(())
    }

    /// Signed area of a cell; zero for line cells
    pub fn cell_area(&self, index: usize) -> f64 {
        if self.cell_type == CellType::Line {
            return 0.0;
        }
        let cell = self.cell(index);
        let mut twice_area = 0.0;
        for (k, &i) in cell.iter().enumerate() {
            let a = &self.points[i];
            let b = &self.points[cell[(k + 1) % cell.len()]];
            twice_area += a.x * b.y - b.x * a.y;
        }
        0.5 * twice_area
    }

    pub fn area(&self) -> f64 {
        (0..self.ncells()).map(|i| self.cell_area(i)).sum()
    }

    pub fn cell_centroid(&self, index: usize) -> Point2<f64> {
        let cell = self.cell(index);
        let sum = cell
            .iter()
            .fold(Vector2::zeros(), |acc, &i| acc + self.points[i].coords);
        Point2::from(sum / cell.len() as f64)
    }

    pub fn cell_centroids(&self) -> Vec<Point2<f64>> {
        (0..self.ncells()).map(|i| self.cell_centroid(i)).collect()
    }

    /// Axis-aligned bounds as `(min, max)`, `None` for a mesh without points
    pub fn bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        bounding_box(self.points.iter())
    }
}

/// Axis-aligned bounds of a set of points
pub fn bounding_box<'a>(
    points: impl IntoIterator<Item = &'a Point2<f64>>,
) -> Option<(Point2<f64>, Point2<f64>)> {
    points.into_iter().fold(None, |bounds, p| match bounds {
        None => Some((*p, *p)),
        Some((min, max)) => Some((
            Point2::new(min.x.min(p.x), min.y.min(p.y)),
            Point2::new(max.x.max(p.x), max.y.max(p.y)),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Mesh {
        Mesh::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(0.0, 1.0),
            ],
            vec![0, 1, 2, 3],
            CellType::Quad,
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_out_of_range_index() {
        let result = Mesh::new(vec![Point2::origin()], vec![0, 1], CellType::Line);
        assert!(matches!(result, Err(FiberMeshError::Geometry(_))));
    }

    #[test]
    fn test_new_rejects_partial_cell() {
        let result = Mesh::new(vec![Point2::origin(); 3], vec![0, 1, 2], CellType::Line);
        assert!(result.is_err());
    }

    #[test]
    fn test_concatenate_offsets_cells() {
        let a = unit_square();
        let b = unit_square();
        let joined = Mesh::concatenate(&[&a, &b]).unwrap();

        assert_eq!(joined.npoints(), 8);
        assert_eq!(joined.ncells(), 2);
        assert_eq!(joined.cell(0), &[0, 1, 2, 3]);
        assert_eq!(joined.cell(1), &[4, 5, 6, 7]);
    }

    #[test]
    fn test_concatenate_three_meshes_offsets_by_running_count() {
        let line = Mesh::new(
            vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)],
            vec![0, 1],
            CellType::Line,
        )
        .unwrap();
        let longer = Mesh::new(
            vec![
                Point2::new(0.0, 1.0),
                Point2::new(1.0, 1.0),
                Point2::new(2.0, 1.0),
            ],
            vec![0, 1, 1, 2],
            CellType::Line,
        )
        .unwrap();

        let joined = Mesh::concatenate(&[&line, &longer, &line]).unwrap();
        assert_eq!(joined.npoints(), 7);
        assert_eq!(joined.connectivity(), &[0, 1, 2, 3, 3, 4, 5, 6]);
    }

    #[test]
    fn test_concatenate_rejects_mixed_types() {
        let quad = unit_square();
        let line = Mesh::new(vec![Point2::origin(); 2], vec![0, 1], CellType::Line).unwrap();
        assert!(Mesh::concatenate(&[&quad, &line]).is_err());
        assert!(Mesh::concatenate(&[]).is_err());
    }

    #[test]
    fn test_mirror_keeps_orientation() {
        let square = unit_square();
        let mirrored = square.mirror(Mirror::Vertical);

        assert_relative_eq!(square.area(), 1.0);
        assert_relative_eq!(mirrored.area(), 1.0);
        assert_relative_eq!(mirrored.points()[1].x, -1.0);

        let flipped = square.mirror(Mirror::Horizontal);
        assert_relative_eq!(flipped.area(), 1.0);
        assert_relative_eq!(flipped.points()[2].y, -1.0);
    }

    #[test]
    fn test_mirror_then_sweep_merges_shared_edge() {
        let square = unit_square();
        let both = Mesh::concatenate(&[&square, &square.mirror(Mirror::Vertical)]).unwrap();
        let swept = both.sweep(3);

        // two squares sharing the edge x = 0
        assert_eq!(swept.npoints(), 6);
        assert_eq!(swept.ncells(), 2);
        assert_relative_eq!(swept.area(), 2.0);
        // first occurrence order is preserved
        assert_eq!(&swept.points()[..4], square.points());
    }

    #[test]
    fn test_sweep_drops_unused_points() {
        let mesh = Mesh::new(
            vec![
                Point2::new(0.0, 0.0),
                Point2::new(5.0, 5.0),
                Point2::new(1.0, 0.0),
            ],
            vec![0, 2],
            CellType::Line,
        )
        .unwrap();
        let swept = mesh.sweep(3);
        assert_eq!(swept.npoints(), 2);
        assert_eq!(swept.connectivity(), &[0, 1]);
    }

    #[test]
    fn test_zero_points_without_cells() {
        let mut mesh = Mesh::new(
            vec![
                Point2::new(3.0, 4.0),
                Point2::new(1.0, 1.0),
                Point2::new(2.0, 1.0),
            ],
            vec![1, 2],
            CellType::Line,
        )
        .unwrap();

        assert_eq!(mesh.points_without_cells(), vec![0]);
        assert_eq!(mesh.zero_points_without_cells(), 1);
        assert_eq!(mesh.points()[0], Point2::origin());
        assert_eq!(mesh.points()[1], Point2::new(1.0, 1.0));
    }

    #[test]
    fn test_apply_displacement() {
        let mut mesh = unit_square();
        let u = vec![Vector2::new(0.5, -1.0); 4];
        mesh.apply_displacement(&u).unwrap();
        assert_relative_eq!(mesh.points()[2].x, 1.5);
        assert_relative_eq!(mesh.points()[2].y, 0.0);

        assert!(mesh.apply_displacement(&u[..3]).is_err());
    }

    #[test]
    fn test_bounding_box_and_centroid() {
        let mesh = unit_square();
        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!(min, Point2::new(0.0, 0.0));
        assert_eq!(max, Point2::new(1.0, 1.0));
        assert_relative_eq!(mesh.cell_centroid(0).x, 0.5);
        assert_eq!(mesh.cell_centroids(), vec![mesh.cell_centroid(0)]);
        assert!(bounding_box(std::iter::empty::<&Point2<f64>>()).is_none());
    }
}
