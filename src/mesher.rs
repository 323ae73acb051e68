use nalgebra::Point2;
use tracing::{debug, info};

use crate::{
    datatypes::{MeshDensity, ShapeParameters},
    error::{FiberMeshError, Result},
    mesh::{CellType, Mesh, Mirror},
};

/// Band heights below this fraction of the specimen height are treated as
/// empty
const BAND_TOLERANCE: f64 = 1e-9;

/// Largest widest half-width accepted, as a multiple of the larger of width
/// and height. Shoulder angles close to 0° push the tangent band towards the
/// horizontal and the outline grows without practical bound.
pub const MAX_OUTLINE_RATIO: f64 = 10.0;

/// Closed-form maximum half-width of the specimen outline as a function of
/// the vertical coordinate.
///
/// The outline has three bands, measured from the mid-plane: a flat band, a
/// circular shoulder tangent to it and a straight continuation of the
/// shoulder's tangent. The function is symmetric in `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitFunction {
    flat_half_width: f64,
    flat_half_height: f64,
    shoulder_width: f64,
    shoulder_height: f64,
    radius: f64,
    alpha: f64,
}

impl LimitFunction {
    /// Derives the outline from the shape parameters
    pub fn new(shape: &ShapeParameters) -> Result<LimitFunction> {
        shape.validate()?;

        let alpha = shape.alpha();
        let flat_half_width = shape.width / 2.0;
        let limit = LimitFunction {
            flat_half_width,
            flat_half_height: shape.middle / 2.0,
            shoulder_width: flat_half_width + shape.radius * (1.0 - alpha.cos()),
            shoulder_height: shape.radius * alpha.sin(),
            radius: shape.radius,
            alpha,
        };

        let widest = limit.evaluate(shape.height / 2.0);
        if !widest.is_finite() {
            return Err(FiberMeshError::Geometry(format!(
                "angle {} produces an unbounded outline",
                shape.angle
            )));
        }
        let bound = MAX_OUTLINE_RATIO * shape.width.max(shape.height);
        if widest > bound {
            return Err(FiberMeshError::Geometry(format!(
                "angle {} widens the outline to {widest:.1}, more than {bound}",
                shape.angle
            )));
        }

        Ok(limit)
    }

    /// Maximum half-width at the vertical coordinate `y`
    pub fn evaluate(&self, y: f64) -> f64 {
        let distance = y.abs();

        if distance <= self.flat_half_height {
            self.flat_half_width
        } else if distance <= self.shoulder_end() {
            let s = distance - self.flat_half_height;
            let root = (self.radius.powi(2) - s.powi(2)).max(0.0).sqrt();
            self.shoulder_width + self.radius * self.alpha.cos() - root
        } else {
            self.shoulder_width + self.alpha.tan() * (distance - self.shoulder_end())
        }
    }

    pub fn evaluate_all(&self, ys: &[f64]) -> Vec<f64> {
        ys.iter().map(|&y| self.evaluate(y)).collect()
    }

    /// Half-height of the flat middle band
    pub fn flat_half_height(&self) -> f64 {
        self.flat_half_height
    }

    /// Distance from the mid-plane where the shoulder meets the tangent band
    pub fn shoulder_end(&self) -> f64 {
        self.flat_half_height + self.shoulder_height
    }

    /// Half-width where the tangent band starts
    pub fn shoulder_width(&self) -> f64 {
        self.shoulder_width
    }

    /// Slope of the tangent band, `dx/dy`
    pub fn tangent_slope(&self) -> f64 {
        self.alpha.tan()
    }
}

/// Creates a structured quad grid on `[0, length] x [0, height]`.
///
/// Points are ordered row by row with `x` running fastest, cells are
/// counter-clockwise.
fn rectangle(length: f64, height: f64, nx: usize, ny: usize) -> Result<Mesh> {
    let mut points: Vec<Point2<f64>> = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            points.push(Point2::new(
                length * i as f64 / nx as f64,
                height * j as f64 / ny as f64,
            ));
        }
    }

    let row = nx + 1;
    let mut cells: Vec<usize> = Vec::with_capacity(4 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let a = j * row + i;
            cells.extend_from_slice(&[a, a + 1, a + 1 + row, a + row]);
        }
    }

    Mesh::new(points, cells, CellType::Quad)
}

/// Scales every x-coordinate by a factor of the point's own y-coordinate,
/// then shifts the grid up by `offset`
fn warp(mesh: &mut Mesh, offset: f64, factor: impl Fn(f64) -> f64) {
    for point in mesh.points_mut() {
        point.x *= factor(point.y);
        point.y += offset;
    }
}

/// Builds the upper right quarter of the specimen from up to three stacked
/// bands, bottom to top. Empty bands are skipped. All bands share one column
/// count so their seams coincide.
fn build_quarter(
    shape: &ShapeParameters,
    density: &MeshDensity,
    limit: &LimitFunction,
) -> Result<Mesh> {
    let radius = shape.radius;
    let alpha = shape.alpha();

    let flat_half_width = limit.flat_half_width;
    let flat_half_height = limit.flat_half_height;
    let shoulder_width = limit.shoulder_width;
    let shoulder_height = limit.shoulder_height;
    let upper_height = shape.height / 2.0 - flat_half_height - shoulder_height;

    let tolerance = BAND_TOLERANCE * shape.height;
    if upper_height < -tolerance {
        return Err(FiberMeshError::Geometry(format!(
            "height {} is too small for a middle band of {} and a shoulder of height {:.3}",
            shape.height, shape.middle, shoulder_height
        )));
    }

    let nx = density.subdivisions(shoulder_width);
    let mut bands: Vec<Mesh> = Vec::with_capacity(3);

    // flat band
    if flat_half_height > tolerance {
        bands.push(rectangle(
            flat_half_width,
            flat_half_height,
            nx,
            density.subdivisions(flat_half_height),
        )?);
    }

    // circular shoulder
    if shoulder_height > tolerance {
        let mut shoulder = rectangle(
            shoulder_width,
            shoulder_height,
            nx,
            density.subdivisions(shoulder_height),
        )?;
        warp(&mut shoulder, flat_half_height, |y| {
            let root = (radius.powi(2) - y.powi(2)).max(0.0).sqrt();
            1.0 + radius * alpha.cos() / shoulder_width - root / shoulder_width
        });
        bands.push(shoulder);
    }

    // tangent continuation
    if upper_height > tolerance {
        let mut upper = rectangle(
            shoulder_width,
            upper_height,
            nx,
            density.subdivisions(upper_height),
        )?;
        warp(&mut upper, flat_half_height + shoulder_height, |y| {
            1.0 + alpha.tan() * y / shoulder_width
        });
        bands.push(upper);
    }

    debug!(
        "quarter specimen has {} bands with {} columns",
        bands.len(),
        nx
    );

    let bands: Vec<&Mesh> = bands.iter().collect();
    Mesh::concatenate(&bands)
}

/// Mirrors the quarter into the full outline without merging the seams
fn assemble_mirrored(quarter: &Mesh) -> Result<Mesh> {
    let top = Mesh::concatenate(&[quarter, &quarter.mirror(Mirror::Vertical)])?;
    Mesh::concatenate(&[&top, &top.mirror(Mirror::Horizontal)])
}

/// Builds the quad mesh of the dumbbell specimen together with its limit
/// function
///
/// # Arguments
/// * `shape` - The outline of the specimen
/// * `density` - Subdivisions per length and the merge tolerance
///
/// # Returns
/// A tuple of the merged mesh and the limit function, in that order
pub fn build_specimen(
    shape: &ShapeParameters,
    density: &MeshDensity,
) -> Result<(Mesh, LimitFunction)> {
    density.validate()?;
    let limit = LimitFunction::new(shape)?;

    let quarter = build_quarter(shape, density, &limit)?;
    let mesh = assemble_mirrored(&quarter)?.sweep(density.merge_decimals);

    info!(
        "built specimen mesh with {} points and {} cells",
        mesh.npoints(),
        mesh.ncells()
    );

    Ok((mesh, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::collections::HashSet;

    fn default_specimen() -> (Mesh, LimitFunction) {
        build_specimen(&ShapeParameters::default(), &MeshDensity::default()).unwrap()
    }

    /// Area under the outline, integrated in closed form over the full specimen
    fn analytic_area(shape: &ShapeParameters, limit: &LimitFunction) -> f64 {
        let r = shape.radius;
        let h1 = limit.shoulder_height;
        let h3 = limit.flat_half_height;
        let h2 = shape.height / 2.0 - h1 - h3;

        let flat = limit.flat_half_width * h3;
        let circle_segment = 0.5 * h1 * (r * r - h1 * h1).sqrt() + 0.5 * r * r * (h1 / r).asin();
        let shoulder = (limit.shoulder_width + r * limit.alpha.cos()) * h1 - circle_segment;
        let upper = limit.shoulder_width * h2 + 0.5 * limit.tangent_slope() * h2 * h2;

        4.0 * (flat + shoulder + upper)
    }

    #[test]
    fn test_limit_round_trip_values() {
        let (_, limit) = default_specimen();

        assert_relative_eq!(limit.evaluate(0.0), 25.0);

        let alpha = 30f64.to_radians();
        let shoulder_width = 25.0 + 20.0 * (1.0 - alpha.cos());
        let expected = shoulder_width + alpha.tan() * (25.0 - 10.0 - 2.5);
        assert_relative_eq!(limit.evaluate(25.0), expected, epsilon = 1e-12);
        assert_relative_eq!(limit.evaluate(25.0), 34.8963, epsilon = 1e-4);
    }

    #[test]
    fn test_limit_is_continuous_and_symmetric() {
        for angle in [30.0, 90.0, 120.0, 170.0] {
            let shape = ShapeParameters {
                angle,
                height: 200.0,
                ..ShapeParameters::default()
            };
            let limit = LimitFunction::new(&shape).unwrap();

            for boundary in [limit.flat_half_height(), limit.shoulder_end()] {
                assert_abs_diff_eq!(
                    limit.evaluate(boundary - 1e-9),
                    limit.evaluate(boundary + 1e-9),
                    epsilon = 1e-6
                );
            }
            for y in [0.0, 1.0, 2.5, 7.3, 12.5, 40.0] {
                assert_eq!(limit.evaluate(y), limit.evaluate(-y));
            }
        }
    }

    #[test]
    fn test_limit_is_non_decreasing() {
        let (_, limit) = default_specimen();
        let ys: Vec<f64> = (0..=500).map(|i| i as f64 * 0.05).collect();
        let values = limit.evaluate_all(&ys);
        for pair in values.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-12);
        }
    }

    #[test]
    fn test_rectangle_layout() {
        let grid = rectangle(2.0, 1.0, 2, 1).unwrap();
        assert_eq!(grid.npoints(), 6);
        assert_eq!(grid.ncells(), 2);
        assert_eq!(grid.cell(0), &[0, 1, 4, 3]);
        assert_eq!(grid.cell(1), &[1, 2, 5, 4]);
        assert_relative_eq!(grid.area(), 2.0);
    }

    #[test]
    fn test_mesh_outline_matches_limit() {
        let (mesh, limit) = default_specimen();

        // no point lies outside the outline
        for p in mesh.points() {
            assert!(p.x.abs() <= limit.evaluate(p.y) + 1e-9, "{p:?} is outside");
        }

        // the outermost point of every row sits on the outline
        let mut rows: Vec<(f64, f64)> = Vec::new();
        for p in mesh.points() {
            match rows.iter_mut().find(|(y, _)| (y - p.y).abs() < 1e-6) {
                Some(row) => row.1 = row.1.max(p.x.abs()),
                None => rows.push((p.y, p.x.abs())),
            }
        }
        assert!(rows.len() > 10);
        for (y, x_max) in rows {
            assert_abs_diff_eq!(x_max, limit.evaluate(y), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_mesh_is_symmetric_and_bounded() {
        let shape = ShapeParameters::default();
        let (mesh, limit) = default_specimen();
        let (min, max) = mesh.bounding_box().unwrap();

        assert_abs_diff_eq!(min.y, -25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.y, 25.0, epsilon = 1e-9);
        assert_abs_diff_eq!(max.x, limit.evaluate(shape.height / 2.0), epsilon = 1e-9);
        assert_abs_diff_eq!(min.x, -max.x, epsilon = 1e-12);
    }

    #[test]
    fn test_merge_keeps_area_and_removes_duplicates() {
        let shape = ShapeParameters::default();
        let density = MeshDensity::default();
        let limit = LimitFunction::new(&shape).unwrap();
        let quarter = build_quarter(&shape, &density, &limit).unwrap();
        let unmerged = assemble_mirrored(&quarter).unwrap();
        let merged = unmerged.sweep(density.merge_decimals);

        assert_eq!(unmerged.npoints(), 4 * quarter.npoints());
        assert!(merged.npoints() < unmerged.npoints());
        assert_eq!(merged.ncells(), unmerged.ncells());
        assert_relative_eq!(merged.area(), unmerged.area(), max_relative = 1e-12);
        assert_relative_eq!(merged.area(), 4.0 * quarter.area(), max_relative = 1e-12);

        let keys: HashSet<(i64, i64)> = merged
            .points()
            .iter()
            .map(|p| ((p.x * 1e3).round() as i64, (p.y * 1e3).round() as i64))
            .collect();
        assert_eq!(keys.len(), merged.npoints());
    }

    #[test]
    fn test_mesh_area_approximates_outline() {
        let shape = ShapeParameters::default();
        let (mesh, limit) = default_specimen();
        assert_relative_eq!(
            mesh.area(),
            analytic_area(&shape, &limit),
            max_relative = 1e-2
        );
        for i in 0..mesh.ncells() {
            assert!(mesh.cell_area(i) > 0.0);
        }
    }

    #[test]
    fn test_band_seams_are_shared() {
        // every interior point is shared by four cells on a conforming grid
        let (mesh, _) = default_specimen();
        let mut valence = vec![0usize; mesh.npoints()];
        for cell in mesh.cells() {
            for &i in cell {
                valence[i] += 1;
            }
        }
        assert!(valence.iter().all(|&v| (1..=4).contains(&v)));

        let y_seam = 2.5;
        let seam_points = mesh
            .points()
            .iter()
            .enumerate()
            .filter(|(_, p)| (p.y - y_seam).abs() < 1e-9 && p.x.abs() < 24.0);
        for (i, _) in seam_points {
            assert_eq!(valence[i], 4);
        }
    }

    #[test]
    fn test_zero_radius_and_middle() {
        let shape = ShapeParameters {
            radius: 0.0,
            ..ShapeParameters::default()
        };
        let (mesh, limit) = build_specimen(&shape, &MeshDensity::default()).unwrap();
        assert!(mesh.ncells() > 0);
        assert_relative_eq!(limit.evaluate(2.5), 25.0);
        assert_abs_diff_eq!(limit.shoulder_end(), 2.5);

        let shape = ShapeParameters {
            middle: 0.0,
            ..ShapeParameters::default()
        };
        let (mesh, limit) = build_specimen(&shape, &MeshDensity::default()).unwrap();
        assert!(mesh.ncells() > 0);
        assert_relative_eq!(limit.evaluate(0.0), 25.0);
        assert_relative_eq!(mesh.area(), analytic_area(&shape, &limit), max_relative = 1e-2);
    }

    #[test]
    fn test_coarse_density_still_meshes_every_band() {
        let density = MeshDensity {
            elements_per_length: 0.01,
            ..MeshDensity::default()
        };
        let (mesh, _) = build_specimen(&ShapeParameters::default(), &density).unwrap();
        // one column and one row per band, three bands, four quarters
        assert_eq!(mesh.ncells(), 12);
    }

    #[test]
    fn test_invalid_shapes() {
        let bad_angle = ShapeParameters {
            angle: 180.0,
            ..ShapeParameters::default()
        };
        assert!(matches!(
            build_specimen(&bad_angle, &MeshDensity::default()),
            Err(FiberMeshError::Geometry(_))
        ));

        let too_short = ShapeParameters {
            height: 10.0,
            ..ShapeParameters::default()
        };
        assert!(matches!(
            build_specimen(&too_short, &MeshDensity::default()),
            Err(FiberMeshError::Geometry(_))
        ));
    }

    #[test]
    fn test_near_flat_shoulder_angles_are_bounded() {
        let needle = ShapeParameters {
            angle: 0.001,
            ..ShapeParameters::default()
        };
        assert!(matches!(
            LimitFunction::new(&needle),
            Err(FiberMeshError::Geometry(_))
        ));
        assert!(matches!(
            build_specimen(&needle, &MeshDensity::default()),
            Err(FiberMeshError::Geometry(_))
        ));

        // steep but still bounded
        let steep = ShapeParameters {
            angle: 1.0,
            ..ShapeParameters::default()
        };
        let limit = LimitFunction::new(&steep).unwrap();
        assert!(limit.evaluate(25.0) <= MAX_OUTLINE_RATIO * 50.0);
    }
}
