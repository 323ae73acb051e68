use nalgebra::{Point2, Rotation2};
use tracing::{debug, info};

use crate::{
    datatypes::{FiberAxis, FiberParameters, SpecimenConfig},
    error::{FiberMeshError, Result},
    mesh::{self, CellType, Mesh},
    mesher::{self, LimitFunction},
};

/// One family of parallel fibers clipped to the specimen.
///
/// `mask` runs parallel to the mesh points. Points outside the outline stay
/// in the point array as placeholders with a `false` slot; no cell
/// references them.
#[derive(Debug, Clone, PartialEq)]
pub struct FiberFamily {
    mesh: Mesh,
    mask: Vec<bool>,
}

impl FiberFamily {
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Mutable access to the line mesh, e.g. to add a displacement field
    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Number of points inside the clipped outline
    pub fn nvalid(&self) -> usize {
        self.mask.iter().filter(|&&valid| valid).count()
    }

    pub fn valid_points(&self) -> impl Iterator<Item = (usize, &Point2<f64>)> + '_ {
        self.mesh
            .points()
            .iter()
            .enumerate()
            .filter(|(i, _)| self.mask[*i])
    }

    /// Bounds of the valid points, `None` if the family has none
    pub fn valid_bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        mesh::bounding_box(self.valid_points().map(|(_, p)| p))
    }

    /// Moves points that no surviving cell references to the origin and
    /// clears their mask slot. Returns the number of points moved.
    pub fn zero_points_without_cells(&mut self) -> usize {
        for i in self.mesh.points_without_cells() {
            self.mask[i] = false;
        }
        self.mesh.zero_points_without_cells()
    }
}

/// Upper limit on the number of points in one unclipped fiber grid
pub const MAX_GRID_POINTS: usize = 20_000_000;

/// Creates the unclipped, unrotated fiber grid centered at the origin.
///
/// Fibers run along `x` with `points_per_fiber` points over `length`. Rows
/// are `spacing` apart and cover at least `span` along `y`. Consecutive
/// points of one row are joined by line cells, rows are never chained.
fn fiber_grid(length: f64, span: f64, params: &FiberParameters) -> Result<Mesh> {
    let n = params.points_per_fiber;
    // float to int casts saturate
    let rows = ((span / params.spacing).ceil() as usize).saturating_add(1);
    let npoints = rows
        .checked_mul(n)
        .filter(|&count| count <= MAX_GRID_POINTS)
        .ok_or_else(|| {
            FiberMeshError::Configuration(format!(
                "{rows} fibers of {n} points exceed the grid limit of {MAX_GRID_POINTS} points"
            ))
        })?;
    let row_offset = (rows - 1) as f64 * params.spacing / 2.0;

    let mut points: Vec<Point2<f64>> = Vec::with_capacity(npoints);
    for row in 0..rows {
        let y = row as f64 * params.spacing - row_offset;
        for i in 0..n {
            let x = length * i as f64 / (n - 1) as f64 - length / 2.0;
            points.push(Point2::new(x, y));
        }
    }

    let mut cells: Vec<usize> = Vec::with_capacity(2 * rows * (n - 1));
    for row in 0..rows {
        let start = row * n;
        for i in start..start + n - 1 {
            cells.extend_from_slice(&[i, i + 1]);
        }
    }

    Mesh::new(points, cells, CellType::Line)
}

/// Builds a fiber family rotated to `reference angle + params.angle` and
/// clipped against the specimen outline
///
/// # Arguments
/// * `limit` - The limit function of the specimen
/// * `width` - The nominal width of the specimen
/// * `height` - The total height of the specimen
/// * `params` - Orientation, spacing and resolution of the fibers
///
/// # Returns
/// The line mesh holding every generated point, and a mask of the points that
/// lie inside the specimen
pub fn build_fiber_family(
    limit: &LimitFunction,
    width: f64,
    height: f64,
    params: &FiberParameters,
) -> Result<FiberFamily> {
    params.validate()?;
    if !(width > 0.0 && height > 0.0) {
        return Err(FiberMeshError::Geometry(format!(
            "fiber families need a positive specimen size, got {width} x {height}"
        )));
    }

    // the grid is twice the specimen's extent in both directions
    let half_height = height / 2.0;
    let overall_width = width.max(2.0 * limit.evaluate(half_height));
    let (length, span) = match params.axis {
        FiberAxis::X => (2.0 * overall_width, 2.0 * height),
        FiberAxis::Y => (2.0 * height, 2.0 * overall_width),
    };

    let grid = fiber_grid(length, span, params)?;

    let rotation = Rotation2::new((params.axis.reference_angle() + params.angle).to_radians());
    let points: Vec<Point2<f64>> = grid.points().iter().map(|&p| rotation * p).collect();

    let mask: Vec<bool> = points
        .iter()
        .map(|p| p.x.abs() <= limit.evaluate(p.y) && p.y.abs() <= half_height)
        .collect();

    let cells: Vec<usize> = grid
        .cells()
        .filter(|cell| cell.iter().all(|&i| mask[i]))
        .flatten()
        .copied()
        .collect();

    let mesh = Mesh::new(points, cells, CellType::Line)?;

    debug!(
        "fiber grid {:.1} x {:.1} with {} points",
        length,
        span,
        grid.npoints()
    );
    info!(
        "fiber family at {}° kept {} of {} line cells",
        params.angle,
        mesh.ncells(),
        grid.ncells()
    );

    Ok(FiberFamily { mesh, mask })
}

/// The solid specimen and both fiber families
#[derive(Debug, Clone)]
pub struct TestSpecimen {
    pub solid: Mesh,
    pub limit: LimitFunction,
    /// Families at `-angle` and `+angle`, in that order
    pub fibers: [FiberFamily; 2],
}

/// Builds the solid mesh and two crossed fiber families. Fiber points without
/// a surviving cell are moved to the origin and masked out.
///
/// # Arguments
/// * `config` - Shape, mesh density and fiber layout
pub fn build_test_specimen(config: &SpecimenConfig) -> Result<TestSpecimen> {
    let shape = &config.shape;
    let (solid, limit) = mesher::build_specimen(shape, &config.density)?;

    let build_family = |sign: f64| -> Result<FiberFamily> {
        let params = FiberParameters {
            angle: sign * config.fibers.angle,
            ..config.fibers
        };
        let mut family = build_fiber_family(&limit, shape.width, shape.height, &params)?;
        let moved = family.zero_points_without_cells();
        debug!("moved {moved} fiber points without cells to the origin");
        Ok(family)
    };
    let fibers = [build_family(-1.0)?, build_family(1.0)?];

    Ok(TestSpecimen {
        solid,
        limit,
        fibers,
    })
}
