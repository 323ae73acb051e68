use std::ops::{Add, Mul};

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::{Matrix2, Point2, SymmetricEigen, Vector2};
use tracing::{debug, warn};

use crate::{
    error::{FiberMeshError, Result},
    fibers::FiberFamily,
    mesh::{CellType, Mesh},
};

/// Cell centroids of the source mesh. Structured meshes place whole rows of
/// centroids on one coordinate line, which the immutable tree accepts at
/// any count.
type CellTree = ImmutableKdTree<f64, 2>;

/// A value that can be interpolated: scalars, vectors and tensors
pub trait FieldValue: Copy + Add<Output = Self> + Mul<f64, Output = Self> {
    fn zero() -> Self;
}

impl FieldValue for f64 {
    fn zero() -> Self {
        0.0
    }
}

impl FieldValue for Vector2<f64> {
    fn zero() -> Self {
        Vector2::zeros()
    }
}

impl FieldValue for Matrix2<f64> {
    fn zero() -> Self {
        Matrix2::zeros()
    }
}

/// What to do with target points that no source cell contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Take the value of the nearest node of the closest cells
    #[default]
    Nearest,
    /// Fail with an interpolation error
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferOptions {
    pub fallback: Fallback,
    /// Barycentric coordinates down to `-tolerance` still count as inside
    pub tolerance: f64,
    /// Number of closest cells searched for a containing cell
    pub candidates: usize,
}

impl Default for TransferOptions {
    fn default() -> TransferOptions {
        TransferOptions {
            fallback: Fallback::Nearest,
            tolerance: 1e-9,
            candidates: 8,
        }
    }
}

/// Where a target point landed in the source mesh
#[derive(Debug, Clone, Copy, PartialEq)]
enum Location {
    /// Inside a triangle, given by node indices and barycentric weights
    Inside([usize; 3], [f64; 3]),
    /// Outside every candidate, snapped to a source node
    Nearest(usize),
}

/// Barycentric coordinates of `p` in the triangle `a, b, c`. `None` for a
/// degenerate triangle.
fn barycentric(
    p: &Point2<f64>,
    a: &Point2<f64>,
    b: &Point2<f64>,
    c: &Point2<f64>,
) -> Option<[f64; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;

    let denom = v0.x * v1.y - v1.x * v0.y;
    if denom.abs() < f64::EPSILON * (v0.norm_squared() + v1.norm_squared()) {
        return None;
    }

    let lb = (v2.x * v1.y - v1.x * v2.y) / denom;
    let lc = (v0.x * v2.y - v2.x * v0.y) / denom;
    Some([1.0 - lb - lc, lb, lc])
}

/// Piecewise linear interpolation from the points of a quad mesh. Each quad
/// is split into two triangles along its first diagonal.
pub struct Interpolator<'a> {
    source: &'a Mesh,
    tree: CellTree,
    options: TransferOptions,
}

impl<'a> Interpolator<'a> {
    /// Indexes the cells of the source mesh
    ///
    /// # Arguments
    /// * `source` - A quad mesh carrying the source values
    /// * `options` - Fallback strategy and search settings
    pub fn new(source: &'a Mesh, options: TransferOptions) -> Result<Interpolator<'a>> {
        if source.cell_type() != CellType::Quad {
            return Err(FiberMeshError::Interpolation(format!(
                "source mesh must have quad cells, got {:?}",
                source.cell_type()
            )));
        }
        if source.ncells() == 0 {
            return Err(FiberMeshError::Interpolation(
                "source mesh has no cells".to_owned(),
            ));
        }
        if options.candidates == 0 {
            return Err(FiberMeshError::Configuration(
                "at least one candidate cell must be searched".to_owned(),
            ));
        }

        let centroids: Vec<[f64; 2]> = source
            .cell_centroids()
            .iter()
            .map(|c| [c.x, c.y])
            .collect();
        let tree = CellTree::new_from_slice(&centroids);

        Ok(Interpolator {
            source,
            tree,
            options,
        })
    }

    fn locate(&self, p: &Point2<f64>) -> Option<Location> {
        let points = self.source.points();
        let neighbours = self
            .tree
            .nearest_n::<SquaredEuclidean>(&[p.x, p.y], self.options.candidates);

        for neighbour in &neighbours {
            let cell = self.source.cell(neighbour.item as usize);
            for triangle in [[cell[0], cell[1], cell[2]], [cell[0], cell[2], cell[3]]] {
                let [a, b, c] = triangle.map(|i| &points[i]);
                if let Some(weights) = barycentric(p, a, b, c) {
                    if weights.iter().all(|&w| w >= -self.options.tolerance) {
                        return Some(Location::Inside(triangle, weights));
                    }
                }
            }
        }

        if self.options.fallback == Fallback::None {
            return None;
        }

        neighbours
            .iter()
            .flat_map(|n| self.source.cell(n.item as usize).iter().copied())
            .map(|i| (i, (points[i] - p).norm_squared()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| Location::Nearest(i))
    }

    /// Evaluates point values of the source mesh at the masked target points.
    /// Masked-out points get zero.
    ///
    /// # Arguments
    /// * `values` - One value per source point
    /// * `target` - The mesh to interpolate onto
    /// * `mask` - One flag per target point, false for placeholder points
    pub fn interpolate<V: FieldValue>(
        &self,
        values: &[V],
        target: &Mesh,
        mask: &[bool],
    ) -> Result<Vec<V>> {
        if values.len() != self.source.npoints() {
            return Err(FiberMeshError::Interpolation(format!(
                "got {} source values for {} source points",
                values.len(),
                self.source.npoints()
            )));
        }
        if mask.len() != target.npoints() {
            return Err(FiberMeshError::Interpolation(format!(
                "mask has {} entries for {} target points",
                mask.len(),
                target.npoints()
            )));
        }

        let mut result = vec![V::zero(); target.npoints()];
        let mut snapped: usize = 0;
        let mut unresolved: usize = 0;

        for (i, p) in target.points().iter().enumerate() {
            if !mask[i] {
                continue;
            }
            match self.locate(p) {
                Some(Location::Inside(nodes, weights)) => {
                    result[i] = values[nodes[0]] * weights[0]
                        + values[nodes[1]] * weights[1]
                        + values[nodes[2]] * weights[2];
                }
                Some(Location::Nearest(node)) => {
                    result[i] = values[node];
                    snapped += 1;
                }
                None => unresolved += 1,
            }
        }

        if unresolved > 0 {
            return Err(FiberMeshError::Interpolation(format!(
                "{unresolved} target points lie outside the source mesh"
            )));
        }
        if snapped > 0 {
            warn!("{snapped} target points outside the source mesh took the nearest value");
        }
        debug!(
            "interpolated onto {} of {} target points",
            mask.iter().filter(|&&m| m).count(),
            target.npoints()
        );

        Ok(result)
    }
}

/// Interpolates point values from `source` onto the masked points of
/// `target`. Masked-out points get zero.
pub fn interpolate<V: FieldValue>(
    source: &Mesh,
    values: &[V],
    target: &Mesh,
    mask: &[bool],
    options: &TransferOptions,
) -> Result<Vec<V>> {
    Interpolator::new(source, *options)?.interpolate(values, target, mask)
}

/// Projects cell values to the points by averaging over the adjacent cells,
/// weighted by cell area. Points without cells get zero.
pub fn project_to_points<V: FieldValue>(mesh: &Mesh, cell_values: &[V]) -> Result<Vec<V>> {
    if cell_values.len() != mesh.ncells() {
        return Err(FiberMeshError::Interpolation(format!(
            "got {} cell values for {} cells",
            cell_values.len(),
            mesh.ncells()
        )));
    }

    let mut sums = vec![V::zero(); mesh.npoints()];
    let mut weights = vec![0.0; mesh.npoints()];

    for (c, cell) in mesh.cells().enumerate() {
        let weight = match mesh.cell_type() {
            CellType::Quad => mesh.cell_area(c).abs(),
            CellType::Line => 1.0,
        };
        for &i in cell {
            sums[i] = sums[i] + cell_values[c] * weight;
            weights[i] += weight;
        }
    }

    Ok(sums
        .into_iter()
        .zip(weights)
        .map(|(sum, weight)| {
            if weight > 0.0 {
                sum * (1.0 / weight)
            } else {
                V::zero()
            }
        })
        .collect())
}

/// Computes the fiber normal force per undeformed fiber area from cell
/// stresses and projects it to the mesh points.
///
/// The cell force is `stress * thickness / fiber_area . direction`.
///
/// # Arguments
/// * `mesh` - The solid mesh the stresses belong to
/// * `cell_stress` - One stress tensor per cell
/// * `thickness` - Thickness of the rubber sheet
/// * `fiber_area` - Cross-section area of one fiber
/// * `direction` - Unit direction of the fiber family, undeformed
pub fn project_cell_field_to_points(
    mesh: &Mesh,
    cell_stress: &[Matrix2<f64>],
    thickness: f64,
    fiber_area: f64,
    direction: &Vector2<f64>,
) -> Result<Vec<Vector2<f64>>> {
    if !(thickness > 0.0 && fiber_area > 0.0) {
        return Err(FiberMeshError::Configuration(format!(
            "thickness and fiber area must be positive, got {thickness} and {fiber_area}"
        )));
    }

    let factor = thickness / fiber_area;
    let cell_force: Vec<Vector2<f64>> = cell_stress
        .iter()
        .map(|stress| (stress * factor) * direction)
        .collect();

    project_to_points(mesh, &cell_force)
}

/// Hencky strain `ln(U) = 0.5 ln(F^T F)` of a deformation gradient
pub fn logarithmic_strain(deformation_gradient: &Matrix2<f64>) -> Result<Matrix2<f64>> {
    let right_cauchy_green = deformation_gradient.transpose() * deformation_gradient;
    let eigen = SymmetricEigen::new(right_cauchy_green);

    if eigen.eigenvalues.iter().any(|&l| l <= 0.0) {
        return Err(FiberMeshError::Geometry(
            "deformation gradient is singular".to_owned(),
        ));
    }

    let log_stretch = eigen.eigenvalues.map(|l| 0.5 * l.ln());
    Ok(eigen.eigenvectors * Matrix2::from_diagonal(&log_stretch) * eigen.eigenvectors.transpose())
}

/// Results handed back by an external solver for the solid specimen
pub trait SolidField {
    fn mesh(&self) -> &Mesh;
    /// One displacement per point of the solid mesh
    fn displacement(&self) -> &[Vector2<f64>];
    /// Cell averaged stress of the material the fiber family belongs to
    fn cell_stress(&self) -> &[Matrix2<f64>];
    /// Cell averaged deformation gradients, if the solver reports them
    fn cell_deformation_gradient(&self) -> Option<&[Matrix2<f64>]> {
        None
    }
}

/// Displacement and normal force on the points of a fiber family
#[derive(Debug, Clone, PartialEq)]
pub struct FiberResults {
    pub displacement: Vec<Vector2<f64>>,
    pub force: Vec<Vector2<f64>>,
    /// Logarithmic strain along the undeformed fiber direction. Only
    /// available when the solid reports deformation gradients.
    pub strain: Option<Vec<f64>>,
}

/// Logarithmic strain of every cell along `direction`, projected to the points
fn fiber_strain(
    mesh: &Mesh,
    gradients: &[Matrix2<f64>],
    direction: &Vector2<f64>,
) -> Result<Vec<f64>> {
    let cell_strain = gradients
        .iter()
        .map(|f| logarithmic_strain(f).map(|e| direction.dot(&(e * direction))))
        .collect::<Result<Vec<f64>>>()?;
    project_to_points(mesh, &cell_strain)
}

/// Moves solver results onto a fiber family
///
/// # Arguments
/// * `solid` - The solver results of the specimen
/// * `family` - The fiber family to report on
/// * `thickness` - Thickness of the rubber sheet
/// * `fiber_area` - Cross-section area of one fiber
/// * `direction` - Unit direction of the fiber family, undeformed
/// * `options` - Interpolation settings
pub fn transfer_to_fibers(
    solid: &impl SolidField,
    family: &FiberFamily,
    thickness: f64,
    fiber_area: f64,
    direction: &Vector2<f64>,
    options: &TransferOptions,
) -> Result<FiberResults> {
    let mesh = solid.mesh();
    let force =
        project_cell_field_to_points(mesh, solid.cell_stress(), thickness, fiber_area, direction)?;

    let interpolator = Interpolator::new(mesh, *options)?;
    let strain = match solid.cell_deformation_gradient() {
        Some(gradients) => {
            let strain = fiber_strain(mesh, gradients, direction)?;
            Some(interpolator.interpolate(&strain, family.mesh(), family.mask())?)
        }
        None => None,
    };

    Ok(FiberResults {
        displacement: interpolator.interpolate(solid.displacement(), family.mesh(), family.mask())?,
        force: interpolator.interpolate(&force, family.mesh(), family.mask())?,
        strain,
    })
}

/// Change of the fiber force between two load increments of one family,
/// as a magnitude per point
pub fn force_range(later: &FiberResults, earlier: &FiberResults) -> Result<Vec<f64>> {
    if later.force.len() != earlier.force.len() {
        return Err(FiberMeshError::Interpolation(format!(
            "cannot compare forces on {} and {} points",
            later.force.len(),
            earlier.force.len()
        )));
    }

    Ok(later
        .force
        .iter()
        .zip(&earlier.force)
        .map(|(a, b)| (a - b).norm())
        .collect())
}

/// Point-wise maximum of two force ranges, e.g. of both fiber families
pub fn max_force_range(first: &[f64], second: &[f64]) -> Result<Vec<f64>> {
    if first.len() != second.len() {
        return Err(FiberMeshError::Interpolation(format!(
            "cannot combine force ranges of {} and {} points",
            first.len(),
            second.len()
        )));
    }

    Ok(first.iter().zip(second).map(|(a, b)| a.max(*b)).collect())
}
