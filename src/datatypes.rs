use crate::error::{FiberMeshError, Result};

/// Shape of the dumbbell test specimen. Lengths share one unit (mm in
/// practice), the shoulder angle is given in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParameters {
    /// Width of the flat middle band
    pub width: f64,
    /// Total height of the specimen
    pub height: f64,
    /// Height of the flat middle band
    pub middle: f64,
    /// Radius of the circular shoulder
    pub radius: f64,
    /// Included angle of the shoulder, strictly between 0 and 180 degrees
    pub angle: f64,
}

impl Default for ShapeParameters {
    fn default() -> ShapeParameters {
        ShapeParameters {
            width: 50.0,
            height: 50.0,
            middle: 5.0,
            radius: 20.0,
            angle: 120.0,
        }
    }
}

impl ShapeParameters {
    /// Checks that the parameters describe a physical outline
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("width", self.width),
            ("height", self.height),
            ("middle", self.middle),
            ("radius", self.radius),
            ("angle", self.angle),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(FiberMeshError::Geometry(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }

        if self.width <= 0.0 {
            return Err(FiberMeshError::Geometry(format!(
                "width must be positive, got {}",
                self.width
            )));
        }
        if self.height <= 0.0 {
            return Err(FiberMeshError::Geometry(format!(
                "height must be positive, got {}",
                self.height
            )));
        }
        if self.middle < 0.0 {
            return Err(FiberMeshError::Geometry(format!(
                "middle must not be negative, got {}",
                self.middle
            )));
        }
        if self.radius < 0.0 {
            return Err(FiberMeshError::Geometry(format!(
                "radius must not be negative, got {}",
                self.radius
            )));
        }
        if self.angle <= 0.0 || self.angle >= 180.0 {
            return Err(FiberMeshError::Geometry(format!(
                "angle must lie strictly between 0 and 180 degrees, got {}",
                self.angle
            )));
        }

        Ok(())
    }

    /// Complement of the half angle, `90° - angle / 2`, in radians
    pub fn alpha(&self) -> f64 {
        (90.0 - self.angle / 2.0).to_radians()
    }
}

/// Resolution and merge settings of the structured specimen mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDensity {
    /// Subdivisions per unit length, truncated per band and floored at one
    pub elements_per_length: f64,
    /// Coordinates are rounded to this many decimals when merging points
    pub merge_decimals: i32,
}

impl Default for MeshDensity {
    fn default() -> MeshDensity {
        MeshDensity {
            elements_per_length: 1.0,
            merge_decimals: 3,
        }
    }
}

impl MeshDensity {
    pub fn validate(&self) -> Result<()> {
        if !(self.elements_per_length.is_finite() && self.elements_per_length > 0.0) {
            return Err(FiberMeshError::Configuration(format!(
                "elements per length must be positive, got {}",
                self.elements_per_length
            )));
        }
        if !(0..=12).contains(&self.merge_decimals) {
            return Err(FiberMeshError::Configuration(format!(
                "merge decimals must be within 0..=12, got {}",
                self.merge_decimals
            )));
        }
        Ok(())
    }

    /// Number of subdivisions for a band of the given physical size
    pub fn subdivisions(&self, length: f64) -> usize {
        ((length * self.elements_per_length) as usize).max(1)
    }
}

/// Axis from which fiber angles are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FiberAxis {
    X,
    #[default]
    Y,
}

impl FiberAxis {
    /// Angle of the axis itself, in degrees
    pub fn reference_angle(&self) -> f64 {
        match self {
            FiberAxis::X => 0.0,
            FiberAxis::Y => 90.0,
        }
    }

    /// Parses the numeric selector used in input files (0 = x, 1 = y)
    pub fn from_index(index: usize) -> Result<FiberAxis> {
        match index {
            0 => Ok(FiberAxis::X),
            1 => Ok(FiberAxis::Y),
            other => Err(FiberMeshError::Configuration(format!(
                "fiber axis must be 0 or 1, got {other}"
            ))),
        }
    }
}

/// Layout of one fiber family
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiberParameters {
    /// Rotation from the reference axis, in degrees
    pub angle: f64,
    pub axis: FiberAxis,
    /// Center-to-center distance between neighbouring fibers
    pub spacing: f64,
    /// Points along each fiber. Every fiber is made of `points_per_fiber - 1`
    /// line cells.
    pub points_per_fiber: usize,
}

impl Default for FiberParameters {
    fn default() -> FiberParameters {
        FiberParameters {
            angle: 15.0,
            axis: FiberAxis::Y,
            spacing: 1.0,
            points_per_fiber: 201,
        }
    }
}

impl FiberParameters {
    pub fn validate(&self) -> Result<()> {
        if self.points_per_fiber < 2 {
            return Err(FiberMeshError::Configuration(format!(
                "a fiber needs at least 2 points, got {}",
                self.points_per_fiber
            )));
        }
        if !(self.spacing.is_finite() && self.spacing > 0.0) {
            return Err(FiberMeshError::Configuration(format!(
                "fiber spacing must be positive, got {}",
                self.spacing
            )));
        }
        if !self.angle.is_finite() {
            return Err(FiberMeshError::Configuration(format!(
                "fiber angle must be finite, got {}",
                self.angle
            )));
        }
        Ok(())
    }
}

/// User-facing parameters of the fiber-reinforced rubber composite
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParameters {
    /// Neo-Hookean parameter of the rubber (half the shear modulus)
    pub c10: f64,
    /// Fiber angle from the reference axis, in degrees
    pub fiber_angle: f64,
    /// Axial modulus of a single fiber
    pub fiber_modulus: f64,
    /// Cross-section area of a single fiber
    pub fiber_area: f64,
    /// Thickness of the rubber sheet
    pub thickness: f64,
    /// Strain hardening exponent of the fiber model
    pub strain_exponent: f64,
    pub axis: FiberAxis,
    /// Center-to-center distance between neighbouring fibers
    pub fiber_spacing: f64,
}

impl Default for MaterialParameters {
    fn default() -> MaterialParameters {
        MaterialParameters {
            c10: 0.5,
            fiber_angle: 15.0,
            fiber_modulus: 3600.0,
            fiber_area: 0.08,
            thickness: 5.0,
            strain_exponent: 0.0,
            axis: FiberAxis::Y,
            fiber_spacing: 1.0,
        }
    }
}

/// Everything needed to build the solid mesh and both fiber families
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpecimenConfig {
    pub shape: ShapeParameters,
    pub density: MeshDensity,
    /// Layout of the fiber families; the second family uses `+angle`, the
    /// first one `-angle`.
    pub fibers: FiberParameters,
}
