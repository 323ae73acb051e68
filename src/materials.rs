use nalgebra::Vector2;
use tracing::debug;

use crate::{
    datatypes::MaterialParameters,
    error::{FiberMeshError, Result},
};

/// Material law handed to the external constitutive evaluator. Both laws are
/// plane stress and incompressible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaterialDescriptor {
    /// Isotropic neo-Hookean rubber
    NeoHooke { c10: f64 },
    /// Fiber family with an effective in-plane modulus, oriented at `angle`
    /// degrees from the x-axis
    Fiber {
        modulus: f64,
        angle: f64,
        strain_exponent: f64,
    },
}

/// Rubber matrix and two fiber families mirrored about the reference axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeMaterial {
    pub rubber: MaterialDescriptor,
    /// Families at `reference - angle` and `reference + angle`
    pub fibers: [MaterialDescriptor; 2],
    /// Unit fiber directions in the undeformed configuration, in the same
    /// order as `fibers`
    pub directions: [Vector2<f64>; 2],
    /// Factor converting the fiber modulus into the homogenized modulus
    pub correction_factor: f64,
}

/// Converts the axial stiffness of single fibers into a modulus smeared over
/// the rubber sheet
///
/// `fiber_area / (spacing / cos(angle)) / thickness`
pub fn stiffness_correction_factor(params: &MaterialParameters) -> Result<f64> {
    let checks = [
        ("fiber area", params.fiber_area),
        ("fiber spacing", params.fiber_spacing),
        ("thickness", params.thickness),
    ];
    for (name, value) in checks {
        if !(value.is_finite() && value > 0.0) {
            return Err(FiberMeshError::Configuration(format!(
                "{name} must be positive, got {value}"
            )));
        }
    }

    let cosine = params.fiber_angle.to_radians().cos();
    if cosine.abs() < 1e-12 {
        return Err(FiberMeshError::Configuration(format!(
            "fiber angle {} runs parallel to the fiber rows",
            params.fiber_angle
        )));
    }

    Ok(params.fiber_area / (params.fiber_spacing / cosine) / params.thickness)
}

fn unit_vector(degrees: f64) -> Vector2<f64> {
    let radians = degrees.to_radians();
    Vector2::new(radians.cos(), radians.sin())
}

/// Maps the user-facing composite parameters to material descriptors and
/// fiber directions
///
/// # Arguments
/// * `params` - Rubber and fiber parameters
pub fn fiber_reinforced_rubber(params: &MaterialParameters) -> Result<CompositeMaterial> {
    let factor = stiffness_correction_factor(params)?;
    let reference = params.axis.reference_angle();
    let angles = [reference - params.fiber_angle, reference + params.fiber_angle];

    let fiber = |angle: f64| MaterialDescriptor::Fiber {
        modulus: params.fiber_modulus * factor,
        angle,
        strain_exponent: params.strain_exponent,
    };

    debug!(
        "fiber modulus {} scaled by {:.5} for fibers at {:?} degrees",
        params.fiber_modulus, factor, angles
    );

    Ok(CompositeMaterial {
        rubber: MaterialDescriptor::NeoHooke { c10: params.c10 },
        fibers: angles.map(fiber),
        directions: angles.map(unit_vector),
        correction_factor: factor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::FiberAxis;
    use approx::assert_relative_eq;

    #[test]
    fn test_correction_factor() {
        let params = MaterialParameters::default();
        let expected = 0.08 / (1.0 / 15f64.to_radians().cos()) / 5.0;
        assert_relative_eq!(stiffness_correction_factor(&params).unwrap(), expected);

        let straight = MaterialParameters {
            fiber_angle: 0.0,
            fiber_spacing: 2.0,
            ..MaterialParameters::default()
        };
        assert_relative_eq!(stiffness_correction_factor(&straight).unwrap(), 0.008);
    }

    #[test]
    fn test_fibers_mirror_about_reference_axis() {
        let material = fiber_reinforced_rubber(&MaterialParameters::default()).unwrap();

        assert_eq!(material.rubber, MaterialDescriptor::NeoHooke { c10: 0.5 });
        match material.fibers {
            [MaterialDescriptor::Fiber {
                angle: a1,
                modulus: m1,
                ..
            }, MaterialDescriptor::Fiber {
                angle: a2,
                modulus: m2,
                ..
            }] => {
                assert_relative_eq!(a1, 75.0);
                assert_relative_eq!(a2, 105.0);
                assert_relative_eq!(m1, 3600.0 * material.correction_factor);
                assert_relative_eq!(m1, m2);
            }
            other => panic!("unexpected fiber descriptors {other:?}"),
        }

        let [d1, d2] = material.directions;
        assert_relative_eq!(d1.norm(), 1.0);
        assert_relative_eq!(d2.norm(), 1.0);
        // mirrored about the y-axis
        assert_relative_eq!(d1.x, -d2.x, epsilon = 1e-12);
        assert_relative_eq!(d1.y, d2.y, epsilon = 1e-12);
    }

    #[test]
    fn test_x_axis_reference() {
        let params = MaterialParameters {
            axis: FiberAxis::X,
            fiber_angle: 30.0,
            ..MaterialParameters::default()
        };
        let material = fiber_reinforced_rubber(&params).unwrap();
        assert_relative_eq!(
            material.directions[0],
            Vector2::new(30f64.to_radians().cos(), -0.5),
            epsilon = 1e-12
        );
        assert_relative_eq!(material.directions[1].y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_parameters() {
        for params in [
            MaterialParameters {
                fiber_area: 0.0,
                ..MaterialParameters::default()
            },
            MaterialParameters {
                thickness: -1.0,
                ..MaterialParameters::default()
            },
            MaterialParameters {
                fiber_spacing: 0.0,
                ..MaterialParameters::default()
            },
            MaterialParameters {
                fiber_angle: 90.0,
                ..MaterialParameters::default()
            },
        ] {
            assert!(matches!(
                fiber_reinforced_rubber(&params),
                Err(FiberMeshError::Configuration(_))
            ));
        }
    }
}
