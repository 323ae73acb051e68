use std::path::Path;

use json::JsonValue;

use crate::{
    datatypes::{
        FiberAxis, FiberParameters, MaterialParameters, MeshDensity, ShapeParameters,
        SpecimenConfig,
    },
    error::{FiberMeshError, Result},
};

/// Parameters read from an input file
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputFile {
    pub specimen: SpecimenConfig,
    /// Fiber angle, axis and spacing mirror the `fibers` section
    pub material: MaterialParameters,
}

/// Reads an optional number. Missing keys fall back to `default`.
fn read_f64(json: &JsonValue, section: &str, key: &str, default: f64) -> Result<f64> {
    let value = &json[section][key];
    if value.is_null() {
        return Ok(default);
    }
    match value.as_f64() {
        Some(v) => Ok(v),
        None => Err(FiberMeshError::Input(format!(
            "Bad value for {key} in {section}: expected a number"
        ))),
    }
}

fn read_usize(json: &JsonValue, section: &str, key: &str, default: usize) -> Result<usize> {
    let value = &json[section][key];
    if value.is_null() {
        return Ok(default);
    }
    match value.as_usize() {
        Some(v) => Ok(v),
        None => Err(FiberMeshError::Input(format!(
            "Bad value for {key} in {section}: expected a non-negative integer"
        ))),
    }
}

/// Parses the input json. Every section and key is optional.
///
/// # Arguments
/// * `contents` - The input file contents
pub fn parse_input(contents: &str) -> Result<InputFile> {
    let json = match json::parse(contents) {
        Ok(j) => j,
        Err(err) => {
            return Err(FiberMeshError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    if !json.is_object() {
        return Err(FiberMeshError::Input(
            "Input json must be an object".to_owned(),
        ));
    }
    for (name, _) in json.entries() {
        if !["geometry", "mesh", "fibers", "material"].contains(&name) {
            return Err(FiberMeshError::Input(format!(
                "Unknown section {name} in input json"
            )));
        }
    }

    let shape_default = ShapeParameters::default();
    let shape = ShapeParameters {
        width: read_f64(&json, "geometry", "width", shape_default.width)?,
        height: read_f64(&json, "geometry", "height", shape_default.height)?,
        middle: read_f64(&json, "geometry", "middle", shape_default.middle)?,
        radius: read_f64(&json, "geometry", "radius", shape_default.radius)?,
        angle: read_f64(&json, "geometry", "angle", shape_default.angle)?,
    };

    let density_default = MeshDensity::default();
    let merge_decimals = read_usize(
        &json,
        "mesh",
        "merge_decimals",
        density_default.merge_decimals as usize,
    )?;
    let density = MeshDensity {
        elements_per_length: read_f64(
            &json,
            "mesh",
            "elements_per_length",
            density_default.elements_per_length,
        )?,
        merge_decimals: i32::try_from(merge_decimals).map_err(|_| {
            FiberMeshError::Input(format!("merge_decimals {merge_decimals} is too large"))
        })?,
    };

    let fibers_default = FiberParameters::default();
    let axis = FiberAxis::from_index(read_usize(&json, "fibers", "axis", 1)?)?;
    let fibers = FiberParameters {
        angle: read_f64(&json, "fibers", "angle", fibers_default.angle)?,
        axis,
        spacing: read_f64(&json, "fibers", "spacing", fibers_default.spacing)?,
        points_per_fiber: read_usize(
            &json,
            "fibers",
            "points_per_fiber",
            fibers_default.points_per_fiber,
        )?,
    };

    let material_default = MaterialParameters::default();
    let material = MaterialParameters {
        c10: read_f64(&json, "material", "c10", material_default.c10)?,
        fiber_angle: fibers.angle,
        fiber_modulus: read_f64(
            &json,
            "material",
            "fiber_modulus",
            material_default.fiber_modulus,
        )?,
        fiber_area: read_f64(&json, "material", "fiber_area", material_default.fiber_area)?,
        thickness: read_f64(&json, "material", "thickness", material_default.thickness)?,
        strain_exponent: read_f64(
            &json,
            "material",
            "strain_exponent",
            material_default.strain_exponent,
        )?,
        axis: fibers.axis,
        fiber_spacing: fibers.spacing,
    };

    Ok(InputFile {
        specimen: SpecimenConfig {
            shape,
            density,
            fibers,
        },
        material,
    })
}

/// Loads and parses an input file
pub fn load_input_file(input_file: &Path) -> Result<InputFile> {
    let contents = match std::fs::read_to_string(input_file) {
        Ok(c) => c,
        Err(err) => {
            return Err(FiberMeshError::Input(format!(
                "Unable to open input file {}: {err}",
                input_file.display()
            )))
        }
    };

    parse_input(&contents)
}
