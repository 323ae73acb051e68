use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use nalgebra::Vector2;
use tracing::info;

use crate::{
    error::{FiberMeshError, Result},
    mesh::Mesh,
    mesher::LimitFunction,
};

/// A named point field for the nodes csv
#[derive(Debug, Clone, Copy)]
pub enum PointData<'a> {
    Scalar(&'a str, &'a [f64]),
    Vector(&'a str, &'a [Vector2<f64>]),
}

impl PointData<'_> {
    fn len(&self) -> usize {
        match self {
            PointData::Scalar(_, values) => values.len(),
            PointData::Vector(_, values) => values.len(),
        }
    }

    fn header(&self) -> String {
        match self {
            PointData::Scalar(name, _) => name.to_string(),
            PointData::Vector(name, _) => format!("{name}_x,{name}_y"),
        }
    }

    fn row(&self, index: usize) -> String {
        match self {
            PointData::Scalar(_, values) => format!("{}", values[index]),
            PointData::Vector(_, values) => format!("{},{}", values[index].x, values[index].y),
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    match File::create(path) {
        Ok(f) => Ok(BufWriter::new(f)),
        Err(err) => Err(FiberMeshError::PostProcessor(format!(
            "Failed to create {}: {err}",
            path.display()
        ))),
    }
}

fn write_error(path: &Path) -> impl Fn(std::io::Error) -> FiberMeshError + '_ {
    move |err| FiberMeshError::PostProcessor(format!("Failed to write {}: {err}", path.display()))
}

/// Writes mesh points and point fields to a CSV file
///
/// # Arguments
/// * `path` - The output csv file
/// * `mesh` - The mesh whose points are written
/// * `mask` - Optional validity flag per point, written as a 0/1 column
/// * `fields` - Point fields aligned with the mesh points
pub fn write_points_csv(
    path: &Path,
    mesh: &Mesh,
    mask: Option<&[bool]>,
    fields: &[PointData],
) -> Result<()> {
    if let Some(mask) = mask {
        if mask.len() != mesh.npoints() {
            return Err(FiberMeshError::PostProcessor(format!(
                "mask has {} entries for {} points",
                mask.len(),
                mesh.npoints()
            )));
        }
    }
    if let Some(field) = fields.iter().find(|f| f.len() != mesh.npoints()) {
        return Err(FiberMeshError::PostProcessor(format!(
            "field {} has {} values for {} points",
            field.header(),
            field.len(),
            mesh.npoints()
        )));
    }

    let mut file = create(path)?;
    let on_error = write_error(path);

    let mut header = String::from("x,y");
    if mask.is_some() {
        header.push_str(",valid");
    }
    for field in fields {
        header.push(',');
        header.push_str(&field.header());
    }
    writeln!(file, "{header}").map_err(&on_error)?;

    for (i, point) in mesh.points().iter().enumerate() {
        let mut row = format!("{},{}", point.x, point.y);
        if let Some(mask) = mask {
            row.push_str(if mask[i] { ",1" } else { ",0" });
        }
        for field in fields {
            row.push(',');
            row.push_str(&field.row(i));
        }
        writeln!(file, "{row}").map_err(&on_error)?;
    }
    file.flush().map_err(&on_error)?;

    info!("wrote {} points to {}", mesh.npoints(), path.display());
    Ok(())
}

/// Writes the cell connectivity of a mesh to a CSV file, one cell per row
pub fn write_cells_csv(path: &Path, mesh: &Mesh) -> Result<()> {
    let mut file = create(path)?;
    let on_error = write_error(path);

    let header: Vec<String> = (0..mesh.cell_type().nodes_per_cell())
        .map(|i| format!("n{i}"))
        .collect();
    writeln!(file, "{}", header.join(",")).map_err(&on_error)?;

    for cell in mesh.cells() {
        let row: Vec<String> = cell.iter().map(|i| i.to_string()).collect();
        writeln!(file, "{}", row.join(",")).map_err(&on_error)?;
    }
    file.flush().map_err(&on_error)?;

    info!("wrote {} cells to {}", mesh.ncells(), path.display());
    Ok(())
}

/// Samples the limit function from `-height / 2` to `height / 2` and writes
/// the right-hand outline to a CSV file
pub fn write_outline_csv(
    path: &Path,
    limit: &LimitFunction,
    height: f64,
    samples: usize,
) -> Result<()> {
    if samples < 2 {
        return Err(FiberMeshError::PostProcessor(format!(
            "an outline needs at least 2 samples, got {samples}"
        )));
    }

    let mut file = create(path)?;
    let on_error = write_error(path);

    writeln!(file, "y,x_max").map_err(&on_error)?;
    for i in 0..samples {
        let y = -height / 2.0 + height * i as f64 / (samples - 1) as f64;
        writeln!(file, "{},{}", y, limit.evaluate(y)).map_err(&on_error)?;
    }
    file.flush().map_err(&on_error)?;

    info!("wrote outline with {samples} samples to {}", path.display());
    Ok(())
}

/// Indices of the points on the horizontal line `y`, sorted from left to
/// right. Used for path plots through the specimen.
pub fn points_on_line(mesh: &Mesh, y: f64, tolerance: f64) -> Vec<usize> {
    let points = mesh.points();
    let mut indices: Vec<usize> = (0..points.len())
        .filter(|&i| (points[i].y - y).abs() <= tolerance)
        .collect();
    indices.sort_by(|&a, &b| points[a].x.total_cmp(&points[b].x));
    indices
}
