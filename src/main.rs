//! Builds the test specimen mesh and both fiber families and writes them as
//! CSV tables for the external solver and for plotting.
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=fibermesh=debug`) or pass `-v`/`-vv` to
//! control log output.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fibermesh::{
    fibers, input,
    input::InputFile,
    materials,
    post_processor::{self, PointData},
};

/// Generate a fiber-reinforced rubber test specimen
#[derive(Parser)]
#[command(name = "fibermesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input json with geometry, mesh, fibers and material sections.
    /// Defaults are used when omitted.
    input: Option<PathBuf>,

    /// Directory for the CSV output
    #[arg(long, short, default_value = ".")]
    output: PathBuf,

    /// Increase output verbosity (-v for info, -vv for debug)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "fibermesh=info",
            2 => "fibermesh=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.input {
        Some(path) => input::load_input_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => InputFile::default(),
    };

    let bar = ProgressBar::new(4);

    bar.set_message("building specimen");
    let specimen = fibers::build_test_specimen(&config.specimen)?;
    bar.inc(1);

    bar.set_message("deriving material parameters");
    let material = materials::fiber_reinforced_rubber(&config.material)?;
    info!(
        "rubber {:?}, fibers {:?} and {:?}",
        material.rubber, material.fibers[0], material.fibers[1]
    );
    bar.inc(1);

    bar.set_message("writing solid mesh");
    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    let out = |name: &str| cli.output.join(name);

    post_processor::write_points_csv(&out("solid_points.csv"), &specimen.solid, None, &[])?;
    post_processor::write_cells_csv(&out("solid_cells.csv"), &specimen.solid)?;
    post_processor::write_outline_csv(
        &out("outline.csv"),
        &specimen.limit,
        config.specimen.shape.height,
        201,
    )?;
    bar.inc(1);

    bar.set_message("writing fiber families");
    for (i, (family, direction)) in specimen.fibers.iter().zip(material.directions).enumerate() {
        let directions = vec![direction; family.mesh().npoints()];
        post_processor::write_points_csv(
            &out(&format!("fibers_{}_points.csv", i + 1)),
            family.mesh(),
            Some(family.mask()),
            &[PointData::Vector("direction", &directions)],
        )?;
        post_processor::write_cells_csv(
            &out(&format!("fibers_{}_cells.csv", i + 1)),
            family.mesh(),
        )?;
    }
    bar.inc(1);
    bar.finish_with_message("done");

    println!(
        "info: wrote specimen with {} cells and fiber families with {} and {} cells to {}",
        specimen.solid.ncells(),
        specimen.fibers[0].mesh().ncells(),
        specimen.fibers[1].mesh().ncells(),
        cli.output.display()
    );

    Ok(())
}
