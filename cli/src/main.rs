mod tree;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geoh5_io::container::Mode;
use geoh5_io::workspace::{Workspace, WorkspaceOptions};
use geoh5_model::entity::{Association, DataClass, DataValues, EntityKind, Geometry, ObjectClass};

#[derive(Parser)]
#[command(name = "geoh5")]
#[command(about = "Inspect and build geoh5 project files", long_about = None)]
struct Cli {
    /// Project file to operate on
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display summary information about the project file
    Info,

    /// Print the entity tree rooted at the workspace
    Tree,

    /// Create a Points object with evenly spaced demo vertices
    CreatePoints {
        /// Name for the new object
        #[arg(short, long, default_value = "demo points")]
        name: String,

        /// Number of vertices to generate
        #[arg(short, long, default_value = "12")]
        count: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let result = match &cli.command {
        Commands::Info => run_info(&cli.file),
        Commands::Tree => run_tree(&cli.file),
        Commands::CreatePoints { name, count } => run_create_points(&cli.file, name, *count),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_info(path: &PathBuf) -> geoh5_io::Result<()> {
    let mut ws = Workspace::new(path, WorkspaceOptions::default());
    ws.open(Mode::Read)?;

    println!("File: {}", path.display());
    println!("Version: {}", ws.version());
    println!("GA Version: {}", ws.ga_version());
    println!("Distance unit: {}", ws.distance_unit());
    if ws.contributors().is_empty() {
        println!("Contributors: (none)");
    } else {
        println!("Contributors: {}", ws.contributors().join(", "));
    }
    println!("Groups: {}", ws.groups().len());
    println!("Objects: {}", ws.objects().len());
    println!("Data: {}", ws.data().len());

    ws.close()
}

fn run_tree(path: &PathBuf) -> geoh5_io::Result<()> {
    let mut ws = Workspace::new(path, WorkspaceOptions::default());
    ws.open(Mode::Read)?;

    if let Some(root) = ws.root() {
        tree::print_tree(&ws, root, 0);
    }

    ws.close()
}

fn run_create_points(path: &PathBuf, name: &str, count: usize) -> geoh5_io::Result<()> {
    let mut ws = Workspace::new(path, WorkspaceOptions::default());
    ws.open(Mode::Append)?;

    let Some(root) = ws.root() else {
        return Ok(());
    };

    // Evenly spaced points along a unit helix; good enough to exercise
    // round-tripping without pulling in a random-number dependency.
    let vertices: Vec<[f64; 3]> = (0..count)
        .map(|i| {
            let t = i as f64;
            [t.cos(), t.sin(), t * 0.1]
        })
        .collect();

    let points = ws.create_entity(
        None,
        name,
        Some(root),
        None,
        EntityKind::Object {
            children: Vec::new(),
            property_groups: Vec::new(),
            class: ObjectClass::Points,
            geometry: Geometry::Points { vertices },
        },
        true,
    )?;

    let values: Vec<f32> = (0..count).map(|i| i as f32).collect();
    ws.create_entity(
        None,
        "index",
        Some(points),
        None,
        EntityKind::Data {
            association: Association::Vertex,
            values: DataValues::Float(values),
            class: DataClass::Generic,
        },
        true,
    )?;

    println!("created {name} with {count} vertices in {}", path.display());
    ws.close()
}
