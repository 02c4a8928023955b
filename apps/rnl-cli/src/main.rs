use clap::{Args, Parser, Subcommand};
use rnl_app::{
    AppError, AppResult, AuthorityPaths, BergingPaths, ParameterizeRequest, PeilgebiedSource,
    RunOptions, RunRequest, Settings, SettingsOverrides, apply_edits, apply_verdeelsleutel,
    basin_series, build_network, concat_models, ensure_run, find_codes, get_results_summary,
    hot_start, list_runs, reset_index, route_links, validate_hydamo, validate_model,
};
use rnl_core::NodeId;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ribasim-nl")]
#[command(about = "Ribasim-NL - Build and parameterize hydrological network models", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Solver executable, overrides RIBASIM_EXE
    #[arg(long, global = true)]
    ribasim_exe: Option<PathBuf>,
    /// Data directory, overrides RIBASIM_NL_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// A model bundle, given by its descriptor or by authority and stage.
#[derive(Args)]
struct ModelArgs {
    /// Path to the root TOML descriptor
    #[arg(required_unless_present = "authority", conflicts_with = "authority")]
    toml_path: Option<PathBuf>,
    /// Water authority under the data directory
    #[arg(long, requires = "stage")]
    authority: Option<String>,
    /// Model stage, e.g. `fix_model_network`
    #[arg(long)]
    stage: Option<String>,
}

impl ModelArgs {
    fn resolve(&self, settings: &Settings) -> AppResult<PathBuf> {
        match (&self.toml_path, &self.authority, &self.stage) {
            (Some(path), _, _) => Ok(path.clone()),
            (None, Some(authority), Some(stage)) => {
                Ok(AuthorityPaths::from_settings(settings, authority).model_toml(stage, None))
            }
            _ => Err(AppError::InvalidInput(
                "give a descriptor or --authority with --stage".to_string(),
            )),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a network from a line layer
    Network {
        /// GeoPackage holding the lines
        lines_path: PathBuf,
        /// Layer with the lines
        #[arg(long, default_value = "hydroobject")]
        layer: String,
        /// Snapping tolerance in meters
        #[arg(long, default_value_t = 0.01)]
        tolerance: f64,
        /// Output GeoPackage with `nodes` and `links`
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check the Node and Link tables of a model
    Validate {
        #[command(flatten)]
        model: ModelArgs,
        /// Write offending rows to this GeoPackage
        #[arg(long)]
        diagnostics: Option<PathBuf>,
    },
    /// Apply operator edits from YAML or GeoPackage
    ApplyEdits {
        #[command(flatten)]
        model: ModelArgs,
        /// Edits file
        #[arg(long)]
        edits: PathBuf,
        /// Output descriptor
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Derive the static tables of a model
    Parameterize {
        #[command(flatten)]
        model: ModelArgs,
        /// Static data workbook (static_data.xlsx)
        #[arg(long)]
        static_data: Option<PathBuf>,
        /// GeoPackage with cross-section profiles
        #[arg(long)]
        profiles: Option<PathBuf>,
        /// Layer with the profiles
        #[arg(long, default_value = "profiles")]
        profiles_layer: String,
        /// HyDAMO GeoPackage with `peilgebiedpraktijk`
        #[arg(long)]
        peilgebieden: Option<PathBuf>,
        /// GeoPackage with water bodies for Basins without area
        #[arg(long)]
        water_bodies: Option<PathBuf>,
        /// Layer with the water bodies
        #[arg(long, default_value = "waterdeel")]
        water_bodies_layer: String,
        /// GeoPackage with supply areas for the aanvoer flags
        #[arg(long)]
        supply_areas: Option<PathBuf>,
        /// Layer with the supply areas
        #[arg(long, default_value = "aanvoergebieden")]
        supply_areas_layer: String,
        /// Directory with maaiveld, ghg, glg and ma GeoTIFFs for storage Basins
        #[arg(long)]
        berging: Option<PathBuf>,
        /// Add a synthetic Basin / time table
        #[arg(long)]
        basin_time: bool,
        /// Arrow file with offline groundwater budgets per Basin
        #[arg(long)]
        budgets: Option<PathBuf>,
        /// Output descriptor
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Redraw flow links along a line network
    RouteLinks {
        #[command(flatten)]
        model: ModelArgs,
        /// GeoPackage holding the lines
        #[arg(long)]
        lines: PathBuf,
        /// Layer with the lines
        #[arg(long, default_value = "hydroobject")]
        layer: String,
        /// Snapping tolerance in meters
        #[arg(long, default_value_t = 0.01)]
        tolerance: f64,
        /// Output descriptor
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Renumber node and link ids
    ResetIndex {
        #[command(flatten)]
        model: ModelArgs,
        /// First node id
        #[arg(long, default_value_t = 1)]
        node_start: u32,
        /// Output descriptor
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Join models into one
    Concat {
        /// Descriptors of the models to join
        #[arg(required = true)]
        toml_paths: Vec<PathBuf>,
        /// Output descriptor
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Run the solver on a model
    Run {
        #[command(flatten)]
        model: ModelArgs,
        /// Skip cache and force re-run
        #[arg(long)]
        no_cache: bool,
    },
    /// List cached runs of a model
    Runs {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Summarize the results of a model
    Results {
        #[command(flatten)]
        model: ModelArgs,
        /// Print the level series of this Basin
        #[arg(long)]
        basin: Option<NodeId>,
        /// Write a copy starting from the final levels
        #[arg(long)]
        hot_start: Option<PathBuf>,
    },
    /// Read and validate a HyDAMO GeoPackage
    HydamoValidate {
        /// Path to the GeoPackage
        path: PathBuf,
    },
    /// Look up organization codes
    Codes {
        /// CSV with organization codes
        codes_path: PathBuf,
        /// (Part of) the organization name
        organization: String,
        /// Administration category, e.g. `waterschap`
        #[arg(long)]
        category: Option<String>,
    },
    /// Add FractionalFlow and DiscreteControl nodes from a verdeelsleutel
    Verdeelsleutel {
        #[command(flatten)]
        model: ModelArgs,
        /// Verdeelsleutel CSV
        #[arg(long)]
        csv: PathBuf,
        /// Output descriptor
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = SettingsOverrides {
        ribasim_exe: cli.ribasim_exe,
        ribasim_nl_data_dir: cli.data_dir,
    };
    let settings = Settings::load(&std::env::current_dir()?, &overrides)?;
    debug!(
        ribasim_exe = %settings.ribasim_exe.display(),
        data_dir = %settings.ribasim_nl_data_dir.display(),
        "resolved settings"
    );

    match cli.command {
        Commands::Network {
            lines_path,
            layer,
            tolerance,
            output,
        } => cmd_network(&lines_path, &layer, tolerance, &output),
        Commands::Validate { model, diagnostics } => {
            cmd_validate(&model.resolve(&settings)?, diagnostics.as_deref())
        }
        Commands::ApplyEdits {
            model,
            edits,
            output,
        } => {
            let summary = apply_edits(&model.resolve(&settings)?, &edits, &output)?;
            println!("✓ Applied edits: {}", output.display());
            print_model_summary(&summary);
            Ok(())
        }
        Commands::Parameterize {
            model,
            static_data,
            profiles,
            profiles_layer,
            peilgebieden,
            water_bodies,
            water_bodies_layer,
            supply_areas,
            supply_areas_layer,
            berging,
            basin_time,
            budgets,
            output,
        } => {
            let request = ParameterizeRequest {
                toml_path: model.resolve(&settings)?,
                output,
                static_data,
                profiles: profiles.map(|path| (path, profiles_layer)),
                peilgebieden: peilgebieden.as_deref().map(PeilgebiedSource::hydamo),
                water_bodies: water_bodies.map(|path| (path, water_bodies_layer)),
                supply_areas: supply_areas.map(|path| (path, supply_areas_layer)),
                berging: berging.as_deref().map(BergingPaths::in_dir),
                basin_time,
                budgets,
            };
            cmd_parameterize(&request)
        }
        Commands::RouteLinks {
            model,
            lines,
            layer,
            tolerance,
            output,
        } => {
            let routed = route_links(&model.resolve(&settings)?, &lines, &layer, tolerance, &output)?;
            println!("✓ Routed {routed} links along {}: {}", lines.display(), output.display());
            Ok(())
        }
        Commands::ResetIndex {
            model,
            node_start,
            output,
        } => {
            let summary = reset_index(&model.resolve(&settings)?, node_start, &output)?;
            println!("✓ Renumbered from {}: {}", node_start, output.display());
            print_model_summary(&summary);
            Ok(())
        }
        Commands::Concat { toml_paths, output } => {
            let paths: Vec<&Path> = toml_paths.iter().map(PathBuf::as_path).collect();
            let summary = concat_models(&paths, &output)?;
            println!("✓ Joined {} models: {}", paths.len(), output.display());
            print_model_summary(&summary);
            Ok(())
        }
        Commands::Run { model, no_cache } => cmd_run(&model.resolve(&settings)?, &settings, !no_cache),
        Commands::Runs { model } => cmd_runs(&model.resolve(&settings)?),
        Commands::Results {
            model,
            basin,
            hot_start,
        } => cmd_results(&model.resolve(&settings)?, basin, hot_start.as_deref()),
        Commands::HydamoValidate { path } => cmd_hydamo_validate(&path),
        Commands::Codes {
            codes_path,
            organization,
            category,
        } => cmd_codes(&codes_path, &organization, category.as_deref()),
        Commands::Verdeelsleutel { model, csv, output } => {
            let control = apply_verdeelsleutel(&model.resolve(&settings)?, &csv, &output)?;
            println!(
                "✓ Added {} FractionalFlow nodes controlled by #{} (listening to #{})",
                control.fractional_flow_node_ids.len(),
                control.control_node_id,
                control.listen_node_id
            );
            Ok(())
        }
    }
}

fn print_model_summary(summary: &rnl_app::ModelSummary) {
    println!("  Nodes: {}", summary.node_count);
    println!("  Links: {}", summary.link_count);
    for (node_type, count) in &summary.node_types {
        println!("    {node_type}: {count}");
    }
}

fn cmd_network(lines_path: &Path, layer: &str, tolerance: f64, output: &Path) -> AppResult<()> {
    println!("Building network from: {} ({})", lines_path.display(), layer);
    let network = build_network(lines_path, layer, tolerance, output)?;
    println!("✓ Network written: {}", output.display());
    println!("  Nodes: {}", network.node_count());
    println!("  Links: {}", network.link_count());
    Ok(())
}

fn cmd_validate(toml_path: &Path, diagnostics: Option<&Path>) -> AppResult<()> {
    println!("Validating model: {}", toml_path.display());
    let report = validate_model(toml_path, diagnostics)?;
    if report.is_clean() {
        println!("✓ Model is valid");
        return Ok(());
    }
    println!("Issues found:");
    for (check, count) in report.counts() {
        if count > 0 {
            println!("  {check}: {count}");
        }
    }
    if let Some(path) = diagnostics {
        println!("Diagnostics written to: {}", path.display());
    }
    Ok(())
}

fn cmd_parameterize(request: &ParameterizeRequest) -> AppResult<()> {
    println!("Parameterizing model: {}", request.toml_path.display());
    let report = rnl_app::parameterize_model(request)?;
    let summary = &report.summary;
    println!("✓ Parameterized model: {}", request.output.display());
    println!("  Flow functions: {}", summary.functions);
    println!("  Flow boundaries: {}", summary.flow_boundaries);
    println!("  Structures with levels: {}", summary.structures_with_levels);
    println!("  Checked basins: {}", summary.checked_basins);
    if report.estimated_areas > 0 {
        println!("  Estimated basin areas: {}", report.estimated_areas);
    }
    if report.storage_basins > 0 {
        println!("  Storage basins: {}", report.storage_basins);
    }
    if let Some(aanvoer) = report.aanvoer {
        println!(
            "  Aanvoer: {} pumps, {} outlets, {} basins",
            aanvoer.pumps, aanvoer.outlets, aanvoer.basins
        );
    }
    if report.forcing_rows > 0 {
        println!("  Basin / time rows: {}", report.forcing_rows);
    }
    Ok(())
}

fn cmd_run(toml_path: &Path, settings: &Settings, use_cache: bool) -> AppResult<()> {
    println!("Running model: {}", toml_path.display());
    let mut request = RunRequest::new(toml_path, settings);
    request.options = RunOptions {
        use_cache,
        ..RunOptions::default()
    };
    let response = ensure_run(&request)?;

    if response.loaded_from_cache {
        println!("✓ Loaded from cache: {}", response.run_id);
    } else {
        println!("✓ Simulation completed: {}", response.run_id);
        println!("  Solver: {}", response.manifest.solver_version);
        println!("  Time:   {:.3}s", response.manifest.computation_time_s);
    }

    let summary = get_results_summary(toml_path)?;
    println!("  Period: {} - {}", summary.time_range.0, summary.time_range.1);
    println!("  Basins: {}", summary.basin_count);
    println!("  Links:  {}", summary.link_count);
    Ok(())
}

fn cmd_runs(toml_path: &Path) -> AppResult<()> {
    let runs = list_runs(toml_path)?;
    if runs.is_empty() {
        println!("No cached runs found for: {}", toml_path.display());
        return Ok(());
    }
    println!("Cached runs for '{}':", toml_path.display());
    for manifest in runs {
        println!(
            "  {} - {} (solver {}, exit code {})",
            manifest.run_id, manifest.timestamp, manifest.solver_version, manifest.exit_code
        );
    }
    Ok(())
}

fn cmd_results(toml_path: &Path, basin: Option<NodeId>, hot_start_output: Option<&Path>) -> AppResult<()> {
    let summary = get_results_summary(toml_path)?;
    println!("Results of: {}", toml_path.display());
    println!("  Period: {} - {}", summary.time_range.0, summary.time_range.1);
    println!("  Basins: {}", summary.basin_count);
    println!("  Links:  {}", summary.link_count);

    if let Some(node_id) = basin {
        println!("time,level,storage");
        for row in basin_series(toml_path, node_id)? {
            let storage = row.storage.map(|s| s.to_string()).unwrap_or_default();
            println!("{},{},{storage}", row.time, row.level);
        }
    } else {
        println!("Final levels:");
        for (node_id, level) in &summary.final_levels {
            println!("  #{node_id}: {level:.3}");
        }
    }

    if let Some(output) = hot_start_output {
        let updated = hot_start(toml_path, output)?;
        println!("✓ Hot start written: {} ({} basins)", output.display(), updated);
    }
    Ok(())
}

fn cmd_hydamo_validate(path: &Path) -> AppResult<()> {
    println!("Validating HyDAMO: {}", path.display());
    let summary = validate_hydamo(path)?;
    println!("✓ HyDAMO {} layers read", summary.version);
    for (layer, rows) in &summary.layers {
        println!("  {layer}: {rows} rows");
    }
    Ok(())
}

fn cmd_codes(codes_path: &Path, organization: &str, category: Option<&str>) -> AppResult<()> {
    let organizations = find_codes(codes_path, organization, category)?;
    if organizations.is_empty() {
        println!("No organizations match: {organization}");
        return Ok(());
    }
    for org in organizations {
        println!(
            "  {} - bgt {} wbh {} ({})",
            org.name,
            org.bgt_code.as_deref().unwrap_or("-"),
            org.wbh_code.as_deref().unwrap_or("-"),
            org.administration_category
        );
    }
    Ok(())
}
