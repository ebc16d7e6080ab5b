use anyhow::{anyhow, Context};
use choroviz::{classify, config, layers, legend, names, server, types};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the viewer, its dataset store and the classification API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Classify a dataset file and print breaks, colors and legend as JSON
    Classify {
        /// GeoJSON dataset file
        input: PathBuf,
        /// Spatial unit the dataset joins to (1 localities, 2 UPZ, 3 cadastral zones)
        #[arg(short, long, default_value_t = 1)]
        unit: u8,
        /// Property to classify; defaults to the first numeric property
        #[arg(short, long)]
        property: Option<String>,
        /// Override the bucket count
        #[arg(short, long)]
        buckets: Option<usize>,
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Derive label points for a polygon layer's name source
    Names {
        /// Polygon FeatureCollection
        input: PathBuf,
        /// Output file for the label points
        output: PathBuf,
        /// Property holding the unit name
        #[arg(short, long)]
        name_property: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
        Commands::Classify { input, unit, property, buckets, config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            run_classify(input, *unit, property.as_deref(), *buckets, &app_config)?;
        }
        Commands::Names { input, output, name_property } => {
            names::run(input, name_property, output)?;
        }
    }

    Ok(())
}

fn run_classify(
    input: &Path,
    unit: u8,
    property: Option<&str>,
    buckets: Option<usize>,
    app_config: &config::AppConfig,
) -> anyhow::Result<()> {
    let unit = types::SpatialUnit::from_wire_id(unit)
        .ok_or_else(|| anyhow!("unknown spatial unit {unit}"))?;

    let bytes = std::fs::read(input)
        .with_context(|| format!("Failed to read dataset file: {:?}", input))?;
    let mut dataset = types::Dataset::from_slice(&bytes)?;
    if buckets.is_some() {
        dataset.presentation.buckets = buckets;
    }

    let match_key = unit.match_key();
    let property = match property {
        Some(property) => property.to_string(),
        None => dataset
            .default_property(match_key)
            .ok_or_else(|| anyhow!("dataset has no numeric properties"))?,
    };

    let classification = classify::classify(&dataset, &property, &app_config.classify.defaults())?;
    let table = classification.match_table(&dataset, match_key, &property);

    let report = serde_json::json!({
        "property": property,
        "breaks": classification.breaks,
        "labels": classification
            .breaks
            .iter()
            .map(|b| classify::format_break_label(*b))
            .collect::<Vec<_>>(),
        "colors": classification.colors,
        "fill_color": layers::fill_color_expression(match_key, &table, &classification.no_data_color),
        "legend": legend::build_legend(&classification),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
