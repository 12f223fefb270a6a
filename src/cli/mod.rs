//! Command-line interface for the clustering pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{Backend, ClusteringConfig};
use crate::core::{loaders, writers};
use crate::processors::clustering::Clusterer;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "paint-cluster")]
#[command(about = "Density-maximum clustering of localization microscopy data", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a localization CSV (columns x, y, frame)
    Cluster {
        /// Input CSV file
        input: PathBuf,
        /// Output directory (defaults to the input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Neighborhood radius, in coordinate units
        #[arg(long)]
        radius: Option<f64>,
        /// Clusters with this many localizations or fewer are discarded
        #[arg(long)]
        min_locs: Option<usize>,
        /// auto, dense, bucketed or device
        #[arg(long)]
        backend: Option<Backend>,
        /// Accept clusters without checking their frame distribution
        #[arg(long)]
        no_frame_analysis: bool,
        /// Also write a per-cluster summary CSV
        #[arg(long)]
        stats: bool,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Output YAML path
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            format!("{}...", value.chars().take(34).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Cluster {
            input,
            output_dir,
            radius,
            min_locs,
            backend,
            no_frame_analysis,
            stats,
        } => {
            let overrides = Overrides {
                radius,
                min_locs,
                backend,
                no_frame_analysis,
            };
            cmd_cluster(&input, output_dir, overrides.apply(&config.clustering), stats)
        }
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct Overrides {
    radius: Option<f64>,
    min_locs: Option<usize>,
    backend: Option<Backend>,
    no_frame_analysis: bool,
}

impl Overrides {
    fn apply(&self, base: &ClusteringConfig) -> ClusteringConfig {
        let mut config = base.clone();
        if let Some(radius) = self.radius {
            config.radius = radius;
        }
        if let Some(min_locs) = self.min_locs {
            config.min_locs = min_locs;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if self.no_frame_analysis {
            config.temporal.frame_analysis = false;
        }
        config
    }
}

/// `<dir>/<stem><suffix>.csv`
fn output_path(dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "locs".to_string());
    dir.join(format!("{}{}.csv", stem, suffix))
}

fn cmd_cluster(
    input: &Path,
    output_dir: Option<PathBuf>,
    config: ClusteringConfig,
    write_stats: bool,
) -> Result<()> {
    let start = Instant::now();

    // Default output directory to same as input
    let effective_output_dir = output_dir.unwrap_or_else(|| {
        input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    println!("Running density-maximum clustering...");
    println!("Input: {}", input.display());
    println!("Output directory: {}", effective_output_dir.display());
    println!("Parameters:");
    println!("  radius: {}", config.radius);
    println!("  min_locs: {}", config.min_locs);
    println!("  backend: {}", config.backend);
    println!("  frame_analysis: {}", config.temporal.frame_analysis);

    let spinner = create_spinner("Loading localizations...");
    let locs = loaders::load_locs_csv(input)
        .with_context(|| format!("failed to load localizations from {}", input.display()));
    let locs = match locs {
        Ok(locs) => locs,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.set_message(format!("Clustering {} localizations...", locs.len()));
    let clusterer = Clusterer::new(config);
    let outcome = clusterer.run(&locs);
    spinner.finish_and_clear();
    let outcome = outcome.context("clustering failed")?;

    let labels_path = output_path(&effective_output_dir, input, "_clustered");
    writers::write_labels_csv(&labels_path, &locs, &outcome.labels)
        .with_context(|| format!("failed to write {}", labels_path.display()))?;
    info!("Wrote labels to {}", labels_path.display());

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Output CSV", labels_path.display().to_string()),
    ];

    if write_stats {
        let stats_path = output_path(&effective_output_dir, input, "_cluster_stats");
        writers::write_cluster_stats_csv(&stats_path, &outcome.clusters)
            .with_context(|| format!("failed to write {}", stats_path.display()))?;
        info!("Wrote cluster summary to {}", stats_path.display());
        items.push(("Stats CSV", stats_path.display().to_string()));
    }

    let config = clusterer.config();
    items.extend([
        ("Localizations", locs.len().to_string()),
        ("Backend", outcome.backend.to_string()),
        ("Local maxima", outcome.n_local_maxima.to_string()),
        (
            "Clusters found",
            format!("{} of {}", outcome.n_clusters, outcome.clusters.len()),
        ),
        ("Noise points", outcome.n_noise().to_string()),
        ("radius", config.radius.to_string()),
        ("min_locs", config.min_locs.to_string()),
        ("Duration", format!("{:.2?}", start.elapsed())),
    ]);
    print_summary("Clustering Complete", &items);

    Ok(())
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    config
        .to_yaml(path)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_cluster() {
        let cli = Cli::try_parse_from([
            "paint-cluster",
            "-vv",
            "cluster",
            "locs.csv",
            "--radius",
            "0.05",
            "--backend",
            "gpu",
            "--no-frame-analysis",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Cluster {
                input,
                radius,
                backend,
                no_frame_analysis,
                stats,
                ..
            } => {
                assert_eq!(input, PathBuf::from("locs.csv"));
                assert_eq!(radius, Some(0.05));
                assert_eq!(backend, Some(Backend::Device));
                assert!(no_frame_analysis);
                assert!(!stats);
            }
            _ => panic!("expected cluster command"),
        }
    }

    #[test]
    fn test_overrides() {
        let base = ClusteringConfig::new(0.1, 10);
        let config = Overrides {
            radius: Some(0.2),
            backend: Some(Backend::Bucketed),
            no_frame_analysis: true,
            ..Overrides::default()
        }
        .apply(&base);
        assert_eq!(config.radius, 0.2);
        assert_eq!(config.min_locs, 10);
        assert_eq!(config.backend, Backend::Bucketed);
        assert!(!config.temporal.frame_analysis);
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("out"), Path::new("data/run_01.csv"), "_clustered");
        assert_eq!(path, PathBuf::from("out/run_01_clustered.csv"));
    }

    #[test]
    fn test_cluster_command_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("locs.csv");
        let mut csv = String::from("x,y,frame\n");
        for (k, f) in [100, 250, 400, 600, 750, 1000].into_iter().enumerate() {
            csv.push_str(&format!("{},{},{}\n", 0.01 * k as f64, 0.0, f));
        }
        csv.push_str("40.0,40.0,500\n");
        std::fs::write(&input, csv).unwrap();

        cmd_cluster(&input, None, ClusteringConfig::new(0.1, 3), true).unwrap();

        let labels = std::fs::read_to_string(dir.path().join("locs_clustered.csv")).unwrap();
        let lines: Vec<&str> = labels.lines().collect();
        assert_eq!(lines.len(), 8);
        assert!(lines[1].ends_with(",0"));
        assert!(lines[7].ends_with(",-1"));
        assert!(dir.path().join("locs_cluster_stats.csv").exists());
    }

    #[test]
    fn test_init_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        cmd_init_config(&path, &PipelineConfig::default()).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.clustering.min_locs, 10);
    }
}
