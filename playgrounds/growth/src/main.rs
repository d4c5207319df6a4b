use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vegetation::{Parameters, Tree, TreeGrower, PRESETS};

/// Grows a tree from a parameter set and reports what came out.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
	/// Bundled preset to start from.
	#[arg(long, default_value = "default", value_parser = clap::builder::PossibleValuesParser::new(PRESETS))]
	preset: String,

	/// TOML or JSON parameter file. Takes precedence over the preset.
	#[arg(long)]
	params: Option<PathBuf>,

	/// Overrides the seed of the parameter set.
	#[arg(long)]
	seed: Option<u64>,

	/// Prints the report as JSON.
	#[arg(long)]
	json: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Report {
	source: String,
	seed: u64,
	scale: f32,
	stems: usize,
	control_points: usize,
	leaves: usize,
	level_stem_counts: Vec<usize>,
	level_child_points: Vec<usize>,
	bounds: Option<[[f32; 3]; 2]>,
	pruned: bool,
}

impl Report {
	fn new(source: String, params: &Parameters, tree: &Tree) -> Self {
		Self {
			source,
			seed: params.seed,
			scale: tree.scale,
			stems: tree.stem_count(),
			control_points: tree.control_point_count(),
			leaves: tree.leaf_count(),
			level_stem_counts: tree.level_stem_counts.clone(),
			level_child_points: tree.level_child_points.clone(),
			bounds: tree.bounds().map(|(min, max)| [min.to_array(), max.to_array()]),
			pruned: tree.envelope.is_some(),
		}
	}
}

fn load(path: &Path) -> anyhow::Result<Parameters> {
	let source = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read parameters from {}", path.display()))?;

	let params = match path.extension().and_then(|extension| extension.to_str()) {
		Some("json") => Parameters::from_json_str(&source)?,
		_ => Parameters::from_toml_str(&source)?,
	};
	Ok(params)
}

fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let args = Args::parse();

	let (source, mut params) = match &args.params {
		Some(path) => (path.display().to_string(), load(path)?),
		None => (args.preset.clone(), Parameters::preset(&args.preset)?),
	};
	if let Some(seed) = args.seed {
		params = params.with_seed(seed);
	}

	log::info!("Growing {} with seed {}", source, params.seed);
	let grower = TreeGrower::new(params)?;
	let tree = grower.grow();

	let report = Report::new(source, grower.params(), &tree);
	if args.json {
		println!("{}", serde_json::to_string_pretty(&report)?);
	} else {
		log::info!(
			"Grew {} stems ({} control points) and {} leaves at scale {:.2}",
			report.stems,
			report.control_points,
			report.leaves,
			report.scale
		);
		for (level, (stems, points)) in
			report.level_stem_counts.iter().zip(&report.level_child_points).enumerate()
		{
			log::info!("Level {}: {} stems, {} attachment points", level, stems, points);
		}
		if let Some([min, max]) = report.bounds {
			log::info!("Bounds {:?} to {:?}", min, max);
		}
	}

	Ok(())
}
