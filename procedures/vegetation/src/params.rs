use crate::shape::{EnvelopeShape, Shape};
use crate::tree::leaf::LeafShape;
use crate::tree::stem::HandleKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_PRESET: &str = include_str!("../presets/default.toml");
const QUAKING_ASPEN_PRESET: &str = include_str!("../presets/quaking-aspen.toml");
const WEEPING_WILLOW_PRESET: &str = include_str!("../presets/weeping-willow.toml");

/// Names of the bundled presets.
pub const PRESETS: [&str; 3] = ["default", "quaking-aspen", "weeping-willow"];

/// Deepest supported branching level, counting the trunk as level zero.
pub const MAX_LEVELS: usize = 4;

/// Handles given to grown control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandleType {
	#[default]
	Auto,
	Vector,
}

impl From<HandleType> for HandleKind {
	fn from(handle: HandleType) -> Self {
		match handle {
			HandleType::Auto => HandleKind::Auto,
			HandleType::Vector => HandleKind::Vector,
		}
	}
}

/// A parameter set that cannot grow a tree.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
	#[error("levels must be between 1 and 4, got {0}")]
	Levels(usize),
	#[error("curveRes for level {level} must be at least 1")]
	CurveResolution { level: usize },
	#[error("baseSize must be within [0, 1], got {0}")]
	BaseSize(f32),
	#[error("taper for level {level} must be within [0, 1], got {taper}")]
	Taper { level: usize, taper: f32 },
	#[error("pruneWidthPeak must be within (0, 1) when pruning, got {0}")]
	PruneWidthPeak(f32),
	#[error("scale must be positive, got {0}")]
	Scale(f32),
	#[error("maxPruneIterations must be positive")]
	PruneIterations,
}

/// Failure to load a parameter set.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid TOML parameters: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("invalid JSON parameters: {0}")]
	Json(#[from] serde_json::Error),
	#[error("unknown preset {0:?}")]
	UnknownPreset(String),
	#[error(transparent)]
	Invalid(#[from] ParameterError),
}

/// Everything that shapes a generated tree.
///
/// Per-level arrays are indexed by branching level with the trunk at zero. Angles are in degrees.
/// Missing fields fall back to [Parameters::default], so a parameter file only needs to list
/// what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Parameters {
	pub seed: u64,
	pub levels: usize,

	/// Stem length relative to the parent (or, for the trunk, to the tree's scale).
	pub length: [f32; 4],
	pub length_v: [f32; 4],
	/// Child stems per parent. The trunk's entry is unused.
	pub branches: [u32; 4],
	pub curve_res: [usize; 4],
	pub curve: [f32; 4],
	pub curve_v: [f32; 4],
	pub curve_back: [f32; 4],

	/// Splits at the trunk's second segment.
	pub base_splits: u32,
	/// Expected splits per segment.
	pub seg_splits: [f32; 4],
	pub split_angle: [f32; 4],
	pub split_angle_v: [f32; 4],

	pub scale: f32,
	pub scale_v: f32,
	/// Scales the trunk radius.
	pub scale0: f32,
	pub scale_v0: f32,
	/// Pull of branches toward vertical. Negative values make them droop.
	pub attract_up: f32,
	/// Silhouette driving first-level branch lengths.
	pub shape: Shape,
	pub base_size: f32,
	/// Trunk radius relative to its length.
	pub ratio: f32,
	pub ratio_power: f32,
	pub taper: [f32; 4],

	pub down_angle: [f32; 4],
	/// Negative values select the shape-driven down angle.
	pub down_angle_v: [f32; 4],
	/// Negative values alternate branches between two sides.
	pub rotate: [f32; 4],
	pub rotate_v: [f32; 4],

	pub prune: bool,
	pub prune_width: f32,
	pub prune_width_peak: f32,
	pub prune_power_high: f32,
	pub prune_power_low: f32,
	/// How much of the pruning to apply, from 0 (none) to 1 (fully inside the envelope).
	pub prune_ratio: f32,
	/// Cap on pruning attempts per stem.
	pub max_prune_iterations: u32,

	pub show_leaves: bool,
	pub leaf_scale: f32,
	pub leaf_scale_x: f32,
	pub leaf_shape: LeafShape,
	pub bend: f32,
	/// Distribution of leaves along their stems.
	pub leaf_dist: Shape,
	/// Leaves per stem. Negative values sprout clusters at the stem tips.
	pub leaves: i32,
	pub handle_type: HandleType,
}

impl Default for Parameters {
	fn default() -> Self {
		Self {
			seed: 0,
			levels: 2,
			length: [1.0, 0.3, 0.6, 0.45],
			length_v: [0.0, 0.0, 0.0, 0.0],
			branches: [0, 50, 30, 10],
			curve_res: [3, 5, 3, 1],
			curve: [0.0, -40.0, -40.0, 0.0],
			curve_v: [20.0, 50.0, 75.0, 0.0],
			curve_back: [0.0, 0.0, 0.0, 0.0],
			base_splits: 0,
			seg_splits: [0.0, 0.0, 0.0, 0.0],
			split_angle: [0.0, 0.0, 0.0, 0.0],
			split_angle_v: [0.0, 0.0, 0.0, 0.0],
			scale: 13.0,
			scale_v: 3.0,
			scale0: 1.0,
			scale_v0: 0.0,
			attract_up: 0.5,
			shape: Shape::TendFlame,
			base_size: 0.4,
			ratio: 0.015,
			ratio_power: 1.2,
			taper: [1.0, 1.0, 1.0, 1.0],
			down_angle: [90.0, 60.0, 45.0, 45.0],
			down_angle_v: [0.0, -50.0, 10.0, 10.0],
			rotate: [99.5, 140.0, 140.0, 77.0],
			rotate_v: [15.0, 0.0, 0.0, 0.0],
			prune: false,
			prune_width: 0.4,
			prune_width_peak: 0.6,
			prune_power_high: 0.5,
			prune_power_low: 0.001,
			prune_ratio: 1.0,
			max_prune_iterations: 64,
			show_leaves: true,
			leaf_scale: 0.17,
			leaf_scale_x: 1.0,
			leaf_shape: LeafShape::Hex,
			bend: 0.0,
			leaf_dist: Shape::TaperedCylindrical,
			leaves: 25,
			handle_type: HandleType::Auto,
		}
	}
}

impl Parameters {
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let params: Self = toml::from_str(source)?;
		params.validate()?;
		Ok(params)
	}

	pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
		let params: Self = serde_json::from_str(source)?;
		params.validate()?;
		Ok(params)
	}

	pub fn preset(name: &str) -> Result<Self, ConfigError> {
		let source = match name {
			"default" => DEFAULT_PRESET,
			"quaking-aspen" => QUAKING_ASPEN_PRESET,
			"weeping-willow" => WEEPING_WILLOW_PRESET,
			other => return Err(ConfigError::UnknownPreset(other.to_string())),
		};
		Self::from_toml_str(source)
	}

	pub fn with_seed(mut self, seed: u64) -> Self {
		self.seed = seed;
		self
	}

	/// Checks the ranges generation relies on.
	pub fn validate(&self) -> Result<(), ParameterError> {
		if !(1..=MAX_LEVELS).contains(&self.levels) {
			return Err(ParameterError::Levels(self.levels));
		}
		if let Some(level) = (0..self.levels).find(|&level| self.curve_res[level] == 0) {
			return Err(ParameterError::CurveResolution { level });
		}
		if !(0.0..=1.0).contains(&self.base_size) {
			return Err(ParameterError::BaseSize(self.base_size));
		}
		if let Some((level, &taper)) =
			self.taper.iter().enumerate().find(|(_, taper)| !(0.0..=1.0).contains(*taper))
		{
			return Err(ParameterError::Taper { level, taper });
		}
		let peak = self.prune_width_peak;
		if self.prune && (peak.is_nan() || peak <= 0.0 || peak >= 1.0) {
			return Err(ParameterError::PruneWidthPeak(self.prune_width_peak));
		}
		if self.scale.is_nan() || self.scale <= 0.0 {
			return Err(ParameterError::Scale(self.scale));
		}
		if self.max_prune_iterations == 0 {
			return Err(ParameterError::PruneIterations);
		}
		Ok(())
	}

	/// Profile parameters of the pruning envelope.
	pub fn envelope_shape(&self) -> EnvelopeShape {
		EnvelopeShape {
			peak_width: self.prune_width_peak,
			power_high: self.prune_power_high,
			power_low: self.prune_power_low,
		}
	}

	/// Index of the parameters that apply to leaves.
	pub fn leaf_level(&self) -> usize {
		self.levels.min(MAX_LEVELS - 1)
	}

	pub fn grows_leaves(&self) -> bool {
		self.show_leaves && self.leaves != 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_is_valid() {
		assert_eq!(Parameters::default().validate(), Ok(()));
	}

	#[test]
	fn test_partial_toml_overrides_defaults() -> Result<(), ConfigError> {
		let params = Parameters::from_toml_str(
			r#"
			seed = 7
			levels = 3
			shape = "flame"
			leafShape = "rect"
			handleType = "vector"
			curveRes = [4, 4, 2, 1]
			"#,
		)?;

		assert_eq!(params.seed, 7);
		assert_eq!(params.levels, 3);
		assert_eq!(params.shape, Shape::Flame);
		assert_eq!(params.leaf_shape, LeafShape::Rect);
		assert_eq!(params.handle_type, HandleType::Vector);
		assert_eq!(params.curve_res, [4, 4, 2, 1]);
		assert_eq!(params.scale, Parameters::default().scale);
		Ok(())
	}

	#[test]
	fn test_json() -> Result<(), ConfigError> {
		let params = Parameters::from_json_str(r#"{ "prune": true, "pruneWidthPeak": 0.5, "leaves": -4 }"#)?;
		assert!(params.prune);
		assert_eq!(params.leaves, -4);
		assert_eq!(params.envelope_shape().peak_width, 0.5);
		Ok(())
	}

	#[test]
	fn test_unknown_enum_value_is_rejected() {
		let result = Parameters::from_toml_str("leafShape = \"triangle\"");
		assert!(matches!(result, Err(ConfigError::Toml(_))));
	}

	#[test]
	fn test_validation_rejects_bad_ranges() {
		let invalid = |edit: fn(&mut Parameters)| {
			let mut params = Parameters::default();
			edit(&mut params);
			params.validate()
		};

		assert_eq!(invalid(|p| p.levels = 0), Err(ParameterError::Levels(0)));
		assert_eq!(invalid(|p| p.levels = 5), Err(ParameterError::Levels(5)));
		assert_eq!(
			invalid(|p| p.curve_res[1] = 0),
			Err(ParameterError::CurveResolution { level: 1 })
		);
		assert_eq!(invalid(|p| p.base_size = 1.5), Err(ParameterError::BaseSize(1.5)));
		assert_eq!(
			invalid(|p| p.taper[2] = -0.1),
			Err(ParameterError::Taper { level: 2, taper: -0.1 })
		);
		assert_eq!(invalid(|p| p.scale = 0.0), Err(ParameterError::Scale(0.0)));
		assert_eq!(invalid(|p| p.max_prune_iterations = 0), Err(ParameterError::PruneIterations));
		assert_eq!(
			invalid(|p| {
				p.prune = true;
				p.prune_width_peak = 1.0;
			}),
			Err(ParameterError::PruneWidthPeak(1.0))
		);

		// unused levels and disabled pruning are not checked
		assert_eq!(invalid(|p| p.curve_res[3] = 0), Ok(()));
		assert_eq!(invalid(|p| p.prune_width_peak = 0.0), Ok(()));
	}

	#[test]
	fn test_invalid_file_reports_validation() {
		let result = Parameters::from_toml_str("levels = 9");
		assert!(matches!(result, Err(ConfigError::Invalid(ParameterError::Levels(9)))));
	}

	#[test]
	fn test_presets_load() -> Result<(), ConfigError> {
		for name in PRESETS {
			Parameters::preset(name)?;
		}
		assert!(matches!(Parameters::preset("oak"), Err(ConfigError::UnknownPreset(name)) if name == "oak"));
		Ok(())
	}

	#[test]
	fn test_handle_type_maps_to_handle_kind() {
		assert_eq!(HandleKind::from(HandleType::Auto), HandleKind::Auto);
		assert_eq!(HandleKind::from(HandleType::Vector), HandleKind::Vector);
	}
}
