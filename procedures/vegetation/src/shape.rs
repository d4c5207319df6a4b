use crate::random::RandomStream;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Keeps denominators away from zero.
pub const EPSILON: f32 = 1e-6;

/// The silhouette family of a tree.
///
/// Maps a normalized position along a parent stem (or height through the crown) to a normalized
/// radius. The discriminants are the stable numeric ids used by parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
	#[default]
	Conical = 0,
	Spherical = 1,
	Hemispherical = 2,
	Cylindrical = 3,
	TaperedCylindrical = 4,
	Flame = 5,
	InverseConical = 6,
	TendFlame = 7,
	/// Driven by the pruning envelope's peak and power parameters.
	Envelope = 8,
}

impl TryFrom<u8> for Shape {
	type Error = u8;

	fn try_from(id: u8) -> Result<Self, Self::Error> {
		Ok(match id {
			0 => Self::Conical,
			1 => Self::Spherical,
			2 => Self::Hemispherical,
			3 => Self::Cylindrical,
			4 => Self::TaperedCylindrical,
			5 => Self::Flame,
			6 => Self::InverseConical,
			7 => Self::TendFlame,
			8 => Self::Envelope,
			other => return Err(other),
		})
	}
}

/// Parameters of the [Shape::Envelope] profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
	/// Fraction of the crown, measured up from its base, at which the envelope is widest.
	pub peak_width: f32,
	pub power_high: f32,
	pub power_low: f32,
}

impl Default for EnvelopeShape {
	fn default() -> Self {
		Self { peak_width: 0.6, power_high: 0.5, power_low: 0.001 }
	}
}

/// Evaluates a shape profile at `ratio`, which callers keep on `[0, 1]`.
pub fn shape_ratio(shape: Shape, ratio: f32, envelope: &EnvelopeShape) -> f32 {
	match shape {
		Shape::Conical => 0.2 + 0.8 * ratio,
		Shape::Spherical => 0.2 + 0.8 * (PI * ratio).sin(),
		Shape::Hemispherical => 0.2 + 0.8 * (0.5 * PI * ratio).sin(),
		Shape::Cylindrical => 1.0,
		Shape::TaperedCylindrical => 0.5 + 0.5 * ratio,
		Shape::Flame => {
			if ratio <= 0.7 {
				ratio / 0.7
			} else {
				(1.0 - ratio) / 0.3
			}
		}
		Shape::InverseConical => 1.0 - 0.8 * ratio,
		Shape::TendFlame => {
			if ratio <= 0.7 {
				0.5 + 0.5 * ratio / 0.7
			} else {
				0.5 + 0.5 * (1.0 - ratio) / 0.3
			}
		}
		Shape::Envelope => {
			let peak = envelope.peak_width.max(EPSILON);
			let knee = 1.0 - peak;
			if ratio > 0.0 && ratio < knee {
				(ratio / knee.max(EPSILON)).powf(envelope.power_high)
			} else if ratio >= knee && ratio < 1.0 {
				((1.0 - ratio) / peak).powf(envelope.power_low)
			} else {
				0.0
			}
		}
	}
}

/// `numerator / denominator` clamped to the unit interval, with the denominator kept off zero.
pub fn unit_ratio(numerator: f32, denominator: f32) -> f32 {
	let denominator = if denominator.abs() < EPSILON { EPSILON } else { denominator };
	(numerator / denominator).clamp(0.0, 1.0)
}

/// The running fractional remainder of split decisions within one branching level.
///
/// Non-integer expected split counts are carried forward so that, over many stems, the realized
/// counts average out to the expectation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitError(f32);

impl SplitError {
	pub fn new() -> Self {
		Self(0.0)
	}

	pub fn remainder(&self) -> f32 {
		self.0
	}

	/// Number of splits to perform for an expected count of `expected`.
	pub fn number_of_splits(&mut self, expected: f32) -> usize {
		let effective = (expected + self.0).round_ties_even();
		self.0 -= effective - expected;
		effective.max(0.0) as usize
	}
}

/// Length of a first-level branch sprouting at `offset` along a trunk of length `parent_length`.
///
/// `base_length` is the bare lower part of the trunk which never sprouts.
pub fn length_of_first_child(
	length_max: f32,
	offset: f32,
	parent_length: f32,
	base_length: f32,
	shape: Shape,
	envelope: &EnvelopeShape,
) -> f32 {
	let ratio = unit_ratio(parent_length - offset, parent_length - base_length);
	parent_length * length_max * shape_ratio(shape, ratio, envelope)
}

pub fn length_of_child(length_max: f32, offset: f32, parent_length: f32) -> f32 {
	length_max * (parent_length - 0.6 * offset)
}

/// Down angle of a child stem, in radians.
///
/// A negative variance selects the shape-driven variant where stems near the parent's base
/// droop more than those near its tip. That variant still consumes one draw so the stream stays
/// aligned with the plain variant.
pub fn down_angle(
	down_angle: f32,
	down_angle_v: f32,
	parent_length: f32,
	offset: f32,
	base_length: f32,
	envelope: &EnvelopeShape,
	random: &mut RandomStream,
) -> f32 {
	if down_angle_v < 0.0 {
		let ratio = unit_ratio(parent_length - offset, parent_length - base_length);
		let variation = down_angle_v * (1.0 - 2.0 * shape_ratio(Shape::Conical, ratio, envelope));
		random.random();
		down_angle + variation
	} else {
		down_angle + random.uniform(-down_angle_v, down_angle_v)
	}
}

/// Expected number of children of a first-level branch.
pub fn number_of_first_child_stems(
	stems_max: f32,
	child_length: f32,
	parent_length: f32,
	child_length_max: f32,
) -> f32 {
	let relative = child_length / parent_length.max(EPSILON);
	stems_max * (0.2 + 0.8 * relative / nonzero(child_length_max))
}

pub fn number_of_child_stems(stems_max: f32, offset: f32, parent_length: f32) -> f32 {
	stems_max * (1.0 - 0.5 * offset / parent_length.max(EPSILON))
}

/// Random spread of a split stem about the vertical, in radians.
///
/// Grows with how far `declination` (radians from vertical) is from horizontal.
pub fn spread_angle(declination: f32, random: &mut RandomStream) -> f32 {
	let sign = random.sign();
	let r = random.random();
	let from_horizontal = (declination.to_degrees() - 90.0).abs();
	(sign * (20.0 + 0.75 * (30.0 + from_horizontal) * r * r)).to_radians()
}

/// Divergence angle of a split, in radians. Stems already leaning away from vertical split less.
pub fn split_angle(
	split_angle: f32,
	split_angle_v: f32,
	declination: f32,
	random: &mut RandomStream,
) -> f32 {
	(split_angle + random.uniform(-split_angle_v, split_angle_v) - declination).max(0.0)
}

pub fn declination(orientation: Quat) -> f32 {
	let direction = (orientation * Vec3::Z).normalize_or_zero();
	direction.z.clamp(-1.0, 1.0).acos()
}

/// Upward rotation applied to a segment by vertical attraction, in radians.
pub fn curve_up(attract_up: f32, orientation: Quat, curve_res: usize) -> f32 {
	let side = (orientation * Vec3::Y).normalize_or_zero();
	attract_up * declination(orientation) * side.z.abs() / (curve_res.max(1) as f32)
}

fn nonzero(value: f32) -> f32 {
	if value.abs() < EPSILON {
		EPSILON.copysign(value)
	} else {
		value
	}
}
