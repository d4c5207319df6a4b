pub mod child;
pub mod leaf;
pub mod prune;
pub mod stem;

use crate::params::{ParameterError, Parameters};
use crate::random::RandomStream;
use crate::shape::{self, SplitError, EPSILON};
use bevy::prelude::*;
use child::ChildPoint;
use leaf::{LeafMesh, LeafPlacer};
use prune::{Envelope, EnvelopeProfile, LevelSettings, PrunedStem, PruningEnvelope};
use stem::{AttachmentId, ControlPoint, StemSpline};

/// One finished stem of a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StemRecord {
	pub id: usize,
	pub level: usize,
	pub points: Vec<ControlPoint>,
	/// Where this stem grows out of its parent. Only the trunk has none.
	pub parent: Option<AttachmentId>,
	pub start_radius: f32,
	pub end_radius: f32,
}

/// The skeleton and foliage of a generated tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
	pub stems: Vec<StemRecord>,
	pub leaves: LeafMesh,
	/// Outline of the pruning envelope, when pruning was enabled.
	pub envelope: Option<EnvelopeProfile>,
	/// Stems grown at each branching level, splits included.
	pub level_stem_counts: Vec<usize>,
	/// Attachment points harvested from each branching level.
	pub level_child_points: Vec<usize>,
	pub scale: f32,
}

impl Tree {
	pub fn stem_count(&self) -> usize {
		self.stems.len()
	}

	pub fn control_point_count(&self) -> usize {
		self.stems.iter().map(|stem| stem.points.len()).sum()
	}

	pub fn leaf_count(&self) -> usize {
		self.leaves.leaf_count()
	}

	pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
		self.stems
			.iter()
			.flat_map(|stem| stem.points.iter().map(|point| point.co))
			.chain(self.leaves.vertices.iter().copied())
			.fold(None, |bounds, co| match bounds {
				None => Some((co, co)),
				Some((min, max)) => Some((min.min(co), max.max(co))),
			})
	}
}

/// Grows whole trees from a validated [Parameters] set.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeGrower {
	params: Parameters,
}

impl TreeGrower {
	pub fn new(params: Parameters) -> Result<Self, ParameterError> {
		params.validate()?;
		Ok(Self { params })
	}

	pub fn params(&self) -> &Parameters {
		&self.params
	}

	/// Grows the tree.
	///
	/// The same parameters always produce the same tree: every random decision is drawn from one
	/// stream seeded by [Parameters::seed], in a fixed order.
	pub fn grow(&self) -> Tree {
		let params = &self.params;
		let mut random = RandomStream::new(params.seed);

		let scale = params.scale + random.uniform(-params.scale_v, params.scale_v);
		let envelope = params
			.prune
			.then(|| Envelope::new(params.envelope_shape(), params.prune_width, params.base_size, scale));
		let pruner =
			PruningEnvelope::new(envelope.as_ref(), params.prune_ratio, params.max_prune_iterations);

		let mut stems = Vec::new();
		let mut level_stem_counts = Vec::with_capacity(params.levels);
		let mut level_child_points = Vec::with_capacity(params.levels);
		let mut child_points: Vec<ChildPoint> = Vec::new();

		for level in 0..params.levels {
			let settings = self.level_settings(level);
			let mut split_error = SplitError::new();
			let mut harvested = Vec::new();
			let first = stems.len();

			log::info!("Growing level {} from {} attachment points", level, child_points.len());

			if level == 0 {
				let trunk = self.trunk(scale, &mut random);
				let pruned = pruner.grow(trunk, None, &settings, &mut split_error, &mut random);
				harvested.extend(record(&mut stems, level, pruned));
			} else {
				let mut rotation = 0.0;
				for point in &child_points {
					let Some(branch) = self.branch(level, point, scale, &mut rotation, &mut random)
					else {
						continue;
					};

					let branch = branch.with_id(stems.len());
					let pruned = pruner.grow(
						branch,
						Some(point.attachment),
						&settings,
						&mut split_error,
						&mut random,
					);
					harvested.extend(record(&mut stems, level, pruned));
				}
			}

			log::info!(
				"Level {} grew {} stems and {} attachment points",
				level,
				stems.len() - first,
				harvested.len()
			);
			level_stem_counts.push(stems.len() - first);
			level_child_points.push(harvested.len());
			child_points = harvested;
		}

		let leaves = if params.grows_leaves() {
			let leaves = self.leaf_placer().place_all(&child_points, &mut random);
			log::info!("Placed {} leaves", leaves.leaf_count());
			leaves
		} else {
			LeafMesh::new(params.leaf_shape)
		};

		Tree {
			stems,
			leaves,
			envelope: envelope.map(|envelope| envelope.profile()),
			level_stem_counts,
			level_child_points,
			scale,
		}
	}

	fn level_settings(&self, level: usize) -> LevelSettings {
		let params = &self.params;
		let trunk = level == 0;
		let last = level + 1 == params.levels;

		LevelSettings {
			level,
			curve_res: params.curve_res[level],
			curve: params.curve[level].to_radians(),
			curve_back: params.curve_back[level].to_radians(),
			base_splits: trunk.then_some(params.base_splits as usize),
			seg_splits: params.seg_splits[level],
			split_angle: params.split_angle[level].to_radians(),
			split_angle_v: params.split_angle_v[level].to_radians(),
			// the trunk grows straight up and is left alone
			attract_up: if trunk { 0.0 } else { params.attract_up },
			handle: params.handle_type.into(),
			sprout: !last || params.grows_leaves(),
			base_size: trunk.then_some(params.base_size),
		}
	}

	/// The expected children of a stem at `level` which is `length` long.
	fn children(&self, level: usize, length: f32, length_max: f32, point: &ChildPoint) -> f32 {
		let params = &self.params;
		if level + 1 == params.levels {
			return if params.leaves > 0 {
				let ratio = shape::unit_ratio(point.offset, point.parent_length);
				params.leaves as f32 * shape::shape_ratio(params.leaf_dist, ratio, &params.envelope_shape())
			} else {
				0.0
			};
		}

		let branches = params.branches[level + 1] as f32;
		if level == 1 {
			shape::number_of_first_child_stems(branches, length, point.parent_length, length_max)
		} else {
			shape::number_of_child_stems(branches, point.offset, point.parent_length)
		}
	}

	fn curvature(&self, level: usize) -> (f32, f32) {
		let params = &self.params;
		let resolution = params.curve_res[level] as f32;
		let curve = params.curve[level].to_radians();
		let curve = if params.curve_back[level] != 0.0 { 2.0 * curve } else { curve };
		(curve / resolution, params.curve_v[level].to_radians() / resolution)
	}

	fn trunk(&self, scale: f32, random: &mut RandomStream) -> StemSpline {
		let params = &self.params;
		let length = scale * (params.length[0] + random.uniform(-params.length_v[0], params.length_v[0]));
		let start_radius =
			length * params.ratio * (params.scale0 + random.uniform(-params.scale_v0, params.scale_v0));
		let end_radius = start_radius * (1.0 - params.taper[0]);

		// a single level tree sprouts only its leaf cluster
		let children = if params.levels > 1 { params.branches[1] as f32 } else { 0.0 };
		let (curvature, curvature_v) = self.curvature(0);
		let resolution = params.curve_res[0];

		StemSpline::new(
			ControlPoint::directed(Vec3::ZERO, Vec3::Z, start_radius),
			curvature,
			curvature_v,
			resolution,
			length / resolution as f32,
			children,
			start_radius,
			end_radius,
		)
	}

	/// A stem sprouting from `point`, or nothing if it would have no length.
	fn branch(
		&self,
		level: usize,
		point: &ChildPoint,
		scale: f32,
		rotation: &mut f32,
		random: &mut RandomStream,
	) -> Option<StemSpline> {
		let params = &self.params;
		let envelope_shape = params.envelope_shape();
		let base_length = if level == 1 { params.base_size * scale } else { 0.0 };

		let down = shape::down_angle(
			params.down_angle[level].to_radians(),
			params.down_angle_v[level].to_radians(),
			point.parent_length,
			point.offset,
			base_length,
			&envelope_shape,
			random,
		);

		let rotate = params.rotate[level].to_radians();
		let rotate_v = params.rotate_v[level].to_radians();
		*rotation = if rotate >= 0.0 {
			*rotation + rotate + random.uniform(-rotate_v, rotate_v)
		} else {
			// alternate between two sides of the parent
			-(rotate.abs() + random.uniform(-rotate_v, rotate_v)).copysign(*rotation)
		};

		let length_max = params.length[level] + random.uniform(-params.length_v[level], params.length_v[level]);
		let length = if level == 1 {
			shape::length_of_first_child(
				length_max,
				point.offset,
				point.parent_length,
				base_length,
				params.shape,
				&envelope_shape,
			)
		} else {
			shape::length_of_child(length_max, point.offset, point.parent_length)
		};
		if !length.is_finite() || length <= EPSILON {
			log::debug!("Skipping a zero length stem at {}", point.attachment);
			return None;
		}

		let relative = length / point.parent_length.max(EPSILON);
		let start_radius = (point.parent_radius * relative.powf(params.ratio_power)).min(point.local_radius);
		let end_radius = start_radius * (1.0 - params.taper[level]);

		let direction = point.orientation
			* (Quat::from_rotation_z(*rotation) * (Quat::from_rotation_x(down) * Vec3::Z));
		let (curvature, curvature_v) = self.curvature(level);
		let resolution = params.curve_res[level];

		Some(StemSpline::new(
			ControlPoint::directed(point.co, direction, start_radius),
			curvature,
			curvature_v,
			resolution,
			length / resolution as f32,
			self.children(level, length, length_max, point),
			start_radius,
			end_radius,
		))
	}

	fn leaf_placer(&self) -> LeafPlacer {
		let params = &self.params;
		let level = params.leaf_level();
		LeafPlacer::new(params.leaf_shape, params.leaf_scale, params.leaf_scale_x, params.leaves)
			.with_down_angle(params.down_angle[level].to_radians(), params.down_angle_v[level].to_radians())
			.with_rotate(params.rotate[level].to_radians(), params.rotate_v[level].to_radians())
			.with_bend(params.bend)
	}
}

/// Appends the stems of a finished search to the tree and hands back its attachment points.
fn record(stems: &mut Vec<StemRecord>, level: usize, pruned: PrunedStem) -> Vec<ChildPoint> {
	let PrunedStem { arena, child_points, .. } = pruned;
	for (stem, parent) in arena.stems.into_iter().zip(arena.parents) {
		stems.push(StemRecord {
			id: stem.id,
			level,
			points: stem.points,
			parent,
			start_radius: stem.start_radius,
			end_radius: stem.end_radius,
		});
	}
	child_points
}
