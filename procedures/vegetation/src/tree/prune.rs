use super::child::{ChildPoint, ChildPointSampler};
use super::stem::{AttachmentId, HandleKind, StemArena, StemGrower, StemSpline};
use crate::random::RandomStream;
use crate::shape::{shape_ratio, EnvelopeShape, Shape, SplitError, EPSILON};
use bevy::prelude::*;

/// Search interval width below which the pruning search stops.
pub const PRUNE_TOLERANCE: f32 = 0.005;

/// Search interval width at which the next attempt is the last.
const FINAL_PASS_WIDTH: f32 = 0.01;

/// Points per side of the drawn envelope profile, not counting the apex.
const PROFILE_RESOLUTION: usize = 128;

/// Rotationally symmetric bound on how far the crown may reach.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
	pub shape: EnvelopeShape,
	/// Maximum radius as a fraction of the tree's height.
	pub width: f32,
	/// Fraction of the tree's height below the crown.
	pub base_size: f32,
	pub scale: f32,
}

/// Two polylines tracing the envelope's profile, in the XZ and YZ planes.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeProfile {
	pub x_profile: Vec<Vec3>,
	pub y_profile: Vec<Vec3>,
}

impl Envelope {
	pub fn new(shape: EnvelopeShape, width: f32, base_size: f32, scale: f32) -> Self {
		Self { shape, width, base_size, scale }
	}

	/// Normalized depth below the top of the tree, reaching one at the base of the crown.
	fn depth_ratio(&self, z: f32) -> f32 {
		(self.scale - z) / nonzero(self.scale * (1.0 - self.base_size))
	}

	pub fn radius_at(&self, z: f32) -> f32 {
		self.scale * self.width * shape_ratio(Shape::Envelope, self.depth_ratio(z), &self.shape)
	}

	pub fn contains(&self, point: Vec3) -> bool {
		let radial = point.truncate().length();
		let allowed = self.width * shape_ratio(Shape::Envelope, self.depth_ratio(point.z), &self.shape);
		radial / nonzero(self.scale) < allowed
	}

	/// Traces the envelope from the top of the tree down to the base of the crown.
	pub fn profile(&self) -> EnvelopeProfile {
		let trace = |axis: Vec3| {
			let mut points = Vec::with_capacity(PROFILE_RESOLUTION + 1);
			points.push(Vec3::new(0.0, 0.0, self.scale));
			for c in 0..PROFILE_RESOLUTION {
				let ratio = (c + 1) as f32 / PROFILE_RESOLUTION as f32;
				let z = self.scale - self.scale * (1.0 - self.base_size) * ratio;
				let radius = self.scale * self.width * shape_ratio(Shape::Envelope, ratio, &self.shape);
				points.push(axis * radius + Vec3::Z * z);
			}
			points
		};

		EnvelopeProfile { x_profile: trace(Vec3::X), y_profile: trace(Vec3::Y) }
	}
}

/// How the stems of one branching level grow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSettings {
	pub level: usize,
	pub curve_res: usize,
	/// Total curvature over the stem, in radians.
	pub curve: f32,
	/// Curvature of the second half of the stem, in radians. Zero disables it.
	pub curve_back: f32,
	/// Splits forced at the trunk's second segment.
	pub base_splits: Option<usize>,
	/// Expected splits per segment.
	pub seg_splits: f32,
	pub split_angle: f32,
	pub split_angle_v: f32,
	pub attract_up: f32,
	pub handle: HandleKind,
	/// Whether attachment points are harvested once the stem is final.
	pub sprout: bool,
	/// Bare fraction of the trunk which never sprouts and is exempt from pruning.
	pub base_size: Option<f32>,
}

impl LevelSettings {
	pub fn grower(&self) -> StemGrower {
		StemGrower::new(self.split_angle, self.split_angle_v, self.attract_up, self.handle)
	}

	fn splits_at(&self, segment: usize, split_error: &mut SplitError) -> usize {
		match (segment, self.base_splits) {
			(0, _) => 0,
			(1, Some(base_splits)) => base_splits,
			_ => split_error.number_of_splits(self.seg_splits),
		}
	}
}

/// The finalized geometry of one stem together with everything that split off it.
#[derive(Debug, Clone, PartialEq)]
pub struct PrunedStem {
	pub arena: StemArena,
	pub child_points: Vec<ChildPoint>,
	pub scale: f32,
	pub iterations: u32,
}

/// Fits stems inside an [Envelope] by binary searching a uniform length scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruningEnvelope<'a> {
	envelope: Option<&'a Envelope>,
	prune_ratio: f32,
	max_iterations: u32,
}

impl<'a> PruningEnvelope<'a> {
	pub fn new(envelope: Option<&'a Envelope>, prune_ratio: f32, max_iterations: u32) -> Self {
		Self { envelope, prune_ratio, max_iterations: max_iterations.max(1) }
	}

	/// Grows `stem` and its splits, shrinking them until every tip is inside the envelope.
	pub fn grow(
		&self,
		stem: StemSpline,
		parent: Option<AttachmentId>,
		settings: &LevelSettings,
		split_error: &mut SplitError,
		random: &mut RandomStream,
	) -> PrunedStem {
		let origin = stem;
		let original_length = origin.segment_length;
		let snapshot = random.snapshot();
		let split_snapshot = *split_error;

		let mut current_max = 1.0_f32;
		let mut current_min = 0.0_f32;
		let mut current_scale = 1.0_f32;
		let mut searching = true;
		let mut force_sprout = false;
		let mut iterations = 0;
		let mut grown_scale = current_scale;

		let mut arena = StemArena::new(origin.clone(), parent);
		let mut child_points = Vec::new();

		while searching && (current_max - current_min) > PRUNE_TOLERANCE {
			iterations += 1;
			random.restore(&snapshot);
			*split_error = split_snapshot;

			if (current_max - current_min) < FINAL_PASS_WIDTH {
				current_scale = (current_scale - 1.0) * self.prune_ratio + 1.0;
				searching = false;
				force_sprout = true;
			} else if iterations >= self.max_iterations {
				log::warn!(
					"Pruning stem {} at level {} stopped after {} iterations at scale {}",
					origin.id,
					settings.level,
					iterations,
					current_scale
				);
				searching = false;
				force_sprout = true;
			}

			// every attempt regrows from the saved origin
			grown_scale = current_scale;
			let mut fresh = origin.clone();
			fresh.segment_length = original_length * grown_scale;
			arena = StemArena::new(fresh, parent);
			self.grow_segments(&mut arena, settings, split_error, random);

			let mut inside = true;
			if let Some(envelope) = self.envelope {
				let exempt_below = settings.base_size.map(|base_size| base_size * envelope.scale);
				for tip in arena.tips() {
					if exempt_below.is_some_and(|height| tip.z < height) {
						continue;
					}
					if !envelope.contains(tip) {
						current_max = current_scale;
						current_scale = 0.5 * (current_max + current_min);
						inside = false;
						break;
					}
				}

				if inside && current_scale != 1.0 {
					current_min = current_scale;
					current_scale = 0.5 * (current_max + current_min);
				}
				if inside && (current_max - current_min) == 1.0 {
					current_min = 1.0;
				}
			}

			log::debug!(
				"Pruning stem {} pass {}: scale {} in [{}, {}]",
				origin.id,
				iterations,
				current_scale,
				current_min,
				current_max
			);

			let converged = (current_max - current_min) <= PRUNE_TOLERANCE;
			if converged || self.envelope.is_none() || force_sprout {
				if settings.sprout {
					child_points = self.sample(&arena, settings);
				}
				searching = false;
			}
		}

		PrunedStem { arena, child_points, scale: grown_scale, iterations }
	}

	/// Grows every segment of the arena's stem, splitting as it goes.
	fn grow_segments(
		&self,
		arena: &mut StemArena,
		settings: &LevelSettings,
		split_error: &mut SplitError,
		random: &mut RandomStream,
	) {
		let grower = settings.grower();
		let midpoint = settings.curve_res / 2;
		let curve_back =
			(-2.0 * settings.curve + 2.0 * settings.curve_back) / settings.curve_res.max(1) as f32;

		let mut live = vec![0];
		for segment in 0..settings.curve_res {
			let mut continuing = Vec::with_capacity(live.len());
			let mut spawned = Vec::new();

			for &index in &live {
				let splits = settings.splits_at(segment, split_error);
				if segment == midpoint && settings.curve_back != 0.0 {
					arena.stems[index].add_curvature(curve_back);
				}

				spawned.extend(grower.grow(arena, index, splits, random));
				if !arena.stems[index].is_complete() {
					continuing.push(index);
				}
			}

			continuing.extend(spawned);
			live = continuing;
		}
	}

	fn sample(&self, arena: &StemArena, settings: &LevelSettings) -> Vec<ChildPoint> {
		let children = arena.stems.first().map_or(0.0, |stem| stem.children);
		let mut sampler = ChildPointSampler::new(&arena.stems, children);
		if let Some(base_size) = settings.base_size {
			sampler = sampler.trim_base(base_size);
		}
		sampler.sample_all(&arena.stems)
	}
}

fn nonzero(value: f32) -> f32 {
	if value.abs() < EPSILON {
		EPSILON
	} else {
		value
	}
}
