use super::{track_quat, AttachmentId, ControlPoint, HandleKind, StemArena, StemSpline};
use crate::random::RandomStream;
use crate::shape;
use bevy::prelude::*;
use std::f32::consts::PI;

/// Grows stems one segment at a time, splitting them when asked to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StemGrower {
	/// Divergence of split stems, in radians.
	pub split_angle: f32,
	pub split_angle_v: f32,
	/// Strength of the pull toward (or, when negative, away from) vertical.
	pub attract_up: f32,
	pub handle: HandleKind,
}

impl StemGrower {
	pub fn new(split_angle: f32, split_angle_v: f32, attract_up: f32, handle: HandleKind) -> Self {
		Self { split_angle, split_angle_v, attract_up, handle }
	}

	/// Grows the stem at `index` by exactly one segment, first splitting off `splits` new stems.
	///
	/// New stems are appended to the arena. Returns the indices of the new stems that still have
	/// segments left to grow, in creation order.
	pub fn grow(
		&self,
		arena: &mut StemArena,
		index: usize,
		splits: usize,
		random: &mut RandomStream,
	) -> Vec<usize> {
		let orientation = arena.stems[index].orientation();
		let mut spawned = Vec::new();

		let direction = if splits > 0 {
			let declination = shape::declination(orientation);

			for i in 0..splits {
				let stem = &arena.stems[index];
				let angle =
					shape::split_angle(self.split_angle, self.split_angle_v, declination, random);
				let bend = angle + stem.curvature + random.uniform(-stem.curvature_v, stem.curvature_v);

				// fan the siblings evenly about the parent's axis
				let fan = 2.0 * i as f32 * PI / (splits + 1) as f32;
				let direction =
					orientation * (Quat::from_rotation_z(fan) * (Quat::from_rotation_x(bend) * Vec3::Z));
				let direction = self.spread(direction, random);
				let direction = self.attract(direction, stem.segment_max);

				let split = self.split_from(stem, angle, direction, arena.next_id());
				let parent = AttachmentId {
					stem: stem.id,
					segment: stem.points.len().saturating_sub(2),
				};
				let keeps_growing = !split.is_complete();
				let split_index = arena.push(split, parent);
				if keeps_growing {
					spawned.push(split_index);
				}
			}

			let stem = &arena.stems[index];
			let angle = shape::split_angle(self.split_angle, self.split_angle_v, declination, random);
			let bend = -angle + stem.curvature + random.uniform(-stem.curvature_v, stem.curvature_v);
			self.spread(orientation * (Quat::from_rotation_x(bend) * Vec3::Z), random)
		} else {
			let stem = &arena.stems[index];
			let bend = stem.curvature + random.uniform(-stem.curvature_v, stem.curvature_v);
			orientation * (Quat::from_rotation_x(bend) * Vec3::Z)
		};

		let stem = &mut arena.stems[index];
		let direction = self.attract(direction, stem.segment_max);
		let end = stem.tip().co + direction * stem.segment_length;
		stem.push_segment(end, self.handle);

		// smooth handles need neighbours on both sides
		if splits > 0 {
			stem.pin_sharp(stem.points.len() - 2);
		}
		if stem.points.len() == 2 {
			stem.pin_sharp(0);
		}

		spawned
	}

	fn split_from(&self, stem: &StemSpline, angle: f32, direction: Vec3, id: usize) -> StemSpline {
		let start = stem.tip().co;
		let remaining = stem.segment_max.saturating_sub(stem.segment).max(1) as f32;

		let mut split = StemSpline {
			id,
			points: vec![ControlPoint::new(start, stem.radius_at(stem.segment), HandleKind::Vector)],
			curvature: stem.curvature - angle / remaining,
			curvature_v: stem.curvature_v,
			segment: stem.segment,
			segment_max: stem.segment_max,
			segment_length: stem.segment_length,
			children: stem.children,
			start_radius: stem.start_radius,
			end_radius: stem.end_radius,
		};
		split.push_segment(start + direction * stem.segment_length, self.handle);
		split.pin_sharp(0);
		split
	}

	/// Random azimuthal spread, wider for stems far from horizontal.
	fn spread(&self, direction: Vec3, random: &mut RandomStream) -> Vec3 {
		let declination = direction.normalize_or_zero().z.clamp(-1.0, 1.0).acos();
		Quat::from_rotation_z(shape::spread_angle(declination, random)) * direction
	}

	/// Rotates `direction` toward vertical in proportion to the attraction and the segment budget.
	fn attract(&self, direction: Vec3, segment_max: usize) -> Vec3 {
		let direction = direction.normalize_or_zero();
		let orientation = track_quat(direction);
		let declination = shape::declination(orientation);

		// never rotate past straight up or straight down
		let angle = shape::curve_up(self.attract_up, orientation, segment_max)
			.clamp(declination - PI, declination);

		let axis = direction.cross(Vec3::Z);
		if angle == 0.0 || axis.length_squared() < 1e-12 {
			return direction;
		}
		(Quat::from_axis_angle(axis.normalize(), angle) * direction).normalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn straight_stem(segment_max: usize, direction: Vec3) -> StemSpline {
		StemSpline::new(
			ControlPoint::directed(Vec3::ZERO, direction, 1.0),
			0.0,
			0.0,
			segment_max,
			1.0,
			0.0,
			1.0,
			0.5,
		)
	}

	#[test]
	fn test_grows_one_segment() {
		let grower = StemGrower::new(0.0, 0.0, 0.0, HandleKind::Auto);
		let mut arena = StemArena::new(straight_stem(3, Vec3::Z), None);
		let mut random = RandomStream::new(1);

		let spawned = grower.grow(&mut arena, 0, 0, &mut random);

		assert!(spawned.is_empty());
		assert_eq!(arena.len(), 1);
		assert_eq!(arena.stems[0].segment, 1);
		assert_eq!(arena.stems[0].points[0].handle, HandleKind::Vector);
		assert!((arena.stems[0].tip().co - Vec3::Z).length() < 1e-5);
	}

	#[test]
	fn test_splits_append_stems() {
		let grower = StemGrower::new(0.5, 0.1, 0.0, HandleKind::Auto);
		let mut arena = StemArena::new(straight_stem(4, Vec3::Z).with_id(10), None);
		let mut random = RandomStream::new(2);

		grower.grow(&mut arena, 0, 0, &mut random);
		let spawned = grower.grow(&mut arena, 0, 2, &mut random);

		assert_eq!(spawned, vec![1, 2]);
		assert_eq!(arena.len(), 3);
		for (split, parent) in arena.stems[1..].iter().zip(&arena.parents[1..]) {
			assert_eq!(split.segment, 2);
			assert_eq!(split.points.len(), 2);
			assert_eq!(split.points[0].co, arena.stems[0].points[1].co);
			assert_eq!(*parent, Some(AttachmentId { stem: 10, segment: 0 }));
		}
		assert_eq!(arena.stems[1].id, 11);
		assert_eq!(arena.stems[2].id, 12);

		// the split point loses its smooth handles
		assert_eq!(arena.stems[0].points[1].handle, HandleKind::Vector);
	}

	#[test]
	fn test_capped_splits_stop_growing() {
		let grower = StemGrower::new(0.5, 0.0, 0.0, HandleKind::Vector);
		let mut arena = StemArena::new(straight_stem(2, Vec3::Z), None);
		let mut random = RandomStream::new(3);

		grower.grow(&mut arena, 0, 0, &mut random);
		let spawned = grower.grow(&mut arena, 0, 1, &mut random);

		assert!(spawned.is_empty());
		assert_eq!(arena.len(), 2);
		assert!(arena.stems.iter().all(StemSpline::is_complete));
	}

	#[test]
	fn test_attraction_pulls_toward_vertical() {
		let grower = StemGrower::new(0.0, 0.0, 2.0, HandleKind::Auto);
		let sideways = Vec3::new(1.0, 0.0, 0.2).normalize();
		let attracted = grower.attract(sideways, 2);
		assert!(attracted.z > sideways.z);

		let drooping = StemGrower::new(0.0, 0.0, -2.0, HandleKind::Auto).attract(sideways, 2);
		assert!(drooping.z < sideways.z);

		// vertical stays vertical
		assert!((grower.attract(Vec3::Z, 2) - Vec3::Z).length() < 1e-6);
	}

	#[test]
	fn test_same_stream_same_growth() {
		let grower = StemGrower::new(0.6, 0.3, 0.5, HandleKind::Auto);
		let grow = || {
			let mut stem = straight_stem(5, Vec3::new(0.3, 0.0, 1.0));
			stem.curvature_v = 0.4;
			let mut arena = StemArena::new(stem, None);
			let mut random = RandomStream::new(99);
			for splits in [0, 1, 0, 2, 0] {
				grower.grow(&mut arena, 0, splits, &mut random);
			}
			arena
		};

		assert_eq!(grow(), grow());
	}

	#[test]
	fn test_attraction_ignores_bearing() {
		let grower = StemGrower::new(0.0, 0.0, 2.0, HandleKind::Auto);
		let flat = (1.0_f32 - 0.3 * 0.3).sqrt();
		let east = Vec3::new(flat, 0.0, 0.3);
		let north_east = Vec3::new(flat / 2.0_f32.sqrt(), flat / 2.0_f32.sqrt(), 0.3);

		let east_raised = grower.attract(east, 4).z - east.z;
		let north_east_raised = grower.attract(north_east, 4).z - north_east.z;

		assert!(east_raised > 0.1);
		assert!((east_raised - north_east_raised).abs() < 1e-4);
	}

	#[test]
	fn test_single_split_forks_away_from_parent() {
		let split_angle = 40.0_f32.to_radians();
		let grower = StemGrower::new(split_angle, 0.0, 0.0, HandleKind::Auto);
		let mut arena = StemArena::new(straight_stem(3, Vec3::Z), None);
		let mut random = RandomStream::new(5);

		grower.grow(&mut arena, 0, 0, &mut random);
		let before_split = random.snapshot();
		grower.grow(&mut arena, 0, 1, &mut random);

		// replay the stream to undo the random spread of both stems
		let mut replay = RandomStream::new(0);
		replay.restore(&before_split);
		let direction = |stem: &StemSpline| {
			let count = stem.points.len();
			stem.points[count - 1].co - stem.points[count - 2].co
		};
		let split = direction(&arena.stems[1]);
		let parent = direction(&arena.stems[0]);

		replay.random();
		replay.random();
		let split_spread = shape::spread_angle(split.z.acos(), &mut replay);
		replay.random();
		replay.random();
		let parent_spread = shape::spread_angle(parent.z.acos(), &mut replay);

		let split_bearing = split.y.atan2(split.x) - split_spread;
		let parent_bearing = parent.y.atan2(parent.x) - parent_spread;
		let apart = (split_bearing - parent_bearing).rem_euclid(2.0 * PI);
		assert!((apart - PI).abs() < 1e-3, "split and parent {} apart", apart);

		assert!((split.z - split_angle.cos()).abs() < 1e-4);
		assert!((parent.z - split_angle.cos()).abs() < 1e-4);
	}
}
