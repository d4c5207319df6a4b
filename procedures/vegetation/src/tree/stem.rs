pub mod bezier;
pub mod grower;

pub use bezier::track_quat;
pub use grower::StemGrower;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the handles of a control point are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandleKind {
	/// Handles were placed explicitly and are left alone.
	Free,
	/// Smooth handles from the neighbouring points.
	#[default]
	Auto,
	/// Sharp handles pointing a third of the way to each neighbour.
	Vector,
}

/// One control point of a stem's piecewise cubic curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
	pub co: Vec3,
	pub handle_left: Vec3,
	pub handle_right: Vec3,
	pub radius: f32,
	pub handle: HandleKind,
}

impl ControlPoint {
	/// A point whose handles will be derived once it has neighbours.
	pub fn new(co: Vec3, radius: f32, handle: HandleKind) -> Self {
		Self { co, handle_left: co, handle_right: co, radius, handle }
	}

	/// A point with explicit handles along `direction`.
	pub fn directed(co: Vec3, direction: Vec3, radius: f32) -> Self {
		Self {
			co,
			handle_left: co - direction,
			handle_right: co + direction,
			radius,
			handle: HandleKind::Free,
		}
	}

	pub fn outgoing(&self) -> Vec3 {
		self.handle_right - self.co
	}
}

/// Names the segment of a stem something is attached to.
///
/// The external rig builds one bone per segment and uses this to parent child bones and to
/// skin leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId {
	pub stem: usize,
	pub segment: usize,
}

impl fmt::Display for AttachmentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "stem{:03}.segment{:03}", self.stem, self.segment)
	}
}

/// The growth state of one stem.
#[derive(Debug, Clone, PartialEq)]
pub struct StemSpline {
	/// Index of this stem in the finished tree.
	pub id: usize,
	pub points: Vec<ControlPoint>,
	/// Rotation per segment, in radians.
	pub curvature: f32,
	pub curvature_v: f32,
	/// Segments grown so far, counted against `segment_max`.
	pub segment: usize,
	pub segment_max: usize,
	pub segment_length: f32,
	/// Expected number of child stems (or leaves) this stem sprouts.
	pub children: f32,
	pub start_radius: f32,
	pub end_radius: f32,
}

impl StemSpline {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		origin: ControlPoint,
		curvature: f32,
		curvature_v: f32,
		segment_max: usize,
		segment_length: f32,
		children: f32,
		start_radius: f32,
		end_radius: f32,
	) -> Self {
		Self {
			id: 0,
			points: vec![origin],
			curvature,
			curvature_v,
			segment: 0,
			segment_max,
			segment_length,
			children,
			start_radius,
			end_radius,
		}
	}

	pub fn with_id(mut self, id: usize) -> Self {
		self.id = id;
		self
	}

	pub fn tip(&self) -> &ControlPoint {
		// a stem is never built without its origin point
		&self.points[self.points.len() - 1]
	}

	/// Orientation of the growing end, tracking +Z along the last segment.
	pub fn orientation(&self) -> Quat {
		let direction = match self.points.as_slice() {
			[.., before, last] => last.co - before.co,
			[only] => only.outgoing(),
			[] => Vec3::Z,
		};
		track_quat(direction.normalize_or_zero())
	}

	/// Radius after `segment` segments, tapering linearly from start to end.
	pub fn radius_at(&self, segment: usize) -> f32 {
		let fraction = segment as f32 / self.segment_max.max(1) as f32;
		self.start_radius * (1.0 - fraction) + self.end_radius * fraction
	}

	pub fn length(&self) -> f32 {
		self.segment_max as f32 * self.segment_length
	}

	pub fn is_complete(&self) -> bool {
		self.segment >= self.segment_max
	}

	pub fn add_curvature(&mut self, delta: f32) {
		self.curvature += delta;
	}

	pub fn push_segment(&mut self, co: Vec3, handle: HandleKind) {
		let radius = self.radius_at(self.segment + 1);
		self.points.push(ControlPoint::new(co, radius, handle));
		self.segment += 1;
		self.recalculate_handles();
	}

	pub fn pin_sharp(&mut self, index: usize) {
		if let Some(point) = self.points.get_mut(index) {
			point.handle = HandleKind::Vector;
		}
		self.recalculate_handles();
	}

	/// Rederives every non-free handle from the current neighbours.
	pub fn recalculate_handles(&mut self) {
		let count = self.points.len();
		if count < 2 {
			return;
		}

		for index in 0..count {
			let current = self.points[index].co;
			let (previous, next) = match (index.checked_sub(1), self.points.get(index + 1)) {
				(Some(before), Some(after)) => (self.points[before].co, after.co),
				(Some(before), None) => {
					let previous = self.points[before].co;
					(previous, 2.0 * current - previous)
				}
				(None, Some(after)) => (2.0 * current - after.co, after.co),
				(None, None) => continue,
			};

			let point = &mut self.points[index];
			match point.handle {
				HandleKind::Free => {}
				HandleKind::Vector => {
					point.handle_left = current + (previous - current) / 3.0;
					point.handle_right = current + (next - current) / 3.0;
				}
				HandleKind::Auto => {
					let (left, right) = auto_handles(previous, current, next);
					point.handle_left = left;
					point.handle_right = right;
				}
			}
		}
	}
}

/// Smooth handles bisecting the directions to either neighbour.
fn auto_handles(previous: Vec3, current: Vec3, next: Vec3) -> (Vec3, Vec3) {
	let incoming = current - previous;
	let outgoing = next - current;
	let mut incoming_length = incoming.length();
	let mut outgoing_length = outgoing.length();
	if incoming_length == 0.0 {
		incoming_length = 1.0;
	}
	if outgoing_length == 0.0 {
		outgoing_length = 1.0;
	}

	let tangent = outgoing / outgoing_length + incoming / incoming_length;
	let length = tangent.length() * 2.5614;
	if length == 0.0 {
		return (current, current);
	}

	(
		current - tangent * (incoming_length / length),
		current + tangent * (outgoing_length / length),
	)
}

/// The stems of one pruning attempt, keyed by index.
///
/// Index zero is the stem the attempt started from; splits are appended behind it. Stem ids
/// continue from `base_id` so they match the stems' final positions in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StemArena {
	pub base_id: usize,
	pub stems: Vec<StemSpline>,
	pub parents: Vec<Option<AttachmentId>>,
}

impl StemArena {
	pub fn new(stem: StemSpline, parent: Option<AttachmentId>) -> Self {
		Self { base_id: stem.id, stems: vec![stem], parents: vec![parent] }
	}

	pub fn next_id(&self) -> usize {
		self.base_id + self.stems.len()
	}

	pub fn push(&mut self, stem: StemSpline, parent: AttachmentId) -> usize {
		self.stems.push(stem);
		self.parents.push(Some(parent));
		self.stems.len() - 1
	}

	pub fn len(&self) -> usize {
		self.stems.len()
	}

	pub fn is_empty(&self) -> bool {
		self.stems.is_empty()
	}

	pub fn tips(&self) -> impl Iterator<Item = Vec3> + '_ {
		self.stems.iter().map(|stem| stem.tip().co)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn vertical_stem() -> StemSpline {
		StemSpline::new(ControlPoint::directed(Vec3::ZERO, Vec3::Z, 1.0), 0.0, 0.0, 4, 1.0, 0.0, 1.0, 0.0)
	}

	#[test]
	fn test_attachment_display() {
		let id = AttachmentId { stem: 3, segment: 12 };
		assert_eq!(id.to_string(), "stem003.segment012");
	}

	#[test]
	fn test_radius_taper() {
		let stem = vertical_stem();
		assert_eq!(stem.radius_at(0), 1.0);
		assert!((stem.radius_at(2) - 0.5).abs() < 1e-6);
		assert_eq!(stem.radius_at(4), 0.0);
	}

	#[test]
	fn test_push_segment_advances() {
		let mut stem = vertical_stem();
		stem.push_segment(Vec3::Z, HandleKind::Auto);
		stem.pin_sharp(0);

		assert_eq!(stem.segment, 1);
		assert_eq!(stem.points.len(), 2);
		assert!((stem.tip().radius - 0.75).abs() < 1e-6);
		assert!(!stem.is_complete());

		// sharp handles sit a third of the way along the segment
		assert!((stem.points[0].handle_right - Vec3::new(0.0, 0.0, 1.0 / 3.0)).length() < 1e-6);
	}

	#[test]
	fn test_auto_handles_follow_straight_line() {
		let mut stem = vertical_stem();
		for i in 1..=3 {
			stem.push_segment(Vec3::Z * i as f32, HandleKind::Auto);
		}
		stem.pin_sharp(0);

		for point in &stem.points[1..] {
			let left = point.handle_left - point.co;
			let right = point.handle_right - point.co;
			assert!(left.x.abs() < 1e-6 && left.y.abs() < 1e-6 && left.z < 0.0);
			assert!(right.x.abs() < 1e-6 && right.y.abs() < 1e-6 && right.z > 0.0);
		}
	}

	#[test]
	fn test_orientation_tracks_last_segment() {
		let mut stem = vertical_stem();
		assert!((stem.orientation() * Vec3::Z - Vec3::Z).length() < 1e-5);

		stem.push_segment(Vec3::X, HandleKind::Vector);
		assert!((stem.orientation() * Vec3::Z - Vec3::X).length() < 1e-5);
	}

	#[test]
	fn test_arena_ids_continue_from_base() {
		let mut arena = StemArena::new(vertical_stem().with_id(7), None);
		assert_eq!(arena.next_id(), 8);

		let split = vertical_stem().with_id(arena.next_id());
		let index = arena.push(split, AttachmentId { stem: 7, segment: 0 });

		assert_eq!(index, 1);
		assert_eq!(arena.stems[index].id, 8);
		assert_eq!(arena.parents[index], Some(AttachmentId { stem: 7, segment: 0 }));
	}
}
