use super::stem::{
	bezier::{eval_bezier, eval_bezier_tangent},
	track_quat, AttachmentId, StemSpline,
};
use bevy::prelude::*;

/// Parametric position of the single attachment forced onto stems that expect no children.
pub const TIP_SPROUT: f32 = 0.9;

/// Where a child stem or leaf grows out of a finished stem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildPoint {
	pub co: Vec3,
	pub orientation: Quat,
	pub parent_radius: f32,
	pub local_radius: f32,
	pub offset: f32,
	pub parent_length: f32,
	pub attachment: AttachmentId,
	/// Forced onto the tip of a stem that expected no children.
	pub tip: bool,
}

/// Samples attachment points along the stems of one finished branching level.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildPointSampler {
	t_values: Vec<f32>,
	tip: bool,
}

impl ChildPointSampler {
	/// Spreads `children` points over the segment budget of `stems`.
	///
	/// The first stem is the main one; its segment cap sets how many evenly spaced parameters are
	/// generated. Stems that expect no children get a single tip attachment instead.
	pub fn new(stems: &[StemSpline], children: f32) -> Self {
		if children == 0.0 {
			return Self { t_values: vec![TIP_SPROUT], tip: true };
		}

		let Some(main) = stems.first() else {
			return Self { t_values: Vec::new(), tip: false };
		};

		let points: usize = stems.iter().map(|stem| stem.points.len()).sum();
		let segments = points.saturating_sub(stems.len());
		if segments == 0 {
			return Self { t_values: Vec::new(), tip: false };
		}

		let per_segment = children / segments as f32;
		let count = (per_segment * main.segment_max as f32).round_ties_even().max(0.0) as usize;
		let t_values = (0..count).map(|a| (a + 1) as f32 / count as f32).collect();

		Self { t_values, tip: false }
	}

	pub fn t_values(&self) -> &[f32] {
		&self.t_values
	}

	/// Drops the parameters that fall inside the bare base of a trunk.
	pub fn trim_base(mut self, base_size: f32) -> Self {
		let trim = (base_size * (self.t_values.len() + 1) as f32) as usize;
		self.t_values.drain(..trim.min(self.t_values.len()));
		self
	}

	/// Attachment points along `stem`, for the parameters that fall within the part it grew.
	pub fn sample(&self, stem: &StemSpline) -> Vec<ChildPoint> {
		let points = &stem.points;
		let count = points.len();
		let (Some(&last_t), true) = (self.t_values.last(), count >= 2) else {
			return Vec::new();
		};

		let segment_max = stem.segment_max.max(1) as f32;
		// split stems only cover the tail end of the main stem's parameter range
		let check = (segment_max - count as f32 + 1.0) / segment_max;
		let parent_length = stem.length();

		let mut sampled = Vec::new();
		for &t in &self.t_values {
			if t < check || t >= 1.0 {
				continue;
			}

			let (co, orientation, local_radius, segment) = if t >= last_t {
				let last = &points[count - 1];
				(last.co, track_quat(last.outgoing()), stem.start_radius, count - 2)
			} else {
				let position = (t - check) * segment_max;
				let index = (position as usize).min(count - 2);
				let local = (position - index as f32).clamp(0.0, 1.0);
				let (a, b) = (&points[index], &points[index + 1]);

				let co = eval_bezier(a.co, a.handle_right, b.handle_left, b.co, local);
				let tangent = eval_bezier_tangent(a.co, a.handle_right, b.handle_left, b.co, local);
				let radius = (1.0 - local) * a.radius + local * b.radius;
				(co, track_quat(tangent), radius, index)
			};

			sampled.push(ChildPoint {
				co,
				orientation,
				parent_radius: stem.start_radius,
				local_radius,
				offset: t * parent_length,
				parent_length,
				attachment: AttachmentId { stem: stem.id, segment },
				tip: self.tip,
			});
		}

		sampled
	}

	pub fn sample_all(&self, stems: &[StemSpline]) -> Vec<ChildPoint> {
		stems.iter().flat_map(|stem| self.sample(stem)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::stem::{ControlPoint, HandleKind};

	fn straight_stem(segment_max: usize, children: f32) -> StemSpline {
		let mut stem = StemSpline::new(
			ControlPoint::directed(Vec3::ZERO, Vec3::Z, 1.0),
			0.0,
			0.0,
			segment_max,
			1.0,
			children,
			1.0,
			0.0,
		);
		for i in 1..=segment_max {
			stem.push_segment(Vec3::Z * i as f32, HandleKind::Vector);
		}
		stem.pin_sharp(0);
		stem
	}

	#[test]
	fn test_even_distribution() {
		let stem = straight_stem(4, 8.0);
		let sampler = ChildPointSampler::new(std::slice::from_ref(&stem), 8.0);
		assert_eq!(sampler.t_values(), &[0.125, 0.25, 0.375, 0.5, 0.625, 0.75, 0.875, 1.0]);

		// the final parameter is the tip of the stem and is not sampled
		let points = sampler.sample(&stem);
		assert_eq!(points.len(), 7);
		for (point, t) in points.iter().zip(sampler.t_values()) {
			assert!((point.co.z - t * 4.0).abs() < 1e-4);
			assert!((point.offset - t * 4.0).abs() < 1e-4);
			assert!((point.local_radius - (1.0 - t)).abs() < 1e-4);
			assert_eq!(point.parent_radius, 1.0);
			assert!(!point.tip);
		}
		assert_eq!(points[0].attachment, AttachmentId { stem: 0, segment: 0 });
		assert_eq!(points[6].attachment, AttachmentId { stem: 0, segment: 3 });
	}

	#[test]
	fn test_no_children_sprouts_at_tip() {
		let stem = straight_stem(3, 0.0);
		let sampler = ChildPointSampler::new(std::slice::from_ref(&stem), 0.0);
		assert_eq!(sampler.t_values(), &[TIP_SPROUT]);

		let points = sampler.sample(&stem);
		assert_eq!(points.len(), 1);
		assert!(points[0].tip);
		assert!((points[0].co - Vec3::Z * 3.0).length() < 1e-5);
		assert_eq!(points[0].local_radius, 1.0);
		assert!((points[0].orientation * Vec3::Z - Vec3::Z).length() < 1e-5);
	}

	#[test]
	fn test_trim_base() {
		let stem = straight_stem(4, 8.0);
		let sampler = ChildPointSampler::new(std::slice::from_ref(&stem), 8.0).trim_base(0.4);
		// int(0.4 * 9) values are dropped
		assert_eq!(sampler.t_values().len(), 5);
		assert_eq!(sampler.t_values()[0], 0.5);
	}

	#[test]
	fn test_split_stem_samples_only_its_tail() {
		let main = straight_stem(4, 6.0);

		// a split stem which started two segments in
		let mut split = StemSpline::new(
			ControlPoint::new(Vec3::Z * 2.0, 0.5, HandleKind::Vector),
			0.0,
			0.0,
			4,
			1.0,
			6.0,
			1.0,
			0.0,
		)
		.with_id(1);
		split.segment = 2;
		split.push_segment(Vec3::new(1.0, 0.0, 3.0), HandleKind::Vector);
		split.push_segment(Vec3::new(2.0, 0.0, 4.0), HandleKind::Vector);

		let stems = vec![main, split];
		let sampler = ChildPointSampler::new(&stems, 6.0);
		// six segments share six children, spread over the main stem's four
		assert_eq!(sampler.t_values(), &[0.25, 0.5, 0.75, 1.0]);

		let points = sampler.sample(&stems[1]);
		assert_eq!(points.len(), 2);
		assert!((points[0].co - Vec3::Z * 2.0).length() < 1e-5);
		assert!((points[1].co - Vec3::new(1.0, 0.0, 3.0)).length() < 1e-5);
		assert_eq!(points[0].attachment, AttachmentId { stem: 1, segment: 0 });
		assert_eq!(points[1].attachment, AttachmentId { stem: 1, segment: 1 });
	}

	#[test]
	fn test_empty_inputs() {
		assert!(ChildPointSampler::new(&[], 3.0).t_values().is_empty());

		let lone = StemSpline::new(ControlPoint::new(Vec3::ZERO, 1.0, HandleKind::Auto), 0.0, 0.0, 3, 1.0, 3.0, 1.0, 0.0);
		let sampler = ChildPointSampler::new(std::slice::from_ref(&lone), 3.0);
		assert!(sampler.sample(&lone).is_empty());
	}

	#[test]
	fn test_tip_sprout_on_short_split() {
		// a split which only grew the final segment of a ten segment stem
		let mut split = StemSpline::new(
			ControlPoint::new(Vec3::Z * 9.0, 0.5, HandleKind::Vector),
			0.0,
			0.0,
			10,
			1.0,
			0.0,
			0.5,
			0.0,
		);
		split.segment = 9;
		split.push_segment(Vec3::new(1.0, 0.0, 10.0), HandleKind::Vector);

		let sampler = ChildPointSampler::new(std::slice::from_ref(&split), 0.0);
		let points = sampler.sample(&split);

		assert_eq!(points.len(), 1);
		assert!(points[0].tip);
		assert!((points[0].co - Vec3::new(1.0, 0.0, 10.0)).length() < 1e-5);
		assert_eq!(points[0].attachment, AttachmentId { stem: 0, segment: 0 });
	}
}
