use super::child::ChildPoint;
use super::stem::AttachmentId;
use crate::random::RandomStream;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Outline of a single leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeafShape {
	/// Six vertices, two quads.
	#[default]
	Hex,
	/// Four vertices, one quad.
	Rect,
}

impl LeafShape {
	/// Template vertices in leaf space. The leaf lies in the XZ plane and grows along +Z.
	pub fn template(&self) -> &'static [Vec3] {
		const HEX: [Vec3; 6] = [
			Vec3::new(0.0, 0.0, 0.0),
			Vec3::new(0.5, 0.0, 1.0 / 3.0),
			Vec3::new(0.5, 0.0, 2.0 / 3.0),
			Vec3::new(0.0, 0.0, 1.0),
			Vec3::new(-0.5, 0.0, 2.0 / 3.0),
			Vec3::new(-0.5, 0.0, 1.0 / 3.0),
		];
		const RECT: [Vec3; 4] = [
			Vec3::new(0.5, 0.0, 0.0),
			Vec3::new(0.5, 0.0, 1.0),
			Vec3::new(-0.5, 0.0, 1.0),
			Vec3::new(-0.5, 0.0, 0.0),
		];

		match self {
			Self::Hex => &HEX,
			Self::Rect => &RECT,
		}
	}

	pub fn faces(&self) -> &'static [[u32; 4]] {
		match self {
			Self::Hex => &[[0, 1, 2, 3], [0, 3, 4, 5]],
			Self::Rect => &[[0, 1, 2, 3]],
		}
	}
}

/// Every leaf of a tree batched into one mesh.
///
/// `uvs` and `attachments` hold one entry per face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafMesh {
	pub shape: LeafShape,
	pub vertices: Vec<Vec3>,
	pub faces: Vec<[u32; 4]>,
	pub uvs: Vec<[Vec2; 4]>,
	pub attachments: Vec<AttachmentId>,
}

impl LeafMesh {
	pub fn new(shape: LeafShape) -> Self {
		Self { shape, ..Default::default() }
	}

	pub fn leaf_count(&self) -> usize {
		self.faces.len() / self.shape.faces().len()
	}

	pub fn is_empty(&self) -> bool {
		self.faces.is_empty()
	}

	fn push(&mut self, transform: impl Fn(Vec3) -> Vec3, attachment: AttachmentId) {
		let template = self.shape.template();
		let base = self.vertices.len() as u32;
		self.vertices.extend(template.iter().map(|&vertex| transform(vertex)));

		for face in self.shape.faces() {
			self.faces.push(face.map(|index| base + index));
			// the template spans one unit in each direction of the leaf plane
			self.uvs.push(face.map(|index| {
				let vertex = template[index as usize];
				Vec2::new(vertex.x + 0.5, vertex.z)
			}));
			self.attachments.push(attachment);
		}
	}
}

/// Places leaves on the attachment points of the final branching level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafPlacer {
	pub shape: LeafShape,
	pub scale: f32,
	pub scale_x: f32,
	/// Expected leaves per stem. Negative values sprout clusters at stem tips.
	pub leaves: i32,
	/// Pitch away from the parent stem, in radians.
	pub down_angle: f32,
	pub down_angle_v: f32,
	/// Spin between consecutive leaves, in radians.
	pub rotate: f32,
	pub rotate_v: f32,
	/// How far leaves curl to face away from the trunk, from 0 to 1.
	pub bend: f32,
}

impl LeafPlacer {
	pub fn new(shape: LeafShape, scale: f32, scale_x: f32, leaves: i32) -> Self {
		Self {
			shape,
			scale,
			scale_x,
			leaves,
			down_angle: 0.0,
			down_angle_v: 0.0,
			rotate: 0.0,
			rotate_v: 0.0,
			bend: 0.0,
		}
	}

	pub fn with_down_angle(mut self, down_angle: f32, down_angle_v: f32) -> Self {
		self.down_angle = down_angle;
		self.down_angle_v = down_angle_v;
		self
	}

	pub fn with_rotate(mut self, rotate: f32, rotate_v: f32) -> Self {
		self.rotate = rotate;
		self.rotate_v = rotate_v;
		self
	}

	pub fn with_bend(mut self, bend: f32) -> Self {
		self.bend = bend;
		self
	}

	/// Leaves for every attachment point, in order.
	///
	/// Points forced onto a stem tip sprout a fan of `|leaves|` leaves; every other point grows one.
	pub fn place_all(&self, points: &[ChildPoint], random: &mut RandomStream) -> LeafMesh {
		let mut mesh = LeafMesh::new(self.shape);
		let mut rotation = 0.0;

		for point in points {
			if point.tip {
				self.place_cluster(&mut mesh, point);
			} else {
				rotation = self.place(&mut mesh, point, rotation, random);
			}
		}

		mesh
	}

	/// One leaf at `point`, returning the advanced rotation accumulator.
	pub fn place(
		&self,
		mesh: &mut LeafMesh,
		point: &ChildPoint,
		rotation: f32,
		random: &mut RandomStream,
	) -> f32 {
		let rotation = rotation + self.rotate + random.uniform(-self.rotate_v, self.rotate_v);
		let down = self.down_angle + random.uniform(-self.down_angle_v, self.down_angle_v);

		let local = point.orientation * Quat::from_rotation_z(rotation) * Quat::from_rotation_x(down);
		let bend = self.bend_rotation(point.co, local * Vec3::Y);
		let leaf = bend * local;

		mesh.push(|vertex| point.co + leaf * self.scaled(vertex), point.attachment);
		rotation
	}

	/// A fan of leaves spread evenly about the attachment axis.
	pub fn place_cluster(&self, mesh: &mut LeafMesh, point: &ChildPoint) {
		let count = self.leaves.unsigned_abs().max(1);
		let step = self.rotate / count as f32;
		let mut rotation = -0.5 * self.rotate;

		for _ in 0..count {
			let leaf = point.orientation * Quat::from_rotation_y(rotation);
			mesh.push(|vertex| point.co + leaf * self.scaled(vertex), point.attachment);
			rotation += step;
		}
	}

	fn scaled(&self, vertex: Vec3) -> Vec3 {
		Vec3::new(vertex.x * self.scale_x * self.scale, vertex.y, vertex.z * self.scale)
	}

	/// Rotation curling a leaf with the given `normal` to face away from the trunk.
	///
	/// Turns the normal's bearing toward the radial bearing of `co`, then levels it toward the
	/// horizontal, both in proportion to the bend factor.
	fn bend_rotation(&self, co: Vec3, normal: Vec3) -> Quat {
		if self.bend == 0.0 {
			return Quat::IDENTITY;
		}

		let theta = co.y.atan2(co.x);
		let phi = normal.y.atan2(normal.x);
		let turn = Quat::from_rotation_z(self.bend * wrap_angle(theta - phi));

		let turned = turn * normal;
		let elevation = turned.z.atan2(turned.truncate().length());
		let axis = turned.cross(Vec3::Z);
		if axis.length_squared() < 1e-12 {
			return turn;
		}

		Quat::from_axis_angle(axis.normalize(), -self.bend * elevation) * turn
	}
}

/// `angle` wrapped onto `(-PI, PI]`.
fn wrap_angle(angle: f32) -> f32 {
	let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
	if wrapped == -PI {
		PI
	} else {
		wrapped
	}
}
