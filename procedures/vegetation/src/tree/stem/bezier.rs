use bevy::prelude::*;

/// Position on the cubic Bezier span `p1 -> p2` with handles `h1`, `h2` at `t` on `[0, 1]`.
pub fn eval_bezier(p1: Vec3, h1: Vec3, h2: Vec3, p2: Vec3, t: f32) -> Vec3 {
	let u = 1.0 - t;
	if t == 0.0 {
		return p1;
	}
	if t == 1.0 {
		return p2;
	}
	p1 * (u * u * u) + h1 * (3.0 * t * u * u) + h2 * (3.0 * t * t * u) + p2 * (t * t * t)
}

/// Unit tangent of the same span at `t`.
pub fn eval_bezier_tangent(p1: Vec3, h1: Vec3, h2: Vec3, p2: Vec3, t: f32) -> Vec3 {
	let u = 1.0 - t;
	let derivative = p1 * (-3.0 * u * u)
		+ h1 * (-6.0 * t * u + 3.0 * u * u)
		+ h2 * (-3.0 * t * t + 6.0 * t * u)
		+ p2 * (3.0 * t * t);
	derivative.normalize_or_zero()
}

/// Rotation taking +Z onto `direction`, rolled so +Y points up the vertical plane through it.
///
/// Returns the identity for a zero direction. Vertical directions keep +Y on the world Y axis.
pub fn track_quat(direction: Vec3) -> Quat {
	let Some(forward) = direction.try_normalize() else {
		return Quat::IDENTITY;
	};

	let up = Vec3::Z - forward * forward.z;
	let up = if up.length_squared() < 1e-8 { Vec3::Y } else { up.normalize() };
	let side = up.cross(forward);

	Quat::from_mat3(&Mat3::from_cols(side, up, forward)).normalize()
}
