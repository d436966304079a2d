//! Matrix helpers shared by constraints, hardpoints, the renderer and cameras.

use cgmath::{Matrix, Matrix3, Matrix4, Quaternion, Rad, SquareMatrix, Vector3};

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Builds a transform from a position and a row-major rotation.
///
/// The stored rotation is the transpose of what the transform needs, so the
/// rows of `r` become the columns of the upper 3x3 block.
pub fn mat4_from_position_rotation(p: [f32; 3], r: [f32; 9]) -> Matrix4<f32> {
    Matrix4::new(
        r[0], r[3], r[6], 0.0, //
        r[1], r[4], r[7], 0.0, //
        r[2], r[5], r[8], 0.0, //
        p[0], p[1], p[2], 1.0,
    )
}

/// First person camera orientation from pitch and yaw in degrees.
pub fn quat_from_pitch_yaw(pitch: f32, yaw: f32) -> Quaternion<f32> {
    let half_to_rad = 0.5 * std::f32::consts::PI / 180.0;
    let (sp, cp) = (pitch * half_to_rad).sin_cos();
    let (sy, cy) = (yaw * half_to_rad).sin_cos();
    Quaternion::new(cp * cy, sp * cy, cp * sy, sp * sy)
}

/// Rotation matrix from pitch and yaw in radians.
pub fn mat4_from_pitch_yaw(pitch: f32, yaw: f32) -> Matrix4<f32> {
    Matrix4::from_angle_x(Rad(pitch + std::f32::consts::PI))
        * Matrix4::from_angle_y(Rad(yaw))
        * Matrix4::from_angle_z(Rad(-std::f32::consts::PI))
}

/// Inverse transpose of the upper 3x3 block, `None` when it is singular.
pub fn normal_from_mat4(m: &Matrix4<f32>) -> Option<Matrix3<f32>> {
    let upper = Matrix3::new(
        m.x.x, m.x.y, m.x.z, //
        m.y.x, m.y.y, m.y.z, //
        m.z.x, m.z.y, m.z.z,
    );
    upper.invert().map(|inverse| inverse.transpose())
}

/// Transforms a point and divides by `w`, treating a zero `w` as one.
pub fn transform_point(m: &Matrix4<f32>, p: Vector3<f32>) -> Vector3<f32> {
    let v = *m * p.extend(1.0);
    let w = if v.w == 0.0 { 1.0 } else { v.w };
    v.truncate() / w
}

/// Index of the distance range containing `distance`.
///
/// `ranges` holds increasing thresholds; range `i` spans
/// `ranges[i] * bias .. ranges[i + 1] * bias`. Distances below the first
/// upper bound select 0 and distances past the last threshold select the
/// final range (`ranges.len() - 2`). A zero threshold ends the list early.
pub fn range_index(distance: f32, ranges: &[f32], bias: f32) -> usize {
    if ranges.len() < 2 {
        return 0;
    }

    let mut level = 0;
    while level + 1 < ranges.len() && ranges[level + 1] != 0.0 {
        let min = ranges[level] * bias;
        let max = ranges[level + 1] * bias;
        if min >= max {
            return 0;
        }
        if distance < max {
            return level;
        }
        level += 1;
    }

    level.min(ranges.len() - 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    #[test]
    fn range_index_bounds() {
        let ranges = [0.0, 100.0, 400.0, 1000.0];
        assert_eq!(range_index(0.0, &ranges, 1.0), 0);
        assert_eq!(range_index(99.9, &ranges, 1.0), 0);
        assert_eq!(range_index(100.0, &ranges, 1.0), 1);
        assert_eq!(range_index(999.0, &ranges, 1.0), 2);
        assert_eq!(range_index(5000.0, &ranges, 1.0), 2);
        assert_eq!(range_index(150.0, &ranges, 2.0), 0);
        assert_eq!(range_index(1.0, &[0.0], 1.0), 0);
    }

    #[test]
    fn rotation_rows_become_columns() {
        let rotation = [0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let m = mat4_from_position_rotation([1.0, 2.0, 3.0], rotation);
        assert_eq!(m.w, Vector4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(m.x, Vector4::new(0.0, -1.0, 0.0, 0.0));
        assert_eq!(m.y, Vector4::new(1.0, 0.0, 0.0, 0.0));
    }
}
