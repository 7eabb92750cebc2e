use glam::{Affine3A, EulerRot, Mat4, Quat, Vec3};

// Native (compositor-side) math arrives as mint types and is reinterpreted
// component for component; no handedness or convention change happens here.

pub fn vec3(v: mint::Vector3<f32>) -> Vec3 {
    Vec3::from(v)
}

pub fn quat(q: mint::Quaternion<f32>) -> Quat {
    Quat::from(q)
}

pub fn mat4(m: mint::ColumnMatrix4<f32>) -> Mat4 {
    Mat4::from(m)
}

pub fn to_affine(position: mint::Vector3<f32>, orientation: mint::Quaternion<f32>) -> Affine3A {
    Affine3A::from_rotation_translation(quat(orientation), vec3(position))
}

/// Yaw/pitch/roll angles of a rotation, in that order (radians).
pub fn yaw_pitch_roll(q: Quat) -> Vec3 {
    let (yaw, pitch, roll) = q.to_euler(EulerRot::YXZ);
    Vec3::new(yaw, pitch, roll)
}

pub fn identity_orientation() -> mint::Quaternion<f32> {
    mint::Quaternion {
        v: mint::Vector3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        s: 1.0,
    }
}

pub fn zero_vector() -> mint::Vector3<f32> {
    mint::Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn affine_from_native_pose_moves_points() {
        let position = mint::Vector3 {
            x: 1.0,
            y: 2.0,
            z: -3.0,
        };
        let transform = to_affine(position, identity_orientation());
        let moved = transform.transform_point3(Vec3::ZERO);
        assert!((moved - Vec3::new(1.0, 2.0, -3.0)).length() < 1e-6);
    }

    #[test]
    fn matrix_conversion_keeps_columns() {
        let source = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
        let native: mint::ColumnMatrix4<f32> = source.into();
        let back = mat4(native);
        assert_eq!(source, back);
    }

    #[test]
    fn yaw_only_rotation_reports_yaw() {
        let q = Quat::from_rotation_y(FRAC_PI_2);
        let ypr = yaw_pitch_roll(q);
        assert!((ypr.x - FRAC_PI_2).abs() < 1e-5);
        assert!(ypr.y.abs() < 1e-5);
        assert!(ypr.z.abs() < 1e-5);
    }
}
