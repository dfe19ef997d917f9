//! Minimal math types for composed transforms.

use std::ops::Mul;

/// A 4x4 row-major double matrix.
///
/// Composition follows the row-vector convention used by USD transforms:
/// `local * parent` applies the local transform first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4d(pub [[f64; 4]; 4]);

impl Matrix4d {
    /// The identity matrix.
    pub fn identity() -> Self {
        let mut m = [[0.0; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self(m)
    }

    /// A translation matrix (translation in the last row, row-vector style).
    pub fn translate(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::identity();
        m.0[3][0] = x;
        m.0[3][1] = y;
        m.0[3][2] = z;
        m
    }

    /// A non-uniform scale matrix.
    pub fn scale(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::identity();
        m.0[0][0] = x;
        m.0[1][1] = y;
        m.0[2][2] = z;
        m
    }
}

impl Default for Matrix4d {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Matrix4d {
    type Output = Matrix4d;

    fn mul(self, rhs: Matrix4d) -> Matrix4d {
        let mut out = [[0.0; 4]; 4];
        for (i, out_row) in out.iter_mut().enumerate() {
            for (j, out_cell) in out_row.iter_mut().enumerate() {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += self.0[i][k] * rhs.0[k][j];
                }
                *out_cell = sum;
            }
        }
        Matrix4d(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_neutral() {
        let t = Matrix4d::translate(1.0, 2.0, 3.0);
        assert_eq!(t * Matrix4d::identity(), t);
        assert_eq!(Matrix4d::identity() * t, t);
    }

    #[test]
    fn test_translations_accumulate() {
        let a = Matrix4d::translate(1.0, 0.0, 0.0);
        let b = Matrix4d::translate(0.0, 2.0, 0.0);
        assert_eq!(a * b, Matrix4d::translate(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_local_applies_first() {
        // Scale-then-translate differs from translate-then-scale.
        let scale = Matrix4d::scale(2.0, 2.0, 2.0);
        let translate = Matrix4d::translate(1.0, 0.0, 0.0);
        let composed = scale * translate;
        assert_eq!(composed.0[3][0], 1.0);
        let composed = translate * scale;
        assert_eq!(composed.0[3][0], 2.0);
    }
}
