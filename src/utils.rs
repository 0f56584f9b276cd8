//! Miscellaneous utilities.

use crate::math::{Matrix2, Matrix3, Real, Vector};
use na::Vector3;

/// Values with a magnitude smaller than this are treated as zero by [`inv`].
pub const INV_EPSILON: Real = Real::EPSILON;

/// The reciprocal of `val`, or zero if `val` is too small to be inverted safely.
///
/// This is used for every effective mass computed by the solver: a degenerate effective
/// mass (both bodies have an infinite mass along the constrained direction) must result in
/// no impulse at all instead of an infinite one.
#[inline]
pub fn inv(val: Real) -> Real {
    if (-INV_EPSILON..=INV_EPSILON).contains(&val) {
        0.0
    } else {
        1.0 / val
    }
}

/// The 2D cross products.
pub trait WCross<Rhs>: Sized {
    /// The result of the cross product.
    type Result;
    /// Computes the cross product of `self` and `rhs`.
    fn gcross(&self, rhs: Rhs) -> Self::Result;
}

impl WCross<Vector<Real>> for Vector<Real> {
    type Result = Real;

    #[inline]
    fn gcross(&self, rhs: Vector<Real>) -> Self::Result {
        self.x * rhs.y - self.y * rhs.x
    }
}

impl WCross<Vector<Real>> for Real {
    type Result = Vector<Real>;

    /// The cross product of an angular velocity with a lever arm, i.e., the linear
    /// velocity of the end of that arm.
    #[inline]
    fn gcross(&self, rhs: Vector<Real>) -> Self::Result {
        Vector::new(-rhs.y * *self, rhs.x * *self)
    }
}

/// Linear system resolution for the small effective-mass matrices built by joints.
///
/// Unlike a LU or Cholesky decomposition, these never fail: a singular matrix is
/// treated as if its inverse was zero, which results in a zero impulse.
pub trait WSolve {
    /// Solves the upper-left 2x2 block of `self` for `b`.
    fn solve2(&self, b: Vector<Real>) -> Vector<Real>;
}

impl WSolve for Matrix2<Real> {
    #[inline]
    fn solve2(&self, b: Vector<Real>) -> Vector<Real> {
        let (a11, a12, a21, a22) = (self.m11, self.m12, self.m21, self.m22);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vector::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

impl WSolve for Matrix3<Real> {
    #[inline]
    fn solve2(&self, b: Vector<Real>) -> Vector<Real> {
        self.fixed_view::<2, 2>(0, 0).into_owned().solve2(b)
    }
}

/// Resolution of a full 3x3 system, see [`WSolve`].
pub trait WSolve3 {
    /// Solves `self * x = b`, returning zero if `self` is singular.
    fn solve3(&self, b: Vector3<Real>) -> Vector3<Real>;
}

impl WSolve3 for Matrix3<Real> {
    #[inline]
    fn solve3(&self, b: Vector3<Real>) -> Vector3<Real> {
        let c1 = self.column(0).into_owned();
        let c2 = self.column(1).into_owned();
        let c3 = self.column(2).into_owned();

        let mut det = c1.dot(&c2.cross(&c3));
        if det != 0.0 {
            det = 1.0 / det;
        }

        Vector3::new(
            det * b.dot(&c2.cross(&c3)),
            det * c1.dot(&b.cross(&c3)),
            det * c1.dot(&c2.cross(&b)),
        )
    }
}

/// The inverse of a 2x2 matrix, or the zero matrix if it is singular.
#[inline]
pub fn inverse_or_zero(m: &Matrix2<Real>) -> Matrix2<Real> {
    let (a, b, c, d) = (m.m11, m.m12, m.m21, m.m22);
    let mut det = a * d - b * c;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Matrix2::new(det * d, -det * b, -det * c, det * a)
}

/// The effective mass matrix of a point-to-point constraint between two bodies.
///
/// `r1` and `r2` are the lever arms from each body's center of mass to the anchor.
#[inline]
pub(crate) fn point_mass_matrix(
    im1: Real,
    ii1: Real,
    r1: Vector<Real>,
    im2: Real,
    ii2: Real,
    r2: Vector<Real>,
) -> Matrix2<Real> {
    let m12 = -ii1 * r1.x * r1.y - ii2 * r2.x * r2.y;
    Matrix2::new(
        im1 + im2 + ii1 * r1.y * r1.y + ii2 * r2.y * r2.y,
        m12,
        m12,
        im1 + im2 + ii1 * r1.x * r1.x + ii2 * r2.x * r2.x,
    )
}

/// The effective mass matrix of a point-to-point constraint coupled with a relative angle
/// constraint.
#[inline]
pub(crate) fn point_angle_mass_matrix(
    im1: Real,
    ii1: Real,
    r1: Vector<Real>,
    im2: Real,
    ii2: Real,
    r2: Vector<Real>,
) -> Matrix3<Real> {
    let point = point_mass_matrix(im1, ii1, r1, im2, ii2, r2);
    let k13 = -r1.y * ii1 - r2.y * ii2;
    let k23 = r1.x * ii1 + r2.x * ii2;

    Matrix3::new(
        point.m11, point.m12, k13, //
        point.m21, point.m22, k23, //
        k13, k23, ii1 + ii2,
    )
}
