//! Geometry primitives shared by layout, invalidation and hit testing.
//!
//! Everything is `f32` in panel-local units. `Transform` is a full 4x4
//! matrix so world-space (3D) panels can express non-affine-2D transforms;
//! flat panels only ever see the affine-2D subset.

// =============================================================================
// POINT / SIZE / RECT
// =============================================================================

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const ZERO: Self = Self { width: 0.0, height: 0.0 };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// An axis-aligned rectangle (origin + size).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, width: 0.0, height: 0.0 };

    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Point containment. Left/top edges are inclusive, right/bottom exclusive.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Intersection of two rects. Empty result if they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
    }

    /// Smallest rect covering both. An empty rect is the identity.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Shrink the rect by a uniform inset on all four sides.
    pub fn inset(&self, amount: f32) -> Rect {
        Rect::new(
            self.x + amount,
            self.y + amount,
            (self.width - 2.0 * amount).max(0.0),
            (self.height - 2.0 * amount).max(0.0),
        )
    }
}

// =============================================================================
// TRANSFORM
// =============================================================================

/// A 4x4 row-major transform matrix.
///
/// Flat panels use the affine-2D subset (translation/rotation/scale in the
/// XY plane). World-space panels may carry arbitrary 3D transforms, which
/// is what [`Transform::is_affine_2d`] detects for bounds bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: [[f32; 4]; 4],
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// 2D translation.
    pub fn translation(x: f32, y: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.m[0][3] = x;
        t.m[1][3] = y;
        t
    }

    /// 3D translation. Any non-zero `z` makes the transform non-affine-2D.
    pub fn translation_3d(x: f32, y: f32, z: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.m[0][3] = x;
        t.m[1][3] = y;
        t.m[2][3] = z;
        t
    }

    /// Uniform 2D scale about the origin.
    pub fn scale(sx: f32, sy: f32) -> Self {
        let mut t = Self::IDENTITY;
        t.m[0][0] = sx;
        t.m[1][1] = sy;
        t
    }

    /// True when the matrix maps the XY plane onto itself: no mixing into
    /// or out of the z axis and a standard projective row.
    pub fn is_affine_2d(&self) -> bool {
        let m = &self.m;
        m[0][2] == 0.0
            && m[1][2] == 0.0
            && m[2][0] == 0.0
            && m[2][1] == 0.0
            && m[2][2] == 1.0
            && m[2][3] == 0.0
            && m[3] == [0.0, 0.0, 0.0, 1.0]
    }

    /// Matrix product `self * other` (apply `other` first).
    pub fn multiply(&self, other: &Transform) -> Transform {
        let mut out = [[0.0f32; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        Transform { m: out }
    }

    /// Transform a 2D point (z = 0, w = 1).
    pub fn transform_point(&self, p: Point) -> Point {
        let m = &self.m;
        Point::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][3],
            m[1][0] * p.x + m[1][1] * p.y + m[1][3],
        )
    }

    /// Axis-aligned bounding rect of the four transformed corners.
    pub fn transform_rect(&self, r: &Rect) -> Rect {
        let corners = [
            self.transform_point(Point::new(r.x, r.y)),
            self.transform_point(Point::new(r.right(), r.y)),
            self.transform_point(Point::new(r.x, r.bottom())),
            self.transform_point(Point::new(r.right(), r.bottom())),
        ];
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for c in corners {
            min_x = min_x.min(c.x);
            min_y = min_y.min(c.y);
            max_x = max_x.max(c.x);
            max_y = max_y.max(c.y);
        }
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

// =============================================================================
// 3D BOUNDS
// =============================================================================

/// Axis-aligned 3D bounds, used by the world-space side table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3d {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds3d {
    /// The empty bounds: union identity.
    pub const EMPTY: Self = Self {
        min: [f32::INFINITY; 3],
        max: [f32::NEG_INFINITY; 3],
    };

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    pub fn union(&self, other: &Bounds3d) -> Bounds3d {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut out = *self;
        for axis in 0..3 {
            out.min[axis] = out.min[axis].min(other.min[axis]);
            out.max[axis] = out.max[axis].max(other.max[axis]);
        }
        out
    }

    /// Flat bounds from a 2D rect at z = 0.
    pub fn from_rect(r: &Rect) -> Self {
        Self {
            min: [r.x, r.y, 0.0],
            max: [r.right(), r.bottom(), 0.0],
        }
    }
}

impl Default for Bounds3d {
    fn default() -> Self {
        Self::EMPTY
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_edges() {
        let r = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert!(r.contains(Point::new(10.0, 10.0)));
        assert!(!r.contains(Point::new(30.0, 10.0)));
        assert!(!r.contains(Point::new(10.0, 30.0)));
    }

    #[test]
    fn test_rect_union_empty_identity() {
        let r = Rect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(Rect::ZERO.union(&r), r);
        assert_eq!(r.union(&Rect::ZERO), r);
    }

    #[test]
    fn test_rect_intersect_disjoint_is_empty() {
        let a = Rect::new(0.0, 0.0, 5.0, 5.0);
        let b = Rect::new(10.0, 10.0, 5.0, 5.0);
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn test_transform_translation_point() {
        let t = Transform::translation(5.0, -3.0);
        assert_eq!(t.transform_point(Point::new(1.0, 1.0)), Point::new(6.0, -2.0));
    }

    #[test]
    fn test_transform_multiply_order() {
        // scale then translate vs translate then scale
        let s = Transform::scale(2.0, 2.0);
        let t = Transform::translation(10.0, 0.0);
        let ts = t.multiply(&s);
        assert_eq!(ts.transform_point(Point::new(1.0, 0.0)), Point::new(12.0, 0.0));
        let st = s.multiply(&t);
        assert_eq!(st.transform_point(Point::new(1.0, 0.0)), Point::new(22.0, 0.0));
    }

    #[test]
    fn test_is_affine_2d() {
        assert!(Transform::IDENTITY.is_affine_2d());
        assert!(Transform::translation(3.0, 4.0).is_affine_2d());
        assert!(!Transform::translation_3d(0.0, 0.0, 1.0).is_affine_2d());
    }

    #[test]
    fn test_transform_rect_aabb() {
        let t = Transform::translation(10.0, 10.0);
        let r = t.transform_rect(&Rect::new(0.0, 0.0, 4.0, 2.0));
        assert_eq!(r, Rect::new(10.0, 10.0, 4.0, 2.0));
    }

    #[test]
    fn test_bounds3d_union() {
        let a = Bounds3d::from_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
        let b = Bounds3d::from_rect(&Rect::new(5.0, 5.0, 1.0, 1.0));
        let u = a.union(&b);
        assert_eq!(u.min, [0.0, 0.0, 0.0]);
        assert_eq!(u.max, [6.0, 6.0, 0.0]);
        assert_eq!(Bounds3d::EMPTY.union(&a), a);
    }
}
