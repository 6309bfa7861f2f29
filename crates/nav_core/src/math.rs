//! Fixed-point math utilities for deterministic navigation.
//!
//! All navigation uses fixed-point arithmetic to ensure
//! deterministic behavior across platforms. Floating-point
//! operations can produce different results on different CPUs,
//! so square roots and trigonometry are computed here with
//! integer-only algorithms.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// π in [`Fixed`] precision.
pub const PI: Fixed = Fixed::from_bits(13_493_037_705);

/// π/2 in [`Fixed`] precision.
pub const FRAC_PI_2: Fixed = Fixed::from_bits(6_746_518_852);

/// 2π in [`Fixed`] precision.
pub const TAU: Fixed = Fixed::from_bits(26_986_075_410);

/// Fixed-point 2D vector.
///
/// `x` runs east and `y` runs north on the map plane. Headings are measured
/// from +y towards +x, so heading `a` points along `(sin a, cos a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for `Option<Fixed>`.
///
/// Serializes optional fixed-point numbers via their raw bit representation,
/// preserving `None` as a serialized `None` value.
pub mod option_fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(Fixed::to_bits).serialize(serializer)
    }

    /// Deserialize an optional fixed-point number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<i64>::deserialize(deserializer)?;
        Ok(opt.map(Fixed::from_bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Squared length, saturating instead of overflowing.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.x
            .saturating_mul(self.x)
            .saturating_add(self.y.saturating_mul(self.y))
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        (self - other).length()
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (`self.x * other.y - self.y * other.x`).
    ///
    /// Positive when `other` lies counter-clockwise of `self`.
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Clockwise perpendicular `(y, -x)`.
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(self.y, -self.x)
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, s: Fixed) -> Self {
        Self::new(self.x * s, self.y * s)
    }

    /// Component-wise absolute value.
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs())
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Rescale to the given length. The zero vector stays zero.
    #[must_use]
    pub fn normalize_to(self, length: Fixed) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x * length / len, self.y * length / len)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        self.normalize_to(Fixed::ONE)
    }

    /// Rotate by `angle` radians using the heading convention
    /// (positive angles turn from +y towards +x).
    #[must_use]
    pub fn rotate(self, angle: Fixed) -> Self {
        let (s, c) = sin_cos(angle);
        Self::new(self.x * c + self.y * s, self.y * c - self.x * s)
    }

    /// Heading of this vector, 0 along +y.
    #[must_use]
    pub fn heading(self) -> Fixed {
        atan2(self.x, self.y)
    }

    /// Unit vector for a heading.
    #[must_use]
    pub fn from_heading(angle: Fixed) -> Self {
        let (s, c) = sin_cos(angle);
        Self::new(s, c)
    }
}

/// Integer square root of a 128-bit value (floor).
#[must_use]
pub fn isqrt_u128(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    // Start from a power of two at or above the root so Newton descends.
    let bits = 128 - n.leading_zeros();
    let mut x: u128 = 1 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

/// Computes the exact (floored) square root of a fixed-point number.
///
/// Negative inputs return zero.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let bits = (value.to_bits() as u128) << 32;
    Fixed::from_bits(isqrt_u128(bits) as i64)
}

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_angle(mut angle: Fixed) -> Fixed {
    while angle > PI {
        angle -= TAU;
    }
    while angle <= -PI {
        angle += TAU;
    }
    angle
}

/// atan on `[0, 1]` (Abramowitz & Stegun 4.4.49, |error| < 1e-5).
fn atan_unit(z: Fixed) -> Fixed {
    const A1: Fixed = Fixed::from_bits(4_294_391_770);
    const A3: Fixed = Fixed::from_bits(-1_418_625_550);
    const A5: Fixed = Fixed::from_bits(773_699_704);
    const A7: Fixed = Fixed::from_bits(-365_643_451);
    const A9: Fixed = Fixed::from_bits(89_486_073);

    let z2 = z * z;
    z * (A1 + z2 * (A3 + z2 * (A5 + z2 * (A7 + z2 * A9))))
}

/// Fixed-point `atan2(y, x)` in `(-π, π]`.
#[must_use]
pub fn atan2(y: Fixed, x: Fixed) -> Fixed {
    if x == Fixed::ZERO && y == Fixed::ZERO {
        return Fixed::ZERO;
    }
    let ax = x.abs();
    let ay = y.abs();
    let mut a = if ax >= ay {
        atan_unit(ay / ax)
    } else {
        FRAC_PI_2 - atan_unit(ax / ay)
    };
    if x < Fixed::ZERO {
        a = PI - a;
    }
    if y < Fixed::ZERO {
        a = -a;
    }
    a
}

/// Fixed-point sine and cosine.
///
/// Reduces to `[-π/2, π/2]` and evaluates the Taylor series in Horner form
/// up to the x^12 term.
#[must_use]
pub fn sin_cos(angle: Fixed) -> (Fixed, Fixed) {
    let mut x = wrap_angle(angle);
    let mut cos_sign = Fixed::ONE;
    if x > FRAC_PI_2 {
        x = PI - x;
        cos_sign = -Fixed::ONE;
    } else if x < -FRAC_PI_2 {
        x = -PI - x;
        cos_sign = -Fixed::ONE;
    }

    let one = Fixed::ONE;
    let x2 = x * x;
    let sin = x
        * (one
            - x2 / 6
                * (one - x2 / 20 * (one - x2 / 42 * (one - x2 / 72 * (one - x2 / 110)))));
    let cos = one
        - x2 / 2
            * (one
                - x2 / 12
                    * (one
                        - x2 / 30 * (one - x2 / 56 * (one - x2 / 90 * (one - x2 / 132)))));
    (sin, cos * cos_sign)
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::SubAssign for Vec2Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl std::ops::Mul<Fixed> for Vec2Fixed {
    type Output = Self;

    fn mul(self, rhs: Fixed) -> Self::Output {
        self.scale(rhs)
    }
}
