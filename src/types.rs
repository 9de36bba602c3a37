use fixed::types::I32F32;

/// Millimetre scalar backed by fixed-point arithmetic.
///
/// Layout geometry must be a deterministic function of the record index,
/// so card placement never goes through accumulated float error. Values
/// round-trip through an integer micrometre representation.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Mm(I32F32);

impl Mm {
    pub const ZERO: Mm = Mm(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Mm {
        if !value.is_finite() {
            return Mm::ZERO;
        }
        let micro = (value as f64 * 1000.0).round();
        let micro = micro.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Mm::from_micro_i64(micro)
    }

    pub fn from_i32(value: i32) -> Mm {
        Mm::from_micro_i64((value as i64) * 1000)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    /// Integer micrometres, rounded half away from zero.
    pub fn to_micro_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let micro = (scaled + adj) / denom;
        micro.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_micro_i64(micro: i64) -> Mm {
        Mm::from_micro_i128(micro as i128)
    }

    fn from_micro_i128(micro: i128) -> Mm {
        let denom = 1i128 << 32;
        let adj = if micro >= 0 { 500 } else { -500 };
        let bits = (micro * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Mm(I32F32::from_bits(bits))
    }

    /// PDF user-space points (1 pt = 1/72 in, 1 in = 25.4 mm).
    pub fn to_pt_f32(self) -> f32 {
        self.to_f32() * 72.0 / 25.4
    }

    /// Device pixels at the given pixels-per-millimetre scale, rounded
    /// half away from zero.
    pub fn to_px_i64(self, px_per_mm: f32) -> i64 {
        let px = self.to_micro_i64() as f64 * px_per_mm as f64 / 1000.0;
        if px >= 0.0 { (px + 0.5) as i64 } else { (px - 0.5) as i64 }
    }

    pub fn max(self, other: Mm) -> Mm {
        if self >= other { self } else { other }
    }

    pub fn min(self, other: Mm) -> Mm {
        if self <= other { self } else { other }
    }
}

impl std::ops::Add for Mm {
    type Output = Mm;
    fn add(self, rhs: Mm) -> Mm {
        Mm::from_micro_i128(self.to_micro_i64() as i128 + rhs.to_micro_i64() as i128)
    }
}

impl std::ops::AddAssign for Mm {
    fn add_assign(&mut self, rhs: Mm) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Mm {
    type Output = Mm;
    fn sub(self, rhs: Mm) -> Mm {
        Mm::from_micro_i128(self.to_micro_i64() as i128 - rhs.to_micro_i64() as i128)
    }
}

impl std::ops::Mul<i32> for Mm {
    type Output = Mm;
    fn mul(self, rhs: i32) -> Mm {
        let micro = self.to_micro_i64() as i128;
        Mm::from_micro_i128(micro.saturating_mul(rhs as i128))
    }
}

impl std::ops::Div<i32> for Mm {
    type Output = Mm;
    fn div(self, rhs: i32) -> Mm {
        if rhs == 0 {
            Mm::ZERO
        } else {
            let micro = self.to_micro_i64() as i128;
            let den = rhs as i128;
            let den_abs = den.abs();
            let value = if micro >= 0 {
                (micro + den_abs / 2) / den
            } else {
                -(((-micro) + den_abs / 2) / den)
            };
            Mm::from_micro_i128(value)
        }
    }
}

impl std::ops::Mul<f32> for Mm {
    type Output = Mm;
    fn mul(self, rhs: f32) -> Mm {
        if !rhs.is_finite() {
            return Mm::ZERO;
        }
        Mm::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Neg for Mm {
    type Output = Mm;
    fn neg(self) -> Mm {
        Mm::from_micro_i128(-(self.to_micro_i64() as i128))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Mm,
    pub height: Mm,
}

impl Size {
    pub fn new(width: Mm, height: Mm) -> Self {
        Self { width, height }
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width: Mm::from_f32(width_mm),
            height: Mm::from_f32(height_mm),
        }
    }

    pub fn a4_portrait() -> Self {
        Self::from_mm(210.0, 297.0)
    }

    pub fn a4_landscape() -> Self {
        Self::from_mm(297.0, 210.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: Mm,
    pub y: Mm,
    pub width: Mm,
    pub height: Mm,
}

impl Rect {
    pub fn new(x: Mm, y: Mm, width: Mm, height: Mm) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(v: f32) -> Self {
        Self { r: v, g: v, b: v }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micro_round_trips_exactly() {
        let v = Mm::from_micro_i64(85_600);
        assert_eq!(v.to_micro_i64(), 85_600);
        assert_eq!((v + Mm::ZERO).to_micro_i64(), 85_600);
    }

    #[test]
    fn arithmetic_is_stable_in_micro_space() {
        let card = Mm::from_f32(85.6);
        let gap = Mm::from_f32(5.0);
        let sum = card + gap + card;
        assert_eq!(sum.to_micro_i64(), 176_200);
    }

    #[test]
    fn mul_div_round_half_away_from_zero() {
        let v = Mm::from_micro_i64(3);
        assert_eq!((v / 2).to_micro_i64(), 2);
        assert_eq!((-v / 2).to_micro_i64(), -2);
        assert_eq!((v * 3).to_micro_i64(), 9);
    }

    #[test]
    fn px_conversion_uses_scale() {
        // 85.6 mm at 3 px/mm rounds to 257 px.
        let v = Mm::from_f32(85.6);
        assert_eq!(v.to_px_i64(3.0), 257);
        assert_eq!(Mm::from_f32(-1.0).to_px_i64(2.0), -2);
    }

    #[test]
    fn non_finite_inputs_collapse_to_zero() {
        assert_eq!(Mm::from_f32(f32::NAN).to_micro_i64(), 0);
        assert_eq!((Mm::from_f32(1.0) * f32::INFINITY).to_micro_i64(), 0);
    }
}
