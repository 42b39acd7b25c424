//! Color values and the color-space-aware blending used by effects.
//!
//! Colors are stored as sRGB components in `0.0..=1.0`. Blending can run in
//! plain RGB, HSV, CIE Lab or CIE LuvLCh space, or as clamped additive mixing.

const D65_X: f64 = 0.950_47;
const D65_Y: f64 = 1.0;
const D65_Z: f64 = 1.088_83;

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn black() -> Self {
        Self::default()
    }

    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
        }
    }

    /// 8-bit channel values for wire output.
    pub fn rgb255(self) -> (u8, u8, u8) {
        let c = self.clamped();
        (
            (c.r * 255.0 + 0.5) as u8,
            (c.g * 255.0 + 0.5) as u8,
            (c.b * 255.0 + 0.5) as u8,
        )
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
        }
    }

    pub fn hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let hp = h / 60.0;
        let c = v * s;
        let x = c * (1.0 - (hp.rem_euclid(2.0) - 1.0).abs());
        let (r1, g1, b1) = match hp as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = v - c;
        Self::new(r1 + m, g1 + m, b1 + m)
    }

    pub fn to_hsv(self) -> (f64, f64, f64) {
        let c = self.clamped();
        let max = c.r.max(c.g).max(c.b);
        let min = c.r.min(c.g).min(c.b);
        let v = max;
        let delta = max - min;
        let s = if max > 0.0 { delta / max } else { 0.0 };
        let h = if delta <= f64::EPSILON {
            0.0
        } else if max == c.r {
            60.0 * ((c.g - c.b) / delta).rem_euclid(6.0)
        } else if max == c.g {
            60.0 * ((c.b - c.r) / delta + 2.0)
        } else {
            60.0 * ((c.r - c.g) / delta + 4.0)
        };
        (h, s, v)
    }
}

fn linearize(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn delinearize(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn to_xyz(c: Color) -> (f64, f64, f64) {
    let r = linearize(c.r.clamp(0.0, 1.0));
    let g = linearize(c.g.clamp(0.0, 1.0));
    let b = linearize(c.b.clamp(0.0, 1.0));
    (
        0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b,
        0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b,
        0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b,
    )
}

fn from_xyz(x: f64, y: f64, z: f64) -> Color {
    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;
    Color::new(delinearize(r), delinearize(g), delinearize(b))
}

fn lab_f(t: f64) -> f64 {
    const DELTA3: f64 = 6.0 / 29.0 * (6.0 / 29.0) * (6.0 / 29.0);
    if t > DELTA3 {
        t.cbrt()
    } else {
        t / (3.0 * (6.0 / 29.0) * (6.0 / 29.0)) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

fn to_lab(c: Color) -> (f64, f64, f64) {
    let (x, y, z) = to_xyz(c);
    let fx = lab_f(x / D65_X);
    let fy = lab_f(y / D65_Y);
    let fz = lab_f(z / D65_Z);
    (116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz))
}

fn from_lab(l: f64, a: f64, b: f64) -> Color {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    from_xyz(
        D65_X * lab_f_inv(fx),
        D65_Y * lab_f_inv(fy),
        D65_Z * lab_f_inv(fz),
    )
}

fn uv_prime(x: f64, y: f64, z: f64) -> (f64, f64) {
    let denom = x + 15.0 * y + 3.0 * z;
    if denom == 0.0 {
        (0.0, 0.0)
    } else {
        (4.0 * x / denom, 9.0 * y / denom)
    }
}

fn to_luv_lch(c: Color) -> (f64, f64, f64) {
    let (x, y, z) = to_xyz(c);
    let yr = y / D65_Y;
    let l = if yr > 216.0 / 24389.0 {
        116.0 * yr.cbrt() - 16.0
    } else {
        24389.0 / 27.0 * yr
    };
    let (up, vp) = uv_prime(x, y, z);
    let (unp, vnp) = uv_prime(D65_X, D65_Y, D65_Z);
    let u = 13.0 * l * (up - unp);
    let v = 13.0 * l * (vp - vnp);
    let chroma = (u * u + v * v).sqrt();
    let hue = v.atan2(u).to_degrees().rem_euclid(360.0);
    (l, chroma, hue)
}

fn from_luv_lch(l: f64, chroma: f64, hue: f64) -> Color {
    if l <= 0.0 {
        return Color::black();
    }
    let hue = hue.to_radians();
    let u = chroma * hue.cos();
    let v = chroma * hue.sin();
    let (unp, vnp) = uv_prime(D65_X, D65_Y, D65_Z);
    let up = u / (13.0 * l) + unp;
    let vp = v / (13.0 * l) + vnp;
    let y = if l > 8.0 {
        D65_Y * ((l + 16.0) / 116.0).powi(3)
    } else {
        D65_Y * l * 27.0 / 24389.0
    };
    if vp == 0.0 {
        return Color::black();
    }
    let x = y * 9.0 * up / (4.0 * vp);
    let z = y * (12.0 - 3.0 * up - 20.0 * vp) / (4.0 * vp);
    from_xyz(x, y, z)
}

/// Interpolates between two angles in degrees along the shortest arc.
fn interp_angle(a0: f64, a1: f64, t: f64) -> f64 {
    let delta = ((((a1 - a0) % 360.0) + 540.0) % 360.0) - 180.0;
    (a0 + t * delta).rem_euclid(360.0)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Color-space-aware interpolation between a canvas color and an effect's
/// target color. `t = 0` keeps `from`, `t = 1` lands on `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Blending {
    Rgb,
    Hsv,
    Lab,
    LuvLch,
    Additive,
}

impl Blending {
    pub fn mix(self, from: Color, to: Color, t: f64) -> Color {
        match self {
            Self::Rgb => Color::new(
                lerp(from.r, to.r, t),
                lerp(from.g, to.g, t),
                lerp(from.b, to.b, t),
            ),
            Self::Hsv => {
                let (h0, s0, v0) = from.to_hsv();
                let (h1, s1, v1) = to.to_hsv();
                Color::hsv(interp_angle(h0, h1, t), lerp(s0, s1, t), lerp(v0, v1, t))
            }
            Self::Lab => {
                let (l0, a0, b0) = to_lab(from);
                let (l1, a1, b1) = to_lab(to);
                from_lab(lerp(l0, l1, t), lerp(a0, a1, t), lerp(b0, b1, t)).clamped()
            }
            Self::LuvLch => {
                let (l0, c0, h0) = to_luv_lch(from);
                let (l1, c1, h1) = to_luv_lch(to);
                from_luv_lch(lerp(l0, l1, t), lerp(c0, c1, t), interp_angle(h0, h1, t)).clamped()
            }
            Self::Additive => Color::new(
                from.r + to.r * t,
                from.g + to.g * t,
                from.b + to.b * t,
            )
            .clamped(),
        }
    }
}
