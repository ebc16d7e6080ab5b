use thiserror::Error;

// D65 reference white, 2 degree observer.
const XN: f64 = 0.95047;
const YN: f64 = 1.0;
const ZN: f64 = 1.08883;

// CIE Lab constants (24389/27 and 216/24389).
const KAPPA: f64 = 903.2962962962963;
const EPSILON: f64 = 0.008856451679035631;

#[derive(Debug, Error)]
pub enum ColorError {
    #[error("invalid hex color {0:?}")]
    InvalidHex(String),
}

/// sRGB color with channels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

#[derive(Debug, Clone, Copy)]
struct Lch {
    l: f64,
    c: f64,
    h: f64,
}

pub fn parse_hex(hex: &str) -> Result<Rgb, ColorError> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidHex(hex.to_string()));
    }
    let channel = |i: usize| -> f64 {
        u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0) as f64 / 255.0
    };
    Ok(Rgb { r: channel(0), g: channel(2), b: channel(4) })
}

pub fn to_hex(rgb: Rgb) -> String {
    let quantize = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", quantize(rgb.r), quantize(rgb.g), quantize(rgb.b))
}

/// A ramp of `steps` colors between two hex endpoints, interpolated in CIE
/// LCh so lightness progresses evenly across the scale. Endpoints are
/// reproduced exactly at the first and last step.
pub fn lch_ramp(start: &str, end: &str, steps: usize) -> Result<Vec<String>, ColorError> {
    let from = rgb_to_lch(parse_hex(start)?);
    let to = rgb_to_lch(parse_hex(end)?);

    // Hue is meaningless on achromatic endpoints; borrow the other side's so
    // the arc does not sweep through arbitrary hues.
    let (from_h, to_h) = match (from.c < 1e-4, to.c < 1e-4) {
        (true, false) => (to.h, to.h),
        (false, true) => (from.h, from.h),
        _ => (from.h, to.h),
    };

    // shortest angular path
    let mut dh = to_h - from_h;
    if dh > 180.0 {
        dh -= 360.0;
    } else if dh < -180.0 {
        dh += 360.0;
    }

    let mut colors = Vec::with_capacity(steps);
    for i in 0..steps {
        let t = if steps <= 1 { 0.0 } else { i as f64 / (steps - 1) as f64 };
        let mixed = Lch {
            l: from.l + t * (to.l - from.l),
            c: from.c + t * (to.c - from.c),
            h: (from_h + t * dh).rem_euclid(360.0),
        };
        colors.push(to_hex(lch_to_rgb(mixed)));
    }
    Ok(colors)
}

fn rgb_to_lch(rgb: Rgb) -> Lch {
    let r = linearize(rgb.r);
    let g = linearize(rgb.g);
    let b = linearize(rgb.b);

    let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
    let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
    let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;

    let fx = lab_f(x / XN);
    let fy = lab_f(y / YN);
    let fz = lab_f(z / ZN);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b2 = 200.0 * (fy - fz);

    Lch {
        l,
        c: a.hypot(b2),
        h: b2.atan2(a).to_degrees().rem_euclid(360.0),
    }
}

fn lch_to_rgb(lch: Lch) -> Rgb {
    let h = lch.h.to_radians();
    let a = lch.c * h.cos();
    let b = lch.c * h.sin();

    let fy = (lch.l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let xr = inv_lab_f(fx);
    let yr = if lch.l > KAPPA * EPSILON { fy.powi(3) } else { lch.l / KAPPA };
    let zr = inv_lab_f(fz);

    let x = xr * XN;
    let y = yr * YN;
    let z = zr * ZN;

    let r = 3.2404542 * x - 1.5371385 * y - 0.4985314 * z;
    let g = -0.9692660 * x + 1.8760108 * y + 0.0415560 * z;
    let b = 0.0556434 * x - 0.2040259 * y + 1.0572252 * z;

    Rgb {
        r: delinearize(r).clamp(0.0, 1.0),
        g: delinearize(g).clamp(0.0, 1.0),
        b: delinearize(b).clamp(0.0, 1.0),
    }
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn inv_lab_f(f: f64) -> f64 {
    let cubed = f.powi(3);
    if cubed > EPSILON {
        cubed
    } else {
        (116.0 * f - 16.0) / KAPPA
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
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}
