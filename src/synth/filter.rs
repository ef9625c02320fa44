use std::f64::consts::E;

/// Maps a normalized control value onto `[0, total]` along the curve
/// `(e^x - 1)^exponent / (e - 1)^exponent`. Exponent 0 degenerates to
/// a linear map.
pub fn exp_curve(x: f64, total: f64, exponent: f64) -> f64 {
    if exponent == 0.0 {
        x * total
    } else {
        x.exp_m1().powf(exponent) / (E - 1.0).powf(exponent) * total
    }
}

/// Lowpass cutoff in Hz for a normalized value in `[0, 1]`.
pub fn lowpass_hz(value: f64, nyquist: f64) -> f64 {
    exp_curve(value, nyquist, 2.0)
}

/// Highpass cutoff in Hz; the control value is inverted and the curve
/// is steeper than the lowpass one.
pub fn highpass_hz(value: f64, nyquist: f64) -> f64 {
    exp_curve(1.0 - value, nyquist, 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NYQUIST: f64 = 24_000.0;

    #[test]
    fn endpoints() {
        assert_eq!(exp_curve(0.0, NYQUIST, 2.0), 0.0);
        assert!((exp_curve(1.0, NYQUIST, 2.0) - NYQUIST).abs() < 1e-9);
        assert_eq!(lowpass_hz(0.0, NYQUIST), 0.0);
        assert!((lowpass_hz(1.0, NYQUIST) - NYQUIST).abs() < 1e-9);
        assert!((highpass_hz(0.0, NYQUIST) - NYQUIST).abs() < 1e-9);
        assert_eq!(highpass_hz(1.0, NYQUIST), 0.0);
    }

    #[test]
    fn monotonic_in_value() {
        let mut prev = -1.0;
        for i in 0..=100 {
            let v = i as f64 / 100.0;
            let hz = lowpass_hz(v, NYQUIST);
            assert!(hz > prev, "lowpass not increasing at v={v}");
            prev = hz;
        }
    }

    #[test]
    fn zero_exponent_is_linear() {
        assert_eq!(exp_curve(0.25, 1_000.0, 0.0), 250.0);
    }
}
