//! Timestamp rescaling between time bases.

use ffmpeg_next::Rational;

/// "No timestamp" marker (`AV_NOPTS_VALUE`).
pub const NOPTS: i64 = ffmpeg_next::ffi::AV_NOPTS_VALUE as i64;

/// Microseconds, the unit samples arrive in.
pub const MICROSECONDS: Rational = Rational(1, 1_000_000);

/// Milliseconds, the time base of every track.
pub const MILLISECONDS: Rational = Rational(1, 1000);

/// Rescales `ts` from `from` to `to`, rounding to nearest with halfway cases
/// away from zero. `i64::MIN` and `i64::MAX` are passed through unchanged, so
/// `NOPTS` stays `NOPTS`. Results outside the `i64` range saturate.
pub fn rescale(ts: i64, from: Rational, to: Rational) -> i64 {
    if ts == i64::MIN || ts == i64::MAX {
        return ts;
    }
    if from == to {
        return ts;
    }

    let num = ts as i128 * from.numerator() as i128 * to.denominator() as i128;
    let den = from.denominator() as i128 * to.numerator() as i128;
    if den == 0 {
        return NOPTS;
    }
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };

    let half = den / 2;
    let rounded = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    rounded.clamp(i64::MIN as i128 + 1, i64::MAX as i128 - 1) as i64
}

/// Converts a sample timestamp in microseconds to a track timestamp.
pub fn normalize(timestamp_us: i64, time_base: Rational) -> i64 {
    rescale(timestamp_us, MICROSECONDS, time_base)
}
