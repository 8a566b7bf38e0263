use chrono::{DateTime, Utc};
use nom::{
    bytes::complete::take,
    combinator::map,
    number::complete::{le_i16, le_u16, le_u32, le_u8},
    IResult,
};

/// Field-level helpers shared by the packet parsers and encoders.
pub struct Utils;

impl Utils {
    // fixed-point decoders {{{
    pub fn le_u16_div10(input: &[u8]) -> IResult<&[u8], f64> {
        map(le_u16, |v| f64::from(v) / 10.0)(input)
    }

    pub fn le_u16_div100(input: &[u8]) -> IResult<&[u8], f64> {
        map(le_u16, |v| f64::from(v) / 100.0)(input)
    }

    pub fn le_i16_div10(input: &[u8]) -> IResult<&[u8], f64> {
        map(le_i16, |v| f64::from(v) / 10.0)(input)
    }

    pub fn le_u32_div10(input: &[u8]) -> IResult<&[u8], f64> {
        map(le_u32, |v| f64::from(v) / 10.0)(input)
    }

    pub fn le_u32_div1000(input: &[u8]) -> IResult<&[u8], f64> {
        map(le_u32, |v| f64::from(v) / 1000.0)(input)
    }
    // }}}

    pub fn le_u32_unixtime(input: &[u8]) -> IResult<&[u8], DateTime<Utc>> {
        map(le_u32, |secs| {
            DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
        })(input)
    }

    /// Any `u8`-backed enum; unknown values land in its catch-all variant.
    pub fn enum_u8<T: From<u8>>(input: &[u8]) -> IResult<&[u8], T> {
        map(le_u8, T::from)(input)
    }

    // padded ascii {{{
    pub fn ascii8(input: &[u8]) -> IResult<&[u8], String> {
        Self::ascii(input, 8)
    }

    pub fn ascii16(input: &[u8]) -> IResult<&[u8], String> {
        Self::ascii(input, 16)
    }

    pub fn ascii24(input: &[u8]) -> IResult<&[u8], String> {
        Self::ascii(input, 24)
    }

    pub fn ascii32(input: &[u8]) -> IResult<&[u8], String> {
        Self::ascii(input, 32)
    }

    fn ascii(input: &[u8], width: usize) -> IResult<&[u8], String> {
        map(take(width), Self::trim_padding)(input)
    }

    pub fn trim_padding(raw: &[u8]) -> String {
        let end = raw
            .iter()
            .rposition(|b| *b != 0 && *b != b' ')
            .map_or(0, |p| p + 1);
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }
    // }}}

    // encoders {{{
    // `as` saturates, so out-of-range fixtures would otherwise encode quietly
    pub fn fixed_u16(value: f64, scale: f64) -> [u8; 2] {
        let raw = Self::scaled(value, scale, 0.0, f64::from(u16::MAX));
        (raw as u16).to_le_bytes()
    }

    pub fn fixed_i16(value: f64, scale: f64) -> [u8; 2] {
        let raw = Self::scaled(value, scale, f64::from(i16::MIN), f64::from(i16::MAX));
        (raw as i16).to_le_bytes()
    }

    pub fn fixed_u32(value: f64, scale: f64) -> [u8; 4] {
        let raw = Self::scaled(value, scale, 0.0, f64::from(u32::MAX));
        (raw as u32).to_le_bytes()
    }

    fn scaled(value: f64, scale: f64, min: f64, max: f64) -> f64 {
        let raw = (value * scale).round();
        debug_assert!(
            (min..=max).contains(&raw),
            "{} at scale {} does not fit in [{}, {}]",
            value,
            scale,
            min,
            max
        );
        raw
    }

    pub fn unixtime(value: &DateTime<Utc>) -> [u8; 4] {
        (value.timestamp().clamp(0, i64::from(u32::MAX)) as u32).to_le_bytes()
    }

    /// Left-aligned, NUL padded, truncated to `width`.
    pub fn padded_ascii(value: &str, width: usize) -> Vec<u8> {
        let mut r = vec![0; width];
        let bytes = value.as_bytes();
        let len = bytes.len().min(width);
        r[..len].copy_from_slice(&bytes[..len]);
        r
    }
    // }}}

    pub fn round(x: f64, decimals: u32) -> f64 {
        let y = 10i32.pow(decimals) as f64;
        (x * y).round() / y
    }

    /// Mean over the phases that carry a non-zero reading.
    pub fn avg_energised(values: &[f64]) -> f64 {
        let live: Vec<f64> = values.iter().copied().filter(|v| *v != 0.0).collect();
        if live.is_empty() {
            return 0.0;
        }
        Self::round(live.iter().sum::<f64>() / live.len() as f64, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_is_exact() {
        let (_, v) = Utils::le_u16_div10(&164u16.to_le_bytes()).unwrap();
        assert_eq!(v, 16.4);
        let (_, v) = Utils::le_u16_div100(&1234u16.to_le_bytes()).unwrap();
        assert_eq!(v, 12.34);
        assert_eq!(Utils::fixed_u16(16.4, 10.0), 164u16.to_le_bytes());
    }

    #[test]
    fn fixed_point_limits() {
        assert_eq!(Utils::fixed_u16(655.35, 100.0), u16::MAX.to_le_bytes());
        assert_eq!(Utils::fixed_i16(-5.5, 10.0), (-55i16).to_le_bytes());
        assert_eq!(Utils::fixed_u32(0.0, 1000.0), [0; 4]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not fit")]
    fn negative_power_does_not_encode() {
        Utils::fixed_u16(-1.0, 100.0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not fit")]
    fn overflowing_temperature_does_not_encode() {
        Utils::fixed_i16(4000.0, 10.0);
    }

    #[test]
    fn negative_temperature() {
        let (_, v) = Utils::le_i16_div10(&(-55i16).to_le_bytes()).unwrap();
        assert_eq!(v, -5.5);
    }

    #[test]
    fn trims_nul_and_space() {
        assert_eq!(Utils::trim_padding(b"1.2.3\0\0\0"), "1.2.3");
        assert_eq!(Utils::trim_padding(b"home wifi   "), "home wifi");
        assert_eq!(Utils::trim_padding(&[0; 8]), "");
    }

    #[test]
    fn short_input_is_an_error_not_a_panic() {
        assert!(Utils::ascii16(b"abc").is_err());
        assert!(Utils::le_u32_div10(&[1, 2]).is_err());
    }

    #[test]
    fn averages_skip_dead_phases() {
        assert_eq!(Utils::avg_energised(&[230.0, 0.0, 0.0]), 230.0);
        assert_eq!(Utils::avg_energised(&[230.0, 231.0, 232.0]), 231.0);
        assert_eq!(Utils::avg_energised(&[0.0, 0.0, 0.0]), 0.0);
    }
}
