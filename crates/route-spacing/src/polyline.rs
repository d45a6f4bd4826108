//! Encoded polyline codec.
//!
//! The classic format: each coordinate is scaled by 1e5, delta-encoded
//! against the previous point, zig-zag sign encoded, and written as 5-bit
//! chunks (least significant first) offset by 63, with 0x20 marking that
//! another chunk follows.

use crate::error::{Error, Result};
use crate::geometry::Coordinate;

const PRECISION: f64 = 1e5;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION: i64 = 0x20;
const OFFSET: u8 = 63;

// 32-bit deltas need at most seven chunks.
const MAX_SHIFT: u32 = 30;

/// Decodes an encoded polyline into an ordered coordinate sequence.
///
/// # Errors
///
/// Returns an error when the input contains a character outside the
/// encoding alphabet, ends mid-value or mid-point, overflows, or decodes to a
/// coordinate outside valid latitude/longitude bounds.
#[allow(clippy::cast_precision_loss)]
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>> {
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let mut lat = 0_i64;
    let mut lng = 0_i64;
    let mut points = Vec::new();

    while index < bytes.len() {
        lat += next_value(bytes, &mut index)?;
        if index >= bytes.len() {
            return Err(Error::Truncated(index));
        }
        lng += next_value(bytes, &mut index)?;

        let point = Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION);
        if !point.is_valid() {
            return Err(Error::OutOfRange(points.len()));
        }
        points.push(point);
    }

    Ok(points)
}

fn next_value(bytes: &[u8], index: &mut usize) -> Result<i64> {
    let mut result = 0_i64;
    let mut shift = 0_u32;

    loop {
        let position = *index;
        let Some(&byte) = bytes.get(position) else {
            return Err(Error::Truncated(position));
        };
        if !(OFFSET..=OFFSET + 63).contains(&byte) {
            return Err(Error::InvalidCharacter { character: char::from(byte), position });
        }
        if shift > MAX_SHIFT {
            return Err(Error::Overflow(position));
        }

        let chunk = i64::from(byte - OFFSET);
        *index += 1;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk & CONTINUATION == 0 {
            break;
        }
    }

    Ok(if result & 1 == 0 { result >> 1 } else { !(result >> 1) })
}

/// Encodes coordinates as a polyline, rounding to five decimal places.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn encode(points: &[Coordinate]) -> String {
    let mut encoded = String::new();
    let mut prev_lat = 0_i64;
    let mut prev_lng = 0_i64;

    for point in points {
        let lat = (point.lat * PRECISION).round() as i64;
        let lng = (point.lng * PRECISION).round() as i64;
        push_value(lat - prev_lat, &mut encoded);
        push_value(lng - prev_lng, &mut encoded);
        prev_lat = lat;
        prev_lng = lng;
    }

    encoded
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn push_value(value: i64, encoded: &mut String) {
    let mut value = if value < 0 { !(value << 1) } else { value << 1 };
    while value >= CONTINUATION {
        encoded.push(char::from(((CONTINUATION | (value & CHUNK_MASK)) as u8) + OFFSET));
        value >>= 5;
    }
    encoded.push(char::from((value as u8) + OFFSET));
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    // Reference vector from the format's documentation.
    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn assert_close(actual: &[Coordinate], expected: &[(f64, f64)]) {
        assert_eq!(actual.len(), expected.len());
        for (point, (lat, lng)) in actual.iter().zip(expected) {
            assert!((point.lat - lat).abs() < 1e-9, "lat {} != {lat}", point.lat);
            assert!((point.lng - lng).abs() < 1e-9, "lng {} != {lng}", point.lng);
        }
    }

    #[test]
    fn reference_vector() {
        let points = decode(REFERENCE).expect("should decode");
        assert_close(&points, &[(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)]);
    }

    #[test]
    fn encodes_reference() {
        let points = [
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ];
        assert_eq!(encode(&points), REFERENCE);
    }

    #[test]
    fn empty_input() {
        assert_eq!(decode("").expect("should decode"), Vec::new());
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn single_negative_value() {
        // -179.98321 is the documented single-value example
        let encoded = encode(&[Coordinate::new(0.0, -179.98321)]);
        assert_eq!(encoded, "?`~oia@");
        assert_close(&decode(&encoded).expect("should decode"), &[(0.0, -179.98321)]);
    }

    #[test]
    fn truncated_value() {
        // drop the final chunk of the last longitude
        let broken = &REFERENCE[..REFERENCE.len() - 1];
        assert_eq!(decode(broken), Err(Error::Truncated(broken.len())));
    }

    #[test]
    fn missing_longitude() {
        let lat_only = "_p~iF";
        assert_eq!(decode(lat_only), Err(Error::Truncated(lat_only.len())));
    }

    #[test]
    fn invalid_character() {
        assert_eq!(
            decode("_p~iF ps|U"),
            Err(Error::InvalidCharacter { character: ' ', position: 5 })
        );
    }

    #[test]
    fn overflowing_value() {
        // eight continuation chunks cannot be a 32-bit delta
        assert_eq!(decode("~~~~~~~~?"), Err(Error::Overflow(7)));
    }

    #[test]
    fn out_of_range() {
        // deltas accumulate, so the second point lands at 95,20
        let mut encoded = encode(&[Coordinate::new(10.0, 10.0)]);
        encoded.push_str(&encode(&[Coordinate::new(85.0, 10.0)]));
        assert_eq!(decode(&encoded), Err(Error::OutOfRange(1)));
    }
}
