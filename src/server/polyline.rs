//! Google polyline encoding for route geometries.

use crate::geo::Coordinate;

/// Encode coordinates with the given decimal precision (5 or 6).
pub fn encode(coordinates: &[Coordinate], precision: u32) -> String {
    let factor = 10f64.powi(precision as i32);
    let mut output = String::new();
    let mut previous_lat = 0i64;
    let mut previous_lon = 0i64;

    for coordinate in coordinates {
        let lat = (coordinate.lat_degrees() * factor).round() as i64;
        let lon = (coordinate.lon_degrees() * factor).round() as i64;
        encode_value(lat - previous_lat, &mut output);
        encode_value(lon - previous_lon, &mut output);
        previous_lat = lat;
        previous_lon = lon;
    }
    output
}

fn encode_value(value: i64, output: &mut String) {
    let mut value = if value < 0 { !(value << 1) } else { value << 1 };
    while value >= 0x20 {
        output.push(((0x20 | (value & 0x1F)) as u8 + 63) as char);
        value >>= 5;
    }
    output.push((value as u8 + 63) as char);
}

/// Decode a polyline string; returns `None` on malformed input.
pub fn decode(encoded: &str, precision: u32) -> Option<Vec<Coordinate>> {
    let factor = 10f64.powi(precision as i32);
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut index = 0usize;
    let mut lat = 0i64;
    let mut lon = 0i64;

    while index < bytes.len() {
        let (delta_lat, consumed) = decode_value(&bytes[index..])?;
        index += consumed;
        let (delta_lon, consumed) = decode_value(&bytes[index..])?;
        index += consumed;
        lat += delta_lat;
        lon += delta_lon;
        coordinates.push(Coordinate::from_degrees(
            lon as f64 / factor,
            lat as f64 / factor,
        ));
    }
    Some(coordinates)
}

fn decode_value(bytes: &[u8]) -> Option<(i64, usize)> {
    let mut result = 0i64;
    let mut shift = 0u32;
    for (consumed, &byte) in bytes.iter().enumerate() {
        if !(63..=126).contains(&byte) {
            return None;
        }
        let chunk = (byte - 63) as i64;
        result |= (chunk & 0x1F) << shift;
        if chunk & 0x20 == 0 {
            let value = if result & 1 != 0 {
                !(result >> 1)
            } else {
                result >> 1
            };
            return Some((value, consumed + 1));
        }
        shift += 5;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // the canonical polyline5 reference sequence
        let coordinates = vec![
            Coordinate::from_degrees(-120.2, 38.5),
            Coordinate::from_degrees(-120.95, 40.7),
            Coordinate::from_degrees(-126.453, 43.252),
        ];
        assert_eq!(encode(&coordinates, 5), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn test_round_trip_precision5() {
        // P3: decode(encode(x)) == x within fixed-point precision
        let coordinates = vec![
            Coordinate::from_degrees(4.35171, 50.85034),
            Coordinate::from_degrees(4.35210, 50.85100),
            Coordinate::from_degrees(4.35502, 50.85211),
        ];
        let decoded = decode(&encode(&coordinates, 5), 5).unwrap();
        assert_eq!(decoded.len(), coordinates.len());
        for (a, b) in coordinates.iter().zip(&decoded) {
            assert!((a.lon_degrees() - b.lon_degrees()).abs() < 1e-5);
            assert!((a.lat_degrees() - b.lat_degrees()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_round_trip_precision6() {
        let coordinates = vec![
            Coordinate::from_degrees(13.388798, 52.517033),
            Coordinate::from_degrees(13.397631, 52.529432),
        ];
        let decoded = decode(&encode(&coordinates, 6), 6).unwrap();
        for (a, b) in coordinates.iter().zip(&decoded) {
            assert!((a.lon_degrees() - b.lon_degrees()).abs() < 1e-6);
            assert!((a.lat_degrees() - b.lat_degrees()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_malformed_input() {
        assert!(decode("\u{1}\u{2}", 5).is_none());
        assert_eq!(decode("", 5), Some(vec![]));
    }
}
