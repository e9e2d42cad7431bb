//! URL parameter parsing for the service endpoints.
//!
//! The coordinate path segment is `lon,lat;lon,lat;…` or
//! `polyline(<encoded>)`. Malformed input reports the byte position of the
//! first character that failed to parse.

use base64::Engine;
use waymark_common::EngineError;

use crate::geo::Coordinate;
use crate::router::phantom::PhantomHint;

use super::polyline;

/// Parse the coordinate list of a request path.
pub fn parse_coordinates(segment: &str) -> Result<Vec<Coordinate>, EngineError> {
    if let Some(rest) = segment.strip_prefix("polyline(") {
        let Some(encoded) = rest.strip_suffix(')') else {
            return Err(EngineError::invalid_options_at(
                segment.len() - 1,
                "unterminated polyline parameter",
            ));
        };
        return polyline::decode(encoded, 5).ok_or_else(|| {
            EngineError::invalid_options_at("polyline(".len(), "invalid polyline encoding")
        });
    }

    let mut coordinates = Vec::new();
    let mut offset = 0usize;
    for pair in segment.split(';') {
        let mut parts = pair.splitn(2, ',');
        let lon_str = parts.next().unwrap_or("");
        let lat_str = parts.next().ok_or_else(|| {
            EngineError::invalid_options_at(offset + pair.len(), "expected 'lon,lat'")
        })?;
        let lon: f64 = lon_str.parse().map_err(|_| {
            EngineError::invalid_options_at(offset, "invalid longitude")
        })?;
        let lat: f64 = lat_str.parse().map_err(|_| {
            EngineError::invalid_options_at(offset + lon_str.len() + 1, "invalid latitude")
        })?;
        let coordinate = Coordinate::from_degrees(lon, lat);
        if !coordinate.is_valid() {
            return Err(EngineError::invalid_options_at(
                offset,
                "coordinate out of range",
            ));
        }
        coordinates.push(coordinate);
        offset += pair.len() + 1;
    }
    if coordinates.is_empty() {
        return Err(EngineError::invalid_options_at(0, "no coordinates given"));
    }
    Ok(coordinates)
}

/// `bearings=θ,r;;θ,r` — one optional `(bearing, range)` per coordinate.
pub fn parse_bearings(
    value: &str,
    expected: usize,
) -> Result<Vec<Option<(u16, u16)>>, EngineError> {
    let mut bearings = Vec::new();
    let mut offset = 0usize;
    for entry in value.split(';') {
        if entry.is_empty() {
            bearings.push(None);
        } else {
            let mut parts = entry.splitn(2, ',');
            let bearing: u16 = parts
                .next()
                .unwrap_or("")
                .parse()
                .map_err(|_| EngineError::invalid_options_at(offset, "invalid bearing"))?;
            let range: u16 = parts
                .next()
                .ok_or_else(|| {
                    EngineError::invalid_options_at(offset, "bearing needs a range")
                })?
                .parse()
                .map_err(|_| EngineError::invalid_options_at(offset, "invalid bearing range"))?;
            if bearing >= 360 || range > 180 {
                return Err(EngineError::invalid_options_at(
                    offset,
                    "bearing out of range",
                ));
            }
            bearings.push(Some((bearing, range)));
        }
        offset += entry.len() + 1;
    }
    if bearings.len() != expected {
        return Err(EngineError::invalid_options_at(
            0,
            format!("expected {expected} bearing entries, got {}", bearings.len()),
        ));
    }
    Ok(bearings)
}

/// `radiuses=r;unlimited;r` — one optional snap radius per coordinate.
pub fn parse_radiuses(value: &str, expected: usize) -> Result<Vec<Option<f64>>, EngineError> {
    let mut radiuses = Vec::new();
    let mut offset = 0usize;
    for entry in value.split(';') {
        if entry.is_empty() || entry == "unlimited" {
            radiuses.push(None);
        } else {
            let radius: f64 = entry
                .parse()
                .map_err(|_| EngineError::invalid_options_at(offset, "invalid radius"))?;
            if radius <= 0.0 {
                return Err(EngineError::invalid_options_at(
                    offset,
                    "radius must be positive",
                ));
            }
            radiuses.push(Some(radius));
        }
        offset += entry.len() + 1;
    }
    if radiuses.len() != expected {
        return Err(EngineError::invalid_options_at(
            0,
            format!("expected {expected} radius entries, got {}", radiuses.len()),
        ));
    }
    Ok(radiuses)
}

/// Opaque hint blobs: base64-wrapped serialized phantoms with a checksum.
pub fn parse_hints(value: &str, expected: usize) -> Result<Vec<Option<PhantomHint>>, EngineError> {
    let mut hints = Vec::new();
    for (index, entry) in value.split(';').enumerate() {
        if entry.is_empty() {
            hints.push(None);
            continue;
        }
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(entry)
            .map_err(|_| EngineError::invalid_options_at(index, "invalid hint encoding"))?;
        let hint: PhantomHint = serde_json::from_slice(&decoded)
            .map_err(|_| EngineError::invalid_options_at(index, "invalid hint payload"))?;
        hints.push(Some(hint));
    }
    if hints.len() != expected {
        return Err(EngineError::invalid_options_at(
            0,
            format!("expected {expected} hint entries, got {}", hints.len()),
        ));
    }
    Ok(hints)
}

pub fn encode_hint(hint: &PhantomHint) -> String {
    let payload = serde_json::to_vec(hint).expect("hint serialization is infallible");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload)
}

/// `sources=0;2;4` index list for table requests; `all` or absent means all.
pub fn parse_index_list(
    value: &str,
    coordinate_count: usize,
) -> Result<Vec<usize>, EngineError> {
    if value == "all" {
        return Ok((0..coordinate_count).collect());
    }
    let mut indices = Vec::new();
    let mut offset = 0usize;
    for entry in value.split(';') {
        let index: usize = entry
            .parse()
            .map_err(|_| EngineError::invalid_options_at(offset, "invalid index"))?;
        if index >= coordinate_count {
            return Err(EngineError::invalid_options_at(
                offset,
                format!("index {index} exceeds the coordinate count"),
            ));
        }
        indices.push(index);
        offset += entry.len() + 1;
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate_list() {
        let coordinates = parse_coordinates("4.3517,50.8503;4.4017,50.8603").unwrap();
        assert_eq!(coordinates.len(), 2);
        assert_eq!(coordinates[0], Coordinate::from_degrees(4.3517, 50.8503));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse_coordinates("4.35,50.85;bogus,50.86").unwrap_err();
        assert!(err.message.contains("position 11"), "got: {}", err.message);
    }

    #[test]
    fn test_parse_polyline_segment() {
        let original = vec![
            Coordinate::from_degrees(4.3517, 50.8503),
            Coordinate::from_degrees(4.4017, 50.8603),
        ];
        let segment = format!("polyline({})", polyline::encode(&original, 5));
        let parsed = parse_coordinates(&segment).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!((parsed[0].lon_degrees() - 4.3517).abs() < 1e-5);
    }

    #[test]
    fn test_parse_bearings() {
        let bearings = parse_bearings("90,20;;180,10", 3).unwrap();
        assert_eq!(bearings[0], Some((90, 20)));
        assert_eq!(bearings[1], None);
        assert_eq!(bearings[2], Some((180, 10)));
        assert!(parse_bearings("400,20", 1).is_err());
        assert!(parse_bearings("90,20", 2).is_err());
    }

    #[test]
    fn test_parse_radiuses() {
        let radiuses = parse_radiuses("100;unlimited;5.5", 3).unwrap();
        assert_eq!(radiuses[0], Some(100.0));
        assert_eq!(radiuses[1], None);
        assert_eq!(radiuses[2], Some(5.5));
        assert!(parse_radiuses("-3", 1).is_err());
    }

    #[test]
    fn test_hint_round_trip() {
        let hint = PhantomHint {
            checksum: 0xAB12,
            forward_id: 7,
            forward_enabled: true,
            reverse_id: 8,
            reverse_enabled: false,
            forward_weight: 10,
            reverse_weight: 0,
            forward_offset: 5,
            reverse_offset: 0,
            location: (4_351_700, 50_850_300),
            input_location: (4_351_800, 50_850_400),
        };
        let encoded = encode_hint(&hint);
        let parsed = parse_hints(&encoded, 1).unwrap();
        let decoded = parsed[0].as_ref().unwrap();
        assert_eq!(decoded.checksum, 0xAB12);
        assert_eq!(decoded.forward_id, 7);
        assert!(!decoded.reverse_enabled);
    }

    #[test]
    fn test_index_list() {
        assert_eq!(parse_index_list("all", 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_index_list("0;2", 3).unwrap(), vec![0, 2]);
        assert!(parse_index_list("5", 3).is_err());
    }
}
