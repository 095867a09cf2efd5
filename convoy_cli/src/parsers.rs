use convoy_routing::coordinate::Coordinate;
use jiff::SpanRelativeTo;

pub fn parse_duration(input: &str) -> Result<jiff::SignedDuration, String> {
    if let Ok(duration) = input.parse::<jiff::SignedDuration>() {
        return Ok(duration);
    }

    if let Ok(duration) = input
        .parse::<jiff::Span>()
        .and_then(|span| span.to_duration(SpanRelativeTo::days_are_24_hours()))
    {
        return Ok(duration);
    }

    if let Ok(seconds) = input.parse::<i64>() {
        return Ok(jiff::SignedDuration::from_secs(seconds.abs()));
    }

    Err(String::from("Invalid duration"))
}

/// `lon,lat`, e.g. `-118.2437,34.0522`.
pub fn parse_coordinate(input: &str) -> Result<Coordinate, String> {
    let (lon, lat) = input
        .split_once(',')
        .ok_or_else(|| format!("Expected lon,lat but got {input}"))?;

    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("Invalid longitude {lon}"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("Invalid latitude {lat}"))?;

    let coordinate = Coordinate::new(lon, lat);
    if !coordinate.is_valid() {
        return Err(format!("Coordinate {input} is out of range"));
    }

    Ok(coordinate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s"), Ok(jiff::SignedDuration::from_secs(90)));
        assert_eq!(parse_duration("PT2M"), Ok(jiff::SignedDuration::from_secs(120)));
        assert_eq!(parse_duration("45"), Ok(jiff::SignedDuration::from_secs(45)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(
            parse_coordinate("-118.2437, 34.0522"),
            Ok(Coordinate::new(-118.2437, 34.0522))
        );
        assert!(parse_coordinate("34.0522").is_err());
        assert!(parse_coordinate("200,10").is_err());
        assert!(parse_coordinate("a,b").is_err());
    }
}
