use crate::domain::model::Place;
use crate::utils::error::{EtlError, Result};

const HEADER: [&str; 7] = [
    "id",
    "name",
    "description",
    "external_id",
    "latitude",
    "longitude",
    "source",
];

/// Renders the canonical dataset as CSV, one row per place.
pub fn write_places_csv(places: &[Place]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for place in places {
        let (latitude, longitude) = place
            .coordinate
            .map(|c| (c.latitude.to_string(), c.longitude.to_string()))
            .unwrap_or_default();
        writer.write_record([
            place.id.as_deref().unwrap_or(""),
            place.name.as_str(),
            place.description.as_str(),
            place.external_id.as_deref().unwrap_or(""),
            latitude.as_str(),
            longitude.as_str(),
            place.source_name.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::storage(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| EtlError::storage(format!("CSV is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Coordinate;

    #[test]
    fn test_csv_contains_header_and_rows() {
        let mut tower = Place::new("Namsan Seoul Tower", "Iconic landmark, with views")
            .with_external_id("EXT123")
            .with_coordinate(Coordinate::new(37.5512, 126.9882).unwrap());
        tower.id = Some("place-000001".to_string());
        tower.source_name = "visitseoul".to_string();
        let bare = Place::new("서울숲", "");

        let csv = write_places_csv(&[tower, bare]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "id,name,description,external_id,latitude,longitude,source");
        assert_eq!(
            lines[1],
            "place-000001,Namsan Seoul Tower,\"Iconic landmark, with views\",EXT123,37.5512,126.9882,visitseoul"
        );
        assert_eq!(lines[2], ",서울숲,,,,,");
    }
}
