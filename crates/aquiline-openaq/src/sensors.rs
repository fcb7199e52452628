//! Location and sensor discovery for a geographic area.

use aquiline_core::error::FetchError;

use crate::fetcher::{PageQuery, PageSource, PaginatedFetcher};
use crate::page::Location;

/// Bounding box in `min_lon, min_lat, max_lon, max_lat` order (the
/// upstream's convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bbox {
    /// Query-parameter rendering: `minx,miny,maxx,maxy`.
    pub fn to_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

impl std::str::FromStr for Bbox {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid bbox {s:?}: {e}"))?;
        if parts.len() != 4 {
            return Err(format!("bbox needs 4 values, got {}", parts.len()));
        }
        if parts[0] >= parts[2] || parts[1] >= parts[3] {
            return Err(format!("bbox {s:?} is not min_lon,min_lat,max_lon,max_lat"));
        }
        Ok(Self {
            min_lon: parts[0],
            min_lat: parts[1],
            max_lon: parts[2],
            max_lat: parts[3],
        })
    }
}

/// One sensor to fetch, flattened out of its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: i64,
    pub location_id: i64,
    pub parameter: String,
    pub units: Option<String>,
}

/// Flatten every location's sensor list, preserving location order and
/// dropping duplicate sensor ids (the API repeats a sensor when a
/// location appears under multiple owners).
pub fn flatten_sensors(locations: &[Location]) -> Vec<Sensor> {
    let mut seen = std::collections::HashSet::new();
    let mut sensors = Vec::new();
    for location in locations {
        for sensor in &location.sensors {
            if seen.insert(sensor.id) {
                sensors.push(Sensor {
                    id: sensor.id,
                    location_id: location.id,
                    parameter: sensor.parameter.name.clone(),
                    units: sensor.parameter.units.clone(),
                });
            }
        }
    }
    sensors
}

/// Discover every sensor inside `bbox` via the paginated locations
/// endpoint.
pub fn discover_sensors<S: PageSource<Location>>(
    source: &mut S,
    fetcher: &PaginatedFetcher,
    bbox: &Bbox,
) -> Result<Vec<Sensor>, FetchError> {
    let locations = fetcher.fetch(source, &PageQuery::locations(bbox))?;
    let sensors = flatten_sensors(&locations);
    log::info!(
        "discovered {} locations, {} sensors in bbox {}",
        locations.len(),
        sensors.len(),
        bbox.to_param()
    );
    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Page, PageMeta, ParameterRef, SensorRef};
    use aquiline_core::http::ApiError;

    fn location(id: i64, sensor_ids: &[i64]) -> Location {
        Location {
            id,
            name: None,
            coordinates: None,
            sensors: sensor_ids
                .iter()
                .map(|&sid| SensorRef {
                    id: sid,
                    parameter: ParameterRef {
                        id: 2,
                        name: "pm25".into(),
                        units: Some("µg/m³".into()),
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn bbox_parses_and_renders() {
        let bbox: Bbox = "126.760597,37.422799,127.190437,37.709356".parse().unwrap();
        assert_eq!(bbox.min_lon, 126.760597);
        assert_eq!(bbox.max_lat, 37.709356);
        assert_eq!(bbox.to_param(), "126.760597,37.422799,127.190437,37.709356");
    }

    #[test]
    fn bbox_rejects_wrong_arity() {
        assert!("1,2,3".parse::<Bbox>().is_err());
        assert!("1,2,3,4,5".parse::<Bbox>().is_err());
    }

    #[test]
    fn bbox_rejects_inverted_corners() {
        assert!("127.0,37.0,126.0,38.0".parse::<Bbox>().is_err());
    }

    #[test]
    fn flatten_preserves_order_and_dedups() {
        let locations = vec![
            location(10, &[100, 101]),
            location(11, &[101, 102]), // 101 repeated under a second location
        ];
        let sensors = flatten_sensors(&locations);
        assert_eq!(
            sensors.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![100, 101, 102]
        );
        assert_eq!(sensors[1].location_id, 10);
        assert_eq!(sensors[2].location_id, 11);
    }

    #[test]
    fn flatten_empty_locations() {
        assert!(flatten_sensors(&[location(10, &[])]).is_empty());
    }

    struct OnePage(Vec<Location>);

    impl PageSource<Location> for OnePage {
        fn fetch_page(
            &mut self,
            _query: &PageQuery,
            _page: u32,
        ) -> Result<Page<Location>, ApiError> {
            Ok(Page {
                meta: PageMeta {
                    page: 1,
                    limit: 1000,
                    found: self.0.len() as u64,
                },
                results: std::mem::take(&mut self.0),
            })
        }
    }

    #[test]
    fn discover_flattens_paginated_locations() {
        let mut source = OnePage(vec![location(10, &[100]), location(11, &[200])]);
        let bbox: Bbox = "2.15,48.74,2.54,48.96".parse().unwrap();
        let sensors =
            discover_sensors(&mut source, &PaginatedFetcher::default(), &bbox).unwrap();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].id, 100);
    }
}
