use crate::config::DistrictConfig;
use crate::types::District;
use anyhow::{Context, Result, anyhow};
use geo::MultiPolygon;
use shapefile::Reader;
use std::collections::BTreeMap;
use std::fs::File;
use tracing::{debug, info, warn};

/// Load district polygons, keyed and ordered by their display name.
pub fn load_districts(config: &DistrictConfig) -> Result<Vec<District>> {
    info!("Loading districts from {:?}...", config.shapefile);

    let extension = config.shapefile.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("District geometry file has no extension"))?;

    let features = match extension.as_str() {
        "shp" => load_shapefile(config)?,
        "json" | "geojson" => load_geojson(config)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let mut districts: BTreeMap<String, District> = BTreeMap::new();
    for (name, geometry) in features {
        if districts.contains_key(&name) {
            warn!("Duplicate district name {:?}, keeping the later polygon", name);
        }
        districts.insert(name.clone(), District { name, geometry });
    }

    info!("Loaded {} districts", districts.len());

    Ok(districts.into_values().collect())
}

fn load_shapefile(config: &DistrictConfig) -> Result<Vec<(String, MultiPolygon<f64>)>> {
    let mut reader = Reader::from_path(&config.shapefile)
        .with_context(|| format!("Failed to open Shapefile: {:?}", config.shapefile))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name_value = record.get(&config.name_property)
            .ok_or_else(|| anyhow!("Name attribute '{}' not found in Shapefile", config.name_property))?;

        let name = match name_value {
            shapefile::dbase::FieldValue::Character(Some(s)) => s.trim().to_string(),
            shapefile::dbase::FieldValue::Character(None) => {
                debug!("Skipping district with null name");
                continue;
            }
            _ => return Err(anyhow!("Shapefile name attribute must be a string")),
        };

        let geometry = match shape {
            shapefile::Shape::Polygon(polygon) => {
                let geo_polygon: MultiPolygon<f64> = polygon.try_into()
                    .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?;
                geo_polygon
            },
            shapefile::Shape::PolygonM(polygon) => {
                let geo_polygon: MultiPolygon<f64> = polygon.try_into()
                    .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?;
                geo_polygon
            },
            shapefile::Shape::PolygonZ(polygon) => {
                let geo_polygon: MultiPolygon<f64> = polygon.try_into()
                    .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?;
                geo_polygon
            },
            _ => {
                debug!("Skipping non-polygon shape for district {:?}", name);
                continue;
            }
        };

        features.push((name, geometry));
    }

    Ok(features)
}

fn load_geojson(config: &DistrictConfig) -> Result<Vec<(String, MultiPolygon<f64>)>> {
    use std::io::BufReader;
    use geojson::GeoJson;

    let file = File::open(&config.shapefile)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", config.shapefile))?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::new();

    for feature in collection.features {
        let name_val = feature.properties.as_ref()
            .and_then(|props| props.get(&config.name_property));

        let name = match name_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                debug!("Skipping feature without a '{}' name", config.name_property);
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        debug!("Skipping non-polygon geometry for district {:?}", name);
                        continue;
                    }
                }
            },
            None => continue,
        };

        features.push((name, geometry));
    }

    Ok(features)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    /// A FeatureCollection of axis-aligned squares, `(name, min_lon, min_lat, size)`.
    pub(crate) fn squares_geojson(squares: &[(&str, f64, f64, f64)]) -> String {
        let features: Vec<String> = squares
            .iter()
            .map(|(name, x, y, s)| {
                format!(
                    r#"{{"type":"Feature","properties":{{"ST_NAME":"{name}"}},"geometry":{{"type":"Polygon","coordinates":[[[{x},{y}],[{x2},{y}],[{x2},{y2}],[{x},{y2}],[{x},{y}]]]}}}}"#,
                    x2 = x + s,
                    y2 = y + s,
                )
            })
            .collect();
        format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
    }

    pub(crate) fn write_districts(dir: &Path, squares: &[(&str, f64, f64, f64)]) -> DistrictConfig {
        let path = dir.join("districts.geojson");
        let mut file = File::create(&path).unwrap();
        file.write_all(squares_geojson(squares).as_bytes()).unwrap();
        DistrictConfig {
            shapefile: path,
            name_property: "ST_NAME".to_string(),
        }
    }

    #[test]
    fn loads_geojson_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_districts(
            dir.path(),
            &[("Mitte", 6.0, 50.0, 1.0), ("Brand", 7.0, 50.0, 1.0)],
        );

        let districts = load_districts(&config).unwrap();
        let names: Vec<&str> = districts.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Brand", "Mitte"]);
        assert_eq!(districts[0].geometry.0.len(), 1);
    }

    #[test]
    fn duplicate_names_keep_the_later_polygon() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_districts(
            dir.path(),
            &[("Laurensberg", 6.0, 50.0, 1.0), ("Laurensberg", 8.0, 52.0, 1.0)],
        );

        let districts = load_districts(&config).unwrap();
        assert_eq!(districts.len(), 1);
        let first = districts[0].geometry.0[0].exterior().0[0];
        assert_eq!((first.x, first.y), (8.0, 52.0));
    }

    #[test]
    fn features_without_name_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("districts.json");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"OTHER":"x"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type":"Feature","properties":{"ST_NAME":7},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
            ]}"#,
        )
        .unwrap();
        let config = DistrictConfig { shapefile: path, name_property: "ST_NAME".to_string() };

        let districts = load_districts(&config).unwrap();
        assert_eq!(districts.len(), 1);
        assert_eq!(districts[0].name, "7");
    }

    #[test]
    fn missing_dataset_is_fatal() {
        let config = DistrictConfig {
            shapefile: "/nonexistent/districts.shp".into(),
            name_property: "GN".to_string(),
        };
        let err = load_districts(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to open Shapefile"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let config = DistrictConfig {
            shapefile: "districts.kml".into(),
            name_property: "GN".to_string(),
        };
        assert!(load_districts(&config).is_err());
    }
}
