//! Chargement des formats d'entrée (DXF natif, GeoJSON en wrapper mince)
//!
//! Les deux formats convergent vers le même modèle `dxfgeo::Feature`, pour
//! que la preview, la détection de CRS et l'import partagent un seul
//! chemin aval.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::Geometry;
use geojson::GeoJson;
use serde_json::Value;
use tracing::info;

use dxfgeo::types::Header;
use dxfgeo::{bounds_of, BoundingBox, ConversionStats, CrsDetection, Feature, ParseOptions};

/// Format détecté d'un fichier d'entrée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Dxf,
    GeoJson,
}

/// Fichier chargé, quel que soit son format source
#[derive(Debug)]
pub struct LoadedFile {
    pub format: InputFormat,
    pub features: Vec<Feature>,
    pub layers: Vec<String>,
    pub crs: CrsDetection,
    pub bounds: BoundingBox,
    pub stats: ConversionStats,
}

/// Détecte le format par extension
pub fn detect_format(path: &Path) -> Result<InputFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "dxf" => Ok(InputFormat::Dxf),
        "geojson" | "json" => Ok(InputFormat::GeoJson),
        other => bail!(
            "Unsupported input format \"{}\" for {} (expected .dxf, .geojson or .json)",
            other,
            path.display()
        ),
    }
}

/// Charge un fichier de géodonnées vers le modèle commun
pub fn load_path(path: &Path, options: &ParseOptions) -> Result<LoadedFile> {
    match detect_format(path)? {
        InputFormat::Dxf => {
            let output = dxfgeo::parse_path(path, options)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(LoadedFile {
                format: InputFormat::Dxf,
                features: output.features,
                layers: output.layers,
                crs: output.crs,
                bounds: output.bounds,
                stats: output.stats,
            })
        }
        InputFormat::GeoJson => load_geojson(path, options),
    }
}

/// Wrapper mince GeoJSON: mêmes features, même détection de CRS
fn load_geojson(path: &Path, options: &ParseOptions) -> Result<LoadedFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON {}", path.display()))?;

    let input_features: Vec<geojson::Feature> = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let mut stats = ConversionStats::default();
    let mut features = Vec::with_capacity(input_features.len());

    for feature in &input_features {
        match convert_geojson_feature(feature) {
            Some(converted) => {
                stats.record_converted("GEOJSON");
                features.push(converted);
            }
            None => stats.record_skipped("GEOJSON"),
        }
    }

    let mut layer_names: Vec<&str> = features.iter().map(|f| f.layer.as_str()).collect();
    layer_names.push(dxfgeo::types::DEFAULT_LAYER);
    let layers = dxfgeo::layers::filter_user_layers(layer_names);

    let crs = dxfgeo::crs::detect(options.source_epsg, &Header::default(), &features);
    let bounds = bounds_of(&features);

    info!(
        file = %path.display(),
        features = features.len(),
        skipped = stats.skipped,
        "Loaded GeoJSON file"
    );

    Ok(LoadedFile {
        format: InputFormat::GeoJson,
        features,
        layers,
        crs,
        bounds,
        stats,
    })
}

/// Convertit une feature GeoJSON vers le modèle commun; `None` pour une
/// feature sans géométrie exploitable
fn convert_geojson_feature(feature: &geojson::Feature) -> Option<Feature> {
    let geojson_geometry = feature.geometry.as_ref()?;
    let geometry = Geometry::try_from(&geojson_geometry.value).ok()?;
    let z = extract_z_values(&geojson_geometry.value);

    let mut properties: HashMap<String, String> = HashMap::new();
    if let Some(props) = &feature.properties {
        for (key, value) in props {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            properties.insert(key.clone(), text);
        }
    }

    let layer = properties
        .get("layer")
        .cloned()
        .unwrap_or_else(|| dxfgeo::types::DEFAULT_LAYER.to_string());

    Some(Feature {
        geometry,
        z,
        layer,
        entity_type: "GEOJSON",
        handle: None,
        properties,
    })
}

/// Extrait les ordonnées Z d'une géométrie GeoJSON, dans l'ordre des
/// positions.
///
/// Descente récursive dont le cas de base est "ceci est une position":
/// la profondeur d'imbrication dépend du type, pas d'un dispatch codé en
/// dur par type. Retourne `None` quand aucune position ne porte de Z.
pub fn extract_z_values(value: &geojson::Value) -> Option<Vec<f64>> {
    fn walk(value: &geojson::Value, out: &mut Vec<f64>, any_z: &mut bool) {
        fn position(pos: &[f64], out: &mut Vec<f64>, any_z: &mut bool) {
            match pos.get(2) {
                Some(z) => {
                    *any_z = true;
                    out.push(*z);
                }
                None => out.push(0.0),
            }
        }

        match value {
            geojson::Value::Point(pos) => position(pos, out, any_z),
            geojson::Value::MultiPoint(positions) | geojson::Value::LineString(positions) => {
                for pos in positions {
                    position(pos, out, any_z);
                }
            }
            geojson::Value::MultiLineString(lines) | geojson::Value::Polygon(lines) => {
                for line in lines {
                    for pos in line {
                        position(pos, out, any_z);
                    }
                }
            }
            geojson::Value::MultiPolygon(polygons) => {
                for polygon in polygons {
                    for ring in polygon {
                        for pos in ring {
                            position(pos, out, any_z);
                        }
                    }
                }
            }
            geojson::Value::GeometryCollection(geometries) => {
                for geometry in geometries {
                    walk(&geometry.value, out, any_z);
                }
            }
        }
    }

    let mut out = Vec::new();
    let mut any_z = false;
    walk(value, &mut out, &mut any_z);
    if any_z {
        Some(out)
    } else {
        None
    }
}

/// Convertit une feature du modèle commun vers GeoJSON pour l'import,
/// avec positions 3D quand un Z est présent
pub fn to_geojson_feature(feature: &Feature) -> geojson::Feature {
    let value = geometry_to_geojson_value(&feature.geometry, feature.z.as_deref());

    let mut properties = serde_json::Map::new();
    properties.insert("layer".to_string(), Value::String(feature.layer.clone()));
    properties.insert(
        "entity_type".to_string(),
        Value::String(feature.entity_type.to_string()),
    );
    if let Some(handle) = &feature.handle {
        properties.insert("handle".to_string(), Value::String(handle.clone()));
    }
    for (key, text) in &feature.properties {
        properties.insert(key.clone(), Value::String(text.clone()));
    }

    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Construit les positions GeoJSON, en zippant les Z dans l'ordre des
/// coordonnées
fn geometry_to_geojson_value(geometry: &Geometry, z: Option<&[f64]>) -> geojson::Value {
    struct Positions<'a> {
        z: Option<&'a [f64]>,
        next: usize,
    }

    impl Positions<'_> {
        fn position(&mut self, x: f64, y: f64) -> Vec<f64> {
            let index = self.next;
            self.next += 1;
            match self.z.and_then(|zs| zs.get(index)) {
                Some(z) => vec![x, y, *z],
                None => vec![x, y],
            }
        }

        fn ring(&mut self, ls: &geo::LineString) -> Vec<Vec<f64>> {
            ls.0.iter().map(|c| self.position(c.x, c.y)).collect()
        }
    }

    let mut positions = Positions { z, next: 0 };

    match geometry {
        Geometry::Point(p) => geojson::Value::Point(positions.position(p.x(), p.y())),
        Geometry::LineString(ls) => geojson::Value::LineString(positions.ring(ls)),
        Geometry::Polygon(poly) => {
            let mut rings = vec![positions.ring(poly.exterior())];
            for interior in poly.interiors() {
                rings.push(positions.ring(interior));
            }
            geojson::Value::Polygon(rings)
        }
        Geometry::MultiPoint(mp) => geojson::Value::MultiPoint(
            mp.0.iter()
                .map(|p| positions.position(p.x(), p.y()))
                .collect(),
        ),
        Geometry::MultiLineString(mls) => geojson::Value::MultiLineString(
            mls.0.iter().map(|ls| positions.ring(ls)).collect(),
        ),
        Geometry::MultiPolygon(mp) => geojson::Value::MultiPolygon(
            mp.0.iter()
                .map(|poly| {
                    let mut rings = vec![positions.ring(poly.exterior())];
                    for interior in poly.interiors() {
                        rings.push(positions.ring(interior));
                    }
                    rings
                })
                .collect(),
        ),
        // Types sans équivalent direct: passage par la conversion 2D
        other => geojson::Value::from(other),
    }
}
