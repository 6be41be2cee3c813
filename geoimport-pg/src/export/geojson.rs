//! Export GeoJSON de preview (streaming)
//!
//! Écrit les collections catégorisées de la preview en GeoJSON. Les
//! géométries 2D passent par geozero; celles qui portent un Z sont
//! sérialisées avec des positions 3D.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use dxfgeo::Feature;

use crate::formats::to_geojson_feature;

/// Exporte des features en GeoJSON.
///
/// `epsg` vaut `None` quand le système source est inconnu; le membre crs
/// est alors omis.
pub fn export_to_geojson(
    features: &[&Feature],
    epsg: Option<u32>,
    output_path: &Path,
) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    // Header FeatureCollection, avec CRS quand il est connu
    match epsg {
        Some(epsg) => write!(
            writer,
            r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
            epsg
        )?,
        None => write!(writer, r#"{{"type":"FeatureCollection","features":["#)?,
    }

    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(&mut writer, feature)?;
    }

    write!(writer, "]}}")?;
    writer.flush()?;

    Ok(())
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(writer: &mut W, feature: &Feature) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","#)?;

    write!(writer, r#""geometry":"#)?;
    if feature.z.is_some() {
        // Positions 3D: sérialisation via le modèle geojson
        let geojson_feature = to_geojson_feature(feature);
        let geometry = geojson_feature
            .geometry
            .expect("converted feature always has a geometry");
        serde_json::to_writer(&mut *writer, &geometry)?;
    } else {
        // Chemin 2D: streaming geozero
        let mut buffer = Vec::new();
        let mut geometry_writer = GeoJsonWriter::new(&mut buffer);
        feature.geometry.process_geom(&mut geometry_writer)?;
        writer.write_all(&buffer)?;
    }

    write!(
        writer,
        r#","properties":{{"layer":"{}","entity_type":"{}""#,
        escape_json(&feature.layer),
        feature.entity_type
    )?;
    if let Some(handle) = &feature.handle {
        write!(writer, r#","handle":"{}""#, escape_json(handle))?;
    }
    for (key, value) in &feature.properties {
        write!(
            writer,
            r#","{}":"{}""#,
            escape_json(key),
            escape_json(value)
        )?;
    }
    write!(writer, "}}}}")?;

    Ok(())
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}
