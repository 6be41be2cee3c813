//! Conversion des entités DXF en features géographiques
//!
//! Chaque entité produit zéro ou une feature. Les entités auxquelles il
//! manque des attributs requis (sommets, coordonnées finies) sont rejetées
//! avec un warning structuré et comptées, jamais converties en géométrie
//! malformée.

use std::collections::HashMap;

use geo::{Coord, Geometry, LineString, Point, Polygon};
use tracing::warn;

use crate::types::{
    ConversionStats, DxfDocument, Entity, EntityCommon, Feature, Vertex, DEFAULT_LAYER,
};

/// Nombre de segments de la tessellation d'un cercle complet
const CIRCLE_SEGMENTS: usize = 64;

/// Convertit toutes les entités d'un document, en accumulant les
/// statistiques par type d'entité
pub fn convert_entities(document: &DxfDocument) -> (Vec<Feature>, ConversionStats) {
    let mut features = Vec::with_capacity(document.entities.len());
    let mut stats = ConversionStats::default();

    for entity in &document.entities {
        match convert_entity(entity) {
            Some(feature) => {
                stats.record_converted(entity.type_name());
                features.push(feature);
            }
            None => stats.record_skipped(entity.type_name()),
        }
    }

    (features, stats)
}

/// Convertit une entité en feature.
///
/// Retourne `None` (avec un warning structuré) pour une entité dont les
/// attributs requis manquent ou ne sont pas finis.
pub fn convert_entity(entity: &Entity) -> Option<Feature> {
    match entity {
        Entity::Line { common, start, end } => {
            if !start.is_finite() || !end.is_finite() {
                return reject(entity, "missing or non-finite endpoint coordinates");
            }
            let geometry = Geometry::LineString(LineString::from(vec![
                (start.x, start.y),
                (end.x, end.y),
            ]));
            let z = zip_z(&[*start, *end]);
            Some(feature(common, entity, geometry, z, HashMap::new()))
        }

        Entity::LwPolyline {
            common,
            vertices,
            elevation,
            closed,
        } => {
            let coords: Vec<(f64, f64)> = vertices
                .iter()
                .copied()
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .collect();
            if coords.len() < 2 {
                return reject(entity, "fewer than 2 finite vertices");
            }
            let (geometry, count) = polyline_geometry(&coords, *closed);
            let z = elevation.map(|e| vec![e; count]);
            Some(feature(common, entity, geometry, z, HashMap::new()))
        }

        Entity::Polyline {
            common,
            vertices,
            closed,
        } => {
            let finite: Vec<Vertex> = vertices.iter().copied().filter(Vertex::is_finite).collect();
            if finite.len() < 2 {
                return reject(entity, "fewer than 2 finite vertices");
            }
            let coords: Vec<(f64, f64)> = finite.iter().map(|v| (v.x, v.y)).collect();
            let (geometry, count) = polyline_geometry(&coords, *closed);
            let z = if finite.iter().any(|v| v.z.is_some()) {
                // Anneau fermé: le Z du premier sommet est dupliqué en fin
                let mut zs: Vec<f64> =
                    finite.iter().map(|v| v.z.unwrap_or(0.0)).collect();
                while zs.len() < count {
                    zs.push(zs[0]);
                }
                Some(zs)
            } else {
                None
            };
            Some(feature(common, entity, geometry, z, HashMap::new()))
        }

        Entity::Circle {
            common,
            center,
            radius,
        } => {
            if !center.is_finite() || !radius.is_finite() || *radius <= 0.0 {
                return reject(entity, "missing center or non-positive radius");
            }
            let mut ring: Vec<Coord> = (0..CIRCLE_SEGMENTS)
                .map(|i| {
                    let theta = 2.0 * std::f64::consts::PI * (i as f64) / (CIRCLE_SEGMENTS as f64);
                    Coord {
                        x: center.x + radius * theta.cos(),
                        y: center.y + radius * theta.sin(),
                    }
                })
                .collect();
            // Fermeture exacte: sin(2π) en f64 n'est pas exactement 0
            ring.push(ring[0]);
            let count = ring.len();
            let geometry = Geometry::Polygon(Polygon::new(LineString::new(ring), vec![]));
            let z = center.z.map(|cz| vec![cz; count]);
            Some(feature(common, entity, geometry, z, HashMap::new()))
        }

        Entity::Arc {
            common,
            center,
            radius,
            start_angle,
            end_angle,
        } => {
            if !center.is_finite() || !radius.is_finite() || *radius <= 0.0 {
                return reject(entity, "missing center or non-positive radius");
            }
            if !start_angle.is_finite() || !end_angle.is_finite() {
                return reject(entity, "non-finite arc angles");
            }
            let start = start_angle.to_radians();
            // Les arcs DXF tournent en sens trigonométrique; un angle de fin
            // inférieur à l'angle de début enjambe 0°
            let mut sweep = end_angle - start_angle;
            if sweep <= 0.0 {
                sweep += 360.0;
            }
            let sweep = sweep.to_radians();
            let segments =
                ((CIRCLE_SEGMENTS as f64) * sweep / (2.0 * std::f64::consts::PI)).ceil() as usize;
            let segments = segments.max(2);
            let coords: Vec<Coord> = (0..=segments)
                .map(|i| {
                    let theta = start + sweep * (i as f64) / (segments as f64);
                    Coord {
                        x: center.x + radius * theta.cos(),
                        y: center.y + radius * theta.sin(),
                    }
                })
                .collect();
            let count = coords.len();
            let geometry = Geometry::LineString(LineString::new(coords));
            let z = center.z.map(|cz| vec![cz; count]);
            Some(feature(common, entity, geometry, z, HashMap::new()))
        }

        Entity::Point { common, position } => {
            if !position.is_finite() {
                return reject(entity, "missing or non-finite position");
            }
            let geometry = Geometry::Point(Point::new(position.x, position.y));
            let z = position.z.map(|pz| vec![pz]);
            Some(feature(common, entity, geometry, z, HashMap::new()))
        }

        Entity::Text {
            common,
            position,
            content,
        } => {
            if !position.is_finite() {
                return reject(entity, "missing or non-finite position");
            }
            let geometry = Geometry::Point(Point::new(position.x, position.y));
            let z = position.z.map(|pz| vec![pz]);
            let mut properties = HashMap::new();
            properties.insert("text".to_string(), content.clone());
            Some(feature(common, entity, geometry, z, properties))
        }

        Entity::Insert {
            common,
            block_name,
            position,
        } => {
            if !position.is_finite() {
                return reject(entity, "missing or non-finite insertion point");
            }
            let geometry = Geometry::Point(Point::new(position.x, position.y));
            let z = position.z.map(|pz| vec![pz]);
            let mut properties = HashMap::new();
            properties.insert("block".to_string(), block_name.clone());
            Some(feature(common, entity, geometry, z, properties))
        }
    }
}

/// LineString ouverte, ou Polygon quand le flag closed est posé et que
/// l'anneau compte au moins 3 sommets distincts. Retourne aussi le nombre
/// de coordonnées de la géométrie produite (pour aligner les Z).
fn polyline_geometry(coords: &[(f64, f64)], closed: bool) -> (Geometry, usize) {
    if closed && coords.len() >= 3 {
        let mut ring: Vec<Coord> = coords.iter().map(|&(x, y)| Coord { x, y }).collect();
        let first = ring[0];
        let last = ring[ring.len() - 1];
        if first != last {
            ring.push(first);
        }
        let count = ring.len();
        (
            Geometry::Polygon(Polygon::new(LineString::new(ring), vec![])),
            count,
        )
    } else {
        let line: Vec<Coord> = coords.iter().map(|&(x, y)| Coord { x, y }).collect();
        let count = line.len();
        (Geometry::LineString(LineString::new(line)), count)
    }
}

/// Z alignés sur les sommets quand au moins un sommet en porte un
fn zip_z(vertices: &[Vertex]) -> Option<Vec<f64>> {
    if vertices.iter().any(|v| v.z.is_some()) {
        Some(vertices.iter().map(|v| v.z.unwrap_or(0.0)).collect())
    } else {
        None
    }
}

fn feature(
    common: &EntityCommon,
    entity: &Entity,
    geometry: Geometry,
    z: Option<Vec<f64>>,
    properties: HashMap<String, String>,
) -> Feature {
    let layer = if common.layer.is_empty() {
        DEFAULT_LAYER.to_string()
    } else {
        common.layer.clone()
    };
    Feature {
        geometry,
        z,
        layer,
        entity_type: entity.type_name(),
        handle: common.handle.clone(),
        properties,
    }
}

fn reject(entity: &Entity, reason: &str) -> Option<Feature> {
    warn!(
        entity_type = entity.type_name(),
        handle = entity.common().handle.as_deref().unwrap_or("-"),
        layer = entity.common().layer.as_str(),
        reason,
        "Skipping entity"
    );
    None
}
