//! Détection progressive du système de coordonnées
//!
//! Trois stratégies ordonnées, la première qui réussit gagne:
//! 1. système fourni par l'appelant (confiance `Exact`, aucun contrôle)
//! 2. indice EPSG dans les variables du header, validé par la plausibilité
//!    des magnitudes de coordonnées (confiance `Header`)
//! 3. heuristique par magnitude sur un échantillon de points (confiance
//!    `Heuristic`)
//!
//! Aucun défaut silencieux: sans succès, le résultat est `Unknown` et les
//! consommateurs doivent demander une saisie explicite à l'utilisateur.

use std::ops::RangeInclusive;

use geo::Geometry;
use regex::Regex;
use tracing::{debug, warn};

use crate::types::{Feature, Header};

/// Niveau de confiance d'une détection, jamais promu silencieusement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsConfidence {
    /// Système fourni explicitement par l'utilisateur
    Exact,
    /// Dérivé des métadonnées du header
    Header,
    /// Déduit des magnitudes de coordonnées
    Heuristic,
}

/// Un système détecté avec sa confiance et la méthode employée
#[derive(Debug, Clone, PartialEq)]
pub struct CrsGuess {
    pub epsg: u32,
    pub name: &'static str,
    pub confidence: CrsConfidence,
    pub method: String,
}

/// État terminal de la détection
#[derive(Debug, Clone, PartialEq)]
pub enum CrsDetection {
    Known(CrsGuess),
    /// Aucune stratégie n'a abouti; requiert une saisie utilisateur
    Unknown,
}

impl CrsDetection {
    pub fn epsg(&self) -> Option<u32> {
        match self {
            CrsDetection::Known(guess) => Some(guess.epsg),
            CrsDetection::Unknown => None,
        }
    }
}

/// Signature de magnitude d'un système candidat
struct CandidateSystem {
    epsg: u32,
    name: &'static str,
    x_range: RangeInclusive<f64>,
    y_range: RangeInclusive<f64>,
}

/// Systèmes candidats, du plus spécifique au plus générique.
/// Les plages LV95/LV03 couvrent l'emprise officielle de la Suisse.
const CANDIDATE_SYSTEMS: &[CandidateSystem] = &[
    CandidateSystem {
        epsg: 2056,
        name: "CH1903+ / LV95",
        x_range: 2_450_000.0..=2_850_000.0,
        y_range: 1_050_000.0..=1_350_000.0,
    },
    CandidateSystem {
        epsg: 21781,
        name: "CH1903 / LV03",
        x_range: 450_000.0..=850_000.0,
        y_range: 50_000.0..=350_000.0,
    },
    CandidateSystem {
        epsg: 25832,
        name: "ETRS89 / UTM zone 32N",
        x_range: 100_000.0..=900_000.0,
        y_range: 1_000_000.0..=9_330_000.0,
    },
    CandidateSystem {
        epsg: 4326,
        name: "WGS 84",
        x_range: -180.0..=180.0,
        y_range: -90.0..=90.0,
    },
    CandidateSystem {
        epsg: 3857,
        name: "WGS 84 / Pseudo-Mercator",
        x_range: -20_037_508.34..=20_037_508.34,
        y_range: -20_048_966.1..=20_048_966.1,
    },
];

/// Part minimale de l'échantillon devant tomber dans les plages d'un
/// candidat pour qu'il soit retenu
const MATCH_RATIO: f64 = 0.9;

/// Taille maximale de l'échantillon de coordonnées examiné
const SAMPLE_SIZE: usize = 200;

/// Détecte le système de coordonnées d'un ensemble de features.
pub fn detect(
    user_epsg: Option<u32>,
    header: &Header,
    features: &[Feature],
) -> CrsDetection {
    // 1. Override utilisateur: confiance exacte, aucun contrôle
    if let Some(epsg) = user_epsg {
        return CrsDetection::Known(CrsGuess {
            epsg,
            name: system_name(epsg),
            confidence: CrsConfidence::Exact,
            method: "user override".to_string(),
        });
    }

    let sample = sample_coords(features);

    // 2. Indice du header, validé par la plausibilité des magnitudes
    if let Some(epsg) = header_epsg_hint(header) {
        if is_plausible(epsg, &sample) {
            return CrsDetection::Known(CrsGuess {
                epsg,
                name: system_name(epsg),
                confidence: CrsConfidence::Header,
                method: format!("header hint EPSG:{epsg}"),
            });
        }
        warn!(
            epsg,
            "Header EPSG hint rejected: coordinate magnitudes are not plausible"
        );
    }

    // 3. Heuristique par magnitude
    if sample.is_empty() {
        return CrsDetection::Unknown;
    }
    for system in CANDIDATE_SYSTEMS {
        let matching = sample
            .iter()
            .filter(|(x, y)| system.x_range.contains(x) && system.y_range.contains(y))
            .count();
        if matching as f64 >= sample.len() as f64 * MATCH_RATIO {
            debug!(
                epsg = system.epsg,
                matching,
                sample = sample.len(),
                "Coordinate magnitude heuristic matched"
            );
            return CrsDetection::Known(CrsGuess {
                epsg: system.epsg,
                name: system.name,
                confidence: CrsConfidence::Heuristic,
                method: format!(
                    "coordinate magnitude ({matching}/{} points)",
                    sample.len()
                ),
            });
        }
    }

    CrsDetection::Unknown
}

/// Cherche un indice EPSG dans les valeurs des variables du header
/// (variables custom, chaînes de projection, commentaires recopiés)
fn header_epsg_hint(header: &Header) -> Option<u32> {
    // Compilée à chaque détection: une seule détection par import
    let pattern = Regex::new(r"EPSG[:\s]*([0-9]{4,5})").expect("static regex");

    for value in header.variables.values() {
        if let Some(captures) = pattern.captures(value) {
            if let Ok(epsg) = captures[1].parse::<u32>() {
                return Some(epsg);
            }
        }
    }
    None
}

/// Vérifie qu'un EPSG annoncé est plausible au vu des coordonnées.
///
/// Un système absent de la table des candidats ne peut pas être contredit:
/// il est accepté tel quel. Un échantillon vide ne contredit rien non plus.
fn is_plausible(epsg: u32, sample: &[(f64, f64)]) -> bool {
    let Some(system) = CANDIDATE_SYSTEMS.iter().find(|s| s.epsg == epsg) else {
        return true;
    };
    if sample.is_empty() {
        return true;
    }
    let matching = sample
        .iter()
        .filter(|(x, y)| system.x_range.contains(x) && system.y_range.contains(y))
        .count();
    matching as f64 >= sample.len() as f64 * MATCH_RATIO
}

fn system_name(epsg: u32) -> &'static str {
    CANDIDATE_SYSTEMS
        .iter()
        .find(|s| s.epsg == epsg)
        .map(|s| s.name)
        .unwrap_or("")
}

/// Prélève un échantillon de coordonnées représentatif (premier point de
/// chaque feature, jusqu'à `SAMPLE_SIZE`)
fn sample_coords(features: &[Feature]) -> Vec<(f64, f64)> {
    let mut sample = Vec::new();
    for feature in features {
        if sample.len() >= SAMPLE_SIZE {
            break;
        }
        if let Some(coord) = first_coord(&feature.geometry) {
            sample.push(coord);
        }
    }
    sample
}

fn first_coord(geometry: &Geometry) -> Option<(f64, f64)> {
    match geometry {
        Geometry::Point(p) => Some((p.x(), p.y())),
        Geometry::Line(l) => Some((l.start.x, l.start.y)),
        Geometry::LineString(ls) => ls.0.first().map(|c| (c.x, c.y)),
        Geometry::Polygon(poly) => poly.exterior().0.first().map(|c| (c.x, c.y)),
        Geometry::MultiPoint(mp) => mp.0.first().map(|p| (p.x(), p.y())),
        Geometry::MultiLineString(mls) => mls.0.first().and_then(|ls| {
            ls.0.first().map(|c| (c.x, c.y))
        }),
        Geometry::MultiPolygon(mp) => mp
            .0
            .first()
            .and_then(|poly| poly.exterior().0.first().map(|c| (c.x, c.y))),
        Geometry::GeometryCollection(gc) => gc.0.first().and_then(first_coord),
        Geometry::Rect(r) => Some((r.min().x, r.min().y)),
        Geometry::Triangle(t) => Some((t.0.x, t.0.y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use std::collections::HashMap;

    fn point_feature(x: f64, y: f64) -> Feature {
        Feature {
            geometry: Geometry::Point(Point::new(x, y)),
            z: None,
            layer: "0".to_string(),
            entity_type: "POINT",
            handle: None,
            properties: HashMap::new(),
        }
    }

    #[test]
    fn test_user_override_wins_regardless_of_content() {
        // Coordonnées typiquement LV95, mais l'override prime
        let features = vec![point_feature(2_600_000.0, 1_200_000.0)];
        let detection = detect(Some(4326), &Header::default(), &features);

        match detection {
            CrsDetection::Known(guess) => {
                assert_eq!(guess.epsg, 4326);
                assert_eq!(guess.confidence, CrsConfidence::Exact);
            }
            CrsDetection::Unknown => panic!("Expected Known detection"),
        }
    }

    #[test]
    fn test_heuristic_detects_lv95() {
        let features = vec![
            point_feature(2_600_123.4, 1_199_456.7),
            point_feature(2_612_000.0, 1_205_000.0),
            point_feature(2_598_700.0, 1_180_300.0),
        ];
        let detection = detect(None, &Header::default(), &features);

        match detection {
            CrsDetection::Known(guess) => {
                assert_eq!(guess.epsg, 2056);
                assert_eq!(guess.confidence, CrsConfidence::Heuristic);
            }
            CrsDetection::Unknown => panic!("Expected LV95 detection"),
        }
    }

    #[test]
    fn test_heuristic_detects_wgs84_degrees() {
        let features = vec![
            point_feature(7.44, 46.95),
            point_feature(6.63, 46.52),
            point_feature(8.54, 47.37),
        ];
        let detection = detect(None, &Header::default(), &features);
        assert_eq!(detection.epsg(), Some(4326));
    }

    #[test]
    fn test_header_hint_accepted_when_plausible() {
        let mut header = Header::default();
        header
            .variables
            .insert("$PROJECTION".to_string(), "EPSG:2056 (LV95)".to_string());
        let features = vec![point_feature(2_600_000.0, 1_200_000.0)];

        let detection = detect(None, &header, &features);
        match detection {
            CrsDetection::Known(guess) => {
                assert_eq!(guess.epsg, 2056);
                assert_eq!(guess.confidence, CrsConfidence::Header);
            }
            CrsDetection::Unknown => panic!("Expected header detection"),
        }
    }

    #[test]
    fn test_header_hint_rejected_when_implausible() {
        // Header annonce WGS84, coordonnées métriques LV95: l'indice est
        // rejeté et l'heuristique reprend la main
        let mut header = Header::default();
        header
            .variables
            .insert("$PROJECTION".to_string(), "EPSG:4326".to_string());
        let features = vec![
            point_feature(2_600_000.0, 1_200_000.0),
            point_feature(2_601_000.0, 1_201_000.0),
        ];

        let detection = detect(None, &header, &features);
        match detection {
            CrsDetection::Known(guess) => {
                assert_eq!(guess.epsg, 2056);
                assert_eq!(guess.confidence, CrsConfidence::Heuristic);
            }
            CrsDetection::Unknown => panic!("Expected heuristic fallback"),
        }
    }

    #[test]
    fn test_no_coordinates_is_unknown() {
        let detection = detect(None, &Header::default(), &[]);
        assert_eq!(detection, CrsDetection::Unknown);
        assert_eq!(detection.epsg(), None);
    }

    #[test]
    fn test_out_of_range_coordinates_is_unknown() {
        // Magnitudes ne correspondant à aucun candidat
        let features = vec![
            point_feature(5.0e9, -3.0e9),
            point_feature(7.0e9, -2.0e9),
        ];
        let detection = detect(None, &Header::default(), &features);
        assert_eq!(detection, CrsDetection::Unknown);
    }
}
