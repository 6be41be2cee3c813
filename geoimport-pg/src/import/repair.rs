//! Nettoyage, validation et réparation des géométries avant import
//!
//! Chaîne par feature: suppression des points répétés, validation
//! (coordonnées finies, effectifs minimaux, auto-intersections), puis
//! tentative de réparation pour les géométries invalides. Une réparation
//! impossible est terminale pour la feature seulement, jamais pour le lot.
//!
//! Les anneaux sont fermés par construction dans les types `geo`; le SQL
//! d'insertion applique en plus ST_MakeValid pour les défauts résiduels.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{ConvexHull, Coord, Geometry, Line, LineString, MultiPoint, Point, Polygon};
use thiserror::Error;
use tracing::warn;

/// Tolérance de comparaison de coordonnées (même ordre de grandeur pour
/// des mètres projetés et des degrés à 7 décimales)
const COORD_TOLERANCE: f64 = 1e-9;

/// Au-delà de ce nombre de points, le test d'auto-intersection O(n²)
/// est sauté
const SELF_INTERSECTION_MAX_POINTS: usize = 512;

/// Échec terminal de la validation/réparation d'une géométrie
#[derive(Debug, Error)]
pub enum GeometryError {
    /// Géométrie invalide et non réparable
    #[error("invalid geometry: {reason}")]
    Invalid { reason: String },

    /// La réparation a échoué
    #[error("geometry repair failed: {reason}")]
    RepairFailed { reason: String },
}

/// Méthode de réparation appliquée, pour les diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMethod {
    /// Remplacement par l'enveloppe convexe des points
    ConvexHull,
}

impl RepairMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairMethod::ConvexHull => "convex-hull",
        }
    }
}

/// Résultat du pipeline de préparation d'une géométrie
#[derive(Debug)]
pub struct PreparedGeometry {
    pub geometry: Geometry,
    /// Points répétés supprimés
    pub cleaned: bool,
    /// Réparation appliquée, le cas échéant
    pub repaired: Option<RepairMethod>,
}

/// Nettoie puis valide une géométrie, en la réparant si nécessaire.
///
/// # Errors
///
/// `GeometryError` quand la géométrie est invalide et qu'aucune
/// réparation n'aboutit; l'appelant enregistre l'échec et continue.
pub fn prepare_geometry(geometry: &Geometry) -> Result<PreparedGeometry, GeometryError> {
    let (geometry, cleaned) = remove_repeated_points(geometry);

    match validity_error(&geometry) {
        None => Ok(PreparedGeometry {
            geometry,
            cleaned,
            repaired: None,
        }),
        Some(reason) => {
            let (repaired, method) = repair(&geometry, &reason)?;
            if let Some(remaining) = validity_error(&repaired) {
                return Err(GeometryError::RepairFailed { reason: remaining });
            }
            warn!(
                method = method.as_str(),
                reason = reason.as_str(),
                "Repaired invalid geometry"
            );
            Ok(PreparedGeometry {
                geometry: repaired,
                cleaned,
                repaired: Some(method),
            })
        }
    }
}

fn coords_equal(a: Coord, b: Coord) -> bool {
    (a.x - b.x).abs() < COORD_TOLERANCE && (a.y - b.y).abs() < COORD_TOLERANCE
}

/// Supprime les points consécutifs répétés; retourne la géométrie
/// nettoyée et un indicateur de modification
pub fn remove_repeated_points(geometry: &Geometry) -> (Geometry, bool) {
    fn dedup_line(ls: &LineString) -> (LineString, bool) {
        let mut coords: Vec<Coord> = Vec::with_capacity(ls.0.len());
        for coord in &ls.0 {
            if coords.last().is_some_and(|last| coords_equal(*last, *coord)) {
                continue;
            }
            coords.push(*coord);
        }
        let changed = coords.len() != ls.0.len();
        (LineString::new(coords), changed)
    }

    match geometry {
        Geometry::LineString(ls) => {
            let (deduped, changed) = dedup_line(ls);
            (Geometry::LineString(deduped), changed)
        }
        Geometry::Polygon(poly) => {
            let (exterior, mut changed) = dedup_line(poly.exterior());
            let interiors: Vec<LineString> = poly
                .interiors()
                .iter()
                .map(|ring| {
                    let (deduped, ring_changed) = dedup_line(ring);
                    changed |= ring_changed;
                    deduped
                })
                .collect();
            (
                Geometry::Polygon(Polygon::new(exterior, interiors)),
                changed,
            )
        }
        Geometry::MultiLineString(mls) => {
            let mut changed = false;
            let lines: Vec<LineString> = mls
                .0
                .iter()
                .map(|ls| {
                    let (deduped, line_changed) = dedup_line(ls);
                    changed |= line_changed;
                    deduped
                })
                .collect();
            (
                Geometry::MultiLineString(geo::MultiLineString::new(lines)),
                changed,
            )
        }
        Geometry::MultiPolygon(mp) => {
            let mut changed = false;
            let polygons: Vec<Polygon> = mp
                .0
                .iter()
                .map(|poly| {
                    let (deduped, poly_changed) =
                        remove_repeated_points(&Geometry::Polygon(poly.clone()));
                    changed |= poly_changed;
                    match deduped {
                        Geometry::Polygon(p) => p,
                        _ => unreachable!("Polygon dedup returns Polygon"),
                    }
                })
                .collect();
            (
                Geometry::MultiPolygon(geo::MultiPolygon::new(polygons)),
                changed,
            )
        }
        other => (other.clone(), false),
    }
}

/// Retourne la première raison d'invalidité détectée, ou `None`
pub fn validity_error(geometry: &Geometry) -> Option<String> {
    fn coords_finite(ls: &LineString) -> bool {
        ls.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
    }

    fn ring_error(ring: &LineString, label: &str) -> Option<String> {
        if !coords_finite(ring) {
            return Some(format!("{label} has non-finite coordinates"));
        }
        if ring.0.len() < 4 {
            return Some(format!(
                "{label} has {} points, a ring needs at least 4",
                ring.0.len()
            ));
        }
        if let Some((x, y)) = ring_self_intersection(ring) {
            return Some(format!("{label} self-intersects near ({x:.3}, {y:.3})"));
        }
        None
    }

    fn polygon_error(poly: &Polygon) -> Option<String> {
        if let Some(reason) = ring_error(poly.exterior(), "exterior ring") {
            return Some(reason);
        }
        for (i, ring) in poly.interiors().iter().enumerate() {
            if let Some(reason) = ring_error(ring, &format!("interior ring {i}")) {
                return Some(reason);
            }
        }
        None
    }

    match geometry {
        Geometry::Point(p) => {
            if p.x().is_finite() && p.y().is_finite() {
                None
            } else {
                Some("point has non-finite coordinates".to_string())
            }
        }
        Geometry::MultiPoint(mp) => mp
            .0
            .iter()
            .find(|p| !p.x().is_finite() || !p.y().is_finite())
            .map(|_| "multipoint has non-finite coordinates".to_string()),
        Geometry::LineString(ls) => {
            if !coords_finite(ls) {
                Some("linestring has non-finite coordinates".to_string())
            } else if ls.0.len() < 2 {
                Some(format!(
                    "linestring has {} points, needs at least 2",
                    ls.0.len()
                ))
            } else {
                None
            }
        }
        Geometry::MultiLineString(mls) => mls
            .0
            .iter()
            .find_map(|ls| validity_error(&Geometry::LineString(ls.clone()))),
        Geometry::Polygon(poly) => polygon_error(poly),
        Geometry::MultiPolygon(mp) => mp.0.iter().find_map(polygon_error),
        Geometry::GeometryCollection(gc) => gc.0.iter().find_map(validity_error),
        _ => None,
    }
}

/// Cherche une auto-intersection propre entre segments non adjacents
/// d'un anneau
fn ring_self_intersection(ring: &LineString) -> Option<(f64, f64)> {
    if ring.0.len() > SELF_INTERSECTION_MAX_POINTS {
        return None;
    }

    let segments: Vec<Line> = ring.lines().collect();
    let count = segments.len();

    for i in 0..count {
        for j in (i + 1)..count {
            // Segments adjacents (dont la paire fermante dernier/premier):
            // leur point commun n'est pas une intersection
            if j == i + 1 || (i == 0 && j == count - 1) {
                continue;
            }
            if let Some(LineIntersection::SinglePoint {
                intersection,
                is_proper: true,
            }) = line_intersection(segments[i], segments[j])
            {
                return Some((intersection.x, intersection.y));
            }
        }
    }
    None
}

/// Tente de réparer une géométrie invalide.
///
/// Enveloppe convexe des points du polygone (équivalent make-valid
/// dégradé); seules les surfaces sont réparables, les autres types sont
/// terminaux.
fn repair(
    geometry: &Geometry,
    reason: &str,
) -> Result<(Geometry, RepairMethod), GeometryError> {
    match geometry {
        Geometry::Polygon(poly) => {
            convex_hull_fallback(poly).map(|p| (Geometry::Polygon(p), RepairMethod::ConvexHull))
        }
        Geometry::MultiPolygon(mp) => {
            let mut repaired = Vec::with_capacity(mp.0.len());
            for poly in &mp.0 {
                if validity_error(&Geometry::Polygon(poly.clone())).is_none() {
                    repaired.push(poly.clone());
                } else {
                    repaired.push(convex_hull_fallback(poly)?);
                }
            }
            Ok((
                Geometry::MultiPolygon(geo::MultiPolygon::new(repaired)),
                RepairMethod::ConvexHull,
            ))
        }
        _ => Err(GeometryError::Invalid {
            reason: reason.to_string(),
        }),
    }
}

/// Enveloppe convexe de tous les points du polygone
fn convex_hull_fallback(poly: &Polygon) -> Result<Polygon, GeometryError> {
    let points: Vec<Point> = poly
        .exterior()
        .0
        .iter()
        .chain(poly.interiors().iter().flat_map(|r| r.0.iter()))
        .filter(|c| c.x.is_finite() && c.y.is_finite())
        .map(|c| Point::new(c.x, c.y))
        .collect();

    if points.len() < 3 {
        return Err(GeometryError::RepairFailed {
            reason: "not enough points for convex hull".to_string(),
        });
    }

    Ok(MultiPoint::new(points).convex_hull())
}
