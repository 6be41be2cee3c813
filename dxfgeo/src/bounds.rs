//! Calcul d'emprise (bounding box) sur des features hétérogènes

use geo::{Coord, Geometry, LineString};

use crate::layers::Visibility;
use crate::types::Feature;

/// Emprise rectangulaire, axes alignés
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Boîte par défaut retournée quand aucune coordonnée finie n'existe.
/// Jamais de boîte à valeurs infinies ou NaN en sortie.
pub const DEFAULT_BOX: BoundingBox = BoundingBox {
    min_x: -1.0,
    min_y: -1.0,
    max_x: 1.0,
    max_y: 1.0,
};

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// Accumulateur interne; démarre à ±Infinity et n'est exposé qu'une fois
/// remplacé par la boîte par défaut si aucun point n'a été vu
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Cas de base de la descente récursive: une paire de coordonnées
    fn extend(&mut self, coord: Coord) {
        if !coord.x.is_finite() || !coord.y.is_finite() {
            return;
        }
        self.min_x = self.min_x.min(coord.x);
        self.min_y = self.min_y.min(coord.y);
        self.max_x = self.max_x.max(coord.x);
        self.max_y = self.max_y.max(coord.y);
    }

    fn extend_ring(&mut self, ring: &LineString) {
        for coord in &ring.0 {
            self.extend(*coord);
        }
    }

    /// Descente récursive dans la géométrie, quelle que soit la profondeur
    /// d'imbrication (les Multi* et GeometryCollection récursent d'un
    /// niveau, les types simples atteignent le cas de base)
    fn extend_geometry(&mut self, geometry: &Geometry) {
        match geometry {
            Geometry::Point(p) => self.extend(p.0),
            Geometry::Line(l) => {
                self.extend(l.start);
                self.extend(l.end);
            }
            Geometry::LineString(ls) => self.extend_ring(ls),
            Geometry::Polygon(poly) => {
                self.extend_ring(poly.exterior());
                for interior in poly.interiors() {
                    self.extend_ring(interior);
                }
            }
            Geometry::MultiPoint(mp) => {
                for p in &mp.0 {
                    self.extend_geometry(&Geometry::Point(*p));
                }
            }
            Geometry::MultiLineString(mls) => {
                for ls in &mls.0 {
                    self.extend_ring(ls);
                }
            }
            Geometry::MultiPolygon(mp) => {
                for poly in &mp.0 {
                    self.extend_geometry(&Geometry::Polygon(poly.clone()));
                }
            }
            Geometry::GeometryCollection(gc) => {
                for g in &gc.0 {
                    self.extend_geometry(g);
                }
            }
            Geometry::Rect(r) => {
                self.extend(r.min());
                self.extend(r.max());
            }
            Geometry::Triangle(t) => {
                for coord in t.to_array() {
                    self.extend(coord);
                }
            }
        }
    }

    fn finish(self) -> BoundingBox {
        if self.min_x.is_finite() {
            BoundingBox {
                min_x: self.min_x,
                min_y: self.min_y,
                max_x: self.max_x,
                max_y: self.max_y,
            }
        } else {
            DEFAULT_BOX
        }
    }
}

/// Calcule l'emprise d'un ensemble de features.
///
/// Retourne `DEFAULT_BOX` pour un ensemble vide ou sans coordonnée finie.
pub fn bounds_of<'a>(features: impl IntoIterator<Item = &'a Feature>) -> BoundingBox {
    let mut acc = Accumulator::new();
    for feature in features {
        acc.extend_geometry(&feature.geometry);
    }
    acc.finish()
}

/// Emprise restreinte aux features visibles.
///
/// Recalculée depuis zéro à chaque bascule de visibilité: l'emprise ne doit
/// jamais inclure des features de couches masquées.
pub fn bounds_of_visible<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
    visibility: &Visibility,
) -> BoundingBox {
    bounds_of(
        features
            .into_iter()
            .filter(|f| visibility.is_visible(&f.layer)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Geometry, LineString, MultiLineString, Point};
    use std::collections::HashMap;

    fn feature(geometry: Geometry, layer: &str) -> Feature {
        Feature {
            geometry,
            z: None,
            layer: layer.to_string(),
            entity_type: "LINE",
            handle: None,
            properties: HashMap::new(),
        }
    }

    #[test]
    fn test_bounds_empty_is_default_box() {
        let bounds = bounds_of(&[]);
        assert_eq!(bounds, DEFAULT_BOX);
    }

    #[test]
    fn test_bounds_single_point() {
        let features = vec![feature(Geometry::Point(Point::new(5.0, 47.0)), "0")];
        let bounds = bounds_of(&features);
        assert_eq!(bounds.min_x, 5.0);
        assert_eq!(bounds.max_y, 47.0);
    }

    #[test]
    fn test_bounds_mixed_nesting_depths() {
        let features = vec![
            feature(Geometry::Point(Point::new(0.0, 0.0)), "0"),
            feature(
                Geometry::LineString(LineString::from(vec![(1.0, 1.0), (2.0, 3.0)])),
                "0",
            ),
            feature(
                Geometry::Polygon(polygon![
                    (x: -1.0, y: -2.0),
                    (x: 4.0, y: -2.0),
                    (x: 4.0, y: 5.0),
                    (x: -1.0, y: -2.0),
                ]),
                "0",
            ),
            feature(
                Geometry::MultiLineString(MultiLineString::new(vec![LineString::from(vec![
                    (6.0, 6.0),
                    (7.0, 7.0),
                ])])),
                "0",
            ),
        ];

        let bounds = bounds_of(&features);
        assert_eq!(bounds.min_x, -1.0);
        assert_eq!(bounds.min_y, -2.0);
        assert_eq!(bounds.max_x, 7.0);
        assert_eq!(bounds.max_y, 7.0);
        assert!(bounds.min_x <= bounds.max_x);
        assert!(bounds.min_y <= bounds.max_y);
    }

    #[test]
    fn test_bounds_ignores_non_finite() {
        let features = vec![feature(
            Geometry::LineString(LineString::from(vec![
                (f64::NAN, 1.0),
                (2.0, f64::INFINITY),
            ])),
            "0",
        )];
        assert_eq!(bounds_of(&features), DEFAULT_BOX);
    }

    #[test]
    fn test_bounds_visible_excludes_hidden_layers() {
        let features = vec![
            feature(Geometry::Point(Point::new(0.0, 0.0)), "Site"),
            feature(Geometry::Point(Point::new(100.0, 100.0)), "Hidden"),
        ];

        let only_site = Visibility::from_layer_set(["Site".to_string()].into_iter().collect());
        let bounds = bounds_of_visible(&features, &only_site);
        assert_eq!(bounds.max_x, 0.0);
        assert_eq!(bounds.max_y, 0.0);
    }
}
