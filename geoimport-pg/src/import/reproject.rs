//! Reprojection de géométries avec PROJ
//!
//! Disponible avec le feature `reproject` (activé par défaut). Sans le
//! feature, seule la transformation identité est possible.

#[cfg(feature = "reproject")]
use anyhow::{Context, Result};
#[cfg(feature = "reproject")]
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
#[cfg(feature = "reproject")]
use proj::Proj;

/// Reprojection entre deux systèmes identifiés par code EPSG.
///
/// Les ordonnées Z ne sont pas touchées: la transformation de hauteur est
/// un traitement asynchrone séparé, hors de ce pipeline.
#[cfg(feature = "reproject")]
pub struct Reprojector {
    /// `None` quand source et cible sont identiques
    transform: Option<Proj>,
    source_epsg: u32,
    target_epsg: u32,
}

#[cfg(feature = "reproject")]
impl Reprojector {
    /// Crée un reprojector entre deux EPSG
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        let transform = if source_epsg == target_epsg {
            None
        } else {
            let source = format!("EPSG:{source_epsg}");
            let target = format!("EPSG:{target_epsg}");
            Some(Proj::new_known_crs(&source, &target, None).context(format!(
                "Failed to create projection from {source} to {target}"
            ))?)
        };

        Ok(Self {
            transform,
            source_epsg,
            target_epsg,
        })
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geometry: &Geometry) -> Result<Geometry> {
        if self.transform.is_none() {
            return Ok(geometry.clone());
        }

        match geometry {
            Geometry::Point(p) => {
                let (x, y) = self.transform_coord(p.0)?;
                Ok(Geometry::Point(Point::new(x, y)))
            }
            Geometry::LineString(ls) => Ok(Geometry::LineString(self.transform_line(ls)?)),
            Geometry::Polygon(poly) => Ok(Geometry::Polygon(self.transform_polygon(poly)?)),
            Geometry::MultiPoint(mp) => {
                let points: Result<Vec<Point>> =
                    mp.0.iter()
                        .map(|p| {
                            let (x, y) = self.transform_coord(p.0)?;
                            Ok(Point::new(x, y))
                        })
                        .collect();
                Ok(Geometry::MultiPoint(MultiPoint::new(points?)))
            }
            Geometry::MultiLineString(mls) => {
                let lines: Result<Vec<LineString>> =
                    mls.0.iter().map(|ls| self.transform_line(ls)).collect();
                Ok(Geometry::MultiLineString(MultiLineString::new(lines?)))
            }
            Geometry::MultiPolygon(mp) => {
                let polygons: Result<Vec<Polygon>> =
                    mp.0.iter().map(|p| self.transform_polygon(p)).collect();
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons?)))
            }
            // Types non supportés: retournés tels quels
            other => Ok(other.clone()),
        }
    }

    fn transform_coord(&self, coord: Coord) -> Result<(f64, f64)> {
        match &self.transform {
            Some(proj) => proj
                .convert((coord.x, coord.y))
                .context("Coordinate transformation failed"),
            None => Ok((coord.x, coord.y)),
        }
    }

    /// Transformation batch d'une LineString, nettement plus rapide que
    /// point par point
    fn transform_line(&self, ls: &LineString) -> Result<LineString> {
        let Some(proj) = &self.transform else {
            return Ok(ls.clone());
        };

        let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();
        proj.convert_array(&mut coords)
            .context("Batch coordinate transformation failed")?;

        Ok(LineString::new(
            coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        ))
    }

    fn transform_polygon(&self, poly: &Polygon) -> Result<Polygon> {
        let exterior = self.transform_line(poly.exterior())?;
        let interiors: Result<Vec<LineString>> = poly
            .interiors()
            .iter()
            .map(|ls| self.transform_line(ls))
            .collect();
        Ok(Polygon::new(exterior, interiors?))
    }
}

// Implémentation identité quand le feature reproject est désactivé
#[cfg(not(feature = "reproject"))]
use anyhow::{bail, Result};
#[cfg(not(feature = "reproject"))]
use geo::Geometry;

/// Reprojector identité; toute reprojection réelle échoue sans le feature
#[cfg(not(feature = "reproject"))]
pub struct Reprojector {
    source_epsg: u32,
    target_epsg: u32,
}

#[cfg(not(feature = "reproject"))]
impl Reprojector {
    pub fn new(source_epsg: u32, target_epsg: u32) -> Result<Self> {
        if source_epsg == target_epsg {
            Ok(Self {
                source_epsg,
                target_epsg,
            })
        } else {
            bail!(
                "Reprojection from EPSG:{} to EPSG:{} requires the 'reproject' feature. \
                 Build with: cargo build --features reproject",
                source_epsg,
                target_epsg
            )
        }
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    pub fn target_epsg(&self) -> u32 {
        self.target_epsg
    }

    pub fn transform_geometry(&self, geometry: &Geometry) -> Result<Geometry> {
        Ok(geometry.clone())
    }
}

#[cfg(feature = "reproject")]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lv95_to_wgs84() {
        // Point connu: Berne (environ)
        // LV95: E=2600000, N=1200000 / WGS84: lon~7.44, lat~46.95
        let reprojector = Reprojector::new(2056, 4326).unwrap();

        let bern_lv95 = Geometry::Point(Point::new(2_600_000.0, 1_200_000.0));
        let bern_wgs84 = reprojector.transform_geometry(&bern_lv95).unwrap();

        if let Geometry::Point(p) = bern_wgs84 {
            assert!(
                p.x() > 7.0 && p.x() < 8.0,
                "Longitude should be around 7.44, got {}",
                p.x()
            );
            assert!(
                p.y() > 46.0 && p.y() < 47.5,
                "Latitude should be around 46.95, got {}",
                p.y()
            );
        } else {
            panic!("Expected Point geometry");
        }
    }

    #[test]
    fn test_identity_transform() {
        let reprojector = Reprojector::new(4326, 4326).unwrap();

        let point = Geometry::Point(Point::new(7.44, 46.95));
        let result = reprojector.transform_geometry(&point).unwrap();

        if let Geometry::Point(p) = result {
            assert!((p.x() - 7.44).abs() < 1e-9);
            assert!((p.y() - 46.95).abs() < 1e-9);
        } else {
            panic!("Expected Point geometry");
        }
    }

    #[test]
    fn test_polygon_transform_keeps_ring_closed() {
        let reprojector = Reprojector::new(2056, 4326).unwrap();

        let poly = Geometry::Polygon(Polygon::new(
            LineString::from(vec![
                (2_600_000.0, 1_200_000.0),
                (2_600_100.0, 1_200_000.0),
                (2_600_100.0, 1_200_100.0),
                (2_600_000.0, 1_200_100.0),
                (2_600_000.0, 1_200_000.0),
            ]),
            vec![],
        ));

        let result = reprojector.transform_geometry(&poly).unwrap();

        if let Geometry::Polygon(p) = result {
            assert_eq!(p.exterior().0.len(), 5);
            let first = &p.exterior().0[0];
            assert!(first.x > 6.0 && first.x < 10.0);
            assert!(first.y > 45.0 && first.y < 48.0);
        } else {
            panic!("Expected Polygon geometry");
        }
    }

    #[test]
    fn test_invalid_epsg() {
        assert!(Reprojector::new(99999, 4326).is_err());
    }
}
