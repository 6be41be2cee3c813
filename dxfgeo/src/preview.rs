//! Projection de preview: collections catégorisées pour le rendu carte
//!
//! Fonction pure mémoïsée de (features, visibilité) vers une projection
//! immuable. Le cache n'est invalidé que par un changement de données ou
//! de visibilité, jamais par une simple relecture, et chaque changement
//! produit une nouvelle projection au lieu de muter celle déjà distribuée.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::Geometry;

use crate::bounds::{bounds_of_visible, BoundingBox};
use crate::layers::Visibility;
use crate::types::Feature;

/// Famille géométrique d'une catégorie de preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry) -> GeometryKind {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                GeometryKind::Line
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => GeometryKind::Polygon,
            Geometry::GeometryCollection(_) => GeometryKind::Polygon,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::Line => "line",
            GeometryKind::Polygon => "polygon",
        }
    }
}

/// Clé de catégorie: famille géométrique × couche
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CategoryKey {
    pub kind: GeometryKind,
    pub layer: String,
}

/// Projection immuable d'un ensemble de features pour le rendu.
///
/// Les catégories référencent les features par indice dans le tableau
/// détenu par le projecteur, pour éviter de cloner les géométries.
#[derive(Debug)]
pub struct PreviewProjection {
    /// Indices des features visibles, par catégorie
    pub categories: BTreeMap<CategoryKey, Vec<usize>>,

    /// Emprise des seules features visibles
    pub bounds: BoundingBox,

    /// Nombre de features visibles
    pub visible: usize,

    /// Nombre de features masquées par la visibilité
    pub hidden: usize,
}

#[derive(Debug)]
struct CacheEntry {
    revision: u64,
    visibility: Visibility,
    projection: Arc<PreviewProjection>,
}

/// Projecteur de preview avec cache à une entrée.
///
/// Possédé par une seule session de preview; pas de partage entre
/// utilisateurs, donc pas de verrouillage; la discipline est "remplacer,
/// ne pas muter".
#[derive(Debug)]
pub struct PreviewProjector {
    features: Arc<Vec<Feature>>,
    revision: u64,
    cache: Option<CacheEntry>,
}

impl PreviewProjector {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: Arc::new(features),
            revision: 0,
            cache: None,
        }
    }

    /// Features sous-jacentes (résolution des indices de catégories)
    pub fn features(&self) -> &Arc<Vec<Feature>> {
        &self.features
    }

    /// Remplace le jeu de features; invalide le cache
    pub fn set_features(&mut self, features: Vec<Feature>) {
        self.features = Arc::new(features);
        self.revision += 1;
        self.cache = None;
    }

    /// Projette selon la visibilité donnée.
    ///
    /// Un appel avec la même visibilité et les mêmes données retourne le
    /// même `Arc` sans recalcul.
    pub fn project(&mut self, visibility: &Visibility) -> Arc<PreviewProjection> {
        if let Some(entry) = &self.cache {
            if entry.revision == self.revision && &entry.visibility == visibility {
                return Arc::clone(&entry.projection);
            }
        }

        let projection = Arc::new(build_projection(&self.features, visibility));
        self.cache = Some(CacheEntry {
            revision: self.revision,
            visibility: visibility.clone(),
            projection: Arc::clone(&projection),
        });
        projection
    }
}

fn build_projection(features: &[Feature], visibility: &Visibility) -> PreviewProjection {
    let mut categories: BTreeMap<CategoryKey, Vec<usize>> = BTreeMap::new();
    let mut visible = 0;
    let mut hidden = 0;

    for (index, feature) in features.iter().enumerate() {
        if !visibility.is_visible(&feature.layer) {
            hidden += 1;
            continue;
        }
        visible += 1;
        categories
            .entry(CategoryKey {
                kind: GeometryKind::of(&feature.geometry),
                layer: feature.layer.clone(),
            })
            .or_default()
            .push(index);
    }

    PreviewProjection {
        categories,
        bounds: bounds_of_visible(features.iter(), visibility),
        visible,
        hidden,
    }
}
