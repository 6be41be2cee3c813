//! Types de données pour le crate dxfgeo

use std::collections::{BTreeMap, HashMap};

use geo::Geometry;

use crate::bounds::BoundingBox;
use crate::crs::CrsDetection;

/// Nom de la couche par défaut, toujours présente dans un dessin DXF
pub const DEFAULT_LAYER: &str = "0";

/// Variables extraites de la section HEADER
#[derive(Debug, Default, Clone)]
pub struct Header {
    /// Valeur brute de chaque variable ($VAR -> première valeur textuelle)
    pub variables: HashMap<String, String>,

    /// Coin min de l'étendue déclarée ($EXTMIN)
    pub ext_min: Option<(f64, f64)>,

    /// Coin max de l'étendue déclarée ($EXTMAX)
    pub ext_max: Option<(f64, f64)>,

    /// Unité de dessin ($INSUNITS, 4 = mètres)
    pub ins_units: Option<i32>,

    /// Codepage déclaré ($DWGCODEPAGE, ex: ANSI_1252)
    pub codepage: Option<String>,
}

/// Définition d'une couche (table LAYER)
#[derive(Debug, Clone)]
pub struct LayerDef {
    pub name: String,
    pub color: Option<i32>,
    pub line_type: Option<String>,
    pub frozen: bool,
}

/// Définition d'un bloc avec ses entités propres
#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub base_point: (f64, f64),
    pub entities: Vec<Entity>,
}

/// Un sommet DXF; Z est optionnel et jamais fabriqué
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Default for Vertex {
    fn default() -> Self {
        // NaN tant que les groupes 10/20 n'ont pas été lus: le convertisseur
        // rejette les entités dont les coordonnées requises manquent
        Self {
            x: f64::NAN,
            y: f64::NAN,
            z: None,
        }
    }
}

impl Vertex {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }
}

/// Attributs communs à toutes les entités
#[derive(Debug, Clone)]
pub struct EntityCommon {
    /// Nom de la couche; `"0"` implicite quand le groupe 8 est absent
    pub layer: String,

    /// Handle (identifiant hexadécimal, groupe 5)
    pub handle: Option<String>,
}

impl Default for EntityCommon {
    fn default() -> Self {
        Self {
            layer: DEFAULT_LAYER.to_string(),
            handle: None,
        }
    }
}

/// Entité DXF parsée.
///
/// Somme fermée: le convertisseur entité → géométrie matche exhaustivement
/// chaque variante.
#[derive(Debug, Clone)]
pub enum Entity {
    Line {
        common: EntityCommon,
        start: Vertex,
        end: Vertex,
    },
    LwPolyline {
        common: EntityCommon,
        vertices: Vec<(f64, f64)>,
        /// Élévation commune des sommets (groupe 38)
        elevation: Option<f64>,
        closed: bool,
    },
    Polyline {
        common: EntityCommon,
        vertices: Vec<Vertex>,
        closed: bool,
    },
    Circle {
        common: EntityCommon,
        center: Vertex,
        radius: f64,
    },
    Arc {
        common: EntityCommon,
        center: Vertex,
        radius: f64,
        /// Angles en degrés, sens trigonométrique
        start_angle: f64,
        end_angle: f64,
    },
    Point {
        common: EntityCommon,
        position: Vertex,
    },
    Text {
        common: EntityCommon,
        position: Vertex,
        content: String,
    },
    Insert {
        common: EntityCommon,
        block_name: String,
        position: Vertex,
    },
}

impl Entity {
    pub fn common(&self) -> &EntityCommon {
        match self {
            Entity::Line { common, .. }
            | Entity::LwPolyline { common, .. }
            | Entity::Polyline { common, .. }
            | Entity::Circle { common, .. }
            | Entity::Arc { common, .. }
            | Entity::Point { common, .. }
            | Entity::Text { common, .. }
            | Entity::Insert { common, .. } => common,
        }
    }

    /// Nom DXF du type d'entité, pour les statistiques
    pub fn type_name(&self) -> &'static str {
        match self {
            Entity::Line { .. } => "LINE",
            Entity::LwPolyline { .. } => "LWPOLYLINE",
            Entity::Polyline { .. } => "POLYLINE",
            Entity::Circle { .. } => "CIRCLE",
            Entity::Arc { .. } => "ARC",
            Entity::Point { .. } => "POINT",
            Entity::Text { .. } => "TEXT",
            Entity::Insert { .. } => "INSERT",
        }
    }
}

/// Représentation parsée d'un document DXF
#[derive(Debug, Default)]
pub struct DxfDocument {
    pub header: Header,
    pub layers: BTreeMap<String, LayerDef>,
    pub blocks: HashMap<String, Block>,
    pub entities: Vec<Entity>,
}

/// Une feature géographique issue de la conversion d'une entité
#[derive(Debug, Clone)]
pub struct Feature {
    /// Géométrie 2D (les types `geo` ne portent pas de Z)
    pub geometry: Geometry,

    /// Ordonnées Z, une par coordonnée dans l'ordre de la géométrie
    /// (anneau extérieur puis intérieurs pour un Polygon). `None` quand
    /// l'entité source n'avait aucun Z.
    pub z: Option<Vec<f64>>,

    /// Couche source de l'entité
    pub layer: String,

    /// Type DXF de l'entité source
    pub entity_type: &'static str,

    /// Handle de l'entité source si présent
    pub handle: Option<String>,

    /// Attributs plats (contenu texte, nom de bloc, etc.)
    pub properties: HashMap<String, String>,
}

/// Compteurs de conversion par type d'entité
#[derive(Debug, Default, Clone)]
pub struct ConversionStats {
    /// Entités converties en features
    pub converted: usize,

    /// Entités rejetées (attributs requis manquants)
    pub skipped: usize,

    /// Converties, par type DXF
    pub by_type: BTreeMap<&'static str, usize>,

    /// Rejetées, par type DXF
    pub skipped_by_type: BTreeMap<&'static str, usize>,
}

impl ConversionStats {
    pub fn record_converted(&mut self, entity_type: &'static str) {
        self.converted += 1;
        *self.by_type.entry(entity_type).or_default() += 1;
    }

    pub fn record_skipped(&mut self, entity_type: &'static str) {
        self.skipped += 1;
        *self.skipped_by_type.entry(entity_type).or_default() += 1;
    }
}

/// Résultat complet du parsing d'un fichier DXF
#[derive(Debug)]
pub struct ParseOutput {
    /// Document structuré (header, couches, blocs, entités)
    pub document: DxfDocument,

    /// Features converties
    pub features: Vec<Feature>,

    /// Statistiques de conversion
    pub stats: ConversionStats,

    /// Couches utilisateur (filtrées des clés internes), triées
    pub layers: Vec<String>,

    /// Système de coordonnées détecté
    pub crs: CrsDetection,

    /// Emprise des features
    pub bounds: BoundingBox,
}
