//! # dxfgeo
//!
//! Parser pour le format DXF ASCII (AutoCAD Drawing Exchange Format) avec
//! conversion vers les types `geo`.
//!
//! ## Features
//!
//! - Lecture du flux group-code tolérante aux fins de ligne CR/LF/CRLF
//! - Sections HEADER, TABLES (couches), BLOCKS, ENTITIES
//! - Conversion entité → géométrie avec isolation des erreurs par entité
//! - Détection progressive du système de coordonnées (override, header,
//!   heuristique par magnitude) avec niveau de confiance explicite
//! - Emprise, filtrage des couches, projection de preview mémoïsée
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dxfgeo::{parse_path, ParseOptions};
//! use std::path::Path;
//!
//! let output = parse_path(Path::new("plan.dxf"), &ParseOptions::default())?;
//! println!("EPSG: {:?}", output.crs.epsg());
//! println!("{} features sur {} couches", output.features.len(), output.layers.len());
//! ```

pub mod bounds;
pub mod convert;
pub mod crs;
pub mod error;
pub mod layers;
pub mod parser;
pub mod preview;
pub mod reader;
pub mod types;

pub use bounds::{bounds_of, bounds_of_visible, BoundingBox, DEFAULT_BOX};
pub use crs::{CrsConfidence, CrsDetection, CrsGuess};
pub use error::DxfError;
pub use layers::Visibility;
pub use preview::{PreviewProjection, PreviewProjector};
pub use types::{ConversionStats, DxfDocument, Entity, Feature, ParseOutput};

use std::path::Path;

use tracing::{info, info_span};

/// Options d'un import
#[derive(Debug, Default, Clone)]
pub struct ParseOptions {
    /// Système de coordonnées imposé par l'appelant; court-circuite la
    /// détection avec une confiance exacte
    pub source_epsg: Option<u32>,
}

/// Parse un fichier DXF et retourne le document, les features converties,
/// les couches, le système détecté et l'emprise.
///
/// # Errors
///
/// `DxfError` si le fichier est illisible ou structurellement invalide.
/// Les entités individuellement malformées sont sautées et comptées, pas
/// fatales.
pub fn parse_path(path: &Path, options: &ParseOptions) -> Result<ParseOutput, DxfError> {
    // Contexte d'import explicite: toutes les traces du pipeline portent
    // le fichier concerné
    let span = info_span!("dxf_import", file = %path.display());
    let _enter = span.enter();

    let bytes = std::fs::read(path)?;
    let content = decode_text(&bytes);
    parse_str(&content, options)
}

/// Parse un contenu DXF déjà décodé.
pub fn parse_str(content: &str, options: &ParseOptions) -> Result<ParseOutput, DxfError> {
    let document = parser::parse_document(content)?;
    let (features, stats) = convert::convert_entities(&document);
    let layer_names = layers::user_layers(&document, &features);
    let crs = crs::detect(options.source_epsg, &document.header, &features);
    let bounds = bounds::bounds_of(&features);

    info!(
        entities = document.entities.len(),
        features = features.len(),
        skipped = stats.skipped,
        layers = layer_names.len(),
        crs = ?crs.epsg(),
        "Parsed DXF document"
    );

    Ok(ParseOutput {
        document,
        features,
        stats,
        layers: layer_names,
        crs,
        bounds,
    })
}

/// Décode les octets d'un fichier DXF en texte.
///
/// UTF-8 validé en SIMD d'abord; sinon le codepage annoncé par
/// $DWGCODEPAGE est appliqué, avec Windows-1252 par défaut (le codepage
/// AutoCAD le plus répandu en Europe occidentale).
fn decode_text(bytes: &[u8]) -> String {
    if simdutf8::basic::from_utf8(bytes).is_ok() {
        // Déjà de l'UTF-8 valide
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let encoding = sniff_codepage(bytes)
        .map(codepage_to_encoding)
        .unwrap_or(encoding_rs::WINDOWS_1252);
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// Extrait la valeur de $DWGCODEPAGE directement depuis les octets bruts,
/// avant décodage complet (la variable est elle-même en ASCII)
fn sniff_codepage(bytes: &[u8]) -> Option<String> {
    let pos = memchr::memmem::find(bytes, b"$DWGCODEPAGE")?;

    // Après le nom de variable: une ligne de code (3) puis la valeur
    let mut rest = &bytes[pos + b"$DWGCODEPAGE".len()..];
    for _ in 0..2 {
        let eol = rest.iter().position(|&b| b == b'\r' || b == b'\n')?;
        let mut next = eol + 1;
        if rest[eol] == b'\r' && rest.get(eol + 1) == Some(&b'\n') {
            next += 1;
        }
        rest = &rest[next..];
    }

    let end = rest
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(rest.len());
    let value = std::str::from_utf8(&rest[..end]).ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Mappe un codepage AutoCAD vers un encodage
fn codepage_to_encoding(codepage: String) -> &'static encoding_rs::Encoding {
    match codepage.to_uppercase().as_str() {
        "ANSI_1250" => encoding_rs::WINDOWS_1250,
        "ANSI_1251" => encoding_rs::WINDOWS_1251,
        "ANSI_1252" => encoding_rs::WINDOWS_1252,
        "ANSI_1253" => encoding_rs::WINDOWS_1253,
        "ANSI_1254" => encoding_rs::WINDOWS_1254,
        "ANSI_1257" => encoding_rs::WINDOWS_1257,
        "ANSI_932" | "DOS932" => encoding_rs::SHIFT_JIS,
        "ANSI_936" => encoding_rs::GBK,
        _ => encoding_rs::WINDOWS_1252,
    }
}
