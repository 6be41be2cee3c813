//! Parsers de sections DXF (HEADER, TABLES, BLOCKS, ENTITIES)
//!
//! Chaque parser consomme la tranche du flux de paires délimitée par les
//! marqueurs SECTION/ENDSEC (code 0, nom de section au code 2). Les
//! sections inconnues sont sautées paire par paire.

pub mod blocks;
pub mod entities;
pub mod header;
pub mod tables;

use tracing::debug;

use crate::reader::{read_pairs, GroupCursor};
use crate::types::DxfDocument;
use crate::DxfError;

/// Parse un document DXF complet depuis son contenu texte.
///
/// # Errors
///
/// `DxfError::Parse` pour un flux group-code malformé, `DxfError::Section`
/// pour une violation structurelle (section non terminée, marqueur
/// inattendu).
pub fn parse_document(content: &str) -> Result<DxfDocument, DxfError> {
    let pairs = read_pairs(content)?;
    let mut cursor = GroupCursor::new(pairs);
    let mut document = DxfDocument::default();

    loop {
        let Some(pair) = cursor.next() else {
            // EOF marker absent: toléré, les fichiers tronqués existent
            break;
        };
        let pair = pair.clone();

        if pair.code != 0 {
            return Err(DxfError::parse(
                pair.line,
                format!(
                    "expected SECTION or EOF marker, found group code {}",
                    pair.code
                ),
            ));
        }

        match pair.value.as_str() {
            "SECTION" => {
                let name = cursor.next().cloned().ok_or_else(|| {
                    DxfError::section("?", pair.line, "SECTION marker with no name pair")
                })?;
                if name.code != 2 {
                    return Err(DxfError::section(
                        "?",
                        name.line,
                        format!("section name must use group code 2, found {}", name.code),
                    ));
                }

                match name.value.as_str() {
                    "HEADER" => header::parse(&mut cursor, &mut document.header)?,
                    "TABLES" => tables::parse(&mut cursor, &mut document.layers)?,
                    "BLOCKS" => blocks::parse(&mut cursor, &mut document.blocks)?,
                    "ENTITIES" => entities::parse(&mut cursor, &mut document.entities)?,
                    other => {
                        debug!(section = other, "Skipping unhandled section");
                        skip_section(&mut cursor, other)?;
                    }
                }
            }
            "EOF" => break,
            other => {
                return Err(DxfError::parse(
                    pair.line,
                    format!("unexpected marker \"{other}\", expected SECTION or EOF"),
                ));
            }
        }
    }

    Ok(document)
}

/// Saute une section jusqu'à son ENDSEC, sans jamais consommer le marqueur
/// SECTION d'une éventuelle section suivante
fn skip_section(cursor: &mut GroupCursor, section: &str) -> Result<(), DxfError> {
    loop {
        match cursor.next() {
            Some(pair) if pair.code == 0 && pair.value == "ENDSEC" => return Ok(()),
            Some(pair) if pair.code == 0 && pair.value == "SECTION" => {
                let line = pair.line;
                cursor.back();
                return Err(DxfError::section(
                    section,
                    line,
                    "missing ENDSEC before next SECTION",
                ));
            }
            Some(_) => continue,
            None => {
                return Err(DxfError::section(section, 0, "missing ENDSEC"));
            }
        }
    }
}
