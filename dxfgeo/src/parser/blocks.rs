//! Parser de la section BLOCKS (définitions de blocs et leurs entités)

use std::collections::HashMap;

use tracing::warn;

use crate::parser::entities::parse_entity;
use crate::reader::GroupCursor;
use crate::types::Block;
use crate::DxfError;

/// Parse la section BLOCKS jusqu'à son ENDSEC
pub fn parse(cursor: &mut GroupCursor, blocks: &mut HashMap<String, Block>) -> Result<(), DxfError> {
    loop {
        let Some(pair) = cursor.next() else {
            return Err(DxfError::section("BLOCKS", 0, "missing ENDSEC"));
        };
        let pair = pair.clone();

        match pair.code {
            0 if pair.value == "ENDSEC" => break,
            0 if pair.value == "SECTION" => {
                cursor.back();
                return Err(DxfError::section(
                    "BLOCKS",
                    pair.line,
                    "missing ENDSEC before next SECTION",
                ));
            }
            0 if pair.value == "BLOCK" => {
                if let Some(block) = parse_block(cursor)? {
                    blocks.insert(block.name.clone(), block);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Parse un bloc: ses attributs puis ses entités jusqu'à ENDBLK
fn parse_block(cursor: &mut GroupCursor) -> Result<Option<Block>, DxfError> {
    let mut name = String::new();
    let mut base_x = 0.0;
    let mut base_y = 0.0;

    // Attributs du bloc, jusqu'au premier code 0
    while let Some(pair) = cursor.peek() {
        if pair.code == 0 {
            break;
        }
        let pair = pair.clone();
        cursor.next();

        match pair.code {
            2 if name.is_empty() => name = pair.value,
            10 => base_x = fast_float::parse(pair.value.trim()).unwrap_or(0.0),
            20 => base_y = fast_float::parse(pair.value.trim()).unwrap_or(0.0),
            _ => {}
        }
    }

    let mut entities = Vec::new();
    loop {
        let Some(pair) = cursor.next() else {
            return Err(DxfError::section("BLOCKS", 0, "BLOCK missing ENDBLK"));
        };
        let pair = pair.clone();

        if pair.code != 0 {
            return Err(DxfError::section(
                "BLOCKS",
                pair.line,
                format!("stray group code {} inside BLOCK", pair.code),
            ));
        }

        match pair.value.as_str() {
            "ENDBLK" => {
                // Corps de l'ENDBLK (handle, couche): consommé et ignoré
                while let Some(p) = cursor.peek() {
                    if p.code == 0 {
                        break;
                    }
                    cursor.next();
                }
                break;
            }
            "ENDSEC" | "SECTION" => {
                cursor.back();
                return Err(DxfError::section(
                    "BLOCKS",
                    pair.line,
                    "BLOCK missing ENDBLK",
                ));
            }
            kind => {
                if let Some(entity) = parse_entity(cursor, kind) {
                    entities.push(entity);
                }
            }
        }
    }

    if name.is_empty() {
        warn!("Skipping BLOCK with no name (group 2)");
        return Ok(None);
    }

    Ok(Some(Block {
        name,
        base_point: (base_x, base_y),
        entities,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_pairs;

    #[test]
    fn test_parse_block_with_entities() {
        let content = "0\nBLOCK\n8\n0\n2\nTREE\n10\n0.0\n20\n0.0\n\
                       0\nCIRCLE\n10\n0.0\n20\n0.0\n40\n2.5\n\
                       0\nENDBLK\n5\n2F\n\
                       0\nENDSEC\n";
        let mut cursor = GroupCursor::new(read_pairs(content).unwrap());
        let mut blocks = HashMap::new();
        parse(&mut cursor, &mut blocks).unwrap();

        let tree = blocks.get("TREE").unwrap();
        assert_eq!(tree.entities.len(), 1);
        assert_eq!(tree.base_point, (0.0, 0.0));
    }

    #[test]
    fn test_unterminated_block_is_section_error() {
        let content = "0\nBLOCK\n2\nBAD\n0\nENDSEC\n";
        let mut cursor = GroupCursor::new(read_pairs(content).unwrap());
        let mut blocks = HashMap::new();
        let err = parse(&mut cursor, &mut blocks).unwrap_err();
        assert!(matches!(err, DxfError::Section { .. }));
    }
}
