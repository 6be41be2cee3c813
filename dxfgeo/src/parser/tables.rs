//! Parser de la section TABLES (table LAYER uniquement)

use std::collections::BTreeMap;

use crate::reader::GroupCursor;
use crate::types::LayerDef;
use crate::DxfError;

/// Bit 1 du groupe 70 d'une couche: couche gelée
const LAYER_FLAG_FROZEN: i32 = 1;

/// Parse la section TABLES; seule la table LAYER est retenue, les autres
/// (LTYPE, STYLE, VPORT...) sont sautées.
pub fn parse(
    cursor: &mut GroupCursor,
    layers: &mut BTreeMap<String, LayerDef>,
) -> Result<(), DxfError> {
    loop {
        let Some(pair) = cursor.next() else {
            return Err(DxfError::section("TABLES", 0, "missing ENDSEC"));
        };
        let pair = pair.clone();

        match pair.code {
            0 if pair.value == "ENDSEC" => break,
            0 if pair.value == "SECTION" => {
                cursor.back();
                return Err(DxfError::section(
                    "TABLES",
                    pair.line,
                    "missing ENDSEC before next SECTION",
                ));
            }
            0 if pair.value == "TABLE" => {
                let is_layer_table = matches!(
                    cursor.peek(),
                    Some(name) if name.code == 2 && name.value == "LAYER"
                );
                if is_layer_table {
                    cursor.next();
                    parse_layer_table(cursor, layers)?;
                } else {
                    skip_table(cursor)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Parse les enregistrements LAYER jusqu'à ENDTAB
fn parse_layer_table(
    cursor: &mut GroupCursor,
    layers: &mut BTreeMap<String, LayerDef>,
) -> Result<(), DxfError> {
    loop {
        let Some(pair) = cursor.next() else {
            return Err(DxfError::section("TABLES", 0, "LAYER table missing ENDTAB"));
        };
        let pair = pair.clone();

        match pair.code {
            0 if pair.value == "ENDTAB" => break,
            0 if pair.value == "ENDSEC" || pair.value == "SECTION" => {
                cursor.back();
                return Err(DxfError::section(
                    "TABLES",
                    pair.line,
                    "LAYER table missing ENDTAB",
                ));
            }
            0 if pair.value == "LAYER" => {
                let layer = parse_layer_record(cursor);
                if !layer.name.is_empty() {
                    layers.insert(layer.name.clone(), layer);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Lit les paires d'un enregistrement LAYER jusqu'au prochain code 0
fn parse_layer_record(cursor: &mut GroupCursor) -> LayerDef {
    let mut layer = LayerDef {
        name: String::new(),
        color: None,
        line_type: None,
        frozen: false,
    };

    while let Some(pair) = cursor.peek() {
        if pair.code == 0 {
            break;
        }
        let pair = pair.clone();
        cursor.next();

        match pair.code {
            2 => layer.name = pair.value,
            6 => layer.line_type = Some(pair.value),
            62 => layer.color = pair.value.trim().parse().ok(),
            70 => {
                if let Ok(flags) = pair.value.trim().parse::<i32>() {
                    layer.frozen = flags & LAYER_FLAG_FROZEN != 0;
                }
            }
            _ => {}
        }
    }

    layer
}

/// Saute une table non gérée jusqu'à son ENDTAB
fn skip_table(cursor: &mut GroupCursor) -> Result<(), DxfError> {
    loop {
        match cursor.next() {
            Some(pair) if pair.code == 0 && pair.value == "ENDTAB" => return Ok(()),
            Some(pair) if pair.code == 0 && (pair.value == "ENDSEC" || pair.value == "SECTION") => {
                let line = pair.line;
                cursor.back();
                return Err(DxfError::section("TABLES", line, "table missing ENDTAB"));
            }
            Some(_) => continue,
            None => return Err(DxfError::section("TABLES", 0, "table missing ENDTAB")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_pairs;

    #[test]
    fn test_parse_layer_table() {
        let content = "0\nTABLE\n2\nLAYER\n70\n2\n\
                       0\nLAYER\n2\nSite\n62\n7\n6\nContinuous\n70\n0\n\
                       0\nLAYER\n2\nFrozen\n62\n1\n70\n1\n\
                       0\nENDTAB\n0\nENDSEC\n";
        let mut cursor = GroupCursor::new(read_pairs(content).unwrap());
        let mut layers = BTreeMap::new();
        parse(&mut cursor, &mut layers).unwrap();

        assert_eq!(layers.len(), 2);
        let site = layers.get("Site").unwrap();
        assert_eq!(site.color, Some(7));
        assert_eq!(site.line_type.as_deref(), Some("Continuous"));
        assert!(!site.frozen);
        assert!(layers.get("Frozen").unwrap().frozen);
    }

    #[test]
    fn test_skips_other_tables() {
        let content = "0\nTABLE\n2\nLTYPE\n0\nLTYPE\n2\nContinuous\n0\nENDTAB\n\
                       0\nTABLE\n2\nLAYER\n0\nLAYER\n2\nSite\n70\n0\n0\nENDTAB\n\
                       0\nENDSEC\n";
        let mut cursor = GroupCursor::new(read_pairs(content).unwrap());
        let mut layers = BTreeMap::new();
        parse(&mut cursor, &mut layers).unwrap();
        assert_eq!(layers.len(), 1);
        assert!(layers.contains_key("Site"));
    }
}
