//! Parser de la section ENTITIES
//!
//! Les erreurs au niveau d'une entité (valeur numérique illisible, séquence
//! de sommets incohérente) sont isolées: l'entité est sautée avec un
//! warning, jamais fatale pour le fichier. Seules les violations
//! structurelles de la section remontent en erreur.

use tracing::warn;

use crate::reader::{GroupCursor, GroupPair};
use crate::types::{Entity, EntityCommon, Vertex};
use crate::DxfError;

/// Bit 1 du groupe 70 d'une polyligne: polyligne fermée
const POLYLINE_FLAG_CLOSED: i32 = 1;

/// Parse la section ENTITIES jusqu'à ENDSEC.
///
/// Le scanner s'arrête sur un marqueur `(0, "SECTION")` sans le consommer:
/// un ENDSEC manquant ne fait jamais avaler la section suivante.
pub fn parse(cursor: &mut GroupCursor, out: &mut Vec<Entity>) -> Result<(), DxfError> {
    loop {
        let Some(pair) = cursor.next() else {
            return Err(DxfError::section("ENTITIES", 0, "missing ENDSEC"));
        };
        let pair = pair.clone();

        if pair.code != 0 {
            return Err(DxfError::section(
                "ENTITIES",
                pair.line,
                format!("stray group code {} between entities", pair.code),
            ));
        }

        match pair.value.as_str() {
            "ENDSEC" => break,
            "SECTION" => {
                warn!(
                    line = pair.line,
                    "ENTITIES section not terminated, stopping at next SECTION marker"
                );
                cursor.back();
                break;
            }
            kind => {
                if let Some(entity) = parse_entity(cursor, kind) {
                    out.push(entity);
                }
            }
        }
    }

    Ok(())
}

/// Parse une entité dont le marqueur `(0, kind)` vient d'être consommé.
///
/// Retourne `None` pour un type non géré ou une entité malformée (warning
/// structuré émis, l'appelant continue).
pub(crate) fn parse_entity(cursor: &mut GroupCursor, kind: &str) -> Option<Entity> {
    let body = collect_body(cursor);

    let built = match kind {
        "LINE" => build_line(&body),
        "LWPOLYLINE" => build_lwpolyline(&body),
        "POLYLINE" => build_polyline(&body, cursor),
        "CIRCLE" => build_circle(&body),
        "ARC" => build_arc(&body),
        "POINT" => build_point(&body),
        "TEXT" | "MTEXT" => build_text(&body),
        "INSERT" => build_insert(&body),
        _ => return None,
    };

    match built {
        Ok(entity) => Some(entity),
        Err(reason) => {
            warn!(
                entity_type = kind,
                reason = reason.as_str(),
                "Skipping malformed entity"
            );
            None
        }
    }
}

/// Consomme les paires du corps d'une entité, jusqu'au prochain code 0
/// exclu
fn collect_body(cursor: &mut GroupCursor) -> Vec<GroupPair> {
    let mut body = Vec::new();
    while let Some(pair) = cursor.peek() {
        if pair.code == 0 {
            break;
        }
        body.push(pair.clone());
        cursor.next();
    }
    body
}

fn common_from(body: &[GroupPair]) -> EntityCommon {
    let mut common = EntityCommon::default();
    for pair in body {
        match pair.code {
            8 if !pair.value.is_empty() => common.layer = pair.value.clone(),
            5 => common.handle = Some(pair.value.clone()),
            _ => {}
        }
    }
    common
}

fn num(pair: &GroupPair) -> Result<f64, String> {
    fast_float::parse(pair.value.trim()).map_err(|_| {
        format!(
            "invalid numeric value \"{}\" for group {} at line {}",
            pair.value, pair.code, pair.line
        )
    })
}

fn build_line(body: &[GroupPair]) -> Result<Entity, String> {
    let mut start = Vertex::default();
    let mut end = Vertex::default();

    for pair in body {
        match pair.code {
            10 => start.x = num(pair)?,
            20 => start.y = num(pair)?,
            30 => start.z = Some(num(pair)?),
            11 => end.x = num(pair)?,
            21 => end.y = num(pair)?,
            31 => end.z = Some(num(pair)?),
            _ => {}
        }
    }

    Ok(Entity::Line {
        common: common_from(body),
        start,
        end,
    })
}

fn build_lwpolyline(body: &[GroupPair]) -> Result<Entity, String> {
    let mut vertices: Vec<(f64, f64)> = Vec::new();
    let mut pending_x: Option<f64> = None;
    let mut closed = false;
    let mut elevation = None;

    for pair in body {
        match pair.code {
            90 => {
                if let Ok(count) = pair.value.trim().parse::<usize>() {
                    vertices.reserve(count);
                }
            }
            70 => {
                let flags: i32 = pair.value.trim().parse().unwrap_or(0);
                closed = flags & POLYLINE_FLAG_CLOSED != 0;
            }
            38 => elevation = Some(num(pair)?),
            10 => {
                if pending_x.is_some() {
                    return Err(format!(
                        "vertex X at line {} follows an X with no matching Y",
                        pair.line
                    ));
                }
                pending_x = Some(num(pair)?);
            }
            20 => {
                let Some(x) = pending_x.take() else {
                    return Err(format!(
                        "vertex Y at line {} has no matching X",
                        pair.line
                    ));
                };
                vertices.push((x, num(pair)?));
            }
            // Bulge et largeurs: présents mais inutilisés par la
            // conversion géométrique, jamais des erreurs
            40 | 41 | 42 | 43 => {}
            _ => {}
        }
    }

    if pending_x.is_some() {
        return Err("last vertex X has no matching Y".to_string());
    }

    Ok(Entity::LwPolyline {
        common: common_from(body),
        vertices,
        elevation,
        closed,
    })
}

/// POLYLINE lourde: le corps est suivi d'enregistrements VERTEX terminés
/// par SEQEND
fn build_polyline(body: &[GroupPair], cursor: &mut GroupCursor) -> Result<Entity, String> {
    let mut closed = false;
    for pair in body {
        if pair.code == 70 {
            let flags: i32 = pair.value.trim().parse().unwrap_or(0);
            closed = flags & POLYLINE_FLAG_CLOSED != 0;
        }
    }

    let mut vertices = Vec::new();
    loop {
        let Some(marker) = cursor.peek() else { break };
        if marker.code != 0 {
            break;
        }
        let marker_value = marker.value.clone();
        match marker_value.as_str() {
            "VERTEX" => {
                cursor.next();
                let vbody = collect_body(cursor);
                let mut vertex = Vertex::default();
                for pair in &vbody {
                    match pair.code {
                        10 => vertex.x = num(pair)?,
                        20 => vertex.y = num(pair)?,
                        30 => vertex.z = Some(num(pair)?),
                        _ => {}
                    }
                }
                vertices.push(vertex);
            }
            "SEQEND" => {
                cursor.next();
                collect_body(cursor);
                break;
            }
            _ => break,
        }
    }

    Ok(Entity::Polyline {
        common: common_from(body),
        vertices,
        closed,
    })
}

fn build_circle(body: &[GroupPair]) -> Result<Entity, String> {
    let mut center = Vertex::default();
    let mut radius = f64::NAN;

    for pair in body {
        match pair.code {
            10 => center.x = num(pair)?,
            20 => center.y = num(pair)?,
            30 => center.z = Some(num(pair)?),
            40 => radius = num(pair)?,
            _ => {}
        }
    }

    Ok(Entity::Circle {
        common: common_from(body),
        center,
        radius,
    })
}

fn build_arc(body: &[GroupPair]) -> Result<Entity, String> {
    let mut center = Vertex::default();
    let mut radius = f64::NAN;
    let mut start_angle = f64::NAN;
    let mut end_angle = f64::NAN;

    for pair in body {
        match pair.code {
            10 => center.x = num(pair)?,
            20 => center.y = num(pair)?,
            30 => center.z = Some(num(pair)?),
            40 => radius = num(pair)?,
            50 => start_angle = num(pair)?,
            51 => end_angle = num(pair)?,
            _ => {}
        }
    }

    Ok(Entity::Arc {
        common: common_from(body),
        center,
        radius,
        start_angle,
        end_angle,
    })
}

fn build_point(body: &[GroupPair]) -> Result<Entity, String> {
    let mut position = Vertex::default();

    for pair in body {
        match pair.code {
            10 => position.x = num(pair)?,
            20 => position.y = num(pair)?,
            30 => position.z = Some(num(pair)?),
            _ => {}
        }
    }

    Ok(Entity::Point {
        common: common_from(body),
        position,
    })
}

fn build_text(body: &[GroupPair]) -> Result<Entity, String> {
    let mut position = Vertex::default();
    let mut content = String::new();

    for pair in body {
        match pair.code {
            10 => position.x = num(pair)?,
            20 => position.y = num(pair)?,
            30 => position.z = Some(num(pair)?),
            // MTEXT découpe le texte long en groupes 3 + un groupe 1 final
            3 => content.push_str(&pair.value),
            1 => content.push_str(&pair.value),
            _ => {}
        }
    }

    Ok(Entity::Text {
        common: common_from(body),
        position,
        content,
    })
}

fn build_insert(body: &[GroupPair]) -> Result<Entity, String> {
    let mut position = Vertex::default();
    let mut block_name = String::new();

    for pair in body {
        match pair.code {
            2 => block_name = pair.value.clone(),
            10 => position.x = num(pair)?,
            20 => position.y = num(pair)?,
            30 => position.z = Some(num(pair)?),
            _ => {}
        }
    }

    if block_name.is_empty() {
        return Err("INSERT with no block name (group 2)".to_string());
    }

    Ok(Entity::Insert {
        common: common_from(body),
        block_name,
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::read_pairs;

    fn parse_entities(content: &str) -> Vec<Entity> {
        let mut cursor = GroupCursor::new(read_pairs(content).unwrap());
        let mut out = Vec::new();
        parse(&mut cursor, &mut out).unwrap();
        out
    }

    #[test]
    fn test_parse_line_entity() {
        let entities = parse_entities(
            "0\nLINE\n5\n1AF\n8\nSite\n10\n0.0\n20\n0.0\n11\n10.0\n21\n5.0\n0\nENDSEC\n",
        );
        assert_eq!(entities.len(), 1);
        match &entities[0] {
            Entity::Line { common, start, end } => {
                assert_eq!(common.layer, "Site");
                assert_eq!(common.handle.as_deref(), Some("1AF"));
                assert_eq!((start.x, start.y), (0.0, 0.0));
                assert_eq!((end.x, end.y), (10.0, 5.0));
            }
            other => panic!("Expected Line, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_lwpolyline_closed_with_bulge() {
        // Le bulge (42) est présent mais ignoré, pas une erreur
        let entities = parse_entities(
            "0\nLWPOLYLINE\n8\nBuilding\n90\n4\n70\n1\n38\n420.0\n\
             10\n0.0\n20\n0.0\n42\n0.5\n\
             10\n10.0\n20\n0.0\n\
             10\n10.0\n20\n10.0\n40\n0.2\n41\n0.2\n\
             10\n0.0\n20\n10.0\n\
             0\nENDSEC\n",
        );
        assert_eq!(entities.len(), 1);
        match &entities[0] {
            Entity::LwPolyline {
                vertices,
                closed,
                elevation,
                ..
            } => {
                assert_eq!(vertices.len(), 4);
                assert!(*closed);
                assert_eq!(*elevation, Some(420.0));
            }
            other => panic!("Expected LwPolyline, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_polyline_with_vertex_seqend() {
        let entities = parse_entities(
            "0\nPOLYLINE\n8\nRoad\n70\n0\n\
             0\nVERTEX\n10\n0.0\n20\n0.0\n30\n400.0\n\
             0\nVERTEX\n10\n5.0\n20\n5.0\n30\n401.0\n\
             0\nSEQEND\n\
             0\nENDSEC\n",
        );
        assert_eq!(entities.len(), 1);
        match &entities[0] {
            Entity::Polyline { vertices, .. } => {
                assert_eq!(vertices.len(), 2);
                assert_eq!(vertices[0].z, Some(400.0));
            }
            other => panic!("Expected Polyline, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_entity_is_skipped_not_fatal() {
        let entities = parse_entities(
            "0\nLINE\n10\nnot-a-number\n20\n0.0\n\
             0\nPOINT\n10\n1.0\n20\n2.0\n\
             0\nENDSEC\n",
        );
        // La LINE malformée est sautée, le POINT survit
        assert_eq!(entities.len(), 1);
        assert!(matches!(entities[0], Entity::Point { .. }));
    }

    #[test]
    fn test_unknown_entity_type_skipped() {
        let entities =
            parse_entities("0\nHATCH\n8\n0\n2\nSOLID\n0\nPOINT\n10\n1\n20\n2\n0\nENDSEC\n");
        assert_eq!(entities.len(), 1);
    }

    #[test]
    fn test_layer_defaults_to_zero() {
        let entities = parse_entities("0\nPOINT\n10\n1.0\n20\n2.0\n0\nENDSEC\n");
        assert_eq!(entities[0].common().layer, "0");
    }
}
