//! Tests d'intégration du pipeline DXF complet sur des fixtures inline

use dxfgeo::{
    bounds::DEFAULT_BOX, parse_str, CrsConfidence, CrsDetection, ParseOptions, Visibility,
};
use geo::Geometry;

/// Assemble un contenu DXF depuis des paires (code, valeur)
fn dxf(pairs: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (code, value) in pairs {
        out.push_str(code);
        out.push('\n');
        out.push_str(value);
        out.push('\n');
    }
    out
}

fn building_polygon_lv95() -> String {
    dxf(&[
        ("0", "SECTION"),
        ("2", "HEADER"),
        ("9", "$EXTMIN"),
        ("10", "2600000.0"),
        ("20", "1199000.0"),
        ("9", "$EXTMAX"),
        ("10", "2600020.0"),
        ("20", "1199020.0"),
        ("0", "ENDSEC"),
        ("0", "SECTION"),
        ("2", "TABLES"),
        ("0", "TABLE"),
        ("2", "LAYER"),
        ("0", "LAYER"),
        ("2", "Building"),
        ("62", "7"),
        ("70", "0"),
        ("0", "ENDTAB"),
        ("0", "ENDSEC"),
        ("0", "SECTION"),
        ("2", "ENTITIES"),
        ("0", "LWPOLYLINE"),
        ("5", "1B2"),
        ("8", "Building"),
        ("90", "4"),
        ("70", "1"),
        ("10", "2600000.0"),
        ("20", "1199000.0"),
        ("10", "2600020.0"),
        ("20", "1199000.0"),
        ("10", "2600020.0"),
        ("20", "1199020.0"),
        ("10", "2600000.0"),
        ("20", "1199020.0"),
        ("0", "ENDSEC"),
        ("0", "EOF"),
    ])
}

#[test]
fn test_closed_lwpolyline_on_building_layer() {
    let output = parse_str(&building_polygon_lv95(), &ParseOptions::default()).unwrap();

    assert_eq!(output.features.len(), 1);
    let feature = &output.features[0];
    assert_eq!(feature.layer, "Building");
    assert!(matches!(feature.geometry, Geometry::Polygon(_)));

    // LV95 détecté par heuristique de magnitude
    match &output.crs {
        CrsDetection::Known(guess) => {
            assert_eq!(guess.epsg, 2056);
            assert_eq!(guess.confidence, CrsConfidence::Heuristic);
        }
        CrsDetection::Unknown => panic!("Expected LV95 detection"),
    }

    assert_eq!(output.bounds.min_x, 2_600_000.0);
    assert_eq!(output.bounds.max_y, 1_199_020.0);
}

#[test]
fn test_zero_entity_file() {
    let content = dxf(&[
        ("0", "SECTION"),
        ("2", "ENTITIES"),
        ("0", "ENDSEC"),
        ("0", "EOF"),
    ]);
    let output = parse_str(&content, &ParseOptions::default()).unwrap();

    assert!(output.features.is_empty());
    assert_eq!(output.bounds, DEFAULT_BOX);
    assert_eq!(output.layers, vec!["0".to_string()]);
    assert_eq!(output.crs, CrsDetection::Unknown);
}

#[test]
fn test_feature_count_is_entities_minus_incomplete() {
    // 3 entités supportées bien formées, 1 POINT sans coordonnées
    let content = dxf(&[
        ("0", "SECTION"),
        ("2", "ENTITIES"),
        ("0", "LINE"),
        ("10", "0.0"),
        ("20", "0.0"),
        ("11", "5.0"),
        ("21", "5.0"),
        ("0", "POINT"),
        ("10", "1.0"),
        ("20", "1.0"),
        ("0", "POINT"),
        ("8", "Site"),
        ("0", "CIRCLE"),
        ("10", "3.0"),
        ("20", "3.0"),
        ("40", "1.5"),
        ("0", "ENDSEC"),
        ("0", "EOF"),
    ]);
    let output = parse_str(&content, &ParseOptions::default()).unwrap();

    assert_eq!(output.document.entities.len(), 4);
    assert_eq!(output.features.len(), 3);
    assert_eq!(output.stats.skipped, 1);
}

#[test]
fn test_user_override_beats_file_content() {
    let options = ParseOptions {
        source_epsg: Some(4326),
    };
    let output = parse_str(&building_polygon_lv95(), &options).unwrap();

    match &output.crs {
        CrsDetection::Known(guess) => {
            assert_eq!(guess.epsg, 4326);
            assert_eq!(guess.confidence, CrsConfidence::Exact);
        }
        CrsDetection::Unknown => panic!("Expected exact detection"),
    }
}

#[test]
fn test_preview_round_trip_on_parsed_file() {
    let output = parse_str(&building_polygon_lv95(), &ParseOptions::default()).unwrap();
    let mut projector = dxfgeo::PreviewProjector::new(output.features);

    let all = projector.project(&Visibility::AllVisible);
    assert_eq!(all.visible, 1);

    let hidden = projector.project(&Visibility::AllVisible.hiding("Building", &output.layers));
    assert_eq!(hidden.visible, 0);
    assert_eq!(hidden.bounds, DEFAULT_BOX);

    let restored = projector.project(&Visibility::AllVisible);
    assert_eq!(restored.visible, 1);
    assert_eq!(restored.bounds, all.bounds);
}

#[test]
fn test_mixed_line_endings() {
    let content = "0\r\nSECTION\r2\nENTITIES\r\n0\nPOINT\r10\n7.5\r\n20\n46.9\n0\r\nENDSEC\r\n0\nEOF\n";
    let output = parse_str(content, &ParseOptions::default()).unwrap();
    assert_eq!(output.features.len(), 1);
}

#[test]
fn test_z_preserved_through_pipeline() {
    let content = dxf(&[
        ("0", "SECTION"),
        ("2", "ENTITIES"),
        ("0", "POINT"),
        ("10", "2600000.0"),
        ("20", "1199000.0"),
        ("30", "455.7"),
        ("0", "ENDSEC"),
        ("0", "EOF"),
    ]);
    let output = parse_str(&content, &ParseOptions::default()).unwrap();
    assert_eq!(output.features[0].z, Some(vec![455.7]));
}
