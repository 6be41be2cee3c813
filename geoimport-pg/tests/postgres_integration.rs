//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostgreSQL avec PostGIS disponible.
//! Configuration via variables d'environnement:
//! - PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE
//!
//! Exécution:
//! ```bash
//! # Avec PostgreSQL local
//! cargo test --test postgres_integration -- --ignored
//!
//! # Avec Docker
//! docker run -d --name postgres-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGPASSWORD=test cargo test --test postgres_integration -- --ignored
//! ```

use anyhow::Result;
use deadpool_postgres::{Config, Pool, Runtime};
use serde_json::json;
use tokio_postgres::NoTls;

use geoimport_pg::import::postgres::{self, ImportRequest};

const TEST_SCHEMA: &str = "geodata_test";

/// Configuration de test
fn test_config() -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(std::env::var("PGHOST").unwrap_or_else(|_| "localhost".into()));
    cfg.port = Some(
        std::env::var("PGPORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
    );
    cfg.dbname = Some(std::env::var("PGDATABASE").unwrap_or_else(|_| "geodata_test".into()));
    cfg.user = Some(std::env::var("PGUSER").unwrap_or_else(|_| "postgres".into()));
    cfg.password = std::env::var("PGPASSWORD").ok();
    cfg
}

async fn create_test_pool() -> Result<Pool> {
    let cfg = test_config();
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(pool)
}

async fn reset_test_schema(pool: &Pool) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", TEST_SCHEMA))
        .await?;
    postgres::create_schema(pool, TEST_SCHEMA).await?;
    Ok(())
}

/// Polygone carré valide autour d'un point LV95
fn valid_polygon(offset: f64) -> geojson::Feature {
    let x = 2_600_000.0 + offset;
    let y = 1_200_000.0 + offset;
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![x, y],
            vec![x + 10.0, y],
            vec![x + 10.0, y + 10.0],
            vec![x, y + 10.0],
            vec![x, y],
        ]]))),
        id: None,
        properties: Some(
            [("layer".to_string(), json!("Building"))]
                .into_iter()
                .collect(),
        ),
        foreign_members: None,
    }
}

/// Noeud papillon auto-intersectant
fn bowtie_polygon() -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::Polygon(vec![vec![
            vec![2_600_000.0, 1_200_000.0],
            vec![2_600_010.0, 1_200_010.0],
            vec![2_600_010.0, 1_200_000.0],
            vec![2_600_000.0, 1_200_010.0],
            vec![2_600_000.0, 1_200_000.0],
        ]]))),
        id: None,
        properties: Some(
            [("layer".to_string(), json!("Building"))]
                .into_iter()
                .collect(),
        ),
        foreign_members: None,
    }
}

/// Test de connexion basique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_database_connection() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    let client = pool.get().await.expect("Failed to get client");

    let row = client
        .query_one("SELECT 1::INT", &[])
        .await
        .expect("Query failed");
    let value: i32 = row.get(0);
    assert_eq!(value, 1);
}

/// Import nominal: 10 polygones valides
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_import_valid_batch() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    reset_test_schema(&pool).await.expect("Schema reset failed");

    let request = ImportRequest {
        project_file_id: "file-001".to_string(),
        collection_name: "test-batch".to_string(),
        features: (0..10).map(|i| valid_polygon(i as f64 * 100.0)).collect(),
        source_srid: 2056,
        target_srid: 4326,
        batch_size: 4,
    };

    let outcome = postgres::import_features(&pool, TEST_SCHEMA, &request)
        .await
        .expect("Import failed");

    assert_eq!(outcome.imported_count, 10);
    assert_eq!(outcome.failed_count, 0);
    assert!(outcome.collection_id > 0);
    assert!(outcome.layer_id > 0);

    // Les géométries WGS84 tombent dans l'emprise suisse
    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            &format!(
                "SELECT MIN(ST_X(ST_Centroid(geometry_wgs84))),
                        MAX(ST_Y(ST_Centroid(geometry_wgs84)))
                 FROM {}.geo_features WHERE collection_id = $1",
                TEST_SCHEMA
            ),
            &[&outcome.collection_id],
        )
        .await
        .unwrap();
    let lon: f64 = row.get(0);
    let lat: f64 = row.get(1);
    assert!(lon > 6.0 && lon < 10.0, "Expected Swiss longitude, got {lon}");
    assert!(lat > 45.0 && lat < 48.0, "Expected Swiss latitude, got {lat}");
}

/// Un polygone auto-intersectant parmi neuf valides: au moins neuf
/// importés, au plus un échec avec une raison lisible
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_import_isolates_invalid_feature() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    reset_test_schema(&pool).await.expect("Schema reset failed");

    let mut features: Vec<geojson::Feature> =
        (0..9).map(|i| valid_polygon(i as f64 * 100.0)).collect();
    features.insert(4, bowtie_polygon());

    let request = ImportRequest {
        project_file_id: "file-002".to_string(),
        collection_name: "test-invalid".to_string(),
        features,
        source_srid: 2056,
        target_srid: 4326,
        batch_size: 100,
    };

    let outcome = postgres::import_features(&pool, TEST_SCHEMA, &request)
        .await
        .expect("Import failed");

    assert!(outcome.imported_count >= 9);
    assert!(outcome.failed_count <= 1);

    // Le noeud papillon est soit réparé (convex hull), soit rejeté avec
    // une raison lisible
    if outcome.failed_count == 1 {
        let failure = &outcome.debug_info.skipped_features[0];
        assert_eq!(failure.index, 4);
        assert!(!failure.error.is_empty());
    } else {
        assert!(outcome.debug_info.repaired_count >= 1);
        assert!(outcome
            .debug_info
            .repair_summary
            .iter()
            .any(|note| note.index == 4));
    }
}

/// Les champs de statut de hauteur démarrent à pending
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_height_status_starts_pending() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    reset_test_schema(&pool).await.expect("Schema reset failed");

    let request = ImportRequest {
        project_file_id: "file-003".to_string(),
        collection_name: "test-height".to_string(),
        features: vec![valid_polygon(0.0)],
        source_srid: 2056,
        target_srid: 4326,
        batch_size: 100,
    };

    let outcome = postgres::import_features(&pool, TEST_SCHEMA, &request)
        .await
        .expect("Import failed");
    assert_eq!(outcome.imported_count, 1);

    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            &format!(
                "SELECT height_status FROM {}.geo_features WHERE collection_id = $1",
                TEST_SCHEMA
            ),
            &[&outcome.collection_id],
        )
        .await
        .unwrap();
    let status: String = row.get(0);
    assert_eq!(status, "pending");
}

/// Le skip par checksum est idempotent
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_file_checksum_round_trip() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    reset_test_schema(&pool).await.expect("Schema reset failed");

    let already = postgres::is_file_already_imported(&pool, TEST_SCHEMA, "plan.dxf", "abc123")
        .await
        .unwrap();
    assert!(!already);

    postgres::record_file_checksum(&pool, TEST_SCHEMA, "plan.dxf", "abc123")
        .await
        .unwrap();

    let already = postgres::is_file_already_imported(&pool, TEST_SCHEMA, "plan.dxf", "abc123")
        .await
        .unwrap();
    assert!(already);

    // Checksum différent: le fichier doit être réimporté
    let already = postgres::is_file_already_imported(&pool, TEST_SCHEMA, "plan.dxf", "def456")
        .await
        .unwrap();
    assert!(!already);
}
