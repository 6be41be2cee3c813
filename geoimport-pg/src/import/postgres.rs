//! Import par lots vers PostgreSQL/PostGIS
//!
//! Chaque feature est nettoyée, validée, réparée si besoin, reprojetée
//! puis insérée. Les échecs sont isolés par feature et agrégés dans le
//! diagnostic retourné; seules les erreurs de connexion/transaction sont
//! fatales pour l'import.

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use geo::Geometry;
use serde::Serialize;
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tracing::{debug, info, warn};

use crate::formats::extract_z_values;
use crate::import::repair::{prepare_geometry, RepairMethod};
use crate::import::reproject::Reprojector;

/// Requête d'import d'un lot de features.
///
/// Les noms de champs (et ceux du résultat) sont le contrat stable de la
/// frontière de persistance; l'outillage aval en dépend.
#[derive(Debug)]
pub struct ImportRequest {
    pub project_file_id: String,
    pub collection_name: String,
    pub features: Vec<geojson::Feature>,
    pub source_srid: u32,
    pub target_srid: u32,
    pub batch_size: usize,
}

/// Feature rejetée, avec son index d'origine et l'état SQL éventuel
#[derive(Debug, Clone, Serialize)]
pub struct FailedFeature {
    pub index: usize,
    pub error: String,
    pub sql_state: Option<String>,
}

/// Réparation appliquée à une feature
#[derive(Debug, Clone, Serialize)]
pub struct RepairNote {
    pub index: usize,
    pub method: &'static str,
}

/// Diagnostic structuré retourné avec les compteurs
#[derive(Debug, Default, Serialize)]
pub struct DebugInfo {
    pub repaired_count: usize,
    pub cleaned_count: usize,
    pub skipped_count: usize,
    pub repair_summary: Vec<RepairNote>,
    pub skipped_features: Vec<FailedFeature>,
    pub notices: Vec<String>,
}

/// Résultat d'un import
#[derive(Debug)]
pub struct ImportOutcome {
    pub collection_id: i64,
    pub layer_id: i64,
    pub imported_count: usize,
    pub failed_count: usize,
    pub debug_info: DebugInfo,
}

/// Ordonnées Z d'une feature, alignées sur l'ordre des coordonnées
#[derive(Debug, Clone)]
enum ZValues {
    None,
    /// Une seule valeur pour tous les sommets (géométrie remaniée par la
    /// réparation: l'alignement par sommet n'est plus garanti)
    Uniform(f64),
    PerVertex(Vec<f64>),
}

/// Feature prête à insérer
#[derive(Debug)]
struct PreparedFeature {
    index: usize,
    source_layer: Option<String>,
    original_ewkt: String,
    transformed_ewkt: String,
    properties: Value,
}

/// Crée le schéma et les tables d'import
pub async fn create_schema(pool: &Pool, schema: &str) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema), &[])
        .await
        .context("Failed to create schema")?;

    // Activer PostGIS si nécessaire (peut nécessiter des droits
    // superuser). Si l'extension existe déjà mais que l'utilisateur ne
    // peut pas la (re)créer, on dégrade gracieusement.
    match client
        .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
        .await
    {
        Ok(_) => {}
        Err(e) => {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow::anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                ));
            }
        }
    }

    // Les colonnes géométriques sont sans typmod: le SRID de
    // geometry_original varie selon le fichier source, et les dimensions
    // (2D/3D) selon les données
    client
        .batch_execute(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {schema}.feature_collections (
                id BIGSERIAL PRIMARY KEY,
                project_file_id TEXT NOT NULL,
                name TEXT NOT NULL,
                source_srid INTEGER NOT NULL,
                created_at TIMESTAMPTZ DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS {schema}.layers (
                id BIGSERIAL PRIMARY KEY,
                collection_id BIGINT NOT NULL
                    REFERENCES {schema}.feature_collections(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS {schema}.geo_features (
                id BIGSERIAL PRIMARY KEY,
                collection_id BIGINT NOT NULL
                    REFERENCES {schema}.feature_collections(id) ON DELETE CASCADE,
                layer_id BIGINT NOT NULL
                    REFERENCES {schema}.layers(id) ON DELETE CASCADE,
                source_layer TEXT,
                geometry_original geometry NOT NULL,
                geometry_wgs84 geometry,
                properties JSONB,
                height_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (height_status IN ('pending', 'complete', 'failed')),
                created_at TIMESTAMPTZ DEFAULT NOW(),
                updated_at TIMESTAMPTZ DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_geo_features_layer
                ON {schema}.geo_features (layer_id);
            CREATE INDEX IF NOT EXISTS idx_geo_features_wgs84
                ON {schema}.geo_features USING GIST (geometry_wgs84);

            CREATE TABLE IF NOT EXISTS {schema}._file_checksums (
                file_name TEXT PRIMARY KEY,
                checksum TEXT NOT NULL,
                imported_at TIMESTAMPTZ DEFAULT NOW()
            );
            "#
        ))
        .await
        .context("Failed to create import tables")?;

    info!(schema, "Import schema ready");
    Ok(())
}

/// Vérifie si un fichier a déjà été importé avec le même checksum
pub async fn is_file_already_imported(
    pool: &Pool,
    schema: &str,
    file_name: &str,
    checksum: &str,
) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "SELECT 1 FROM {}._file_checksums WHERE file_name = $1 AND checksum = $2",
                schema
            ),
            &[&file_name, &checksum],
        )
        .await?;
    Ok(row.is_some())
}

/// Enregistre le checksum d'un fichier après import réussi
pub async fn record_file_checksum(
    pool: &Pool,
    schema: &str,
    file_name: &str,
    checksum: &str,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            &format!(
                r#"
                INSERT INTO {}._file_checksums (file_name, checksum)
                VALUES ($1, $2)
                ON CONFLICT (file_name) DO UPDATE SET checksum = $2, imported_at = NOW()
                "#,
                schema
            ),
            &[&file_name, &checksum],
        )
        .await
        .context("Failed to record file checksum")?;
    Ok(())
}

/// Importe un lot de features dans PostGIS.
///
/// Pour chaque feature: nettoyage, validation, réparation éventuelle,
/// reprojection source → cible, insertion. Une feature en échec est
/// enregistrée dans le diagnostic et sautée, sans interrompre le lot.
///
/// # Errors
///
/// Erreur fatale uniquement pour un problème de connexion, de schéma ou
/// de reprojection impossible à construire.
pub async fn import_features(
    pool: &Pool,
    schema: &str,
    request: &ImportRequest,
) -> Result<ImportOutcome> {
    let reprojector = Reprojector::new(request.source_srid, request.target_srid)?;

    let mut debug_info = DebugInfo::default();

    // Dimensionnalité cohérente: 3D dès qu'une feature porte un Z
    let force_3d = request
        .features
        .iter()
        .any(|f| f.geometry.as_ref().is_some_and(has_z));
    if force_3d {
        debug_info
            .notices
            .push("mixed coordinate dimensions detected, normalizing to 3D".to_string());
    }

    // Préparation (pure) de toutes les features, échecs isolés
    let mut prepared: Vec<PreparedFeature> = Vec::with_capacity(request.features.len());
    for (index, feature) in request.features.iter().enumerate() {
        match prepare_feature(index, feature, &reprojector, request, force_3d) {
            Ok((feature, cleaned, repaired)) => {
                if cleaned {
                    debug_info.cleaned_count += 1;
                }
                if let Some(method) = repaired {
                    debug_info.repaired_count += 1;
                    debug_info.repair_summary.push(RepairNote {
                        index,
                        method: method.as_str(),
                    });
                }
                prepared.push(feature);
            }
            Err(error) => {
                warn!(index, error = error.as_str(), "Skipping feature");
                debug_info.skipped_count += 1;
                debug_info.skipped_features.push(FailedFeature {
                    index,
                    error,
                    sql_state: None,
                });
            }
        }
    }

    let client = pool.get().await?;

    // Collection et couche: fatales si l'insertion échoue
    let collection_id: i64 = client
        .query_one(
            &format!(
                "INSERT INTO {}.feature_collections (project_file_id, name, source_srid)
                 VALUES ($1, $2, $3) RETURNING id",
                schema
            ),
            &[
                &request.project_file_id,
                &request.collection_name,
                &(request.source_srid as i32),
            ],
        )
        .await
        .context("Failed to create feature collection")?
        .get(0);

    let layer_id: i64 = client
        .query_one(
            &format!(
                "INSERT INTO {}.layers (collection_id, name) VALUES ($1, $2) RETURNING id",
                schema
            ),
            &[&collection_id, &request.collection_name],
        )
        .await
        .context("Failed to create layer")?
        .get(0);

    // Insertion par lots: le découpage borne la taille des statements,
    // pas l'ordre ni la durabilité
    let batch_size = request.batch_size.max(1);
    let mut imported = 0usize;

    let single_sql = insert_sql(schema, 1);
    let single_stmt = client
        .prepare(&single_sql)
        .await
        .context("Failed to prepare insert statement")?;

    for batch in prepared.chunks(batch_size) {
        match insert_batch(&client, schema, collection_id, layer_id, batch).await {
            Ok(()) => imported += batch.len(),
            Err(batch_error) => {
                // Erreur de connexion: fatale pour l'import entier
                if batch_error.is_closed() {
                    return Err(anyhow::Error::new(batch_error)
                        .context("Connection lost during import"));
                }

                // Chemin lent: insertion feature par feature pour isoler
                // la ou les features fautives du lot
                debug!(
                    error = %batch_error,
                    batch = batch.len(),
                    "Batch insert failed, retrying per feature"
                );
                for feature in batch {
                    let params: [&(dyn ToSql + Sync); 6] = [
                        &collection_id,
                        &layer_id,
                        &feature.source_layer,
                        &feature.original_ewkt,
                        &feature.transformed_ewkt,
                        &feature.properties,
                    ];
                    match client.execute(&single_stmt, &params).await {
                        Ok(_) => imported += 1,
                        Err(e) if e.is_closed() => {
                            return Err(anyhow::Error::new(e)
                                .context("Connection lost during import"));
                        }
                        Err(e) => {
                            let sql_state =
                                e.code().map(|state| state.code().to_string());
                            warn!(
                                index = feature.index,
                                sql_state = sql_state.as_deref().unwrap_or("-"),
                                "Failed to insert feature: {e}"
                            );
                            debug_info.skipped_features.push(FailedFeature {
                                index: feature.index,
                                error: e.to_string(),
                                sql_state,
                            });
                        }
                    }
                }
            }
        }
    }

    let failed_count = request.features.len() - imported;

    info!(
        collection_id,
        layer_id,
        imported,
        failed = failed_count,
        repaired = debug_info.repaired_count,
        cleaned = debug_info.cleaned_count,
        "Import complete"
    );

    Ok(ImportOutcome {
        collection_id,
        layer_id,
        imported_count: imported,
        failed_count,
        debug_info,
    })
}

/// SQL d'insertion pour `rows` lignes; ST_MakeValid couvre les défauts
/// résiduels que la réparation locale n'attrape pas
fn insert_sql(schema: &str, rows: usize) -> String {
    let mut sql = format!(
        "INSERT INTO {}.geo_features \
         (collection_id, layer_id, source_layer, geometry_original, geometry_wgs84, \
          properties, height_status) VALUES ",
        schema
    );
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        let base = row * 6;
        sql.push_str(&format!(
            "(${}, ${}, ${}, ST_MakeValid(ST_GeomFromEWKT(${})), \
             ST_MakeValid(ST_GeomFromEWKT(${})), ${}, 'pending')",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5,
            base + 6
        ));
    }
    sql
}

async fn insert_batch(
    client: &deadpool_postgres::Object,
    schema: &str,
    collection_id: i64,
    layer_id: i64,
    batch: &[PreparedFeature],
) -> Result<(), tokio_postgres::Error> {
    let sql = insert_sql(schema, batch.len());
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(batch.len() * 6);
    for feature in batch {
        params.push(&collection_id);
        params.push(&layer_id);
        params.push(&feature.source_layer);
        params.push(&feature.original_ewkt);
        params.push(&feature.transformed_ewkt);
        params.push(&feature.properties);
    }
    client.execute(&sql, &params).await.map(|_| ())
}

/// Prépare une feature: géométrie, Z, nettoyage/réparation, reprojection,
/// encodage EWKT
fn prepare_feature(
    index: usize,
    feature: &geojson::Feature,
    reprojector: &Reprojector,
    request: &ImportRequest,
    force_3d: bool,
) -> Result<(PreparedFeature, bool, Option<RepairMethod>), String> {
    let geojson_geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| "feature has no geometry".to_string())?;

    let geometry = Geometry::try_from(&geojson_geometry.value)
        .map_err(|e| format!("unsupported geometry: {e}"))?;

    let z_values = match extract_z_values(&geojson_geometry.value) {
        Some(zs) => ZValues::PerVertex(zs),
        None => ZValues::None,
    };

    let before_count = coord_count(&geometry);
    let prepared = prepare_geometry(&geometry).map_err(|e| e.to_string())?;
    let after_count = coord_count(&prepared.geometry);

    // Géométrie remaniée: l'alignement Z par sommet n'a plus de sens
    let z_values = match z_values {
        ZValues::PerVertex(zs) if before_count != after_count => match zs.first() {
            Some(&z) => ZValues::Uniform(z),
            None => ZValues::None,
        },
        other => other,
    };

    let transformed = reprojector
        .transform_geometry(&prepared.geometry)
        .map_err(|e| format!("reprojection failed: {e}"))?;

    let original_ewkt =
        geometry_to_ewkt(&prepared.geometry, &z_values, request.source_srid, force_3d)?;
    let transformed_ewkt =
        geometry_to_ewkt(&transformed, &z_values, request.target_srid, force_3d)?;

    let source_layer = feature
        .properties
        .as_ref()
        .and_then(|props| props.get("layer"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let properties = feature
        .properties
        .clone()
        .map(Value::Object)
        .unwrap_or(Value::Null);

    Ok((
        PreparedFeature {
            index,
            source_layer,
            original_ewkt,
            transformed_ewkt,
            properties,
        },
        prepared.cleaned,
        prepared.repaired,
    ))
}

/// Vrai si la géométrie GeoJSON porte au moins une position 3D
fn has_z(geometry: &geojson::Geometry) -> bool {
    extract_z_values(&geometry.value).is_some()
}

fn coord_count(geometry: &Geometry) -> usize {
    fn ring_count(ls: &geo::LineString) -> usize {
        ls.0.len()
    }

    match geometry {
        Geometry::Point(_) => 1,
        Geometry::Line(_) => 2,
        Geometry::LineString(ls) => ring_count(ls),
        Geometry::Polygon(poly) => {
            ring_count(poly.exterior())
                + poly.interiors().iter().map(ring_count).sum::<usize>()
        }
        Geometry::MultiPoint(mp) => mp.0.len(),
        Geometry::MultiLineString(mls) => mls.0.iter().map(ring_count).sum(),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .map(|poly| {
                ring_count(poly.exterior())
                    + poly.interiors().iter().map(ring_count).sum::<usize>()
            })
            .sum(),
        Geometry::GeometryCollection(gc) => gc.0.iter().map(coord_count).sum(),
        Geometry::Rect(_) => 2,
        Geometry::Triangle(_) => 3,
    }
}

/// Encode une géométrie en EWKT, en réinjectant les Z quand la sortie est
/// en 3D
fn geometry_to_ewkt(
    geometry: &Geometry,
    z_values: &ZValues,
    srid: u32,
    force_3d: bool,
) -> Result<String, String> {
    struct Writer<'a> {
        out: String,
        z_values: &'a ZValues,
        next_z: usize,
        force_3d: bool,
    }

    impl Writer<'_> {
        fn coord(&mut self, x: f64, y: f64) {
            if self.force_3d {
                let z = match self.z_values {
                    ZValues::None => 0.0,
                    ZValues::Uniform(z) => *z,
                    ZValues::PerVertex(zs) => zs.get(self.next_z).copied().unwrap_or(0.0),
                };
                self.next_z += 1;
                self.out.push_str(&format!("{x} {y} {z}"));
            } else {
                self.out.push_str(&format!("{x} {y}"));
            }
        }

        fn ring(&mut self, ls: &geo::LineString) {
            self.out.push('(');
            for (i, c) in ls.0.iter().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                self.coord(c.x, c.y);
            }
            self.out.push(')');
        }
    }

    let dims = if force_3d { " Z " } else { " " };
    let mut writer = Writer {
        out: format!("SRID={srid};"),
        z_values,
        next_z: 0,
        force_3d,
    };

    match geometry {
        Geometry::Point(p) => {
            writer.out.push_str(&format!("POINT{dims}("));
            writer.coord(p.x(), p.y());
            writer.out.push(')');
        }
        Geometry::LineString(ls) => {
            writer.out.push_str(&format!("LINESTRING{dims}"));
            writer.ring(ls);
        }
        Geometry::Polygon(poly) => {
            writer.out.push_str(&format!("POLYGON{dims}("));
            writer.ring(poly.exterior());
            for interior in poly.interiors() {
                writer.out.push(',');
                writer.ring(interior);
            }
            writer.out.push(')');
        }
        Geometry::MultiPoint(mp) => {
            writer.out.push_str(&format!("MULTIPOINT{dims}("));
            for (i, p) in mp.0.iter().enumerate() {
                if i > 0 {
                    writer.out.push(',');
                }
                writer.out.push('(');
                writer.coord(p.x(), p.y());
                writer.out.push(')');
            }
            writer.out.push(')');
        }
        Geometry::MultiLineString(mls) => {
            writer.out.push_str(&format!("MULTILINESTRING{dims}("));
            for (i, ls) in mls.0.iter().enumerate() {
                if i > 0 {
                    writer.out.push(',');
                }
                writer.ring(ls);
            }
            writer.out.push(')');
        }
        Geometry::MultiPolygon(mp) => {
            writer.out.push_str(&format!("MULTIPOLYGON{dims}("));
            for (i, poly) in mp.0.iter().enumerate() {
                if i > 0 {
                    writer.out.push(',');
                }
                writer.out.push('(');
                writer.ring(poly.exterior());
                for interior in poly.interiors() {
                    writer.out.push(',');
                    writer.ring(interior);
                }
                writer.out.push(')');
            }
            writer.out.push(')');
        }
        Geometry::Line(_)
        | Geometry::GeometryCollection(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => {
            return Err("geometry type is not supported by the importer".to_string());
        }
    }

    Ok(writer.out)
}
