//! Définition et implémentation des commandes CLI
//!
//! - `import`: fichiers géodonnées → PostGIS (réparation + reprojection)
//! - `preview`: fichier → GeoJSON catégorisé + résumé, sans base

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Subcommand;
use futures::stream;
use futures::StreamExt;
use rayon::prelude::*;
use serde_json::json;
use tracing::{info, warn};

use dxfgeo::{CrsConfidence, CrsDetection, ParseOptions, PreviewProjector, Visibility};

use crate::config::Config;
use crate::formats::{self, to_geojson_feature, LoadedFile};
use crate::import::postgres::{self, ImportRequest};
use crate::report::ImportReport;

#[derive(Subcommand)]
pub enum Commands {
    /// Import geodata files (DXF, GeoJSON) into PostGIS
    Import {
        /// Path to a geodata file or a directory
        #[arg(short, long)]
        path: PathBuf,

        /// Identifier of the uploaded project file
        #[arg(long)]
        project_file_id: String,

        /// Target collection name (default: file stem)
        #[arg(short, long)]
        collection: Option<String>,

        /// Source EPSG override (skips detection, exact confidence)
        #[arg(long)]
        source_srid: Option<u32>,

        /// Target EPSG for the projected geometry (default from config: 4326)
        #[arg(long)]
        target_srid: Option<u32>,

        /// Insert batch size (default from config: 100)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Target PostgreSQL schema (default from config: geodata)
        #[arg(long)]
        schema: Option<String>,

        /// Config preset name (default) or path to a JSON config
        #[arg(long, default_value = "default")]
        config: String,

        /// Write the JSON report to this path
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Maximum number of files processed concurrently
        #[arg(long, alias = "threads")]
        jobs: Option<usize>,

        /// PostgreSQL host (défaut : env PGHOST / localhost)
        #[arg(long)]
        host: Option<String>,

        /// PostgreSQL database name (défaut : env PGDATABASE / geodata)
        #[arg(long)]
        database: Option<String>,

        /// PostgreSQL user (défaut : env PGUSER / postgres)
        #[arg(long)]
        user: Option<String>,

        /// PostgreSQL password (défaut : env PGPASSWORD)
        #[arg(long)]
        password: Option<String>,

        /// PostgreSQL port (défaut : env PGPORT / 5432)
        #[arg(long)]
        port: Option<u16>,

        /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
        #[arg(long)]
        ssl: Option<String>,
    },

    /// Preview a geodata file as categorized GeoJSON (no database required)
    Preview {
        /// Path to a geodata file or a directory
        #[arg(short, long)]
        path: PathBuf,

        /// Output directory for GeoJSON files
        #[arg(short, long)]
        output: PathBuf,

        /// Visible layers, comma separated (empty = all layers visible)
        #[arg(long)]
        layers: Option<String>,

        /// Source EPSG override
        #[arg(long)]
        source_srid: Option<u32>,
    },
}

/// Exécute la commande import
#[allow(clippy::too_many_arguments)]
pub async fn cmd_import(
    path: &Path,
    project_file_id: &str,
    collection: Option<String>,
    source_srid: Option<u32>,
    target_srid: Option<u32>,
    batch_size: Option<usize>,
    schema: Option<String>,
    config_spec: &str,
    report_json: Option<PathBuf>,
    jobs: Option<usize>,
    host: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    ssl: Option<String>,
) -> Result<()> {
    let mut config = Config::resolve(config_spec)?;
    if let Some(target_srid) = target_srid {
        config.target_srid = target_srid;
    }
    if let Some(batch_size) = batch_size {
        config.batch_size = batch_size;
    }
    if let Some(schema) = schema {
        config.schema = schema;
    }

    let files = collect_geodata_files(path)?;
    if files.is_empty() {
        anyhow::bail!(
            "No geodata files (.dxf, .geojson, .json) found in {}",
            path.display()
        );
    }

    let jobs = jobs.unwrap_or(4).max(1);

    info!(
        path = %path.display(),
        files = files.len(),
        schema = config.schema.as_str(),
        target_srid = config.target_srid,
        "Starting import"
    );

    let mut db_config = crate::import::pool::DatabaseConfig::from_env();
    db_config.apply_overrides(host, database, user, password, port, ssl);
    println!(
        "Database: {}@{}:{}/{} (SSL: {:?})",
        db_config.user, db_config.host, db_config.port, db_config.dbname, db_config.ssl_mode
    );

    let pool = crate::import::pool::create_pool(&db_config).await?;
    crate::import::pool::test_connection(&pool).await?;
    postgres::create_schema(&pool, &config.schema).await?;
    println!("Connected to PostgreSQL, schema ready");

    let started_at = std::time::Instant::now();
    let report_name = collection
        .clone()
        .unwrap_or_else(|| file_stem(path).to_string());
    let report = Arc::new(Mutex::new(ImportReport::new(&report_name)));

    let config = Arc::new(config);
    let pool = Arc::new(pool);
    let collection = Arc::new(collection);
    let project_file_id = Arc::new(project_file_id.to_string());

    stream::iter(files.into_iter())
        .for_each_concurrent(jobs, |file_path| {
            let config = Arc::clone(&config);
            let pool = Arc::clone(&pool);
            let collection = Arc::clone(&collection);
            let project_file_id = Arc::clone(&project_file_id);
            let report = Arc::clone(&report);

            async move {
                let file_name = file_path
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or("unknown")
                    .to_string();

                // Skip incrémental par checksum
                let checksum = match tokio::task::spawn_blocking({
                    let path = file_path.clone();
                    move || compute_file_checksum(&path)
                })
                .await
                {
                    Ok(Ok(checksum)) => checksum,
                    Ok(Err(e)) => {
                        warn!("Failed to compute checksum for {}: {e}", file_path.display());
                        String::new()
                    }
                    Err(e) => {
                        warn!("Checksum task failed for {}: {e}", file_path.display());
                        String::new()
                    }
                };

                if config.skip_unchanged && !checksum.is_empty() {
                    match postgres::is_file_already_imported(
                        &pool,
                        &config.schema,
                        &file_name,
                        &checksum,
                    )
                    .await
                    {
                        Ok(true) => {
                            info!(file = file_name.as_str(), "File unchanged, skipping");
                            report.lock().unwrap().record_file_skipped();
                            return;
                        }
                        Ok(false) => {}
                        Err(e) => warn!("Failed to check file status: {e}"),
                    }
                }

                // Parsing (CPU-bound) hors du runtime async
                let options = ParseOptions {
                    source_epsg: source_srid,
                };
                let loaded = match tokio::task::spawn_blocking({
                    let path = file_path.clone();
                    move || formats::load_path(&path, &options)
                })
                .await
                {
                    Ok(Ok(loaded)) => loaded,
                    Ok(Err(e)) => {
                        warn!("Failed to parse {}: {e:#}", file_path.display());
                        report
                            .lock()
                            .unwrap()
                            .record_file_failure(&file_name, &format!("{e:#}"));
                        return;
                    }
                    Err(e) => {
                        warn!("Parse task failed for {}: {e}", file_path.display());
                        report
                            .lock()
                            .unwrap()
                            .record_file_failure(&file_name, &e.to_string());
                        return;
                    }
                };

                // Système inconnu: saisie utilisateur requise, pas de
                // défaut silencieux
                let source_epsg = match &loaded.crs {
                    CrsDetection::Known(guess) => {
                        if guess.confidence == CrsConfidence::Heuristic {
                            warn!(
                                file = file_name.as_str(),
                                epsg = guess.epsg,
                                method = guess.method.as_str(),
                                "Coordinate system guessed heuristically; \
                                 pass --source-srid to confirm"
                            );
                        }
                        guess.epsg
                    }
                    CrsDetection::Unknown => {
                        report.lock().unwrap().record_file_failure(
                            &file_name,
                            "coordinate system unknown, re-run with --source-srid",
                        );
                        return;
                    }
                };

                let feature_layers: Vec<String> =
                    loaded.features.iter().map(|f| f.layer.clone()).collect();
                let features: Vec<geojson::Feature> =
                    loaded.features.iter().map(to_geojson_feature).collect();

                let request = ImportRequest {
                    project_file_id: (*project_file_id).clone(),
                    collection_name: collection
                        .as_deref()
                        .map(str::to_string)
                        .unwrap_or_else(|| file_stem(&file_path).to_string()),
                    features,
                    source_srid: source_epsg,
                    target_srid: config.target_srid,
                    batch_size: config.batch_size,
                };

                match postgres::import_features(&pool, &config.schema, &request).await {
                    Ok(outcome) => {
                        let mut report = report.lock().unwrap();
                        report.record_outcome(&file_name, &outcome);

                        // Ventilation par couche: total - échecs indexés
                        let failed_indices: BTreeSet<usize> = outcome
                            .debug_info
                            .skipped_features
                            .iter()
                            .map(|f| f.index)
                            .collect();
                        for (index, layer) in feature_layers.iter().enumerate() {
                            if failed_indices.contains(&index) {
                                report.record_layer(layer, 0, 1);
                            } else {
                                report.record_layer(layer, 1, 0);
                            }
                        }
                        drop(report);

                        if !checksum.is_empty() {
                            if let Err(e) = postgres::record_file_checksum(
                                &pool,
                                &config.schema,
                                &file_name,
                                &checksum,
                            )
                            .await
                            {
                                warn!("Failed to record file checksum: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Import failed for {}: {e:#}", file_path.display());
                        report
                            .lock()
                            .unwrap()
                            .record_file_failure(&file_name, &format!("{e:#}"));
                    }
                }
            }
        })
        .await;

    let mut report = Arc::try_unwrap(report)
        .map_err(|_| anyhow::anyhow!("Import tasks still hold the report"))?
        .into_inner()
        .unwrap();
    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = report_json {
        report.save_to_file(&path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

/// Exécute la commande preview
pub fn cmd_preview(
    path: &Path,
    output: &Path,
    layers: Option<String>,
    source_srid: Option<u32>,
) -> Result<()> {
    std::fs::create_dir_all(output)?;

    if path.is_dir() {
        let files = collect_geodata_files(path)?;
        if files.is_empty() {
            anyhow::bail!("No geodata files found in {}", path.display());
        }
        info!(files = files.len(), "Previewing directory");

        let failures: usize = files
            .par_iter()
            .map(|file| {
                let file_output = output.join(file_stem(file));
                match preview_single_file(file, &file_output, layers.as_deref(), source_srid) {
                    Ok(()) => 0,
                    Err(e) => {
                        warn!("Failed to preview {}: {e:#}", file.display());
                        1
                    }
                }
            })
            .sum();

        if failures > 0 {
            warn!("{failures} files failed");
        }
        Ok(())
    } else {
        preview_single_file(path, output, layers.as_deref(), source_srid)
    }
}

/// Preview d'un seul fichier: GeoJSON par catégorie + résumé JSON sur la
/// sortie standard
fn preview_single_file(
    path: &Path,
    output: &Path,
    layers: Option<&str>,
    source_srid: Option<u32>,
) -> Result<()> {
    std::fs::create_dir_all(output)?;

    let options = ParseOptions {
        source_epsg: source_srid,
    };
    let loaded = formats::load_path(path, &options)?;

    let visibility = visibility_from_arg(layers);
    let summary = write_preview(&loaded, &visibility, output)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// Construit la visibilité depuis l'argument CLI; liste vide = tout
/// visible
fn visibility_from_arg(layers: Option<&str>) -> Visibility {
    let set: BTreeSet<String> = layers
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Visibility::from_layer_set(set)
}

/// Écrit les fichiers GeoJSON catégorisés et retourne le résumé
fn write_preview(
    loaded: &LoadedFile,
    visibility: &Visibility,
    output: &Path,
) -> Result<serde_json::Value> {
    let mut projector = PreviewProjector::new(loaded.features.clone());
    let projection = projector.project(visibility);
    let features = projector.features();

    let mut categories = Vec::new();
    for (key, indices) in &projection.categories {
        let file_name = format!(
            "{}_{}.geojson",
            sanitize_file_name(&key.layer),
            key.kind.as_str()
        );
        let output_file = output.join(&file_name);

        let selected: Vec<&dxfgeo::Feature> =
            indices.iter().map(|&i| &features[i]).collect();
        crate::export::geojson::export_to_geojson(&selected, loaded.crs.epsg(), &output_file)?;

        categories.push(json!({
            "layer": key.layer,
            "kind": key.kind.as_str(),
            "count": indices.len(),
            "file": file_name,
        }));
    }

    let crs = match &loaded.crs {
        CrsDetection::Known(guess) => json!({
            "epsg": guess.epsg,
            "name": guess.name,
            "confidence": confidence_str(guess.confidence),
            "method": guess.method,
        }),
        CrsDetection::Unknown => serde_json::Value::Null,
    };

    Ok(json!({
        "layers": loaded.layers,
        "crs": crs,
        "bounds": [
            projection.bounds.min_x,
            projection.bounds.min_y,
            projection.bounds.max_x,
            projection.bounds.max_y,
        ],
        "visible": projection.visible,
        "hidden": projection.hidden,
        "stats": {
            "converted": loaded.stats.converted,
            "skipped": loaded.stats.skipped,
            "by_type": loaded.stats.by_type,
        },
        "categories": categories,
    }))
}

fn confidence_str(confidence: CrsConfidence) -> &'static str {
    match confidence {
        CrsConfidence::Exact => "exact",
        CrsConfidence::Header => "header",
        CrsConfidence::Heuristic => "heuristic",
    }
}

fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown")
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Collecte récursivement les fichiers de géodonnées
fn collect_geodata_files(path: &Path) -> Result<Vec<PathBuf>> {
    fn is_geodata(path: &Path) -> bool {
        crate::formats::detect_format(path).is_ok()
    }

    let mut files = Vec::new();

    if path.is_file() {
        if is_geodata(path) {
            files.push(path.to_path_buf());
        }
        return Ok(files);
    }

    for entry in std::fs::read_dir(path)
        .with_context(|| format!("Cannot read directory {}", path.display()))?
    {
        let entry = entry?;
        let entry_path = entry.path();

        if entry_path.is_dir() {
            files.extend(collect_geodata_files(&entry_path)?);
        } else if is_geodata(&entry_path) {
            files.push(entry_path);
        }
    }

    files.sort();
    Ok(files)
}

/// Calcule le checksum blake3 d'un fichier
fn compute_file_checksum(path: &Path) -> Result<String> {
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_from_arg_empty_is_all() {
        assert_eq!(visibility_from_arg(None), Visibility::AllVisible);
        assert_eq!(visibility_from_arg(Some("")), Visibility::AllVisible);
        assert_eq!(visibility_from_arg(Some(" , ")), Visibility::AllVisible);
    }

    #[test]
    fn test_visibility_from_arg_list() {
        let visibility = visibility_from_arg(Some("Site, Building"));
        assert!(visibility.is_visible("Site"));
        assert!(visibility.is_visible("Building"));
        assert!(!visibility.is_visible("Other"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Bâtiment 1/2"), "Bâtiment_1_2");
        assert_eq!(sanitize_file_name("Site-A_b"), "Site-A_b");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("/tmp/plan.dxf")), "plan");
    }
}
