//! # geoimport-pg
//!
//! Import de géodonnées vectorielles (DXF, GeoJSON) vers PostGIS, avec
//! nettoyage/réparation des géométries, reprojection et isolation des
//! erreurs par feature.
//!
//! ## Features
//!
//! - Import dans PostgreSQL/PostGIS avec pool de connexions
//! - Réparation des géométries invalides (fermeture d'anneaux, convex
//!   hull en dernier recours, ST_MakeValid côté SQL)
//! - Reprojection source → cible via PROJ (feature `reproject`)
//! - Preview GeoJSON catégorisée (type de géométrie × couche) sans base
//! - Skip incrémental des fichiers inchangés (checksum blake3)
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import DXF vers PostGIS
//! geoimport-pg import --path ./plan.dxf --collection chantier --project-file-id f123
//!
//! # Preview GeoJSON (sans base de données)
//! geoimport-pg preview --path ./plan.dxf --output ./preview/
//! ```

pub mod cli;
pub mod config;
pub mod export;
pub mod formats;
pub mod import;
pub mod report;

pub use config::Config;
pub use import::pool::{create_pool, DatabaseConfig};
pub use report::{ImportReport, ImportStatus};
