//! Rapport d'import avec graceful degradation
//!
//! Agrège les compteurs et diagnostics par fichier et par couche; l'import
//! rend des comptes détaillés (importées / échouées / réparées /
//! nettoyées) plutôt qu'un verdict binaire.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::import::postgres::ImportOutcome;

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    /// Import réussi sans erreur
    Success,
    /// Import réussi avec des erreurs non-fatales
    PartialSuccess,
    /// Import échoué
    Failed,
}

/// Erreur d'import avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct ImportError {
    /// Fichier source (optionnel)
    pub file: Option<String>,
    /// Index de la feature dans son fichier (optionnel)
    pub feature_index: Option<usize>,
    /// Message d'erreur
    pub message: String,
    /// Code d'état SQL (optionnel)
    pub sql_state: Option<String>,
}

/// Statistiques par couche source
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayerStats {
    pub imported: usize,
    pub failed: usize,
}

/// Rapport complet d'import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Nom de la collection cible
    pub collection: String,
    /// Durée de l'import
    pub duration_secs: f64,
    /// Statut global
    pub status: ImportStatus,

    /// Nombre de fichiers traités
    pub files_processed: usize,
    /// Nombre de fichiers en erreur
    pub files_failed: usize,
    /// Fichiers sautés (checksum inchangé)
    pub files_skipped: usize,

    /// Features importées
    pub features_imported: usize,
    /// Features en échec
    pub features_failed: usize,
    /// Features réparées avant import
    pub features_repaired: usize,
    /// Features nettoyées (points répétés supprimés)
    pub features_cleaned: usize,

    /// Statistiques par couche source
    pub by_layer: BTreeMap<String, LayerStats>,

    /// Liste des erreurs
    pub errors: Vec<ImportError>,
}

impl ImportReport {
    /// Crée un rapport vide pour une collection
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            duration_secs: 0.0,
            status: ImportStatus::Success,
            files_processed: 0,
            files_failed: 0,
            files_skipped: 0,
            features_imported: 0,
            features_failed: 0,
            features_repaired: 0,
            features_cleaned: 0,
            by_layer: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Fusionne le résultat d'un fichier importé
    pub fn record_outcome(&mut self, file: &str, outcome: &ImportOutcome) {
        self.files_processed += 1;
        self.features_imported += outcome.imported_count;
        self.features_failed += outcome.failed_count;
        self.features_repaired += outcome.debug_info.repaired_count;
        self.features_cleaned += outcome.debug_info.cleaned_count;

        for failure in &outcome.debug_info.skipped_features {
            self.errors.push(ImportError {
                file: Some(file.to_string()),
                feature_index: Some(failure.index),
                message: failure.error.clone(),
                sql_state: failure.sql_state.clone(),
            });
        }
    }

    /// Comptabilise les features d'une couche
    pub fn record_layer(&mut self, layer: &str, imported: usize, failed: usize) {
        let stats = self.by_layer.entry(layer.to_string()).or_default();
        stats.imported += imported;
        stats.failed += failed;
    }

    /// Enregistre un fichier en échec complet
    pub fn record_file_failure(&mut self, file: &str, message: &str) {
        self.files_processed += 1;
        self.files_failed += 1;
        self.errors.push(ImportError {
            file: Some(file.to_string()),
            feature_index: None,
            message: message.to_string(),
            sql_state: None,
        });
    }

    /// Enregistre un fichier sauté (inchangé)
    pub fn record_file_skipped(&mut self) {
        self.files_processed += 1;
        self.files_skipped += 1;
    }

    /// Définit la durée de l'import
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final à partir des compteurs
    pub fn finalize(&mut self) {
        let has_errors = !self.errors.is_empty() || self.features_failed > 0;
        let has_success = self.features_imported > 0 || self.files_skipped > 0;

        self.status = if has_errors && has_success {
            ImportStatus::PartialSuccess
        } else if has_errors {
            ImportStatus::Failed
        } else {
            ImportStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("IMPORT REPORT - Collection {}", self.collection);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Files: {} processed, {} failed, {} skipped (unchanged)",
            self.files_processed, self.files_failed, self.files_skipped
        );
        println!(
            "Features: {} imported, {} failed, {} repaired, {} cleaned",
            self.features_imported,
            self.features_failed,
            self.features_repaired,
            self.features_cleaned
        );

        if !self.by_layer.is_empty() {
            println!("\n--- BY LAYER ---");
            for (layer, stats) in &self.by_layer {
                println!(
                    "  {}: {} imported, {} failed",
                    layer, stats.imported, stats.failed
                );
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for error in self.errors.iter().take(20) {
                let location = match (&error.file, error.feature_index) {
                    (Some(file), Some(index)) => format!("[{}#{}]", file, index),
                    (Some(file), None) => format!("[{}]", file),
                    (None, Some(index)) => format!("[#{}]", index),
                    _ => String::new(),
                };
                let state = error
                    .sql_state
                    .as_deref()
                    .map(|s| format!(" (SQLSTATE {})", s))
                    .unwrap_or_default();
                println!("  {} {}{}", location, error.message, state);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Résumé compact sur une ligne
    pub fn summary(&self) -> String {
        format!(
            "{}: {} imported, {} failed, {} repaired, {} errors",
            self.collection,
            self.features_imported,
            self.features_failed,
            self.features_repaired,
            self.errors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::postgres::DebugInfo;

    fn outcome(imported: usize, failed: usize) -> ImportOutcome {
        ImportOutcome {
            collection_id: 1,
            layer_id: 1,
            imported_count: imported,
            failed_count: failed,
            debug_info: DebugInfo::default(),
        }
    }

    #[test]
    fn test_new_report_is_success() {
        let mut report = ImportReport::new("chantier");
        report.finalize();
        assert_eq!(report.status, ImportStatus::Success);
    }

    #[test]
    fn test_record_outcome_accumulates() {
        let mut report = ImportReport::new("chantier");
        report.record_outcome("a.dxf", &outcome(10, 0));
        report.record_outcome("b.dxf", &outcome(5, 2));

        assert_eq!(report.files_processed, 2);
        assert_eq!(report.features_imported, 15);
        assert_eq!(report.features_failed, 2);
    }

    #[test]
    fn test_finalize_partial_success() {
        let mut report = ImportReport::new("chantier");
        report.record_outcome("a.dxf", &outcome(10, 1));
        report.finalize();
        assert_eq!(report.status, ImportStatus::PartialSuccess);
    }

    #[test]
    fn test_finalize_failed_when_nothing_imported() {
        let mut report = ImportReport::new("chantier");
        report.record_file_failure("a.dxf", "coordinate system unknown");
        report.finalize();
        assert_eq!(report.status, ImportStatus::Failed);
    }

    #[test]
    fn test_layer_stats() {
        let mut report = ImportReport::new("chantier");
        report.record_layer("Building", 4, 1);
        report.record_layer("Building", 2, 0);
        let stats = report.by_layer.get("Building").unwrap();
        assert_eq!(stats.imported, 6);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut report = ImportReport::new("chantier");
        report.record_outcome("a.dxf", &outcome(100, 3));
        let summary = report.summary();
        assert!(summary.contains("chantier"));
        assert!(summary.contains("100 imported"));
    }
}
