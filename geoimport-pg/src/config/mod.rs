//! Configuration de l'import

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration principale de l'import
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Schéma PostgreSQL cible
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Taille des lots d'insertion (borne la taille des statements, pas
    /// une garantie de durabilité ni d'ordre)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// SRID cible de la géométrie projetée (4326 pour l'affichage carte)
    #[serde(default = "default_target_srid")]
    pub target_srid: u32,

    /// Sauter les fichiers dont le checksum n'a pas changé
    #[serde(default = "default_true")]
    pub skip_unchanged: bool,
}

fn default_schema() -> String {
    "geodata".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_target_srid() -> u32 {
    4326
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            batch_size: default_batch_size(),
            target_srid: default_target_srid(),
            skip_unchanged: true,
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge le preset embarqué par défaut
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => serde_json::from_str(include_str!("presets/default.json"))
                .context("Failed to parse embedded config"),
            _ => anyhow::bail!("Unknown preset: {}. Use: default", preset),
        }
    }

    /// Résout un spec CLI: nom de preset ou chemin de fichier
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "default" => Self::from_preset(spec),
            _ => Self::load(Path::new(spec)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_parses() {
        let config = Config::from_preset("default").unwrap();
        assert_eq!(config.schema, "geodata");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.target_srid, 4326);
        assert!(config.skip_unchanged);
    }

    #[test]
    fn test_unknown_preset_fails() {
        assert!(Config::from_preset("fancy").is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"batch_size": 50}"#).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.schema, "geodata");
    }
}
