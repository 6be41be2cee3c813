//! Types d'erreurs pour le crate dxfgeo

use thiserror::Error;

/// Erreurs pouvant survenir lors du parsing DXF
#[derive(Debug, Error)]
pub enum DxfError {
    /// Erreur d'I/O lors de la lecture du fichier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Flux group-code malformé
    #[error("Parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Violation structurelle d'une section DXF
    #[error("Parse error in section {section} at line {line}: {reason}")]
    Section {
        section: String,
        line: usize,
        reason: String,
    },

    /// Encodage non supporté
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

impl DxfError {
    /// Crée une erreur de parsing avec le numéro de ligne fautif
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Crée une erreur de section avec contexte
    pub fn section(section: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::Section {
            section: section.into(),
            line,
            reason: reason.into(),
        }
    }
}
