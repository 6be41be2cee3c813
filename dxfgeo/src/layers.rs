//! Filtrage des couches et visibilité
//!
//! Les sorties de parsers DXF véhiculent des clés de structure interne
//! (handles, noms de section) qui ne sont pas de vraies couches. Le filtre
//! doit être appliqué à chaque frontière où des noms de couche quittent le
//! parser: liste de couches du document, catégories de preview,
//! statistiques. Une application partielle laisse des couches fantômes.

use std::collections::BTreeSet;

use crate::types::{DxfDocument, Feature, DEFAULT_LAYER};

/// Clés internes à exclure de toute liste de couches utilisateur
const INTERNAL_LAYER_KEYS: &[&str] = &[
    "handle",
    "ownerHandle",
    "layers",
    "entities",
    "blocks",
    "header",
    "tables",
    "objects",
    "paperSpace",
];

/// Vrai si le nom est une clé de structure interne, pas une couche
pub fn is_internal_key(name: &str) -> bool {
    INTERNAL_LAYER_KEYS.contains(&name)
}

/// Filtre une liste brute de noms pour ne garder que les couches
/// utilisateur, dédupliquées et triées
pub fn filter_user_layers<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let set: BTreeSet<&str> = names
        .into_iter()
        .filter(|n| !n.is_empty() && !is_internal_key(n))
        .collect();
    set.into_iter().map(str::to_string).collect()
}

/// Couches utilisateur d'un document: table LAYER + couches référencées
/// par les entités, filtrées. La couche par défaut `"0"` est toujours
/// présente.
pub fn user_layers(document: &DxfDocument, features: &[Feature]) -> Vec<String> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    names.insert(DEFAULT_LAYER);

    for name in document.layers.keys() {
        names.insert(name);
    }
    for entity in &document.entities {
        names.insert(&entity.common().layer);
    }
    for feature in features {
        names.insert(&feature.layer);
    }

    filter_user_layers(names)
}

/// Visibilité des couches.
///
/// Le type encode explicitement la convention "ensemble vide = tout
/// visible": impossible de l'inverser par accident en consommant un
/// ensemble vide comme "rien de visible".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Toutes les couches visibles
    AllVisible,

    /// Seules les couches nommées sont visibles
    Only(BTreeSet<String>),
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::AllVisible
    }
}

impl Visibility {
    /// Construit depuis un ensemble de couches visibles; un ensemble vide
    /// signifie "tout visible", jamais "rien de visible"
    pub fn from_layer_set(set: BTreeSet<String>) -> Self {
        if set.is_empty() {
            Visibility::AllVisible
        } else {
            Visibility::Only(set)
        }
    }

    pub fn is_visible(&self, layer: &str) -> bool {
        match self {
            Visibility::AllVisible => true,
            Visibility::Only(set) => set.contains(layer),
        }
    }

    /// Nouvelle visibilité avec une couche masquée en plus.
    ///
    /// Produit une nouvelle valeur plutôt que de muter en place, pour que
    /// les projections déjà distribuées restent cohérentes.
    pub fn hiding(&self, layer: &str, all_layers: &[String]) -> Visibility {
        let mut visible: BTreeSet<String> = match self {
            Visibility::AllVisible => all_layers.iter().cloned().collect(),
            Visibility::Only(set) => set.clone(),
        };
        visible.remove(layer);
        // Masquer la dernière couche donne Only(vide): rien de visible
        Visibility::Only(visible)
    }

    /// Nouvelle visibilité avec une couche réaffichée; quand toutes les
    /// couches redeviennent visibles, on retombe sur `AllVisible`
    pub fn showing(&self, layer: &str, all_layers: &[String]) -> Visibility {
        match self {
            Visibility::AllVisible => Visibility::AllVisible,
            Visibility::Only(set) => {
                let mut visible = set.clone();
                visible.insert(layer.to_string());
                if all_layers.iter().all(|l| visible.contains(l)) {
                    Visibility::AllVisible
                } else {
                    Visibility::Only(visible)
                }
            }
        }
    }
}
