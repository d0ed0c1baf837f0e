use std::collections::BTreeSet;
use std::fmt::Display;

use serde::Serialize;

use crate::lca::Lca;
use crate::modification::{requires_position_check, PositionCheck};

/// Do all permutations that resolved to a taxon agree on it?
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IdenticalLcas {
    Yes,
    No,
    /// Fewer than two permutations resolved to a taxon
    NA,
}

impl Display for IdenticalLcas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdenticalLcas::Yes => f.write_str("yes"),
            IdenticalLcas::No => f.write_str("no"),
            IdenticalLcas::NA => f.write_str("NA"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Number of unique permutations
    pub total: usize,
    /// Permutations that resolved to a taxon, in input order
    pub matched_variants: Vec<String>,
    /// Taxa of `matched_variants`, aligned with it
    pub matched_labels: Vec<String>,
    pub distinct_labels: BTreeSet<String>,
    #[serde(serialize_with = "serialize_display")]
    pub identical_lcas: IdenticalLcas,
    pub position_checking: PositionCheck,
}

fn serialize_display<S, T: Display>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(value)
}

/// Summarise the LCAs of all permutations of one peptide.
///
/// Both [`Lca::NoMatch`] and [`Lca::NoResponse`] are ignored: a failed
/// lookup carries no taxonomic signal.
pub fn classify(
    peptide: &str,
    annotation: Option<&str>,
    variants: &[(String, Lca)],
) -> Classification {
    let (matched_variants, matched_labels): (Vec<String>, Vec<String>) = variants
        .iter()
        .filter_map(|(variant, lca)| lca.taxon().map(|t| (variant.clone(), t.to_string())))
        .unzip();

    let distinct_labels = matched_labels.iter().cloned().collect::<BTreeSet<_>>();

    let identical_lcas = match (matched_labels.len(), distinct_labels.len()) {
        (0..=1, _) => IdenticalLcas::NA,
        (_, 1) => IdenticalLcas::Yes,
        _ => IdenticalLcas::No,
    };

    Classification {
        total: variants.len(),
        position_checking: requires_position_check(annotation, peptide, identical_lcas),
        matched_variants,
        matched_labels,
        distinct_labels,
        identical_lcas,
    }
}
