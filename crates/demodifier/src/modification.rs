use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Matches `Deamidated (NQ)`, `2 Deamidated (NQ)`, `Deamidation(NQ)`, ...
static DEAMIDATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:(\d+)\s*)?(?:Deamidated|Deamidation)\s*\(NQ\)")
        .expect("deamidation pattern is valid")
});

const GLN_PYRO_GLU: &str = "Gln->pyro-Glu";
const GLU_PYRO_GLU: &str = "Glu->pyro-Glu";

/// Everything the MISP generator needs to know about a free-text
/// modification annotation (e.g. a Mascot `pep_var_mod` cell)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Modifications {
    /// Total number of deamidation events listed
    pub deamidations: usize,
    /// Any mention of "pyro", regardless of case or residue
    pub pyro: bool,
    /// Exact `Gln->pyro-Glu` tag
    pub gln_pyro_glu: bool,
    /// Exact `Glu->pyro-Glu` tag
    pub glu_pyro_glu: bool,
}

impl Modifications {
    /// Absent or unparseable annotations degrade to "no modifications"
    pub fn parse(annotation: Option<&str>) -> Self {
        let annotation = match annotation {
            Some(s) if !s.is_empty() => s,
            _ => return Self::default(),
        };
        Modifications {
            deamidations: count_deamidation_events(Some(annotation)),
            pyro: annotation.to_lowercase().contains("pyro"),
            gln_pyro_glu: annotation.contains(GLN_PYRO_GLU),
            glu_pyro_glu: annotation.contains(GLU_PYRO_GLU),
        }
    }

    /// Should the leading residue of `peptide` be treated as already cyclized,
    /// and therefore skipped when looking for deamidation/reamidation sites?
    pub fn excludes_nterm(&self, peptide: &str) -> bool {
        self.pyro && matches!(peptide.chars().next(), Some('Q' | 'E'))
    }
}

/// Sum all deamidation events in an annotation. A match without an explicit
/// count contributes 1; counts too large for `usize` saturate.
pub fn count_deamidation_events(annotation: Option<&str>) -> usize {
    let annotation = match annotation {
        Some(s) => s,
        None => return 0,
    };
    DEAMIDATION
        .captures_iter(annotation)
        .map(|cap| {
            cap.get(1)
                .map(|n| n.as_str().parse::<usize>().unwrap_or(usize::MAX))
                .unwrap_or(1)
        })
        .fold(0usize, usize::saturating_add)
}

/// Number of N/Q residues that could carry a deamidation. An N-terminal Q/E
/// is skipped when the annotation mentions a pyro-Glu conversion.
pub fn count_deamidatable_residues(peptide: &str, annotation: Option<&str>) -> usize {
    let skip = Modifications::parse(annotation).excludes_nterm(peptide) as usize;
    peptide
        .chars()
        .skip(skip)
        .filter(|&c| c == 'N' || c == 'Q')
        .count()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PositionCheck {
    Required,
    NotRequired,
}

impl Display for PositionCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionCheck::Required => f.write_str("required"),
            PositionCheck::NotRequired => f.write_str("not required"),
        }
    }
}

impl Serialize for PositionCheck {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Does the exact deamidation site need to be pinned down?
///
/// Only when the variants disagree on their LCA *and* not every N/Q could
/// have been deamidated - otherwise every possible placement is equivalent.
pub fn requires_position_check(
    annotation: Option<&str>,
    peptide: &str,
    identical_lcas: crate::IdenticalLcas,
) -> PositionCheck {
    if peptide.is_empty() || identical_lcas != crate::IdenticalLcas::No {
        return PositionCheck::NotRequired;
    }
    let events = count_deamidation_events(annotation);
    if events == 0 {
        return PositionCheck::NotRequired;
    }
    match events < count_deamidatable_residues(peptide, annotation) {
        true => PositionCheck::Required,
        false => PositionCheck::NotRequired,
    }
}
