//! Modification-induced sequence permutations (MISPs)
//!
//! A peptide identified with `k` deamidations could have been any sequence
//! where up to `k` of its N/Q residues were originally D/E, and any D/E that
//! we did *not* introduce ourselves may equally have been an N/Q to begin with.
//! Generation happens in three passes:
//!
//! 1. [`deamidate`]: substitute N->D and Q->E at every subset of sites whose
//!    size fits in the deamidation budget
//! 2. [`reamidate`]: revert D->N and E->Q at every subset of the remaining
//!    D/E sites, never touching a site substituted in pass 1
//! 3. [`add_pyro_glu`]: swap the N-terminal Q/E when a pyro-Glu conversion
//!    was reported for that residue

use fnv::FnvHashSet;

use crate::modification::Modifications;

/// A pass-1 variant, along with the sites that were substituted to produce it.
/// These sites are frozen for the reamidation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Substituted {
    pub sequence: String,
    pub positions: Vec<usize>,
}

fn deamidated(residue: char) -> char {
    match residue {
        'N' => 'D',
        'Q' => 'E',
        r => r,
    }
}

fn reamidated(residue: char) -> char {
    match residue {
        'D' => 'N',
        'E' => 'Q',
        r => r,
    }
}

/// Indices of residues in `targets`, skipping the N-terminal residue if the
/// annotation says it has cyclized
fn sites(residues: &[char], targets: &[char], skip_nterm: bool) -> Vec<usize> {
    residues
        .iter()
        .enumerate()
        .skip(skip_nterm as usize)
        .filter(|(_, r)| targets.contains(*r))
        .map(|(idx, _)| idx)
        .collect()
}

/// Enumerate every way of deamidating at most `budget` of the N/Q residues in
/// `peptide`. The unmodified peptide is always yielded first.
///
/// Choosing `i` of `n` N-sites and `j` of `q` Q-sites with `i + j <= budget`
/// is the same as choosing at most `budget` sites from the combined list, so
/// a single fold over all sites covers it.
pub fn deamidate(peptide: &str, budget: usize, mods: &Modifications) -> Vec<Substituted> {
    let residues = peptide.chars().collect::<Vec<_>>();
    let sites = sites(&residues, &['N', 'Q'], mods.excludes_nterm(peptide));

    let chosen = sites.iter().fold(vec![Vec::new()], |acc, &site| {
        acc.into_iter()
            .flat_map(|positions: Vec<usize>| {
                let mut next = Vec::with_capacity(2);
                if positions.len() < budget {
                    let mut with_site = positions.clone();
                    with_site.push(site);
                    next.push(positions);
                    next.push(with_site);
                } else {
                    next.push(positions);
                }
                next
            })
            .collect::<Vec<_>>()
    });

    let variants = chosen
        .into_iter()
        .map(|positions| {
            let mut sequence = residues.clone();
            for &idx in &positions {
                sequence[idx] = deamidated(sequence[idx]);
            }
            Substituted {
                sequence: sequence.into_iter().collect(),
                positions,
            }
        })
        .collect::<Vec<_>>();

    log::trace!(
        "{}: {} deamidation permutations (budget {})",
        peptide,
        variants.len(),
        budget
    );
    variants
}

/// Enumerate every way of reverting the D/E residues of a pass-1 variant
/// that are not part of its frozen substitution set. This is an uncapped
/// powerset: `2^(d + e)` sequences, starting with `variant` itself.
pub fn reamidate(variant: &Substituted, mods: &Modifications) -> Vec<String> {
    let residues = variant.sequence.chars().collect::<Vec<_>>();
    let eligible = sites(
        &residues,
        &['D', 'E'],
        mods.excludes_nterm(&variant.sequence),
    )
    .into_iter()
    .filter(|idx| !variant.positions.contains(idx))
    .collect::<Vec<_>>();

    eligible
        .iter()
        .fold(vec![residues], |acc, &site| {
            acc.into_iter()
                .flat_map(|sequence| {
                    let mut reverted = sequence.clone();
                    reverted[site] = reamidated(reverted[site]);
                    [sequence, reverted]
                })
                .collect()
        })
        .into_iter()
        .map(|sequence| sequence.into_iter().collect())
        .collect()
}

/// If `peptide` starts with Q (E) and a `Gln->pyro-Glu` (`Glu->pyro-Glu`)
/// conversion was reported, add a copy of every variant with the leading
/// residue swapped to E (Q). The result is duplicate-free; the relative order
/// of first occurrences is kept, but callers must not rely on it.
pub fn add_pyro_glu(peptide: &str, variants: Vec<String>, mods: &Modifications) -> Vec<String> {
    let swap = match peptide.chars().next() {
        Some('Q') if mods.gln_pyro_glu => Some(('Q', 'E')),
        Some('E') if mods.glu_pyro_glu => Some(('E', 'Q')),
        _ => None,
    };

    let converted = match swap {
        Some((from, to)) => variants
            .iter()
            .filter_map(|v| v.strip_prefix(from).map(|rest| format!("{}{}", to, rest)))
            .collect(),
        None => Vec::new(),
    };

    let mut seen = FnvHashSet::default();
    variants
        .into_iter()
        .chain(converted)
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Generate the complete, duplicate-free set of MISPs for a peptide
pub fn generate(peptide: &str, mods: &Modifications) -> Vec<String> {
    if peptide.is_empty() {
        return Vec::new();
    }
    let reamidated = deamidate(peptide, mods.deamidations, mods)
        .iter()
        .flat_map(|variant| reamidate(variant, mods))
        .collect::<Vec<_>>();
    let variants = add_pyro_glu(peptide, reamidated, mods);
    log::debug!("{}: {} unique permutations", peptide, variants.len());
    variants
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    fn binomial(n: usize, k: usize) -> usize {
        if k > n {
            return 0;
        }
        (0..k).fold(1, |acc, i| acc * (n - i) / (i + 1))
    }

    fn expected_deamidations(n: usize, q: usize, m: usize) -> usize {
        (0..=m.min(n))
            .map(|i| {
                (0..=(m - i).min(q))
                    .map(|j| binomial(n, i) * binomial(q, j))
                    .sum::<usize>()
            })
            .sum()
    }

    fn set(v: Vec<String>) -> HashSet<String> {
        v.into_iter().collect()
    }

    #[test]
    fn deamidation_counts() {
        let mods = Modifications::default();
        for (peptide, n, q) in [("NNQQQK", 2, 3), ("NGQK", 1, 1), ("AQNNKQNQR", 3, 3)] {
            for budget in 0..=6 {
                let variants = deamidate(peptide, budget, &mods);
                assert_eq!(
                    variants.len(),
                    expected_deamidations(n, q, budget),
                    "{} with budget {}",
                    peptide,
                    budget
                );
                let unique = variants.iter().map(|v| &v.sequence).collect::<HashSet<_>>();
                assert_eq!(unique.len(), variants.len());
            }
        }
    }

    #[test]
    fn saturated_budget() {
        let mods = Modifications::parse(Some("99999999999999999999999 Deamidated (NQ)"));
        assert_eq!(deamidate("NQK", mods.deamidations, &mods).len(), 4);
    }

    #[test]
    fn deamidation_scenario() {
        let mods = Modifications::parse(Some("2 Deamidated (NQ)"));
        let variants = deamidate("NGQK", mods.deamidations, &mods);
        assert_eq!(variants[0].sequence, "NGQK");
        assert!(variants[0].positions.is_empty());

        let sequences = variants
            .iter()
            .map(|v| v.sequence.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(sequences, HashSet::from(["NGQK", "DGQK", "NGEK", "DGEK"]));

        let dgek = variants.iter().find(|v| v.sequence == "DGEK").unwrap();
        assert_eq!(dgek.positions, vec![0, 2]);
    }

    #[test]
    fn no_deamidation_sites() {
        let mods = Modifications::parse(Some("3 Deamidated (NQ)"));
        assert_eq!(
            deamidate("AGTK", mods.deamidations, &mods),
            vec![Substituted {
                sequence: "AGTK".into(),
                positions: vec![],
            }]
        );
    }

    #[test]
    fn pyro_excludes_nterm() {
        let mods = Modifications::parse(Some("Gln->pyro-Glu; Deamidated (NQ)"));
        let variants = deamidate("QNQK", mods.deamidations, &mods);
        let sequences = variants
            .iter()
            .map(|v| v.sequence.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sequences, vec!["QNQK", "QNEK", "QDQK"]);

        // Without any pyro annotation the N-terminal Q is a candidate
        let mods = Modifications::parse(Some("Deamidated (NQ)"));
        assert_eq!(deamidate("QNQK", 1, &mods).len(), 4);
    }

    #[test]
    fn reamidation_powerset() {
        let mods = Modifications::default();
        let variant = Substituted {
            sequence: "DEEK".into(),
            positions: vec![2],
        };
        let reverted = reamidate(&variant, &mods);
        assert_eq!(reverted.len(), 4);
        assert_eq!(reverted[0], "DEEK");
        assert_eq!(
            set(reverted.clone()),
            set(vec![
                "DEEK".into(),
                "NEEK".into(),
                "DQEK".into(),
                "NQEK".into()
            ])
        );
        // The frozen site is never reverted
        assert!(reverted.iter().all(|s| s.chars().nth(2) == Some('E')));
    }

    #[test]
    fn reamidation_count() {
        let mods = Modifications::default();
        let variant = Substituted {
            sequence: "DDEAEDK".into(),
            positions: vec![1, 4],
        };
        assert_eq!(reamidate(&variant, &mods).len(), 1 << 3);

        let variant = Substituted {
            sequence: "AGK".into(),
            positions: vec![],
        };
        assert_eq!(reamidate(&variant, &mods), vec!["AGK".to_string()]);
    }

    #[test]
    fn reamidation_respects_pyro() {
        let mods = Modifications::parse(Some("Glu->pyro-Glu"));
        let variant = Substituted {
            sequence: "EDK".into(),
            positions: vec![],
        };
        assert_eq!(
            set(reamidate(&variant, &mods)),
            set(vec!["EDK".into(), "ENK".into()])
        );
    }

    #[test]
    fn pyro_glu_scenario() {
        let mods = Modifications::parse(Some("Gln->pyro-Glu"));
        assert_eq!(mods.deamidations, 0);
        assert_eq!(
            set(generate("QGTK", &mods)),
            set(vec!["QGTK".into(), "EGTK".into()])
        );

        let mods = Modifications::parse(Some("Glu->pyro-Glu (N-term E)"));
        assert_eq!(
            set(generate("EGTK", &mods)),
            set(vec!["EGTK".into(), "QGTK".into()])
        );
    }

    #[test]
    fn pyro_glu_requires_matching_residue() {
        let variants = vec!["QGDK".to_string(), "QGNK".to_string()];
        let mods = Modifications::parse(Some("Glu->pyro-Glu"));
        assert_eq!(add_pyro_glu("QGDK", variants.clone(), &mods), variants);

        let mods = Modifications::parse(Some("Gln->pyro-Glu"));
        let out = add_pyro_glu("QGDK", variants.clone(), &mods);
        assert_eq!(out.len(), 2 * variants.len());
        assert!(variants.iter().all(|v| out.contains(v)));
    }

    #[test]
    fn pyro_glu_deduplicates() {
        let mods = Modifications::parse(Some("Gln->pyro-Glu"));
        let variants = vec!["QGK".to_string(), "EGK".to_string(), "QGK".to_string()];
        assert_eq!(
            add_pyro_glu("QGK", variants, &mods),
            vec!["QGK".to_string(), "EGK".to_string()]
        );
    }

    #[test]
    fn unmodified_peptide() {
        let mods = Modifications::parse(None);
        assert_eq!(generate("AGTK", &mods), vec!["AGTK".to_string()]);
        assert!(generate("", &mods).is_empty());
    }

    #[test]
    fn generation_is_idempotent() {
        let mods = Modifications::parse(Some("2 Deamidated (NQ); Gln->pyro-Glu"));
        let a = generate("QNDQEK", &mods);
        let b = generate("QNDQEK", &mods);
        assert_eq!(set(a.clone()), set(b));
        assert_eq!(set(a.clone()).len(), a.len());
    }

    #[test]
    fn full_generation() {
        // Budget 1 over sites {N1}; D2 and E3 are pre-existing
        let mods = Modifications::parse(Some("Deamidated (NQ)"));
        let variants = generate("ANDEK", &mods);
        let expected = [
            "ANDEK", "ANNEK", "ANDQK", "ANNQK", // N left alone
            "ADDEK", "ADNEK", "ADDQK", "ADNQK", // N1 deamidated
        ];
        assert_eq!(set(variants), expected.iter().map(|s| s.to_string()).collect());
    }
}
