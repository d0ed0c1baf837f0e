use std::collections::HashMap;
use std::time::Duration;

use demodifier_core::lca::Pept2Lca;
use demodifier_core::misp::generate;
use demodifier_core::{
    classify, IdenticalLcas, Lca, LookupError, Modifications, Oracle, PositionCheck, Resolver,
    RetryPolicy,
};

/// Fixed peptide -> taxon table
struct Table(HashMap<&'static str, &'static str>);

impl Oracle for Table {
    fn pept2lca(&self, peptides: &[String]) -> Result<Vec<Pept2Lca>, LookupError> {
        Ok(peptides
            .iter()
            .filter_map(|p| {
                self.0.get(p.as_str()).map(|taxon| Pept2Lca {
                    peptide: p.clone(),
                    taxon_id: None,
                    taxon_name: Some(taxon.to_string()),
                    taxon_rank: None,
                })
            })
            .collect())
    }
}

struct Offline;

impl Oracle for Offline {
    fn pept2lca(&self, _: &[String]) -> Result<Vec<Pept2Lca>, LookupError> {
        Err(LookupError::Transport("connection refused".into()))
    }
}

fn no_wait() -> RetryPolicy {
    RetryPolicy {
        backoff_factor: Duration::ZERO,
        ..Default::default()
    }
}

#[test]
fn ambiguous_deamidation() {
    let annotation = Some("2 Deamidated (NQ)");
    let mods = Modifications::parse(annotation);
    let variants = generate("NGQKN", &mods);
    // 3 sites, at most 2 substituted: 1 + 3 + 3
    assert_eq!(variants.len(), 7);

    let table = Table(HashMap::from([
        ("NGQKN", "Homo sapiens"),
        ("DGQKN", "Homo sapiens"),
        ("NGEKD", "Bos taurus"),
    ]));
    let resolver = Resolver::new(table).with_policy(no_wait());
    let lcas = resolver.resolve(&variants);
    let pairs = variants.into_iter().zip(lcas).collect::<Vec<_>>();

    let c = classify("NGQKN", annotation, &pairs);
    assert_eq!(c.total, 7);
    assert_eq!(c.matched_variants.len(), 3);
    assert_eq!(c.identical_lcas, IdenticalLcas::No);
    assert_eq!(c.position_checking, PositionCheck::Required);
    assert_eq!(resolver.resolve_one("NGQKN"), Lca::Taxon("Homo sapiens".into()));
}

#[test]
fn unmodifiable_peptide() {
    let mods = Modifications::parse(None);
    let variants = generate("AGTLK", &mods);
    assert_eq!(variants, vec!["AGTLK".to_string()]);

    let resolver = Resolver::new(Table(HashMap::from([("AGTLK", "Bacteria")])));
    let pairs = variants
        .iter()
        .cloned()
        .zip(resolver.resolve(&variants))
        .collect::<Vec<_>>();
    let c = classify("AGTLK", None, &pairs);
    assert_eq!(c.identical_lcas, IdenticalLcas::NA);
    assert_eq!(c.position_checking, PositionCheck::NotRequired);
}

#[test]
fn oracle_unavailable() {
    let annotation = Some("Deamidated (NQ)");
    let mods = Modifications::parse(annotation);
    let variants = generate("QNK", &mods);

    let resolver = Resolver::new(Offline).with_policy(no_wait());
    let lcas = resolver.resolve(&variants);
    assert!(lcas.iter().all(|l| *l == Lca::NoResponse));

    let pairs = variants.into_iter().zip(lcas).collect::<Vec<_>>();
    let c = classify("QNK", annotation, &pairs);
    assert_eq!(c.identical_lcas, IdenticalLcas::NA);
    assert!(c.matched_variants.is_empty());
}
