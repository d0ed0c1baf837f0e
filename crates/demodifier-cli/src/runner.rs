use super::input::{read_rows, Row, Settings};
use anyhow::Context;
use demodifier_core::misp;
use demodifier_core::{
    classify, Classification, IdenticalLcas, Lca, Modifications, Oracle, Resolver, UnipeptClient,
};
use log::info;
use rayon::prelude::*;
use std::time::Instant;

/// Everything computed for a single input row
#[derive(Clone, Debug)]
pub struct RowResult {
    pub row: Row,
    /// Unique permutations of `row.sequence`
    pub variants: Vec<String>,
    /// LCA of each permutation, aligned with `variants`
    pub variant_lcas: Vec<Lca>,
    /// LCA of the peptide as identified
    pub input_lca: Lca,
    pub classification: Classification,
}

impl RowResult {
    pub fn pairs(&self) -> impl Iterator<Item = (&String, &Lca)> {
        self.variants.iter().zip(self.variant_lcas.iter())
    }
}

/// Generate, resolve and classify all permutations of one row.
/// Rows without a peptide sequence produce nothing.
pub fn process_row<O: Oracle>(row: Row, resolver: &Resolver<O>) -> Option<RowResult> {
    log::debug!(
        "processing row: peptide={:?}, modifications={:?}",
        row.sequence,
        row.modifications
    );
    if row.sequence.is_empty() {
        return None;
    }

    let mods = Modifications::parse(row.annotation());
    let variants = misp::generate(&row.sequence, &mods);

    let input_lca = resolver.resolve_one(&row.sequence);
    let variant_lcas = resolver.resolve(&variants);

    let pairs = variants
        .iter()
        .cloned()
        .zip(variant_lcas.iter().cloned())
        .collect::<Vec<_>>();
    let classification = classify(&row.sequence, row.annotation(), &pairs);

    Some(RowResult {
        row,
        variants,
        variant_lcas,
        input_lca,
        classification,
    })
}

/// Process rows on a pool of `threads` workers. Each worker builds its own
/// resolver with `init`, so oracle connections are never shared.
/// Results are returned in input order.
pub fn process_rows<O, F>(
    rows: Vec<Row>,
    threads: usize,
    init: F,
) -> anyhow::Result<Vec<RowResult>>
where
    O: Oracle,
    F: Fn() -> Resolver<O> + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Failed to build worker pool")?;

    let results = pool.install(|| {
        rows.into_par_iter()
            .map_init(&init, |resolver, row| process_row(row, resolver))
            .collect::<Vec<_>>()
    });

    Ok(results.into_iter().flatten().collect())
}

pub struct Runner {
    pub parameters: Settings,
    /// One client per worker thread
    clients: Vec<UnipeptClient>,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Settings) -> anyhow::Result<Self> {
        let clients = (0..parameters.threads.max(1))
            .map(|_| parameters.client())
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to configure Unipept client")?;

        Ok(Self {
            parameters,
            clients,
            start: Instant::now(),
        })
    }

    pub fn clients(&self) -> &[UnipeptClient] {
        &self.clients
    }

    /// Resolver for the calling worker, backed by that worker's client
    fn worker_resolver(&self) -> Resolver<UnipeptClient> {
        let idx = rayon::current_thread_index().unwrap_or(0) % self.clients.len();
        self.parameters.resolver(self.clients[idx].clone())
    }

    pub fn run(self) -> anyhow::Result<()> {
        let rows = read_rows(&self.parameters.input_path)?;
        info!(
            "read {} rows from {} in {:#?}",
            rows.len(),
            self.parameters.input_path.display(),
            self.start.elapsed()
        );

        let parameters = &self.parameters;
        let results = process_rows(rows, parameters.threads, || self.worker_resolver())?;

        let ambiguous = results
            .iter()
            .filter(|r| r.classification.identical_lcas == IdenticalLcas::No)
            .count();
        info!(
            "- processed {} peptides ({} with differing LCAs) using {} threads in {:#?}",
            results.len(),
            ambiguous,
            parameters.threads,
            self.start.elapsed()
        );

        let outputs = [
            self.write_summary(&results)?,
            self.write_permutations(&results)?,
            self.write_json(&results)?,
            self.write_parameters()?,
        ];
        for path in outputs {
            info!("- wrote {}", path);
        }

        info!("finished in {:#?}", self.start.elapsed());
        Ok(())
    }
}
