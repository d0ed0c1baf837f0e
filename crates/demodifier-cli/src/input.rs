use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use demodifier_core::lca::{MAX_BATCH_SIZE, UNIPEPT_PEPT2LCA};
use demodifier_core::{LookupError, Resolver, RetryPolicy, UnipeptClient};
use serde::{Deserialize, Serialize};

const SEQUENCE_COLUMNS: [&str; 2] = ["Sequence", "pep_seq"];
const MODIFICATION_COLUMNS: [&str; 2] = ["Modifications", "pep_var_mod"];

/// First header cell of the PSM table in a Mascot CSV export
const MASCOT_HEADER: &str = "prot_hit_num";

#[derive(Serialize, Clone, Debug)]
/// Actual run parameters - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub input_path: PathBuf,
    pub output_directory: PathBuf,
    pub unipept_url: String,
    pub equate_il: bool,
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub threads: usize,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from an (optional) JSON file
pub struct Input {
    unipept_url: Option<String>,
    equate_il: Option<bool>,
    batch_size: Option<usize>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    backoff_ms: Option<u64>,
    threads: Option<usize>,
    output_directory: Option<String>,

    #[serde(skip)]
    input_path: Option<String>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let mut input = match matches.get_one::<String>("parameters") {
            Some(path) => Input::load(path)
                .with_context(|| format!("Failed to read parameters from `{path}`"))?,
            None => Input::default(),
        };

        input.input_path = matches.get_one::<String>("input").cloned();

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(threads) = matches.get_one::<u16>("threads").copied() {
            log::trace!("overriding `threads` parameter.");
            input.threads = Some(threads as usize);
        }
        if let Some(url) = matches.get_one::<String>("url") {
            log::trace!("overriding `unipept_url` parameter.");
            input.unipept_url = Some(url.into());
        }

        ensure!(
            input.input_path.is_some(),
            "an input file must be given. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(anyhow::Error::from)
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let input_path = PathBuf::from(
            self.input_path
                .context("an input file must be given. For more information try '--help'")?,
        );

        let batch_size = self.batch_size.unwrap_or(MAX_BATCH_SIZE);
        if batch_size > MAX_BATCH_SIZE {
            log::warn!(
                "`batch_size` of {} exceeds the Unipept limit, using {}",
                batch_size,
                MAX_BATCH_SIZE
            );
        }

        let timeout_secs = self.timeout_secs.unwrap_or(10);
        if timeout_secs == 0 {
            log::warn!("`timeout_secs: 0` - every Unipept request will time out");
        }

        let threads = self.threads.unwrap_or_else(num_cpus::get).max(1);

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => match input_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => std::env::current_dir()?,
            },
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            input_path,
            output_directory,
            unipept_url: self.unipept_url.unwrap_or_else(|| UNIPEPT_PEPT2LCA.into()),
            equate_il: self.equate_il.unwrap_or(true),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            timeout_secs,
            max_retries: self.max_retries.unwrap_or(3),
            backoff_ms: self.backoff_ms.unwrap_or(500),
            threads,
        })
    }
}

impl Settings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: Duration::from_millis(self.backoff_ms),
            ..Default::default()
        }
    }

    /// A fresh client, with its own connection pool
    pub fn client(&self) -> Result<UnipeptClient, LookupError> {
        UnipeptClient::new(
            self.unipept_url.clone(),
            Duration::from_secs(self.timeout_secs),
            self.equate_il,
        )
    }

    pub fn resolver(&self, client: UnipeptClient) -> Resolver<UnipeptClient> {
        Resolver::new(client)
            .with_policy(self.retry_policy())
            .with_batch_size(self.batch_size)
    }
}

/// One identified peptide from the input table
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    pub sequence: String,
    pub modifications: String,
}

impl Row {
    pub fn annotation(&self) -> Option<&str> {
        match self.modifications.is_empty() {
            true => None,
            false => Some(&self.modifications),
        }
    }
}

/// Does the start of the file look like a Mascot export with a preamble?
fn has_mascot_preamble(contents: &str) -> bool {
    let head = &contents.as_bytes()[..contents.len().min(4096)];
    head.windows(MASCOT_HEADER.len())
        .any(|w| w == MASCOT_HEADER.as_bytes())
}

/// Skip everything before the Mascot table header, if there is one
fn skip_preamble(contents: &str) -> &str {
    let mut offset = 0;
    for line in contents.split_inclusive('\n') {
        let first = line.split(',').next().unwrap_or_default();
        if first.trim().trim_matches('"') == MASCOT_HEADER {
            return &contents[offset..];
        }
        offset += line.len();
    }
    contents
}

fn column(headers: &csv::StringRecord, names: &[&str]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|name| headers.iter().position(|h| h.trim() == *name))
        .collect()
}

/// First non-empty value among the aliased columns
fn first_value(record: &csv::StringRecord, columns: &[usize]) -> String {
    columns
        .iter()
        .filter_map(|&ix| record.get(ix))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Parse a delimited table of identified peptides
pub fn parse_rows(contents: &str, delimiter: u8) -> anyhow::Result<Vec<Row>> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let contents = match delimiter == b',' && has_mascot_preamble(contents) {
        true => skip_preamble(contents),
        false => contents,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(contents.as_bytes());

    let headers = rdr.headers()?.clone();
    let sequence = column(&headers, &SEQUENCE_COLUMNS);
    let modifications = column(&headers, &MODIFICATION_COLUMNS);
    ensure!(
        !sequence.is_empty(),
        "no peptide sequence column found, expected one of {:?}",
        SEQUENCE_COLUMNS
    );

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(Row {
            sequence: first_value(&record, &sequence),
            modifications: first_value(&record, &modifications),
        });
    }
    Ok(rows)
}

/// Read rows from a CSV (optionally a Mascot export), or a tab-separated
/// MaxQuant `.txt` file
pub fn read_rows<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Row>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read `{}`", path.display()))?;

    let tsv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);

    parse_rows(&contents, if tsv { b'\t' } else { b',' })
        .with_context(|| format!("Failed to parse `{}`", path.display()))
}
