//! Resolve peptides to their lowest common ancestor (LCA) using the Unipept
//! `pept2lca` endpoint, or anything else implementing [`Oracle`]

use std::fmt::Display;
use std::time::Duration;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

pub const UNIPEPT_PEPT2LCA: &str = "https://api.unipept.ugent.be/api/v1/pept2lca";

/// Unipept will not answer more than this many peptides per request
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lca {
    Taxon(String),
    /// The oracle answered, but had nothing for this peptide
    NoMatch,
    /// The oracle could not be reached, or returned garbage
    NoResponse,
}

impl Lca {
    /// Name of the taxon, if the lookup produced one
    pub fn taxon(&self) -> Option<&str> {
        match self {
            Lca::Taxon(name) => Some(name),
            Lca::NoMatch | Lca::NoResponse => None,
        }
    }
}

impl Display for Lca {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lca::Taxon(name) => f.write_str(name),
            Lca::NoMatch => f.write_str("no match"),
            Lca::NoResponse => f.write_str("no response"),
        }
    }
}

impl Serialize for Lca {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A single record of a `pept2lca` response. Peptides without an LCA are
/// simply left out of the response.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Pept2Lca {
    pub peptide: String,
    #[serde(default)]
    pub taxon_id: Option<u64>,
    #[serde(default)]
    pub taxon_name: Option<String>,
    #[serde(default)]
    pub taxon_rank: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Non-success HTTP status
    Status(u16),
    /// Connection failure, timeout, ...
    Transport(String),
    /// Response body could not be read as a list of `pept2lca` records
    Decode(String),
}

impl Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP status {}", code),
            Self::Transport(e) => write!(f, "transport error: {}", e),
            Self::Decode(e) => write!(f, "malformed response: {}", e),
        }
    }
}

impl std::error::Error for LookupError {}

/// Something that can map a batch of peptides to LCAs. A single call is a
/// single attempt; retrying is handled by [`RetryPolicy`].
pub trait Oracle {
    fn pept2lca(&self, peptides: &[String]) -> Result<Vec<Pept2Lca>, LookupError>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn pept2lca(&self, peptides: &[String]) -> Result<Vec<Pept2Lca>, LookupError> {
        (**self).pept2lca(peptides)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent retry
    pub backoff_factor: Duration,
    /// HTTP statuses that are worth retrying
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_millis(500),
            retry_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retriable(&self, error: &LookupError) -> bool {
        match error {
            LookupError::Status(code) => self.retry_statuses.contains(code),
            LookupError::Transport(_) => true,
            LookupError::Decode(_) => false,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(1 << exp)
    }

    /// Call `f` until it succeeds, fails with a non-retriable error, or the
    /// retries are exhausted. The last error is returned in the latter cases.
    pub fn call<T, F>(&self, mut f: F) -> Result<T, LookupError>
    where
        F: FnMut() -> Result<T, LookupError>,
    {
        let mut retry = 0;
        loop {
            match f() {
                Ok(t) => return Ok(t),
                Err(e) if retry < self.max_retries && self.is_retriable(&e) => {
                    retry += 1;
                    let delay = self.backoff(retry);
                    log::debug!(
                        "{}; retry {}/{} in {:?}",
                        e,
                        retry,
                        self.max_retries,
                        delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Blocking HTTP client for the Unipept API.
///
/// Connections are pooled inside the client, so each worker thread should
/// own its own instance.
#[derive(Clone, Debug)]
pub struct UnipeptClient {
    client: reqwest::blocking::Client,
    url: String,
    equate_il: bool,
}

impl UnipeptClient {
    pub fn new<S: Into<String>>(
        url: S,
        timeout: Duration,
        equate_il: bool,
    ) -> Result<Self, LookupError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            equate_il,
        })
    }
}

impl Oracle for UnipeptClient {
    fn pept2lca(&self, peptides: &[String]) -> Result<Vec<Pept2Lca>, LookupError> {
        let mut query = peptides
            .iter()
            .map(|p| ("input[]", p.as_str()))
            .collect::<Vec<_>>();
        query.push(("equate_il", if self.equate_il { "true" } else { "false" }));

        log::trace!("querying {} with {} peptides", self.url, peptides.len());
        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        response
            .json::<Vec<Pept2Lca>>()
            .map_err(|e| LookupError::Decode(e.to_string()))
    }
}

/// Chunked, retrying LCA lookups. Failures never escape: a chunk that cannot
/// be resolved is reported as [`Lca::NoResponse`] for each of its peptides.
pub struct Resolver<O> {
    oracle: O,
    policy: RetryPolicy,
    batch_size: usize,
}

impl<O: Oracle> Resolver<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            policy: RetryPolicy::default(),
            batch_size: MAX_BATCH_SIZE,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Batch size is kept within `1..=MAX_BATCH_SIZE`
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    fn resolve_chunk(&self, chunk: &[String]) -> Vec<Lca> {
        match self.policy.call(|| self.oracle.pept2lca(chunk)) {
            Ok(records) => {
                let found = records
                    .into_iter()
                    .map(|r| {
                        let lca = r.taxon_name.map(Lca::Taxon).unwrap_or(Lca::NoMatch);
                        (r.peptide, lca)
                    })
                    .collect::<FnvHashMap<_, _>>();
                chunk
                    .iter()
                    .map(|p| found.get(p).cloned().unwrap_or(Lca::NoMatch))
                    .collect()
            }
            Err(e) => {
                log::error!("pept2lca lookup of {} peptides failed: {}", chunk.len(), e);
                vec![Lca::NoResponse; chunk.len()]
            }
        }
    }

    /// Resolve every peptide, returning results in the same order as `peptides`
    pub fn resolve(&self, peptides: &[String]) -> Vec<Lca> {
        peptides
            .chunks(self.batch_size)
            .flat_map(|chunk| self.resolve_chunk(chunk))
            .collect()
    }

    pub fn resolve_one(&self, peptide: &str) -> Lca {
        self.resolve(&[peptide.to_string()])
            .pop()
            .unwrap_or(Lca::NoResponse)
    }
}
