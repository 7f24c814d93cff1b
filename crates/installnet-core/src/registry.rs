//! Registry index: project names from a PEP 503 "simple" index.
//!
//! 起動時に 1 回だけ取得する。ここで失敗した場合は run 全体を中止する
//! （パッケージ単位の失敗ではない）。

use rand::seq::SliceRandom;

use crate::domain::PackageName;
use crate::error::RegistryError;

const PROJECT_LINK: &str = "<a href=\"/simple/";

pub struct RegistryIndex {
    client: reqwest::Client,
    index_url: String,
}

impl RegistryIndex {
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            index_url: index_url.into(),
        }
    }

    /// Every project listed by the index, in index order.
    pub async fn fetch(&self) -> Result<Vec<PackageName>, RegistryError> {
        tracing::info!(index = %self.index_url, "fetching registry index");
        let body = self
            .client
            .get(&self.index_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let names = parse_index(&body);
        if names.is_empty() {
            return Err(RegistryError::EmptyIndex(self.index_url.clone()));
        }
        tracing::info!(projects = names.len(), "registry index fetched");
        Ok(names)
    }

    /// `n` distinct projects in random order; all of them when the index
    /// has fewer than `n`.
    pub async fn sample(&self, n: usize) -> Result<Vec<PackageName>, RegistryError> {
        let names = self.fetch().await?;
        Ok(sample(names, n, &mut rand::thread_rng()))
    }
}

/// Project names from the index page, one `<a href="/simple/NAME/">` per line.
pub(crate) fn parse_index(html: &str) -> Vec<PackageName> {
    html.lines()
        .filter_map(|line| line.trim_start().strip_prefix(PROJECT_LINK))
        .filter_map(|rest| rest.split(['/', '"']).next())
        .filter_map(|name| match PackageName::new(name) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!(name, error = %e, "skipping index entry");
                None
            }
        })
        .collect()
}

pub(crate) fn sample<R: rand::Rng + ?Sized>(
    mut names: Vec<PackageName>,
    n: usize,
    rng: &mut R,
) -> Vec<PackageName> {
    if n >= names.len() {
        return names;
    }
    names.shuffle(rng);
    names.truncate(n);
    names
}
