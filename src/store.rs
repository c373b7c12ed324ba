use std::path::PathBuf;

use anyhow::Context;

use crate::directory::Roster;
use crate::io::{read_io_file, replace_io_file};

/// JSON document on disk holding the whole roster.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Loads and relinks the document. A missing file is an empty roster.
    pub async fn load(&self) -> anyhow::Result<Roster> {
        let bytes = read_io_file(&self.path)
            .await
            .with_context(|| format!("could not read {}", self.path.display()))?;
        let mut roster = match bytes {
            Some(bytes) => serde_json::from_slice::<Roster>(&bytes)
                .with_context(|| format!("{} is not a valid diary document", self.path.display()))?,
            None => {
                log::info!("no data file at {}, starting empty", self.path.display());
                Roster::default()
            }
        };
        roster.relink();
        Ok(roster)
    }

    pub async fn save(&self, roster: &Roster) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(roster)?;
        replace_io_file(&self.path, &bytes)
            .await
            .with_context(|| format!("could not write {}", self.path.display()))?;
        log::debug!("saved diary document to {}", self.path.display());
        Ok(())
    }
}
