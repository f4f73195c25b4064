use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::propagation::{ChangeTriggers, Propagator};
use crate::repo::Repositories;
use crate::uploads::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub repos: Repositories,
    pub triggers: ChangeTriggers,
    pub uploads: UploadStore,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repos = Repositories::new(&cfg).await?;
        Ok(Self::with_repos(cfg, repos))
    }

    /// Wires the engine to whatever graph store `repos` carries.
    pub fn with_repos(cfg: Config, repos: Repositories) -> Self {
        let propagator = Propagator::new(repos.graph.clone(), cfg.topology.edge_convention);
        let uploads = UploadStore::new(cfg.uploads.dir.clone());
        Self {
            cfg: Arc::new(cfg),
            repos,
            triggers: ChangeTriggers::new(propagator),
            uploads,
        }
    }
}
