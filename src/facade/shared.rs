//! Shared facade with versioned snapshot swapping.
//!
//! A datastore process publishes datasets by writing the tables and bumping
//! the timestamp; readers compare the published version against their cached
//! snapshot and atomically swap under a writer lock. A query always runs
//! against the snapshot it grabbed at the start; a swap never tears an
//! in-flight request.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};

use super::internal::{table_path, InternalDataFacade};
use super::DataFacade;
use crate::formats::properties_file;

pub struct SharedDataFacade {
    base: PathBuf,
    current: RwLock<Arc<InternalDataFacade>>,
    version: AtomicU64,
    loaded_timestamp: RwLock<String>,
}

impl SharedDataFacade {
    pub fn load(base: &Path) -> Result<Self> {
        let facade = InternalDataFacade::load(base)?;
        let timestamp = facade.data_timestamp().to_string();
        Ok(Self {
            base: base.to_path_buf(),
            current: RwLock::new(Arc::new(facade)),
            version: AtomicU64::new(1),
            loaded_timestamp: RwLock::new(timestamp),
        })
    }

    /// The snapshot a request should hold for its whole lifetime.
    pub fn snapshot(&self) -> Arc<InternalDataFacade> {
        self.current.read().expect("facade lock poisoned").clone()
    }

    /// Monotonic version, bumped on every successful swap.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Compare the on-disk timestamp with the loaded one and swap in a fresh
    /// snapshot when the datastore published new tables. Readers keep their
    /// old snapshot until they finish.
    pub fn reload_if_changed(&self) -> Result<bool> {
        let published = properties_file::read_timestamp(table_path(&self.base, ".timestamp"))
            .context("reading published timestamp")?;
        {
            let loaded = self.loaded_timestamp.read().expect("facade lock poisoned");
            if *loaded == published {
                return Ok(false);
            }
        }

        let fresh = Arc::new(InternalDataFacade::load(&self.base)?);
        {
            let mut current = self.current.write().expect("facade lock poisoned");
            *current = fresh;
        }
        {
            let mut loaded = self.loaded_timestamp.write().expect("facade lock poisoned");
            *loaded = published;
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        tracing::info!(base = %self.base.display(), "swapped in a new dataset snapshot");
        Ok(true)
    }
}
