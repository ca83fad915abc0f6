use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::info;

use crate::catalog::Catalog;
use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;

pub const CATALOG_FILE: &str = "hotel.json";
pub const WAL_FILE: &str = "hotel.wal";

/// Manages per-hotel engines. Each hotel gets its own directory, Engine, WAL and compactor.
pub struct HotelManager {
    engines: DashMap<String, Arc<Engine>>,
    /// Held while a hotel is created or loaded, so one WAL never gets two engines.
    loading: Mutex<()>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl HotelManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            loading: Mutex::new(()),
            data_dir,
            compact_threshold,
        }
    }

    /// Create a hotel from its catalog document with every room free from `opened_on`.
    pub async fn initialize(&self, catalog_json: &str, opened_on: NaiveDate) -> io::Result<Arc<Engine>> {
        let catalog = Catalog::from_json(catalog_json)?;
        let key = sanitize(&catalog.hotel_name)?;
        let engine = {
            let _loading = self.lock_loading()?;
            let dir = self.hotel_dir(&key);
            if self.engines.contains_key(&key) || dir.join(CATALOG_FILE).exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("hotel {} already initialized", catalog.hotel_name),
                ));
            }

            std::fs::create_dir_all(&dir)?;
            let json = serde_json::to_string_pretty(&catalog).map_err(io::Error::other)?;
            std::fs::write(dir.join(CATALOG_FILE), json)?;
            self.load(key, catalog)?
        };
        let opened = engine.open_calendars(opened_on).await.map_err(io::Error::other)?;
        info!("hotel {} initialized: {opened} rooms open from {opened_on}", engine.hotel_name());
        Ok(engine)
    }

    /// Get an initialized hotel's engine, loading it on first use.
    pub fn open(&self, name: &str) -> io::Result<Arc<Engine>> {
        let key = sanitize(name)?;
        if let Some(engine) = self.engines.get(&key) {
            return Ok(engine.value().clone());
        }
        let _loading = self.lock_loading()?;
        // Another caller may have finished loading while we waited.
        if let Some(engine) = self.engines.get(&key) {
            return Ok(engine.value().clone());
        }
        let catalog_path = self.hotel_dir(&key).join(CATALOG_FILE);
        if !catalog_path.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("hotel {name} not initialized"),
            ));
        }
        let catalog = Catalog::load(&catalog_path)?;
        self.load(key, catalog)
    }

    pub fn loaded(&self) -> usize {
        self.engines.len()
    }

    fn lock_loading(&self) -> io::Result<MutexGuard<'_, ()>> {
        self.loading
            .lock()
            .map_err(|_| io::Error::other("hotel loader poisoned"))
    }

    fn hotel_dir(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("hotel_{key}"))
    }

    /// Callers hold the loading lock.
    fn load(&self, key: String, catalog: Catalog) -> io::Result<Arc<Engine>> {
        if self.engines.len() >= MAX_HOTELS {
            return Err(io::Error::other("too many hotels"));
        }
        let wal_path = self.hotel_dir(&key).join(WAL_FILE);
        let engine = Arc::new(Engine::new(wal_path, catalog)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(key, engine.clone());
        metrics::gauge!(crate::observability::HOTELS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}

/// Directory-safe form of a hotel name. Whitespace becomes `_`; anything that could
/// escape the data directory is dropped.
fn sanitize(name: &str) -> io::Result<String> {
    if name.len() > MAX_HOTEL_NAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "hotel name too long"));
    }
    let safe: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if safe.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty hotel name"));
    }
    Ok(safe)
}
