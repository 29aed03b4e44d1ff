// apcache.rs

use std::fmt;

use log::*;

use crate::KvStore;

pub const BSSID_LEN: usize = 6;
const ENTRY_LEN: usize = 1 + BSSID_LEN;

const CACHE_NAME: &str = "apcache";

/// Channel and BSSID of the access point we last associated with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApCacheEntry {
    pub channel: u8,
    pub bssid: [u8; BSSID_LEN],
}

impl ApCacheEntry {
    pub fn to_bytes(&self) -> [u8; ENTRY_LEN] {
        let mut b = [0u8; ENTRY_LEN];
        b[0] = self.channel;
        b[1..].copy_from_slice(&self.bssid);
        b
    }

    /// Anything but exactly one channel byte plus a BSSID is not a cache entry.
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() != ENTRY_LEN || b[0] == 0 {
            return None;
        }
        let mut bssid = [0u8; BSSID_LEN];
        bssid.copy_from_slice(&b[1..]);
        Some(ApCacheEntry {
            channel: b[0],
            bssid,
        })
    }
}

impl fmt::Display for ApCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bssid;
        write!(
            f,
            "ch {} bssid {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.channel, b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// The persisted fast-reconnect entry plus the store it lives in.
pub struct ApCache<S> {
    store: S,
    entry: Option<ApCacheEntry>,
}

impl<S: KvStore> ApCache<S> {
    /// Reads the entry back from flash; done once per boot.
    pub fn load(mut store: S) -> Self {
        let mut buf = [0u8; ENTRY_LEN + 1];
        let entry = match store.get_raw(CACHE_NAME, &mut buf) {
            Ok(Some(b)) => {
                let e = ApCacheEntry::from_bytes(b);
                if e.is_none() {
                    warn!("Ignoring malformed AP cache ({} bytes)", b.len());
                }
                e
            }
            Ok(None) => None,
            Err(e) => {
                error!("AP cache read error {e:?}");
                None
            }
        };
        match &entry {
            Some(e) => info!("AP cache: {e}"),
            None => info!("AP cache is empty"),
        }
        ApCache { store, entry }
    }

    pub fn entry(&self) -> Option<ApCacheEntry> {
        self.entry
    }

    /// Persists immediately; the next power-off may come at any time.
    pub fn store(&mut self, entry: ApCacheEntry) -> anyhow::Result<()> {
        self.store.set_raw(CACHE_NAME, &entry.to_bytes())?;
        info!("AP cache saved: {entry}");
        self.entry = Some(entry);
        Ok(())
    }

    /// Forgets the entry in memory and in flash.
    pub fn invalidate(&mut self) {
        if let Some(e) = self.entry.take() {
            info!("AP cache invalidated: {e}");
        }
        if let Err(e) = self.store.remove(CACHE_NAME) {
            error!("Cannot remove AP cache from nvs: {e:?}");
        }
    }
}


// EOF
