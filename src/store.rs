// store.rs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;

/// Raw key/value access to non-volatile storage, shaped after the ESP-IDF NVS API.
pub trait KvStore {
    fn get_raw<'a>(&mut self, key: &str, buf: &'a mut [u8]) -> anyhow::Result<Option<&'a [u8]>>;
    fn set_raw(&mut self, key: &str, data: &[u8]) -> anyhow::Result<bool>;
    fn remove(&mut self, key: &str) -> anyhow::Result<bool>;
}

#[cfg(feature = "esp")]
impl KvStore for esp_idf_svc::nvs::EspNvs<esp_idf_svc::nvs::NvsDefault> {
    fn get_raw<'a>(&mut self, key: &str, buf: &'a mut [u8]) -> anyhow::Result<Option<&'a [u8]>> {
        Ok(esp_idf_svc::nvs::EspNvs::get_raw(self, key, buf)?)
    }

    fn set_raw(&mut self, key: &str, data: &[u8]) -> anyhow::Result<bool> {
        Ok(esp_idf_svc::nvs::EspNvs::set_raw(self, key, data)?)
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<bool> {
        Ok(esp_idf_svc::nvs::EspNvs::remove(self, key)?)
    }
}

/// Volatile stand-in for flash. Clones share the same backing map, so a clone
/// handed to a fresh boot sees everything the previous boot committed.
#[derive(Clone, Debug, Default)]
pub struct MemStore {
    map: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.lock().map(|m| m.contains_key(key)).unwrap_or(false)
    }
}

impl KvStore for MemStore {
    fn get_raw<'a>(&mut self, key: &str, buf: &'a mut [u8]) -> anyhow::Result<Option<&'a [u8]>> {
        let map = self.map.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        match map.get(key) {
            None => Ok(None),
            Some(v) if v.len() > buf.len() => Err(anyhow!(
                "value for {key:?} is {} bytes, buffer holds {}",
                v.len(),
                buf.len()
            )),
            Some(v) => {
                buf[..v.len()].copy_from_slice(v);
                Ok(Some(&buf[..v.len()]))
            }
        }
    }

    fn set_raw(&mut self, key: &str, data: &[u8]) -> anyhow::Result<bool> {
        let mut map = self.map.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        map.insert(key.to_string(), data.to_vec());
        Ok(true)
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<bool> {
        let mut map = self.map.lock().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(map.remove(key).is_some())
    }
}


// EOF
