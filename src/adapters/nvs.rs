//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`]: the whole [`SystemConfig`] is one postcard
//! blob under namespace `espresso`, key `syscfg`.
//!
//! - Config validation: every field is range-checked before persistence.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Host builds keep the blobs in an in-memory map.

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "espresso";
const CONFIG_KEY: &str = "syscfg";

/// Largest blob accepted on load.  A stored profile dominates the size.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl Default for NvsAdapter {
    /// A handle that skips flash initialisation.  Used when `new()` fails
    /// so the machine still runs, without persistence guarantees.
    fn default() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        }
    }
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. After a version mismatch or a full partition the
    /// NVS partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self::default())
    }

    /// Load, falling back to defaults (with a warning) when the stored
    /// blob cannot be used.
    pub fn load_or_default(&self) -> SystemConfig {
        match self.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("NvsAdapter: stored config unusable ({e}), using defaults");
                SystemConfig::default()
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    /// Overwrite the stored blob with arbitrary bytes (host only).
    #[cfg(not(target_os = "espidf"))]
    pub fn put_raw(&self, bytes: &[u8]) {
        let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
        self.store.borrow_mut().insert(key, bytes.to_vec());
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: ns_buf is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    cfg.validate().map_err(ConfigError::ValidationFailed)
}

fn decode(bytes: &[u8]) -> Result<SystemConfig, ConfigError> {
    let cfg: SystemConfig = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
    validate_config(&cfg).map_err(|_| ConfigError::Corrupted)?;
    Ok(cfg)
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg = decode(bytes)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key_cstr = b"syscfg\0";
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg = decode(&bytes)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(SystemConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {e}");
                    Err(ConfigError::IoError)
                }
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            if bytes.len() > MAX_BLOB_SIZE {
                return Err(ConfigError::StorageFull);
            }
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key_cstr = b"syscfg\0";
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {e}");
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}
