//! NVS-backed key/value store.

use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};

use inkframe_core::store::{KvError, KvStore};

const NAMESPACE: &str = "inkframe";
// Longest stored value is the 64-char device key.
const STR_BUF_LEN: usize = 128;

pub struct NvsKv {
    nvs: EspNvs<NvsDefault>,
}

impl NvsKv {
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> anyhow::Result<Self> {
        let nvs = EspNvs::new(partition, NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl KvStore for NvsKv {
    fn get_u32(&mut self, key: &str) -> Result<Option<u32>, KvError> {
        self.nvs
            .get_u32(key)
            .map_err(|err| KvError::Io(err.to_string()))
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), KvError> {
        self.nvs
            .set_u32(key, value)
            .map_err(|err| KvError::Io(err.to_string()))
    }

    fn get_str(&mut self, key: &str) -> Result<Option<String>, KvError> {
        let mut buf = [0u8; STR_BUF_LEN];
        let value = self
            .nvs
            .get_str(key, &mut buf)
            .map_err(|err| KvError::Io(err.to_string()))?;
        Ok(value.map(str::to_string))
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), KvError> {
        self.nvs
            .set_str(key, value)
            .map_err(|err| KvError::Io(err.to_string()))
    }

    fn remove(&mut self, key: &str) -> Result<(), KvError> {
        self.nvs
            .remove(key)
            .map(|_| ())
            .map_err(|err| KvError::Io(err.to_string()))
    }
}
