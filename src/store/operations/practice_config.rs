use crate::practice::config::PracticeConfig;
use crate::store::keys;
use crate::store::{Store, StoreError};

const CONFIG_TYPE: &str = "practice_config";

impl Store {
    /// Latest persisted algorithm configuration, if any has been saved.
    pub fn get_practice_config(&self) -> Result<Option<PracticeConfig>, StoreError> {
        let key = keys::config_latest_key(CONFIG_TYPE)?;
        match self.config_versions.get(key.as_bytes())? {
            Some(raw) => match serde_json::from_slice::<PracticeConfig>(&raw) {
                Ok(parsed) => Ok(Some(parsed)),
                Err(error) => {
                    tracing::error!(error = %error, "Failed to deserialize practice config");
                    Err(StoreError::Serialization(error))
                }
            },
            None => Ok(None),
        }
    }

    /// Append a new version to the history and move the `latest` pointer. Returns the version number.
    pub fn save_practice_config(&self, config: &PracticeConfig) -> Result<u32, StoreError> {
        let prefix = keys::config_version_prefix(CONFIG_TYPE)?;
        let latest_version = match self.config_versions.scan_prefix(prefix.as_bytes()).next_back() {
            Some(item) => {
                let (key, _) = item?;
                String::from_utf8_lossy(&key[prefix.len()..])
                    .parse::<u32>()
                    .unwrap_or(0)
            }
            None => 0,
        };
        let version = latest_version + 1;

        let value = Self::serialize(config)?;
        let version_key = keys::config_version_key(CONFIG_TYPE, version)?;
        let latest_key = keys::config_latest_key(CONFIG_TYPE)?;

        let mut batch = sled::Batch::default();
        batch.insert(version_key.as_bytes(), value.as_slice());
        batch.insert(latest_key.as_bytes(), value.as_slice());
        self.config_versions.apply_batch(batch)?;

        Ok(version)
    }
}
