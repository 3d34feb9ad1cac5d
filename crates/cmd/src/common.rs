// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use dirtable::{JsonFileStore, Session, SessionConfig, Transaction};
use fileam::dfs::{BuilderConnector, ObjectStoreConnector};

/// Environment variable naming the home directory
pub const HOME_ENV: &str = "DIRTABLE_HOME";

/// Session configuration file inside the home directory
pub const CONFIG_FILE: &str = "dirtable.yaml";

/// Where commands find their home and who they run as
#[derive(Clone)]
pub struct Context {
    pub home: Option<PathBuf>,
    pub user: Option<String>,
    connector: Arc<dyn ObjectStoreConnector>,
}

impl Context {
    pub fn new(home: Option<PathBuf>, user: Option<String>) -> Self {
        Self {
            home,
            user,
            connector: Arc::new(BuilderConnector),
        }
    }

    /// Use another object store connector for DFS tablespaces
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn ObjectStoreConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// The same home, run as the configured user
    #[must_use]
    pub fn without_user(&self) -> Self {
        Self {
            user: None,
            ..self.clone()
        }
    }

    /// The home directory from `--home`, falling back to `DIRTABLE_HOME`
    pub fn home(&self) -> Result<PathBuf> {
        if let Some(path) = &self.home {
            return Ok(path.clone());
        }
        env::var(HOME_ENV)
            .map(PathBuf::from)
            .map_err(|_| anyhow!("{HOME_ENV} environment variable not set and no --home given"))
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        Ok(self.home()?.join(CONFIG_FILE))
    }

    pub fn load_config(&self) -> Result<SessionConfig> {
        let path = self.config_path()?;
        if !path.exists() {
            return Err(anyhow!(
                "no configuration at {}. Run 'dirtable init' first.",
                path.display()
            ));
        }
        SessionConfig::load(&path).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Open a session on the home's catalog, switching to `--user` if given
    pub fn open_session(&self) -> Result<Session> {
        let home = self.home()?;
        let config = self.load_config()?;
        let session = Session::open(
            config,
            Box::new(JsonFileStore::in_home(&home)),
            self.connector.clone(),
        )
        .with_context(|| format!("Failed to open catalog in {}", home.display()))?;
        if let Some(user) = &self.user {
            session.set_session_user(user)?;
        }
        Ok(session)
    }

    /// Run `f` in one transaction, committing on success. An error drops
    /// the transaction, which aborts it.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut session = self.open_session()?;
        let mut txn = session.begin()?;
        let value = f(&mut txn)?;
        txn.commit().context("Failed to commit")?;
        Ok(value)
    }
}

/// Read an option map from a YAML file of string keys and scalar values
pub fn read_options(path: Option<&Path>) -> Result<BTreeMap<String, String>> {
    let Some(path) = path else {
        return Ok(BTreeMap::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read options file {}", path.display()))?;
    parse_options(&text).with_context(|| format!("Invalid options file {}", path.display()))
}

pub fn parse_options(text: &str) -> Result<BTreeMap<String, String>> {
    let value: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)?;
    let mapping = match value {
        serde_yaml_ng::Value::Null => return Ok(BTreeMap::new()),
        serde_yaml_ng::Value::Mapping(mapping) => mapping,
        _ => return Err(anyhow!("options must be a mapping")),
    };

    let mut options = BTreeMap::new();
    for (key, value) in mapping {
        let key = scalar(&key).ok_or_else(|| anyhow!("option names must be scalars"))?;
        let value = scalar(&value).ok_or_else(|| anyhow!("option \"{key}\" must be a scalar"))?;
        let _ = options.insert(key, value);
    }
    Ok(options)
}

fn scalar(value: &serde_yaml_ng::Value) -> Option<String> {
    match value {
        serde_yaml_ng::Value::String(s) => Some(s.clone()),
        serde_yaml_ng::Value::Bool(b) => Some(b.to_string()),
        serde_yaml_ng::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Helper function to format file sizes
pub fn format_file_size(size: i64) -> String {
    let size = size.max(0) as f64;
    if size >= 1024.0 * 1024.0 {
        format!("{:.1}MB", size / (1024.0 * 1024.0))
    } else if size >= 1024.0 {
        format!("{:.1}KB", size / 1024.0)
    } else {
        format!("{size}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = parse_options("protocol: s3a\nhttps: false\nport: 9000\n").unwrap();
        assert_eq!(options["protocol"], "s3a");
        assert_eq!(options["https"], "false");
        assert_eq!(options["port"], "9000");

        assert!(parse_options("").unwrap().is_empty());
        assert!(parse_options("- a\n- b\n").is_err());
        assert!(parse_options("nested: {a: 1}\n").is_err());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(12), "12B");
        assert_eq!(format_file_size(2048), "2.0KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.0MB");
    }

    #[test]
    fn test_home_override_wins() {
        let ctx = Context::new(Some(PathBuf::from("/tmp/dt-home")), None);
        assert_eq!(ctx.home().unwrap(), PathBuf::from("/tmp/dt-home"));
        assert_eq!(
            ctx.config_path().unwrap(),
            PathBuf::from("/tmp/dt-home/dirtable.yaml")
        );
    }
}
