// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Storage server options
//!
//! A DFS connection is configured from the storage server's options merged
//! with the current user's mapping options. Keys match case-insensitively and
//! a later (user) value overrides an earlier (server) one.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

pub const PROTOCOL: &str = "protocol";
pub const ENDPOINT: &str = "endpoint";
pub const REGION: &str = "region";
pub const ACCESS_KEY: &str = "accesskey";
pub const SECRET_KEY: &str = "secretkey";
pub const HTTPS: &str = "https";
pub const VIRTUAL_HOST: &str = "virtual_host";
pub const ROOT: &str = "root";

/// Protocols spoken through the S3 API
pub const S3_COMPATIBLE_PROTOCOLS: &[&str] = &[
    "s3a", "qingstor", "huawei", "s3av2", "cos", "oss", "ksyun", "qiniu", "ucloud", "swift",
];

pub const HDFS_PROTOCOL: &str = "hdfs";
pub const LOCAL_PROTOCOL: &str = "local";
pub const MEMORY_PROTOCOL: &str = "memory";

const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// One of [`S3_COMPATIBLE_PROTOCOLS`], stored lower-case
    ObjectStore(String),
    /// An object store over a host directory given by the `root` option
    Local,
    /// An in-process store supplied by the connector
    Memory,
}

impl Protocol {
    pub fn parse(value: &str) -> Result<Self> {
        let lower = value.to_ascii_lowercase();
        if S3_COMPATIBLE_PROTOCOLS.contains(&lower.as_str()) {
            return Ok(Protocol::ObjectStore(lower));
        }
        match lower.as_str() {
            LOCAL_PROTOCOL => Ok(Protocol::Local),
            MEMORY_PROTOCOL => Ok(Protocol::Memory),
            HDFS_PROTOCOL => Err(Error::unsupported("dfs", "the hdfs protocol")),
            _ => Err(Error::invalid_parameter(format!(
                "invalid value \"{value}\" for option \"{PROTOCOL}\": please use \"{}\"",
                protocol_list()
            ))),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Protocol::ObjectStore(name) => name,
            Protocol::Local => LOCAL_PROTOCOL,
            Protocol::Memory => MEMORY_PROTOCOL,
        }
    }
}

fn protocol_list() -> String {
    let mut names: Vec<&str> = S3_COMPATIBLE_PROTOCOLS.to_vec();
    names.extend([HDFS_PROTOCOL, LOCAL_PROTOCOL, MEMORY_PROTOCOL]);
    names.join(",")
}

/// Parsed connection options. Secrets are kept out of `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct DfsOptions {
    pub protocol: Protocol,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub https: bool,
    pub virtual_host: bool,
    pub root: Option<String>,
}

impl DfsOptions {
    /// Parse server options followed by user-mapping options
    pub fn parse(
        server_options: &BTreeMap<String, String>,
        user_options: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let merged: Vec<(&String, &String)> = server_options.iter().chain(user_options).collect();
        let get = |key: &str| -> Option<String> {
            merged
                .iter()
                .rev()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| (*v).clone())
        };

        let protocol = get(PROTOCOL)
            .ok_or_else(|| Error::invalid_parameter(format!("option \"{PROTOCOL}\" not found")))?;
        let protocol = Protocol::parse(&protocol)?;

        let options = DfsOptions {
            protocol,
            endpoint: non_empty(get(ENDPOINT)),
            region: non_empty(get(REGION)).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: non_empty(get(ACCESS_KEY)),
            secret_key: non_empty(get(SECRET_KEY)),
            https: parse_bool_option(HTTPS, get(HTTPS))?,
            virtual_host: parse_bool_option(VIRTUAL_HOST, get(VIRTUAL_HOST))?,
            root: non_empty(get(ROOT)),
        };

        match options.protocol {
            Protocol::ObjectStore(_) => {
                for (name, value) in [
                    (ENDPOINT, &options.endpoint),
                    (ACCESS_KEY, &options.access_key),
                    (SECRET_KEY, &options.secret_key),
                ] {
                    if value.is_none() {
                        return Err(Error::invalid_parameter(format!(
                            "option \"{name}\" not found"
                        )));
                    }
                }
                let _ = options.endpoint_url()?;
            }
            Protocol::Local => {
                if options.root.is_none() {
                    return Err(Error::invalid_parameter(format!("option \"{ROOT}\" not found")));
                }
            }
            Protocol::Memory => {}
        }

        Ok(options)
    }

    /// The endpoint as a URL, adding a scheme from `https` when it has none
    pub fn endpoint_url(&self) -> Result<String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::invalid_parameter(format!("option \"{ENDPOINT}\" not found")))?;
        let candidate = if endpoint.contains("://") {
            endpoint.to_string()
        } else if self.https {
            format!("https://{endpoint}")
        } else {
            format!("http://{endpoint}")
        };
        let url = url::Url::parse(&candidate).map_err(|e| {
            Error::invalid_parameter(format!(
                "invalid value \"{endpoint}\" for option \"{ENDPOINT}\": {e}"
            ))
        })?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl fmt::Debug for DfsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DfsOptions")
            .field("protocol", &self.protocol)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key.as_ref().map(|_| "***"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("https", &self.https)
            .field("virtual_host", &self.virtual_host)
            .field("root", &self.root)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Boolean option values in the usual spellings
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" | "t" | "y" => Some(true),
        "false" | "off" | "no" | "0" | "f" | "n" => Some(false),
        _ => None,
    }
}

fn parse_bool_option(name: &str, value: Option<String>) -> Result<bool> {
    match value {
        None => Ok(false),
        Some(value) => parse_bool(&value).ok_or_else(|| {
            Error::invalid_parameter(format!(
                "invalid value for boolean option \"{name}\": {value}"
            ))
        }),
    }
}

/// Split a DFS tablespace location `/bucket/workdir` into its bucket and the
/// (possibly empty) prefix inside it
pub fn split_path(path: &str) -> Result<(String, String)> {
    let rest = path.strip_prefix('/').ok_or_else(|| {
        Error::invalid_parameter(format!("tablespace location \"{path}\" must be an absolute path"))
    })?;
    let (bucket, workdir) = match rest.split_once('/') {
        Some((bucket, workdir)) => (bucket, workdir.trim_matches('/')),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(Error::invalid_parameter(format!(
            "tablespace location \"{path}\" does not name a bucket"
        )));
    }
    Ok((bucket.to_string(), workdir.to_string()))
}
