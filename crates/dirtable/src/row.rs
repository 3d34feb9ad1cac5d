// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Directory table rows
//!
//! A directory table has a fixed tuple descriptor. Rows are formed the way
//! a text-format loader forms them: each attribute's value is rendered as
//! text and passed through the input function of the attribute's type.
//! Attributes that receive no value stay null.

use crate::error::{Result, invalid_parameter};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Format of `last_modified`, in local time
pub const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Int8,
    Timestamp,
}

/// Parses the text form of a column value
pub type InputFunction = fn(&str) -> Result<Datum>;

impl ColumnType {
    #[must_use]
    pub fn input_function(self) -> InputFunction {
        match self {
            ColumnType::Text => text_in,
            ColumnType::Int8 => int8_in,
            ColumnType::Timestamp => timestamp_in,
        }
    }
}

fn text_in(value: &str) -> Result<Datum> {
    Ok(Datum::Text(value.to_string()))
}

fn int8_in(value: &str) -> Result<Datum> {
    value
        .trim()
        .parse::<i64>()
        .map(Datum::Int8)
        .map_err(|_| invalid_parameter(format!("invalid input syntax for type bigint: \"{value}\"")))
}

fn timestamp_in(value: &str) -> Result<Datum> {
    NaiveDateTime::parse_from_str(value.trim(), LAST_MODIFIED_FORMAT)
        .map(Datum::Timestamp)
        .map_err(|_| {
            invalid_parameter(format!("invalid input syntax for type timestamp: \"{value}\""))
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    Text(String),
    Int8(i64),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: &'static str,
    pub type_: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDesc {
    pub attrs: Vec<Attribute>,
}

pub const ATTR_SCOPED_FILE_URL: usize = 0;
pub const ATTR_RELATIVE_PATH: usize = 1;
pub const ATTR_SIZE: usize = 2;
pub const ATTR_LAST_MODIFIED: usize = 3;
pub const ATTR_MD5: usize = 4;
pub const ATTR_TAG: usize = 5;

impl TupleDesc {
    /// The columns every directory table has
    #[must_use]
    pub fn directory_table() -> Self {
        let attr = |name, type_| Attribute { name, type_ };
        Self {
            attrs: vec![
                attr("scoped_file_url", ColumnType::Text),
                attr("relative_path", ColumnType::Text),
                attr("size", ColumnType::Int8),
                attr("last_modified", ColumnType::Timestamp),
                attr("md5", ColumnType::Text),
                attr("tag", ColumnType::Text),
            ],
        }
    }

    #[must_use]
    pub fn natts(&self) -> usize {
        self.attrs.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub values: Vec<Option<Datum>>,
    pub nulls: Vec<bool>,
}

impl Tuple {
    fn empty(natts: usize) -> Self {
        Self {
            values: vec![None; natts],
            nulls: vec![true; natts],
        }
    }

    /// Run `text` through the attribute's input function and clear its null bit
    fn set(&mut self, desc: &TupleDesc, attno: usize, text: &str) -> Result<()> {
        let attr = desc
            .attrs
            .get(attno)
            .ok_or_else(|| invalid_parameter(format!("invalid attribute number {attno}")))?;
        let datum = (attr.type_.input_function())(text)?;
        self.values[attno] = Some(datum);
        self.nulls[attno] = false;
        Ok(())
    }

    fn text(&self, attno: usize) -> Option<&str> {
        match self.values.get(attno) {
            Some(Some(Datum::Text(text))) => Some(text),
            _ => None,
        }
    }
}

/// Build the row describing a freshly ingested file
pub fn form_directory_row<Tz: TimeZone>(
    desc: &TupleDesc,
    tablespace_name: &str,
    relative_path: &str,
    size: u64,
    now: &DateTime<Tz>,
) -> Result<Tuple> {
    let size = i64::try_from(size)
        .map_err(|_| invalid_parameter(format!("file size {size} is out of range")))?;
    let local = now.with_timezone(&Local);

    let mut tuple = Tuple::empty(desc.natts());
    tuple.set(desc, ATTR_SCOPED_FILE_URL, &format!("/{tablespace_name}/{relative_path}"))?;
    tuple.set(desc, ATTR_RELATIVE_PATH, relative_path)?;
    tuple.set(desc, ATTR_SIZE, &size.to_string())?;
    tuple.set(desc, ATTR_LAST_MODIFIED, &local.format(LAST_MODIFIED_FORMAT).to_string())?;
    Ok(tuple)
}

/// One stored metadata row of a directory table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRow {
    pub scoped_file_url: String,
    pub relative_path: String,
    pub size: i64,
    pub last_modified: String,
    pub md5: Option<String>,
    pub tag: Option<String>,
}

impl DirectoryRow {
    pub fn from_tuple(tuple: &Tuple) -> Result<Self> {
        let missing = |name: &str| invalid_parameter(format!("directory row has no {name}"));
        let size = match tuple.values.get(ATTR_SIZE) {
            Some(Some(Datum::Int8(size))) => *size,
            _ => return Err(missing("size")),
        };
        let last_modified = match tuple.values.get(ATTR_LAST_MODIFIED) {
            Some(Some(Datum::Timestamp(ts))) => ts.format(LAST_MODIFIED_FORMAT).to_string(),
            _ => return Err(missing("last_modified")),
        };
        Ok(Self {
            scoped_file_url: tuple
                .text(ATTR_SCOPED_FILE_URL)
                .ok_or_else(|| missing("scoped_file_url"))?
                .to_string(),
            relative_path: tuple
                .text(ATTR_RELATIVE_PATH)
                .ok_or_else(|| missing("relative_path"))?
                .to_string(),
            size,
            last_modified,
            md5: tuple.text(ATTR_MD5).map(str::to_string),
            tag: tuple.text(ATTR_TAG).map(str::to_string),
        })
    }

    #[must_use]
    pub fn with_tag(mut self, tag: Option<&str>) -> Self {
        self.tag = tag.map(str::to_string);
        self
    }
}
