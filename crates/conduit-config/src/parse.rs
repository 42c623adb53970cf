//! Configuration parsing.
//!
//! Configuration arrives as bytes, a string, a path, an open file or any
//! reader, in one of the supported [`Format`]s. Every input is read fully so
//! the raw bytes can be returned alongside the decoded document.

use conduit_core::document::{Build, Format};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::ParseError;
use crate::render::{RenderContext, renderer_for};

/// Configuration input.
pub enum Source {
    Bytes(Vec<u8>),
    Str(String),
    Path(PathBuf),
    File(File),
    Reader(Box<dyn Read + Send>),
}

impl Source {
    /// A string that names an existing file is read from disk, anything else
    /// is treated as configuration content.
    pub fn detect(input: impl Into<String>) -> Source {
        let input = input.into();
        let path = Path::new(&input);
        if !input.contains('\n') && path.is_file() {
            Source::Path(path.to_path_buf())
        } else {
            Source::Str(input)
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>, ParseError> {
        match self {
            Source::Bytes(bytes) => Ok(bytes),
            Source::Str(s) => Ok(s.into_bytes()),
            Source::Path(path) => Ok(std::fs::read(path)?),
            Source::File(mut file) => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
            Source::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::Str(s.to_string())
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

/// A parsed configuration.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub build: Build,
    /// The configuration exactly as it was read.
    pub raw: Vec<u8>,
    /// Non-fatal findings, such as keys shadowed by a merge.
    pub warnings: Vec<String>,
}

/// Parses a format name, accepting the usual aliases.
pub fn parse_format(name: &str) -> Result<Format, ParseError> {
    name.parse()
        .map_err(|_| ParseError::UnknownFormat(name.to_string()))
}

/// Reads and decodes a configuration.
///
/// Templated formats are rendered with `ctx` first.
pub fn parse(source: Source, format: Format, ctx: &RenderContext) -> Result<Parsed, ParseError> {
    let raw = source.into_bytes()?;
    debug!(format = %format, bytes = raw.len(), "parsing configuration");

    let (build, warnings) = match renderer_for(format) {
        None => decode_yaml(&raw)?,
        Some(renderer) => {
            let source = String::from_utf8(raw.clone()).map_err(|e| ParseError::Decode {
                format,
                message: e.to_string(),
            })?;
            let rendered = renderer.render(&source, ctx)?;
            (rendered.build, rendered.warnings)
        }
    };

    Ok(Parsed {
        build,
        raw,
        warnings,
    })
}

/// Decodes a YAML document, applying `<<` merge keys.
pub fn decode_yaml(raw: &[u8]) -> Result<(Build, Vec<String>), ParseError> {
    let decode_err = |e: serde_yaml::Error| ParseError::Decode {
        format: Format::Yaml,
        message: e.to_string(),
    };

    let mut value: Value = serde_yaml::from_slice(raw).map_err(decode_err)?;
    if value.is_null() {
        return Ok((Build::default(), Vec::new()));
    }

    let mut warnings = Vec::new();
    collect_merge_warnings(&value, "", &mut warnings);
    value.apply_merge().map_err(decode_err)?;

    let build = serde_yaml::from_value(value).map_err(decode_err)?;
    Ok((build, warnings))
}

fn collect_merge_warnings(value: &Value, path: &str, warnings: &mut Vec<String>) {
    match value {
        Value::Mapping(map) => {
            if let Some(merge) = map.get("<<") {
                check_merge(map, merge, path, warnings);
            }
            for (key, child) in map {
                let key = key.as_str().unwrap_or("?");
                let child_path = if path.is_empty() {
                    key.to_string()
                } else {
                    format!("{path}.{key}")
                };
                collect_merge_warnings(child, &child_path, warnings);
            }
        }
        Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_merge_warnings(item, &format!("{path}[{i}]"), warnings);
            }
        }
        Value::Tagged(tagged) => collect_merge_warnings(&tagged.value, path, warnings),
        _ => {}
    }
}

fn check_merge(map: &Mapping, merge: &Value, path: &str, warnings: &mut Vec<String>) {
    let sources: Vec<&Mapping> = match merge {
        Value::Mapping(m) => vec![m],
        Value::Sequence(items) => items.iter().filter_map(Value::as_mapping).collect(),
        _ => Vec::new(),
    };
    let at = if path.is_empty() { "<root>" } else { path };

    let mut seen = BTreeSet::new();
    for source in sources {
        for key in source.keys().filter_map(Value::as_str) {
            if map.contains_key(key) {
                warnings.push(format!("{at}: key {key:?} overrides a merged value"));
            } else if !seen.insert(key.to_string()) {
                warnings.push(format!("{at}: duplicate key {key:?} in merged maps"));
            }
        }
    }
}
