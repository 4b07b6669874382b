//! Stable Diffusion generation metadata embedded in PNG text chunks.
//!
//! Two writers are recognised:
//! - AUTOMATIC1111 stores a plain-text `parameters` chunk.
//! - ComfyUI stores its node graph as JSON in a `prompt` chunk.

use std::{fs, io::Cursor, path::Path};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, TaggerError};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const PARAMETERS_KEY: &str = "parameters";
const PROMPT_KEY: &str = "prompt";
const NEGATIVE_PREFIX: &str = "Negative prompt:";
const STEPS_PREFIX: &str = "Steps:";
/// Bound on link hops when resolving prompt text in a node graph.
const MAX_LINK_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Generator {
    #[serde(rename = "AUTOMATIC1111")]
    Automatic1111,
    #[serde(rename = "ComfyUI")]
    ComfyUi,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerInfo {
    pub name: Option<String>,
    pub parameters: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMetadata {
    pub generator: Generator,
    pub positive_prompt: Vec<String>,
    pub negative_prompt: Vec<String>,
    pub model: ModelInfo,
    pub samplers: Vec<SamplerInfo>,
}

/// Reads generation metadata from the image at `path`.
///
/// Returns `Ok(None)` for non-PNG files and for PNGs without recognisable
/// generation text.
pub fn read_generation_metadata<P: AsRef<Path>>(path: P) -> Result<Option<GenerationMetadata>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TaggerError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    if !bytes.starts_with(PNG_SIGNATURE) {
        tracing::debug!(path = %path.display(), "not a png, no metadata");
        return Ok(None);
    }

    let chunks = text_chunks(&bytes).map_err(|e| TaggerError::CorruptResource {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let lookup = |key: &str| {
        chunks
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, text)| text.as_str())
    };

    let metadata = match (lookup(PARAMETERS_KEY), lookup(PROMPT_KEY)) {
        (Some(parameters), _) => parse_a1111(parameters),
        (None, Some(prompt)) => parse_comfyui(prompt),
        (None, None) => None,
    };
    Ok(metadata)
}

/// All `tEXt`, `zTXt` and `iTXt` chunks as keyword/text pairs.
fn text_chunks(bytes: &[u8]) -> std::result::Result<Vec<(String, String)>, png::DecodingError> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info()?;
    let info = reader.info();

    let mut chunks: Vec<(String, String)> = info
        .uncompressed_latin1_text
        .iter()
        .map(|c| (c.keyword.clone(), c.text.clone()))
        .collect();
    for chunk in &info.compressed_latin1_text {
        chunks.push((chunk.keyword.clone(), chunk.get_text()?));
    }
    for chunk in &info.utf8_text {
        chunks.push((chunk.keyword.clone(), chunk.get_text()?));
    }
    Ok(chunks)
}

fn split_prompt(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits `key: value, key: "quoted, value"` into pairs.
fn parse_settings(line: &str) -> IndexMap<String, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);

    fields
        .iter()
        .filter_map(|field| field.split_once(':'))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Parses an AUTOMATIC1111 `parameters` text block.
pub fn parse_a1111(text: &str) -> Option<GenerationMetadata> {
    if text.trim().is_empty() {
        return None;
    }
    let lines: Vec<&str> = text.lines().collect();
    let steps_index = lines
        .iter()
        .rposition(|line| line.trim_start().starts_with(STEPS_PREFIX));
    let prompt_lines = &lines[..steps_index.unwrap_or(lines.len())];

    let negative_index = prompt_lines
        .iter()
        .position(|line| line.trim_start().starts_with(NEGATIVE_PREFIX));
    let (positive, negative) = match negative_index {
        Some(i) => {
            let first = &prompt_lines[i].trim_start()[NEGATIVE_PREFIX.len()..];
            let negative = std::iter::once(first)
                .chain(prompt_lines[i + 1..].iter().copied())
                .join("\n");
            (prompt_lines[..i].join("\n"), negative)
        }
        None => (prompt_lines.join("\n"), String::new()),
    };

    let mut model = ModelInfo::default();
    let mut samplers = Vec::new();
    if let Some(i) = steps_index {
        let mut settings = parse_settings(lines[i]);
        model.name = settings.shift_remove("Model");
        model.hash = settings.shift_remove("Model hash");
        let name = settings.shift_remove("Sampler");
        samplers.push(SamplerInfo {
            name,
            parameters: settings
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        });
    }

    Some(GenerationMetadata {
        generator: Generator::Automatic1111,
        positive_prompt: split_prompt(&positive),
        negative_prompt: split_prompt(&negative),
        model,
        samplers,
    })
}

/// Nodes of a ComfyUI graph, ordered by numeric id where possible.
fn ordered_nodes(graph: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut nodes: Vec<_> = graph.iter().collect();
    nodes.sort_by_key(|(id, _)| (id.parse::<u64>().unwrap_or(u64::MAX), (*id).clone()));
    nodes
}

fn class_type(node: &Value) -> &str {
    node.get("class_type").and_then(Value::as_str).unwrap_or("")
}

/// Follows a `[node_id, slot]` link to the text it carries.
fn linked_text(graph: &Map<String, Value>, link: &Value, depth: usize) -> Option<String> {
    if depth > MAX_LINK_DEPTH {
        return None;
    }
    let id = match link.get(0)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let inputs = graph.get(&id)?.get("inputs")?;
    match inputs.get("text")? {
        Value::String(text) => Some(text.clone()),
        next @ Value::Array(_) => linked_text(graph, next, depth + 1),
        _ => None,
    }
}

/// Parses a ComfyUI `prompt` graph.
pub fn parse_comfyui(text: &str) -> Option<GenerationMetadata> {
    let graph: Map<String, Value> = match serde_json::from_str(text) {
        Ok(graph) => graph,
        Err(e) => {
            tracing::debug!(error = %e, "prompt chunk is not a node graph");
            return None;
        }
    };
    let nodes = ordered_nodes(&graph);

    let model = ModelInfo {
        name: nodes
            .iter()
            .filter(|(_, node)| class_type(node).contains("CheckpointLoader"))
            .find_map(|(_, node)| node.get("inputs")?.get("ckpt_name")?.as_str())
            .map(str::to_string),
        hash: None,
    };

    let sampler_nodes: Vec<&Value> = nodes
        .iter()
        .map(|(_, node)| *node)
        .filter(|node| class_type(node).contains("KSampler"))
        .collect();
    if sampler_nodes.is_empty() && model.name.is_none() {
        return None;
    }

    let samplers = sampler_nodes
        .iter()
        .map(|node| {
            let inputs = node.get("inputs").and_then(Value::as_object);
            let name = inputs
                .and_then(|i| i.get("sampler_name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let parameters = inputs
                .into_iter()
                .flatten()
                .filter(|(key, value)| {
                    *key != "sampler_name" && !value.is_array() && !value.is_object()
                })
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            SamplerInfo { name, parameters }
        })
        .collect();

    let prompt = |input: &str| {
        sampler_nodes
            .first()
            .and_then(|node| node.get("inputs")?.get(input))
            .and_then(|link| linked_text(&graph, link, 0))
            .map(|text| split_prompt(&text))
            .unwrap_or_default()
    };

    Some(GenerationMetadata {
        generator: Generator::ComfyUi,
        positive_prompt: prompt("positive"),
        negative_prompt: prompt("negative"),
        model,
        samplers,
    })
}
