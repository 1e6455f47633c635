//! XES process-mining log writer.
//!
//! Emissions are keyed by process id (one document per pid), process
//! instance id (one trace per piid) and, for events, an optional event id.
//! Emissions with the same key merge their attributes; an event emitted
//! without an id always starts a new event. Documents are written once, at
//! program end.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::{output_path, DataWriter, WriterError};
use crate::error::ExecutionError;
use crate::value::Value;

/// Attribute types supported by XES.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XesType {
    String,
    Date,
    Int,
    Float,
    Boolean,
}

impl XesType {
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "string" => Some(Self::String),
            "date" => Some(Self::Date),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Date => "date",
            Self::Int => "int",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for XesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A typed key/value pair with its value already rendered as XES text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XesAttribute {
    pub kind: XesType,
    pub key: String,
    pub value: String,
}

impl XesAttribute {
    /// Convert `value` into an attribute of type `kind`.
    ///
    /// Dates accept unix seconds or RFC 3339 text.
    pub fn from_value(kind: XesType, key: &str, value: &Value) -> Result<Self, ExecutionError> {
        let mismatch = || ExecutionError::type_mismatch(kind.to_string(), value.value_type().to_string());
        let rendered = match (kind, value) {
            (XesType::String, v) => v.to_string(),
            (XesType::Int, Value::Int(_) | Value::BigInt(_)) => value.to_string(),
            (XesType::Float, Value::Int(_) | Value::BigInt(_)) => value.to_string(),
            (XesType::Float, Value::Str(s)) => s
                .parse::<f64>()
                .map(|f| f.to_string())
                .map_err(|_| mismatch())?,
            (XesType::Boolean, Value::Bool(b)) => b.to_string(),
            (XesType::Date, Value::Int(secs)) => {
                let secs = i64::try_from(*secs).map_err(|_| mismatch())?;
                DateTime::<Utc>::from_timestamp(secs, 0)
                    .ok_or_else(mismatch)?
                    .to_rfc3339()
            }
            (XesType::Date, Value::Str(s)) => DateTime::parse_from_rfc3339(s)
                .map_err(|_| mismatch())?
                .to_rfc3339(),
            _ => return Err(mismatch()),
        };
        Ok(Self {
            kind,
            key: key.to_string(),
            value: rendered,
        })
    }
}

/// One XES emission, staged until its block commits.
#[derive(Debug, Clone)]
struct XesRecord {
    pid: String,
    piid: String,
    /// `None` for trace attributes, `Some(None)` for a new anonymous event.
    event: Option<Option<String>>,
    attributes: Vec<XesAttribute>,
}

#[derive(Debug, Default)]
struct Trace {
    attributes: IndexMap<String, XesAttribute>,
    events: Vec<Event>,
}

#[derive(Debug)]
struct Event {
    id: Option<String>,
    attributes: IndexMap<String, XesAttribute>,
}

#[derive(Debug, Default)]
pub struct XesWriter {
    folder: Option<PathBuf>,
    staged: Vec<XesRecord>,
    logs: IndexMap<String, IndexMap<String, Trace>>,
}

impl XesWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage attributes for the trace `(pid, piid)`.
    pub fn add_trace(&mut self, pid: String, piid: String, attributes: Vec<XesAttribute>) {
        self.staged.push(XesRecord {
            pid,
            piid,
            event: None,
            attributes,
        });
    }

    /// Stage an event under the trace `(pid, piid)`.
    pub fn add_event(
        &mut self,
        pid: String,
        piid: String,
        eid: Option<String>,
        attributes: Vec<XesAttribute>,
    ) {
        self.staged.push(XesRecord {
            pid,
            piid,
            event: Some(eid),
            attributes,
        });
    }

    fn commit(&mut self) {
        for record in self.staged.drain(..) {
            let trace = self
                .logs
                .entry(record.pid)
                .or_default()
                .entry(record.piid)
                .or_default();
            let target = match record.event {
                None => &mut trace.attributes,
                Some(eid) => {
                    let existing = eid
                        .as_ref()
                        .and_then(|id| trace.events.iter().position(|e| e.id.as_ref() == Some(id)));
                    let index = match existing {
                        Some(index) => index,
                        None => {
                            trace.events.push(Event {
                                id: eid,
                                attributes: IndexMap::new(),
                            });
                            trace.events.len() - 1
                        }
                    };
                    &mut trace.events[index].attributes
                }
            };
            for attribute in record.attributes {
                target.insert(attribute.key.clone(), attribute);
            }
        }
    }

    fn render(piid_traces: &IndexMap<String, Trace>) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n");
        out.push_str("<log xes.version=\"1.0\" xes.features=\"nested-attributes\">\n");
        out.push_str("  <extension name=\"Concept\" prefix=\"concept\" uri=\"http://www.xes-standard.org/concept.xesext\"/>\n");
        for (piid, trace) in piid_traces {
            out.push_str("  <trace>\n");
            push_attribute(&mut out, 4, XesType::String, "concept:name", piid);
            for attribute in trace.attributes.values() {
                push_attribute(&mut out, 4, attribute.kind, &attribute.key, &attribute.value);
            }
            for event in &trace.events {
                out.push_str("    <event>\n");
                if let Some(id) = &event.id {
                    push_attribute(&mut out, 6, XesType::String, "concept:instance", id);
                }
                for attribute in event.attributes.values() {
                    push_attribute(&mut out, 6, attribute.kind, &attribute.key, &attribute.value);
                }
                out.push_str("    </event>\n");
            }
            out.push_str("  </trace>\n");
        }
        out.push_str("</log>\n");
        out
    }
}

fn push_attribute(out: &mut String, indent: usize, kind: XesType, key: &str, value: &str) {
    out.push_str(&format!(
        "{:indent$}<{} key=\"{}\" value=\"{}\"/>\n",
        "",
        kind.tag(),
        escape(key),
        escape(value),
    ));
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[async_trait]
impl DataWriter for XesWriter {
    fn set_output_folder(&mut self, folder: &Path) {
        self.folder = Some(folder.to_path_buf());
    }

    fn start_block(&mut self, _block_number: u64) {}

    async fn end_block(&mut self) -> Result<(), WriterError> {
        self.commit();
        Ok(())
    }

    fn discard_block(&mut self) {
        self.staged.clear();
    }

    async fn end_program(&mut self) -> Result<(), WriterError> {
        self.commit();
        let mut failure = None;
        for (pid, traces) in std::mem::take(&mut self.logs) {
            let written = match output_path(self.folder.as_ref(), &pid, "xes") {
                Ok(path) => tokio::fs::write(&path, Self::render(&traces))
                    .await
                    .map(|()| path)
                    .map_err(WriterError::from),
                Err(err) => Err(err),
            };
            match written {
                Ok(path) => {
                    tracing::info!(pid = %pid, traces = traces.len(), path = %path.display(), "XES log written")
                }
                Err(err) => {
                    tracing::error!(pid = %pid, error = %err, "XES write failed");
                    failure.get_or_insert(err);
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}
