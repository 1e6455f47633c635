use crate::accessor::ValueAccessor;
use crate::error::ExecutionError;
use crate::state::RunState;
use crate::writers::{HttpRequest, XesAttribute, XesType};

/// A typed XES attribute read from an accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XesParameter {
    pub name: String,
    pub kind: XesType,
    pub value: ValueAccessor,
}

impl XesParameter {
    pub fn new(name: &str, kind: XesType, value: ValueAccessor) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value,
        }
    }
}

/// Hands one row of evaluated values to a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    Csv {
        table: String,
        columns: Vec<(String, ValueAccessor)>,
    },
    /// Values concatenated into a single line.
    Log(Vec<ValueAccessor>),
    XesTrace {
        pid: ValueAccessor,
        piid: ValueAccessor,
        parameters: Vec<XesParameter>,
    },
    XesEvent {
        pid: ValueAccessor,
        piid: ValueAccessor,
        eid: Option<ValueAccessor>,
        parameters: Vec<XesParameter>,
    },
    Http {
        uri: ValueAccessor,
        fields: Vec<(String, ValueAccessor)>,
    },
}

fn text(accessor: &ValueAccessor, state: &RunState) -> Result<String, ExecutionError> {
    Ok(accessor.get_value(state)?.to_string())
}

fn named_texts(
    fields: &[(String, ValueAccessor)],
    state: &RunState,
) -> Result<Vec<(String, String)>, ExecutionError> {
    fields
        .iter()
        .map(|(name, accessor)| -> Result<_, ExecutionError> { Ok((name.clone(), text(accessor, state)?)) })
        .collect()
}

fn attributes(parameters: &[XesParameter], state: &RunState) -> Result<Vec<XesAttribute>, ExecutionError> {
    parameters
        .iter()
        .map(|p| XesAttribute::from_value(p.kind, &p.name, &p.value.get_value(state)?))
        .collect()
}

impl Emission {
    /// Evaluate every value first, so a failing accessor emits nothing.
    pub(crate) fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        match self {
            Self::Csv { table, columns } => {
                let row = named_texts(columns, state)?;
                state.writers_mut().csv().add_row(table, row)?;
            }
            Self::Log(values) => {
                let line = values
                    .iter()
                    .map(|accessor| text(accessor, state))
                    .collect::<Result<String, _>>()?;
                state.writers_mut().log().add_line(line);
            }
            Self::XesTrace { pid, piid, parameters } => {
                let (pid, piid) = (text(pid, state)?, text(piid, state)?);
                let attributes = attributes(parameters, state)?;
                state.writers_mut().xes().add_trace(pid, piid, attributes);
            }
            Self::XesEvent {
                pid,
                piid,
                eid,
                parameters,
            } => {
                let (pid, piid) = (text(pid, state)?, text(piid, state)?);
                let eid = eid.as_ref().map(|eid| text(eid, state)).transpose()?;
                let attributes = attributes(parameters, state)?;
                state.writers_mut().xes().add_event(pid, piid, eid, attributes);
            }
            Self::Http { uri, fields } => {
                let uri = text(uri, state)?;
                let request = HttpRequest::new(uri, named_texts(fields, state)?);
                state.writers_mut().http().add_request(request);
            }
        }
        Ok(())
    }
}
