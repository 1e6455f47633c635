use std::path::Path;

use crate::accessor::{ValueAccessor, ValueMutator};
use crate::chain::ChainError;
use crate::error::ExecutionError;
use crate::methods::Method;
use crate::state::RunState;
use crate::writers::WriterError;

/// `target = value`
#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: ValueMutator,
    pub value: ValueAccessor,
}

impl Assignment {
    pub(crate) fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        let value = self.value.get_value(state)?;
        self.target.set_value(state, value);
        Ok(())
    }
}

/// Calls a built-in, optionally storing the result.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: Method,
    pub args: Vec<ValueAccessor>,
    pub target: Option<ValueMutator>,
}

impl MethodCall {
    pub(crate) fn execute(&self, state: &mut RunState) -> Result<(), ExecutionError> {
        let args = self
            .args
            .iter()
            .map(|arg| arg.get_value(state))
            .collect::<Result<Vec<_>, _>>()?;
        let result = self.method.invoke(&args)?;
        if let Some(target) = &self.target {
            target.set_value(state, result);
        }
        Ok(())
    }
}

pub(super) async fn set_output_folder(state: &mut RunState, folder: &Path) -> Result<(), ExecutionError> {
    tokio::fs::create_dir_all(folder)
        .await
        .map_err(WriterError::from)?;
    state.writers_mut().set_output_folder(folder);
    Ok(())
}

/// Replace the run's chain source. Without a connector an already attached
/// source is kept.
pub(super) async fn connect(state: &mut RunState, url: &str) -> Result<(), ExecutionError> {
    match state.connector() {
        Some(connector) => {
            let chain = connector.connect(url).await?;
            tracing::info!(url = %url, "Connected to chain");
            state.set_chain(chain);
            Ok(())
        }
        None if state.chain().is_ok() => {
            tracing::debug!(url = %url, "No connector configured, keeping attached chain source");
            Ok(())
        }
        None => Err(ChainError::NotConnected.into()),
    }
}
