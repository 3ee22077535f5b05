//! External constraint-programming process port.
//!
//! The wave balancer needs true integer/boolean semantics at a scale
//! the LP relaxation path is not built for, so its models are handed to
//! an external CP process: the request is serialized JSON on the
//! child's stdin, the response is one JSON object on its stdout, with
//! variable values flattened beside the status fields.
//!
//! The call is wrapped in a caller-supplied timeout and the child is
//! killed when the future is dropped, so a stuck solver cannot hang
//! the pipeline.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{SolveError, SolveResult};
use crate::model::{Model, Solution};

/// Default wall-clock budget; the external solver caps itself at five
/// minutes, so anything beyond that is a hang.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(320);

/// Handle to an external CP solver executable.
#[derive(Debug, Clone)]
pub struct CpProcess {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

/// Wire shape of the child's stdout. Variable values arrive as
/// top-level fields next to the status fields.
#[derive(Debug, Deserialize)]
struct CpResponse {
    feasible: bool,
    #[serde(default)]
    status: String,
    #[serde(default)]
    result: Option<f64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    values: BTreeMap<String, f64>,
}

impl CpProcess {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one solve. Launch failure, timeout, non-zero exit, and
    /// malformed output are all hard failures; an infeasible model is
    /// a normal `Solution` with `feasible = false`.
    pub async fn solve(&self, model: &Model) -> SolveResult<Solution> {
        let payload = serde_json::to_vec(model)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SolveError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        debug!(
            program = %self.program,
            variables = model.variable_count(),
            "cp solve dispatched"
        );

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SolveError::Timeout(self.timeout))??;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            // The solver reports its own failures as an error field on
            // stdout before exiting non-zero; prefer that message.
            let detail = match serde_json::from_slice::<CpResponse>(&output.stdout) {
                Ok(resp) => resp.error.unwrap_or_else(|| stderr.trim().to_string()),
                Err(_) => stderr.trim().to_string(),
            };
            return Err(SolveError::ProcessFailed { code, detail });
        }

        let response: CpResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| SolveError::Malformed(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(SolveError::Solver(error));
        }

        Ok(Solution {
            feasible: response.feasible,
            status: response.status,
            objective: response.result.unwrap_or(0.0),
            values: response.values.into_iter().collect(),
        })
    }
}
