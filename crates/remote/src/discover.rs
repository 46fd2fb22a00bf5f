// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote environment discovery.
//!
//! Probes the connected host for Python interpreters (`which python`,
//! `conda env list`, common virtualenv locations), then asks each
//! candidate to import the runicorn package and report its version and
//! data root. Only candidates whose import succeeds and whose version
//! shares our major.minor are returned.

use crate::error::RemoteError;
use crate::transport::{ExecOutput, SshTransport, DEFAULT_RPC_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A usable interpreter on the remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonEnv {
    /// Display name (`base`, conda env name, or venv directory name).
    pub name: String,
    /// Interpreter path.
    pub python_path: String,
    /// Version of the runicorn package inside the env.
    pub version: String,
    /// Data root the remote service would use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_root: Option<String>,
    /// Where the candidate came from (`path`, `conda`, `venv`).
    pub kind: String,
}

/// Directories scanned for virtualenvs, relative to `$HOME`.
const VENV_DIRS: &[&str] = &[".virtualenvs", "venvs", ".venvs", "envs"];

/// One-liner executed inside each candidate interpreter.
pub fn import_probe() -> &'static str {
    concat!(
        "import json\n",
        "try:\n",
        "    import runicorn\n",
        "    print(json.dumps({'version': runicorn.__version__,",
        " 'data_root': getattr(runicorn, 'config_data_root', lambda: None)()}))\n",
        "except Exception:\n",
        "    raise SystemExit(3)\n",
    )
}

/// Candidate interpreter before probing.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub python_path: String,
    pub kind: String,
}

/// Parse `which python python3` output.
pub fn parse_which(output: &str) -> Vec<Candidate> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.starts_with('/'))
        .map(|path| Candidate {
            name: "base".to_string(),
            python_path: path.to_string(),
            kind: "path".to_string(),
        })
        .collect()
}

/// Parse `conda env list` output into (name, python path) candidates.
pub fn parse_conda_envs(output: &str) -> Vec<Candidate> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            // `name  *  /path/to/env` or `name  /path/to/env`
            let mut fields = line.split_whitespace().filter(|f| *f != "*");
            let name = fields.next()?;
            let prefix = fields.next()?;
            if !prefix.starts_with('/') {
                return None;
            }
            Some(Candidate {
                name: name.to_string(),
                python_path: format!("{prefix}/bin/python"),
                kind: "conda".to_string(),
            })
        })
        .collect()
}

/// Parse an `ls` of a venv container directory.
pub fn parse_venv_listing(base: &str, output: &str) -> Vec<Candidate> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|name| Candidate {
            name: name.to_string(),
            python_path: format!("{base}/{name}/bin/python"),
            kind: "venv".to_string(),
        })
        .collect()
}

/// Parse the probe's JSON line.
pub fn parse_probe_output(output: &ExecOutput) -> Option<(String, Option<String>)> {
    if !output.success() {
        return None;
    }
    #[derive(Deserialize)]
    struct Probe {
        version: String,
        data_root: Option<String>,
    }
    let line = output.stdout.lines().last()?.trim();
    let probe: Probe = serde_json::from_str(line).ok()?;
    Some((probe.version, probe.data_root))
}

/// Whether a remote package version can peer with ours.
///
/// Policy: identical major.minor.
pub fn version_compatible(local: &str, remote: &str) -> bool {
    fn major_minor(v: &str) -> Option<(u64, u64)> {
        let mut parts = v.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some((major, minor))
    }
    match (major_minor(local), major_minor(remote)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Run the full discovery over a connection.
pub async fn discover_environments(
    transport: &Arc<dyn SshTransport>,
) -> Result<Vec<PythonEnv>, RemoteError> {
    let mut candidates: Vec<Candidate> = Vec::new();

    let which = transport
        .exec("which python python3 2>/dev/null", DEFAULT_RPC_TIMEOUT)
        .await?;
    candidates.extend(parse_which(&which.stdout));

    let conda = transport
        .exec("conda env list 2>/dev/null", DEFAULT_RPC_TIMEOUT)
        .await?;
    candidates.extend(parse_conda_envs(&conda.stdout));

    for dir in VENV_DIRS {
        let listing = transport
            .exec(&format!("ls -1 \"$HOME/{dir}\" 2>/dev/null"), DEFAULT_RPC_TIMEOUT)
            .await?;
        if listing.success() {
            candidates.extend(parse_venv_listing(&format!("$HOME/{dir}"), &listing.stdout));
        }
    }

    candidates.dedup_by(|a, b| a.python_path == b.python_path);

    let local_version = env!("CARGO_PKG_VERSION");
    let mut environments = Vec::new();
    for candidate in candidates {
        let command = format!(
            "{} -c '{}'",
            candidate.python_path,
            import_probe().replace('\'', "'\\''")
        );
        let output = transport.exec(&command, DEFAULT_RPC_TIMEOUT).await?;
        let Some((version, data_root)) = parse_probe_output(&output) else {
            debug!(python = %candidate.python_path, "candidate lacks the package");
            continue;
        };
        if !version_compatible(local_version, &version) {
            debug!(
                python = %candidate.python_path,
                %version,
                local = local_version,
                "candidate version incompatible",
            );
            continue;
        }
        environments.push(PythonEnv {
            name: candidate.name,
            python_path: candidate.python_path,
            version,
            data_root,
            kind: candidate.kind,
        });
    }
    Ok(environments)
}

#[cfg(test)]
#[path = "discover_tests.rs"]
mod tests;
