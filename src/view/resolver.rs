//! Best-effort source-location enrichment for disassembled instructions.
//!
//! GDB does not annotate its disassembly with source lines over MI, but its
//! scripting surface can map addresses back to lines. The bridge installs
//! two convenience functions (see `scripts/gdb/locations.py`) and calls them
//! through `evaluate`. The variable-inspection protocol in between is string
//! oriented, so the helper emits base64 and this module reassembles the
//! payload from the char-by-char structured representation of the result.
//! The encoding contract is private to this module.

use crate::config::Settings;
use crate::dap::client::AdapterConn;
use crate::dap::protocol::{
    parse_memory_reference, EvaluateArguments, EvaluateResponse, Instruction, Source,
    VariablesArguments,
};
use crate::muted_error;
use anyhow::{anyhow, bail};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::session::{AdapterFlavor, Session};

/// GDB convenience function performing the bulk existence check.
const RESOLVE_FUNCTION: &str = "$resolve_locations";
/// GDB convenience function returning one collected location.
const LOOKUP_FUNCTION: &str = "$get_location";
/// Substring of the `print` output for a defined convenience function.
const INTERNAL_FUNCTION_MARKER: &str = "internal function";

/// Payload of a single [`LOOKUP_FUNCTION`] call. The helper renders every
/// field as a string.
#[derive(Debug, Deserialize)]
struct HelperLocation {
    pc: String,
    line: String,
    fullname: String,
    filename: String,
}

/// Location resolver backed by the GDB scripting bridge.
pub struct GdbLocationResolver {
    settings: Arc<Settings>,
}

impl GdbLocationResolver {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Enrich `instructions` with source lines and files where discoverable.
    ///
    /// Entries are never removed or reordered, only their location fields
    /// are filled in. A no-op unless resolution is enabled and `session`
    /// runs GDB behind an MI adapter. Lookup failures degrade to missing
    /// metadata, partial enrichment is expected.
    pub fn resolve(
        &self,
        conn: &mut dyn AdapterConn,
        session: &Session,
        frame_id: Option<i64>,
        instructions: &mut [Instruction],
    ) {
        if !self.settings.resolve_locations() || instructions.is_empty() {
            return;
        }
        if session.flavor != AdapterFlavor::CppDbg || session.mi_mode.as_deref() != Some("gdb") {
            return;
        }

        if muted_error!(self.ensure_helper(conn, frame_id)).is_none() {
            return;
        }

        let addresses = instructions
            .iter()
            .filter_map(|insn| parse_memory_reference(&insn.address))
            .collect_vec();
        if addresses.is_empty() {
            return;
        }
        let resolvable = self.resolvable_addresses(conn, frame_id, &addresses);

        for insn in instructions.iter_mut().filter(|i| i.location.is_none()) {
            let Some(addr) = parse_memory_reference(&insn.address) else {
                continue;
            };
            if !resolvable.contains(&addr) {
                continue;
            }
            let Some(found) = muted_error!(self.lookup(conn, frame_id, addr)) else {
                continue;
            };
            if parse_memory_reference(&found.pc) != Some(addr) {
                continue;
            }
            let Ok(line) = found.line.parse::<u32>() else {
                continue;
            };
            insn.line = Some(line);
            insn.end_line = Some(line);
            insn.location = Some(Source {
                name: Some(found.filename),
                path: Some(found.fullname),
            });
        }
    }

    fn eval(
        &self,
        conn: &mut dyn AdapterConn,
        frame_id: Option<i64>,
        expression: String,
    ) -> anyhow::Result<EvaluateResponse> {
        conn.evaluate(&EvaluateArguments {
            expression,
            context: "repl",
            frame_id,
        })
    }

    /// Install the helper script unless its functions are already defined.
    fn ensure_helper(
        &self,
        conn: &mut dyn AdapterConn,
        frame_id: Option<i64>,
    ) -> anyhow::Result<()> {
        let probe = self.eval(conn, frame_id, RESOLVE_FUNCTION.to_string())?;
        if !probe.result.contains(INTERNAL_FUNCTION_MARKER) {
            let script = self.settings.helper_script().display().to_string();
            self.eval(conn, frame_id, format!("-exec source {script}"))?;
        }
        Ok(())
    }

    /// Ask the backend which of `addresses` map exactly onto a known source
    /// line. Failures degrade to "none of them".
    fn resolvable_addresses(
        &self,
        conn: &mut dyn AdapterConn,
        frame_id: Option<i64>,
        addresses: &[u64],
    ) -> HashSet<u64> {
        let expression = format!("{RESOLVE_FUNCTION}({})", addresses.iter().join(","));
        let Some(payload) = muted_error!(self.call_helper(conn, frame_id, expression)) else {
            return HashSet::new();
        };
        let Some(resolved) = muted_error!(serde_json::from_slice::<Vec<u64>>(&payload)) else {
            return HashSet::new();
        };
        resolved.into_iter().collect()
    }

    fn lookup(
        &self,
        conn: &mut dyn AdapterConn,
        frame_id: Option<i64>,
        address: u64,
    ) -> anyhow::Result<HelperLocation> {
        let payload = self.call_helper(conn, frame_id, format!("{LOOKUP_FUNCTION}({address})"))?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Evaluate a helper expression and decode its base64 payload out of the
    /// structured result: each child of the result variable renders one byte
    /// as `N 'c'`, the character before the closing quote is the byte.
    fn call_helper(
        &self,
        conn: &mut dyn AdapterConn,
        frame_id: Option<i64>,
        expression: String,
    ) -> anyhow::Result<Vec<u8>> {
        let response = self.eval(conn, frame_id, expression)?;
        if response.variables_reference <= 0 {
            bail!("helper result has no structured representation");
        }
        let children = conn.variables(&VariablesArguments {
            variables_reference: response.variables_reference,
        })?;
        let encoded: String = children
            .variables
            .iter()
            .filter_map(|child| child.value.chars().rev().nth(1))
            .collect();
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|err| anyhow!("malformed helper payload: {err}"))
    }
}
