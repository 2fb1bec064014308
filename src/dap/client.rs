//! Client side of the adapter channel.
//!
//! [`DapClient`] pairs requests with responses by sequence number and queues
//! out-of-band events for the host to drain between operations. The view
//! core is written against the narrower [`AdapterConn`] seam so tests can
//! substitute a scripted fake.

use crate::dap::protocol::{
    DisassembleArguments, DisassembleResponse, EvaluateArguments, EvaluateResponse, Event,
    GotoTargetsArguments, GotoTargetsResponse, Request, Response, VariablesArguments,
    VariablesResponse,
};
use crate::dap::transport::DapTransport;
use anyhow::anyhow;
use serde_json::Value;
use std::collections::VecDeque;

/// Request/response channel into the debug adapter.
///
/// One call is one protocol round-trip: the implementation blocks until the
/// matching response arrives. A response with `success == false` is an error
/// carrying the adapter's diagnostic message.
pub trait AdapterConn {
    fn custom_request(&mut self, command: &str, arguments: Value) -> anyhow::Result<Value>;

    fn evaluate(&mut self, args: &EvaluateArguments) -> anyhow::Result<EvaluateResponse> {
        let body = self.custom_request("evaluate", serde_json::to_value(args)?)?;
        Ok(serde_json::from_value(body)?)
    }

    fn disassemble(&mut self, args: &DisassembleArguments) -> anyhow::Result<DisassembleResponse> {
        let body = self.custom_request("disassemble", serde_json::to_value(args)?)?;
        Ok(serde_json::from_value(body)?)
    }

    fn goto_targets(&mut self, args: &GotoTargetsArguments) -> anyhow::Result<GotoTargetsResponse> {
        let body = self.custom_request("gotoTargets", serde_json::to_value(args)?)?;
        Ok(serde_json::from_value(body)?)
    }

    fn variables(&mut self, args: &VariablesArguments) -> anyhow::Result<VariablesResponse> {
        let body = self.custom_request("variables", serde_json::to_value(args)?)?;
        Ok(serde_json::from_value(body)?)
    }
}

/// DAP client over an arbitrary transport.
pub struct DapClient<T: DapTransport> {
    transport: T,
    next_seq: i64,
    pending_events: VecDeque<Event>,
}

impl<T: DapTransport> DapClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_seq: 1,
            pending_events: VecDeque::new(),
        }
    }

    /// Send one request and return its sequence number.
    pub fn send_request(&mut self, command: &str, arguments: Value) -> anyhow::Result<i64> {
        let seq = self.next_seq;
        self.next_seq += 1;
        log::debug!(target: "dap", "-> {seq}: {command}");
        let request = Request {
            seq,
            r#type: "request",
            command: command.to_string(),
            arguments,
        };
        self.transport.write_message(&serde_json::to_value(&request)?)?;
        Ok(seq)
    }

    /// Block until the response for `request_seq` arrives. Events received
    /// in the meantime are queued, responses to other requests are dropped.
    pub fn read_response(&mut self, request_seq: i64) -> anyhow::Result<Response> {
        loop {
            let msg = self.transport.read_message()?;
            match msg.get("type").and_then(Value::as_str) {
                Some("event") => {
                    let event: Event = serde_json::from_value(msg)?;
                    log::debug!(target: "dap", "<- event: {}", event.event);
                    self.pending_events.push_back(event);
                }
                Some("response") => {
                    let response: Response = serde_json::from_value(msg)?;
                    if response.request_seq == request_seq {
                        return Ok(response);
                    }
                    log::warn!(
                        target: "dap",
                        "dropping response for unexpected request {}",
                        response.request_seq
                    );
                }
                _ => {}
            }
        }
    }

    /// Pop the next queued out-of-band event, if any.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.pending_events.pop_front()
    }

    /// Block until an event with the given name arrives. Events skipped on
    /// the way are discarded.
    pub fn wait_for_event(&mut self, name: &str) -> anyhow::Result<Event> {
        loop {
            if let Some(idx) = self.pending_events.iter().position(|e| e.event == name) {
                // Drain everything up to and including the match, the older
                // events are stale by now.
                self.pending_events.drain(..idx);
                return Ok(self
                    .pending_events
                    .pop_front()
                    .ok_or_else(|| anyhow!("event queue drained concurrently"))?);
            }
            let msg = self.transport.read_message()?;
            if msg.get("type").and_then(Value::as_str) == Some("event") {
                let event: Event = serde_json::from_value(msg)?;
                self.pending_events.push_back(event);
            }
        }
    }
}

impl<T: DapTransport> AdapterConn for DapClient<T> {
    fn custom_request(&mut self, command: &str, arguments: Value) -> anyhow::Result<Value> {
        let seq = self.send_request(command, arguments)?;
        let response = self.read_response(seq)?;
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| format!("`{}` request rejected", response.command));
            return Err(anyhow!(message));
        }
        Ok(response.body)
    }
}
