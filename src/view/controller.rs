//! The disassembly-window controller.
//!
//! Owns the request protocol against the debug adapter: which address range
//! to ask for, how to align a window to an instruction boundary when the
//! backend cannot, when a request is allowed at all, and what the view gets
//! to see of the result. The adapter channel itself is handed in by the
//! host per call, the controller only keeps session bookkeeping.

use crate::config::Settings;
use crate::dap::client::AdapterConn;
use crate::dap::protocol::{
    parse_memory_reference, same_memory_reference, DisassembleArguments, EvaluateArguments,
    GotoTargetsArguments, Source,
};
use crate::error::Error;
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::resolver::GdbLocationResolver;
use super::session::{
    AdapterFlavor, RunState, Session, SessionEvent, SUPPORTS_DISASSEMBLE, SUPPORTS_GOTO_TARGETS,
};
use super::{CursorLocation, ViewCommand, ViewHook};

/// Number of instructions fetched when probing for an aligned window start.
const ALIGN_PROBE_WINDOW: i64 = 8;
/// Program-counter pseudo registers, widest first.
const PC_REGISTERS: [&str; 2] = ["$rip", "$eip"];

/// Parameters of one user-initiated disassembly request.
#[derive(Debug, Clone)]
pub struct DisassembleRequest {
    /// Expression resolving to the address to center on (register, symbol
    /// or literal), in whatever base the debugger uses.
    pub memory_reference: String,
    /// Signed instruction offset, negative is before the address.
    pub instruction_offset: Option<i64>,
    pub instruction_count: i64,
}

/// Single-slot guard around the disassembly operation.
///
/// Acquired with a compare-and-swap before any adapter round-trip and
/// released when dropped, so every exit path (success, early return, error
/// propagation) frees the slot.
struct InFlightSlot(Arc<AtomicBool>);

impl InFlightSlot {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| InFlightSlot(flag.clone()))
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Controller of a disassembly window.
///
/// State machine of the in-flight slot: idle -> busy on entering
/// [`DisassemblyController::disassemble`], busy -> idle on emission,
/// alignment failure, expression failure or adapter error. A request
/// arriving while busy is dropped, not queued.
pub struct DisassemblyController<H: ViewHook> {
    sessions: IndexMap<String, Session>,
    active: Option<String>,
    /// Frame used to evaluate register and pseudo-variable expressions,
    /// learned from watch evaluations only.
    frame_id: Option<i64>,
    in_flight: Arc<AtomicBool>,
    settings: Arc<Settings>,
    resolver: GdbLocationResolver,
    hook: H,
}

impl<H: ViewHook> DisassemblyController<H> {
    pub fn new(settings: Arc<Settings>, hook: H) -> Self {
        Self {
            sessions: IndexMap::default(),
            active: None,
            frame_id: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            resolver: GdbLocationResolver::new(settings.clone()),
            settings,
            hook,
        }
    }

    /// Consume an adapter lifecycle notification. Stopped/continued updates
    /// are the sole source of truth for whether disassembly is permitted.
    pub fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Attached {
                id,
                adapter_type,
                mi_mode,
            } => {
                let session = Session::new(id.clone(), &adapter_type, mi_mode);
                self.sessions.insert(id.clone(), session);
                self.active = Some(id);
            }
            SessionEvent::Initialized { id, capabilities } => {
                let session = self
                    .sessions
                    .entry(id.clone())
                    .or_insert_with(|| Session::new(id, "", None));
                session.capabilities = super::session::CapabilitySet::new(capabilities);
            }
            SessionEvent::Stopped { id } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.run_state = RunState::Stopped;
                }
            }
            SessionEvent::Continued { id } => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.run_state = RunState::Running;
                }
            }
            SessionEvent::Terminated { id } => {
                self.sessions.shift_remove(&id);
                if self.active.as_deref() == Some(id.as_str()) {
                    self.active = None;
                }
            }
        }
    }

    /// Record the stack frame used for expression evaluation. Watch
    /// evaluations are the only place the host reveals the active frame,
    /// the controller has no access to the call stack itself.
    pub fn on_watch_evaluation(&mut self, frame_id: i64) {
        self.frame_id = Some(frame_id);
    }

    /// Dispatch an inbound view command, reporting failures to the user.
    pub fn on_view_command(&self, conn: &mut dyn AdapterConn, command: ViewCommand) {
        let result = match command {
            ViewCommand::Disassemble {
                memory_reference,
                instruction_offset,
                instruction_count,
            } => self.disassemble(
                conn,
                DisassembleRequest {
                    memory_reference,
                    instruction_offset,
                    instruction_count,
                },
            ),
            ViewCommand::GotoSource { path, end_line } => {
                self.hook.reveal_source(&path, end_line);
                Ok(())
            }
        };
        if let Err(err) = result {
            self.report(&err);
        }
    }

    /// Re-sync the PC marker when the view becomes visible again.
    pub fn on_view_visible(&self, conn: &mut dyn AdapterConn) {
        self.sync_program_counter(conn);
    }

    /// Jump from a source cursor into the disassembly window.
    ///
    /// Requires the adapter to support both goto-target queries and
    /// disassembly; fails without a single adapter call otherwise.
    pub fn request_goto_disassembly(
        &self,
        conn: &mut dyn AdapterConn,
        cursor: CursorLocation,
    ) -> Result<(), Error> {
        let session = self.active_session().ok_or(Error::NoActiveSession)?;
        if !session.capabilities.supports(SUPPORTS_GOTO_TARGETS) {
            return Err(Error::UnsupportedAdapter("gotoTargets"));
        }
        if !session.capabilities.supports(SUPPORTS_DISASSEMBLE) {
            return Err(Error::UnsupportedAdapter("disassemble"));
        }

        let response = conn
            .goto_targets(&GotoTargetsArguments {
                source: Source {
                    name: None,
                    path: Some(cursor.path),
                },
                line: cursor.line,
            })
            .map_err(Error::Adapter)?;
        let target = response
            .targets
            .into_iter()
            .find_map(|target| target.instruction_pointer_reference)
            .ok_or_else(|| {
                Error::Expression(format!("no instructions for line {}", cursor.line))
            })?;

        self.disassemble(
            conn,
            DisassembleRequest {
                memory_reference: target,
                instruction_offset: None,
                instruction_count: self.settings.goto_instruction_count(),
            },
        )
    }

    /// Fetch an instruction window around an address and push it to the
    /// view.
    ///
    /// The request is refused without any adapter interaction while there
    /// is no session, the adapter cannot disassemble, another request is
    /// still in flight or the debuggee is not stopped. The in-flight slot
    /// is held from before the first round-trip until the result is emitted
    /// or the operation fails.
    pub fn disassemble(
        &self,
        conn: &mut dyn AdapterConn,
        request: DisassembleRequest,
    ) -> Result<(), Error> {
        let session = self.active_session().ok_or(Error::NoActiveSession)?;
        if !session.capabilities.supports(SUPPORTS_DISASSEMBLE) {
            return Err(Error::UnsupportedAdapter("disassemble"));
        }
        let _slot = InFlightSlot::acquire(&self.in_flight).ok_or(Error::OperationInProgress)?;
        if session.run_state != RunState::Stopped {
            return Err(Error::TargetRunning);
        }

        // The requested reference is an expression, canonicalize it before
        // asking for instructions.
        let evaluated = conn
            .evaluate(&EvaluateArguments {
                expression: request.memory_reference,
                context: "repl",
                frame_id: self.frame_id,
            })
            .map_err(Error::Adapter)?;
        let Some(address) = evaluated.memory_reference else {
            return Err(Error::Expression(evaluated.result));
        };

        let numeric = parse_memory_reference(&address);
        let mut offset = request.instruction_offset.unwrap_or(0);
        if numeric == Some(0) && offset < 0 {
            // There is nothing before the null address.
            offset = 0;
        }

        if session.flavor == AdapterFlavor::VsDbg && offset < 0 {
            self.disassemble_aligned(conn, session, &address, numeric, request.instruction_count)?;
        } else {
            self.fetch_and_emit(conn, session, &address, offset, request.instruction_count)?;
        }

        self.sync_program_counter(conn);
        Ok(())
    }

    /// Negative-offset workaround: this backend does not align a negative
    /// instruction offset to instruction boundaries. Probe a small window
    /// ending at the target address and restart the real request, forward
    /// only, from one instruction earlier.
    fn disassemble_aligned(
        &self,
        conn: &mut dyn AdapterConn,
        session: &Session,
        address: &str,
        numeric: Option<u64>,
        instruction_count: i64,
    ) -> Result<(), Error> {
        let mut probe_count = ALIGN_PROBE_WINDOW;
        if let Some(addr) = numeric {
            // Close to the null address there are fewer bytes to look back
            // at.
            let room = addr as i64 - probe_count;
            if room < 0 {
                probe_count += room;
            }
        }

        let probe = conn
            .disassemble(&DisassembleArguments {
                memory_reference: address.to_string(),
                instruction_offset: -probe_count,
                instruction_count: probe_count + 1,
                resolve_symbols: Some(false),
            })
            .map_err(Error::Adapter)?;

        let aligned = probe
            .instructions
            .last()
            .is_some_and(|last| same_memory_reference(&last.address, address));
        let restart = probe
            .instructions
            .len()
            .checked_sub(2)
            .and_then(|idx| probe.instructions.get(idx));
        match (aligned, restart) {
            (true, Some(restart)) => {
                let restart = restart.address.clone();
                self.fetch_and_emit(conn, session, &restart, 0, instruction_count)
            }
            _ => Err(Error::AddressAlignment),
        }
    }

    /// One disassembly round-trip, location enrichment, emission.
    fn fetch_and_emit(
        &self,
        conn: &mut dyn AdapterConn,
        session: &Session,
        memory_reference: &str,
        instruction_offset: i64,
        instruction_count: i64,
    ) -> Result<(), Error> {
        let mut response = conn
            .disassemble(&DisassembleArguments {
                memory_reference: memory_reference.to_string(),
                instruction_offset,
                instruction_count,
                resolve_symbols: None,
            })
            .map_err(Error::Adapter)?;

        self.resolver
            .resolve(conn, session, self.frame_id, &mut response.instructions);
        self.hook.update_instructions(&response.instructions);
        Ok(())
    }

    /// Best-effort PC marker refresh.
    ///
    /// Meaningful only for machine-level adapters; the MI family has to run
    /// GDB underneath, other MI backends do not expose the pseudo
    /// registers. Evaluates the 64-bit register first and falls back to the
    /// 32-bit one on targets without it. Failures are reported to the user
    /// but never touch the in-flight slot.
    pub fn sync_program_counter(&self, conn: &mut dyn AdapterConn) {
        let Some(session) = self.active_session() else {
            return;
        };
        let supported = match &session.flavor {
            AdapterFlavor::VsDbg => true,
            AdapterFlavor::CppDbg => session.mi_mode.as_deref() == Some("gdb"),
            AdapterFlavor::Other(_) => false,
        };
        if !supported {
            return;
        }

        for register in PC_REGISTERS {
            match conn.evaluate(&EvaluateArguments {
                expression: register.to_string(),
                context: "repl",
                frame_id: self.frame_id,
            }) {
                Ok(response) => {
                    if let Some(pc) = response.memory_reference {
                        self.hook.set_program_counter(&pc);
                        return;
                    }
                    // No canonical reference means the register does not
                    // exist on this target, try the narrower one.
                }
                Err(err) => {
                    self.hook.report_error(&format!("{err:#}"));
                    return;
                }
            }
        }
    }

    fn active_session(&self) -> Option<&Session> {
        self.active.as_ref().and_then(|id| self.sessions.get(id))
    }

    fn report(&self, err: &Error) {
        if err.is_user_visible() {
            self.hook.report_error(&err.to_string());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dap::protocol::Instruction;
    use anyhow::anyhow;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const SESSION: &str = "s1";

    struct ScriptedConn {
        responses: VecDeque<Value>,
        calls: Vec<(String, Value)>,
    }

    impl ScriptedConn {
        fn new(responses: impl IntoIterator<Item = Value>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                calls: vec![],
            }
        }

        fn commands(&self) -> Vec<&str> {
            self.calls.iter().map(|(cmd, _)| cmd.as_str()).collect()
        }
    }

    impl AdapterConn for ScriptedConn {
        fn custom_request(&mut self, command: &str, arguments: Value) -> anyhow::Result<Value> {
            self.calls.push((command.to_string(), arguments));
            self.responses
                .pop_front()
                .ok_or_else(|| anyhow!("unexpected `{command}` request"))
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        updates: RefCell<Vec<Vec<Instruction>>>,
        pcs: RefCell<Vec<String>>,
        errors: RefCell<Vec<String>>,
        reveals: RefCell<Vec<(String, u32)>>,
    }

    impl ViewHook for RecordingHook {
        fn update_instructions(&self, instructions: &[Instruction]) {
            self.updates.borrow_mut().push(instructions.to_vec());
        }

        fn set_program_counter(&self, address: &str) {
            self.pcs.borrow_mut().push(address.to_string());
        }

        fn report_error(&self, message: &str) {
            self.errors.borrow_mut().push(message.to_string());
        }

        fn reveal_source(&self, path: &str, line: u32) {
            self.reveals.borrow_mut().push((path.to_string(), line));
        }
    }

    fn controller(
        adapter_type: &str,
        mi_mode: Option<&str>,
        capabilities: Value,
    ) -> DisassemblyController<RecordingHook> {
        let mut controller =
            DisassemblyController::new(Arc::new(Settings::default()), RecordingHook::default());
        controller.on_session_event(SessionEvent::Attached {
            id: SESSION.to_string(),
            adapter_type: adapter_type.to_string(),
            mi_mode: mi_mode.map(ToString::to_string),
        });
        controller.on_session_event(SessionEvent::Initialized {
            id: SESSION.to_string(),
            capabilities,
        });
        controller.on_session_event(SessionEvent::Stopped {
            id: SESSION.to_string(),
        });
        controller
    }

    fn disasm_caps() -> Value {
        json!({"supportsDisassembleRequest": true, "supportsGotoTargetsRequest": true})
    }

    fn instructions_body(addresses: &[&str]) -> Value {
        let instructions: Vec<Value> = addresses
            .iter()
            .map(|addr| json!({"address": addr, "instruction": "nop"}))
            .collect();
        json!({ "instructions": instructions })
    }

    fn request(memory_reference: &str, offset: Option<i64>, count: i64) -> DisassembleRequest {
        DisassembleRequest {
            memory_reference: memory_reference.to_string(),
            instruction_offset: offset,
            instruction_count: count,
        }
    }

    #[test]
    fn test_capability_entry_lifecycle() {
        let mut controller = controller("cppdbg", None, disasm_caps());
        assert!(controller.sessions.contains_key(SESSION));
        assert!(controller
            .active_session()
            .expect("should be active")
            .capabilities
            .supports(SUPPORTS_DISASSEMBLE));

        controller.on_session_event(SessionEvent::Terminated {
            id: SESSION.to_string(),
        });
        assert!(controller.sessions.is_empty());
        assert!(controller.active_session().is_none());
    }

    #[test]
    fn test_no_active_session() {
        let controller = DisassemblyController::new(
            Arc::new(Settings::default()),
            RecordingHook::default(),
        );
        let mut conn = ScriptedConn::new([]);

        let err = controller
            .disassemble(&mut conn, request("0x1000", None, 8))
            .expect_err("should fail");
        assert!(matches!(err, Error::NoActiveSession));
        assert!(conn.calls.is_empty());
    }

    #[test]
    fn test_unsupported_adapter() {
        let controller = controller("cppdbg", None, json!({}));
        let mut conn = ScriptedConn::new([]);

        let err = controller
            .disassemble(&mut conn, request("0x1000", None, 8))
            .expect_err("should fail");
        assert!(matches!(err, Error::UnsupportedAdapter("disassemble")));
        assert!(conn.calls.is_empty());
    }

    #[test]
    fn test_second_request_dropped_silently() {
        let controller = controller("cppdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([]);

        controller.in_flight.store(true, Ordering::Release);
        controller.on_view_command(
            &mut conn,
            ViewCommand::Disassemble {
                memory_reference: "0x1000".to_string(),
                instruction_offset: None,
                instruction_count: 8,
            },
        );

        // No adapter call, no update, no user-visible error.
        assert!(conn.calls.is_empty());
        assert!(controller.hook.updates.borrow().is_empty());
        assert!(controller.hook.errors.borrow().is_empty());
        // The foreign slot owner is still in charge.
        assert!(controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_target_running() {
        let mut controller = controller("cppdbg", None, disasm_caps());
        controller.on_session_event(SessionEvent::Continued {
            id: SESSION.to_string(),
        });
        let mut conn = ScriptedConn::new([]);

        let err = controller
            .disassemble(&mut conn, request("0x1000", None, 8))
            .expect_err("should fail");
        assert!(matches!(err, Error::TargetRunning));
        assert!(conn.calls.is_empty());
        // The slot was released on the early return.
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_run_state_initially_unknown() {
        let mut controller =
            DisassemblyController::new(Arc::new(Settings::default()), RecordingHook::default());
        controller.on_session_event(SessionEvent::Attached {
            id: SESSION.to_string(),
            adapter_type: "cppdbg".to_string(),
            mi_mode: None,
        });
        controller.on_session_event(SessionEvent::Initialized {
            id: SESSION.to_string(),
            capabilities: disasm_caps(),
        });
        let mut conn = ScriptedConn::new([]);

        let err = controller
            .disassemble(&mut conn, request("0x1000", None, 8))
            .expect_err("should fail");
        assert!(matches!(err, Error::TargetRunning));
    }

    #[test]
    fn test_expression_error() {
        let controller = controller("cppdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            // evaluation succeeds but yields no canonical reference
            json!({"result": "No symbol \"foo\" in current context."}),
        ]);

        let err = controller
            .disassemble(&mut conn, request("foo", None, 8))
            .expect_err("should fail");
        match err {
            Error::Expression(diag) => {
                assert_eq!(diag, "No symbol \"foo\" in current context.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(conn.commands(), vec!["evaluate"]);
        assert!(controller.hook.updates.borrow().is_empty());
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_null_address_offset_clamped() {
        let controller = controller("cppdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            json!({"result": "0", "memoryReference": "0"}),
            instructions_body(&["0x0", "0x4"]),
        ]);

        controller
            .disassemble(&mut conn, request("0", Some(-4), 8))
            .expect("should disassemble");

        assert_eq!(conn.commands(), vec!["evaluate", "disassemble"]);
        assert_eq!(
            conn.calls[1].1,
            json!({"memoryReference": "0", "instructionOffset": 0, "instructionCount": 8})
        );
        assert_eq!(controller.hook.updates.borrow().len(), 1);
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_direct_path_keeps_negative_offset() {
        let controller = controller("cppdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            json!({"result": "...", "memoryReference": "0x1000"}),
            instructions_body(&["0xff0", "0x1000"]),
        ]);

        controller
            .disassemble(&mut conn, request("$pc", Some(-4), 16))
            .expect("should disassemble");

        assert_eq!(
            conn.calls[1].1,
            json!({"memoryReference": "0x1000", "instructionOffset": -4, "instructionCount": 16})
        );
    }

    #[test]
    fn test_alignment_probe_success() {
        let controller = controller("cppvsdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            json!({"result": "...", "memoryReference": "0x1000"}),
            // probe window ending at the target address
            instructions_body(&[
                "0xfe0", "0xfe4", "0xfe8", "0xfec", "0xff0", "0xff4", "0xff8", "0xffc", "0x1000",
            ]),
            // final forward-only window
            instructions_body(&["0xffc", "0x1000", "0x1004"]),
            // PC sync after the successful emission
            json!({"result": "...", "memoryReference": "0x1000"}),
        ]);

        controller
            .disassemble(&mut conn, request("$pc", Some(-4), 16))
            .expect("should disassemble");

        assert_eq!(
            conn.commands(),
            vec!["evaluate", "disassemble", "disassemble", "evaluate"]
        );
        assert_eq!(
            conn.calls[1].1,
            json!({
                "memoryReference": "0x1000",
                "instructionOffset": -8,
                "instructionCount": 9,
                "resolveSymbols": false,
            })
        );
        // Restarted from the probe's second-to-last instruction, forward
        // only.
        assert_eq!(
            conn.calls[2].1,
            json!({"memoryReference": "0xffc", "instructionOffset": 0, "instructionCount": 16})
        );
        assert_eq!(controller.hook.updates.borrow().len(), 1);
        assert_eq!(controller.hook.pcs.borrow().as_slice(), ["0x1000"]);
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_alignment_probe_shrinks_near_null() {
        let controller = controller("cppvsdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            json!({"result": "3", "memoryReference": "3"}),
            instructions_body(&["0x0", "0x1", "0x2", "0x3"]),
            instructions_body(&["0x2", "0x3"]),
            json!({"result": "..."}),
            json!({"result": "..."}),
        ]);

        controller
            .disassemble(&mut conn, request("3", Some(-4), 8))
            .expect("should disassemble");

        // Only 3 bytes exist before the address, the probe shrinks to them.
        assert_eq!(
            conn.calls[1].1,
            json!({
                "memoryReference": "3",
                "instructionOffset": -3,
                "instructionCount": 4,
                "resolveSymbols": false,
            })
        );
    }

    #[test]
    fn test_alignment_probe_mismatch() {
        let controller = controller("cppvsdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            json!({"result": "...", "memoryReference": "0x1000"}),
            // the probe window does not end at the requested address
            instructions_body(&["0xfe1", "0xfe5", "0xffe", "0x1002"]),
        ]);

        let err = controller
            .disassemble(&mut conn, request("$pc", Some(-4), 16))
            .expect_err("should fail");
        assert!(matches!(err, Error::AddressAlignment));
        // No further adapter call, nothing displayed.
        assert_eq!(conn.commands(), vec!["evaluate", "disassemble"]);
        assert!(controller.hook.updates.borrow().is_empty());
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_adapter_error_releases_slot() {
        let controller = controller("cppdbg", None, disasm_caps());
        // The scripted queue is empty: the first round-trip fails.
        let mut conn = ScriptedConn::new([]);

        let err = controller
            .disassemble(&mut conn, request("$pc", None, 8))
            .expect_err("should fail");
        assert!(matches!(err, Error::Adapter(_)));
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_goto_disassembly_requires_capabilities() {
        let controller = controller("cppdbg", None, json!({"supportsDisassembleRequest": false}));
        let mut conn = ScriptedConn::new([]);

        let err = controller
            .request_goto_disassembly(
                &mut conn,
                CursorLocation {
                    path: "/src/app.c".to_string(),
                    line: 12,
                },
            )
            .expect_err("should fail");
        assert!(matches!(err, Error::UnsupportedAdapter(_)));
        assert!(conn.calls.is_empty());
    }

    #[test]
    fn test_goto_disassembly_resolves_target() {
        let controller = controller("cppdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([
            json!({"targets": [{"id": 1, "label": "app.c:12", "line": 12, "instructionPointerReference": "0x4be0"}]}),
            json!({"result": "...", "memoryReference": "0x4be0"}),
            instructions_body(&["0x4be0", "0x4be4"]),
        ]);

        controller
            .request_goto_disassembly(
                &mut conn,
                CursorLocation {
                    path: "/src/app.c".to_string(),
                    line: 12,
                },
            )
            .expect("should disassemble");

        assert_eq!(conn.commands(), vec!["gotoTargets", "evaluate", "disassemble"]);
        assert_eq!(
            conn.calls[0].1,
            json!({"source": {"path": "/src/app.c"}, "line": 12})
        );
        let settings = Settings::default();
        assert_eq!(
            conn.calls[2].1["instructionCount"],
            json!(settings.goto_instruction_count())
        );
        assert_eq!(controller.hook.updates.borrow().len(), 1);
    }

    #[test]
    fn test_pc_sync_falls_back_to_narrow_register() {
        let mut controller = controller("cppdbg", Some("gdb"), disasm_caps());
        controller.on_watch_evaluation(2);
        let mut conn = ScriptedConn::new([
            // $rip yields no reference on a 32-bit target
            json!({"result": "void"}),
            json!({"result": "...", "memoryReference": "0x8048000"}),
        ]);

        controller.sync_program_counter(&mut conn);

        assert_eq!(conn.commands(), vec!["evaluate", "evaluate"]);
        assert_eq!(conn.calls[0].1["expression"], json!("$rip"));
        assert_eq!(conn.calls[0].1["frameId"], json!(2));
        assert_eq!(conn.calls[1].1["expression"], json!("$eip"));
        assert_eq!(controller.hook.pcs.borrow().as_slice(), ["0x8048000"]);
    }

    #[test]
    fn test_pc_sync_noop_for_foreign_backends() {
        let mut conn = ScriptedConn::new([]);

        let foreign = controller("cppdbg", Some("lldb"), disasm_caps());
        foreign.sync_program_counter(&mut conn);
        assert!(conn.calls.is_empty());

        let mock = controller("mock", None, disasm_caps());
        mock.sync_program_counter(&mut conn);
        assert!(conn.calls.is_empty());
    }

    #[test]
    fn test_pc_sync_failure_reported_not_fatal() {
        let controller = controller("cppvsdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([]);

        controller.sync_program_counter(&mut conn);

        assert_eq!(controller.hook.errors.borrow().len(), 1);
        assert!(!controller.in_flight.load(Ordering::Acquire));
    }

    #[test]
    fn test_goto_source_forwarded_to_host() {
        let controller = controller("cppdbg", None, disasm_caps());
        let mut conn = ScriptedConn::new([]);

        controller.on_view_command(
            &mut conn,
            ViewCommand::GotoSource {
                path: "/src/app.c".to_string(),
                end_line: 42,
            },
        );

        assert_eq!(
            controller.hook.reveals.borrow().as_slice(),
            [("/src/app.c".to_string(), 42)]
        );
        assert!(conn.calls.is_empty());
    }
}
