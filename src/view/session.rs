use serde_json::Value;
use std::str::FromStr;
use strum_macros::EnumString;

/// Capability names the view core gates its operations on.
pub const SUPPORTS_DISASSEMBLE: &str = "supportsDisassembleRequest";
pub const SUPPORTS_GOTO_TARGETS: &str = "supportsGotoTargetsRequest";

/// Debuggee run state as reported by the adapter event stream.
///
/// The state is unknown until the first `stopped`/`continued` notification
/// arrives, and unknown is not stopped: disassembly stays forbidden.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Unknown,
    Running,
    Stopped,
}

/// Adapter flavor derived from the vendor string the host announces.
///
/// Only the two native-code adapter families get special treatment (window
/// alignment, PC pseudo registers); everything else is carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
pub enum AdapterFlavor {
    #[strum(serialize = "cppvsdbg")]
    VsDbg,
    #[strum(serialize = "cppdbg")]
    CppDbg,
    #[strum(default)]
    Other(String),
}

impl AdapterFlavor {
    pub fn from_type(adapter_type: &str) -> Self {
        AdapterFlavor::from_str(adapter_type)
            .unwrap_or_else(|_| AdapterFlavor::Other(adapter_type.to_string()))
    }
}

/// Backend-advertised booleans gating which operations are legal for a
/// session. Backed by the raw capability object from the initialize
/// response, unannounced capabilities read as `false`.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet(Value);

impl CapabilitySet {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn supports(&self, name: &str) -> bool {
        self.0.get(name).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// One active debuggee connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub flavor: AdapterFlavor,
    /// Underlying native-debugger mode from the launch configuration
    /// (`MIMode` for MI-based adapters).
    pub mi_mode: Option<String>,
    pub capabilities: CapabilitySet,
    pub run_state: RunState,
}

impl Session {
    pub fn new(id: String, adapter_type: &str, mi_mode: Option<String>) -> Self {
        Self {
            id,
            flavor: AdapterFlavor::from_type(adapter_type),
            mi_mode,
            capabilities: CapabilitySet::default(),
            run_state: RunState::default(),
        }
    }
}

/// Host notifications about adapter lifecycle and debuggee state.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A debuggee connection appeared and became the active one.
    Attached {
        id: String,
        adapter_type: String,
        mi_mode: Option<String>,
    },
    /// The adapter answered `initialize` with its capability object.
    Initialized { id: String, capabilities: Value },
    Stopped { id: String },
    Continued { id: String },
    /// The session ended, its capability entry must not leak into the next
    /// debuggee run.
    Terminated { id: String },
}
