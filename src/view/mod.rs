//! Disassembly window core: controller, session bookkeeping and the
//! source-location resolver.

pub mod controller;
pub mod resolver;
pub mod session;

use crate::dap::protocol::Instruction;

/// Sink for one-way notifications from the controller to the host.
///
/// The host renders the instruction list, moves the PC marker, shows error
/// messages and opens source documents; the controller never talks to the
/// screen directly.
pub trait ViewHook {
    /// Replace the displayed instruction window.
    fn update_instructions(&self, instructions: &[Instruction]);

    /// Move the program-counter marker to `address`.
    fn set_program_counter(&self, address: &str);

    /// Show a user-facing error message.
    fn report_error(&self, message: &str);

    /// Reveal a source document at a 1-based line.
    fn reveal_source(&self, path: &str, line: u32);
}

/// Inbound commands from the rendering side of the view.
#[derive(Debug, Clone)]
pub enum ViewCommand {
    Disassemble {
        memory_reference: String,
        instruction_offset: Option<i64>,
        instruction_count: i64,
    },
    /// Jump from an instruction back to its source line.
    GotoSource { path: String, end_line: u32 },
}

/// A cursor position inside a source document (1-based line).
#[derive(Debug, Clone)]
pub struct CursorLocation {
    pub path: String,
    pub line: u32,
}
