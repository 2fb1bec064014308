//! Interactive driver for the disassembly view core.
//!
//! Connects to a running DAP server over TCP, performs the initialize
//! handshake and exposes the view operations as line commands. Intended for
//! poking at adapters and for manual testing, not as a full debugger
//! front-end.

use anyhow::Context;
use asmview::config::Settings;
use asmview::dap::client::{AdapterConn, DapClient};
use asmview::dap::protocol::Instruction;
use asmview::dap::transport::TcpTransport;
use asmview::view::controller::DisassemblyController;
use asmview::view::session::SessionEvent;
use asmview::view::{CursorLocation, ViewCommand, ViewHook};
use clap::Parser;
use serde_json::json;
use std::io::{BufRead, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;

const SESSION_ID: &str = "tcp-session";
const DEFAULT_WINDOW: i64 = 32;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of a running DAP server (default: 127.0.0.1:4711)
    #[clap(long, default_value = "127.0.0.1:4711")]
    connect: String,

    /// Settings file (default: ~/.config/asmview/config.toml).
    #[clap(long)]
    config: Option<String>,

    /// Adapter flavor to announce (cppdbg, cppvsdbg, ...).
    #[clap(long, default_value = "cppdbg")]
    adapter: String,

    /// Underlying native-debugger mode of the adapter, if any.
    #[clap(long)]
    mi_mode: Option<String>,
}

/// Prints view notifications straight to the terminal.
struct StdoutView;

impl ViewHook for StdoutView {
    fn update_instructions(&self, instructions: &[Instruction]) {
        for insn in instructions {
            match &insn.location {
                Some(location) => println!(
                    "{:<18} {:<40} ; {}:{}",
                    insn.address,
                    insn.instruction,
                    location.name.as_deref().unwrap_or("?"),
                    insn.line.unwrap_or(0),
                ),
                None => println!("{:<18} {}", insn.address, insn.instruction),
            }
        }
    }

    fn set_program_counter(&self, address: &str) {
        println!("pc = {address}");
    }

    fn report_error(&self, message: &str) {
        eprintln!("error: {message}");
    }

    fn reveal_source(&self, path: &str, line: u32) {
        println!("source = {path}:{line}");
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Arc::new(
        Settings::from_file(args.config.as_deref().map(Path::new)).unwrap_or_default(),
    );

    let addr: SocketAddr = args.connect.parse().context("Invalid connect address")?;
    let stream = TcpStream::connect(addr).with_context(|| format!("connect {addr}"))?;
    let transport = TcpTransport::new(stream, settings.read_timeout())?;
    let mut client = DapClient::new(transport);
    log::info!(target: "dap", "connected to {addr}");

    let mut controller = DisassemblyController::new(settings, StdoutView);
    controller.on_session_event(SessionEvent::Attached {
        id: SESSION_ID.to_string(),
        adapter_type: args.adapter,
        mi_mode: args.mi_mode,
    });

    let capabilities = client.custom_request(
        "initialize",
        json!({
            "clientID": "amv",
            "adapterID": "amv",
            "linesStartAt1": true,
            "columnsStartAt1": true,
        }),
    )?;
    controller.on_session_event(SessionEvent::Initialized {
        id: SESSION_ID.to_string(),
        capabilities,
    });

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("(amv) ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("d") | Some("disasm") => {
                let Some(expression) = parts.next() else {
                    eprintln!("usage: d <expression> [offset] [count]");
                    continue;
                };
                let instruction_offset = parts.next().and_then(|s| s.parse().ok());
                let instruction_count = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WINDOW);
                controller.on_view_command(
                    &mut client,
                    ViewCommand::Disassemble {
                        memory_reference: expression.to_string(),
                        instruction_offset,
                        instruction_count,
                    },
                );
            }
            Some("g") | Some("goto") => {
                let Some((path, line)) = parts.next().and_then(|s| s.rsplit_once(':')) else {
                    eprintln!("usage: g <file>:<line>");
                    continue;
                };
                let Ok(line) = line.parse() else {
                    eprintln!("usage: g <file>:<line>");
                    continue;
                };
                if let Err(err) = controller.request_goto_disassembly(
                    &mut client,
                    CursorLocation {
                        path: path.to_string(),
                        line,
                    },
                ) {
                    if err.is_user_visible() {
                        eprintln!("error: {err}");
                    }
                }
            }
            Some("f") | Some("frame") => match parts.next().and_then(|s| s.parse().ok()) {
                Some(frame_id) => controller.on_watch_evaluation(frame_id),
                None => eprintln!("usage: f <frame-id>"),
            },
            Some("pc") => controller.on_view_visible(&mut client),
            Some("w") | Some("wait") => match client.wait_for_event("stopped") {
                Ok(_) => controller.on_session_event(SessionEvent::Stopped {
                    id: SESSION_ID.to_string(),
                }),
                Err(err) => eprintln!("error: {err:#}"),
            },
            Some("q") | Some("quit") => break,
            Some(other) => eprintln!("unknown command: {other}"),
            None => {}
        }

        pump_events(&mut client, &mut controller);
    }

    Ok(())
}

/// Apply queued out-of-band events to the controller.
fn pump_events(client: &mut DapClient<TcpTransport>, controller: &mut DisassemblyController<StdoutView>) {
    while let Some(event) = client.poll_event() {
        let id = SESSION_ID.to_string();
        match event.event.as_str() {
            "stopped" => controller.on_session_event(SessionEvent::Stopped { id }),
            "continued" => controller.on_session_event(SessionEvent::Continued { id }),
            "terminated" | "exited" => {
                controller.on_session_event(SessionEvent::Terminated { id })
            }
            _ => {}
        }
    }
}
