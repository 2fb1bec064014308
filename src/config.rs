//! View behaviour settings.

use crate::{muted_error, weak_error};
use log::error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_GOTO_WINDOW: i64 = 64;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HELPER_SCRIPT: &str = "scripts/gdb/locations.py";

/// On-disk settings representation.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct SettingsFile {
    resolve_locations: bool,
    goto_instruction_count: i64,
    helper_script: PathBuf,
    read_timeout_secs: u64,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            resolve_locations: true,
            goto_instruction_count: DEFAULT_GOTO_WINDOW,
            helper_script: PathBuf::from(DEFAULT_HELPER_SCRIPT),
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

/// View settings.
///
/// The location-resolution switch is hot: the host may flip it while a
/// session is running and the next disassembly observes the new value.
#[derive(Debug)]
pub struct Settings {
    resolve_locations: AtomicBool,
    goto_instruction_count: i64,
    helper_script: PathBuf,
    read_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        SettingsFile::default().into()
    }
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        let read_timeout = match file.read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            resolve_locations: AtomicBool::new(file.resolve_locations),
            goto_instruction_count: file.goto_instruction_count,
            helper_script: file.helper_script,
            read_timeout,
        }
    }
}

impl Settings {
    const DEFAULT_PATH: &'static str = ".config/asmview/config.toml";

    /// Load settings from file. Return [`None`] on errors.
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?;
                let path = path.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    error!("Error while load settings file: {err}");
                    return None;
                }
            },
        };

        let file: SettingsFile = weak_error!(toml::de::from_str(&data))?;
        Some(file.into())
    }

    /// Whether instruction lists should be enriched with source locations.
    pub fn resolve_locations(&self) -> bool {
        self.resolve_locations.load(Ordering::Relaxed)
    }

    /// Flip the location-resolution switch at runtime.
    pub fn set_resolve_locations(&self, on: bool) {
        self.resolve_locations.store(on, Ordering::Relaxed)
    }

    /// Window size used when jumping into the disassembly from a source line.
    pub fn goto_instruction_count(&self) -> i64 {
        self.goto_instruction_count
    }

    /// Helper script sourced into the debugger backend by the resolver.
    pub fn helper_script(&self) -> &Path {
        &self.helper_script
    }

    /// Read timeout applied to adapter transports, [`None`] disables it.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}
