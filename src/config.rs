//! Flat key/value configuration for a composer run.
//!
//! One key and its remaining tokens per line; unknown keys are reported
//! and skipped. The parsed value is immutable and passed explicitly into
//! the orchestrator. When the file is missing, a default one is written so
//! the next run starts from something editable, and the run continues with
//! the built-in defaults.

use std::{fs, path::Path};

use crate::Result;

/// Configuration of one composer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the target executable to patch.
    pub target: String,
    /// Path of the patched output executable.
    pub output: String,
    /// Name of the appended section.
    pub section_name: String,
    /// Reserved size of the appended section; zero keeps the compiled size.
    pub section_size: u32,
    /// Compiler flags for the section and hook builds.
    pub cflags: String,
    /// Whether the address-mapping resolution phase runs.
    pub address_mapping: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            target: String::from("program.exe"),
            output: String::from("program_patched.exe"),
            section_name: String::from(".weave"),
            section_size: 0x80000,
            cflags: String::from("-pipe -m32 -Os -nostartfiles -w -fpermissive -std=c++17"),
            address_mapping: false,
        }
    }
}

impl Config {
    /// Loads configuration from a file, falling back to defaults.
    ///
    /// A missing file is replaced by a freshly written default one; the
    /// returned value then carries the built-in defaults.
    pub fn load(path: &Path) -> Config {
        match fs::read_to_string(path) {
            Ok(text) => Config::parse(&text),
            Err(_) => {
                let config = Config::default();
                if let Err(err) = config.write(path) {
                    log::warn!("could not write default config {}: {}", path.display(), err);
                } else {
                    log::info!("wrote default config to {}", path.display());
                }
                config
            }
        }
    }

    /// Parses configuration text; unrecognized values fall back to their
    /// defaults with a warning.
    pub fn parse(text: &str) -> Config {
        let mut config = Config::default();

        for line in text.lines() {
            let mut words = line.split_whitespace();
            let Some(key) = words.next() else {
                continue;
            };
            match key {
                "target" => {
                    if let Some(value) = words.next() {
                        config.target = value.to_string();
                    }
                }
                "output" => {
                    if let Some(value) = words.next() {
                        config.output = value.to_string();
                    }
                }
                "section" => {
                    if let Some(value) = words.next() {
                        config.section_name = value.to_string();
                    }
                }
                "sectsize" => {
                    if let Some(value) = words.next() {
                        match parse_hex(value) {
                            Some(size) => config.section_size = size,
                            None => log::warn!("invalid sectsize '{value}'"),
                        }
                    }
                }
                "cflags" => {
                    let rest = line
                        .trim_start()
                        .strip_prefix("cflags")
                        .unwrap_or("")
                        .trim();
                    if !rest.is_empty() {
                        config.cflags = rest.to_string();
                    }
                }
                "addressmapping" => {
                    if let Some(value) = words.next() {
                        config.address_mapping = matches!(value, "1" | "true" | "yes");
                    }
                }
                _ => log::warn!("unknown config key '{key}'"),
            }
        }

        config
    }

    /// Writes the configuration in its file form.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    fn render(&self) -> String {
        format!(
            "target {}\noutput {}\nsection {}\nsectsize 0x{:x}\ncflags {}\naddressmapping {}\n",
            self.target,
            self.output,
            self.section_name,
            self.section_size,
            self.cflags,
            u8::from(self.address_mapping)
        )
    }
}

/// Parses a hexadecimal value with or without a `0x` prefix.
fn parse_hex(value: &str) -> Option<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).ok()
}
