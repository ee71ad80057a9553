use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use agb_core::cpu::{CpuError, CpuState};
use agb_core::Emulator;
use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_RECENT: usize = 10;

#[derive(Parser, Debug)]
#[command(version, about = "Headless ARM7TDMI runner for GBA images.", long_about = None)]
struct Args {
    #[arg(name = "ROM_PATH")]
    rom_path: Option<PathBuf>,

    /// Boot image; without one the cartridge starts directly.
    #[arg(long)]
    bios: Option<PathBuf>,

    /// Instructions to execute before printing state.
    #[arg(long)]
    steps: Option<u64>,

    /// Memory to print afterwards, as ADDR:LEN (hex address).
    #[arg(long, value_parser = parse_dump)]
    dump: Option<DumpRange>,

    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DumpRange {
    addr: u32,
    len: u32,
}

fn parse_number(text: &str) -> Result<u32, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{text}': {e}"))
}

fn parse_dump(text: &str) -> Result<DumpRange, String> {
    let (addr, len) = text
        .split_once(':')
        .ok_or_else(|| format!("expected ADDR:LEN, got '{text}'"))?;
    let addr = addr.trim();
    let addr = u32::from_str_radix(addr.trim_start_matches("0x").trim_start_matches("0X"), 16)
        .map_err(|e| format!("invalid address '{addr}': {e}"))?;
    Ok(DumpRange { addr, len: parse_number(len)? })
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to save config: {0}")]
    SaveConfig(#[from] io::Error),
    #[error("failed to encode config: {0}")]
    EncodeConfig(#[from] toml::ser::Error),
    #[error("invalid log level '{0}'")]
    LogLevel(String),
    #[error("no cartridge or boot image given and none remembered")]
    NoImage,
    #[error("execution stopped: {0}")]
    Cpu(#[from] CpuError),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
struct Config {
    bios_path: Option<PathBuf>,
    recent_roms: Vec<PathBuf>,
    log_level: String,
    default_steps: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bios_path: None,
            recent_roms: Vec::new(),
            log_level: if cfg!(feature = "debug_logs") { "debug" } else { "info" }.to_string(),
            default_steps: 1000,
        }
    }
}

impl Config {
    /// Most recent first, no duplicates.
    fn add_recent(&mut self, path: PathBuf) {
        if let Some(index) = self.recent_roms.iter().position(|p| p == &path) {
            self.recent_roms.remove(index);
        }
        self.recent_roms.insert(0, path);
        self.recent_roms.truncate(MAX_RECENT);
    }
}

fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "agb", "agb").map(|dirs| dirs.config_dir().to_path_buf())
}

fn load_config() -> Config {
    let Some(mut path) = config_dir() else {
        return Config::default();
    };
    path.push("config.toml");
    let Ok(config_str) = fs::read_to_string(&path) else {
        return Config::default();
    };
    toml::from_str(&config_str).unwrap_or_else(|e| {
        log::warn!("ignoring malformed {}: {}", path.display(), e);
        Config::default()
    })
}

fn save_config(config: &Config) -> Result<(), CliError> {
    if let Some(mut path) = config_dir() {
        fs::create_dir_all(&path)?;
        path.push("config.toml");
        fs::write(&path, toml::to_string(config)?)?;
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}

fn flush_logs() {
    for entry in agb_core::log_buffer::drain_logs() {
        eprintln!("{entry}");
    }
}

fn print_state(emu: &Emulator) -> Result<(), CpuError> {
    let cpu = emu.cpu();
    for row in 0..4 {
        let line = (0..4)
            .map(|col| {
                let index = row * 4 + col;
                emu.read_reg(index).map(|value| format!("r{index:<2} = {value:#010x}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        println!("{}", line.join("  "));
    }
    println!("cpsr = {:?}", emu.cpsr());
    if cpu.regs().has_spsr() {
        println!("spsr = {:?}", emu.spsr());
    }
    match cpu.state() {
        CpuState::Arm => {
            let pipe = cpu.arm_pipeline();
            println!("executing {:#010x}: {:08x}  decoding {:08x}", cpu.executing_address(), pipe.executing, pipe.decoding);
        }
        CpuState::Thumb => {
            let pipe = cpu.thumb_pipeline();
            println!("executing {:#010x}: {:04x}  decoding {:04x}", cpu.executing_address(), pipe.executing, pipe.decoding);
        }
    }
    Ok(())
}

/// End (exclusive) of the 16-byte dump row starting at `line_start`.
fn row_end(range: DumpRange, line_start: u32) -> u32 {
    range.len.min(line_start.saturating_add(16))
}

fn print_dump(emu: &Emulator, range: DumpRange) {
    for line_start in (0..range.len).step_by(16) {
        let addr = range.addr.wrapping_add(line_start);
        let bytes: Vec<String> = (line_start..row_end(range, line_start))
            .map(|i| format!("{:02x}", emu.peek8(range.addr.wrapping_add(i))))
            .collect();
        println!("{addr:08x}  {}", bytes.join(" "));
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let mut config = load_config();

    let level_name = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    let level = log::LevelFilter::from_str(&level_name).map_err(|_| CliError::LogLevel(level_name.clone()))?;
    let _ = agb_core::log_buffer::init_logger(level);

    let rom_path = args.rom_path.or_else(|| config.recent_roms.first().cloned());
    let bios_path = args.bios.or_else(|| config.bios_path.clone());
    if rom_path.is_none() && bios_path.is_none() {
        return Err(CliError::NoImage);
    }

    let mut emu = Emulator::new();
    if let Some(path) = bios_path {
        emu.load_bios(&read_image(&path)?);
        config.bios_path = Some(path);
    }
    if let Some(path) = rom_path {
        emu.load_rom(&read_image(&path)?);
        config.add_recent(path);
    }

    let steps = args.steps.unwrap_or(config.default_steps);
    let result = emu.run(steps);
    flush_logs();
    result?;

    print_state(&emu)?;
    if let Some(range) = args.dump {
        print_dump(&emu, range);
    }
    save_config(&config)
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            flush_logs();
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
