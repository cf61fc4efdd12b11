use anyhow::Context;
use clap::Parser;
use gbdasm::disasm::{disassemble, DisassemblyOptions, UndefinedPolicy};
use gbdasm::io::{hex_dump, read_bytes};
use gbdasm::memory::RomImage;
use log::info;
use std::path::PathBuf;

/// Disassembles a Game Boy ROM into source rgbasm can rebuild byte for byte
#[derive(Parser)]
#[command(version, long_about = None)]
struct Args {
    /// ROM to disassemble
    rom: PathBuf,

    /// Write the listing here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fail on undefined opcodes instead of emitting them as data
    #[arg(long)]
    strict: bool,

    /// Column the address comments line up to
    #[arg(short, long, default_value_t = DisassemblyOptions::default().line_width)]
    width: usize,

    /// Decode the cartridge header area as code too
    #[arg(long)]
    no_header: bool,

    /// Hex dump the first N bytes to stderr before disassembling
    #[arg(long, value_name = "BYTES")]
    hex_dump: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // arg processing
    // ---------
    let args = Args::parse();
    let options = DisassemblyOptions {
        policy: if args.strict {
            UndefinedPolicy::Strict
        } else {
            UndefinedPolicy::Lenient
        },
        line_width: args.width,
    };

    // load rom
    // ------------
    let data = read_bytes(&args.rom).with_context(|| format!("failed to read {}", args.rom.display()))?;
    let mut rom = RomImage::new(data);
    if args.no_header {
        rom = rom.without_header();
    }
    info!(
        "{} | size: {} | banks: {} | type: {} | dst: {}",
        rom.title().unwrap_or("???"),
        rom.len(),
        rom.bank_count(),
        rom.cartridge_type().unwrap_or("???"),
        rom.destination().unwrap_or("???")
    );

    // hex
    // ------------
    if let Some(limit) = args.hex_dump {
        eprintln!("{}", hex_dump(rom.data(), 16, Some(limit)));
    }

    // dis
    // ------------
    let listing = disassemble(&rom, &options)?;
    match &args.output {
        Some(path) => std::fs::write(path, listing + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", listing),
    }
    Ok(())
}
