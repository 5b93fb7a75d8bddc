//! `ipcore`: command-line interface for TES IP cores.
//!
//! ```text
//! USAGE:
//!   ipcore catalog                       List supported variants
//!   ipcore enumerate                     Discover and attach UIO-bound cores
//!   ipcore read <index> <id>             Read one register
//!   ipcore write <index> <id> <value>    Write one register
//!   ipcore settings <index>              Register window of a device
//!   ipcore wait <index> [--timeout ms]   Wait for an interrupt
//!   ipcore subdevs <index>               Connected streaming devices
//!   ipcore echo <index> <text>           Debug echo (no hardware access)
//!   ipcore simulate                      Dry run on the simulated platform
//! ```
//!
//! Device indices are registry indices after attaching every discovered
//! core, in discovery order.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ipcore_chip::{catalog, compat, Variant};
use ipcore_driver::backends::SimulatedPlatform;
use ipcore_driver::{
    DeviceHandle, Driver, DriverConfig, InterruptLine, ResourceDescriptor, SubDeviceRef,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ipcore", about = "TES IP core driver CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List every known compatible string and its descriptor.
    Catalog,
    /// Discover UIO-bound cores and attach them (requires root).
    Enumerate,
    /// Read one register.
    Read {
        /// Device index.
        index: usize,
        /// Register id (word address, decimal or 0x-hex).
        #[arg(value_parser = parse_u64)]
        id: u64,
    },
    /// Write one register.
    Write {
        /// Device index.
        index: usize,
        /// Register id (word address, decimal or 0x-hex).
        #[arg(value_parser = parse_u64)]
        id: u64,
        /// Value (decimal or 0x-hex).
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// Print the register window of a device.
    Settings {
        /// Device index.
        index: usize,
    },
    /// Wait for an interrupt and print its status.
    Wait {
        /// Device index.
        index: usize,
        /// Give up after this many milliseconds (default: wait forever).
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List connected streaming sub-devices.
    Subdevs {
        /// Device index.
        index: usize,
    },
    /// Send text through the debug echo path.
    Echo {
        /// Device index.
        index: usize,
        /// Text to echo.
        text: String,
    },
    /// Attach a simulated CDC and D2D, raise interrupts, print the results.
    Simulate,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Catalog => cmd_catalog(),
        Cmd::Enumerate => cmd_enumerate()?,
        Cmd::Read { index, id } => {
            let (_driver, dev) = open(index)?;
            let value = dev.read_register(id).context("register read")?;
            println!("[{id:#06x}] = {value:#010x}");
        }
        Cmd::Write { index, id, value } => {
            let (_driver, dev) = open(index)?;
            dev.write_register(id, value).context("register write")?;
            println!("[{id:#06x}] <- {value:#010x}");
        }
        Cmd::Settings { index } => {
            let (_driver, dev) = open(index)?;
            let s = dev.get_settings()?;
            println!("Base address : {:#x}", s.base_physical_address);
            println!("Span         : {:#x} bytes", s.region_span);
        }
        Cmd::Wait { index, timeout } => {
            let (_driver, dev) = open(index)?;
            cmd_wait(&dev, timeout)?;
        }
        Cmd::Subdevs { index } => {
            let (_driver, dev) = open(index)?;
            print_sub_devices(&dev.list_sub_devices()?);
        }
        Cmd::Echo { index, text } => {
            let (_driver, dev) = open(index)?;
            let n = dev.write(text.as_bytes())?;
            println!("{n} bytes echoed");
        }
        Cmd::Simulate => cmd_simulate()?,
    }

    Ok(())
}

fn parse_u64(raw: &str) -> Result<u64, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("invalid number {raw:?}: {e}"))
}

fn parse_u32(raw: &str) -> Result<u32, String> {
    let value = parse_u64(raw)?;
    u32::try_from(value).map_err(|_| format!("{raw} does not fit in 32 bits"))
}

/// Attach every discovered core and open `index`
///
/// The driver is returned alongside the handle; dropping it detaches.
fn open(index: usize) -> Result<(Driver, DeviceHandle)> {
    let driver = Driver::linux();
    for (core, result) in driver.attach_discovered().context("discovery failed")? {
        match result {
            Err(e) if e.is_attach_error() => {
                tracing::info!("uio{}: {} skipped: {e}", core.uio_index, core.compatible);
            }
            Err(e) => tracing::warn!("uio{}: {}: {e}", core.uio_index, core.compatible),
            Ok(_) => {}
        }
    }
    let handle = driver
        .open(index)
        .with_context(|| format!("no attached device at index {index} (see `ipcore enumerate`)"))?;
    Ok((driver, handle))
}

fn cmd_catalog() {
    println!("{:<14} {:<6} {:<10} {:<12} {:<12} {:<7} {:<6}", "compatible", "name", "irq", "mask", "expected", "status", "clear");
    for variant in Variant::ALL {
        match catalog::descriptor(variant) {
            Some(d) => println!(
                "{:<14} {:<6} {:<10} {:#010x}   {:#010x}   {:#06x}  {:#06x}",
                d.compatible(),
                d.display_name,
                d.irq_label,
                d.version_mask,
                d.version_expected,
                d.irq_status_register_id,
                d.clear_register(),
            ),
            None => println!("{:<14} (stub, no descriptor)", variant.compatible()),
        }
    }
}

fn cmd_enumerate() -> Result<()> {
    let driver = Driver::linux();
    let results = driver.attach_discovered().context("discovery failed")?;

    println!(
        "TES IP cores: {} (registry capacity {})",
        results.len(),
        driver.registry().capacity()
    );
    println!();

    for (core, result) in results {
        match result {
            Ok(dev) => {
                println!("[{}] {} @ {:#x}", dev.index(), dev.endpoint_name(), dev.base_physical_address());
                println!("     compatible {}  uio{}", core.compatible, core.uio_index);
                println!("     span {:#x}  irq {}", dev.region_span(), dev.interrupt_line());
                for sub in dev.sub_devices() {
                    println!("     stream {} (layer {})", sub.name(), sub.layer());
                }
            }
            Err(e) if e.is_attach_error() => {
                println!("[-] {} uio{}: not attached: {e}", core.compatible, core.uio_index);
            }
            Err(e) => println!("[!] {} uio{}: {e}", core.compatible, core.uio_index),
        }
        println!();
    }

    Ok(())
}

fn cmd_wait(dev: &DeviceHandle, timeout: Option<u64>) -> Result<()> {
    let status = match timeout {
        Some(ms) => dev.wait_for_interrupt_timeout(Duration::from_millis(ms))?,
        None => Some(dev.wait_for_interrupt()?),
    };
    match status {
        Some(status) => println!("irq status {status:#010x}"),
        None => println!("no interrupt within {} ms", timeout.unwrap_or_default()),
    }
    Ok(())
}

fn print_sub_devices(subs: &[SubDeviceRef]) {
    println!("Connected streaming devices: {}", subs.len());
    for sub in subs {
        println!("  {:<20} layer {}", sub.name(), sub.layer());
    }
}

fn cmd_simulate() -> Result<()> {
    const CDC_BASE: u64 = 0xff20_0000;
    const D2D_BASE: u64 = 0xff30_0000;
    const CDC_LINE: InterruptLine = InterruptLine(40);
    const D2D_LINE: InterruptLine = InterruptLine(41);

    let platform = SimulatedPlatform::new();
    let driver = Driver::new(DriverConfig::default(), platform.services());

    let cdc_regs = platform.install(CDC_BASE, 0x400);
    cdc_regs.poke(catalog::CDC.version_register_id, 0x0004_0100);
    let d2d_regs = platform.install(D2D_BASE, 0x1000);

    let cdc = driver.attach(
        compat::CDC,
        ResourceDescriptor::new(CDC_BASE, 0x400, CDC_LINE)
            .with_sub_device(SubDeviceRef::new("hdmi0", 0)),
    )?;
    let d2d = driver.attach(compat::D2D, ResourceDescriptor::new(D2D_BASE, 0x1000, D2D_LINE))?;

    let cdc_handle = driver.open(cdc.index())?;
    let d2d_handle = driver.open(d2d.index())?;

    for status in [0x1, 0x4] {
        cdc_regs.poke(catalog::CDC.irq_status_register_id, status);
        platform.raise(CDC_LINE);
    }
    let mut buf = [0u8; 4];
    if cdc_handle.read(&mut buf)? != buf.len() {
        bail!("{}: short status read", cdc.endpoint_name());
    }
    println!(
        "{}: two interrupts, status {:#010x}, clear register {:#010x}",
        cdc.endpoint_name(),
        u32::from_ne_bytes(buf),
        cdc_regs.peek(catalog::CDC.clear_register())
    );

    d2d_regs.poke(catalog::D2D.irq_status_register_id, 0x50);
    platform.raise(D2D_LINE);
    let status = d2d_handle.wait_for_interrupt()?;
    println!(
        "{}: status {status:#010x}, clear word {:#010x}",
        d2d.endpoint_name(),
        d2d_regs.peek(catalog::D2D.clear_register())
    );

    print_sub_devices(&cdc_handle.list_sub_devices()?);

    let attached = driver.devices().len();
    driver.shutdown();
    println!("Detached {attached} devices");
    Ok(())
}
