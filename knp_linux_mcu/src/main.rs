mod board;
mod console;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use knp_mcu::utils::timer_is_before;
use knp_mcu::{Board, Mcu, McuConfig};
use log::{info, warn};

use board::LinuxBoard;
use console::Console;

/// Simulated printer MCU running as a Linux process
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// symlink created for the serial pseudo-terminal
    #[arg(short = 'I', long, default_value = "/tmp/knp_host_mcu")]
    input_tty: PathBuf,

    /// run with realtime (SCHED_FIFO) priority
    #[arg(short, long)]
    realtime: bool,

    /// tick rate of the simulated clock in Hz
    #[arg(
        long,
        default_value_t = McuConfig::default().clock_freq,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    clock_freq: u32,

    /// bytes of object storage
    #[arg(long, default_value_t = 64 * 1024)]
    arena_size: usize,

    /// write log to file instead of stderr
    #[arg(short, long)]
    logfile: Option<PathBuf>,

    /// enable debug messages
    #[arg(short, long)]
    verbose: bool,
}

fn realtime_setup() -> Result<()> {
    // SAFETY: sched_param is plain data and the call only reads it.
    let ret = unsafe {
        let mut sp: libc::sched_param = std::mem::zeroed();
        sp.sched_priority = 1;
        libc::sched_setscheduler(0, libc::SCHED_FIFO, &sp)
    };
    if ret < 0 {
        return Err(std::io::Error::last_os_error()).context("sched_setscheduler");
    }
    Ok(())
}

fn flush_tx(mcu: &mut Mcu<'_, LinuxBoard>, console: &mut Console, out: &mut Vec<u8>) -> Result<()> {
    if !mcu.board_mut().take_tx_ready() {
        return Ok(());
    }
    out.clear();
    while let Some(b) = mcu.tx_next_byte() {
        out.push(b);
    }
    console.write(out)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter(None, log::LevelFilter::Debug);
    } else {
        builder.filter(None, log::LevelFilter::Info);
    }
    if let Some(ref logfile) = args.logfile {
        let target = Box::new(std::fs::File::create(logfile).context("Can't create logfile")?);
        builder.target(env_logger::Target::Pipe(target));
    }
    builder.init();

    if args.realtime {
        if let Err(e) = realtime_setup() {
            warn!("realtime scheduling unavailable: {:#}", e);
        }
    }

    let mut console = Console::open(&args.input_tty)?;
    let memory: &'static mut [u8] = Box::leak(vec![0u8; args.arena_size].into_boxed_slice());
    let config = McuConfig {
        clock_freq: args.clock_freq,
    };
    let mut mcu = Mcu::new(LinuxBoard::new(config.clock_freq), config, memory);
    info!("Starting MCU...");

    let mut rx = Vec::new();
    let mut tx = Vec::new();
    let mut timer_wake = mcu.next_waketime();
    loop {
        for &b in &rx {
            mcu.rx_byte(b);
        }
        rx.clear();

        if mcu.board_mut().take_kick() {
            timer_wake = mcu.next_waketime();
        }
        if !timer_is_before(mcu.board().read_time(), timer_wake) {
            timer_wake = mcu.timer_irq();
        }
        flush_tx(&mut mcu, &mut console, &mut tx)?;

        if mcu.tasks_pending() {
            mcu.run_tasks();
            flush_tx(&mut mcu, &mut console, &mut tx)?;
            console.wait_rx(Duration::ZERO, &mut rx);
            continue;
        }
        let idle = mcu.board().time_until(timer_wake);
        console.wait_rx(idle, &mut rx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_clock_freq_rejected() {
        assert!(Args::try_parse_from(["knp_linux_mcu", "--clock-freq", "0"]).is_err());
        let args = Args::try_parse_from(["knp_linux_mcu", "--clock-freq", "1000000"]).unwrap();
        assert_eq!(args.clock_freq, 1_000_000);
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["knp_linux_mcu"]).unwrap();
        assert_eq!(args.clock_freq, McuConfig::default().clock_freq);
        assert_eq!(args.input_tty, PathBuf::from("/tmp/knp_host_mcu"));
        assert!(!args.realtime);
    }
}
