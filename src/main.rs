/*
 * This file is part of hwmond.
 *
 * Copyright (C) 2025 hwmond contributors
 *
 * hwmond is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * hwmond is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with hwmond. If not, see <https://www.gnu.org/licenses/>.
 */

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lazy_static::lazy_static;

use hwmond::logger;
use hwmond::mainloop::MainLoop;
use hwmond::objects::LogEmitter;

#[derive(Parser, Debug)]
#[command(name = "hwmond", about = "Publish the sensors of one hwmon instance on the bus")]
struct Args {
    /// hwmon instance root to monitor, e.g. /sys/class/hwmon/hwmon0
    #[arg(long)]
    path: PathBuf,

    /// Append JSON event logs
    #[arg(long)]
    logging: bool,
}

lazy_static! {
    static ref SHUTDOWN: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

extern "C" fn handle_signal(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    let handler = handle_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() {
    // Usage problems, including --help, leave with a non-zero status;
    // a supervisor must never mistake them for a clean run.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(2);
        }
    };

    if args.logging {
        logger::init_logging();
        logger::log_event(
            "daemon_start",
            serde_json::json!({ "path": args.path.display().to_string() }),
        );
    }

    if !args.path.is_dir() {
        eprintln!("hwmond: {} is not a directory", args.path.display());
        std::process::exit(1);
    }

    install_signal_handlers();

    if let Err(err) = run(args) {
        eprintln!("hwmond: {err:#}");
        logger::log_event(
            "fatal_error",
            serde_json::json!({ "error": format!("{err:#}") }),
        );
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut mainloop = MainLoop::new(
        args.path.clone(),
        Box::new(LogEmitter),
        SHUTDOWN.clone(),
    )
    .context("reading device configuration")?;

    mainloop
        .init()
        .with_context(|| format!("starting up on {}", args.path.display()))?;

    mainloop.run();
    Ok(())
}
