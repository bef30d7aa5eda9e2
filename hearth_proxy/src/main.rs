// CLI entry point for the hearth proxy.
//
// Loads (or creates) the TOML config, sets up logging, and runs the proxy on
// the main thread until SIGINT/SIGTERM. A watcher thread turns the signal
// into `ShutdownHandle::shutdown`, after which `Proxy::run` returns.
//
// Usage:
//   hearth [OPTIONS]
//     --config <PATH>       Config file (default: config.toml, created if missing)
//     --log-level <FILTER>  tracing filter when RUST_LOG is unset (default: info)
//     --json-logs           Emit JSON log lines

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use hearth_proxy::{Config, Proxy, Services};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hearth", version, about = "Transparent game-protocol proxy")]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    json_logs: bool,
}

static SIGNALLED: AtomicBool = AtomicBool::new(false);

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    let config = match Config::load_or_create(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "failed to load config");
            return ExitCode::FAILURE;
        }
    };
    let services = match Services::from_config(&config) {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "failed to start services");
            return ExitCode::FAILURE;
        }
    };

    let proxy = Proxy::new(config, services);
    install_signal_handlers();
    let shutdown = proxy.shutdown_handle();
    let watcher = thread::Builder::new().name("signal-watch".into()).spawn(move || {
        while !SIGNALLED.load(Ordering::SeqCst) && !shutdown.is_shut_down() {
            thread::sleep(Duration::from_millis(100));
        }
        if !shutdown.is_shut_down() {
            shutdown.shutdown();
        }
    });
    if let Err(e) = watcher {
        error!(error = %e, "failed to spawn signal watcher");
        return ExitCode::FAILURE;
    }

    match proxy.run() {
        Ok(()) => {
            info!("proxy stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "proxy failed");
            proxy.shutdown_handle().shutdown();
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_thread_names(true);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(unix)]
fn install_signal_handlers() {
    extern "C" fn on_signal(_: libc::c_int) {
        SIGNALLED.store(true, Ordering::SeqCst);
    }
    let handler = on_signal as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {
    // The process exits on Ctrl+C without a graceful shutdown.
}
