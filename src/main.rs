use log::error;

use csv2txf::args::*;
use csv2txf::errors::*;
use csv2txf::*;

// Rust doesn't trap a unix signal appropriately occasionally: https://github.com/rust-lang/rust/issues/46016
fn reset_signal_pipe_handler() -> Result<()> {
    #[cfg(target_family = "unix")]
    {
        use nix::sys::signal;

        unsafe {
            signal::signal(signal::Signal::SIGPIPE, signal::SigHandler::SigDfl)
                .chain_err(|| "Internal error: cannot trap signal")?;
        }
    }

    Ok(())
}

fn main() {
    if let Err(ref e) = run() {
        let mut s = e.to_string();

        for e in e.iter().skip(1) {
            s.push_str(&format!("\n\tcaused by: {}", e));
        }

        // with `RUST_BACKTRACE=1`.
        if let Some(backtrace) = e.backtrace() {
            s.push_str(&format!("\n\tbacktrace:\n{:?}", backtrace));
        }

        error!("{}", s);

        ::std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opts = parse_args();

    stderrlog::new()
        .module(module_path!())
        .show_level(false)
        .quiet(opts.quiet)
        .verbosity(opts.verbose + 1) // The user needs warnings
        .timestamp(opts.ts.unwrap_or(stderrlog::Timestamp::Off))
        .init()
        .chain_err(|| "Cannot initialize logging")?;

    reset_signal_pipe_handler()?;

    let output = output_path(&opts.input)?;
    let today = chrono::Local::now().date_naive();
    let conversion = Converter::new(today).convert_file(&opts.input, &output)?;

    println!("{}", conversion.summary());
    println!("Conversion complete. TXF file saved as {}", output.to_string_lossy());
    Ok(())
}
