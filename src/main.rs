//! Satsuma entry point.
//!
//! ```text
//! satsuma <bios-path> <rom-path> [--log-to-file]
//! ```
//!
//! Loads the two images, assembles the system and runs the scheduler loop
//! headless. Exit codes: 1 when the BIOS path is missing, 2 when the ROM
//! path is missing, non-zero on any runtime failure.

use tracing_subscriber::EnvFilter;

use emu::gba::Gba;

fn init_tracing(log_to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_to_file {
        let appender = tracing_appender::rolling::never(std::env::temp_dir(), "satsuma.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}

fn main() {
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    let log_to_file = args.iter().any(|arg| arg == "--log-to-file");
    let _guard = init_tracing(log_to_file);

    let Some(bios_path) = args.first() else {
        tracing::error!("please provide a path to a GBA BIOS ROM image");
        std::process::exit(1);
    };

    let Some(rom_path) = args.get(1) else {
        tracing::error!("please provide a path to a GBA ROM image");
        std::process::exit(2);
    };

    let bios = match std::fs::read(bios_path) {
        Ok(data) => data,
        Err(error) => {
            tracing::error!("couldn't load BIOS image {bios_path}: {error}");
            std::process::exit(1);
        }
    };

    let rom = match std::fs::read(rom_path) {
        Ok(data) => data,
        Err(error) => {
            tracing::error!("couldn't load ROM image {rom_path}: {error}");
            std::process::exit(2);
        }
    };

    let mut gba = match Gba::new(bios, rom) {
        Ok(gba) => gba,
        Err(error) => {
            tracing::error!("{error}");
            std::process::exit(3);
        }
    };

    tracing::info!("running '{}'", gba.cartridge_header().game_title);

    loop {
        if let Err(error) = gba.step() {
            tracing::error!("emulation stopped: {error}");
            std::process::exit(4);
        }
    }
}
