#[macro_use]
extern crate log;
extern crate log4rs;

extern crate log_panics;

extern crate rust_ofc;
use rust_ofc::ofp_controller::{ControllerConfig, OfpController};

use std::env;
use std::process;
use std::thread;
use std::time::Duration;

fn main() {
    log_panics::init();
    log4rs::init_file("log4rs.yml", Default::default()).unwrap();
    info!("rust_ofc starting");

    let mut config = ControllerConfig::default();
    if let Some(port) = env::args().nth(1) {
        match port.parse() {
            Ok(port) => config.listen_port = port,
            Err(_) => {
                error!("Invalid listen port '{}'", port);
                process::exit(1);
            }
        }
    }
    if let Ok(threads) = env::var("OFC_THREADS") {
        match threads.parse() {
            Ok(threads) => config.threads = threads,
            Err(_) => {
                error!("Invalid OFC_THREADS value '{}'", threads);
                process::exit(1);
            }
        }
    }

    let controller = OfpController::new(config);
    if let Err(e) = controller.start_up() {
        error!("Failure starting controller core: {}", e);
        process::exit(1);
    }
    if let Err(e) = controller.start_listener() {
        error!("Failure opening listening socket: {}", e);
        process::exit(1);
    }

    println!(
        "OF controller running on port {}",
        controller.config().listen_port
    );
    loop {
        thread::sleep(Duration::from_secs(3600));
    }
}
