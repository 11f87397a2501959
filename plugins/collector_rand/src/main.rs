use std::sync::Arc;

use bridge_engine::{Bridge, BridgeSettings, CollectorController, DEFAULT_CONFIG_FILE};
use collector_rand::{RandCollector, PLUGIN_NAME, PLUGIN_VERSION};
use liblogger::{log_error, Logger};

fn main() {
    Logger::init();

    let settings = match BridgeSettings::from_file(DEFAULT_CONFIG_FILE) {
        Ok(settings) => settings,
        Err(e) => {
            log_error!(&format!("Invalid bridge settings: {}", e));
            std::process::exit(2);
        }
    };
    let link = settings.host_link;
    let bridge = Arc::new(Bridge::new(settings));
    let controller = CollectorController::new(bridge, Arc::new(RandCollector::new()), PLUGIN_NAME, PLUGIN_VERSION);

    if let Err(e) = controller.run_blocking(link) {
        log_error!(&format!("{} stopped: {}", PLUGIN_NAME, e));
        let _ = Logger::shutdown();
        std::process::exit(1);
    }
    let _ = Logger::shutdown();
}
