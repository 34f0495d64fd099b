//! `log` sink for the browser console
//!
//! The engine logs through the `log` facade. On wasm32, [`init`] routes
//! records to `web_sys::console` with a `[dictcore]` prefix. On native
//! targets the same logger writes to stdout/stderr.

use log::{Level, LevelFilter, Metadata, Record};

const PREFIX: &str = "[dictcore]";

/// Console line for a record, e.g. `[dictcore] WARN session: message`
pub fn format_record(level: Level, target: &str, message: &str) -> String {
    let module = target.rsplit("::").next().unwrap_or(target);
    format!("{} {} {}: {}", PREFIX, level, module, message)
}

pub struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(record.level(), record.target(), &record.args().to_string());
        write_line(record.level(), &line);
    }

    fn flush(&self) {}
}

#[cfg(target_arch = "wasm32")]
fn write_line(level: Level, line: &str) {
    let value = wasm_bindgen::JsValue::from_str(line);
    match level {
        Level::Error => web_sys::console::error_1(&value),
        Level::Warn => web_sys::console::warn_1(&value),
        Level::Info => web_sys::console::log_1(&value),
        Level::Debug | Level::Trace => web_sys::console::debug_1(&value),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn write_line(level: Level, line: &str) {
    if level <= Level::Warn {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Install the console logger; later calls only adjust the level
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        log::debug!("logger already installed");
    }
    log::set_max_level(level);
}

/// Parse a level name from host configuration, defaulting to `Info`
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}
