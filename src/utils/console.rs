// src/utils/console.rs

//! Console reporting with server-style formatting.
//!
//! Diagnostics go through the `log` facade; this module prints the
//! human-facing run reports (headers, steps, summaries) with the same
//! timestamped layout.

use std::sync::OnceLock;

use chrono::Local;

/// Console verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" | "trace" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

static LEVEL: OnceLock<Level> = OnceLock::new();

/// Set the console level; only the first call takes effect.
pub fn init(level: &str) {
    let _ = LEVEL.set(Level::parse(level));
}

fn should_print(level: Level) -> bool {
    level >= LEVEL.get().copied().unwrap_or(Level::Info)
}

fn format_line(level: Level, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, level.as_str(), message)
}

pub fn info(message: &str) {
    if should_print(Level::Info) {
        println!("{}", format_line(Level::Info, message));
    }
}

pub fn warn(message: &str) {
    if should_print(Level::Warn) {
        eprintln!("{}", format_line(Level::Warn, message));
    }
}

/// Always shown, as INFO.
pub fn success(message: &str) {
    println!("{}", format_line(Level::Info, &format!("✓ {}", message)));
}

pub fn failure(message: &str) {
    eprintln!("{}", format_line(Level::Error, &format!("✗ {}", message)));
}

pub fn step(step_num: usize, total: usize, message: &str) {
    if should_print(Level::Info) {
        let msg = format!("[STEP {}/{}] {}", step_num, total, message);
        println!("{}", format_line(Level::Info, &msg));
    }
}

pub fn header(title: &str) {
    if should_print(Level::Info) {
        let border = "═".repeat(60);
        println!("{}", format_line(Level::Info, &border));
        println!("{}", format_line(Level::Info, &format!("  {}", title)));
        println!("{}", format_line(Level::Info, &border));
    }
}

pub fn sub_item(message: &str) {
    if should_print(Level::Info) {
        let msg = format!("    {}", message);
        println!("{}", format_line(Level::Info, &msg));
    }
}

pub fn summary(title: &str, items: &[(&str, String)]) {
    if should_print(Level::Info) {
        println!();
        println!("{}", format_line(Level::Info, &format!("[SUMMARY] {}", title)));
        for (key, value) in items {
            let item_msg = format!("    {}: {}", key, value);
            println!("{}", format_line(Level::Info, &item_msg));
        }
    }
}
