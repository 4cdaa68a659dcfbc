//! Console output for the pool node

use std::fmt;
use std::time::Duration;

use crate::api::ProtocolKind;
use crate::config::Config;

/// ANSI color codes for terminal output
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_CYAN: &str = "\x1b[96m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
}

/// Print startup banner
pub fn print_banner(version: &str, coin: &str) {
    println!();
    println!("{}╔══════════════════════════════════════════════════════════════╗{}", colors::BRIGHT_CYAN, colors::RESET);
    println!("{}║{}                                                              {}║{}", colors::BRIGHT_CYAN, colors::RESET, colors::BRIGHT_CYAN, colors::RESET);
    println!("{}║{}               {}MINING POOL NODE - POOLD v{:<8}{}              {}║{}",
        colors::BRIGHT_CYAN, colors::RESET, colors::BOLD, version, colors::RESET, colors::BRIGHT_CYAN, colors::RESET);
    println!("{}║{}                                                              {}║{}", colors::BRIGHT_CYAN, colors::RESET, colors::BRIGHT_CYAN, colors::RESET);
    println!("{}║{}  Coin: {}{:<53}{}  {}║{}",
        colors::BRIGHT_CYAN, colors::RESET, colors::BRIGHT_GREEN, coin, colors::RESET, colors::BRIGHT_CYAN, colors::RESET);
    println!("{}╚══════════════════════════════════════════════════════════════╝{}", colors::BRIGHT_CYAN, colors::RESET);
    println!();
}

/// Print status line with icon and color
pub fn print_status(icon: &str, message: &str, status: StatusType) {
    let color = match status {
        StatusType::Success => colors::BRIGHT_GREEN,
        StatusType::Info => colors::BRIGHT_CYAN,
        StatusType::Warning => colors::BRIGHT_YELLOW,
        StatusType::Error => colors::BRIGHT_RED,
    };

    println!("{}[{}]{} {}{}{}", color, icon, colors::RESET, color, message, colors::RESET);
}

#[derive(Debug, Clone, Copy)]
pub enum StatusType {
    Success,
    Info,
    Warning,
    Error,
}

/// Print a section header
pub fn print_section(title: &str) {
    println!();
    println!("{}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{}", colors::DIM, colors::RESET);
    println!("{}  {}{}{}", colors::BRIGHT_CYAN, colors::BOLD, title, colors::RESET);
    println!("{}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{}", colors::DIM, colors::RESET);
    println!();
}

/// Print key-value pair in a formatted way
pub fn print_kv(key: &str, value: &str) {
    println!("  {}{}:{} {}{}{}",
        colors::BRIGHT_WHITE, key, colors::RESET,
        colors::BRIGHT_CYAN, value, colors::RESET);
}

/// Print configuration summary
pub fn print_config_summary(config: &Config) {
    print_section("Configuration");

    print_kv("Coin", &format!("{} ({})", config.pool.coin.name, config.pool.coin.algorithm));
    print_kv(
        "Daemon",
        config.pool.daemon.as_ref().map_or("Not configured", |daemon| daemon.url.as_str()),
    );
    for kind in ProtocolKind::ALL {
        let listener = config
            .pool
            .section(kind)
            .map_or_else(|| "Disabled".to_string(), |section| section.listen_address());
        print_kv(&capitalize(kind.tag()), &listener);
    }
    print_kv("Storage", &config.global.storage);
    print_kv("Broadcast Interval", &format!("{}s", config.global.broadcast_interval_secs));
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Print component status
pub fn print_component_status(component: &str, status: ComponentStatus) {
    let (icon, color, text) = match status {
        ComponentStatus::Starting => ("⏳", colors::BRIGHT_YELLOW, "Starting"),
        ComponentStatus::Running => ("✓", colors::BRIGHT_GREEN, "Running"),
        ComponentStatus::Stopped => ("✗", colors::BRIGHT_RED, "Stopped"),
        ComponentStatus::Error => ("⚠", colors::BRIGHT_RED, "Error"),
    };

    println!("  {}[{}]{} {:<20} {}", color, icon, colors::RESET, component, text);
}

#[derive(Debug, Clone, Copy)]
pub enum ComponentStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}

/// Pool status summary
pub struct PoolStatus {
    pub uptime: Duration,
    pub state: String,
    pub miners: usize,
    pub current_height: Option<u64>,
    pub shares: u64,
    pub blocks: u64,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{}", colors::DIM, colors::RESET)?;
        writeln!(f, "{}  Pool Status Summary{}", colors::BRIGHT_CYAN, colors::RESET)?;
        writeln!(f, "{}━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━{}", colors::DIM, colors::RESET)?;
        writeln!(f)?;
        writeln!(f, "  {}Uptime:{}           {}", colors::BRIGHT_WHITE, colors::RESET, format_duration(self.uptime))?;
        writeln!(f, "  {}State:{}            {}", colors::BRIGHT_WHITE, colors::RESET, self.state)?;
        writeln!(f, "  {}Miners:{}           {}", colors::BRIGHT_WHITE, colors::RESET, self.miners)?;
        match self.current_height {
            Some(height) => writeln!(f, "  {}Job Height:{}       {}", colors::BRIGHT_WHITE, colors::RESET, height)?,
            None => writeln!(f, "  {}Job Height:{}       {}none{}", colors::BRIGHT_WHITE, colors::RESET, colors::DIM, colors::RESET)?,
        }
        writeln!(f, "  {}Shares:{}           {}", colors::BRIGHT_WHITE, colors::RESET, self.shares)?;
        writeln!(f, "  {}Blocks:{}           {}", colors::BRIGHT_WHITE, colors::RESET, self.blocks)?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn test_status_lists_counters() {
        let status = PoolStatus {
            uptime: Duration::from_secs(61),
            state: "running".to_string(),
            miners: 3,
            current_height: None,
            shares: 17,
            blocks: 1,
        };
        let text = status.to_string();
        assert!(text.contains("1m 1s"));
        assert!(text.contains("17"));
        assert!(text.contains("none"));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("stratum"), "Stratum");
        assert_eq!(capitalize(""), "");
    }
}
