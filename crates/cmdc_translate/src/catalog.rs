//! Built-in phrase catalog for a Raspberry Pi NAS.
//!
//! Multi-part commands are typed steps; the label of a step names the
//! section of output it produces.

use cmdc_core::{shell_quote, CommandStep};

use crate::table::{PhraseEntry, PhraseTable};

/// Help categories, in the order they are printed.
const CATEGORIES: &[(&str, &str)] = &[
    ("System", "status, uptime, monitor"),
    ("Storage", "disk space, disk list, smart status, raid status"),
    ("Memory", "ram, memory"),
    ("Temperature", "temp, watch temps"),
    ("Network", "ip, network, ports, wifi status, tailscale status"),
    ("Docker", "docker ps, docker images, docker status"),
    ("Files", "ls, pwd"),
    ("Shares", "share status"),
    (
        "Power",
        "shutdown, reboot (add 'confirm' to execute, 'cancel' to stop)",
    ),
    ("Hardware", "pi hardware, eeprom status"),
    ("Services", "printers, cron list, time sync, bluetooth status"),
];

const DOCKER_TABLE: &str = "docker ps --format 'table {{.Names}}\\t{{.Status}}'";
const TOP_PROCESSES: &str = "ps aux --sort=-%cpu | head -n 5";

/// Text printed by the `help` phrase.
pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for (category, phrases) in CATEGORIES {
        text.push_str(&format!("- {}: {}\n", category, phrases));
    }
    text.push_str("\nType any command for more details");
    text
}

fn labelled(label: &str, command: &str) -> CommandStep {
    CommandStep::labelled(label, command)
}

fn step(command: &str) -> CommandStep {
    CommandStep::new(command)
}

fn power_check(warning: &str) -> Vec<CommandStep> {
    vec![
        labelled("Active Users", "who"),
        labelled("System Load", "uptime"),
        labelled("Active Docker Containers", DOCKER_TABLE),
        step(&format!("printf '%s\\n' {}", shell_quote(warning))),
    ]
}

fn power_confirm(command: &str) -> Vec<CommandStep> {
    vec![
        labelled("Active Users", "who"),
        labelled("Running Processes", TOP_PROCESSES),
        labelled("Active Docker Containers", DOCKER_TABLE),
        labelled("Final System Check", command),
    ]
}

/// Entries of the built-in catalog, in declaration order.
pub fn builtin_entries() -> Vec<PhraseEntry> {
    use PhraseEntry as E;

    vec![
        // System
        E::steps(
            &["status", "system status"],
            vec![step("uptime"), step("free -h"), step("df -h")],
        ),
        E::command(&["uptime"], "uptime"),
        // Storage
        E::command(&["disk space", "disk usage", "storage"], "df -h"),
        E::command(
            &["disk list"],
            "lsblk -o NAME,SIZE,TYPE,MOUNTPOINT,FSTYPE || echo 'lsblk not available'",
        ),
        E::command(
            &["smart status"],
            "sudo smartctl -H /dev/sda || echo 'SMART not available for /dev/sda'",
        ),
        // Memory
        E::command(&["memory", "ram", "memory usage"], "free -h"),
        // Temperature
        E::command(&["temperature", "temp", "cpu temp"], "vcgencmd measure_temp"),
        E::steps(
            &["watch temps"],
            vec![
                step("vcgencmd measure_temp"),
                labelled(
                    "Disk Temperature",
                    "sudo smartctl -A /dev/sda | grep Temperature_Celsius || echo 'No disk temperature available'",
                ),
            ],
        ),
        // Processes
        E::command(&["processes"], "ps aux | head -n 10"),
        E::command(&["top processes"], TOP_PROCESSES),
        // Network
        E::steps(
            &["network"],
            vec![step("ip -br addr"), labelled("Routing", "ip -br route")],
        ),
        E::steps(
            &["ip"],
            vec![step("hostname -I"), labelled("Detailed IP info", "ip -br addr")],
        ),
        E::steps(
            &["network status"],
            vec![
                labelled("Network Interfaces", "ip -br addr"),
                labelled("Routing Table", "ip -br route"),
            ],
        ),
        E::command(&["ports", "connections"], "ss -tuln"),
        // Files
        E::command(&["ls", "list", "files"], "ls -lah"),
        E::command(&["pwd", "current dir"], "pwd"),
        // Docker
        E::command(
            &["docker ps", "docker containers"],
            "docker ps -a || echo 'Error: Cannot list Docker containers'",
        ),
        E::command(
            &["docker images"],
            "docker images || echo 'Error: Cannot list Docker images'",
        ),
        E::command(
            &["docker status"],
            "docker info || echo 'Error: Cannot get Docker status'",
        ),
        E::command(
            &["docker version"],
            "docker version || echo 'Error: Cannot get Docker version'",
        ),
        // Monitoring
        E::steps(
            &["monitor"],
            vec![
                labelled("System Load", "uptime"),
                labelled("Memory Usage", "free -h"),
                labelled("Storage Usage", "df -h"),
                labelled("Temperature", "vcgencmd measure_temp"),
                labelled("Top Processes", TOP_PROCESSES),
            ],
        ),
        // Shares
        E::steps(
            &["share status"],
            vec![
                labelled(
                    "Samba Status",
                    "sudo systemctl status smbd || echo 'Samba not running'",
                ),
                labelled(
                    "NFS Status",
                    "sudo systemctl status nfs-kernel-server || echo 'NFS not running'",
                ),
            ],
        ),
        // Power
        E::steps(
            &["shutdown"],
            power_check(
                "WARNING: This will shutdown the system. Type 'shutdown confirm' to proceed.",
            ),
        ),
        E::steps(&["shutdown confirm"], power_confirm("sudo shutdown -h +1")),
        E::steps(
            &["reboot"],
            power_check("WARNING: This will reboot the system. Type 'reboot confirm' to proceed."),
        ),
        E::steps(&["reboot confirm"], power_confirm("sudo shutdown -r +1")),
        E::command(
            &["shutdown cancel"],
            "sudo shutdown -c && echo 'Shutdown/reboot cancelled.'",
        ),
        E::steps(
            &["shutdown status"],
            vec![
                labelled("Active Users", "who"),
                labelled("System Load", "uptime"),
                labelled("Active Docker Containers", DOCKER_TABLE),
                labelled("Top Processes", TOP_PROCESSES),
            ],
        ),
        // Network services
        E::steps(
            &["tailscale", "tailscale status"],
            vec![labelled("Tailscale Status", "sudo tailscale status")],
        ),
        E::steps(
            &["wifi"],
            vec![
                labelled("WiFi Status", "iwconfig wlan0"),
                labelled("Connection Details", "nmcli device wifi list"),
            ],
        ),
        E::steps(
            &["wifi status"],
            vec![
                labelled("WiFi Status", "iwconfig wlan0"),
                labelled("Connection Details", "nmcli connection show --active"),
            ],
        ),
        E::steps(
            &["bluetooth", "bluetooth status"],
            vec![
                labelled("Bluetooth Status", "sudo systemctl status bluetooth"),
                labelled("Paired Devices", "bluetoothctl paired-devices"),
            ],
        ),
        // Storage services
        E::steps(
            &["raid", "raid status"],
            vec![
                labelled("RAID Status", "cat /proc/mdstat"),
                labelled(
                    "Array Details",
                    "sudo mdadm --detail /dev/md0 2>/dev/null || echo 'No RAID array found'",
                ),
            ],
        ),
        E::steps(
            &["smart monitor"],
            vec![
                labelled("SMART Status", "sudo smartctl -H /dev/sda"),
                labelled("SMART Attributes", "sudo smartctl -A /dev/sda"),
            ],
        ),
        E::steps(
            &["disk events"],
            vec![labelled("Recent Disk Events", "sudo journalctl -u udisks2 -n 20")],
        ),
        // System services
        E::steps(
            &["printers", "printer status"],
            vec![
                labelled("Printer Status", "lpstat -p -d"),
                labelled("Print Queue", "lpq"),
            ],
        ),
        E::steps(
            &["cron list", "cron status"],
            vec![
                labelled("System Cron Jobs", "sudo cat /etc/crontab"),
                labelled("User Cron Jobs", "crontab -l"),
            ],
        ),
        E::steps(
            &["time sync"],
            vec![
                labelled("Time Sync Status", "timedatectl"),
                labelled("NTP Status", "sudo systemctl status systemd-timesyncd"),
            ],
        ),
        // Hardware
        E::steps(
            &["pi hardware"],
            vec![
                labelled("Hardware Info", "cat /proc/cpuinfo"),
                labelled(
                    "Memory Info",
                    "grep -E 'MemTotal|MemFree|MemAvailable' /proc/meminfo",
                ),
                labelled("USB Devices", "lsusb"),
            ],
        ),
        E::steps(
            &["eeprom status"],
            vec![labelled("Firmware Status", "sudo rpi-eeprom-update")],
        ),
        E::command(
            &["help"],
            format!("printf '%s\\n' {}", shell_quote(&help_text())),
        ),
    ]
}

/// The built-in phrase table.
pub fn builtin_table() -> PhraseTable {
    // Entries are static and covered by tests
    PhraseTable::from_entries(builtin_entries()).unwrap_or_default()
}
