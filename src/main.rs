use anyhow::{anyhow, bail, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use netledger::{
    cidr,
    config::InventoryConfig,
    inventory::{
        observations_from_services, DeviceObservation, DeviceStatus, DeviceType, InventoryService,
        IpReservation, OuiVendorTable, Subnet,
    },
    logging,
    probe::{NetworkProber, ProbedService},
    scan::{ScanOrchestrator, TargetParser},
    session::{DiscoveredService, ScanService, ScanType, SessionStatus, SessionTracker},
    store::Store,
};

fn ports_arg() -> Arg {
    Arg::new("ports")
        .short('p')
        .long("ports")
        .value_name("PORTS")
        .help("Comma separated ports or ranges, e.g. 22,80,8000-8010")
        .value_delimiter(',')
}

fn full_arg() -> Arg {
    Arg::new("full")
        .long("full")
        .help("Probe ports 1-1024 plus well-known high ports")
        .action(ArgAction::SetTrue)
}

fn reconcile_arg() -> Arg {
    Arg::new("reconcile")
        .long("reconcile")
        .help("Feed reachable hosts into the device inventory")
        .action(ArgAction::SetTrue)
}

fn subnet_filter_arg() -> Arg {
    Arg::new("subnet")
        .long("subnet")
        .value_name("SUBNET")
        .help("Subnet id or CIDR")
}

fn avoid_dhcp_arg() -> Arg {
    Arg::new("avoid-dhcp")
        .long("avoid-dhcp")
        .help("Treat the DHCP pool as unavailable")
        .action(ArgAction::SetTrue)
}

fn build_cli() -> Command {
    Command::new("netledger")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Network inventory and discovery")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: ~/.netledger.toml)")
                .global(true),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("FILE")
                .help("Inventory snapshot file (default: ~/.netledger/inventory.json)")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output (repeat for trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("scan")
                .about("Scan a target directly and print what answers")
                .arg(Arg::new("target").value_name("TARGET").required(true))
                .arg(ports_arg())
                .arg(full_arg())
                .arg(reconcile_arg()),
        )
        .subcommand(
            Command::new("expand")
                .about("Print the addresses a target expands to")
                .arg(Arg::new("target").value_name("TARGET").required(true)),
        )
        .subcommand(
            Command::new("queue")
                .about("Run a scan through the session queue and wait for it")
                .arg(Arg::new("target").value_name("TARGET").required(true))
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_name("TYPE")
                        .help("quick, full or custom")
                        .default_value("quick"),
                )
                .arg(ports_arg())
                .arg(full_arg())
                .arg(reconcile_arg())
                .arg(
                    Arg::new("wait")
                        .long("wait")
                        .value_name("SECONDS")
                        .help("Give up waiting after this many seconds")
                        .default_value("3600")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("sessions").about("List recent scan sessions").arg(
                Arg::new("limit")
                    .short('n')
                    .long("limit")
                    .default_value("20")
                    .value_parser(clap::value_parser!(usize)),
            ),
        )
        .subcommand(
            Command::new("results")
                .about("Show the services found by a session, or the latest for a target")
                .arg(Arg::new("session").value_name("SESSION_OR_TARGET").required(true)),
        )
        .subcommand(
            Command::new("subnet")
                .about("Manage subnets and plan addresses")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("cidr").required(true))
                        .arg(Arg::new("gateway").long("gateway").value_name("IP"))
                        .arg(Arg::new("dhcp").long("dhcp").value_name("START-END"))
                        .arg(
                            Arg::new("dns")
                                .long("dns")
                                .value_name("IPS")
                                .value_delimiter(','),
                        )
                        .arg(
                            Arg::new("vlan")
                                .long("vlan")
                                .value_parser(clap::value_parser!(u16)),
                        )
                        .arg(Arg::new("description").long("description")),
                )
                .subcommand(Command::new("list"))
                .subcommand(Command::new("show").arg(Arg::new("subnet").required(true)))
                .subcommand(
                    Command::new("available")
                        .arg(Arg::new("subnet").required(true))
                        .arg(avoid_dhcp_arg())
                        .arg(
                            Arg::new("limit")
                                .short('n')
                                .long("limit")
                                .default_value("32")
                                .value_parser(clap::value_parser!(usize)),
                        ),
                )
                .subcommand(
                    Command::new("next")
                        .arg(Arg::new("subnet").required(true))
                        .arg(avoid_dhcp_arg()),
                )
                .subcommand(Command::new("delete").arg(Arg::new("subnet").required(true))),
        )
        .subcommand(
            Command::new("device")
                .about("Record observations and inspect tracked devices")
                .subcommand_required(true)
                .subcommand(
                    Command::new("observe")
                        .arg(Arg::new("ip").required(true))
                        .arg(Arg::new("mac").long("mac"))
                        .arg(Arg::new("hostname").long("hostname"))
                        .arg(Arg::new("status").long("status").default_value("online"))
                        .arg(Arg::new("type").long("type"))
                        .arg(subnet_filter_arg()),
                )
                .subcommand(Command::new("list").arg(subnet_filter_arg()))
                .subcommand(
                    Command::new("history").arg(Arg::new("device").required(true)).arg(
                        Arg::new("limit")
                            .short('n')
                            .long("limit")
                            .default_value("50")
                            .value_parser(clap::value_parser!(usize)),
                    ),
                )
                .subcommand(Command::new("conflicts").arg(subnet_filter_arg()))
                .subcommand(Command::new("delete").arg(Arg::new("device").required(true))),
        )
        .subcommand(
            Command::new("reserve")
                .about("Hold addresses for planned use")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("subnet").required(true))
                        .arg(Arg::new("ip").required(true))
                        .arg(Arg::new("mac").long("mac"))
                        .arg(Arg::new("description").long("description").default_value(""))
                        .arg(Arg::new("purpose").long("purpose").default_value(""))
                        .arg(
                            Arg::new("expires-days")
                                .long("expires-days")
                                .value_parser(clap::value_parser!(i64)),
                        ),
                )
                .subcommand(Command::new("list").arg(subnet_filter_arg()))
                .subcommand(Command::new("delete").arg(Arg::new("reservation").required(true))),
        )
}

/// `22,80,8000-8010` style port lists
fn parse_ports(matches: &ArgMatches) -> anyhow::Result<Vec<u16>> {
    let mut ports = Vec::new();
    let Some(values) = matches.get_many::<String>("ports") else {
        return Ok(ports);
    };

    for value in values {
        let value = value.trim();
        if let Some((start, end)) = value.split_once('-') {
            let start: u16 = start.parse().with_context(|| format!("bad port range {}", value))?;
            let end: u16 = end.parse().with_context(|| format!("bad port range {}", value))?;
            if start == 0 || start > end {
                bail!("bad port range {}", value);
            }
            ports.extend(start..=end);
        } else {
            let port: u16 = value.parse().with_context(|| format!("bad port {}", value))?;
            if port == 0 {
                bail!("port 0 is not scannable");
            }
            ports.push(port);
        }
    }
    Ok(ports)
}

fn parse_ip(value: &str) -> anyhow::Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .with_context(|| format!("not an IPv4 address: {}", value))
}

fn parse_id(value: &str, what: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("not a {} id: {}", what, value))
}

/// Accept a subnet id or its CIDR
async fn resolve_subnet(inventory: &InventoryService, value: &str) -> anyhow::Result<Subnet> {
    if let Ok(id) = Uuid::parse_str(value) {
        return inventory
            .get_subnet(id)
            .await
            .ok_or_else(|| anyhow!("no subnet with id {}", id));
    }
    inventory
        .find_by_network(value)
        .await?
        .ok_or_else(|| anyhow!("no subnet {}", value))
}

async fn subnet_filter(inventory: &InventoryService, matches: &ArgMatches) -> anyhow::Result<Option<Uuid>> {
    match matches.get_one::<String>("subnet") {
        Some(value) => Ok(Some(resolve_subnet(inventory, value).await?.id)),
        None => Ok(None),
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "[!] Interrupted, finishing hosts in flight...".bright_yellow());
            token.cancel();
        }
    });
    cancel
}

fn print_probed(services: &[ProbedService]) {
    if services.is_empty() {
        println!("{}", "No open services found".bright_yellow());
        return;
    }
    for s in services {
        let name = if s.hostname != s.host {
            format!(" ({})", s.hostname)
        } else {
            String::new()
        };
        println!(
            "{}{} {:>5}/tcp {:<12} {:>7.1} ms  {}",
            s.host.bright_cyan(),
            name.dimmed(),
            s.port.to_string().bright_green(),
            s.service,
            s.latency_ms,
            s.banner.as_deref().unwrap_or("").dimmed()
        );
    }
}

fn print_discovered(services: &[DiscoveredService]) {
    if services.is_empty() {
        println!("{}", "No services recorded".bright_yellow());
        return;
    }
    for s in services {
        let state = if s.active { "active".bright_green() } else { "inactive".dimmed() };
        println!(
            "{} {:>5}/tcp {:<12} {:<8} {}",
            s.host.bright_cyan(),
            s.port,
            s.service,
            state,
            s.banner.as_deref().unwrap_or("").dimmed()
        );
    }
}

fn colour_status(status: SessionStatus) -> ColoredString {
    match status {
        SessionStatus::Pending => status.to_string().bright_blue(),
        SessionStatus::Running => status.to_string().bright_yellow(),
        SessionStatus::Completed => status.to_string().bright_green(),
        SessionStatus::Failed => status.to_string().bright_red(),
    }
}

async fn reconcile_hosts(inventory: &InventoryService, services: &[DiscoveredService]) -> anyhow::Result<()> {
    for observation in observations_from_services(services) {
        let device = inventory.reconcile_device(observation).await?;
        println!("{} device {} at {}", "[~]".bright_blue(), device.id, device.ip);
    }
    Ok(())
}

async fn run_scan(config: &InventoryConfig, inventory: &InventoryService, matches: &ArgMatches) -> anyhow::Result<()> {
    let target = matches.get_one::<String>("target").map(String::as_str).unwrap_or_default();
    let ports = parse_ports(matches)?;
    let full = matches.get_flag("full");

    let prober = Arc::new(NetworkProber::new(config.probe.clone()));
    let orchestrator = ScanOrchestrator::new(prober, config);
    let cancel = cancel_on_ctrl_c();

    let report = orchestrator.scan_range_report(target, &ports, full, &cancel).await?;
    print_probed(&report.services);
    println!(
        "{} {}/{} host(s) up, {} service(s){}",
        "[✓]".bright_green(),
        report.hosts_reachable,
        report.hosts_targeted,
        report.services.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );

    if matches.get_flag("reconcile") {
        let session = Uuid::new_v4();
        let services: Vec<DiscoveredService> = report
            .services
            .into_iter()
            .map(|probe| DiscoveredService::from_probe(session, probe))
            .collect();
        reconcile_hosts(inventory, &services).await?;
    }
    Ok(())
}

async fn run_queue(
    config: &InventoryConfig,
    store: Arc<Store>,
    inventory: &InventoryService,
    matches: &ArgMatches,
) -> anyhow::Result<()> {
    let target = matches.get_one::<String>("target").map(String::as_str).unwrap_or_default();
    let scan_type: ScanType = matches
        .get_one::<String>("type")
        .map(String::as_str)
        .unwrap_or("quick")
        .parse()?;
    let ports = parse_ports(matches)?;
    let full = matches.get_flag("full").then_some(true);
    let wait = Duration::from_secs(*matches.get_one::<u64>("wait").unwrap_or(&3600));

    let prober = Arc::new(NetworkProber::new(config.probe.clone()));
    let orchestrator = ScanOrchestrator::new(prober, config);
    let service = ScanService::start(store, orchestrator, config).await?;
    let tracker = service.tracker().clone();

    let id = tracker
        .start_scan(target, scan_type, (!ports.is_empty()).then_some(ports), full)
        .await?;
    println!("{} session {} queued", "[~]".bright_blue(), id);

    let session = tracker.wait_for(id, wait).await;
    service.shutdown().await;
    let session = session?;

    println!(
        "{} session {} {}: {}/{} host(s) up, {} service(s), {} gone",
        "[✓]".bright_green(),
        session.id,
        colour_status(session.status),
        session.hosts_reachable,
        session.hosts_targeted,
        session.services_found,
        session.services_inactivated
    );
    if let Some(error) = &session.error {
        println!("{} {}", "[!]".bright_red(), error);
    }

    let services = tracker.get_results(id).await;
    print_discovered(&services);

    if matches.get_flag("reconcile") && session.status == SessionStatus::Completed {
        reconcile_hosts(inventory, &services).await?;
    }
    Ok(())
}

async fn run_subnet(inventory: &InventoryService, matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            let network = cidr::parse_ipv4_cidr(sub.get_one::<String>("cidr").map(String::as_str).unwrap_or_default())?;
            let mut subnet = Subnet::new(name, network);

            if let Some(gateway) = sub.get_one::<String>("gateway") {
                subnet = subnet.with_gateway(parse_ip(gateway)?);
            }
            if let Some(range) = sub.get_one::<String>("dhcp") {
                let (start, end) = range
                    .split_once('-')
                    .ok_or_else(|| anyhow!("DHCP range must look like START-END"))?;
                subnet = subnet.with_dhcp_range(parse_ip(start)?, parse_ip(end)?);
            }
            if let Some(dns) = sub.get_many::<String>("dns") {
                subnet.dns_servers = dns.map(|ip| parse_ip(ip)).collect::<anyhow::Result<_>>()?;
            }
            if let Some(vlan) = sub.get_one::<u16>("vlan") {
                subnet = subnet.with_vlan(*vlan);
            }
            subnet.description = sub.get_one::<String>("description").cloned();

            let subnet = inventory.create_subnet(subnet).await?;
            println!("{} subnet {} {} ({})", "[✓]".bright_green(), subnet.id, subnet.name.bold(), subnet.network);
        }
        Some(("list", _)) => {
            for subnet in inventory.list_subnets().await {
                let summary = inventory.get_subnet_summary(subnet.id).await?;
                println!(
                    "{} {:<18} {:<16} {:>6.1}% used  {}",
                    subnet.id.to_string().dimmed(),
                    subnet.network.to_string().bright_cyan(),
                    subnet.name,
                    summary.usage_percent,
                    subnet.vlan_id.map(|v| format!("vlan {}", v)).unwrap_or_default()
                );
            }
        }
        Some(("show", sub)) => {
            let subnet = resolve_subnet(inventory, sub.get_one::<String>("subnet").map(String::as_str).unwrap_or_default()).await?;
            let summary = inventory.get_subnet_summary(subnet.id).await?;
            println!("{} {} ({})", "Subnet".bold(), subnet.name.bright_cyan(), subnet.network);
            if let Some(gateway) = subnet.gateway {
                println!("  gateway      {}", gateway);
            }
            if let Some((start, end)) = subnet.dhcp_range() {
                println!("  dhcp         {} - {} ({} addresses)", start, end, summary.dhcp_range_size);
            }
            println!("  hosts        {}", summary.total_hosts);
            println!("  used         {}", summary.used);
            println!("  available    {}", summary.available.to_string().bright_green());
            println!("  usage        {:.1}%", summary.usage_percent);
            println!("  devices      {} online, {} offline", summary.online_devices, summary.offline_devices);
        }
        Some(("available", sub)) => {
            let subnet = resolve_subnet(inventory, sub.get_one::<String>("subnet").map(String::as_str).unwrap_or_default()).await?;
            let limit = *sub.get_one::<usize>("limit").unwrap_or(&32);
            let free = inventory.get_available(subnet.id, sub.get_flag("avoid-dhcp")).await?;
            for ip in free.iter().take(limit) {
                println!("{}", ip);
            }
            if free.len() > limit {
                println!("{}", format!("... {} more", free.len() - limit).dimmed());
            }
        }
        Some(("next", sub)) => {
            let subnet = resolve_subnet(inventory, sub.get_one::<String>("subnet").map(String::as_str).unwrap_or_default()).await?;
            match inventory.find_next_available(subnet.id, sub.get_flag("avoid-dhcp")).await? {
                Some(ip) => println!("{}", ip.to_string().bright_green()),
                None => println!("{}", "Subnet is full".bright_red()),
            }
        }
        Some(("delete", sub)) => {
            let subnet = resolve_subnet(inventory, sub.get_one::<String>("subnet").map(String::as_str).unwrap_or_default()).await?;
            inventory.delete_subnet(subnet.id).await?;
            println!("{} deleted {}", "[✓]".bright_green(), subnet.network);
        }
        _ => unreachable!("subcommand required"),
    }
    Ok(())
}

async fn run_device(inventory: &InventoryService, matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("observe", sub)) => {
            let mut observation = DeviceObservation::new(parse_ip(sub.get_one::<String>("ip").map(String::as_str).unwrap_or_default())?)
                .with_source(netledger::inventory::DiscoverySource::Manual);
            observation.mac = sub.get_one::<String>("mac").cloned();
            observation.hostname = sub.get_one::<String>("hostname").cloned();
            if let Some(status) = sub.get_one::<String>("status") {
                observation.status = status.parse::<DeviceStatus>()?;
            }
            if let Some(device_type) = sub.get_one::<String>("type") {
                observation.device_type = Some(device_type.parse::<DeviceType>()?);
            }
            observation.subnet_id = subnet_filter(inventory, sub).await?;

            let device = inventory.reconcile_device(observation).await?;
            println!(
                "{} device {} at {} ({})",
                "[✓]".bright_green(),
                device.id,
                device.ip,
                device.vendor.as_deref().unwrap_or("unknown vendor")
            );
        }
        Some(("list", sub)) => {
            let subnet = subnet_filter(inventory, sub).await?;
            for device in inventory.list_devices(subnet).await {
                println!(
                    "{:<15} {:<17} {:<24} {:<8} {}",
                    device.ip.to_string().bright_cyan(),
                    device.mac.as_deref().unwrap_or("-"),
                    device.hostname.as_deref().unwrap_or("-"),
                    device.status,
                    device.id.to_string().dimmed()
                );
            }
        }
        Some(("history", sub)) => {
            let id = parse_id(sub.get_one::<String>("device").map(String::as_str).unwrap_or_default(), "device")?;
            let limit = *sub.get_one::<usize>("limit").unwrap_or(&50);
            for entry in inventory.get_history(id, limit).await {
                println!(
                    "{} {:<15} {} -> {}",
                    entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind.to_string().bright_yellow(),
                    entry.before.as_deref().unwrap_or("-"),
                    entry.after.as_deref().unwrap_or("-")
                );
            }
        }
        Some(("conflicts", sub)) => {
            let subnet = subnet_filter(inventory, sub).await?;
            let conflicts = inventory.detect_conflicts(subnet).await;
            if conflicts.is_empty() {
                println!("{}", "No IP conflicts".bright_green());
            }
            for device in conflicts {
                println!(
                    "{} {:<15} {:<17} first seen {}",
                    "[!]".bright_red(),
                    device.ip,
                    device.mac.as_deref().unwrap_or("-"),
                    device.first_seen.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Some(("delete", sub)) => {
            let id = parse_id(sub.get_one::<String>("device").map(String::as_str).unwrap_or_default(), "device")?;
            let device = inventory.delete_device(id).await?;
            println!("{} deleted device at {}", "[✓]".bright_green(), device.ip);
        }
        _ => unreachable!("subcommand required"),
    }
    Ok(())
}

async fn run_reserve(inventory: &InventoryService, matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("add", sub)) => {
            let subnet = resolve_subnet(inventory, sub.get_one::<String>("subnet").map(String::as_str).unwrap_or_default()).await?;
            let ip = parse_ip(sub.get_one::<String>("ip").map(String::as_str).unwrap_or_default())?;
            let description = sub.get_one::<String>("description").map(String::as_str).unwrap_or_default();
            let purpose = sub.get_one::<String>("purpose").map(String::as_str).unwrap_or_default();

            let mut reservation = IpReservation::new(subnet.id, ip, description, purpose);
            reservation.mac = sub.get_one::<String>("mac").cloned();
            if let Some(days) = sub.get_one::<i64>("expires-days") {
                reservation.expires_at = Some(chrono::Utc::now() + chrono::Duration::days(*days));
            }

            let reservation = inventory.create_reservation(reservation).await?;
            println!("{} reserved {} ({})", "[✓]".bright_green(), reservation.ip, reservation.id);
        }
        Some(("list", sub)) => {
            let subnet = subnet_filter(inventory, sub).await?;
            let now = chrono::Utc::now();
            for r in inventory.list_reservations(subnet).await {
                let state = if r.is_effective(now) { "held".bright_green() } else { "lapsed".dimmed() };
                println!(
                    "{:<15} {:<6} {:<17} {:<20} {}",
                    r.ip.to_string().bright_cyan(),
                    state,
                    r.mac.as_deref().unwrap_or("-"),
                    r.purpose,
                    r.id.to_string().dimmed()
                );
            }
        }
        Some(("delete", sub)) => {
            let id = parse_id(sub.get_one::<String>("reservation").map(String::as_str).unwrap_or_default(), "reservation")?;
            let reservation = inventory.delete_reservation(id).await?;
            println!("{} released {}", "[✓]".bright_green(), reservation.ip);
        }
        _ => unreachable!("subcommand required"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => InventoryConfig::from_toml_file(path)?,
        None => InventoryConfig::load_default_config(),
    };
    if let Some(path) = matches.get_one::<String>("store") {
        config = config.with_storage_path(path);
    }

    let verbose = matches.get_count("verbose");
    logging::init(&logging::level_for_verbosity(&config.log_level, verbose));

    let store = Arc::new(
        Store::open(config.storage_path())
            .await
            .with_context(|| format!("opening {}", config.storage_path().display()))?,
    );
    let inventory = InventoryService::with_vendor_lookup(store.clone(), Arc::new(OuiVendorTable::builtin()));

    match matches.subcommand() {
        Some(("scan", sub)) => run_scan(&config, &inventory, sub).await?,
        Some(("expand", sub)) => {
            let target = sub.get_one::<String>("target").map(String::as_str).unwrap_or_default();
            for address in TargetParser::from_limits(&config.scan).expand(target)? {
                println!("{}", address);
            }
        }
        Some(("queue", sub)) => run_queue(&config, store.clone(), &inventory, sub).await?,
        Some(("sessions", sub)) => {
            let (tx, _rx) = mpsc::unbounded_channel();
            let tracker = SessionTracker::new(store.clone(), tx, TargetParser::from_limits(&config.scan));
            let limit = *sub.get_one::<usize>("limit").unwrap_or(&20);
            for session in tracker.get_recent_scans(limit).await {
                println!(
                    "{} {:<10} {:<20} {:<6} {:>3} service(s)  {}",
                    session.id.to_string().dimmed(),
                    colour_status(session.status),
                    session.target.bright_cyan(),
                    session.scan_type,
                    session.services_found,
                    session.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Some(("results", sub)) => {
            let (tx, _rx) = mpsc::unbounded_channel();
            let tracker = SessionTracker::new(store.clone(), tx, TargetParser::from_limits(&config.scan));
            let value = sub.get_one::<String>("session").map(String::as_str).unwrap_or_default();
            let services = match Uuid::parse_str(value) {
                Ok(id) => tracker.get_results(id).await,
                Err(_) => tracker.get_latest_for_target(value).await,
            };
            print_discovered(&services);
        }
        Some(("subnet", sub)) => run_subnet(&inventory, sub).await?,
        Some(("device", sub)) => run_device(&inventory, sub).await?,
        Some(("reserve", sub)) => run_reserve(&inventory, sub).await?,
        _ => unreachable!("subcommand required"),
    }

    Ok(())
}
