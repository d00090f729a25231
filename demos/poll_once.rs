//! Example: Polling a device once
//!
//! Run with: cargo run --example poll_once -- 192.168.1.50
//!
//! This example demonstrates:
//! - Building a descriptor table
//! - Configuring the Modbus TCP client
//! - A single-shot poll printed to the console

use modbus_monitor::{
    Client, ClientConfig, ConsoleSink, DatasetDescriptor, DescriptorTable, ElementType,
    FormatKind, Poller, PollerConfig,
};
use std::net::{IpAddr, Ipv4Addr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> modbus_monitor::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,modbus_monitor=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ip: IpAddr = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .map_err(|e| modbus_monitor::MonitorError::invalid_parameter("ip", format!("{}", e)))?,
        None => Ipv4Addr::new(192, 168, 1, 50).into(),
    };

    // =========================================================================
    // What to read
    // =========================================================================

    let table = DescriptorTable::new(vec![
        DatasetDescriptor::new(30005, ElementType::Str32, FormatKind::Utf8)
            .with_description("device name"),
        DatasetDescriptor::new(30201, ElementType::U32, FormatKind::Enum)
            .with_description("status"),
        DatasetDescriptor::new(30775, ElementType::S32, FormatKind::Fix0)
            .with_description("AC power")
            .with_unit("W"),
        DatasetDescriptor::new(30529, ElementType::U32, FormatKind::Fix3)
            .with_description("total yield")
            .with_unit("kWh"),
        DatasetDescriptor::new(30953, ElementType::S32, FormatKind::Fix1)
            .with_description("internal temperature")
            .with_unit("°C"),
    ])?;

    println!("Columns: time, {}", table.column_headers().join(", "));

    // =========================================================================
    // Poll once
    // =========================================================================

    let client = Client::new(ClientConfig::new(ip).with_unit_id(3));
    let sink = ConsoleSink::stdout(&table);
    let mut poller = Poller::new(client, sink, table, PollerConfig::default().single_shot())?;

    let report = poller.run_single_shot()?;
    for fault in &report.faults {
        println!("Fault at {:?}: {}", fault.address, fault.message);
    }

    Ok(())
}
