//! Example: Continuous CSV logging
//!
//! Run with: cargo run --example csv_logger -- 192.168.1.50 pv.csv
//!
//! Polls every 10 seconds, writes every 6 samples to a daily CSV file and
//! prints samples and faults as they happen. Press Enter to stop.

use modbus_monitor::{
    Client, ClientConfig, CsvLogSink, DatasetDescriptor, DescriptorTable, ElementType,
    FormatKind, MonitorError, PollEvent, Poller, PollerConfig,
};
use std::net::{IpAddr, Ipv4Addr};
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> modbus_monitor::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,modbus_monitor=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let ip: IpAddr = match args.next() {
        Some(arg) => arg
            .parse()
            .map_err(|e| MonitorError::invalid_parameter("ip", format!("{}", e)))?,
        None => Ipv4Addr::new(192, 168, 1, 50).into(),
    };
    let path = args.next().unwrap_or_else(|| "pv.csv".to_string());

    let table = DescriptorTable::new(vec![
        DatasetDescriptor::new(30775, ElementType::S32, FormatKind::Fix0)
            .with_description("AC power")
            .with_unit("W"),
        DatasetDescriptor::new(30769, ElementType::S32, FormatKind::Fix3)
            .with_description("DC current")
            .with_unit("A"),
        DatasetDescriptor::new(30771, ElementType::S32, FormatKind::Fix2)
            .with_description("DC voltage")
            .with_unit("V"),
        DatasetDescriptor::new(30529, ElementType::U32, FormatKind::Fix3)
            .with_description("total yield")
            .with_unit("kWh"),
    ])?;

    // Fail now rather than at the first flush
    let sink = CsvLogSink::new(&path, table.clone()).with_daily_files(true);
    let today = sink.probe()?;
    println!("Logging to {}", today.display());

    let config = PollerConfig::default()
        .with_interval(Duration::from_secs(10))
        .with_buffer_threshold(6);
    let client = Client::new(ClientConfig::new(ip));

    let (events_tx, events_rx) = crossbeam_channel::bounded(64);
    let poller = Poller::new(client, sink, table, config)?.with_events(events_tx);
    let buffer = poller.buffer();
    let handle = poller.spawn()?;

    // AC power is the first column
    let printer = thread::spawn(move || {
        let mut peak: Option<f64> = None;
        for event in events_rx {
            match event {
                PollEvent::Sample(sample) => {
                    if let Some(power) = sample.values().first().and_then(|v| v.as_f64()) {
                        peak = Some(peak.map_or(power, |p| p.max(power)));
                    }
                    println!("{}", sample.to_record().join(", "));
                }
                PollEvent::Fault(fault) => println!("Fault: {}", fault.message),
            }
        }
        peak
    });

    println!("Press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    if let Some(latest) = buffer.latest() {
        println!("Last sample before stop: {}", latest.to_record().join(", "));
    }

    let (poller, result) = handle.stop();
    if let Err(e) = &result {
        println!("Stopped with error: {}", e);
    }
    println!("{} samples left unwritten", poller.buffer().len());
    drop(poller);

    if let Ok(Some(peak)) = printer.join() {
        println!("Peak AC power: {} W", peak);
    }

    result
}
