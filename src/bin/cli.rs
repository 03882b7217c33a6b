use clap::{App, Arg, ArgMatches, SubCommand};
use skybus::{
    config,
    time,
    topic::{parse_fields, Message, TopicMetadata},
    topics::{self, BatteryStatus, SensorGps, SensorTemperature},
    Broker, BrokerConfig, BusError, NodeStatus, Publication, Result, WakeReason,
};
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("skybus-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("skybus publish/subscribe broker diagnostics")
        .subcommand(SubCommand::with_name("topics").about("List built-in topics"))
        .subcommand(
            SubCommand::with_name("fields")
                .about("Show the field layout of a topic")
                .arg(
                    Arg::with_name("topic")
                        .help("Topic name")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("demo")
                .about("Run simulated sensors and print node status and rates")
                .arg(
                    Arg::with_name("duration_ms")
                        .short("d")
                        .long("duration-ms")
                        .value_name("MS")
                        .help("How long to run")
                        .default_value("1000")
                        .takes_value(true),
                )
                .arg(rate_arg()),
        )
        .subcommand(
            SubCommand::with_name("listen")
                .about("Print samples of a topic published by the simulated sensors")
                .arg(
                    Arg::with_name("topic")
                        .help("Topic name")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("instance")
                        .short("i")
                        .long("instance")
                        .value_name("INSTANCE")
                        .help("Topic instance")
                        .default_value("0")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("count")
                        .short("c")
                        .long("count")
                        .value_name("COUNT")
                        .help("Number of samples to print")
                        .default_value("5")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("timeout_ms")
                        .short("t")
                        .long("timeout-ms")
                        .value_name("MS")
                        .help("Give up after this long without data")
                        .default_value("1000")
                        .takes_value(true),
                )
                .arg(rate_arg()),
        )
        .subcommand(SubCommand::with_name("info").about("Show version and limits"))
        .get_matches();

    match matches.subcommand() {
        ("topics", Some(_)) => list_topics(),
        ("fields", Some(m)) => show_fields(m.value_of("topic").unwrap_or_default()),
        ("demo", Some(m)) => run_demo(parse_arg(m, "duration_ms")?, parse_arg(m, "rate_hz")?),
        ("listen", Some(m)) => run_listen(
            m.value_of("topic").unwrap_or_default(),
            parse_arg(m, "instance")?,
            parse_arg(m, "count")?,
            parse_arg(m, "timeout_ms")?,
            parse_arg(m, "rate_hz")?,
        ),
        ("info", Some(_)) => {
            show_info();
            Ok(())
        }
        _ => {
            println!("{}", matches.usage());
            Ok(())
        }
    }
}

fn rate_arg() -> Arg<'static, 'static> {
    Arg::with_name("rate_hz")
        .short("r")
        .long("rate-hz")
        .value_name("HZ")
        .help("Publish rate of each simulated sensor")
        .default_value("50")
        .takes_value(true)
}

fn parse_arg<T: FromStr>(matches: &ArgMatches<'_>, name: &str) -> Result<T> {
    let raw = matches.value_of(name).unwrap_or_default();
    raw.parse()
        .map_err(|_| BusError::invalid_parameter(name, format!("cannot parse '{}'", raw)))
}

fn find_topic(name: &str) -> Result<&'static TopicMetadata> {
    topics::find_by_name(name)
        .ok_or_else(|| BusError::invalid_parameter("topic", format!("unknown topic '{}'", name)))
}

fn list_topics() -> Result<()> {
    println!("{:>4}  {:<24} {:>6} {:>7}", "ID", "NAME", "SIZE", "FIELDS");
    for meta in topics::TOPICS {
        let fields = parse_fields(meta)?;
        println!("{:>4}  {:<24} {:>6} {:>7}", meta.id, meta.name, meta.size, fields.len());
    }
    Ok(())
}

fn show_fields(name: &str) -> Result<()> {
    let meta = find_topic(name)?;
    println!("{} ({} bytes)", meta.name, meta.size);
    println!("{:>6}  {:<14} {:>5}  NAME", "OFFSET", "TYPE", "SIZE");
    for field in parse_fields(meta)? {
        let ty = if field.count == 1 {
            field.ty.c_type().to_string()
        } else {
            format!("{}[{}]", field.ty.c_type(), field.count)
        };
        println!("{:>6}  {:<14} {:>5}  {}", field.offset, ty, field.size(), field.name);
    }
    Ok(())
}

fn show_info() {
    println!("skybus {}", skybus::VERSION);
    println!("  max instances per topic: {}", config::MAX_INSTANCES);
    println!("  max queue size:          {}", config::MAX_QUEUE_SIZE);
    println!("  default topic table:     {}", config::DEFAULT_MAX_TOPICS);
    println!("  built-in topics:         {}", topics::TOPICS.len());
}

/// Simulated sensor producers on their own threads
struct Simulation {
    stop: Arc<AtomicBool>,
    workers: Vec<(&'static str, JoinHandle<Result<u64>>)>,
}

impl Simulation {
    fn start(broker: &Broker, rate_hz: u64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_micros(1_000_000 / rate_hz.max(1));
        let mut simulation = Self {
            stop,
            workers: Vec::new(),
        };

        simulation.spawn(Publication::new(broker), period, |tick| SensorTemperature {
            timestamp: time::absolute_time_us(),
            device_id: 0x0001_2001,
            temperature: 21.5 + (tick as f32 * 0.1).sin(),
        });

        for receiver in 0..2u32 {
            simulation.spawn(Publication::new_multi(broker), period, move |tick| SensorGps {
                timestamp: time::absolute_time_us(),
                latitude_deg: 47.397_742 + tick as f64 * 1e-7,
                longitude_deg: 8.545_594 + receiver as f64 * 1e-6,
                altitude_msl_m: 488.0 + receiver as f32 * 0.3,
                eph: 0.8,
                epv: 1.2,
                device_id: 0x0002_0000 + receiver,
                fix_type: 3,
                satellites_used: 14 + receiver as u8,
                ..Default::default()
            });
        }

        simulation.spawn(Publication::new(broker), period * 5, |tick| BatteryStatus {
            timestamp: time::absolute_time_us(),
            voltage_v: 16.8 - tick as f32 * 0.001,
            current_a: 12.5,
            remaining: (1.0 - tick as f32 * 0.0005).max(0.0),
            temperature: 31.0,
            cell_count: 4,
            connected: 1,
            ..Default::default()
        });

        simulation
    }

    fn spawn<T, F>(&mut self, mut publication: Publication<T>, period: Duration, mut sample: F)
    where
        T: Message,
        F: FnMut(u64) -> T + Send + 'static,
    {
        let stop = self.stop.clone();
        let handle = thread::spawn(move || {
            let mut tick = 0u64;
            while !stop.load(Ordering::Relaxed) {
                publication.publish(&sample(tick))?;
                tick += 1;
                thread::sleep(period);
            }
            Ok(tick)
        });
        self.workers.push((T::metadata().name, handle));
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        for (name, worker) in self.workers {
            match worker.join() {
                Ok(Ok(published)) => log::debug!("{} producer published {} samples", name, published),
                Ok(Err(e)) => log::warn!("{} producer failed: {}", name, e),
                Err(_) => log::error!("{} producer panicked", name),
            }
        }
    }
}

fn run_demo(duration_ms: u64, rate_hz: u64) -> Result<()> {
    let broker = Broker::new(BrokerConfig::default())?;
    let duration = Duration::from_millis(duration_ms);

    let mut temperature = broker.subscribe(SensorTemperature::metadata());
    let mut gps0 = broker.subscribe_multi(SensorGps::metadata(), 0);
    let mut gps1 = broker.subscribe_multi(SensorGps::metadata(), 1);
    let mut battery = broker.subscribe(BatteryStatus::metadata());
    battery.set_interval_ms(200);

    let simulation = Simulation::start(&broker, rate_hz);
    let started = Instant::now();
    let before = broker.status();

    let mut received = [0u64; 4];
    let mut last_temperature = SensorTemperature::default();
    let mut gps = SensorGps::default();
    let mut last_battery = BatteryStatus::default();

    while started.elapsed() < duration {
        let wait = (duration - started.elapsed().min(duration)).min(Duration::from_millis(100));
        let reason = broker.poll(&mut [&mut temperature, &mut gps0, &mut gps1, &mut battery], wait)?;
        if reason == WakeReason::Timeout {
            continue;
        }

        if temperature.update(&mut last_temperature)? {
            received[0] += 1;
        }
        if gps0.update(&mut gps)? {
            received[1] += 1;
        }
        if gps1.update(&mut gps)? {
            received[2] += 1;
        }
        if battery.update(&mut last_battery)? {
            received[3] += 1;
        }
    }

    let elapsed = started.elapsed();
    let after = broker.status();
    simulation.stop();

    print_status(&before, &after, elapsed);
    println!();
    println!(
        "received: temperature {}, gps[0] {}, gps[1] {}, battery {} (throttled to 5 Hz)",
        received[0], received[1], received[2], received[3]
    );
    println!(
        "last temperature {:.2} C, gps instances advertised {}",
        last_temperature.temperature,
        broker.group_count(SensorGps::metadata())
    );
    Ok(())
}

fn print_status(before: &[NodeStatus], after: &[NodeStatus], elapsed: Duration) {
    println!(
        "{:<24} {:>4} {:>5} {:>4} {:>9} {:>9}",
        "TOPIC NAME", "INST", "#SUB", "#Q", "#PUB'D", "RATE(Hz)"
    );
    for status in after {
        let baseline = before
            .iter()
            .find(|earlier| earlier.same_node(status))
            .cloned()
            .unwrap_or(NodeStatus {
                generation: 0,
                ..status.clone()
            });
        println!(
            "{:<24} {:>4} {:>5} {:>4} {:>9} {:>9.1}",
            status.name,
            status.instance,
            status.subscribers,
            status.queue_size,
            status.generation,
            status.publish_rate_hz(&baseline, elapsed)
        );
    }
}

fn run_listen(name: &str, instance: u8, count: usize, timeout_ms: u64, rate_hz: u64) -> Result<()> {
    let meta = find_topic(name)?;
    let broker = Broker::new(BrokerConfig::default())?;
    let mut subscription = broker.subscribe_multi(meta, instance);
    let simulation = Simulation::start(&broker, rate_hz);

    let mut buffer = vec![0u8; meta.size];
    let mut printed = 0;
    while printed < count {
        if !subscription.updated_blocking(Duration::from_millis(timeout_ms))? {
            println!("no {} instance {} data within {} ms", meta.name, instance, timeout_ms);
            break;
        }
        if subscription.update_bytes(&mut buffer)? {
            printed += 1;
            println!(
                "{} instance {} (generation {}):",
                meta.name,
                instance,
                subscription.last_generation()
            );
            print!("{}", broker.format_message(meta, &buffer)?);
        }
    }

    simulation.stop();
    Ok(())
}
