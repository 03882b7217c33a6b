use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use skybus::{
    topic::Message,
    topics::{ActuatorMotors, SensorAccel, VehicleCommand},
    Broker, BrokerConfig, Publication,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

fn broker() -> Broker {
    Broker::new(BrokerConfig::default()).unwrap()
}

fn benchmark_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("Publish");

    for subscribers in [0usize, 1, 8].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("sensor_accel", subscribers),
            subscribers,
            |b, &subscribers| {
                let broker = broker();
                let mut publication = Publication::<SensorAccel>::new(&broker);
                publication.advertise().unwrap();
                let _subs: Vec<_> = (0..subscribers)
                    .map(|_| broker.subscribe(SensorAccel::metadata()))
                    .collect();

                let mut sample = SensorAccel::default();
                b.iter(|| {
                    sample.timestamp += 1;
                    publication.publish(black_box(&sample)).unwrap();
                });
            },
        );
    }

    // larger record
    group.bench_function("actuator_motors", |b| {
        let broker = broker();
        let mut publication = Publication::<ActuatorMotors>::new(&broker);
        let sample = ActuatorMotors {
            control: [0.5; 12],
            ..Default::default()
        };
        b.iter(|| publication.publish(black_box(&sample)).unwrap());
    });

    group.finish();
}

fn benchmark_read_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("Subscribe");
    let broker = broker();
    let mut publication = Publication::<SensorAccel>::new(&broker);
    publication.publish(&SensorAccel::default()).unwrap();

    group.bench_function("check_idle", |b| {
        let mut sub = broker.subscribe(SensorAccel::metadata());
        b.iter(|| black_box(sub.updated()));
    });

    group.bench_function("copy", |b| {
        let mut sub = broker.subscribe(SensorAccel::metadata());
        let mut sample = SensorAccel::default();
        b.iter(|| {
            sub.copy(&mut sample).unwrap();
            black_box(&sample);
        });
    });

    group.bench_function("publish_update", |b| {
        let mut sub = broker.subscribe(SensorAccel::metadata());
        let mut sample = SensorAccel::default();
        b.iter(|| {
            publication.publish(&sample).unwrap();
            black_box(sub.update(&mut sample).unwrap());
        });
    });

    group.bench_function("queued_drain_8", |b| {
        let mut commands = Publication::<VehicleCommand>::new(&broker);
        commands.advertise().unwrap();
        let mut sub = broker.subscribe(VehicleCommand::metadata());
        let mut command = VehicleCommand::default();
        b.iter(|| {
            for i in 0..8 {
                command.command = i;
                commands.publish(&command).unwrap();
            }
            while sub.update_queued(&mut command).unwrap() {
                black_box(&command);
            }
        });
    });

    group.finish();
}

fn benchmark_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("Contention");

    for readers in [1usize, 4].iter() {
        group.bench_with_input(
            BenchmarkId::new("publish_with_spinning_readers", readers),
            readers,
            |b, &readers| {
                let broker = broker();
                let mut publication = Publication::<SensorAccel>::new(&broker);
                publication.publish(&SensorAccel::default()).unwrap();

                let stop = Arc::new(AtomicBool::new(false));
                let handles: Vec<_> = (0..readers)
                    .map(|_| {
                        let broker = broker.clone();
                        let stop = stop.clone();
                        thread::spawn(move || {
                            let mut sub = broker.subscribe(SensorAccel::metadata());
                            let mut sample = SensorAccel::default();
                            while !stop.load(Ordering::Relaxed) {
                                let _ = sub.update(&mut sample);
                            }
                        })
                    })
                    .collect();

                let sample = SensorAccel::default();
                b.iter(|| publication.publish(black_box(&sample)).unwrap());

                stop.store(true, Ordering::Relaxed);
                for handle in handles {
                    handle.join().unwrap();
                }
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_publish,
    benchmark_read_paths,
    benchmark_contention
);
criterion_main!(benches);
