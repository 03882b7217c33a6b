//! Concurrent stress tests for high-contention scenarios
//! Tests focused on torn reads, per-reader ordering and node lifetime under churn

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use skybus::{define_topic, topic::Message, Broker, BrokerConfig, Publication, WakeReason};

define_topic! {
    pub struct Pattern("pattern", id = 30) {
        pub a: u64,
        pub b: u64,
        pub c: u64,
        pub d: u64,
        pub tail: [u64; 4],
    }

    pub struct Sequence("sequence", id = 31, queue = 128) {
        pub value: u64,
    }

    pub struct Heartbeat("heartbeat", id = 32) {
        pub beat: u32,
    }
}

fn pattern(value: u64) -> Pattern {
    Pattern {
        a: value,
        b: value,
        c: value,
        d: value,
        tail: [value; 4],
    }
}

fn is_consistent(sample: &Pattern) -> bool {
    let value = sample.a;
    sample.b == value && sample.c == value && sample.d == value && sample.tail == [value; 4]
}

#[cfg(test)]
mod concurrent_stress_tests {
    use super::*;

    /// Test: several producers on one instance never produce a torn record
    #[test]
    fn stress_shared_instance_no_torn_reads() {
        let broker = Broker::new(BrokerConfig::default()).unwrap();
        let writers = 4;
        let readers = 2;
        let per_writer = 2000u64;
        let barrier = Arc::new(Barrier::new(writers + readers));
        let done = Arc::new(AtomicBool::new(false));
        let torn = Arc::new(AtomicUsize::new(0));
        let reads = Arc::new(AtomicUsize::new(0));

        // the node holds a sample before any reader starts
        let mut seed = Publication::<Pattern>::new(&broker);
        seed.publish(&pattern(0)).unwrap();

        let mut producers = Vec::new();
        for writer in 1..=writers as u64 {
            let broker = broker.clone();
            let barrier = barrier.clone();
            let reads = reads.clone();
            producers.push(thread::spawn(move || {
                let mut publication = Publication::<Pattern>::new(&broker);
                publication.advertise().unwrap();
                barrier.wait();
                while reads.load(Ordering::Relaxed) < readers {
                    thread::yield_now();
                }
                for i in 0..per_writer {
                    publication.publish(&pattern(writer << 32 | i)).unwrap();
                }
                // handed back so the node stays advertised while readers run
                publication
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..readers {
            let broker = broker.clone();
            let barrier = barrier.clone();
            let done = done.clone();
            let torn = torn.clone();
            let reads = reads.clone();
            consumers.push(thread::spawn(move || {
                let mut sub = broker.subscribe(Pattern::metadata());
                let mut sample = Pattern::default();
                let mut own_reads = 0;
                barrier.wait();
                while !done.load(Ordering::Relaxed) || own_reads == 0 {
                    sub.copy(&mut sample).unwrap();
                    own_reads += 1;
                    reads.fetch_add(1, Ordering::Relaxed);
                    if !is_consistent(&sample) {
                        torn.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }

        let publications: Vec<_> = producers
            .into_iter()
            .map(|producer| producer.join().unwrap())
            .collect();
        done.store(true, Ordering::Relaxed);
        for consumer in consumers {
            consumer.join().unwrap();
        }

        assert_eq!(torn.load(Ordering::Relaxed), 0);
        assert!(reads.load(Ordering::Relaxed) >= readers);
        assert_eq!(
            broker.stats().total_publications(),
            writers as u64 * per_writer + 1
        );

        drop(publications);
        drop(seed);
        assert_eq!(broker.stats().active_nodes(), 0);
    }

    /// Test: a reader never sees values go backwards
    #[test]
    fn stress_reader_sees_monotonic_values() {
        let broker = Broker::new(BrokerConfig::default()).unwrap();
        let total = 20_000u64;
        let mut publication = Publication::<Sequence>::new(&broker);
        publication.advertise().unwrap();

        let mut latest = broker.subscribe(Sequence::metadata());
        let mut queued = broker.subscribe(Sequence::metadata());
        let reader = {
            thread::spawn(move || {
                let mut last_latest = None;
                let mut last_queued = None;
                let mut sample = Sequence::default();

                while last_latest != Some(total - 1) || last_queued != Some(total - 1) {
                    if latest.update(&mut sample).unwrap() {
                        assert!(last_latest.map_or(true, |last| sample.value > last));
                        last_latest = Some(sample.value);
                    }
                    if queued.update_queued(&mut sample).unwrap() {
                        assert!(last_queued.map_or(true, |last| sample.value > last));
                        last_queued = Some(sample.value);
                    }
                }
            })
        };

        for value in 0..total {
            publication.publish(&Sequence { value }).unwrap();
        }
        reader.join().unwrap();
    }

    /// Test: nodes are reclaimed correctly while handles churn on many threads
    #[test]
    fn stress_subscribe_churn_reclaims_nodes() {
        let broker = Broker::new(BrokerConfig::default()).unwrap();
        let threads = 6;
        let rounds = 300;
        let barrier = Arc::new(Barrier::new(threads + 1));
        let stop = Arc::new(AtomicBool::new(false));

        let producer = {
            let broker = broker.clone();
            let barrier = barrier.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut publication = Publication::<Heartbeat>::new(&broker);
                barrier.wait();
                let mut beat = 0;
                while !stop.load(Ordering::Relaxed) {
                    publication.publish(&Heartbeat { beat }).unwrap();
                    beat = beat.wrapping_add(1);
                }
            })
        };

        let mut churners = Vec::new();
        for worker in 0..threads {
            let broker = broker.clone();
            let barrier = barrier.clone();
            churners.push(thread::spawn(move || {
                barrier.wait();
                for round in 0..rounds {
                    let instance = ((worker + round) % 3) as u8;
                    let mut sub = broker.subscribe_multi(Heartbeat::metadata(), instance);
                    if round % 2 == 0 {
                        let (tx, _rx) = std::sync::mpsc::sync_channel(1);
                        sub.register_callback(skybus::WakeTarget::Queue(tx)).unwrap();
                    }
                    let mut beat = Heartbeat::default();
                    let _ = sub.update(&mut beat);
                }
            }));
        }

        for churner in churners {
            churner.join().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();

        assert_eq!(broker.stats().active_nodes(), 0);
        assert!(broker.status().is_empty());
        for instance in 0..3 {
            assert!(!broker.node_exists(Heartbeat::metadata().id, instance));
        }
    }

    /// Test: one publish wakes every waiting thread
    #[test]
    fn stress_publish_wakes_all_waiters() {
        let broker = Broker::new(BrokerConfig::default()).unwrap();
        let waiters = 4;
        let barrier = Arc::new(Barrier::new(waiters + 1));
        let woken = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..waiters {
            let broker = broker.clone();
            let barrier = barrier.clone();
            let woken = woken.clone();
            handles.push(thread::spawn(move || {
                let mut sub = broker.subscribe(Heartbeat::metadata());
                barrier.wait();
                let reason = broker.poll(&mut [&mut sub], Duration::from_secs(5)).unwrap();
                if reason == WakeReason::Updated(1) {
                    woken.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }

        let mut publication = Publication::<Heartbeat>::new(&broker);
        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        publication.publish(&Heartbeat { beat: 1 }).unwrap();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::Relaxed), waiters);
    }
}
