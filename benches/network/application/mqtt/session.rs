use criterion::{BatchSize, Criterion, Throughput};
use lwmqtt::network::application::mqtt::codec::serialize_subscribe;
use lwmqtt::network::application::mqtt::{
    PublishHandler, PublishInfo, QoS, Session, SubscribeInfo, TopicTable, topic_matches_filter,
};
use lwmqtt::network::error::Error;
use lwmqtt::network::{Close, Connection, Read, Shutdown, Write};
use std::collections::VecDeque;
use std::hint::black_box;

/// Connection that reads back everything written to it, like a broker
/// echoing a publish on a subscribed topic.
#[derive(Debug, Default)]
struct Loopback {
    queue: VecDeque<u8>,
}

impl Read for Loopback {
    type Error = Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.queue.len());
        for (slot, byte) in buf.iter_mut().zip(self.queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for Loopback {
    type Error = Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.queue.extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Shutdown for Loopback {
    type Error = Error;
    fn shutdown(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for Loopback {
    type Error = Error;
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for Loopback {}

struct Discard;

impl PublishHandler for Discard {
    fn on_publish(&mut self, _packet_id: Option<u16>, publish: &PublishInfo<'_>, _subscribed: bool) {
        black_box(publish.payload);
    }
}

const FILTERS: [&str; 4] = [
    "lwmqtt/bench/+/temperature",
    "lwmqtt/bench/kitchen/#",
    "lwmqtt/bench/status",
    "$SYS/broker/uptime",
];

pub fn bench_serialize_subscribe(c: &mut Criterion) {
    let subscriptions = FILTERS.map(|topic_filter| SubscribeInfo {
        topic_filter,
        qos: QoS::AtMostOnce,
    });
    let mut buf = [0u8; 256];

    let mut group = c.benchmark_group("serialize_subscribe");
    group.bench_function("four_filters", |b| {
        b.iter(|| serialize_subscribe(black_box(&subscriptions), 7, &mut buf).unwrap())
    });
    group.finish();
}

pub fn bench_topic_matching(c: &mut Criterion) {
    let topics = [
        "lwmqtt/bench/garage/temperature",
        "lwmqtt/bench/kitchen/light/level",
        "lwmqtt/bench/status",
        "lwmqtt/other/status",
    ];

    let mut group = c.benchmark_group("topic_matching");
    group.bench_function("filters_x_topics", |b| {
        b.iter(|| {
            let mut hits = 0;
            for topic in topics {
                for filter in FILTERS {
                    if topic_matches_filter(black_box(topic), black_box(filter)) {
                        hits += 1;
                    }
                }
            }
            hits
        })
    });
    group.finish();
}

pub fn bench_publish_and_dispatch(c: &mut Criterion) {
    let payload = b"hello world from bench";
    let publish = PublishInfo {
        qos: QoS::AtMostOnce,
        retain: false,
        dup: false,
        topic_name: "lwmqtt/bench/status",
        payload,
    };

    let mut group = c.benchmark_group("publish_and_dispatch");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("qos0_echo", |b| {
        b.iter_batched_ref(
            || {
                let mut topics: TopicTable<'static, 4> = TopicTable::new();
                for filter in FILTERS {
                    topics.push(filter, QoS::AtMostOnce).unwrap();
                }
                let session: Session<Loopback> = Session::new(Loopback::default(), 1);
                (session, topics)
            },
            |(session, topics)| {
                session.publish(&publish, 0).unwrap();
                session.process_next(topics, &mut Discard).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}
