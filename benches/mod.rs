use criterion::{criterion_group, criterion_main};

mod network;

criterion_group!(
    benches,
    network::application::mqtt::session::bench_serialize_subscribe,
    network::application::mqtt::session::bench_topic_matching,
    network::application::mqtt::session::bench_publish_and_dispatch
);
criterion_main!(benches);
