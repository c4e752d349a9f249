use criterion::{criterion_group, criterion_main, Criterion};
use flight_comm::commander::{Commander, NoPlanner, Priority, Setpoint, VehicleState};
use flight_comm::ManualClock;
use link_protocol::{Frame, Packet, Port};
use std::sync::Arc;

// Hot path of the stabilizer tick: one claim plus one poll
fn bench_arbitration(c: &mut Criterion) {
    let clock = ManualClock::new(0);
    let commander = Commander::new(Arc::new(NoPlanner), clock.clone());
    let sp = Setpoint { thrust: 30_000.0, ..Setpoint::null() };
    let state = VehicleState::default();

    c.bench_function("set_then_get_setpoint", |b| {
        b.iter(|| {
            clock.advance(1);
            commander.set_setpoint(std::hint::black_box(&sp), Priority::CRTP);
            std::hint::black_box(commander.get_setpoint(&state));
        });
    });

    // stale setpoint: every poll goes through the degrade branch
    let stale = Commander::new(Arc::new(NoPlanner), clock.clone());
    stale.set_setpoint(&sp, Priority::CRTP);
    clock.advance(1_000);
    c.bench_function("get_setpoint_degrading", |b| {
        b.iter(|| std::hint::black_box(stale.get_setpoint(&state)));
    });
}

// Radio path: wrap a full packet, encode, decode, unwrap
fn bench_framing(c: &mut Criterion) {
    let packet = Packet::new(Port::LOG, 1, &[0xA5; 30]).unwrap();
    c.bench_function("raw_frame_roundtrip_30b", |b| {
        b.iter(|| {
            let wire = Frame::raw(std::hint::black_box(&packet)).encode();
            let back = Frame::decode(&wire).unwrap().packet().unwrap();
            std::hint::black_box(back);
        });
    });
}

criterion_group!(benches, bench_arbitration, bench_framing);
criterion_main!(benches);
