use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use breadsim::*;

fn bench_simple_circuit(c: &mut Criterion) {
    let mut group = c.benchmark_group("simple_circuit");

    let circuit_text = r#"
title LED with button
part vcc power-5v
part gnd ground
part r1 resistor resistance=220
part led1 led-red
part btn push-button
wire w1 vcc.vcc r1.t1
wire w2 r1.t2 led1.anode
wire w3 led1.cathode btn.t1
wire w4 btn.t2 gnd.gnd
"#;

    let parser = CircuitParser::new();
    let layout = parser.parse_str(circuit_text).unwrap();

    group.bench_function("parse_circuit", |b| {
        b.iter(|| parser.parse_str(circuit_text).unwrap());
    });

    group.bench_function("simulate", |b| {
        let mut simulator = Simulator::new();
        simulator.load_layout(layout.clone()).unwrap();
        simulator.set_switch_pressed("btn", true).unwrap();
        b.iter(|| simulator.simulate().is_valid);
    });

    group.finish();
}

/// `count` independent vcc-resistor-LED-ground loops
fn led_bank(count: usize) -> CircuitLayout {
    let mut layout = CircuitLayout::new("led bank");
    for i in 0..count {
        let (vcc, gnd, r, led) = (
            format!("vcc{}", i),
            format!("gnd{}", i),
            format!("r{}", i),
            format!("led{}", i),
        );
        layout = layout
            .part(&vcc, "power-5v")
            .part(&gnd, "ground")
            .part(&r, "resistor")
            .part(&led, "led-green")
            .wire(&format!("w{}a", i), (&vcc, "vcc"), (&r, "t1"))
            .wire(&format!("w{}b", i), (&r, "t2"), (&led, "anode"))
            .wire(&format!("w{}c", i), (&led, "cathode"), (&gnd, "gnd"));
    }
    layout
}

/// One long resistor chain on a breadboard, driven from an Arduino pin
fn resistor_chain(length: usize) -> CircuitLayout {
    let mut layout = CircuitLayout::new("resistor chain")
        .part("bb", "breadboard")
        .part("uno", "arduino-uno")
        .wire("w-in", ("uno", "D7"), ("bb", "a1"))
        .pin("uno", "D7", PinMode::High);
    for i in 0..length {
        let r = format!("r{}", i);
        layout = layout
            .part(&r, "resistor")
            .wire(&format!("w{}a", i), (&r, "t1"), ("bb", &format!("b{}", i + 1)))
            .wire(&format!("w{}b", i), (&r, "t2"), ("bb", &format!("c{}", i + 2)));
    }
    layout
}

fn bench_circuit_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_size");

    for size in [10, 50, 100, 200].iter() {
        group.bench_with_input(BenchmarkId::new("led_bank", size), size, |b, &size| {
            let mut simulator = Simulator::new();
            simulator.load_layout(led_bank(size)).unwrap();
            b.iter(|| simulator.simulate().errors.len());
        });
    }

    for length in [5, 15, 28].iter() {
        group.bench_with_input(BenchmarkId::new("breadboard_chain", length), length, |b, &length| {
            let mut simulator = Simulator::new();
            simulator.load_layout(resistor_chain(length)).unwrap();
            b.iter(|| simulator.simulate().net_states.len());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_simple_circuit, bench_circuit_sizes);
criterion_main!(benches);
