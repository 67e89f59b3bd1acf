//! Trains a small network on XOR as a two-class problem, then round-trips it
//! through the persistence codec.
//!
//! Run with `RUST_LOG=debug cargo run --example xor` for engine logs.

use mlp_core::{LabeledSample, NeuralNetwork};

fn main() {
    env_logger::init();

    let batch = [
        LabeledSample::new(vec![0.0, 0.0], vec![1.0, 0.0]),
        LabeledSample::new(vec![0.0, 1.0], vec![0.0, 1.0]),
        LabeledSample::new(vec![1.0, 0.0], vec![0.0, 1.0]),
        LabeledSample::new(vec![1.0, 1.0], vec![1.0, 0.0]),
    ];

    let nn = NeuralNetwork::new(&[2, 4, 2]);
    let rate = 0.9;
    let n_epochs = 20_000;

    println!("initial cost: {:.6}", nn.cost(&batch));
    for epoch in 1..=n_epochs {
        nn.learn(&batch, rate);
        if epoch % 2000 == 0 {
            let (correct, cost) = nn.score(&batch);
            println!("epoch {epoch:>6}: cost {cost:.6}, {correct}/4 correct");
        }
    }

    for sample in &batch {
        let output = nn.feed_forward(&sample.values);
        println!(
            "{:?} -> [{:.4}, {:.4}] (want {:?})",
            sample.values, output[0], output[1], sample.label,
        );
    }

    let bytes = nn.to_json().expect("serializing a network cannot fail");
    let reloaded = NeuralNetwork::from_json(&bytes).expect("round trip");
    let (correct, cost) = reloaded.score(&batch);
    println!("reloaded from {} bytes: cost {cost:.6}, {correct}/4 correct", bytes.len());
}
