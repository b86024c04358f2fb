//! Feed-forward layer forward, backward and update tests
//!
//! Weights are source-major: `weights[source * node_count + node]`.

#![cfg(feature = "rocm")]

mod common;

use common::{assert_close, deep_chain_network, gpu, serial, two_to_three_network};
use neuroforge::network::FeedForwardLayer;
use neuroforge::{FeedForwardOptions, InputOptions, Layer, Network, NeuroError};

const TOLERANCE: f32 = 1e-5;

fn feed_forward(network: &Network, index: usize) -> &FeedForwardLayer {
    network
        .layer(index)
        .and_then(Layer::as_feed_forward)
        .expect("not a feed-forward layer")
}

fn load_two_to_three(network: &Network, sequence: &mut neuroforge::ExecutionSequence) {
    let layer = feed_forward(network, 1);
    layer
        .set_weights(sequence, &[1.0, 1.0, 1.0, 1.0, -1.0, -2.0])
        .unwrap();
    layer.set_biases(sequence, &[4.0, -2.0, 1.0]).unwrap();
    network.set_inputs(sequence, &[2.0, 1.0]).unwrap();
}

#[test]
#[serial]
fn test_forward_pass_computes_sums_and_activations() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = two_to_three_network(fixture.context());
    load_two_to_three(&network, &mut sequence);

    network.execute_forward_pass(&mut sequence).unwrap();

    let layer = feed_forward(&network, 1);
    assert_close(&layer.sums(&mut sequence).unwrap(), &[7.0, -1.0, 1.0], TOLERANCE);
    assert_close(&layer.outputs(&mut sequence).unwrap(), &[7.0, 0.0, 1.0], TOLERANCE);
}

#[test]
#[serial]
fn test_backward_pass_on_final_layer() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = two_to_three_network(fixture.context());
    load_two_to_three(&network, &mut sequence);
    network.set_targets(&mut sequence, &[4.0, 10.0, -2.0]).unwrap();

    network.execute_forward_pass(&mut sequence).unwrap();
    network.execute_backward_pass(&mut sequence).unwrap();

    let layer = feed_forward(&network, 1);
    assert_close(&layer.deltas(&mut sequence).unwrap(), &[3.0, 0.0, 3.0], TOLERANCE);
    assert_close(&layer.targets(&mut sequence).unwrap(), &[4.0, 10.0, -2.0], TOLERANCE);
}

#[test]
#[serial]
fn test_gradient_descent_update() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = two_to_three_network(fixture.context());
    load_two_to_three(&network, &mut sequence);
    network.set_targets(&mut sequence, &[4.0, 10.0, -2.0]).unwrap();

    network.execute_forward_pass(&mut sequence).unwrap();
    network.execute_backward_pass(&mut sequence).unwrap();
    network.execute_update(&mut sequence).unwrap();

    let layer = feed_forward(&network, 1);
    assert_close(
        &layer.weights(&mut sequence).unwrap(),
        &[0.4, 1.0, 0.4, 0.7, -1.0, -2.3],
        TOLERANCE,
    );
    assert_close(&layer.biases(&mut sequence).unwrap(), &[3.7, -2.0, 0.7], TOLERANCE);
}

#[test]
#[serial]
fn test_hidden_layer_delta_uses_successor() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = deep_chain_network(fixture.context());

    let hidden = feed_forward(&network, 1);
    let output = feed_forward(&network, 2);
    hidden.set_weights(&mut sequence, &[1.0]).unwrap();
    hidden.set_biases(&mut sequence, &[1.0]).unwrap();
    output.set_weights(&mut sequence, &[2.0]).unwrap();
    output.set_biases(&mut sequence, &[2.0]).unwrap();
    network.set_inputs(&mut sequence, &[1.0]).unwrap();
    network.set_targets(&mut sequence, &[10.0]).unwrap();

    network.execute_forward_pass(&mut sequence).unwrap();
    assert_close(&hidden.outputs(&mut sequence).unwrap(), &[2.0], TOLERANCE);
    assert_close(&output.outputs(&mut sequence).unwrap(), &[6.0], TOLERANCE);

    network.execute_backward_pass(&mut sequence).unwrap();
    assert_close(&output.deltas(&mut sequence).unwrap(), &[-4.0], TOLERANCE);
    assert_close(&hidden.deltas(&mut sequence).unwrap(), &[-8.0], TOLERANCE);
}

#[test]
#[serial]
fn test_reversed_backward_dispatch_reads_stale_deltas() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = deep_chain_network(fixture.context());

    let hidden = feed_forward(&network, 1);
    let output = feed_forward(&network, 2);
    hidden.set_weights(&mut sequence, &[1.0]).unwrap();
    hidden.set_biases(&mut sequence, &[1.0]).unwrap();
    output.set_weights(&mut sequence, &[2.0]).unwrap();
    output.set_biases(&mut sequence, &[2.0]).unwrap();
    network.set_inputs(&mut sequence, &[1.0]).unwrap();
    network.set_targets(&mut sequence, &[10.0]).unwrap();
    network.execute_forward_pass(&mut sequence).unwrap();

    // Hidden layer first: the output layer's deltas are still zero.
    hidden.backward_pass(&mut sequence).unwrap();
    output.backward_pass(&mut sequence).unwrap();
    assert_close(&hidden.deltas(&mut sequence).unwrap(), &[0.0], TOLERANCE);
    assert_close(&output.deltas(&mut sequence).unwrap(), &[-4.0], TOLERANCE);

    network.execute_backward_pass(&mut sequence).unwrap();
    assert_close(&hidden.deltas(&mut sequence).unwrap(), &[-8.0], TOLERANCE);
}

#[test]
#[serial]
fn test_backward_pass_without_successor_yields_zero_deltas() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();

    let options = FeedForwardOptions::new(&[2]).with_from_dimensionality(&[3]);
    let layer = FeedForwardLayer::new(fixture.context(), &options, false).unwrap();
    assert!(!layer.is_final());
    layer.set_biases(&mut sequence, &[1.0, 2.0]).unwrap();

    layer.forward_pass(&mut sequence).unwrap();
    layer.backward_pass(&mut sequence).unwrap();

    assert_close(&layer.sums(&mut sequence).unwrap(), &[1.0, 2.0], TOLERANCE);
    assert_close(&layer.deltas(&mut sequence).unwrap(), &[0.0, 0.0], TOLERANCE);
    assert!(!sequence.is_failed());
}

#[test]
#[serial]
fn test_set_weights_with_wrong_length_keeps_old_weights() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = two_to_three_network(fixture.context());
    load_two_to_three(&network, &mut sequence);

    let layer = feed_forward(&network, 1);
    let err = layer.set_weights(&mut sequence, &[0.5; 5]).unwrap_err();
    assert!(matches!(
        err,
        NeuroError::SizeMismatch {
            expected: 6,
            actual: 5,
            ..
        }
    ));
    assert_close(
        &layer.weights(&mut sequence).unwrap(),
        &[1.0, 1.0, 1.0, 1.0, -1.0, -2.0],
        TOLERANCE,
    );
}

#[test]
#[serial]
fn test_targets_only_exist_on_the_final_layer() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = deep_chain_network(fixture.context());

    let hidden = feed_forward(&network, 1);
    let err = hidden.set_targets(&mut sequence, &[1.0]).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(!hidden.is_final());
    assert!(feed_forward(&network, 2).is_final());
}

#[test]
#[serial]
fn test_input_layer_cannot_be_final() {
    let Some(fixture) = gpu() else { return };

    let err = InputOptions::new(&[2])
        .create_layer(fixture.context(), true)
        .unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
#[serial]
fn test_randomized_parameters_stay_in_range() {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();
    let network = two_to_three_network(fixture.context());
    let mut rng = StdRng::seed_from_u64(7);

    network
        .randomize_parameters(&mut sequence, &mut rng, 0.5)
        .unwrap();
    let layer = feed_forward(&network, 1);
    let weights = layer.weights(&mut sequence).unwrap();
    assert!(weights.iter().all(|w| (-0.5..=0.5).contains(w)));
    assert!(weights.iter().any(|w| *w != 0.0));

    let err = network
        .randomize_parameters(&mut sequence, &mut rng, 0.0)
        .unwrap_err();
    assert!(err.is_configuration_error());
}
