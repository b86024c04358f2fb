//! Device buffer allocation, transfer and snapshot tests

#![cfg(feature = "rocm")]

use std::cell::RefCell;

mod common;

use common::{gpu, serial};
use neuroforge::{DeviceBuffer, NeuroError};
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};

#[test]
#[serial]
fn test_new_buffer_is_zero_filled() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();

    let buffer = DeviceBuffer::create(4, 3, fixture.context()).expect("allocation failed");
    assert_eq!(buffer.len(), 12);
    assert_eq!(buffer.size_bytes(), 48);
    assert_eq!(buffer.to_vec(&mut sequence).unwrap(), vec![0.0; 12]);
}

#[test]
#[serial]
fn test_update_then_read_round_trip() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();

    let buffer = DeviceBuffer::named("values", 3, 2, fixture.context()).unwrap();
    let data = [1.0, -2.5, 3.25, 0.0, 1e-3, -7.0];
    buffer.update(&data, &mut sequence).unwrap();

    let snapshot = buffer.read(&mut sequence).unwrap();
    assert_eq!(snapshot.as_slice(), &data);
    assert_eq!(snapshot.get(0, 1).unwrap(), -2.5);
    assert_eq!(snapshot.get(1, 2).unwrap(), -7.0);
    assert!(sequence.is_idle());
}

#[test]
#[serial]
fn test_snapshot_edits_stay_local_until_written_back() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();

    let buffer = DeviceBuffer::create(2, 2, fixture.context()).unwrap();
    buffer.update(&[1.0, 2.0, 3.0, 4.0], &mut sequence).unwrap();

    let mut snapshot = buffer.read(&mut sequence).unwrap();
    snapshot.set(1, 0, 30.0).unwrap();
    snapshot.release();
    assert_eq!(buffer.to_vec(&mut sequence).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

    let mut snapshot = buffer.read(&mut sequence).unwrap();
    snapshot.set(1, 0, 30.0).unwrap();
    snapshot.as_mut_slice()[0] = 10.0;
    snapshot.write_back(&mut sequence).unwrap();
    snapshot.release();
    assert_eq!(buffer.to_vec(&mut sequence).unwrap(), vec![10.0, 2.0, 30.0, 4.0]);
}

#[test]
#[serial]
fn test_snapshot_index_out_of_range() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();

    let buffer = DeviceBuffer::create(3, 2, fixture.context()).unwrap();
    let mut snapshot = buffer.read(&mut sequence).unwrap();

    assert!(matches!(
        snapshot.get(2, 0),
        Err(NeuroError::IndexOutOfRange { row: 2, col: 0, width: 3, height: 2 })
    ));
    assert!(matches!(
        snapshot.set(0, 3, 1.0),
        Err(NeuroError::IndexOutOfRange { .. })
    ));
    assert_eq!(snapshot.to_vec(), vec![0.0; 6]);
}

#[test]
#[serial]
fn test_update_with_wrong_length_is_rejected() {
    let Some(fixture) = gpu() else { return };
    let mut sequence = fixture.sequence();

    let buffer = DeviceBuffer::named("weights", 2, 2, fixture.context()).unwrap();
    buffer.update(&[1.0, 2.0, 3.0, 4.0], &mut sequence).unwrap();
    let issued = sequence.operations_issued();

    let err = buffer.update(&[9.0; 3], &mut sequence).unwrap_err();
    match err {
        NeuroError::SizeMismatch {
            operand,
            expected,
            actual,
        } => {
            assert_eq!(operand, "weights");
            assert_eq!(expected, 4);
            assert_eq!(actual, 3);
        }
        other => panic!("expected SizeMismatch, got {:?}", other),
    }
    assert_eq!(sequence.operations_issued(), issued);
    assert!(!sequence.is_failed());
    assert_eq!(buffer.to_vec(&mut sequence).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
#[serial]
fn test_zero_sized_buffer_is_configuration_error() {
    let Some(fixture) = gpu() else { return };

    let err = DeviceBuffer::create(0, 4, fixture.context()).unwrap_err();
    assert!(err.is_configuration_error());
    let err = DeviceBuffer::create(4, 0, fixture.context()).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
#[serial]
fn test_overflowing_shape_is_reported_as_overflow() {
    let Some(fixture) = gpu() else { return };

    let err = DeviceBuffer::create(usize::MAX, 2, fixture.context()).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(err.to_string().contains("overflows"), "{}", err);
}

#[test]
#[serial]
fn test_buffer_records_its_device() {
    let Some(fixture) = gpu() else { return };

    let buffer = DeviceBuffer::create(2, 2, fixture.context()).unwrap();
    assert_eq!(buffer.ordinal(), fixture.context().ordinal());
}

#[test]
#[serial]
fn test_round_trip_arbitrary_contents() {
    let Some(fixture) = gpu() else { return };
    let sequence = RefCell::new(fixture.sequence());

    let mut runner = TestRunner::new(Config::with_cases(16));
    runner
        .run(
            &proptest::collection::vec(-1.0e6f32..1.0e6, 1..300),
            |values| {
                let buffer = DeviceBuffer::create(values.len(), 1, fixture.context())
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                buffer
                    .update(&values, &mut sequence.borrow_mut())
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let read = buffer
                    .to_vec(&mut sequence.borrow_mut())
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(read, values);
                Ok(())
            },
        )
        .unwrap();
}

#[test]
#[serial]
fn test_buffers_are_released_on_drop() {
    let Some(fixture) = gpu() else { return };

    for _ in 0..32 {
        let buffer = DeviceBuffer::create(1024, 1024, fixture.context()).unwrap();
        drop(buffer);
    }
    fixture.assert_no_leak(5);
}
