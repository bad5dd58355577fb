//! End-to-end telemetry tests: rendering, reading back and the live path
//! from the simulated controller to the reporter.

use bytes::Bytes;
use cs_ranging::telemetry::{
    hex_dump, parse_log, parse_report, parse_steps, split_reports, PacketQuality, StepMode,
    StepPayload, SubeventReport, SubeventResult, ToneExtension, ToneQuality, BYTES_PER_LINE,
    RAW_DATA_MARKER,
};

fn result(counter: u16, data: &[u8]) -> SubeventResult {
    SubeventResult {
        procedure_counter: counter,
        procedure_done_status: 1,
        subevent_done_status: 0,
        procedure_abort_reason: 0,
        subevent_abort_reason: 0,
        reference_power_level: -16,
        num_antenna_paths: 1,
        num_steps_reported: 2,
        step_data: (!data.is_empty()).then(|| Bytes::copy_from_slice(data)),
    }
}

/// Test a 20-byte buffer renders as a 16-byte line and a 4-byte line
#[test]
fn test_twenty_byte_buffer() {
    let data: Vec<u8> = (0..20).collect();
    let lines = hex_dump(&data);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].len(), 32);
    assert_eq!(lines[1].len(), 8);
}

/// Test an absent buffer renders header fields only
#[test]
fn test_absent_buffer_header_only() {
    let lines = SubeventReport::new(&result(1, &[])).lines();
    assert!(!lines.iter().any(|l| l == RAW_DATA_MARKER));
    assert!(!lines.iter().any(|l| l.contains("Step data buffer length")));
    assert_eq!(lines.len(), 1 + 8 + 1);
}

/// Test several rendered blocks read back in order
#[test]
fn test_log_with_several_blocks() {
    let log: String = (0..3u16)
        .map(|i| {
            let data: Vec<u8> = (0..(i as u8 * 10)).collect();
            SubeventReport::new(&result(i, &data)).to_string()
        })
        .collect::<Vec<_>>()
        .join("unrelated line\n");

    assert_eq!(split_reports(&log).len(), 3);
    let parsed = parse_log(&log);
    assert_eq!(parsed.len(), 3);
    for (i, r) in parsed.iter().enumerate() {
        assert_eq!(usize::from(r.procedure_counter), i);
        assert_eq!(r.step_data().len(), i * 10);
    }
}

/// Test step frames are recovered and decoded from a rendered buffer
#[test]
fn test_steps_from_rendered_block() {
    let data = [
        0x00, 2, 3, 0x00, 0xd8, 0x01, // mode 0: AA success, -40 dBm, antenna 1
        0x02, 40, 9, 0x01, 0x0a, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0x23, // mode 2
    ];
    let text = SubeventReport::new(&result(9, &data)).to_string();
    let parsed = parse_report(&text).unwrap();

    let steps = parse_steps(parsed.step_data.as_ref().unwrap());
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].mode, StepMode::Mode0);
    assert_eq!(
        steps[0].payload,
        StepPayload::Mode0 {
            packet_quality: PacketQuality::AaSuccess,
            packet_rssi: Some(-40),
            packet_antenna: 1,
            freq_offset: None,
        }
    );
    assert_eq!(steps[1].mode, StepMode::Mode2);
    assert_eq!(steps[1].channel, 40);
    match &steps[1].payload {
        StepPayload::Mode2 {
            antenna_permutation_index,
            tones,
        } => {
            assert_eq!(*antenna_permutation_index, 1);
            assert_eq!((tones[0].pct_i, tones[0].pct_q), (10, 0));
            assert_eq!((tones[1].pct_i, tones[1].pct_q), (-1, -1));
            assert_eq!(tones[1].quality, ToneQuality::Unavailable);
            assert_eq!(tones[1].extension, ToneExtension::Expected);
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn hex_dump_line_shape(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let lines = hex_dump(&data);
            prop_assert_eq!(lines.len(), data.len().div_ceil(BYTES_PER_LINE));
            if let Some((last, full)) = lines.split_last() {
                prop_assert!(full.iter().all(|l| l.len() == 2 * BYTES_PER_LINE));
                prop_assert!(!last.is_empty() && last.len() <= 2 * BYTES_PER_LINE);
            }

            let decoded: Vec<u8> = lines
                .iter()
                .flat_map(|l| hex::decode(l).unwrap())
                .collect();
            prop_assert_eq!(decoded, data);
        }

        #[test]
        fn rendered_block_reads_back(
            counter: u16,
            power: i8,
            paths in 1u8..=4,
            data in proptest::collection::vec(any::<u8>(), 0..200),
        ) {
            let original = SubeventResult {
                reference_power_level: power,
                num_antenna_paths: paths,
                ..result(counter, &data)
            };
            let text = SubeventReport::new(&original).to_string();
            prop_assert_eq!(parse_report(&text).unwrap(), original);
        }
    }
}

mod live {
    use std::sync::Arc;
    use std::time::Duration;

    use cs_ranging::negotiator::completion_channel;
    use cs_ranging::protocol::Role;
    use cs_ranging::role::{Initiator, RoleProfile};
    use cs_ranging::sim::{SimController, SimScript};
    use cs_ranging::telemetry::Reporter;
    use cs_ranging::InProcessRestart;

    /// Test every streamed result reaches the reporter
    #[tokio::test]
    async fn test_results_reach_reporter() {
        let script = SimScript {
            results_per_connection: 10,
            step_data_len: 33,
            ..Default::default()
        };
        let reporter = Arc::new(Reporter::new());
        let (events, slots) = completion_channel(Arc::clone(&reporter));
        let sim = Arc::new(SimController::new(Role::Initiator, script, Arc::new(events)));
        let mut initiator = Initiator::new(
            RoleProfile::initiator(0),
            sim,
            slots,
            Arc::new(InProcessRestart::new()),
        );

        tokio::time::timeout(Duration::from_secs(5), initiator.run())
            .await
            .expect("scenario stalled")
            .unwrap();
        assert_eq!(reporter.reported(), 10);
    }
}
