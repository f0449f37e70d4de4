// SPDX-FileCopyrightText: 2026 Conversa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests over randomized fragment interleavings.

use conversa_core::types::DeviceId;
use conversa_test_utils::fragments::{join_fragment, text_fragment};
use conversa_test_utils::PipelineHarness;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        .. ProptestConfig::default()
    })]

    /// A device is never an active member of two OPEN conversations, no
    /// matter how fragments, stale captures, and joins interleave.
    #[test]
    fn device_never_in_two_open_conversations(
        ops in proptest::collection::vec(
            (0usize..3, -4_000i64..0, proptest::bool::weighted(0.2)),
            1..40,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let harness = PipelineHarness::builder()
                .with_idle_timeout_secs(3)
                .with_tolerance_ms(500)
                .build()
                .await
                .unwrap();

            for device in ["dev-0", "dev-1", "dev-2"] {
                harness.register(device).await.unwrap();
            }

            let mut seqs = [0u64; 3];
            for (device_idx, offset_ms, is_join) in ops {
                let device = format!("dev-{device_idx}");
                seqs[device_idx] += 1;
                let seq = seqs[device_idx];

                if is_join {
                    // Try to join whatever conversation a neighbor is in.
                    let other = (device_idx + 1) % 3;
                    let target = harness
                        .pipeline
                        .device(&DeviceId(format!("dev-{other}")))
                        .and_then(|d| d.active_conversation);
                    if let Some(target) = target {
                        let _ = harness
                            .submit(join_fragment(&device, seq, offset_ms, &target.0))
                            .await;
                    }
                } else {
                    let _ = harness
                        .submit(text_fragment(&device, seq, offset_ms, "interleaved"))
                        .await;
                }

                for idx in 0..3 {
                    let id = DeviceId(format!("dev-{idx}"));
                    let open_memberships =
                        harness.pipeline.open_conversations_containing(&id);
                    prop_assert!(
                        open_memberships <= 1,
                        "device {id} active in {open_memberships} open conversations"
                    );
                }
            }

            harness.shutdown().await.unwrap();
            Ok(())
        })?;
    }

    /// Whatever the interleaving, every archived timeline is ordered by the
    /// merge key and duplicates never appear.
    #[test]
    fn archived_timelines_are_ordered_and_dedup_holds(
        ops in proptest::collection::vec(
            (0usize..2, -2_000i64..0, 1u64..6),
            1..30,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            let harness = PipelineHarness::builder()
                .with_tolerance_ms(500)
                .build()
                .await
                .unwrap();

            for device in ["dev-0", "dev-1"] {
                harness.register(device).await.unwrap();
            }

            // Seqs are drawn from a small range so duplicates are frequent.
            for (device_idx, offset_ms, seq) in ops {
                let device = format!("dev-{device_idx}");
                let _ = harness
                    .submit(text_fragment(&device, seq, offset_ms, "prop"))
                    .await;
            }

            harness.shutdown().await.unwrap();

            for id in harness.store.archived_ids() {
                let archive = harness.store.archive(&id).unwrap();

                let keys: Vec<_> = archive
                    .timeline
                    .iter()
                    .map(|f| (f.capture_ts, f.arrival_ts, f.device_id.0.clone()))
                    .collect();
                let mut sorted = keys.clone();
                sorted.sort();
                prop_assert_eq!(&keys, &sorted, "timeline must be ordered");

                let mut seen = std::collections::HashSet::new();
                for fragment in &archive.timeline {
                    prop_assert!(
                        seen.insert((fragment.device_id.0.clone(), fragment.seq)),
                        "duplicate (device, seq) committed"
                    );
                }
            }
            Ok(())
        })?;
    }
}
