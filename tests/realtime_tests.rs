//! Audio-thread guarantees: the callback never waits on a worker, and every
//! routed block is either queued or counted as dropped.

mod helpers;

use arc_swap::ArcSwap;
use helpers::tolerances::CALLBACK_BUDGET_MS;
use helpers::*;
use proptest::prelude::*;
use resona::core::{bundle_queue, BundlePool, DriverStats, RouteTable};
use resona::prelude::*;
use resona::CallbackDriver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Driver routed to `routed` input channels whose queues nobody drains.
fn undrained_driver(
    routed: u32,
    pool_size: usize,
    frames: usize,
) -> (CallbackDriver, Vec<resona::core::BundleReceiver>, Arc<BundlePool>, Arc<DriverStats>) {
    let pool = Arc::new(BundlePool::new(pool_size, frames));
    pool.prewarm(pool_size);
    let stats = Arc::new(DriverStats::new());

    let mut table = RouteTable::new();
    let mut receivers = Vec::new();
    for ch in 0..routed {
        let (tx, rx) = bundle_queue(pool.max_bundles());
        table.insert(ChannelId::input(ch), tx);
        receivers.push(rx);
    }

    let driver = CallbackDriver::new(
        Arc::new(ArcSwap::from_pointee(table)),
        pool.clone(),
        stats.clone(),
        ChannelState::new(TEST_SAMPLE_RATE, routed),
        ChannelState::new(TEST_SAMPLE_RATE, 0),
    );
    (driver, receivers, pool, stats)
}

#[test]
fn test_callback_never_waits_on_stalled_consumer() {
    let (mut driver, receivers, pool, stats) = undrained_driver(2, 16, TEST_BUFFER_SIZE);
    let block = vec![0.1f32; TEST_BUFFER_SIZE * 2];

    for _ in 0..200 {
        let start = Instant::now();
        driver.on_audio_block(Some(&block), None, TEST_BUFFER_SIZE, ChannelLayout::new(2, 0));
        assert!(start.elapsed().as_millis() < CALLBACK_BUDGET_MS);
    }

    assert_eq!(stats.blocks(), 200);
    assert_eq!(stats.bundles_sent(), 16);
    assert_eq!(stats.dropped_blocks(), 400 - 16);
    assert_eq!(pool.available(), 0);
    assert_eq!(receivers.iter().map(|r| r.len()).sum::<usize>(), 16);
}

#[test]
fn test_callback_stays_fast_while_workers_are_busy() {
    let settings = AnalysisSettings {
        frames: 8192,
        ..Default::default()
    };
    let engine = test_engine_with(4, settings);
    assert_eq!(engine.create_all(), 4);
    let mut driver = engine.capture_driver();

    let tone = generate_sine(440.0, TEST_SAMPLE_RATE, TEST_BUFFER_SIZE);
    let block = interleave(&[&tone, &tone, &tone, &tone]);

    let mut slowest = Duration::ZERO;
    for _ in 0..500 {
        let start = Instant::now();
        driver.on_audio_block(Some(&block), None, TEST_BUFFER_SIZE, ChannelLayout::new(4, 0));
        slowest = slowest.max(start.elapsed());
    }
    assert!(
        slowest.as_millis() < CALLBACK_BUDGET_MS,
        "slowest callback took {:?}",
        slowest
    );

    let stats = engine.driver_stats();
    assert_eq!(stats.bundles_sent() + stats.dropped_blocks(), 500 * 4);
}

#[test]
fn test_teardown_while_audio_is_flowing() {
    let engine = Arc::new(test_engine(2));
    assert_eq!(engine.create_all(), 2);
    let ch = ChannelId::input(0);

    let feeder = {
        let mut driver = engine.capture_driver();
        thread::spawn(move || {
            let block = vec![0.3f32; TEST_BUFFER_SIZE * 2];
            for _ in 0..2000 {
                driver.on_audio_block(Some(&block), None, TEST_BUFFER_SIZE, ChannelLayout::new(2, 0));
                thread::sleep(Duration::from_micros(50));
            }
            driver
        })
    };

    assert!(wait_for_processed(&engine, ch, 10));
    engine.stop_channel_analysis(ch).unwrap();
    assert!(engine.get_latest_result(ch).is_none());
    assert_eq!(engine.processed(ch), 0);
    assert!(engine.active_channels() == vec![ChannelId::input(1)]);

    let _driver = feeder.join().unwrap();
    engine.destroy_all();

    // Every bundle the driver took came back: queued ones were drained on
    // stop, in-flight ones were released by the worker
    assert_eq!(engine.pool().in_flight(), 0);
}

#[test]
fn test_stopped_channel_is_no_longer_fed() {
    let engine = test_engine(1);
    let ch = ChannelId::input(0);
    engine
        .start_channel_analysis(ch, engine.input_state())
        .unwrap();
    let mut driver = engine.capture_driver();
    let block = vec![0.5f32; TEST_BUFFER_SIZE];

    feed_mono(&mut driver, &block, TEST_BUFFER_SIZE);
    assert!(wait_for_processed(&engine, ch, 1));
    engine.stop_channel_analysis(ch).unwrap();

    let sent = engine.driver_stats().bundles_sent();
    for _ in 0..10 {
        feed_mono(&mut driver, &block, TEST_BUFFER_SIZE);
    }
    assert_eq!(engine.driver_stats().bundles_sent(), sent);
    assert_eq!(engine.driver_stats().dropped_blocks(), 0);
    assert_eq!(engine.pool().in_flight(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_blocks_are_queued_or_dropped(
        routed in 1u32..4,
        pool_size in 1usize..48,
        blocks in 1usize..64,
        frames in 1usize..128,
    ) {
        let (mut driver, receivers, pool, stats) = undrained_driver(routed, pool_size, 128);
        let block = vec![0.0f32; frames * routed as usize];

        for _ in 0..blocks {
            driver.on_audio_block(Some(&block), None, frames, ChannelLayout::new(routed, 0));
        }

        let queued: usize = receivers.iter().map(|r| r.len()).sum();
        prop_assert_eq!(
            stats.bundles_sent() + stats.dropped_blocks(),
            routed as u64 * blocks as u64
        );
        prop_assert_eq!(stats.bundles_sent() as usize, queued);
        prop_assert_eq!(pool.in_flight(), queued);
        prop_assert!(queued <= pool_size);
    }
}
