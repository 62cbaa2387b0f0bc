//! # Isolation and Cleanup
//!
//! - A subscriber that never reads must not hold back other subscribers or the publisher
//! - Randomized reader speeds still observe publish order
//! - Topic bookkeeping disappears once the last subscriber leaves

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use futures::StreamExt;
    use rand::Rng;
    use tokio::time::sleep;
    use topic_bus::{Bus, BusConfig};

    use crate::support::{eventually, init_tracing, recv_n, recv_within};

    const TOPIC: &str = "isolation";

    fn bus_with_capacity(capacity: usize) -> Bus<u32> {
        Bus::with_config(BusConfig::default().with_queue_capacity(capacity))
            .expect("valid config")
    }

    // =============================================================================
    // SLOW SUBSCRIBERS
    // =============================================================================

    /// A stalled subscriber does not block a reading one.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_subscriber_does_not_block_others() {
        init_tracing();

        for capacity in [0, 2] {
            let bus = bus_with_capacity(capacity);
            let (_stalled, _us) = bus.subscribe(TOPIC);
            let (mut reader, _ur) = bus.subscribe(TOPIC);

            for value in 0..50 {
                bus.publish(TOPIC, value);
            }

            assert_eq!(recv_n(&mut reader, 50).await, (0..50).collect::<Vec<_>>());
        }
    }

    /// Publishing never waits for subscribers, even when every queue is full.
    #[tokio::test]
    async fn test_publish_never_blocks() {
        let bus = bus_with_capacity(1);
        let _subs: Vec<_> = (0..4).map(|_| bus.subscribe(TOPIC)).collect();

        let started = Instant::now();
        for value in 0..1_000 {
            bus.publish(TOPIC, value);
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(bus.events_published(), 1_000);
    }

    /// Readers with random pauses all observe publish order.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_random_reader_delays_preserve_order() {
        let bus = bus_with_capacity(3);
        let mut readers = Vec::new();

        for _ in 0..6 {
            let (mut receiver, unsubscribe) = bus.subscribe(TOPIC);
            readers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while seen.len() < 100 {
                    let pause = rand::thread_rng().gen_range(0..3);
                    sleep(Duration::from_millis(pause)).await;
                    match recv_within(&mut receiver).await {
                        Some(event) => seen.push(event),
                        None => break,
                    }
                }
                unsubscribe.unsubscribe();
                seen
            }));
        }

        for value in 0..100 {
            bus.publish(TOPIC, value);
        }

        for reader in readers {
            assert_eq!(reader.await.expect("join"), (0..100).collect::<Vec<_>>());
        }
        eventually(|| bus.topic_count() == 0).await;
    }

    /// Receivers work as streams.
    #[tokio::test]
    async fn test_receiver_as_stream() {
        let bus = bus_with_capacity(8);
        let (receiver, unsubscribe) = bus.subscribe(TOPIC);

        for value in 1..=3 {
            bus.publish(TOPIC, value);
        }

        let doubled: Vec<u32> = receiver.take(3).map(|value| value * 2).collect().await;
        assert_eq!(doubled, vec![2, 4, 6]);
        unsubscribe.unsubscribe();
    }

    // =============================================================================
    // REGISTRY CLEANUP
    // =============================================================================

    /// Bookkeeping is removed once every subscriber has left or fired.
    #[tokio::test]
    async fn test_registry_cleanup() {
        let bus = bus_with_capacity(4);
        let (_r1, u1) = bus.subscribe("a");
        let (_r2, u2) = bus.subscribe("a");
        let (mut once, _uo) = bus.subscribe_once("b");

        bus.publish("a", 1);
        bus.publish("b", 2);
        assert_eq!(bus.sequence("a"), Some(1));
        assert_eq!(bus.topic_count(), 1);
        assert_eq!(recv_within(&mut once).await, Some(2));

        u1.unsubscribe();
        assert_eq!(bus.topic_count(), 1);
        u2.unsubscribe();

        assert_eq!(bus.topic_count(), 0);
        assert_eq!(bus.sequence("a"), None);
        assert_eq!(bus.sequence("b"), None);
    }

    /// A topic re-created after cleanup starts its sequence again at zero.
    #[tokio::test]
    async fn test_topic_recreated_after_cleanup() {
        let bus = bus_with_capacity(4);
        let (_r, u) = bus.subscribe(TOPIC);
        bus.publish(TOPIC, 1);
        bus.publish(TOPIC, 2);
        u.unsubscribe();

        let (mut receiver, _u) = bus.subscribe(TOPIC);
        assert_eq!(bus.sequence(TOPIC), Some(0));

        bus.publish(TOPIC, 3);
        assert_eq!(recv_within(&mut receiver).await, Some(3));
    }

    /// Dropping the bus closes every queue.
    #[tokio::test]
    async fn test_dropping_bus_closes_queues() {
        let bus = bus_with_capacity(4);
        let (mut receiver, unsubscribe) = bus.subscribe(TOPIC);
        drop(bus);

        assert_eq!(recv_within(&mut receiver).await, None);
        unsubscribe.unsubscribe();
    }
}
