// Randomized checks of the looping playhead

use perfseq::engine::context::EngineContext;
use perfseq::sequencer::{PPQN, PlayMode, Transport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_looping_playhead_stays_inside_region() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..50 {
        let left = rng.gen_range(0..PPQN * 16);
        let right = left + rng.gen_range(1..PPQN * 16);

        let mut transport = Transport::new(EngineContext::new());
        transport.set_right(right);
        transport.set_left(left);
        transport.set_loop(true);
        assert!(transport.start());
        assert_eq!(transport.position(), left);

        let mut total = 0.0;
        for _ in 0..200 {
            let delta = rng.gen_range(0.0..(right - left) as f64 * 3.0);
            total += delta;
            let step = transport.advance(delta);
            let position = transport.position();
            assert!(
                (left..right).contains(&position),
                "{} outside [{}, {})",
                position,
                left,
                right
            );
            assert_eq!(step.to, position);
        }

        // No time is lost across wraps: the playhead sits where the total
        // distance says it should, give or take the pending fraction
        let span = (right - left) as f64;
        let expected = left as f64 + total % span;
        let position = transport.position() as f64;
        let diff = (position - expected).abs();
        assert!(diff < 1.0 || (span - diff) < 1.0, "drifted by {}", diff);
    }
}

#[test]
fn test_live_playhead_outside_region_is_pulled_in() {
    let mut rng = StdRng::seed_from_u64(0x11fe);

    for _ in 0..50 {
        let left = rng.gen_range(PPQN..PPQN * 16);
        let right = left + rng.gen_range(1..PPQN * 16);

        let mut transport = Transport::new(EngineContext::new());
        transport.set_play_mode(PlayMode::Live);
        transport.set_right(right);
        transport.set_left(left);
        transport.set_loop(true);
        transport.set_position(rng.gen_range(0..right * 2));
        assert!(transport.start());

        for _ in 0..100 {
            // Operator seeks anywhere while the loop keeps running
            if rng.gen_bool(0.1) {
                transport.set_position(rng.gen_range(0..right * 2));
            }
            let delta = rng.gen_range(0.5..(right - left) as f64 * 3.0);
            transport.advance(delta);
            let position = transport.position();
            assert!(
                (left..right).contains(&position),
                "{} outside [{}, {})",
                position,
                left,
                right
            );
        }
    }
}

#[test]
fn test_stopped_transport_never_moves() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut transport = Transport::new(EngineContext::new());
    transport.set_position(PPQN * 3);
    for _ in 0..100 {
        let step = transport.advance(rng.gen_range(0.0..10_000.0));
        assert!(!step.wrapped);
        assert_eq!(transport.position(), PPQN * 3);
    }
}
