mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{placed_frame, processor};
use rdtscan::{CaptureSession, Frame, SubmitStatus};

#[test]
fn burst_of_frames_keeps_one_in_flight() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let session = CaptureSession::start(processor(), {
        let seen = Arc::clone(&seen);
        move |outcome| {
            std::thread::sleep(Duration::from_millis(20));
            seen.lock().expect("lock").push(outcome.timestamp());
        }
    })
    .expect("spawn worker");

    let (img, _) = placed_frame([true, false, false], 1.0, 0.0, 320, 240);
    let mut statuses = Vec::new();
    for i in 0..50u64 {
        let frame = Frame::from_gray(img.clone()).with_timestamp(Duration::from_millis(i));
        statuses.push(session.submit(frame));
    }
    assert_eq!(statuses[0], SubmitStatus::Accepted);
    assert!(statuses.iter().all(|s| *s != SubmitStatus::Closed));

    let stats = session.shutdown();
    assert_eq!(stats.max_in_flight, 1, "more than one frame in flight");
    assert!(stats.dropped > 0, "a burst must drop frames");
    assert_eq!(stats.accepted + stats.dropped, 50);
    assert_eq!(stats.accepted, stats.completed);

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len() as u64, stats.completed);
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "outcomes out of order");
}

#[test]
fn submit_after_idle_is_accepted_again() {
    let (tx, rx) = std::sync::mpsc::channel();
    let session = CaptureSession::start(processor(), move |o| {
        let _ = tx.send(o);
    })
    .expect("spawn worker");

    for i in 0..3u64 {
        let frame = Frame::from_gray(image::GrayImage::new(48, 48)).with_timestamp(Duration::from_millis(i));
        assert_eq!(session.submit(frame), SubmitStatus::Accepted, "frame {i}");
        let outcome = rx.recv_timeout(Duration::from_secs(10)).expect("outcome");
        assert_eq!(outcome.timestamp(), Duration::from_millis(i));
        // The sink runs before `busy` is released.
        while session.is_busy() {
            std::thread::yield_now();
        }
    }
    assert_eq!(session.shutdown().dropped, 0);
}

fn wait_until_idle(session: &CaptureSession) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while session.is_busy() {
        assert!(std::time::Instant::now() < deadline, "worker never released the frame");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn panicking_sink_does_not_wedge_the_session() {
    let session = CaptureSession::start(processor(), |_| panic!("sink failure")).expect("spawn worker");

    let frame = || Frame::from_gray(image::GrayImage::new(48, 48));
    let mut statuses = Vec::new();
    for _ in 0..6 {
        statuses.push(session.submit(frame()));
        wait_until_idle(&session);
    }
    assert!(
        statuses.iter().all(|s| *s == SubmitStatus::Accepted),
        "statuses after panics: {statuses:?}"
    );
    assert!(!session.is_busy());

    let stats = session.shutdown();
    assert_eq!(stats.accepted, 6);
    assert_eq!(stats.panicked, 6);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn session_recovers_after_a_single_panic() {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut calls = 0u32;
    let session = CaptureSession::start(processor(), move |o| {
        calls += 1;
        if calls == 1 {
            panic!("first outcome rejected");
        }
        let _ = tx.send(o);
    })
    .expect("spawn worker");

    let frame = |ms| Frame::from_gray(image::GrayImage::new(48, 48)).with_timestamp(Duration::from_millis(ms));
    assert_eq!(session.submit(frame(1)), SubmitStatus::Accepted);
    wait_until_idle(&session);
    assert_eq!(session.submit(frame(2)), SubmitStatus::Accepted);
    let outcome = rx.recv_timeout(Duration::from_secs(10)).expect("outcome after recovery");
    assert_eq!(outcome.timestamp(), Duration::from_millis(2));

    let stats = session.shutdown();
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.completed, 1);
}
