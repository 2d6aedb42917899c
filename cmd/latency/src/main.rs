//! Frame latency benchmark.
//!
//! Sends `count` frames of `{u64 seq, u64 ts_ns, payload}` from the second
//! device to the first as fast as the ring accepts them, reassembles frames
//! on the receive side and reports latency percentiles.
//!
//! Run: latency <devA> <devB> [count] [payload_size]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ttyring::Builder;

fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

struct RxState {
    acc: Vec<u8>,
    latencies_ns: Vec<u64>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: latency <devA> <devB> [count] [payload_size]");
        std::process::exit(2);
    }
    let (dev_a, dev_b) = (&args[1], &args[2]);
    let count: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let payload_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(16);
    let frame_size = 8 + 8 + payload_size;

    let state = Arc::new(Mutex::new(RxState {
        acc: Vec::with_capacity(frame_size * 4),
        latencies_ns: Vec::with_capacity(count),
    }));
    let received = Arc::new(AtomicUsize::new(0));

    let rx = Arc::clone(&state);
    let rx_count = Arc::clone(&received);
    let port_a = match Builder::new()
        .device(dev_a.as_str())
        .baud_rate(115_200)
        .on_read(move |data| {
            if data.is_empty() {
                return;
            }
            let mut st = rx.lock().unwrap();
            st.acc.extend_from_slice(data);
            // Peel off complete frames; partial tails wait for more bytes.
            while st.acc.len() >= frame_size {
                let ts = u64::from_ne_bytes(st.acc[8..16].try_into().unwrap());
                let now = now_ns();
                st.latencies_ns.push(now.saturating_sub(ts));
                st.acc.drain(..frame_size);
                rx_count.fetch_add(1, Ordering::Relaxed);
            }
        })
        .on_error(|code| eprintln!("latency: reader error {}", code))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("latency: failed to open '{}': {}", dev_a, e);
            std::process::exit(1);
        }
    };
    port_a.start_read(frame_size.max(256));

    let port_b = match Builder::new()
        .device(dev_b.as_str())
        .baud_rate(115_200)
        .on_error(|code| eprintln!("latency: writer error {}", code))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("latency: failed to open '{}': {}", dev_b, e);
            std::process::exit(1);
        }
    };

    // Give the worker a moment to arm the first read.
    thread::sleep(Duration::from_millis(50));

    let mut frame = vec![0u8; frame_size];
    for (k, byte) in frame[16..].iter_mut().enumerate() {
        *byte = (k & 0xFF) as u8;
    }
    for seq in 0..count as u64 {
        frame[0..8].copy_from_slice(&seq.to_ne_bytes());
        frame[8..16].copy_from_slice(&now_ns().to_ne_bytes());
        port_b.send(&frame);
        // Brief yield now and then so the receiver is not starved.
        if seq & 0x3FF == 0 {
            thread::sleep(Duration::from_micros(50));
        }
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while received.load(Ordering::Relaxed) < count && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    let mut lat = state.lock().unwrap().latencies_ns.clone();
    if lat.is_empty() {
        eprintln!("latency: no frames received");
        std::process::exit(1);
    }
    lat.sort_unstable();

    let us = |ns: u64| ns as f64 / 1000.0;
    let sum: u64 = lat.iter().sum();
    let mean = sum as f64 / lat.len() as f64;
    let pct = |p: usize| lat[((lat.len() - 1) * p) / 100];

    println!("frames sent: {}  received: {}", count, lat.len());
    println!(
        "min(us): {:.2}  mean(us): {:.2}  p50(us): {:.2}  p95(us): {:.2}  p99(us): {:.2}  max(us): {:.2}",
        us(lat[0]),
        mean / 1000.0,
        us(pct(50)),
        us(pct(95)),
        us(pct(99)),
        us(*lat.last().unwrap()),
    );

    let stats = port_b.counters();
    println!(
        "writer: {} messages / {} bytes confirmed",
        stats.messages_sent, stats.bytes_sent
    );

    std::process::exit(if lat.len() + 1 >= count { 0 } else { 1 });
}
