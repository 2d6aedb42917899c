//! Serial loopback check.
//!
//! Opens two cross-connected serial devices, arms continuous reading on the
//! first and sends a test string from the second. Passes when every sent
//! byte arrives within the deadline, split deliveries included.
//!
//! Run: loopback <devA> <devB>

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ttyring::Builder;

const PAYLOAD: &[u8] = b"hello-test";
const DEADLINE: Duration = Duration::from_secs(2);

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: loopback <devA> <devB>");
        std::process::exit(2);
    }
    let (dev_a, dev_b) = (&args[1], &args[2]);

    let received = Arc::new(Mutex::new(Vec::<u8>::new()));
    let sink = Arc::clone(&received);

    let port_a = match Builder::new()
        .device(dev_a.as_str())
        .baud_rate(115_200)
        .on_read(move |data| {
            sink.lock().unwrap().extend_from_slice(data);
        })
        .on_error(|code| eprintln!("loopback: reader error {}", code))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("loopback: failed to open '{}': {}", dev_a, e);
            std::process::exit(1);
        }
    };
    port_a.start_read(1024);

    let port_b = match Builder::new()
        .device(dev_b.as_str())
        .baud_rate(115_200)
        .on_error(|code| eprintln!("loopback: writer error {}", code))
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("loopback: failed to open '{}': {}", dev_b, e);
            std::process::exit(1);
        }
    };

    port_b.send(PAYLOAD);

    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        let got = received.lock().unwrap();
        if got.len() >= PAYLOAD.len() {
            if got.as_slice() == PAYLOAD {
                println!("loopback: PASS ({} bytes)", got.len());
                std::process::exit(0);
            }
            eprintln!("loopback: FAIL — payload mismatch: {:?}", got);
            std::process::exit(1);
        }
        drop(got);
        thread::sleep(Duration::from_millis(10));
    }

    eprintln!(
        "loopback: FAIL — timeout, {} of {} bytes received",
        received.lock().unwrap().len(),
        PAYLOAD.len()
    );
    std::process::exit(1);
}
