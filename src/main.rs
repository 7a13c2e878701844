// ── msgpump demo ─────────────────────────────────────────────────────────────
//
// Starts a message-loop thread on the platform pump, binds a small counter to
// it, hammers the counter from a few producer threads, then shuts the loop
// down.  Reads `MSGPUMP_CONFIG` if set.

use std::thread;

use msgpump::{config, facade, MessageLoop, Result};

#[derive(Default)]
struct Counter {
    hits: u64,
}

impl Counter {
    fn hit(&mut self, by: u64) -> u64 {
        self.hits += by;
        self.hits
    }

    fn hits(&self) -> u64 {
        self.hits
    }
}

facade! {
    struct RemoteCounter(Counter);
    fn hit(&self, by: u64) -> u64;
    fn hits(&self) -> u64;
}

const PRODUCERS: u64 = 4;
const HITS_PER_PRODUCER: u64 = 1_000;

fn run() -> Result<()> {
    #[cfg(debug_assertions)]
    let t0 = std::time::Instant::now();

    let cfg = config::load().unwrap_or_default();
    let ml = MessageLoop::with_config(msgpump::DefaultPump::default(), cfg);
    ml.start()?;
    let identity = ml.wait_ready()?;

    #[cfg(debug_assertions)]
    eprintln!(
        "[msgpump] loop {:?} ready in {:.1} ms",
        identity.os,
        t0.elapsed().as_secs_f64() * 1000.0
    );
    #[cfg(not(debug_assertions))]
    let _ = identity;

    let counter = RemoteCounter::new(&ml, Counter::default());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let counter = counter.clone();
            thread::spawn(move || -> Result<()> {
                for _ in 0..HITS_PER_PRODUCER {
                    counter.hit(1)?;
                }
                Ok(())
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap_or_else(|e| std::panic::resume_unwind(e))?;
    }

    println!("{} hits recorded on the loop thread", counter.hits()?);
    ml.shutdown()
}

fn main() {
    if let Err(e) = run() {
        eprintln!("msgpump: {e}");
        std::process::exit(1);
    }
}
