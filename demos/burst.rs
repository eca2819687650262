//! Fires a burst of concurrent callers at a 3-per-second gate and prints when each is admitted.
use docgate::{AdmissionGate, GateError, RateWindow};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let gate = AdmissionGate::new(RateWindow::per_second(3)?)?;
    let start = Instant::now();

    let callers: Vec<_> = (0..10)
        .map(|id| {
            let gate = gate.clone();
            tokio::spawn(async move {
                let permit = gate.acquire().await?;
                let elapsed = start.elapsed();
                println!("caller {id:>2} admitted at {elapsed:?} (slot {})", permit.slot());
                Ok::<_, GateError>(())
            })
        })
        .collect();

    for caller in callers {
        caller.await??;
    }
    Ok(())
}
