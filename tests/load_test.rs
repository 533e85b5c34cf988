//! Load testing for the forwarding proxy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;

mod common;

use common::MockReply;

#[tokio::test]
async fn test_load_respects_worker_bound() {
    // 1. Backend that records how many requests it serves at once
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (active.clone(), peak.clone());
    let backend = common::start_programmable_backend(move |_| {
        let (active, peak) = (a.clone(), p.clone());
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            MockReply::ok("Hello from backend")
        }
    })
    .await;

    // 2. Start proxy with 3 workers
    let workers = 3;
    let (proxy, shutdown) = common::spawn_proxy(common::test_config(workers, 1_000)).await;

    // 3. Run load
    let concurrency = 20;
    let requests_per_task = 10;
    let total_requests = concurrency * requests_per_task;

    let client = common::client();
    let url = common::proxy_url(proxy, &format!("http://{}/", backend));
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let mut ok = Vec::new();
            let mut busy = 0;
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                let res = client.get(&url).send().await.expect("Proxy unreachable");
                match res.status() {
                    StatusCode::OK => {
                        assert_eq!(res.text().await.unwrap(), "Hello from backend");
                        ok.push(req_start.elapsed());
                    }
                    StatusCode::LOCKED => busy += 1,
                    other => panic!("unexpected status {}", other),
                }
            }
            (ok, busy)
        }));
    }

    let mut latencies = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        let (ok, busy) = task.await.unwrap();
        latencies.extend(ok);
        rejected += busy;
    }
    let duration = start.elapsed();

    assert!(!latencies.is_empty(), "No successful requests recorded");
    assert_eq!(latencies.len() + rejected, total_requests);
    assert!(
        peak.load(Ordering::SeqCst) <= workers,
        "backend saw {} concurrent forwards with {} workers",
        peak.load(Ordering::SeqCst),
        workers
    );

    latencies.sort();
    let p50 = latencies[latencies.len() / 2];
    let p95 = latencies[((latencies.len() as f64 * 0.95) as usize).min(latencies.len() - 1)];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Workers:        {}", workers);
    println!("Total Duration: {:?}", duration);
    println!("Accepted:       {}", latencies.len());
    println!("Rejected (423): {}", rejected);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("-------------------------\n");

    shutdown.trigger();
}
