//! The background worker that drains the deferred-call queue whenever the
//! idle oracle permits.

use std::{
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

use common::knobs::RPROXY_MAX_INFLIGHT;
use state_switcher::StateSwitcher;
use tokio::sync::mpsc;

use crate::{
    CallStatus,
    RProxy,
};

pub(crate) async fn run(
    proxy: Arc<RProxy>,
    switcher: Arc<dyn StateSwitcher>,
    check_period: Duration,
    backoff_period: Duration,
    mut signal: mpsc::Receiver<()>,
) {
    let mut wait = true;
    let mut last_check = Instant::now();
    let mut idle = switcher.idle();
    let max_inflight = *RPROXY_MAX_INFLIGHT;

    loop {
        // either we wait for the signal or the check period
        if wait {
            tokio::select! {
                _ = signal.recv() => {},
                _ = tokio::time::sleep(check_period) => {},
            }
        }

        // cache idleness between polls so the oracle isn't hammered
        if last_check.elapsed() > check_period {
            idle = switcher.idle();
            last_check = Instant::now();
        }

        wait = true;

        if !idle {
            tracing::info!("state: busy, queue length {}", proxy.queue_len());
            continue;
        }

        let Some(call) = proxy.pop_front() else {
            tracing::info!("state: idle, queue empty");
            continue;
        };

        tracing::info!("state: idle, dequeued {call}");

        // Dispatch concurrently; failed calls are not re-enqueued. Persistence
        // plus replay on restart is the recovery mechanism.
        let proxy_ = proxy.clone();
        tokio::spawn(async move {
            let (status, _body) = proxy_
                .execute(&call.name, &call.id, call.payload.clone())
                .await;
            match status {
                CallStatus::Ok => tracing::info!("call {} OK", call.name),
                CallStatus::NotFound => {
                    tracing::warn!("function for call {} not found", call.name)
                },
                CallStatus::Error | CallStatus::Accepted => {
                    tracing::error!("call {} error", call.name)
                },
            }
        });

        let total_inflight = proxy.total_inflight();
        tracing::debug!("total inflight == {total_inflight}");

        // Over the inflight cap the loop stops parking on the wake signal and
        // paces itself with the backoff sleep alone.
        wait = next_wait(total_inflight, max_inflight);
        tokio::time::sleep(backoff_period).await;
    }
}

fn next_wait(total_inflight: i32, max_inflight: i32) -> bool {
    total_inflight <= max_inflight
}
