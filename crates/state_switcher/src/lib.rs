//! The idle oracle: tells the deferred-call executor whether the host is
//! currently permitted to dispatch queued work.

use std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

/// A probe for the host's current idle/busy state.
pub trait StateSwitcher: Send + Sync + 'static {
    fn idle(&self) -> bool;
}

/// Used when state switching is disabled: the host is always considered idle,
/// so deferred calls drain as soon as they are queued.
pub struct NoSwitch;

impl StateSwitcher for NoSwitch {
    fn idle(&self) -> bool {
        true
    }
}

/// Polls an external HTTP endpoint for the idle state. The endpoint is
/// expected to return a JSON boolean; any transport error or non-200 response
/// is treated as "busy".
pub struct ApiSwitcher {
    idle: Arc<AtomicBool>,
}

impl ApiSwitcher {
    pub fn new(url: String, interval: Duration) -> Self {
        let idle = Arc::new(AtomicBool::new(false));
        let idle_ = idle.clone();
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            loop {
                idle_.store(Self::probe(&client, &url).await, Ordering::Relaxed);
                tokio::time::sleep(interval).await;
            }
        });
        Self { idle }
    }

    async fn probe(client: &reqwest::Client, url: &str) -> bool {
        let resp = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("idle probe failed: {e}");
                return false;
            },
        };
        if !resp.status().is_success() {
            tracing::warn!("idle probe failed: {}", resp.status());
            return false;
        }
        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("idle probe failed: {e}");
                return false;
            },
        };
        let idle = serde_json::from_slice::<bool>(&body).unwrap_or(false);
        tracing::debug!("idle: {idle}");
        idle
    }
}

impl StateSwitcher for ApiSwitcher {
    fn idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{
                AtomicBool,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    };

    use axum::{
        extract::State,
        routing::get,
        Router,
    };

    use crate::{
        ApiSwitcher,
        NoSwitch,
        StateSwitcher,
    };

    #[test]
    fn test_no_switch_is_always_idle() {
        assert!(NoSwitch.idle());
    }

    async fn spawn_oracle(idle: Arc<AtomicBool>) -> anyhow::Result<String> {
        let app = Router::new()
            .route(
                "/",
                get(|State(idle): State<Arc<AtomicBool>>| async move {
                    format!("{}", idle.load(Ordering::SeqCst))
                }),
            )
            .with_state(idle);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Ok(format!("http://{addr}/"))
    }

    #[tokio::test]
    async fn test_api_switcher_tracks_oracle() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let oracle_idle = Arc::new(AtomicBool::new(false));
        let url = spawn_oracle(oracle_idle.clone()).await?;

        let switcher = ApiSwitcher::new(url, Duration::from_millis(10));
        assert!(!switcher.idle());

        oracle_idle.store(true, Ordering::SeqCst);
        for _ in 0..100 {
            if switcher.idle() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("switcher never observed the oracle flipping to idle");
    }

    #[tokio::test]
    async fn test_api_switcher_unreachable_oracle_is_busy() {
        cmd_util::env::config_test();
        // Nothing is listening here.
        let switcher = ApiSwitcher::new(
            "http://127.0.0.1:9/".to_owned(),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!switcher.idle());
    }
}
