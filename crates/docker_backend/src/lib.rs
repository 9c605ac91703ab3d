//! Container backend driving the docker CLI. Each function becomes one image,
//! one bridge network, and `threads` containers with a restart policy, so the
//! container runtime revives worker pools after a crash and `resume` only has
//! to re-probe their health.

use std::{
    collections::HashMap,
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use errors::ErrorMetadata;
use http::StatusCode;
use manager::{
    Backend,
    FunctionDefinition,
    FunctionHandler,
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::process::Command;

pub mod runtimes;

const CONTAINER_STOP_TIMEOUT_SECS: u32 = 3;
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);
const HEALTH_CHECK_DELAY: Duration = Duration::from_secs(1);
const MAX_HEALTH_CHECK_ATTEMPTS: u32 = 10;

pub struct DockerBackend {
    tmp_dir: PathBuf,
    instance_id: String,
    persist_func_dir: PathBuf,
}

impl DockerBackend {
    /// Verifies the docker daemon is reachable, then stages the runtime cache
    /// directory with every registered runtime's build assets.
    pub async fn new(instance_id: String, persist_func_dir: PathBuf) -> anyhow::Result<Self> {
        let mut attempts = 0;
        loop {
            match Command::new("docker").arg("info").output().await {
                Ok(out) if out.status.success() => break,
                Ok(out) => {
                    attempts += 1;
                    if attempts == 3 {
                        anyhow::bail!(
                            "dockerd not running: {}",
                            String::from_utf8_lossy(&out.stderr)
                        );
                    }
                },
                Err(e) => {
                    attempts += 1;
                    if attempts == 3 {
                        return Err(anyhow::Error::from(e).context("docker not found in path"));
                    }
                },
            }
            tracing::warn!("dockerd not running, retrying in 2 seconds");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }

        let tmp_dir = std::env::temp_dir().join(format!("tfaas-{instance_id}"));
        tracing::info!("creating runtime cache directory {}", tmp_dir.display());
        for (name, runtime) in runtimes::REGISTRY.iter() {
            let dir = tmp_dir.join(name);
            fs::create_dir_all(&dir)?;
            fs::write(dir.join("Dockerfile"), runtime.dockerfile)?;
            fs::write(dir.join("server.py"), runtime.server)?;
        }

        fs::create_dir_all(&persist_func_dir)?;

        Ok(Self {
            tmp_dir,
            instance_id,
            persist_func_dir,
        })
    }
}

#[async_trait]
impl Backend for DockerBackend {
    async fn create(&self, def: FunctionDefinition) -> anyhow::Result<Box<dyn FunctionHandler>> {
        if !runtimes::REGISTRY.contains_key(def.env.as_str()) {
            anyhow::bail!(ErrorMetadata::bad_request(
                "UnknownRuntime",
                format!("runtime {} not found", def.env)
            ));
        }

        for mount in &def.mounts {
            if fs::metadata(&mount.dir).is_err() {
                anyhow::bail!(ErrorMetadata::bad_request(
                    "MountDirNotFound",
                    format!("mount directory {} not found", mount.dir.display())
                ));
            }
        }

        let uid = common::id::uid();
        let mut func = DockerFunction {
            name: def.name.clone(),
            env: def.env.clone(),
            threads: def.threads,
            unique_name: format!("{}-{uid}", def.name),
            file_path: PathBuf::new(),
            network: String::new(),
            containers: Vec::with_capacity(def.threads),
            handler_ips: Vec::with_capacity(def.threads),
            persist_path: self.persist_func_dir.join(&def.name),
        };
        tracing::info!(
            "creating function {} with unique name {}",
            func.name,
            func.unique_name
        );

        // stage the build directory: the runtime's Dockerfile plus the
        // uploaded source tree under fn/
        func.file_path = self.tmp_dir.join(&func.unique_name);
        fs::create_dir_all(&func.file_path)?;
        fs::write(
            func.file_path.join("Dockerfile"),
            runtimes::REGISTRY[def.env.as_str()].dockerfile,
        )?;
        let fn_dir = func.file_path.join("fn");
        fs::create_dir_all(&fn_dir)?;
        copy_all(&def.file_dir, &fn_dir)?;

        tracing::info!(
            "building image with name {} in folder {}",
            func.unique_name,
            func.file_path.display()
        );
        let build_args = build_args(&self.instance_id, &func);
        let status = Command::new("docker")
            .args(&build_args)
            .current_dir(&self.tmp_dir)
            .status()
            .await
            .context("could not run docker build")?;
        if !status.success() {
            anyhow::bail!("error building image with command docker {}", build_args.join(" "));
        }

        func.network = docker(&[
            "network",
            "create",
            "--label",
            &format!("tfaas-function={}", func.name),
            "--label",
            &format!("tfaas={}", self.instance_id),
            &func.unique_name,
        ])
        .await?;
        tracing::info!("created network {} with id {}", func.unique_name, func.network);

        for i in 0..func.threads {
            let args = run_args(&self.instance_id, &func, i, &def);
            tracing::info!("creating container with command docker {}", args.join(" "));
            let container = docker(&args.iter().map(String::as_str).collect::<Vec<_>>()).await?;
            tracing::info!("created container {container} (id {i})");
            func.containers.push(container);
        }

        fs::remove_dir_all(&func.file_path)?;
        tracing::info!("removed folder {}", func.file_path.display());

        Ok(Box::new(func))
    }

    async fn resume(&self) -> anyhow::Result<HashMap<String, Box<dyn FunctionHandler>>> {
        let mut handlers: HashMap<String, Box<dyn FunctionHandler>> = HashMap::new();

        let entries = match fs::read_dir(&self.persist_func_dir) {
            Ok(entries) => entries,
            // assuming there is nothing to do
            Err(_) => return Ok(handlers),
        };

        for entry in entries {
            let entry = entry?;
            let persist_path = entry.path();
            let bytes = fs::read(&persist_path)?;
            let mut func: DockerFunction = serde_json::from_slice(&bytes)
                .with_context(|| format!("corrupt descriptor {}", persist_path.display()))?;
            func.persist_path = persist_path;

            // the container runtime's restart policy should have brought the
            // containers back; all that is left is to wait for them
            for ip in &func.handler_ips {
                tracing::info!("waiting for container {ip} to be ready");
                wait_ready(ip).await?;
            }

            handlers.insert(func.name.clone(), Box::new(func));
        }

        Ok(handlers)
    }

    async fn stop(&self) -> anyhow::Result<()> {
        fs::remove_dir_all(&self.tmp_dir)?;
        Ok(())
    }
}

/// A function's materialized form: its image, network, and container pool.
/// Serialized as the persisted descriptor that `resume` rediscovers.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerFunction {
    name: String,
    env: String,
    threads: usize,
    unique_name: String,
    file_path: PathBuf,
    network: String,
    containers: Vec<String>,
    #[serde(rename = "handlerIPs")]
    handler_ips: Vec<String>,
    #[serde(skip)]
    persist_path: PathBuf,
}

#[async_trait]
impl FunctionHandler for DockerFunction {
    fn ips(&self) -> Vec<String> {
        self.handler_ips.clone()
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        tracing::debug!("starting {:?}", self);

        let starts = self.containers.iter().map(|container| async move {
            match docker(&["start", container]).await {
                Ok(_) => tracing::info!("started container {container}"),
                Err(e) => tracing::error!("error starting container {container}: {e}"),
            }
        });
        futures::future::join_all(starts).await;

        for container in &self.containers {
            let out = docker(&["inspect", container]).await?;
            let inspected: Vec<InspectEntry> = serde_json::from_str(&out)
                .with_context(|| format!("could not parse inspect output for {container}"))?;
            let entry = inspected
                .first()
                .with_context(|| format!("no container found for {container}"))?;

            let ip = entry
                .network_settings
                .networks
                .get(&self.unique_name)
                .map(|n| n.ip_address.clone())
                .unwrap_or_default();
            anyhow::ensure!(
                !ip.is_empty(),
                "no ip address found for container {container}"
            );

            tracing::info!("got ip {ip} for container {container}");
            tracing::info!("got pid {} for container {container}", entry.state.pid);
            self.handler_ips.push(ip);
        }

        for ip in &self.handler_ips {
            tracing::info!("waiting for container {ip} to be ready");
            wait_ready(ip).await?;
        }

        let descriptor = serde_json::to_vec(self)?;
        fs::write(&self.persist_path, descriptor)?;

        Ok(())
    }

    async fn destroy(&self) -> anyhow::Result<()> {
        tracing::info!("destroying function {}", self.name);

        let stop_timeout = CONTAINER_STOP_TIMEOUT_SECS.to_string();
        let stops = self.containers.iter().map(|container| {
            let stop_timeout = stop_timeout.clone();
            async move {
                tracing::info!("stopping container {container}");
                if let Err(e) = docker(&["stop", "-t", &stop_timeout, container]).await {
                    tracing::error!("error stopping container {container}: {e}");
                }
                if let Err(e) = docker(&["rm", container]).await {
                    tracing::error!("error removing container {container}: {e}");
                }
                tracing::info!("removed container {container}");
            }
        });
        futures::future::join_all(stops).await;

        match docker(&["network", "rm", &self.network]).await {
            Ok(_) => tracing::info!("removed network {}", self.network),
            Err(e) => tracing::error!("error removing network {}: {e}", self.network),
        }

        match docker(&["rmi", &self.unique_name]).await {
            Ok(_) => tracing::info!("removed image {}", self.unique_name),
            Err(e) => tracing::error!("error removing image {}: {e}", self.unique_name),
        }

        if let Err(e) = fs::remove_file(&self.persist_path) {
            tracing::error!(
                "error removing descriptor {}: {e}",
                self.persist_path.display()
            );
        }

        Ok(())
    }

    async fn logs(&self) -> anyhow::Result<String> {
        let mut logs = String::new();
        for (i, container) in self.containers.iter().enumerate() {
            let out = Command::new("docker")
                .args(["container", "logs", container])
                .output()
                .await?;
            anyhow::ensure!(
                out.status.success(),
                "error getting logs: {}",
                String::from_utf8_lossy(&out.stderr)
            );
            logs.push_str(&prefix_lines(
                &self.name,
                i,
                &String::from_utf8_lossy(&out.stdout),
            ));
            logs.push_str(&prefix_lines(
                &self.name,
                i,
                &String::from_utf8_lossy(&out.stderr),
            ));
        }
        Ok(logs)
    }
}

#[derive(Deserialize)]
struct InspectEntry {
    #[serde(rename = "State")]
    state: InspectState,
    #[serde(rename = "NetworkSettings")]
    network_settings: InspectNetworkSettings,
}

#[derive(Deserialize)]
struct InspectState {
    #[serde(rename = "Pid")]
    pid: i64,
}

#[derive(Deserialize)]
struct InspectNetworkSettings {
    #[serde(rename = "Networks")]
    networks: HashMap<String, InspectNetwork>,
}

#[derive(Deserialize)]
struct InspectNetwork {
    #[serde(rename = "IPAddress")]
    ip_address: String,
}

async fn docker(args: &[&str]) -> anyhow::Result<String> {
    let out = Command::new("docker").args(args).output().await?;
    anyhow::ensure!(
        out.status.success(),
        "docker {} failed: {}{}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr),
    );
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_owned())
}

async fn wait_ready(ip: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    for _ in 0..MAX_HEALTH_CHECK_ATTEMPTS {
        match client
            .get(format!("http://{ip}:8000/health"))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status() == StatusCode::OK => {
                tracing::info!("container {ip} is ready");
                return Ok(());
            },
            Ok(resp) => tracing::info!(
                "container {ip} is not ready yet ({}), retrying in 1 second",
                resp.status()
            ),
            Err(e) => tracing::info!("container {ip} is not ready yet ({e}), retrying in 1 second"),
        }
        tokio::time::sleep(HEALTH_CHECK_DELAY).await;
    }
    anyhow::bail!("container {ip} not ready after {MAX_HEALTH_CHECK_ATTEMPTS} retries")
}

fn build_args(instance_id: &str, func: &DockerFunction) -> Vec<String> {
    vec![
        "build".to_owned(),
        "--force-rm".to_owned(),
        "--label".to_owned(),
        format!("tfaas-function={}", func.name),
        "--label".to_owned(),
        format!("tfaas={instance_id}"),
        "--build-arg".to_owned(),
        format!("RUNTIME_DIR={}", func.env),
        "--build-arg".to_owned(),
        format!("FUNC_DIR={}", func.unique_name),
        "-f".to_owned(),
        format!("{}/Dockerfile", func.unique_name),
        "-t".to_owned(),
        func.unique_name.clone(),
        ".".to_owned(),
    ]
}

fn run_args(
    instance_id: &str,
    func: &DockerFunction,
    index: usize,
    def: &FunctionDefinition,
) -> Vec<String> {
    let mut args = vec![
        "run".to_owned(),
        "-d".to_owned(),
        "--label".to_owned(),
        format!("tfaas-function={}", func.name),
        "--label".to_owned(),
        format!("tfaas={instance_id}"),
        "--network".to_owned(),
        func.unique_name.clone(),
        "--name".to_owned(),
        format!("{}-{index}", func.unique_name),
        "--restart".to_owned(),
        "unless-stopped".to_owned(),
    ];

    for (k, v) in &def.envs {
        args.push("--env".to_owned());
        args.push(format!("{k}={v}"));
    }

    for mount in &def.mounts {
        let mode = if mount.rw { "rw" } else { "ro" };
        args.push("-v".to_owned());
        args.push(format!(
            "{}:/files/{}:{mode}",
            mount.dir.display(),
            mount.target
        ));
    }

    // the image, then the function name and handler index as container
    // arguments so they show up in ps and top
    args.push(func.unique_name.clone());
    args.push(func.name.clone());
    args.push(func.unique_name.clone());
    args.push(index.to_string());

    args
}

fn prefix_lines(name: &str, handler: usize, text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        out.push_str(&format!("function={name} handler={handler} {line}\n"));
    }
    out
}

fn copy_all(src: &Path, dst: &Path) -> anyhow::Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
