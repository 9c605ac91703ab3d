//! Function lifecycle orchestration: unpacks uploaded function payloads, asks
//! the container backend to materialize them, and keeps the reverse proxy's
//! routing table in line with the set of live handlers.

use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use errors::ErrorMetadata;
use rproxy::{
    RProxy,
    ALL_FUNCTIONS,
};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct Mount {
    pub dir: PathBuf,
    pub target: String,
    pub rw: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionDefinition {
    pub name: String,
    pub env: String,
    pub threads: usize,
    pub file_dir: PathBuf,
    pub envs: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
}

/// A container backend materializes function definitions into running worker
/// pools. Implemented by the docker backend in production and by in-process
/// doubles in tests.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn create(&self, def: FunctionDefinition) -> anyhow::Result<Box<dyn FunctionHandler>>;

    /// Rediscovers handlers from their persisted descriptors after a restart.
    async fn resume(&self) -> anyhow::Result<HashMap<String, Box<dyn FunctionHandler>>>;

    async fn stop(&self) -> anyhow::Result<()>;
}

/// The live worker pool for one function.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    fn ips(&self) -> Vec<String>;

    async fn start(&mut self) -> anyhow::Result<()>;

    async fn destroy(&self) -> anyhow::Result<()>;

    async fn logs(&self) -> anyhow::Result<String>;
}

pub struct ManagementService {
    instance_id: String,
    backend: Arc<dyn Backend>,
    functions: Mutex<HashMap<String, Box<dyn FunctionHandler>>>,
    rproxy_addr: String,
    rproxy: Arc<RProxy>,
}

impl ManagementService {
    pub async fn new(
        instance_id: String,
        rproxy_addr: String,
        rproxy: Arc<RProxy>,
        backend: Arc<dyn Backend>,
        resume: bool,
    ) -> anyhow::Result<Self> {
        let ms = Self {
            instance_id,
            backend,
            functions: Mutex::new(HashMap::new()),
            rproxy_addr,
            rproxy,
        };

        if resume {
            tracing::info!("resuming functions");
            let handlers = ms
                .backend
                .resume()
                .await
                .context("could not resume functions")?;

            let mut functions = ms.functions.lock().await;
            for (name, handler) in handlers {
                ms.rproxy.add(&name, handler.ips())?;
                functions.insert(name, handler);
            }
        }

        Ok(ms)
    }

    pub async fn upload(
        &self,
        name: &str,
        env: &str,
        threads: usize,
        zipped: &str,
        envs: BTreeMap<String, String>,
        mounts: Vec<Mount>,
    ) -> anyhow::Result<String> {
        if name == ALL_FUNCTIONS {
            anyhow::bail!(ErrorMetadata::bad_request(
                "ReservedFunctionName",
                format!("function name '{ALL_FUNCTIONS}' is reserved")
            ));
        }
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            anyhow::bail!(ErrorMetadata::bad_request(
                "InvalidFunctionName",
                format!("function name {name} contains non-alphanumeric characters")
            ));
        }
        if threads == 0 {
            anyhow::bail!(ErrorMetadata::bad_request(
                "InvalidThreadCount",
                "threads must be at least 1"
            ));
        }

        let funczip = base64::decode(zipped).context(ErrorMetadata::bad_request(
            "InvalidZipPayload",
            "zip payload is not valid base64",
        ))?;

        let uid = common::id::uid();
        tracing::info!("creating function {name} with uid {uid}");

        let staging_root = std::env::temp_dir().join(format!("tfaas-{}", self.instance_id));
        let unpack_dir = staging_root.join(&uid);
        let zip_path = staging_root.join(format!("{uid}.zip"));
        fs::create_dir_all(&unpack_dir)?;
        fs::write(&zip_path, &funczip)?;

        let result = self
            .install(name, env, threads, &zip_path, &unpack_dir, envs, mounts)
            .await;

        // the unpacked tree and the zip are staging state, whatever the outcome
        if let Err(e) = fs::remove_dir_all(&unpack_dir) {
            tracing::warn!("error removing folder {}: {e}", unpack_dir.display());
        }
        if let Err(e) = fs::remove_file(&zip_path) {
            tracing::warn!("error removing zip {}: {e}", zip_path.display());
        }

        result
    }

    async fn install(
        &self,
        name: &str,
        env: &str,
        threads: usize,
        zip_path: &Path,
        unpack_dir: &Path,
        envs: BTreeMap<String, String>,
        mounts: Vec<Mount>,
    ) -> anyhow::Result<String> {
        unzip(zip_path.to_owned(), unpack_dir.to_owned()).await?;

        let mut functions = self.functions.lock().await;

        // we know this function already, destroy its current handler
        if let Some(prev) = functions.remove(name) {
            prev.destroy().await?;
        }

        let mut handler = self
            .backend
            .create(FunctionDefinition {
                name: name.to_owned(),
                env: env.to_owned(),
                threads,
                file_dir: unpack_dir.to_owned(),
                envs,
                mounts,
            })
            .await?;

        if let Err(e) = handler.start().await {
            if let Err(e2) = handler.destroy().await {
                tracing::warn!("could not clean up failed handler for {name}: {e2}");
            }
            return Err(e);
        }

        self.rproxy.add(name, handler.ips())?;
        functions.insert(name.to_owned(), handler);

        Ok(format!("http://{}/{}\n", self.rproxy_addr, name))
    }

    pub async fn delete(&self, name: &str) -> anyhow::Result<()> {
        let mut functions = self.functions.lock().await;

        let Some(handler) = functions.get(name) else {
            anyhow::bail!(ErrorMetadata::not_found(
                "FunctionNotFound",
                format!("function {name} not found")
            ));
        };

        tracing::info!("destroying function {name}");
        handler.destroy().await?;

        if let Err(e) = self.rproxy.del(name) {
            tracing::warn!("could not unroute function {name}: {e}");
        }
        functions.remove(name);

        Ok(())
    }

    pub async fn list(&self) -> Vec<String> {
        self.functions.lock().await.keys().cloned().collect()
    }

    pub async fn wipe(&self) -> anyhow::Result<()> {
        for name in self.list().await {
            tracing::info!("destroying function {name}");
            if let Err(e) = self.delete(&name).await {
                tracing::error!("could not delete function {name}: {e}");
            }
        }
        Ok(())
    }

    pub async fn logs(&self) -> anyhow::Result<String> {
        let functions = self.functions.lock().await;
        let mut logs = String::new();
        for handler in functions.values() {
            logs.push_str(&handler.logs().await?);
            logs.push('\n');
        }
        Ok(logs)
    }

    pub async fn logs_function(&self, name: &str) -> anyhow::Result<String> {
        let functions = self.functions.lock().await;
        let Some(handler) = functions.get(name) else {
            anyhow::bail!(ErrorMetadata::not_found(
                "FunctionNotFound",
                format!("function {name} not found")
            ));
        };
        handler.logs().await
    }

    /// Tears down every function and then the backend itself. Called on
    /// process shutdown.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.wipe().await?;
        self.backend.stop().await
    }
}

async fn unzip(zip_path: PathBuf, dest: PathBuf) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        let file = fs::File::open(&zip_path)?;
        let mut archive = zip::ZipArchive::new(file).context(ErrorMetadata::bad_request(
            "InvalidZipPayload",
            "could not read zip archive",
        ))?;
        archive.extract(&dest)?;
        anyhow::Ok(())
    })
    .await?
}
